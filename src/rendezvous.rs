//! Filesystem and process-pair helpers for getting a transport endpoint into existence.
//!
//! None of these helpers touch a [`Passer`](crate::passer::Passer) directly; they just produce
//! `OwnedFd`s suitable for `Endpoints::One`/`Endpoints::Two`. Keeping them separate from
//! `passer.rs` means a caller who wants a different rendezvous strategy (an already-open socket
//! handed down by a supervisor, say) can skip this module entirely.

use std::io;
use std::os::fd::OwnedFd;
use std::path::Path;

#[cfg(not(feature = "sysv"))]
mod bsd {
    use super::*;
    use nix::sys::socket::{AddressFamily, SockFlag, SockType};
    use std::os::fd::{FromRawFd, IntoRawFd};
    use std::os::unix::net::{UnixListener, UnixStream};

    pub(super) fn socketpair() -> io::Result<(OwnedFd, OwnedFd)> {
        let (a, b) = nix::sys::socket::socketpair(
            AddressFamily::Unix,
            SockType::Stream,
            None,
            SockFlag::empty(),
        )
        .map_err(io::Error::from)?;
        Ok((a, b))
    }

    pub(super) fn server(path: &Path, backlog: u32) -> io::Result<UnixListener> {
        let listener = UnixListener::bind(path)?;
        // `UnixListener` has no public backlog knob; the OS default is already generous, and the
        // `backlog` argument exists for parity with the SysV back-end's `connld` queue length.
        let _ = backlog;
        Ok(listener)
    }

    pub(super) fn accept(listener: &UnixListener) -> io::Result<OwnedFd> {
        let (stream, _addr) = listener.accept()?;
        Ok(stream_into_owned(stream))
    }

    pub(super) fn connect(path: &Path) -> io::Result<OwnedFd> {
        let stream = UnixStream::connect(path)?;
        Ok(stream_into_owned(stream))
    }

    fn stream_into_owned(stream: UnixStream) -> OwnedFd {
        let raw = stream.into_raw_fd();
        unsafe { OwnedFd::from_raw_fd(raw) }
    }
}

#[cfg(feature = "sysv")]
mod sysv {
    use super::*;
    use std::ffi::CString;
    use std::os::fd::{FromRawFd, IntoRawFd, RawFd};

    pub(super) fn socketpair() -> io::Result<(OwnedFd, OwnedFd)> {
        let (read_end, write_end) = nix::unistd::pipe().map_err(io::Error::from)?;
        Ok((read_end, write_end))
    }

    /// Pushes the `connld` STREAMS module onto a pipe's write end and mounts it into the
    /// filesystem namespace at `path`, turning plain `open()`s of `path` into connections that
    /// `accept` (receive-fd) can hand out as distinct endpoints.
    pub(super) fn server(path: &Path, backlog: i32) -> io::Result<OwnedFd> {
        let (read_end, write_end) = nix::unistd::pipe().map_err(io::Error::from)?;
        drop(read_end);
        let module = CString::new("connld").expect("no interior NUL");
        let rc = unsafe { libc::ioctl(write_end_fd(&write_end), libc::I_PUSH, module.as_ptr()) };
        if rc < 0 {
            return Err(io::Error::last_os_error());
        }
        let _ = backlog; // `connld` has no explicit queue-length knob exposed via this ioctl path
        let c_path = CString::new(path.as_os_str().as_encoded_bytes()).map_err(|_| {
            io::Error::new(io::ErrorKind::InvalidInput, "rendezvous path contains a NUL byte")
        })?;
        let rc = unsafe { libc::fattach(write_end_fd(&write_end), c_path.as_ptr()) };
        if rc < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(write_end)
    }

    pub(super) fn accept(listener: &OwnedFd) -> io::Result<OwnedFd> {
        // The listener endpoint stays in blocking mode (it is never handed to a `Passer`, only
        // used here), so `I_RECVFD` waits for the next `connld`-queued connection.
        unsafe {
            let mut recvfd: libc::strrecvfd = std::mem::zeroed();
            let rc = libc::ioctl(
                write_end_fd(listener),
                libc::I_RECVFD,
                &mut recvfd as *mut libc::strrecvfd,
            );
            if rc < 0 {
                return Err(io::Error::last_os_error());
            }
            Ok(OwnedFd::from_raw_fd(recvfd.fd))
        }
    }

    pub(super) fn connect(path: &Path) -> io::Result<OwnedFd> {
        let c_path = CString::new(path.as_os_str().as_encoded_bytes()).map_err(|_| {
            io::Error::new(io::ErrorKind::InvalidInput, "rendezvous path contains a NUL byte")
        })?;
        let raw = unsafe { libc::open(c_path.as_ptr(), libc::O_RDWR) };
        if raw < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(unsafe { OwnedFd::from_raw_fd(raw) })
    }

    fn write_end_fd(fd: &OwnedFd) -> RawFd {
        use std::os::fd::AsRawFd;
        fd.as_raw_fd()
    }
}

/// Creates a fresh connected pair suitable for `Endpoints::Two`, for the fork-and-resolve-role
/// lifecycle.
pub fn socketpair() -> io::Result<(OwnedFd, OwnedFd)> {
    #[cfg(feature = "sysv")]
    return sysv::socketpair();
    #[cfg(not(feature = "sysv"))]
    return bsd::socketpair();
}

/// A listening rendezvous point bound at a filesystem path, for unrelated processes to find each
/// other (as opposed to `socketpair` for a `fork`ing parent/child).
pub enum Listener {
    #[cfg(not(feature = "sysv"))]
    Bsd(std::os::unix::net::UnixListener),
    #[cfg(feature = "sysv")]
    SysV(OwnedFd),
}

/// Binds a rendezvous point at `path`. The caller owns `path`'s lifecycle: this crate never
/// unlinks it automatically, matching the ownership style of `UnixListener::bind` itself.
pub fn server(path: impl AsRef<Path>, backlog: u32) -> io::Result<Listener> {
    let path = path.as_ref();
    #[cfg(feature = "sysv")]
    {
        let fd = sysv::server(path, backlog as i32)?;
        Ok(Listener::SysV(fd))
    }
    #[cfg(not(feature = "sysv"))]
    {
        let listener = bsd::server(path, backlog)?;
        Ok(Listener::Bsd(listener))
    }
}

/// Accepts one waiting connection from a [`Listener`], yielding a fresh endpoint suitable for
/// `Endpoints::One`.
pub fn accept(listener: &Listener) -> io::Result<OwnedFd> {
    match listener {
        #[cfg(not(feature = "sysv"))]
        Listener::Bsd(l) => bsd::accept(l),
        #[cfg(feature = "sysv")]
        Listener::SysV(fd) => sysv::accept(fd),
    }
}

/// Connects to a rendezvous point previously created with [`server`], yielding a fresh endpoint
/// suitable for `Endpoints::One`.
pub fn connect(path: impl AsRef<Path>) -> io::Result<OwnedFd> {
    let path = path.as_ref();
    #[cfg(feature = "sysv")]
    return sysv::connect(path);
    #[cfg(not(feature = "sysv"))]
    return bsd::connect(path);
}
