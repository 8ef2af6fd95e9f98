//! Low-level descriptor helpers shared by the transport back-ends, the sentinel, and the
//! rendezvous helpers.
//!
//! File descriptors flowing through this crate are tracked as [`OwnedFd`] once they are no
//! longer raw syscall return values, so that ordinary `Drop` closes them and the ownership
//! invariants from the data model (exclusive ownership while queued) fall out of the type system
//! rather than being hand-enforced.

use std::io;
use std::os::fd::{AsRawFd, BorrowedFd, OwnedFd, RawFd};

/// Puts `fd` into non-blocking mode, preserving every other bit of its status flags.
pub(crate) fn set_nonblocking(fd: RawFd) -> io::Result<()> {
    let borrowed = unsafe { BorrowedFd::borrow_raw(fd) };
    let flags = nix::fcntl::fcntl(borrowed.as_raw_fd(), nix::fcntl::FcntlArg::F_GETFL)
        .map_err(io::Error::from)?;
    let mut flags = nix::fcntl::OFlag::from_bits_truncate(flags);
    if flags.contains(nix::fcntl::OFlag::O_NONBLOCK) {
        return Ok(());
    }
    flags.insert(nix::fcntl::OFlag::O_NONBLOCK);
    nix::fcntl::fcntl(borrowed.as_raw_fd(), nix::fcntl::FcntlArg::F_SETFL(flags))
        .map_err(io::Error::from)?;
    Ok(())
}

/// Reports whether `fd` currently has `O_NONBLOCK` set.
///
/// Used by tests asserting property 4 (blocking-status preservation): a descriptor that was
/// blocking before `push_send_fh` must still be blocking after the peer's recv callback fires.
#[cfg(test)]
pub(crate) fn is_nonblocking(fd: RawFd) -> io::Result<bool> {
    let flags = nix::fcntl::fcntl(fd, nix::fcntl::FcntlArg::F_GETFL).map_err(io::Error::from)?;
    Ok(nix::fcntl::OFlag::from_bits_truncate(flags).contains(nix::fcntl::OFlag::O_NONBLOCK))
}

/// Duplicates any currently-open descriptor, used by the sentinel to reacquire a slot.
///
/// Stdin (fd 0) is used as the duplication source: in any process that has gotten far enough to
/// construct a [`Passer`](crate::passer::Passer), fd 0 is open (even if redirected to
/// `/dev/null`), and the sentinel never reads or writes through the duplicate, so what it refers
/// to is immaterial.
pub(crate) fn dup_any_open_fd() -> nix::Result<OwnedFd> {
    use std::os::fd::FromRawFd;
    let stdin = unsafe { BorrowedFd::borrow_raw(0) };
    let raw = nix::unistd::dup(stdin.as_raw_fd())?;
    Ok(unsafe { OwnedFd::from_raw_fd(raw) })
}
