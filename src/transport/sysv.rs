//! SysV back-end: STREAMS `I_SENDFD`/`I_RECVFD` ioctls over a pipe endpoint.
//!
//! Selected by the `sysv` Cargo feature. Unlike the two BSD back-ends this one carries no
//! payload byte at all — the STREAMS pipe primitive only ever moves one descriptor per call, and
//! there is no accompanying data channel to multiplex a marker byte onto.

use crate::error::TransportOutcome;
use std::os::fd::{FromRawFd, OwnedFd, RawFd};
use std::{io, mem};

pub(crate) fn send_one(endpoint: RawFd, fd: RawFd) -> TransportOutcome<()> {
    let rc = unsafe { libc::ioctl(endpoint, libc::I_SENDFD, fd) };
    if rc >= 0 {
        return TransportOutcome::Ok(());
    }
    classify_send_error(io::Error::last_os_error())
}

fn classify_send_error(err: io::Error) -> TransportOutcome<()> {
    match err.kind() {
        io::ErrorKind::WouldBlock => TransportOutcome::WouldBlock,
        _ if is_table_full(&err) => TransportOutcome::TableFull,
        _ => TransportOutcome::Fatal(err),
    }
}

pub(crate) fn recv_one(endpoint: RawFd) -> TransportOutcome<OwnedFd> {
    unsafe {
        let mut recvfd: libc::strrecvfd = mem::zeroed();
        let rc = libc::ioctl(endpoint, libc::I_RECVFD, &mut recvfd as *mut libc::strrecvfd);
        if rc < 0 {
            return classify_recv_error(io::Error::last_os_error());
        }
        TransportOutcome::Ok(OwnedFd::from_raw_fd(recvfd.fd))
    }
}

fn classify_recv_error(err: io::Error) -> TransportOutcome<OwnedFd> {
    match err.kind() {
        io::ErrorKind::WouldBlock => TransportOutcome::WouldBlock,
        _ if is_table_full(&err) => TransportOutcome::TableFull,
        _ => TransportOutcome::Fatal(err),
    }
}

/// `EMFILE` (per-process) and `ENFILE` (system-wide) are the standard "too many open files"
/// errnos; STREAMS distinguishes table-full conditions from other failures this way rather than
/// through a dedicated flag (contrast with the 4.4BSD back-end's `MSG_CTRUNC`).
fn is_table_full(err: &io::Error) -> bool {
    matches!(err.raw_os_error(), Some(e) if e == libc::EMFILE || e == libc::ENFILE)
}
