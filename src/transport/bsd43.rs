//! 4.3BSD back-end: the `msg_accrights`/`msg_accrightslen` fields of `msghdr`, predating the
//! POSIX `cmsghdr`/`SCM_RIGHTS` ancillary-data convention used by [`super::bsd44`].
//!
//! Kept for parity with the handful of SunOS-derived kernels that still expose these fields;
//! everywhere else the 4.4BSD back-end is used instead. The on-wire shape is otherwise identical:
//! one opaque payload byte, exactly one descriptor per message.

use crate::error::TransportOutcome;
use std::os::fd::{FromRawFd, OwnedFd, RawFd};
use std::{io, mem};

const PAYLOAD: [u8; 1] = [0u8];

pub(crate) fn send_one(endpoint: RawFd, fd: RawFd) -> TransportOutcome<()> {
    unsafe {
        let mut iov = libc::iovec {
            iov_base: PAYLOAD.as_ptr() as *mut _,
            iov_len: PAYLOAD.len(),
        };
        let mut rights = fd;
        let mut msghdr: libc::msghdr = mem::zeroed();
        msghdr.msg_iov = &mut iov;
        msghdr.msg_iovlen = 1;
        msghdr.msg_accrights = &mut rights as *mut RawFd as *mut _;
        msghdr.msg_accrightslen = mem::size_of::<RawFd>() as _;

        let sent = libc::sendmsg(endpoint, &msghdr, 0);
        if sent >= 0 {
            return TransportOutcome::Ok(());
        }
        classify_send_error(io::Error::last_os_error())
    }
}

fn classify_send_error(err: io::Error) -> TransportOutcome<()> {
    match err.kind() {
        io::ErrorKind::WouldBlock => TransportOutcome::WouldBlock,
        _ => TransportOutcome::Fatal(err),
    }
}

pub(crate) fn recv_one(endpoint: RawFd) -> TransportOutcome<OwnedFd> {
    unsafe {
        let mut payload = [0u8; 1];
        let mut iov = libc::iovec {
            iov_base: payload.as_mut_ptr() as *mut _,
            iov_len: payload.len(),
        };
        let mut rights: RawFd = -1;
        let mut msghdr: libc::msghdr = mem::zeroed();
        msghdr.msg_iov = &mut iov;
        msghdr.msg_iovlen = 1;
        msghdr.msg_accrights = &mut rights as *mut RawFd as *mut _;
        msghdr.msg_accrightslen = mem::size_of::<RawFd>() as _;

        let received = libc::recvmsg(endpoint, &mut msghdr, 0);
        if received < 0 {
            return classify_recv_error(io::Error::last_os_error());
        }
        if received == 0 {
            // The peer closed its end cleanly; the Passer maps this to an orderly shutdown
            // (`on_error(None)`) rather than a Fatal one.
            return TransportOutcome::Eof;
        }
        if msghdr.msg_accrightslen == 0 || rights < 0 {
            return TransportOutcome::TableFull;
        }
        TransportOutcome::Ok(OwnedFd::from_raw_fd(rights))
    }
}

fn classify_recv_error(err: io::Error) -> TransportOutcome<OwnedFd> {
    match err.kind() {
        io::ErrorKind::WouldBlock => TransportOutcome::WouldBlock,
        _ if err.raw_os_error() == Some(libc::EMFILE) || err.raw_os_error() == Some(libc::ENFILE) => {
            TransportOutcome::TableFull
        }
        _ => TransportOutcome::Fatal(err),
    }
}
