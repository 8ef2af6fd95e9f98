//! 4.4BSD back-end: `SCM_RIGHTS` ancillary data over a stream (or STREAMS-less datagram) socket.
//!
//! The message carries exactly one payload byte (an empty message is legal per POSIX but some
//! kernels have historically mishandled it, so a single opaque byte is sent to stay clear of
//! that corner) and an ancillary header of kind `SCM_RIGHTS` carrying exactly one descriptor.

use crate::error::TransportOutcome;
use std::os::fd::{FromRawFd, OwnedFd, RawFd};
use std::{io, mem, ptr};

/// Large enough for `CMSG_SPACE(size_of::<RawFd>())` on every platform this crate targets: one
/// descriptor's worth of ancillary data plus cmsghdr overhead and alignment padding.
const CMSG_BUF_LEN: usize = 32;

/// Opaque payload byte accompanying every message; the peer discards it.
const PAYLOAD: [u8; 1] = [0u8];

pub(crate) fn send_one(endpoint: RawFd, fd: RawFd) -> TransportOutcome<()> {
    unsafe {
        let mut iov = libc::iovec {
            iov_base: PAYLOAD.as_ptr() as *mut _,
            iov_len: PAYLOAD.len(),
        };
        let mut cmsg_buf = [0u8; CMSG_BUF_LEN];
        let fd_len = mem::size_of::<RawFd>();
        let cmsg_space = libc::CMSG_SPACE(fd_len as u32) as usize;
        debug_assert!(cmsg_space <= CMSG_BUF_LEN);

        let mut msghdr: libc::msghdr = mem::zeroed();
        msghdr.msg_iov = &mut iov;
        msghdr.msg_iovlen = 1;
        msghdr.msg_control = cmsg_buf.as_mut_ptr() as *mut _;
        msghdr.msg_controllen = cmsg_space as _;

        let cmsg_header = libc::CMSG_FIRSTHDR(&msghdr);
        ptr::write(
            cmsg_header,
            libc::cmsghdr {
                cmsg_level: libc::SOL_SOCKET,
                cmsg_type: libc::SCM_RIGHTS,
                cmsg_len: libc::CMSG_LEN(fd_len as u32) as _,
            },
        );
        ptr::write_unaligned(libc::CMSG_DATA(cmsg_header) as *mut RawFd, fd);
        msghdr.msg_controllen = libc::CMSG_SPACE(fd_len as u32) as _;

        let sent = libc::sendmsg(endpoint, &msghdr, libc::MSG_NOSIGNAL);
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
        let mut cmsg_buf = [0u8; CMSG_BUF_LEN];
        let cmsg_space = libc::CMSG_SPACE(mem::size_of::<RawFd>() as u32) as usize;
        debug_assert!(cmsg_space <= CMSG_BUF_LEN);

        let mut msghdr: libc::msghdr = mem::zeroed();
        msghdr.msg_iov = &mut iov;
        msghdr.msg_iovlen = 1;
        msghdr.msg_control = cmsg_buf.as_mut_ptr() as *mut _;
        msghdr.msg_controllen = cmsg_space as _;

        let received = libc::recvmsg(endpoint, &mut msghdr, 0);
        if received < 0 {
            return classify_recv_io_error(io::Error::last_os_error());
        }
        if received == 0 {
            // The peer closed its end cleanly; the Passer maps this to an orderly shutdown
            // (`on_error(None)`) rather than a Fatal one.
            return TransportOutcome::Eof;
        }

        if msghdr.msg_flags & libc::MSG_CTRUNC != 0 {
            // The kernel could not fit the ancillary data: the standard signal that no
            // descriptor slot was available to receive into.
            return TransportOutcome::TableFull;
        }

        let cmsg_header = libc::CMSG_FIRSTHDR(&msghdr);
        if cmsg_header.is_null()
            || (*cmsg_header).cmsg_level != libc::SOL_SOCKET
            || (*cmsg_header).cmsg_type != libc::SCM_RIGHTS
        {
            return TransportOutcome::Fatal(io::Error::new(
                io::ErrorKind::InvalidData,
                "fd-passing message carried no SCM_RIGHTS ancillary data",
            ));
        }

        let fd = ptr::read_unaligned(libc::CMSG_DATA(cmsg_header) as *const RawFd);
        TransportOutcome::Ok(OwnedFd::from_raw_fd(fd))
    }
}

fn classify_recv_io_error(err: io::Error) -> TransportOutcome<OwnedFd> {
    match err.kind() {
        io::ErrorKind::WouldBlock => TransportOutcome::WouldBlock,
        _ if err.raw_os_error() == Some(libc::EMFILE) || err.raw_os_error() == Some(libc::ENFILE) => {
            TransportOutcome::TableFull
        }
        _ => TransportOutcome::Fatal(err),
    }
}
