//! Transport back-ends: the kernel mechanism for atomic one-descriptor transfer over a
//! pre-established endpoint.
//!
//! Exactly one back-end is compiled in, selected as the crate's feature flags describe: the `sysv` Cargo feature
//! forces the STREAMS back-end, otherwise a platform probe picks 4.3BSD `msg_accrights` on
//! Solaris and 4.4BSD `SCM_RIGHTS` everywhere else. All three share the same free-function
//! interface so the rest of the crate never matches on which one is active.

mod bsd44;

#[cfg(target_os = "solaris")]
mod bsd43;

#[cfg(feature = "sysv")]
mod sysv;

use crate::error::TransportOutcome;
use std::os::fd::{OwnedFd, RawFd};

/// Sends exactly one descriptor over `endpoint`. Batching more than one descriptor per call is
/// deliberately unsupported (see the design notes on the sentinel/batching interaction).
pub(crate) fn send_one(endpoint: RawFd, fd: RawFd) -> TransportOutcome<()> {
    imp::send_one(endpoint, fd)
}

/// Receives exactly one descriptor from `endpoint`.
pub(crate) fn recv_one(endpoint: RawFd) -> TransportOutcome<OwnedFd> {
    imp::recv_one(endpoint)
}

#[cfg(feature = "sysv")]
use sysv as imp;

#[cfg(all(not(feature = "sysv"), target_os = "solaris"))]
use bsd43 as imp;

#[cfg(all(not(feature = "sysv"), not(target_os = "solaris")))]
use bsd44 as imp;
