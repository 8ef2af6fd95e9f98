//! A reserved descriptor-table slot.
//!
//! The correctness property the rest of the crate leans on is entirely contained here: as long
//! as a [`Sentinel`] is held, one slot of this process's descriptor table is guaranteed free for
//! whatever [`release`](Sentinel::release) followed by a kernel receive wants to put there.

use crate::descriptor;
use crate::error::SentinelError;
use std::os::fd::OwnedFd;
use tracing::{debug, warn};

/// Occupies one descriptor-table slot without ever performing I/O through it.
#[derive(Debug)]
pub(crate) struct Sentinel {
    held: Option<OwnedFd>,
}

impl Sentinel {
    /// Allocates a pipe, closes the read end, and keeps the write end as the sentinel.
    pub(crate) fn new() -> nix::Result<Self> {
        let (read_end, write_end) = nix::unistd::pipe()?;
        drop(read_end);
        Ok(Sentinel {
            held: Some(write_end),
        })
    }

    /// True while a slot is currently reserved (the normal, non-retry state).
    pub(crate) fn is_held(&self) -> bool {
        self.held.is_some()
    }

    /// Closes the sentinel descriptor, freeing its slot for an imminent incoming transfer.
    ///
    /// Must be called immediately before the matching [`Transport::recv_one`](crate::transport::recv_one)
    /// so that no other code in this process can slip a descriptor into the freed slot first (see
    /// the "asynchronous descriptor creation" caveat in the design notes).
    pub(crate) fn release(&mut self) {
        if self.held.take().is_some() {
            debug!("sentinel released");
        }
    }

    /// Attempts to re-occupy a slot after a release. On table-full, leaves the sentinel vacated
    /// and returns `Err`, signaling the caller (the RecvQueue) to enter retry mode.
    pub(crate) fn reacquire(&mut self) -> Result<(), SentinelError> {
        if self.held.is_some() {
            return Ok(());
        }
        match descriptor::dup_any_open_fd() {
            Ok(fd) => {
                self.held = Some(fd);
                Ok(())
            }
            Err(nix::errno::Errno::EMFILE) | Err(nix::errno::Errno::ENFILE) => {
                warn!("sentinel reacquire failed: descriptor table full, entering retry mode");
                Err(SentinelError::TableFull)
            }
            Err(e) => Err(SentinelError::Io(e.into())),
        }
    }
}
