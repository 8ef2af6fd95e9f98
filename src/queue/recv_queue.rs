//! Order-preserving queue of waiters for an incoming descriptor.
//!
//! This is the half of the crate where the sentinel trick actually pays off: every drain
//! iteration releases the sentinel *before* attempting a receive, guaranteeing a free descriptor
//! slot for whatever the kernel is about to hand us.

use crate::error::{PasserError, SentinelError, TransportOutcome};
use crate::sentinel::Sentinel;
use crate::transport;
use std::collections::VecDeque;
use std::os::fd::{OwnedFd, RawFd};
use std::sync::Arc;
use tracing::{debug, error, warn};

type RecvWaiter = Box<dyn FnOnce(Result<OwnedFd, Arc<PasserError>>)>;

/// What the Passer should do after a drain attempt.
pub(crate) enum RecvDrainOutcome {
    /// Queue emptied, or the kernel is not ready; no state change needed.
    Idle,
    /// Sentinel reacquisition failed; the Passer must enter retry mode and stop honoring read
    /// readiness until the retry timer succeeds.
    EnterRetry,
    /// The peer closed its end of the endpoint cleanly; the Passer must shut down with a null
    /// reason (`on_error(None)`), not a `Fatal` one.
    OrderlyShutdown,
    /// Unrecoverable transport error; the Passer must shut down.
    Fatal(Arc<PasserError>),
}

#[derive(Default)]
pub(crate) struct RecvQueue {
    waiters: VecDeque<RecvWaiter>,
}

impl RecvQueue {
    /// Appends a waiter. Returns `true` if the queue was empty before this push (i.e. the
    /// caller must arm the read watcher, unless currently in retry mode).
    pub(crate) fn push(&mut self, callback: RecvWaiter) -> bool {
        let was_empty = self.waiters.is_empty();
        self.waiters.push_back(callback);
        was_empty
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.waiters.is_empty()
    }

    /// Drains as many incoming descriptors as the kernel currently has ready, dispatching each
    /// to the next waiter in FIFO order. Stops at the first `WouldBlock`, an empty queue, retry
    /// entry, orderly peer shutdown, or fatal error.
    pub(crate) fn drain(&mut self, endpoint: RawFd, sentinel: &mut Sentinel) -> RecvDrainOutcome {
        loop {
            if self.waiters.is_empty() {
                return RecvDrainOutcome::Idle;
            }

            // Step 1: release the sentinel before touching the kernel, so a free slot exists
            // for whatever is about to arrive.
            sentinel.release();

            // Step 2: attempt the receive.
            let recv_result = transport::recv_one(endpoint);

            // Step 3: attempt to reacquire the sentinel regardless of the receive outcome.
            let reacquire_result = sentinel.reacquire();

            match (recv_result, reacquire_result) {
                (TransportOutcome::Ok(fd), Ok(())) => {
                    self.dispatch_one(Ok(fd));
                    debug!("descriptor received, sentinel reacquired");
                }
                (TransportOutcome::Ok(fd), Err(SentinelError::TableFull)) => {
                    self.dispatch_one(Ok(fd));
                    warn!(
                        "descriptor received but sentinel could not be reacquired; entering retry mode"
                    );
                    return RecvDrainOutcome::EnterRetry;
                }
                (TransportOutcome::Ok(fd), Err(SentinelError::Io(io_err))) => {
                    self.dispatch_one(Ok(fd));
                    return RecvDrainOutcome::Fatal(Arc::new(PasserError::Fatal(io_err)));
                }
                (TransportOutcome::WouldBlock, Ok(())) => {
                    return RecvDrainOutcome::Idle;
                }
                (TransportOutcome::WouldBlock, Err(_)) => {
                    return RecvDrainOutcome::EnterRetry;
                }
                (TransportOutcome::TableFull, _) => {
                    // Releasing the sentinel first is supposed to make this unreachable: there
                    // was always a free slot for the kernel to admit the incoming descriptor
                    // into. If it happens anyway, something violated the caller contract (e.g.
                    // a concurrent descriptor creation consumed the freed slot); surface Fatal
                    // rather than silently dropping the in-flight descriptor.
                    error!("recv_one reported TableFull immediately after sentinel release");
                    return RecvDrainOutcome::Fatal(Arc::new(PasserError::Fatal(
                        std::io::Error::new(
                            std::io::ErrorKind::Other,
                            "received TableFull despite a released sentinel slot",
                        ),
                    )));
                }
                (TransportOutcome::Eof, _) => {
                    debug!("peer closed the fd-passing endpoint");
                    return RecvDrainOutcome::OrderlyShutdown;
                }
                (TransportOutcome::Fatal(err), _) => {
                    return RecvDrainOutcome::Fatal(Arc::new(PasserError::Fatal(err)));
                }
            }
        }
    }

    fn dispatch_one(&mut self, result: Result<OwnedFd, Arc<PasserError>>) {
        if let Some(waiter) = self.waiters.pop_front() {
            waiter(result);
        }
    }

    /// Notifies every pending waiter of failure, without attempting any further I/O. Used on
    /// shutdown.
    pub(crate) fn shutdown(&mut self, reason: Arc<PasserError>) {
        for waiter in self.waiters.drain(..) {
            waiter(Err(reason.clone()));
        }
    }
}
