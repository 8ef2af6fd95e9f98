//! Order-preserving queue of descriptors awaiting an atomic send.

use crate::error::{PasserError, TransportOutcome};
use crate::transport;
use std::collections::VecDeque;
use std::os::fd::{AsRawFd, OwnedFd, RawFd};
use std::sync::Arc;
use tracing::{debug, error};

/// A descriptor queued for send, with an optional one-shot completion notification.
struct SendEntry {
    fd: OwnedFd,
    callback: Option<Box<dyn FnOnce(Result<(), Arc<PasserError>>)>>,
}

/// What happened after attempting to drain as much of the queue as the kernel currently accepts.
pub(crate) enum SendDrainOutcome {
    /// Queue emptied; caller should disarm the write watcher.
    Empty,
    /// The kernel is not ready to accept another send; watcher stays armed.
    Blocked,
    /// Unrecoverable transport error; the Passer must shut down.
    Fatal(Arc<PasserError>),
}

#[derive(Default)]
pub(crate) struct SendQueue {
    entries: VecDeque<SendEntry>,
}

impl SendQueue {
    /// Appends a descriptor to send. Returns `true` if the queue was empty before this push
    /// (i.e. the caller must arm the write watcher).
    pub(crate) fn push(
        &mut self,
        fd: OwnedFd,
        callback: Option<Box<dyn FnOnce(Result<(), Arc<PasserError>>)>>,
    ) -> bool {
        let was_empty = self.entries.is_empty();
        self.entries.push_back(SendEntry { fd, callback });
        was_empty
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Sends as many queued descriptors as the kernel currently accepts, in order, stopping at
    /// the first `WouldBlock`, an empty queue, or a fatal error.
    pub(crate) fn drain(&mut self, endpoint: RawFd) -> SendDrainOutcome {
        loop {
            let Some(entry) = self.entries.front() else {
                return SendDrainOutcome::Empty;
            };
            match transport::send_one(endpoint, entry.fd.as_raw_fd()) {
                TransportOutcome::Ok(()) => {
                    let entry = self.entries.pop_front().expect("front just matched");
                    // The descriptor is closed here by dropping `entry.fd`, after the kernel
                    // send completed and before the completion callback runs (property 7, S4).
                    drop(entry.fd);
                    debug!("descriptor sent");
                    if let Some(callback) = entry.callback {
                        callback(Ok(()));
                    }
                }
                TransportOutcome::WouldBlock => return SendDrainOutcome::Blocked,
                TransportOutcome::TableFull => {
                    // Sends never observe TableFull in any of the three back-ends; treat it as
                    // Fatal defensively rather than silently looping.
                    error!("send_one unexpectedly reported TableFull");
                    let reason = Arc::new(PasserError::Fatal(std::io::Error::new(
                        std::io::ErrorKind::Other,
                        "transport reported TableFull on send",
                    )));
                    return SendDrainOutcome::Fatal(reason);
                }
                TransportOutcome::Eof => {
                    // `Eof` is only ever produced by a receive attempt; a send observing it
                    // would mean the transport back-end misclassified a write outcome.
                    error!("send_one unexpectedly reported Eof");
                    let reason = Arc::new(PasserError::Fatal(std::io::Error::new(
                        std::io::ErrorKind::Other,
                        "transport reported Eof on send",
                    )));
                    return SendDrainOutcome::Fatal(reason);
                }
                TransportOutcome::Fatal(err) => {
                    let entry = self.entries.pop_front().expect("front just matched");
                    drop(entry.fd);
                    // The head may have been partially processed by the kernel before the
                    // error; the chosen policy (see design notes) is to close it and report
                    // failure to its completion callback rather than retry or re-queue it.
                    let reason = Arc::new(PasserError::Fatal(err));
                    if let Some(callback) = entry.callback {
                        callback(Err(reason.clone()));
                    }
                    return SendDrainOutcome::Fatal(reason);
                }
            }
        }
    }

    /// Drains the queue on shutdown: every remaining descriptor is closed and its completion
    /// callback (if any) is invoked with failure.
    pub(crate) fn shutdown(&mut self, reason: Arc<PasserError>) {
        for entry in self.entries.drain(..) {
            drop(entry.fd);
            if let Some(callback) = entry.callback {
                callback(Err(reason.clone()));
            }
        }
    }
}
