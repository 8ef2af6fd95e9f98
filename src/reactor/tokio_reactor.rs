//! Default [`Reactor`] backed by `tokio`'s readiness polling, gated behind the `tokio` feature.
//!
//! Mirrors the way this ecosystem's own async fd-passing wrappers bridge a synchronous
//! `sendmsg`/`recvmsg`-based transport into an async runtime: wrap the raw descriptor in a
//! [`tokio::io::unix::AsyncFd`] purely for readiness notification (it neither owns nor closes the
//! descriptor) and drive the watcher loop as a task on a [`tokio::task::LocalSet`], since the
//! callbacks this crate hands in are not required to be `Send` — the whole point of the
//! single-threaded cooperative model.

use crate::reactor::{Reactor, TimerHandle};
use std::collections::HashMap;
use std::os::fd::{AsRawFd, RawFd};
use std::time::Duration;
use tokio::io::unix::AsyncFd;
use tokio::task::JoinHandle;

/// Lets [`AsyncFd`] watch a bare `RawFd` without taking ownership of it; the `Passer` (or
/// whatever owns the endpoint) is responsible for the descriptor's lifetime.
struct BorrowedRawFd(RawFd);

impl AsRawFd for BorrowedRawFd {
    fn as_raw_fd(&self) -> RawFd {
        self.0
    }
}

struct SpawnedWatcher(JoinHandle<()>);

impl TimerHandle for SpawnedWatcher {
    fn cancel(&mut self) {
        self.0.abort();
    }
}

/// A [`Reactor`] that must be constructed and used from within a [`tokio::task::LocalSet`].
#[derive(Default)]
pub struct TokioReactor {
    read_watchers: HashMap<RawFd, JoinHandle<()>>,
    write_watchers: HashMap<RawFd, JoinHandle<()>>,
}

impl TokioReactor {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Reactor for TokioReactor {
    fn arm_read(&mut self, fd: RawFd, mut callback: Box<dyn FnMut()>) {
        self.disarm_read(fd);
        let handle = tokio::task::spawn_local(async move {
            let async_fd = match AsyncFd::new(BorrowedRawFd(fd)) {
                Ok(async_fd) => async_fd,
                Err(err) => {
                    tracing::error!(%err, "failed to register fd for read readiness");
                    return;
                }
            };
            loop {
                match async_fd.readable().await {
                    Ok(mut guard) => {
                        callback();
                        guard.clear_ready();
                    }
                    Err(err) => {
                        tracing::error!(%err, "read readiness poll failed");
                        return;
                    }
                }
            }
        });
        self.read_watchers.insert(fd, handle);
    }

    fn arm_write(&mut self, fd: RawFd, mut callback: Box<dyn FnMut()>) {
        self.disarm_write(fd);
        let handle = tokio::task::spawn_local(async move {
            let async_fd = match AsyncFd::new(BorrowedRawFd(fd)) {
                Ok(async_fd) => async_fd,
                Err(err) => {
                    tracing::error!(%err, "failed to register fd for write readiness");
                    return;
                }
            };
            loop {
                match async_fd.writable().await {
                    Ok(mut guard) => {
                        callback();
                        guard.clear_ready();
                    }
                    Err(err) => {
                        tracing::error!(%err, "write readiness poll failed");
                        return;
                    }
                }
            }
        });
        self.write_watchers.insert(fd, handle);
    }

    fn disarm_read(&mut self, fd: RawFd) {
        if let Some(handle) = self.read_watchers.remove(&fd) {
            handle.abort();
        }
    }

    fn disarm_write(&mut self, fd: RawFd) {
        if let Some(handle) = self.write_watchers.remove(&fd) {
            handle.abort();
        }
    }

    fn schedule_timer(
        &mut self,
        interval: Duration,
        mut callback: Box<dyn FnMut()>,
    ) -> Box<dyn TimerHandle> {
        let handle = tokio::task::spawn_local(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await; // first tick fires immediately; skip it after one interval
            loop {
                ticker.tick().await;
                callback();
            }
        });
        Box::new(SpawnedWatcher(handle))
    }
}

impl Drop for TokioReactor {
    fn drop(&mut self) {
        for (_, handle) in self.read_watchers.drain() {
            handle.abort();
        }
        for (_, handle) in self.write_watchers.drain() {
            handle.abort();
        }
    }
}
