//! The host event-loop capability set this crate depends on.
//!
//! `Passer` never talks to a concrete async runtime directly; it talks to whatever implements
//! [`Reactor`]. This keeps the core usable from a raw `epoll` loop, `mio`, `tokio`, or anything
//! else that can deliver readiness callbacks and run a periodic timer, at the cost of the caller
//! wiring one up. The `tokio` Cargo feature ships a ready-made [`TokioReactor`] for the common
//! case.

use std::os::fd::RawFd;
use std::time::Duration;

/// Opaque handle to a scheduled timer, used only to cancel it.
pub trait TimerHandle {
    fn cancel(&mut self);
}

/// Capability set a host event loop must expose for a [`Passer`](crate::passer::Passer) to run.
///
/// Every method here is non-blocking and non-suspending: arming a watcher registers interest and
/// returns immediately, and the corresponding callback fires from whatever the `Reactor`
/// implementation uses to drive itself (a poll loop iteration, a runtime task wakeup, ...).
///
/// Implementations are not required to be `Send`/`Sync` — the concurrency model is single
/// threaded cooperative; a `Reactor` only ever drives one `Passer` from one logical thread
/// of control at a time.
pub trait Reactor {
    /// Registers interest in read-readiness on `fd`. Calling this while a read watcher is
    /// already armed on the same `fd` replaces the previous callback.
    fn arm_read(&mut self, fd: RawFd, callback: Box<dyn FnMut()>);

    /// Registers interest in write-readiness on `fd`, analogous to [`arm_read`](Reactor::arm_read).
    fn arm_write(&mut self, fd: RawFd, callback: Box<dyn FnMut()>);

    /// Deregisters any read-readiness interest previously armed on `fd`. A no-op if none was
    /// armed.
    fn disarm_read(&mut self, fd: RawFd);

    /// Deregisters any write-readiness interest previously armed on `fd`.
    fn disarm_write(&mut self, fd: RawFd);

    /// Schedules `callback` to run roughly every `interval`, starting after one `interval` has
    /// elapsed. Used exclusively by the retry timer.
    fn schedule_timer(&mut self, interval: Duration, callback: Box<dyn FnMut()>) -> Box<dyn TimerHandle>;
}

#[cfg(feature = "tokio")]
mod tokio_reactor;
#[cfg(feature = "tokio")]
pub use tokio_reactor::TokioReactor;
