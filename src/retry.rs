//! Recovery from descriptor-table-full conditions.
//!
//! A [`RetryTimer`] is purely bookkeeping around a [`TimerHandle`](crate::reactor::TimerHandle):
//! it exists so the `Passer` only ever has one timer scheduled at a time and can tell whether
//! retry mode is currently active without consulting the sentinel directly.

use crate::reactor::TimerHandle;
use std::time::Duration;

/// Default interval between sentinel reacquisition attempts while in retry mode. Within the
/// 100-500 ms range this crate family recommends; the exact value is implementation-chosen and
/// constant, not tunable per the retry timer's design (the descriptor-table-full condition it
/// reacts to is external and resolves on its own schedule).
pub const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_millis(200);

/// Tracks whether the Passer is currently in retry mode and owns the scheduled timer, if any.
#[derive(Default)]
pub(crate) struct RetryTimer {
    handle: Option<Box<dyn TimerHandle>>,
}

impl RetryTimer {
    pub(crate) fn is_active(&self) -> bool {
        self.handle.is_some()
    }

    /// Records that a timer has been scheduled. The caller is responsible for actually calling
    /// `Reactor::schedule_timer`; this just tracks the resulting handle.
    pub(crate) fn set_handle(&mut self, handle: Box<dyn TimerHandle>) {
        self.handle = Some(handle);
    }

    /// Cancels the timer, if one is scheduled, and clears retry mode.
    pub(crate) fn cancel(&mut self) {
        if let Some(mut handle) = self.handle.take() {
            handle.cancel();
        }
    }
}
