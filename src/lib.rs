//! A non-blocking, bidirectional, buffered channel for passing file descriptors between
//! cooperating UNIX processes.
//!
//! A [`Passer`] wraps one pre-established transport endpoint (a UNIX-domain socket under the
//! default BSD back-ends, or a STREAMS pipe under the `sysv` feature) with a FIFO send queue and
//! a FIFO receive queue. Pushing a descriptor to send, or registering interest in the next
//! incoming descriptor, never blocks and never recurses into the caller: the actual transfer
//! happens later, driven by whatever host event loop implements [`Reactor`].
//!
//! ```no_run
//! use fdpasser::{Config, Endpoints, Passer, TokioReactor};
//!
//! # async fn example() -> std::io::Result<()> {
//! let reactor = TokioReactor::new();
//! let passer = Passer::new(Config::new(Endpoints::None), reactor)?;
//! passer.i_am_parent()?;
//! passer.push_send_fh(std::fs::File::open("/etc/hosts")?.into(), None);
//! # Ok(())
//! # }
//! ```
//!
//! See the crate's design notes for the descriptor-table-exhaustion recovery protocol (the
//! "sentinel"), which is what lets this crate promise zero descriptor loss under load instead of
//! merely best-effort delivery.

mod descriptor;
mod error;
mod queue;
mod reactor;
mod rendezvous;
mod retry;
mod sentinel;
mod transport;

mod passer;

pub use error::PasserError;
pub use passer::{Config, Endpoints, Passer};
pub use reactor::{Reactor, TimerHandle};
pub use rendezvous::{accept, connect, server, socketpair, Listener};

#[cfg(feature = "tokio")]
pub use reactor::TokioReactor;

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::collections::HashMap;
    use std::os::fd::{AsRawFd, RawFd};
    use std::rc::Rc;
    use std::time::Duration;

    /// A [`Reactor`] that never actually waits for readiness: arming a watcher just records the
    /// callback, and the test fires it explicitly via [`fire_read`](StubReactor::fire_read) /
    /// [`fire_write`](StubReactor::fire_write) standing in for the kernel reporting readiness.
    /// Cheaply cloneable (it's an `Rc` underneath) so a test can hand one clone to a `Passer` and
    /// keep another to drive it, the same shared-state split `Passer` itself uses internally.
    #[derive(Clone, Default)]
    struct StubReactor(Rc<RefCell<StubReactorState>>);

    #[derive(Default)]
    struct StubReactorState {
        reads: HashMap<RawFd, Box<dyn FnMut()>>,
        writes: HashMap<RawFd, Box<dyn FnMut()>>,
        timers: Vec<Box<dyn FnMut()>>,
    }

    struct StubTimerHandle {
        state: Rc<RefCell<StubReactorState>>,
        index: usize,
    }

    impl TimerHandle for StubTimerHandle {
        fn cancel(&mut self) {
            self.state.borrow_mut().timers[self.index] = Box::new(|| {});
        }
    }

    impl Reactor for StubReactor {
        fn arm_read(&mut self, fd: RawFd, callback: Box<dyn FnMut()>) {
            self.0.borrow_mut().reads.insert(fd, callback);
        }

        fn arm_write(&mut self, fd: RawFd, callback: Box<dyn FnMut()>) {
            self.0.borrow_mut().writes.insert(fd, callback);
        }

        fn disarm_read(&mut self, fd: RawFd) {
            self.0.borrow_mut().reads.remove(&fd);
        }

        fn disarm_write(&mut self, fd: RawFd) {
            self.0.borrow_mut().writes.remove(&fd);
        }

        fn schedule_timer(
            &mut self,
            _interval: Duration,
            callback: Box<dyn FnMut()>,
        ) -> Box<dyn TimerHandle> {
            let mut state = self.0.borrow_mut();
            let index = state.timers.len();
            state.timers.push(callback);
            Box::new(StubTimerHandle {
                state: self.0.clone(),
                index,
            })
        }
    }

    impl StubReactor {
        fn fire_read(&self, fd: RawFd) {
            if let Some(callback) = self.0.borrow_mut().reads.get_mut(&fd) {
                callback();
            }
        }

        fn fire_write(&self, fd: RawFd) {
            if let Some(callback) = self.0.borrow_mut().writes.get_mut(&fd) {
                callback();
            }
        }
    }

    struct TestPair {
        parent: Passer<StubReactor>,
        parent_reactor: StubReactor,
        parent_fd: RawFd,
        child: Passer<StubReactor>,
        child_reactor: StubReactor,
        child_fd: RawFd,
    }

    fn new_pair() -> TestPair {
        let (a, b) = socketpair().expect("socketpair");
        let parent_fd = a.as_raw_fd();
        let child_fd = b.as_raw_fd();
        let parent_reactor = StubReactor::default();
        let child_reactor = StubReactor::default();
        let parent = Passer::new(Config::new(Endpoints::One(a)), parent_reactor.clone())
            .expect("construct parent passer");
        let child = Passer::new(Config::new(Endpoints::One(b)), child_reactor.clone())
            .expect("construct child passer");
        TestPair {
            parent,
            parent_reactor,
            parent_fd,
            child,
            child_reactor,
            child_fd,
        }
    }

    #[test]
    fn push_send_fh_returns_before_any_io_happens() {
        let pair = new_pair();
        let fired = Rc::new(RefCell::new(false));
        let fired_clone = fired.clone();
        let fd = std::fs::File::open("/dev/null").expect("/dev/null").into();
        pair.parent.push_send_fh(
            fd,
            Some(Box::new(move |_| {
                *fired_clone.borrow_mut() = true;
            })),
        );
        // The callback only fires once the reactor reports write-readiness; a bare push must not
        // invoke it synchronously (property 2).
        assert!(!*fired.borrow());
    }

    #[test]
    fn fifo_order_is_preserved_across_three_descriptors() {
        let pair = new_pair();
        let delivered = Rc::new(RefCell::new(Vec::new()));

        for i in 0..3u8 {
            let fd = std::fs::File::open("/dev/null").expect("/dev/null").into();
            pair.parent.push_send_fh(fd, None);
            let delivered = delivered.clone();
            pair.child.push_recv_fh(Box::new(move |result| {
                delivered.borrow_mut().push((i, result.is_ok()));
            }));
        }

        // Each queue drains fully on one readiness notification; neither watcher needs to fire
        // more than once for three small messages on a freshly connected socketpair.
        pair.parent_reactor.fire_write(pair.parent_fd);
        pair.child_reactor.fire_read(pair.child_fd);

        let delivered = delivered.borrow();
        assert_eq!(delivered.len(), 3);
        for (i, (idx, ok)) in delivered.iter().enumerate() {
            assert_eq!(*idx as usize, i);
            assert!(ok);
        }
    }

    #[test]
    fn shutdown_fails_pending_waiters_on_both_sides() {
        let pair = new_pair();
        let send_result = Rc::new(RefCell::new(None));
        let send_result_clone = send_result.clone();
        let fd = std::fs::File::open("/dev/null").expect("/dev/null").into();
        pair.parent.push_send_fh(
            fd,
            Some(Box::new(move |result| {
                *send_result_clone.borrow_mut() = Some(result.is_ok());
            })),
        );

        pair.parent.shutdown();

        assert_eq!(*send_result.borrow(), Some(false));

        // A second shutdown is a documented no-op, not a double-invocation of `on_error`.
        pair.parent.shutdown();
    }

    #[test]
    fn push_after_shutdown_fails_immediately_without_touching_the_reactor() {
        let pair = new_pair();
        pair.parent.shutdown();

        let result = Rc::new(RefCell::new(None));
        let result_clone = result.clone();
        pair.child.push_recv_fh(Box::new(move |r| {
            *result_clone.borrow_mut() = Some(r.is_ok());
        }));
        // The child side was never shut down; it is `parent` that was, so this only exercises
        // that pushing to an already-shutdown Passer resolves immediately with failure, on
        // `parent` itself.
        let parent_result = Rc::new(RefCell::new(None));
        let parent_result_clone = parent_result.clone();
        pair.parent.push_recv_fh(Box::new(move |r| {
            *parent_result_clone.borrow_mut() = Some(r.is_ok());
        }));
        assert_eq!(*parent_result.borrow(), Some(false));
        assert!(result.borrow().is_none());
    }
}
