//! The composite object exposing buffered send/recv queues over one transport endpoint.
//!
//! A [`Passer`] is a cheap, cloneable handle (an [`Rc`] under the hood) around shared, singly
//! owned state. This mirrors the single-threaded cooperative model directly in the type:
//! there is no `Send`/`Sync` bound anywhere, a `RefCell` stands in for the locking a
//! multi-threaded design would need, and the watcher callbacks registered with the [`Reactor`]
//! hold only a [`Weak`] reference back in, so a `Passer` with no remaining strong handles tears
//! down its registrations instead of leaking a reference cycle through the reactor.

use crate::error::PasserError;
use crate::queue::{RecvDrainOutcome, RecvQueue, SendDrainOutcome, SendQueue};
use crate::reactor::Reactor;
use crate::rendezvous;
use crate::retry::{RetryTimer, DEFAULT_RETRY_INTERVAL};
use crate::sentinel::Sentinel;
use crate::descriptor;
use std::cell::RefCell;
use std::io;
use std::os::fd::{AsRawFd, OwnedFd, RawFd};
use std::rc::{Rc, Weak};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// How the transport endpoint(s) were supplied to [`Passer::new`].
pub enum Endpoints {
    /// Create a fresh paired transport (a `socketpair`/pipe pair); the caller is expected to
    /// `fork` and resolve the role with `i_am_parent`/`i_am_child`.
    None,
    /// The connection was already established out-of-band (e.g. via [`crate::rendezvous`]); no
    /// role call is needed, the Passer is immediately `Single`.
    One(OwnedFd),
    /// Caller-supplied pair; as with `None`, the caller is expected to `fork` and resolve the
    /// role afterward.
    Two(OwnedFd, OwnedFd),
}

/// Construction options for a [`Passer`].
pub struct Config {
    pub fh: Endpoints,
    /// Skip putting the endpoint(s) into non-blocking mode. Not recommended: spurious readiness
    /// deliveries from some host loops can then cause a blocking syscall.
    pub dont_set_nonblocking: bool,
    /// Invoked exactly once, when the Passer shuts down: `None` for an orderly shutdown
    /// (explicit `shutdown()` or a clean peer close), `Some(reason)` otherwise.
    pub on_error: Option<Box<dyn FnMut(Option<Arc<PasserError>>)>>,
}

impl Config {
    pub fn new(fh: Endpoints) -> Self {
        Config {
            fh,
            dont_set_nonblocking: false,
            on_error: None,
        }
    }

    pub fn dont_set_nonblocking(mut self, value: bool) -> Self {
        self.dont_set_nonblocking = value;
        self
    }

    pub fn on_error(mut self, callback: impl FnMut(Option<Arc<PasserError>>) + 'static) -> Self {
        self.on_error = Some(Box::new(callback));
        self
    }
}

/// The Passer's coarse lifecycle state.
enum Role {
    /// Holds the paired endpoints until `i_am_parent`/`i_am_child` resolves which one survives.
    AwaitingRole { a: OwnedFd, b: OwnedFd },
    Single,
    Parent,
    Child,
    Shutdown,
}

impl Role {
    fn name(&self) -> &'static str {
        match self {
            Role::AwaitingRole { .. } => "Unconfigured",
            Role::Single => "Single",
            Role::Parent => "Parent",
            Role::Child => "Child",
            Role::Shutdown => "Shutdown",
        }
    }
}

/// The queues, sentinel, and readiness bookkeeping that exist only once a role has settled.
struct Channel {
    endpoint: OwnedFd,
    send_queue: SendQueue,
    recv_queue: RecvQueue,
    sentinel: Sentinel,
    retry: RetryTimer,
    read_armed: bool,
    write_armed: bool,
}

impl Channel {
    fn new(endpoint: OwnedFd, dont_set_nonblocking: bool) -> io::Result<Self> {
        if !dont_set_nonblocking {
            descriptor::set_nonblocking(endpoint.as_raw_fd())?;
        }
        let sentinel = Sentinel::new().map_err(io::Error::from)?;
        Ok(Channel {
            endpoint,
            send_queue: SendQueue::default(),
            recv_queue: RecvQueue::default(),
            sentinel,
            retry: RetryTimer::default(),
            read_armed: false,
            write_armed: false,
        })
    }

    fn fd(&self) -> RawFd {
        self.endpoint.as_raw_fd()
    }
}

struct Inner<R: Reactor> {
    role: Role,
    channel: Option<Channel>,
    reactor: R,
    dont_set_nonblocking: bool,
    on_error: Option<Box<dyn FnMut(Option<Arc<PasserError>>)>>,
}

/// A buffered, bidirectional, non-blocking channel for transferring descriptors to a peer
/// process.
///
/// Cloning a `Passer` shares the same underlying channel; all clones observe the same queues and
/// the same shutdown. This is the crate's equivalent of a reference-counted client handle.
pub struct Passer<R: Reactor + 'static> {
    inner: Rc<RefCell<Inner<R>>>,
}

impl<R: Reactor + 'static> Clone for Passer<R> {
    fn clone(&self) -> Self {
        Passer {
            inner: self.inner.clone(),
        }
    }
}

impl<R: Reactor + 'static> Passer<R> {
    /// Constructs a new Passer per the construction lifecycle.
    pub fn new(config: Config, reactor: R) -> io::Result<Self> {
        let dont_set_nonblocking = config.dont_set_nonblocking;
        let (role, channel) = match config.fh {
            Endpoints::None => {
                let (a, b) = rendezvous::socketpair()?;
                (Role::AwaitingRole { a, b }, None)
            }
            Endpoints::Two(a, b) => (Role::AwaitingRole { a, b }, None),
            Endpoints::One(fd) => {
                let channel = Channel::new(fd, dont_set_nonblocking)?;
                (Role::Single, Some(channel))
            }
        };

        let inner = Rc::new(RefCell::new(Inner {
            role,
            channel,
            reactor,
            dont_set_nonblocking,
            on_error: config.on_error,
        }));

        Ok(Passer { inner })
    }

    /// Resolves a paired, role-awaiting Passer as the parent: keeps endpoint `a`, closes `b`.
    ///
    /// # Panics
    /// Panics (`ProgrammerError`) if the Passer was not constructed with two endpoints still
    /// awaiting a role.
    pub fn i_am_parent(&self) -> io::Result<()> {
        self.settle_role(true)
    }

    /// Resolves a paired, role-awaiting Passer as the child: keeps endpoint `b`, closes `a`.
    ///
    /// # Panics
    /// Panics (`ProgrammerError`) if the Passer was not constructed with two endpoints still
    /// awaiting a role.
    pub fn i_am_child(&self) -> io::Result<()> {
        self.settle_role(false)
    }

    fn settle_role(&self, as_parent: bool) -> io::Result<()> {
        let mut inner = self.inner.borrow_mut();
        let role = std::mem::replace(&mut inner.role, Role::Shutdown);
        let (kept, role_name) = match role {
            Role::AwaitingRole { a, b } => {
                if as_parent {
                    drop(b);
                    (a, Role::Parent)
                } else {
                    drop(a);
                    (b, Role::Child)
                }
            }
            other => {
                // restore the state we clobbered with the placeholder before panicking, so a
                // caller that (incorrectly) catches the panic doesn't observe a corrupted Passer.
                inner.role = other;
                PasserError::panic_programmer_error(
                    "i_am_parent/i_am_child called on a Passer that is not awaiting a role",
                );
            }
        };
        let channel = Channel::new(kept, inner.dont_set_nonblocking)?;
        inner.channel = Some(channel);
        inner.role = role_name;
        info!(role = inner.role.name(), "fd-passing role settled");
        Ok(())
    }

    /// Enqueues `fd` for send; ownership of `fd` transfers to the Passer. `callback`, if
    /// provided, fires exactly once after the kernel send completes (with the source descriptor
    /// already closed) or the Passer shuts down before flushing it.
    ///
    /// Never blocks; the actual transfer happens on a later write-readiness callback.
    pub fn push_send_fh(
        &self,
        fd: OwnedFd,
        callback: Option<Box<dyn FnOnce(Result<(), Arc<PasserError>>)>>,
    ) {
        let mut inner = self.inner.borrow_mut();
        if matches!(inner.role, Role::Shutdown) {
            if let Some(callback) = callback {
                callback(Err(Arc::new(PasserError::OrderlyShutdown)));
            }
            return;
        }
        if inner.channel.is_none() {
            PasserError::panic_programmer_error(
                "push_send_fh called before a role was settled on a paired Passer",
            );
        }
        let needs_arm = {
            let channel = inner.channel.as_mut().expect("checked above");
            channel.send_queue.push(fd, callback)
        };
        if needs_arm {
            self.arm_write(&mut inner);
        }
    }

    /// Enqueues a delivery callback awaiting the next incoming descriptor. `callback` fires
    /// exactly once: with a descriptor, or with a failure indication if the Passer shuts down
    /// first.
    ///
    /// Never blocks; the actual delivery happens on a later read-readiness callback (or, while
    /// in retry mode, once sentinel reacquisition succeeds).
    pub fn push_recv_fh(
        &self,
        callback: Box<dyn FnOnce(Result<OwnedFd, Arc<PasserError>>)>,
    ) {
        let mut inner = self.inner.borrow_mut();
        if matches!(inner.role, Role::Shutdown) {
            callback(Err(Arc::new(PasserError::OrderlyShutdown)));
            return;
        }
        if inner.channel.is_none() {
            PasserError::panic_programmer_error(
                "push_recv_fh called before a role was settled on a paired Passer",
            );
        }
        let (needs_arm, in_retry) = {
            let channel = inner.channel.as_mut().expect("checked above");
            let needs_arm = channel.recv_queue.push(callback);
            (needs_arm, channel.retry.is_active())
        };
        if needs_arm && !in_retry {
            self.arm_read(&mut inner);
        }
    }

    /// Cancels the Passer: closes queued send descriptors, fails pending recv waiters, releases
    /// the sentinel, deregisters watchers, closes the endpoint, and invokes `on_error(None)`.
    /// A no-op if the Passer has already shut down.
    pub fn shutdown(&self) {
        self.shutdown_internal(None);
    }

    fn shutdown_internal(&self, reason: Option<Arc<PasserError>>) {
        let mut inner = self.inner.borrow_mut();
        if matches!(inner.role, Role::Shutdown) {
            return;
        }
        if let Some(reason) = &reason {
            warn!(%reason, "fd-passing channel shutting down");
        } else {
            debug!("fd-passing channel shutting down (orderly)");
        }

        if let Some(mut channel) = inner.channel.take() {
            let fd = channel.fd();
            if channel.read_armed {
                inner.reactor.disarm_read(fd);
            }
            if channel.write_armed {
                inner.reactor.disarm_write(fd);
            }
            channel.retry.cancel();
            channel.sentinel.release();

            let queue_reason = reason
                .clone()
                .unwrap_or_else(|| Arc::new(PasserError::OrderlyShutdown));
            channel.send_queue.shutdown(queue_reason.clone());
            channel.recv_queue.shutdown(queue_reason);
            // `channel.endpoint` closes here, once every queue and watcher referencing it has
            // already been torn down.
        } else if let Role::AwaitingRole { .. } = &inner.role {
            // Never armed any watcher, never opened a sentinel; nothing to release beyond the
            // endpoints themselves, which drop along with the replaced `Role` below.
        }

        inner.role = Role::Shutdown;
        if let Some(on_error) = inner.on_error.as_mut() {
            on_error(reason);
        }
    }

    fn arm_read(&self, inner: &mut Inner<R>) {
        let channel = inner.channel.as_mut().expect("arm_read requires a settled role");
        if channel.read_armed {
            return;
        }
        channel.read_armed = true;
        let fd = channel.fd();
        let weak = Rc::downgrade(&self.inner);
        inner
            .reactor
            .arm_read(fd, Box::new(move || Self::on_readable(&weak)));
    }

    fn arm_write(&self, inner: &mut Inner<R>) {
        let channel = inner.channel.as_mut().expect("arm_write requires a settled role");
        if channel.write_armed {
            return;
        }
        channel.write_armed = true;
        let fd = channel.fd();
        let weak = Rc::downgrade(&self.inner);
        inner
            .reactor
            .arm_write(fd, Box::new(move || Self::on_writable(&weak)));
    }

    fn on_writable(weak: &Weak<RefCell<Inner<R>>>) {
        let Some(inner_rc) = weak.upgrade() else {
            return;
        };
        let passer = Passer { inner: inner_rc };
        let mut inner = passer.inner.borrow_mut();
        let Some(channel) = inner.channel.as_mut() else {
            return;
        };
        let fd = channel.fd();
        match channel.send_queue.drain(fd) {
            SendDrainOutcome::Empty => {
                channel.write_armed = false;
                inner.reactor.disarm_write(fd);
            }
            SendDrainOutcome::Blocked => {
                // Watcher stays armed; the reactor will call back again on the next
                // write-readiness notification.
            }
            SendDrainOutcome::Fatal(reason) => {
                drop(inner);
                passer.shutdown_internal(Some(reason));
            }
        }
    }

    fn on_readable(weak: &Weak<RefCell<Inner<R>>>) {
        let Some(inner_rc) = weak.upgrade() else {
            return;
        };
        let passer = Passer { inner: inner_rc };
        let mut inner = passer.inner.borrow_mut();
        let Some(channel) = inner.channel.as_mut() else {
            return;
        };
        if channel.retry.is_active() {
            // Retry mode takes read readiness off the table entirely until the timer succeeds.
            return;
        }
        let fd = channel.fd();
        let outcome = channel.recv_queue.drain(fd, &mut channel.sentinel);
        match outcome {
            RecvDrainOutcome::Idle => {
                let queue_empty = channel.recv_queue.is_empty();
                let already_armed = channel.read_armed;
                if queue_empty {
                    channel.read_armed = false;
                    inner.reactor.disarm_read(fd);
                } else if !already_armed {
                    // Reached when leaving retry mode (which disarms the read watcher) straight
                    // into a `WouldBlock`: waiters remain, so the watcher must be re-armed here
                    // or a later send from the peer would never be noticed (§4.6's "drain is
                    // resumed").
                    passer.arm_read(&mut inner);
                }
            }
            RecvDrainOutcome::EnterRetry => {
                channel.read_armed = false;
                inner.reactor.disarm_read(fd);
                Self::start_retry_timer(&mut inner, weak.clone());
            }
            RecvDrainOutcome::OrderlyShutdown => {
                drop(inner);
                passer.shutdown_internal(None);
            }
            RecvDrainOutcome::Fatal(reason) => {
                drop(inner);
                passer.shutdown_internal(Some(reason));
            }
        }
    }

    fn start_retry_timer(inner: &mut Inner<R>, weak: Weak<RefCell<Inner<R>>>) {
        let channel = inner.channel.as_mut().expect("retry requires a settled role");
        if channel.retry.is_active() {
            return;
        }
        let handle = inner
            .reactor
            .schedule_timer(DEFAULT_RETRY_INTERVAL, Box::new(move || Self::on_retry_tick(&weak)));
        channel.retry.set_handle(handle);
    }

    fn on_retry_tick(weak: &Weak<RefCell<Inner<R>>>) {
        let Some(inner_rc) = weak.upgrade() else {
            return;
        };
        let passer = Passer { inner: inner_rc };
        let mut inner = passer.inner.borrow_mut();
        let Some(channel) = inner.channel.as_mut() else {
            return;
        };
        match channel.sentinel.reacquire() {
            Ok(()) => {
                channel.retry.cancel();
                let has_waiters = !channel.recv_queue.is_empty();
                debug!("sentinel reacquired, leaving retry mode");
                drop(inner);
                if has_waiters {
                    Self::on_readable(weak);
                }
            }
            Err(_table_full) => {
                // Stay in retry mode; the timer (still scheduled) will try again.
            }
        }
    }
}

/// Convenience for transferring an already-connected endpoint on to a nested `Passer` (property
/// 5, "Passer-over-Passer"): build a `Config::new(Endpoints::One(fd))` from the received `fd`.
impl From<OwnedFd> for Config {
    fn from(fd: OwnedFd) -> Self {
        Config::new(Endpoints::One(fd))
    }
}
