//! Structured error types for the descriptor-passing channel.
//!
//! Per the error handling design: `TableFull` and `WouldBlock` are transient kinds that never
//! escape the queue internals. `OrderlyShutdown` and `Fatal` are the two reasons a [`Passer`]
//! transitions to its terminal state and are handed to the `on_error` callback.
//! `ProgrammerError` is reserved for contract violations and is surfaced by panicking, not by
//! a `Result`, matching the synchronous, non-recoverable nature of those mistakes.
//!
//! [`Passer`]: crate::passer::Passer

use std::io;

/// Outcome of a single atomic descriptor transfer attempt.
///
/// `TableFull` only ever arises from a receive attempt; nothing stops a kernel from reporting it
/// for a send too on some platforms, but this crate's three back-ends never observe that. `Eof`
/// likewise only arises from a receive attempt: the peer closed its end of the endpoint cleanly.
#[derive(Debug)]
pub(crate) enum TransportOutcome<T> {
    Ok(T),
    WouldBlock,
    TableFull,
    Eof,
    Fatal(io::Error),
}

/// Errors surfaced to a [`Passer`]'s `on_error` callback or returned from fallible setup calls.
///
/// [`Passer`]: crate::passer::Passer
#[derive(Debug, thiserror::Error)]
pub enum PasserError {
    /// The peer closed its endpoint in an orderly fashion (EOF on read, or a clean connection
    /// reset). Carries no further detail; this is the "reason is `None`" case of the on-error
    /// contract expressed as a distinguishable value for callers that want to match on it
    /// explicitly rather than treat `on_error(None)` as the only signal.
    #[error("peer closed the channel")]
    OrderlyShutdown,

    /// Any transport failure other than would-block, table-full, or orderly shutdown: a
    /// malformed ancillary-data message, a truncated receive, or an I/O error from the
    /// underlying syscall.
    #[error("fd-passing transport failed: {0}")]
    Fatal(#[source] io::Error),

    /// A caller of this crate broke the synchronous API contract (e.g. called `push_send_fh`
    /// before resolving `i_am_parent`/`i_am_child` on a two-endpoint Passer). These are bugs in
    /// the calling code, not recoverable runtime conditions.
    #[error("fdpasser contract violation: {0}")]
    ProgrammerError(&'static str),
}

impl PasserError {
    /// Panics with this error. Used at the one place in the crate where `ProgrammerError` is
    /// produced, so the panic message and the `Display` impl never drift apart.
    pub(crate) fn panic_programmer_error(message: &'static str) -> ! {
        panic!("{}", PasserError::ProgrammerError(message));
    }
}

/// Errors specific to sentinel slot management.
#[derive(Debug, thiserror::Error)]
pub(crate) enum SentinelError {
    #[error("process descriptor table is full")]
    TableFull,
    #[error("failed to manage sentinel descriptor: {0}")]
    Io(#[from] io::Error),
}
