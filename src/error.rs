// baton/src/error.rs
//
//! Various errors that methods can produce.

/// Various errors that methods can produce.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Error {
    /// A blocking acquire was cancelled before the context became available,
    /// because the hand-off was shut down.
    ///
    /// The caller must abandon the operation it wanted the context for. No
    /// permit was consumed and the context must not be touched.
    WaitInterrupted,
    /// A bounded acquire gave up after its timeout elapsed.
    ///
    /// This is an expected, recoverable condition rather than a fault; the
    /// typical response is to skip the operation (for example a resize) and
    /// try again on the next event.
    WaitTimedOut,
    /// The underlying make-current, detach or swap operation failed.
    ///
    /// By the time this error surfaces, the paired release has already
    /// happened; later acquirers are never blocked by a failed section.
    ContextOperationFailed,
}
