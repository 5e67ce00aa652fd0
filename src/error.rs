//! Uniform error mapping for precondition violations and transient failures.

use thiserror::Error;

/// Result alias used throughout this crate.
pub type Result<T> = core::result::Result<T, Error>;

/// Errors returned by the barrier and read-write lock primitives.
///
/// Each variant corresponds to one row of the error table: precondition
/// violations and transient failures are reported here; allocation
/// failure during recursive-read tracking is never surfaced (it folds
/// into `untracked_count` instead, per the tracking design).
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// An argument failed a precondition check (e.g. a barrier count of
    /// zero, an out-of-range deadline, or an unrecognized attribute
    /// value).
    #[error("invalid argument")]
    InvalidArgument,

    /// `destroy` was called on a primitive that still has waiters, or a
    /// `try_*` acquisition could not be granted immediately.
    #[error("resource busy")]
    Busy,

    /// A timed acquisition did not succeed before its deadline.
    #[error("operation timed out")]
    TimedOut,

    /// A release was attempted by a thread that does not hold the lock
    /// in the way it is trying to release it.
    #[error("operation not permitted")]
    PermissionDenied,

    /// The requested attribute combination is recognized but not
    /// implemented (e.g. process-shared read-write locks).
    #[error("not supported")]
    NotSupported,
}
