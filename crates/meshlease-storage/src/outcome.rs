//! Tagged outcome for store operations that may legitimately find nothing.
//!
//! Allocation and reuse scans need to tell "no row" apart from "transport
//! failed": an empty pool of expired leases is not an error and must not
//! spin the caller's retry loop, while a dropped connection is transient
//! and should be retried, and a violated constraint is fatal and must not
//! be retried at all.

use crate::error::StorageError;

/// Outcome of a store operation that may find a row, find nothing, or fail.
#[derive(Debug)]
pub enum AllocationOutcome<T> {
    /// The operation found and returned a row.
    Found(T),
    /// The operation completed successfully but found nothing to return.
    Empty,
    /// A retryable transport failure (connection drop, timeout, deadlock).
    TransientFault(StorageError),
    /// A non-retryable failure (constraint violation, exhausted counter).
    FatalFault(StorageError),
}

impl<T> AllocationOutcome<T> {
    /// Whether this outcome should count against a caller's retry budget.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::TransientFault(_))
    }

    /// Map the `Found` payload, leaving other variants untouched.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> AllocationOutcome<U> {
        match self {
            Self::Found(v) => AllocationOutcome::Found(f(v)),
            Self::Empty => AllocationOutcome::Empty,
            Self::TransientFault(e) => AllocationOutcome::TransientFault(e),
            Self::FatalFault(e) => AllocationOutcome::FatalFault(e),
        }
    }
}

/// Classify a `sqlx::Error` as transient or fatal for retry purposes.
///
/// Connection-level failures, pool timeouts, and serialization conflicts are
/// transient. Everything else (constraint violations, type mismatches,
/// protocol errors) is treated as fatal — retrying it would just fail again.
#[must_use]
pub fn classify_sqlx_error(op: &'static str, err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Io(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed => true,
        sqlx::Error::Database(db_err) => {
            // Postgres SQLSTATE 40001 = serialization_failure, 40P01 = deadlock_detected.
            matches!(db_err.code().as_deref(), Some("40001") | Some("40P01"))
        }
        _ => {
            let _ = op;
            false
        }
    }
}
