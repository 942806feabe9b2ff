//! Tagged outcome for cache reads.
//!
//! A cache read can legitimately miss; that is not the same thing as the
//! cache being unreachable. The hybrid repository treats both the same way
//! (fall through to the durable store) but logs them differently, so the
//! distinction is kept at the type level rather than collapsed early.

use crate::error::CacheError;

/// Outcome of a cache read.
#[derive(Debug)]
pub enum CacheOutcome<T> {
    /// The key was present and decoded successfully.
    Hit(T),
    /// The key was absent.
    Miss,
    /// The cache could not be reached or returned malformed data.
    Fault(CacheError),
}

impl<T> CacheOutcome<T> {
    /// Collapse hit/miss/fault into `Option<T>`, discarding the distinction
    /// between a clean miss and a fault — used by callers that only care
    /// whether they must fall through to the durable store.
    #[must_use]
    pub fn into_option(self) -> Option<T> {
        match self {
            Self::Hit(v) => Some(v),
            Self::Miss | Self::Fault(_) => None,
        }
    }
}
