//! Lease allocator service (fast path → reuse loop → new-allocation loop).
//!
//! Retries act only on [`AllocationOutcome::TransientFault`]; an `Empty`
//! result is a legitimate "nothing to reuse right now" and never counts
//! against the retry budget, and a `FatalFault` aborts immediately without
//! consuming further retries.

use std::sync::Arc;
use std::time::Duration;

use meshlease_storage::{AllocationOutcome, Lease};

use crate::error::AllocatorError;
use crate::repository::Repository;

/// Tunables for the allocator's retry loops.
#[derive(Debug, Clone, Copy)]
pub struct AllocatorConfig {
    pub max_retries: u32,
    pub retry_delay: Duration,
    pub lease_ttl_secs: i64,
}

/// Allocates or reuses a lease for a peer.
pub struct AllocatorService {
    repo: Arc<Repository>,
    config: AllocatorConfig,
}

impl AllocatorService {
    #[must_use]
    pub fn new(repo: Arc<Repository>, config: AllocatorConfig) -> Self {
        Self { repo, config }
    }

    /// Return a live lease for `peer_id`, allocating or reusing one if
    /// necessary.
    pub async fn allocate(&self, peer_id: &str) -> Result<Lease, AllocatorError> {
        if let AllocationOutcome::Found(lease) = self.repo.get_lease_by_peer(peer_id).await {
            return Ok(lease);
        }

        if let Some(lease) = self.reuse_loop(peer_id).await? {
            return Ok(lease);
        }

        self.new_allocation_loop(peer_id).await
    }

    async fn reuse_loop(&self, peer_id: &str) -> Result<Option<Lease>, AllocatorError> {
        for attempt in 0..self.config.max_retries {
            match self.repo.find_and_reuse_expired(peer_id, self.config.lease_ttl_secs).await {
                AllocationOutcome::Found(lease) => return Ok(Some(lease)),
                AllocationOutcome::Empty => return Ok(None),
                AllocationOutcome::TransientFault(_) => {
                    tokio::time::sleep(self.config.retry_delay).await;
                }
                AllocationOutcome::FatalFault(e) => return Err(e.into()),
            }
            tracing::debug!(peer_id, attempt, "reuse attempt did not yield a lease");
        }
        Ok(None)
    }

    async fn new_allocation_loop(&self, peer_id: &str) -> Result<Lease, AllocatorError> {
        let mut last_error = None;
        for attempt in 0..self.config.max_retries {
            match self.allocate_new(peer_id).await {
                AllocationOutcome::Found(lease) => return Ok(lease),
                AllocationOutcome::Empty => {
                    last_error = Some(AllocatorError::RetriesExhausted { attempts: attempt + 1 });
                }
                AllocationOutcome::TransientFault(e) => {
                    last_error = Some(AllocatorError::StoreUnavailable(e));
                    tokio::time::sleep(self.config.retry_delay).await;
                }
                AllocationOutcome::FatalFault(e) => return Err(e.into()),
            }
            tracing::debug!(peer_id, attempt, "allocation attempt did not succeed, retrying");
        }
        Err(last_error.unwrap_or(AllocatorError::RetriesExhausted { attempts: self.config.max_retries }))
    }

    /// Decrement the counter and insert the lease; returns the combined
    /// outcome so the caller can apply transient/fatal retry semantics
    /// without losing the distinction across the two sub-steps.
    async fn allocate_new(&self, peer_id: &str) -> AllocationOutcome<Lease> {
        let token_id = match self.repo.allocate_next().await {
            AllocationOutcome::Found(token_id) => token_id,
            AllocationOutcome::Empty => return AllocationOutcome::Empty,
            AllocationOutcome::TransientFault(e) => return AllocationOutcome::TransientFault(e),
            AllocationOutcome::FatalFault(e) => return AllocationOutcome::FatalFault(e),
        };

        self.repo.insert_lease(token_id, peer_id, self.config.lease_ttl_secs).await
    }
}
