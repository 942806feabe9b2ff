//! Hybrid repository: the single consistency contract between the durable
//! Postgres store and the Redis cache.
//!
//! Reads try the cache first and fall back to the store on any miss or
//! fault, warming the cache best-effort on the way back. Mutations always
//! hit the store first; cache updates and invalidations afterward are
//! best-effort and never turn a successful mutation into a failure. The
//! store is authoritative; the cache is an eventually-consistent mirror.

use std::sync::Arc;
use uuid::Uuid;

use meshlease_cache::{CacheOutcome, LeaseCache, NonceCache};
use meshlease_storage::{AllocationOutcome, Lease, LeaseStore, Nonce, NonceStore};

/// Composes a durable store with a cache behind the read-through /
/// write-through contract described above.
pub struct Repository {
    store: Arc<dyn LeaseStore + Send + Sync>,
    nonce_store: Arc<dyn NonceStore + Send + Sync>,
    lease_cache: Arc<dyn LeaseCache + Send + Sync>,
    nonce_cache: Arc<dyn NonceCache + Send + Sync>,
}

impl std::fmt::Debug for Repository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Repository").finish_non_exhaustive()
    }
}

impl Repository {
    #[must_use]
    pub fn new(
        store: Arc<dyn LeaseStore + Send + Sync>,
        nonce_store: Arc<dyn NonceStore + Send + Sync>,
        lease_cache: Arc<dyn LeaseCache + Send + Sync>,
        nonce_cache: Arc<dyn NonceCache + Send + Sync>,
    ) -> Self {
        Self { store, nonce_store, lease_cache, nonce_cache }
    }

    pub async fn get_lease_by_peer(&self, peer_id: &str) -> AllocationOutcome<Lease> {
        if let CacheOutcome::Hit(lease) = self.lease_cache.get_by_peer(peer_id).await {
            return AllocationOutcome::Found(lease);
        }
        let outcome = self.store.get_by_peer(peer_id).await;
        if let AllocationOutcome::Found(ref lease) = outcome {
            self.warm_lease(lease).await;
        }
        outcome
    }

    pub async fn get_lease_by_token(&self, token_id: i64) -> AllocationOutcome<Lease> {
        if let CacheOutcome::Hit(lease) = self.lease_cache.get_by_token(token_id).await {
            return AllocationOutcome::Found(lease);
        }
        let outcome = self.store.get_by_token(token_id).await;
        if let AllocationOutcome::Found(ref lease) = outcome {
            self.warm_lease(lease).await;
        }
        outcome
    }

    pub async fn allocate_next(&self) -> AllocationOutcome<i64> {
        self.store.allocate_next().await
    }

    pub async fn insert_lease(&self, token_id: i64, peer_id: &str, ttl_secs: i64) -> AllocationOutcome<Lease> {
        let outcome = self.store.insert_lease(token_id, peer_id, ttl_secs).await;
        if let AllocationOutcome::Found(ref lease) = outcome {
            self.warm_lease(lease).await;
        }
        outcome
    }

    /// Always routed to the store (a single atomic locate-and-reassign
    /// statement); the result is warmed into the cache on the way back.
    pub async fn find_and_reuse_expired(&self, peer_id: &str, ttl_secs: i64) -> AllocationOutcome<Lease> {
        let outcome = self.store.find_and_reuse_expired(peer_id, ttl_secs).await;
        if let AllocationOutcome::Found(ref lease) = outcome {
            self.warm_lease(lease).await;
        }
        outcome
    }

    pub async fn renew(&self, token_id: i64, peer_id: &str, ttl_secs: i64) -> AllocationOutcome<Lease> {
        let outcome = self.store.renew(token_id, peer_id, ttl_secs).await;
        if let AllocationOutcome::Found(ref lease) = outcome {
            self.warm_lease(lease).await;
        }
        outcome
    }

    pub async fn release(&self, token_id: i64, peer_id: &str) -> AllocationOutcome<()> {
        let outcome = self.store.release(token_id, peer_id).await;
        if matches!(outcome, AllocationOutcome::Found(())) {
            if let Err(e) = self.lease_cache.invalidate(token_id, peer_id).await {
                tracing::warn!(token_id, peer_id, error = %e, "best-effort cache invalidate failed after release");
            }
        }
        outcome
    }

    pub async fn get_nonce(&self, id: Uuid) -> AllocationOutcome<Nonce> {
        if let CacheOutcome::Hit(nonce) = self.nonce_cache.get(id).await {
            return AllocationOutcome::Found(nonce);
        }
        let outcome = self.nonce_store.get(id).await;
        if let AllocationOutcome::Found(ref nonce) = outcome {
            let ttl = (nonce.expires_at - chrono::Utc::now()).num_seconds();
            if let Err(e) = self.nonce_cache.set(nonce, ttl).await {
                tracing::warn!(nonce_id = %id, error = %e, "best-effort cache warm failed after nonce read");
            }
        }
        outcome
    }

    pub async fn create_nonce(&self, peer_id: &str, ttl_secs: i64) -> AllocationOutcome<Nonce> {
        let outcome = self.nonce_store.create(peer_id, ttl_secs).await;
        if let AllocationOutcome::Found(ref nonce) = outcome {
            if let Err(e) = self.nonce_cache.set(nonce, ttl_secs).await {
                tracing::warn!(peer_id, error = %e, "best-effort cache write failed after nonce create");
            }
        }
        outcome
    }

    pub async fn consume_nonce(&self, id: Uuid) -> AllocationOutcome<Nonce> {
        let outcome = self.nonce_store.consume(id).await;
        if matches!(outcome, AllocationOutcome::Found(_)) {
            if let Err(e) = self.nonce_cache.invalidate(id).await {
                tracing::warn!(nonce_id = %id, error = %e, "best-effort cache invalidate failed after nonce consume");
            }
        }
        outcome
    }

    pub async fn delete_expired_nonces(&self) -> AllocationOutcome<u64> {
        self.nonce_store.delete_expired().await
    }

    async fn warm_lease(&self, lease: &Lease) {
        if let Err(e) = self.lease_cache.set(lease).await {
            tracing::warn!(token_id = lease.token_id, peer_id = %lease.peer_id, error = %e, "best-effort cache warm failed");
        }
    }
}
