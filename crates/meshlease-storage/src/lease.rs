//! Durable lease storage.
//!
//! Every mutating operation is a single-statement or single-transaction
//! round trip to Postgres; row-level locking (`FOR UPDATE`, `SKIP LOCKED`)
//! is what gives the allocator its concurrency guarantees, not anything in
//! this crate's control flow.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StorageError;
use crate::outcome::{classify_sqlx_error, AllocationOutcome};
use crate::PgStore;

/// A durable lease row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lease {
    /// Dense token identity, bijective with a virtual IPv4 in 10.0.0.0/8.
    pub token_id: i64,
    /// Opaque identifier derived from the owning peer's public key.
    pub peer_id: String,
    /// When this lease row was first created (fixed across reuse cycles is
    /// not guaranteed — reuse rewrites `created_at` along with the rest).
    pub created_at: DateTime<Utc>,
    /// When the lease was last mutated (allocate, renew, reuse, release).
    pub updated_at: DateTime<Utc>,
    /// Absolute expiry. A lease is live iff `expires_at > now`.
    pub expires_at: DateTime<Utc>,
}

impl Lease {
    /// Seconds remaining until expiry, clamped to zero (never negative).
    #[must_use]
    pub fn ttl_secs(&self) -> i64 {
        (self.expires_at - Utc::now()).num_seconds().max(0)
    }

    /// Whether this lease is still live (`expires_at > now`).
    #[must_use]
    pub fn is_live(&self) -> bool {
        self.expires_at > Utc::now()
    }
}

/// Durable storage operations for leases and the allocation counter.
///
/// Implementations must honor the transactional and locking semantics
/// described on each method; callers (the hybrid repository, the allocator
/// service) depend on them for correctness under concurrency, not just for
/// a plausible-looking API.
#[async_trait]
pub trait LeaseStore: Send + Sync {
    /// Decrement the shared allocation counter and return its new value.
    ///
    /// Serialized by a row-level lock: concurrent callers observe a strict,
    /// total, descending order with no two callers ever seeing the same
    /// value.
    async fn allocate_next(&self) -> AllocationOutcome<i64>;

    /// Insert a brand-new lease row for `peer_id` at `token_id`.
    async fn insert_lease(
        &self,
        token_id: i64,
        peer_id: &str,
        ttl_secs: i64,
    ) -> AllocationOutcome<Lease>;

    /// Atomically locate one expired row (`FOR UPDATE SKIP LOCKED`, skipping
    /// rows already locked by other concurrent callers) and rewrite it to
    /// `peer_id` with a fresh expiry, in a single statement.
    ///
    /// Locating the row and reassigning it happen as one round trip so the
    /// lock can never be released between the two: two concurrent callers
    /// are guaranteed disjoint rows, never the same one. Returns `Empty` —
    /// not an error — when no expired row is available.
    async fn find_and_reuse_expired(&self, peer_id: &str, ttl_secs: i64) -> AllocationOutcome<Lease>;

    /// Return the live lease owned by `peer_id`, if any.
    async fn get_by_peer(&self, peer_id: &str) -> AllocationOutcome<Lease>;

    /// Return the live lease at `token_id`, if any.
    async fn get_by_token(&self, token_id: i64) -> AllocationOutcome<Lease>;

    /// Extend `expires_at` by `ttl_secs` iff the row is live and owned by
    /// `peer_id`.
    async fn renew(&self, token_id: i64, peer_id: &str, ttl_secs: i64) -> AllocationOutcome<Lease>;

    /// Mark the lease owned by `peer_id` at `token_id` as expired
    /// immediately (`expires_at = now()`), making it eligible for reuse.
    async fn release(&self, token_id: i64, peer_id: &str) -> AllocationOutcome<()>;
}

/// Lowest token ID the counter is allowed to reach (`10 << 24` plus one —
/// see [`crate::error::StorageError::CounterExhausted`]).
const TOKEN_FLOOR: i64 = (10i64 << 24) + 1;

fn row_to_lease(token_id: i64, peer_id: String, created_at: DateTime<Utc>, updated_at: DateTime<Utc>, expires_at: DateTime<Utc>) -> Lease {
    Lease {
        token_id,
        peer_id,
        created_at,
        updated_at,
        expires_at,
    }
}

#[async_trait]
impl LeaseStore for PgStore {
    async fn allocate_next(&self) -> AllocationOutcome<i64> {
        let result: Result<(i64,), sqlx::Error> =
            sqlx::query_as("UPDATE alloc_state SET last_token_id = last_token_id - 1 WHERE id = 1 RETURNING last_token_id")
                .fetch_one(&self.pool)
                .await;

        match result {
            Ok((next,)) if next < TOKEN_FLOOR => AllocationOutcome::FatalFault(StorageError::CounterExhausted { floor: TOKEN_FLOOR }),
            Ok((next,)) => AllocationOutcome::Found(next),
            Err(e) => {
                let transient = classify_sqlx_error("allocate_next", &e);
                let err = StorageError::Alloc { op: "allocate_next", reason: e.to_string() };
                if transient { AllocationOutcome::TransientFault(err) } else { AllocationOutcome::FatalFault(err) }
            }
        }
    }

    async fn insert_lease(&self, token_id: i64, peer_id: &str, ttl_secs: i64) -> AllocationOutcome<Lease> {
        let result: Result<(DateTime<Utc>, DateTime<Utc>, DateTime<Utc>), sqlx::Error> = sqlx::query_as(
            "INSERT INTO leases (token_id, peer_id, created_at, updated_at, expires_at) \
             VALUES ($1, $2, now(), now(), now() + make_interval(secs => $3)) \
             RETURNING created_at, updated_at, expires_at",
        )
        .bind(token_id)
        .bind(peer_id)
        .bind(ttl_secs as f64)
        .fetch_one(&self.pool)
        .await;

        match result {
            Ok((created_at, updated_at, expires_at)) => {
                AllocationOutcome::Found(row_to_lease(token_id, peer_id.to_owned(), created_at, updated_at, expires_at))
            }
            Err(e) => {
                let transient = classify_sqlx_error("insert_lease", &e);
                let err = StorageError::Lease { op: "insert_lease", reason: e.to_string() };
                if transient { AllocationOutcome::TransientFault(err) } else { AllocationOutcome::FatalFault(err) }
            }
        }
    }

    async fn find_and_reuse_expired(&self, peer_id: &str, ttl_secs: i64) -> AllocationOutcome<Lease> {
        let result: Result<Option<(i64, DateTime<Utc>, DateTime<Utc>, DateTime<Utc>)>, sqlx::Error> = sqlx::query_as(
            "UPDATE leases SET peer_id = $1, updated_at = now(), expires_at = now() + make_interval(secs => $2) \
             WHERE token_id = ( \
                 SELECT token_id FROM leases \
                 WHERE expires_at < now() \
                 ORDER BY expires_at ASC \
                 LIMIT 1 \
                 FOR UPDATE SKIP LOCKED \
             ) \
             RETURNING token_id, created_at, updated_at, expires_at",
        )
        .bind(peer_id)
        .bind(ttl_secs as f64)
        .fetch_optional(&self.pool)
        .await;

        match result {
            Ok(Some((token_id, created_at, updated_at, expires_at))) => {
                AllocationOutcome::Found(row_to_lease(token_id, peer_id.to_owned(), created_at, updated_at, expires_at))
            }
            Ok(None) => AllocationOutcome::Empty,
            Err(e) => {
                let transient = classify_sqlx_error("find_and_reuse_expired", &e);
                let err = StorageError::Lease { op: "find_and_reuse_expired", reason: e.to_string() };
                if transient { AllocationOutcome::TransientFault(err) } else { AllocationOutcome::FatalFault(err) }
            }
        }
    }

    async fn get_by_peer(&self, peer_id: &str) -> AllocationOutcome<Lease> {
        let result: Result<Option<(i64, String, DateTime<Utc>, DateTime<Utc>, DateTime<Utc>)>, sqlx::Error> = sqlx::query_as(
            "SELECT token_id, peer_id, created_at, updated_at, expires_at FROM leases \
             WHERE peer_id = $1 AND expires_at > now() LIMIT 1",
        )
        .bind(peer_id)
        .fetch_optional(&self.pool)
        .await;

        match result {
            Ok(Some((token_id, peer_id, created_at, updated_at, expires_at))) => {
                AllocationOutcome::Found(row_to_lease(token_id, peer_id, created_at, updated_at, expires_at))
            }
            Ok(None) => AllocationOutcome::Empty,
            Err(e) => {
                let transient = classify_sqlx_error("get_by_peer", &e);
                let err = StorageError::Lease { op: "get_by_peer", reason: e.to_string() };
                if transient { AllocationOutcome::TransientFault(err) } else { AllocationOutcome::FatalFault(err) }
            }
        }
    }

    async fn get_by_token(&self, token_id: i64) -> AllocationOutcome<Lease> {
        let result: Result<Option<(String, DateTime<Utc>, DateTime<Utc>, DateTime<Utc>)>, sqlx::Error> = sqlx::query_as(
            "SELECT peer_id, created_at, updated_at, expires_at FROM leases \
             WHERE token_id = $1 AND expires_at > now()",
        )
        .bind(token_id)
        .fetch_optional(&self.pool)
        .await;

        match result {
            Ok(Some((peer_id, created_at, updated_at, expires_at))) => {
                AllocationOutcome::Found(row_to_lease(token_id, peer_id, created_at, updated_at, expires_at))
            }
            Ok(None) => AllocationOutcome::Empty,
            Err(e) => {
                let transient = classify_sqlx_error("get_by_token", &e);
                let err = StorageError::Lease { op: "get_by_token", reason: e.to_string() };
                if transient { AllocationOutcome::TransientFault(err) } else { AllocationOutcome::FatalFault(err) }
            }
        }
    }

    async fn renew(&self, token_id: i64, peer_id: &str, ttl_secs: i64) -> AllocationOutcome<Lease> {
        let result: Result<Option<(DateTime<Utc>, DateTime<Utc>, DateTime<Utc>)>, sqlx::Error> = sqlx::query_as(
            "UPDATE leases SET updated_at = now(), expires_at = now() + make_interval(secs => $3) \
             WHERE token_id = $1 AND peer_id = $2 AND expires_at > now() \
             RETURNING created_at, updated_at, expires_at",
        )
        .bind(token_id)
        .bind(peer_id)
        .bind(ttl_secs as f64)
        .fetch_optional(&self.pool)
        .await;

        match result {
            Ok(Some((created_at, updated_at, expires_at))) => {
                AllocationOutcome::Found(row_to_lease(token_id, peer_id.to_owned(), created_at, updated_at, expires_at))
            }
            Ok(None) => AllocationOutcome::Empty,
            Err(e) => {
                let transient = classify_sqlx_error("renew", &e);
                let err = StorageError::Lease { op: "renew", reason: e.to_string() };
                if transient { AllocationOutcome::TransientFault(err) } else { AllocationOutcome::FatalFault(err) }
            }
        }
    }

    async fn release(&self, token_id: i64, peer_id: &str) -> AllocationOutcome<()> {
        let result = sqlx::query("UPDATE leases SET expires_at = now(), updated_at = now() WHERE token_id = $1 AND peer_id = $2")
            .bind(token_id)
            .bind(peer_id)
            .execute(&self.pool)
            .await;

        match result {
            Ok(res) if res.rows_affected() == 0 => AllocationOutcome::Empty,
            Ok(_) => AllocationOutcome::Found(()),
            Err(e) => {
                let transient = classify_sqlx_error("release", &e);
                let err = StorageError::Lease { op: "release", reason: e.to_string() };
                if transient { AllocationOutcome::TransientFault(err) } else { AllocationOutcome::FatalFault(err) }
            }
        }
    }
}
