//! Durable nonce storage backing the challenge-response auth handshake.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::StorageError;
use crate::outcome::{classify_sqlx_error, AllocationOutcome};
use crate::PgStore;

/// A single-use authentication challenge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Nonce {
    pub id: Uuid,
    pub peer_id: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub consumed: bool,
}

/// Durable storage operations for auth nonces.
#[async_trait]
pub trait NonceStore: Send + Sync {
    /// Create a fresh, unconsumed nonce for `peer_id`, valid for `ttl_secs`.
    async fn create(&self, peer_id: &str, ttl_secs: i64) -> AllocationOutcome<Nonce>;

    /// Look up a nonce by id, regardless of consumed/expired state.
    async fn get(&self, id: Uuid) -> AllocationOutcome<Nonce>;

    /// Atomically mark a nonce consumed iff it is currently unconsumed and
    /// unexpired, returning the row that was consumed.
    ///
    /// This is the single-use guarantee: two concurrent callers racing to
    /// consume the same nonce will see exactly one `Found` and one `Empty`.
    async fn consume(&self, id: Uuid) -> AllocationOutcome<Nonce>;

    /// Delete all expired nonces, returning the number of rows removed.
    async fn delete_expired(&self) -> AllocationOutcome<u64>;
}

#[async_trait]
impl NonceStore for PgStore {
    async fn create(&self, peer_id: &str, ttl_secs: i64) -> AllocationOutcome<Nonce> {
        let result: Result<(Uuid, DateTime<Utc>, DateTime<Utc>), sqlx::Error> = sqlx::query_as(
            "INSERT INTO nonces (id, peer_id, created_at, expires_at, consumed) \
             VALUES (gen_random_uuid(), $1, now(), now() + make_interval(secs => $2), false) \
             RETURNING id, created_at, expires_at",
        )
        .bind(peer_id)
        .bind(ttl_secs as f64)
        .fetch_one(&self.pool)
        .await;

        match result {
            Ok((id, created_at, expires_at)) => AllocationOutcome::Found(Nonce {
                id,
                peer_id: peer_id.to_owned(),
                created_at,
                expires_at,
                consumed: false,
            }),
            Err(e) => {
                let transient = classify_sqlx_error("create", &e);
                let err = StorageError::Nonce { op: "create", reason: e.to_string() };
                if transient { AllocationOutcome::TransientFault(err) } else { AllocationOutcome::FatalFault(err) }
            }
        }
    }

    async fn get(&self, id: Uuid) -> AllocationOutcome<Nonce> {
        let result: Result<Option<(String, DateTime<Utc>, DateTime<Utc>, bool)>, sqlx::Error> =
            sqlx::query_as("SELECT peer_id, created_at, expires_at, consumed FROM nonces WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await;

        match result {
            Ok(Some((peer_id, created_at, expires_at, consumed))) => {
                AllocationOutcome::Found(Nonce { id, peer_id, created_at, expires_at, consumed })
            }
            Ok(None) => AllocationOutcome::Empty,
            Err(e) => {
                let transient = classify_sqlx_error("get", &e);
                let err = StorageError::Nonce { op: "get", reason: e.to_string() };
                if transient { AllocationOutcome::TransientFault(err) } else { AllocationOutcome::FatalFault(err) }
            }
        }
    }

    async fn consume(&self, id: Uuid) -> AllocationOutcome<Nonce> {
        let result: Result<Option<(String, DateTime<Utc>, DateTime<Utc>)>, sqlx::Error> = sqlx::query_as(
            "UPDATE nonces SET consumed = true WHERE id = $1 AND consumed = false AND expires_at > now() \
             RETURNING peer_id, created_at, expires_at",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await;

        match result {
            Ok(Some((peer_id, created_at, expires_at))) => {
                AllocationOutcome::Found(Nonce { id, peer_id, created_at, expires_at, consumed: true })
            }
            Ok(None) => AllocationOutcome::Empty,
            Err(e) => {
                let transient = classify_sqlx_error("consume", &e);
                let err = StorageError::Nonce { op: "consume", reason: e.to_string() };
                if transient { AllocationOutcome::TransientFault(err) } else { AllocationOutcome::FatalFault(err) }
            }
        }
    }

    async fn delete_expired(&self) -> AllocationOutcome<u64> {
        let result = sqlx::query("DELETE FROM nonces WHERE expires_at < now()")
            .execute(&self.pool)
            .await;

        match result {
            Ok(res) => AllocationOutcome::Found(res.rows_affected()),
            Err(e) => {
                let transient = classify_sqlx_error("delete_expired", &e);
                let err = StorageError::Nonce { op: "delete_expired", reason: e.to_string() };
                if transient { AllocationOutcome::TransientFault(err) } else { AllocationOutcome::FatalFault(err) }
            }
        }
    }
}
