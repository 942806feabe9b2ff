//! Two-keyspace lease cache: `lease:peer:<peer_id>` and
//! `lease:token:<token_id>` both point at the same serialized [`Lease`].

use async_trait::async_trait;
use meshlease_storage::Lease;
use redis::AsyncCommands;

use crate::error::CacheError;
use crate::outcome::CacheOutcome;
use crate::RedisCache;

fn peer_key(peer_id: &str) -> String {
    format!("lease:peer:{peer_id}")
}

fn token_key(token_id: i64) -> String {
    format!("lease:token:{token_id}")
}

/// Cache operations for leases.
#[async_trait]
pub trait LeaseCache: Send + Sync {
    async fn get_by_peer(&self, peer_id: &str) -> CacheOutcome<Lease>;
    async fn get_by_token(&self, token_id: i64) -> CacheOutcome<Lease>;
    /// Write both keys as a best-effort unit. A no-op when the lease's TTL
    /// has already elapsed (`ttl_secs() <= 0`).
    async fn set(&self, lease: &Lease) -> Result<(), CacheError>;
    /// Remove both keys for a lease.
    async fn invalidate(&self, token_id: i64, peer_id: &str) -> Result<(), CacheError>;
}

#[async_trait]
impl LeaseCache for RedisCache {
    async fn get_by_peer(&self, peer_id: &str) -> CacheOutcome<Lease> {
        if !self.enabled {
            return CacheOutcome::Fault(CacheError::Disabled);
        }
        let mut conn = self.conn.clone();
        let raw: Option<String> = match conn.get(peer_key(peer_id)).await {
            Ok(v) => v,
            Err(e) => return CacheOutcome::Fault(CacheError::Lease { op: "get_by_peer", reason: e.to_string() }),
        };
        decode(raw, "get_by_peer")
    }

    async fn get_by_token(&self, token_id: i64) -> CacheOutcome<Lease> {
        if !self.enabled {
            return CacheOutcome::Fault(CacheError::Disabled);
        }
        let mut conn = self.conn.clone();
        let raw: Option<String> = match conn.get(token_key(token_id)).await {
            Ok(v) => v,
            Err(e) => return CacheOutcome::Fault(CacheError::Lease { op: "get_by_token", reason: e.to_string() }),
        };
        decode(raw, "get_by_token")
    }

    async fn set(&self, lease: &Lease) -> Result<(), CacheError> {
        if !self.enabled {
            return Err(CacheError::Disabled);
        }
        let ttl = lease.ttl_secs();
        if ttl <= 0 {
            return Ok(());
        }
        let payload = serde_json::to_string(lease)
            .map_err(|e| CacheError::Codec { op: "set", reason: e.to_string() })?;

        let mut conn = self.conn.clone();
        let ttl = ttl as u64;
        redis::pipe()
            .atomic()
            .set_ex(peer_key(&lease.peer_id), &payload, ttl)
            .set_ex(token_key(lease.token_id), &payload, ttl)
            .query_async::<()>(&mut conn)
            .await
            .map_err(|e| CacheError::Lease { op: "set", reason: e.to_string() })
    }

    async fn invalidate(&self, token_id: i64, peer_id: &str) -> Result<(), CacheError> {
        if !self.enabled {
            return Err(CacheError::Disabled);
        }
        let mut conn = self.conn.clone();
        redis::pipe()
            .atomic()
            .del(peer_key(peer_id))
            .del(token_key(token_id))
            .query_async::<()>(&mut conn)
            .await
            .map_err(|e| CacheError::Lease { op: "invalidate", reason: e.to_string() })
    }
}

fn decode(raw: Option<String>, op: &'static str) -> CacheOutcome<Lease> {
    match raw {
        None => CacheOutcome::Miss,
        Some(s) => match serde_json::from_str(&s) {
            Ok(lease) => CacheOutcome::Hit(lease),
            Err(e) => CacheOutcome::Fault(CacheError::Codec { op, reason: e.to_string() }),
        },
    }
}
