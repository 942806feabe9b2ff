//! Single-keyspace nonce cache: `nonce:<id>`.

use async_trait::async_trait;
use meshlease_storage::Nonce;
use redis::AsyncCommands;
use uuid::Uuid;

use crate::error::CacheError;
use crate::outcome::CacheOutcome;
use crate::RedisCache;

fn nonce_key(id: Uuid) -> String {
    format!("nonce:{id}")
}

/// Cache operations for auth nonces.
#[async_trait]
pub trait NonceCache: Send + Sync {
    async fn get(&self, id: Uuid) -> CacheOutcome<Nonce>;
    async fn set(&self, nonce: &Nonce, ttl_secs: i64) -> Result<(), CacheError>;
    async fn invalidate(&self, id: Uuid) -> Result<(), CacheError>;
}

#[async_trait]
impl NonceCache for RedisCache {
    async fn get(&self, id: Uuid) -> CacheOutcome<Nonce> {
        if !self.enabled {
            return CacheOutcome::Fault(CacheError::Disabled);
        }
        let mut conn = self.conn.clone();
        let raw: Option<String> = match conn.get(nonce_key(id)).await {
            Ok(v) => v,
            Err(e) => return CacheOutcome::Fault(CacheError::Nonce { op: "get", reason: e.to_string() }),
        };
        match raw {
            None => CacheOutcome::Miss,
            Some(s) => match serde_json::from_str(&s) {
                Ok(nonce) => CacheOutcome::Hit(nonce),
                Err(e) => CacheOutcome::Fault(CacheError::Codec { op: "get", reason: e.to_string() }),
            },
        }
    }

    async fn set(&self, nonce: &Nonce, ttl_secs: i64) -> Result<(), CacheError> {
        if !self.enabled {
            return Err(CacheError::Disabled);
        }
        if ttl_secs <= 0 {
            return Ok(());
        }
        let payload = serde_json::to_string(nonce)
            .map_err(|e| CacheError::Codec { op: "set", reason: e.to_string() })?;
        let mut conn = self.conn.clone();
        conn.set_ex::<_, _, ()>(nonce_key(nonce.id), payload, ttl_secs as u64)
            .await
            .map_err(|e| CacheError::Nonce { op: "set", reason: e.to_string() })
    }

    async fn invalidate(&self, id: Uuid) -> Result<(), CacheError> {
        if !self.enabled {
            return Err(CacheError::Disabled);
        }
        let mut conn = self.conn.clone();
        conn.del::<_, ()>(nonce_key(id))
            .await
            .map_err(|e| CacheError::Nonce { op: "invalidate", reason: e.to_string() })
    }
}
