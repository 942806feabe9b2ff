//! Challenge-response auth state machine (unauthenticated → challenged →
//! authenticated-per-request).
//!
//! A nonce is bound to the peer ID derived from the public key that
//! requested it; [`AuthService::verify_auth`] enforces that binding
//! atomically via [`Repository::consume_nonce`], which prevents a nonce
//! issued to one peer from being replayed by another.

use std::sync::Arc;

use meshlease_storage::AllocationOutcome;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::crypto;
use crate::error::AuthError;
use crate::repository::Repository;

pub struct AuthService {
    repo: Arc<Repository>,
    nonce_ttl_secs: i64,
}

impl AuthService {
    #[must_use]
    pub fn new(repo: Arc<Repository>, nonce_ttl_secs: i64) -> Self {
        Self { repo, nonce_ttl_secs }
    }

    /// Issue a fresh nonce challenge for the peer derived from `pubkey`.
    pub async fn request_auth(&self, pubkey: &[u8]) -> Result<Uuid, AuthError> {
        let peer_id = crypto::peer_id(pubkey)?;
        match self.repo.create_nonce(&peer_id, self.nonce_ttl_secs).await {
            AllocationOutcome::Found(nonce) => Ok(nonce.id),
            AllocationOutcome::Empty => Err(AuthError::NonceNotFound),
            AllocationOutcome::TransientFault(e) | AllocationOutcome::FatalFault(e) => Err(e.into()),
        }
    }

    /// Verify a signed nonce and return the public key bytes on success.
    ///
    /// Steps, any of which aborts the whole call: verify the signature over
    /// `SHA-256(nonce_id)`, look up the nonce, derive the peer ID from
    /// `pubkey`, then atomically consume the nonce bound to that peer ID.
    pub async fn verify_auth<'a>(
        &self,
        pubkey: &'a [u8],
        nonce_id: Uuid,
        signature: &[u8],
    ) -> Result<&'a [u8], AuthError> {
        let payload = Sha256::digest(nonce_id.as_bytes());
        crypto::verify(pubkey, &payload, signature)?;

        let nonce = match self.repo.get_nonce(nonce_id).await {
            AllocationOutcome::Found(nonce) => nonce,
            AllocationOutcome::Empty => return Err(AuthError::NonceNotFound),
            AllocationOutcome::TransientFault(e) | AllocationOutcome::FatalFault(e) => return Err(e.into()),
        };
        if nonce.consumed || !is_live(&nonce) {
            return Err(AuthError::NonceExpired);
        }

        let peer_id = crypto::peer_id(pubkey)?;
        if peer_id != nonce.peer_id {
            return Err(AuthError::PubkeyMismatch);
        }

        match self.repo.consume_nonce(nonce_id).await {
            AllocationOutcome::Found(_) => Ok(pubkey),
            AllocationOutcome::Empty => Err(AuthError::NonceConsumed),
            AllocationOutcome::TransientFault(e) | AllocationOutcome::FatalFault(e) => Err(e.into()),
        }
    }
}

fn is_live(nonce: &meshlease_storage::Nonce) -> bool {
    nonce.expires_at > chrono::Utc::now()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_is_sha256_of_nonce_bytes() {
        let id = Uuid::nil();
        let payload = Sha256::digest(id.as_bytes());
        assert_eq!(payload.len(), 32);
    }
}
