//! Signature verification and peer-ID derivation.
//!
//! Public keys arrive as a small self-describing envelope: one leading
//! type-tag byte followed by the raw key bytes. Only one tag is defined
//! today (`0x01`, secp256k1 compressed SEC1); unknown tags are rejected as
//! malformed rather than silently ignored, leaving room to add tags later
//! without breaking existing peers.

use k256::ecdsa::signature::Verifier;
use k256::ecdsa::{Signature, VerifyingKey};
use sha2::{Digest, Sha256};

use crate::error::CryptoError;

const TAG_SECP256K1_COMPRESSED: u8 = 0x01;
const SECP256K1_COMPRESSED_LEN: usize = 33;
const PEER_ID_LEN: usize = 40;

/// Verify `signature` over `payload` under the key encoded in `pubkey`.
pub fn verify(pubkey: &[u8], payload: &[u8], signature: &[u8]) -> Result<(), CryptoError> {
    let verifying_key = decode_verifying_key(pubkey)?;
    let sig = Signature::from_slice(signature).map_err(|_| CryptoError::InvalidSignature)?;
    verifying_key.verify(payload, &sig).map_err(|_| CryptoError::InvalidSignature)
}

/// Derive a stable, printable peer identifier from an encoded public key.
///
/// `peer_id = base58(sha256(marshalled_bytes))`, truncated to 40 base58
/// characters — well under the 128-character bound the lease schema allows
/// for `peer_id`.
pub fn peer_id(pubkey: &[u8]) -> Result<String, CryptoError> {
    decode_verifying_key(pubkey)?;
    let digest = Sha256::digest(pubkey);
    let encoded = bs58::encode(digest).into_string();
    Ok(encoded.chars().take(PEER_ID_LEN).collect())
}

fn decode_verifying_key(pubkey: &[u8]) -> Result<VerifyingKey, CryptoError> {
    match pubkey.split_first() {
        Some((&TAG_SECP256K1_COMPRESSED, rest)) if rest.len() == SECP256K1_COMPRESSED_LEN => {
            VerifyingKey::from_sec1_bytes(rest)
                .map_err(|e| CryptoError::InvalidPubkey { reason: e.to_string() })
        }
        Some((&TAG_SECP256K1_COMPRESSED, rest)) => Err(CryptoError::InvalidPubkey {
            reason: format!("expected {SECP256K1_COMPRESSED_LEN} key bytes, got {}", rest.len()),
        }),
        Some((tag, _)) => Err(CryptoError::InvalidPubkey { reason: format!("unknown key type tag 0x{tag:02x}") }),
        None => Err(CryptoError::InvalidPubkey { reason: "empty key".to_owned() }),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use k256::ecdsa::signature::Signer;
    use k256::ecdsa::SigningKey;

    fn envelope(verifying_key: &VerifyingKey) -> Vec<u8> {
        let mut bytes = vec![TAG_SECP256K1_COMPRESSED];
        bytes.extend_from_slice(&verifying_key.to_encoded_point(true).as_bytes());
        bytes
    }

    #[test]
    fn verifies_a_valid_signature() {
        let signing_key = SigningKey::random(&mut rand::rngs::OsRng);
        let verifying_key = VerifyingKey::from(&signing_key);
        let pubkey = envelope(&verifying_key);
        let payload = b"allocate-ip";
        let sig: Signature = signing_key.sign(payload);

        verify(&pubkey, payload, sig.to_bytes().as_slice()).unwrap();
    }

    #[test]
    fn rejects_mismatched_signature() {
        let signing_key = SigningKey::random(&mut rand::rngs::OsRng);
        let other_key = SigningKey::random(&mut rand::rngs::OsRng);
        let verifying_key = VerifyingKey::from(&signing_key);
        let pubkey = envelope(&verifying_key);
        let sig: Signature = other_key.sign(b"allocate-ip");

        assert!(verify(&pubkey, b"allocate-ip", sig.to_bytes().as_slice()).is_err());
    }

    #[test]
    fn rejects_unknown_tag() {
        let mut bytes = vec![0xffu8];
        bytes.extend_from_slice(&[0u8; 33]);
        assert!(decode_verifying_key(&bytes).is_err());
    }

    #[test]
    fn rejects_truncated_key() {
        assert!(decode_verifying_key(&[TAG_SECP256K1_COMPRESSED, 1, 2, 3]).is_err());
    }

    #[test]
    fn peer_id_is_stable_and_bounded() {
        let signing_key = SigningKey::random(&mut rand::rngs::OsRng);
        let verifying_key = VerifyingKey::from(&signing_key);
        let pubkey = envelope(&verifying_key);

        let a = peer_id(&pubkey).unwrap();
        let b = peer_id(&pubkey).unwrap();
        assert_eq!(a, b);
        assert!(a.len() <= PEER_ID_LEN);
    }
}
