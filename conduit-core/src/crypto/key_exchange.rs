use p256::ecdh::EphemeralSecret;
use p256::pkcs8::{DecodePublicKey, EncodePublicKey};
use p256::PublicKey;
use rand::rngs::OsRng;
use sha2::{Digest, Sha256};
use tracing::debug;

use super::types::{EphemeralKeyPair, SharedSecret, SHARED_SECRET_LEN};
use crate::error::KeyAgreementError;

/// One side of a P-256 ECDH agreement.
///
/// The key pair is created lazily by [`generate_key_pair`](Self::generate_key_pair)
/// and destroyed by the first [`derive_shared_secret`](Self::derive_shared_secret)
/// call, successful or not.
#[derive(Default)]
pub struct KeyExchange {
    key_pair: Option<EphemeralKeyPair>,
}

impl KeyExchange {
    pub fn new() -> Self {
        Self { key_pair: None }
    }

    /// Public key as X.509 SubjectPublicKeyInfo DER. Returns the same key
    /// until it is consumed by a derivation.
    pub fn generate_key_pair(&mut self) -> Result<Vec<u8>, KeyAgreementError> {
        let key_pair = self.key_pair.get_or_insert_with(|| {
            let secret = EphemeralSecret::random(&mut OsRng);
            let public = secret.public_key();
            EphemeralKeyPair { secret, public }
        });

        key_pair
            .public
            .to_public_key_der()
            .map(|doc| doc.as_bytes().to_vec())
            .map_err(|e| KeyAgreementError::Encoding(e.to_string()))
    }

    pub fn has_key_pair(&self) -> bool {
        self.key_pair.is_some()
    }

    /// ECDH against `peer_public_key`, hashed with SHA-256.
    pub fn derive_shared_secret(
        &mut self,
        peer_public_key: &[u8],
    ) -> Result<SharedSecret, KeyAgreementError> {
        let key_pair = self.key_pair.take().ok_or(KeyAgreementError::NoKeyPair)?;
        let peer = parse_public_key(peer_public_key)?;

        let agreement = key_pair.secret.diffie_hellman(&peer);
        drop(key_pair);

        let digest = Sha256::digest(agreement.raw_secret_bytes());
        let mut secret = [0u8; SHARED_SECRET_LEN];
        secret.copy_from_slice(&digest);
        debug!("derived shared secret");

        Ok(SharedSecret::new(secret))
    }
}

/// Accepts SubjectPublicKeyInfo DER and, for interop, raw SEC1 points.
fn parse_public_key(bytes: &[u8]) -> Result<PublicKey, KeyAgreementError> {
    if bytes.is_empty() {
        return Err(KeyAgreementError::InvalidPeerKey("empty key".to_string()));
    }

    PublicKey::from_public_key_der(bytes)
        .or_else(|_| PublicKey::from_sec1_bytes(bytes))
        .map_err(|e| KeyAgreementError::InvalidPeerKey(e.to_string()))
}
