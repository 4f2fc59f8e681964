use std::fmt;

use p256::ecdh::EphemeralSecret;
use p256::PublicKey;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Length of every derived shared secret, independent of the curve.
pub const SHARED_SECRET_LEN: usize = 32;

/// SHA-256 of the raw ECDH agreement. Used as engine entropy and zeroized
/// when dropped.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SharedSecret([u8; SHARED_SECRET_LEN]);

impl SharedSecret {
    pub(crate) fn new(bytes: [u8; SHARED_SECRET_LEN]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; SHARED_SECRET_LEN] {
        &self.0
    }
}

impl AsRef<[u8]> for SharedSecret {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for SharedSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SharedSecret(..)")
    }
}

/// Single-use P-256 key pair held by a `KeyExchange` for one derivation.
pub(crate) struct EphemeralKeyPair {
    pub(crate) secret: EphemeralSecret,
    pub(crate) public: PublicKey,
}
