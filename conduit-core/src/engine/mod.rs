//! Stateful encode/decode engine contract.
//!
//! An engine is seeded once from a shared secret and then advances its
//! internal generator on every encode/decode. Both ends of a channel must
//! apply operations in the same order, so the live state of a channel is
//! owned by exactly one holder at a time: saving consumes the engine and
//! restoring consumes the blob.

mod drbg;

pub use drbg::{DrbgConfig, DrbgEngine, DEFAULT_RESEED_INTERVAL, MIN_ENTROPY_LEN};

use std::fmt;

use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::EngineError;

/// Direction a channel engine serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EngineRole {
    Encoder,
    Decoder,
}

impl EngineRole {
    /// Cache-key prefix for this role.
    pub fn prefix(self) -> &'static str {
        match self {
            EngineRole::Encoder => "ENC_",
            EngineRole::Decoder => "DEC_",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            EngineRole::Encoder => "encoder",
            EngineRole::Decoder => "decoder",
        }
    }

    /// Role-prefixed conversation id used as the state-store key.
    pub fn cache_key(self, conversation_id: &str) -> String {
        format!("{}{}", self.prefix(), conversation_id)
    }
}

impl fmt::Display for EngineRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Inputs to engine instantiation.
pub struct SeedMaterial<'a> {
    /// Secret entropy, the hashed ECDH output.
    pub entropy: &'a [u8],
    /// Non-secret nonce, the peer's handshake timestamp.
    pub nonce: u64,
    /// Non-secret personalization, the conversation id.
    pub personalization: &'a str,
}

/// Opaque serialized engine state (base64). Move-only and zeroized on drop.
#[derive(Zeroize, ZeroizeOnDrop, PartialEq, Eq)]
pub struct StateBlob(String);

impl StateBlob {
    pub fn new(encoded: String) -> Self {
        Self(encoded)
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for StateBlob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StateBlob({} bytes)", self.0.len())
    }
}

pub trait StatefulEngine: Sized + Send + 'static {
    type Config: Clone + Default + Send + Sync + 'static;

    fn instantiate(
        config: &Self::Config,
        role: EngineRole,
        seed: SeedMaterial<'_>,
    ) -> Result<Self, EngineError>;

    fn role(&self) -> EngineRole;

    /// Returns base64 ciphertext.
    fn encode(&mut self, plaintext: &[u8]) -> Result<String, EngineError>;

    fn decode(&mut self, ciphertext_b64: &str) -> Result<Vec<u8>, EngineError>;

    fn save_state(self) -> StateBlob;

    fn restore_state(blob: StateBlob) -> Result<Self, EngineError>;

    /// Generator uses since the last (re)instantiation.
    fn reseed_counter(&self) -> u64;

    /// Maximum generator uses before the engine refuses to operate.
    fn reseed_interval(&self) -> u64;

    fn uninstantiate(self) -> Result<(), EngineError>;
}
