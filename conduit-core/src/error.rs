use thiserror::Error;

use crate::wire::codes;

/// Failures of the ECDH key agreement. The held key pair is gone after any
/// of these, so a fresh `generate_key_pair` is required before retrying.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum KeyAgreementError {
    #[error("no key pair held; generate one before deriving a shared secret")]
    NoKeyPair,

    #[error("invalid peer public key: {0}")]
    InvalidPeerKey(String),

    #[error("public key encoding failed: {0}")]
    Encoding(String),
}

/// Non-success status from a stateful engine.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error("entropy too short: got {got} bytes, need at least {min}")]
    EntropyTooShort { got: usize, min: usize },

    #[error("{operation} is not permitted on a {role} engine")]
    WrongRole {
        operation: &'static str,
        role: &'static str,
    },

    #[error("engine is not instantiated")]
    NotInstantiated,

    #[error("reseed required: counter {counter} exceeds interval {interval}")]
    ReseedRequired { counter: u64, interval: u64 },

    #[error("malformed input: {0}")]
    Malformed(String),

    #[error("integrity check failed")]
    IntegrityCheckFailed,

    #[error("invalid engine state: {0}")]
    BadState(String),
}

/// Session-state store failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("no state stored under {key}")]
    NotFound { key: String },

    #[error("failed to seal state for {key}")]
    Seal { key: String },

    #[error("failed to open state for {key}")]
    Open { key: String },
}

/// Network/HTTP failures talking to the remote peer.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("request to {route} timed out after {millis} ms")]
    Timeout { route: String, millis: u64 },

    #[error("HTTP error code {status} from {route}")]
    Status { route: String, status: u16 },

    #[error("request to {route} failed: {reason}")]
    Request { route: String, reason: String },

    #[error("undecodable response from {route}: {reason}")]
    Decode { route: String, reason: String },
}

impl TransportError {
    /// Wire result code used when a transport failure is reported as a
    /// response model.
    pub fn result_code(&self) -> &'static str {
        match self {
            TransportError::Status { .. } => codes::HTTP_ERROR,
            _ => codes::HTTP_EXCEPTION,
        }
    }
}

#[derive(Error, Debug)]
pub enum ConduitError {
    #[error("key agreement failed: {0}")]
    KeyAgreement(#[from] KeyAgreementError),

    #[error("handshake rejected ({result_code}): {message}")]
    Handshake {
        result_code: String,
        message: String,
    },

    #[error("state not found: {key}")]
    StateNotFound { key: String },

    #[error("engine error: {0}")]
    Engine(#[from] EngineError),

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("peer rejected message ({result_code}): {message}")]
    PeerRejected {
        result_code: String,
        message: String,
    },

    #[error("state store error: {0}")]
    Store(StoreError),
}

impl From<StoreError> for ConduitError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { key } => ConduitError::StateNotFound { key },
            other => ConduitError::Store(other),
        }
    }
}

impl ConduitError {
    pub fn is_state_not_found(&self) -> bool {
        matches!(self, ConduitError::StateNotFound { .. })
    }

    /// Result code describing this error on the wire.
    pub fn result_code(&self) -> String {
        match self {
            ConduitError::KeyAgreement(_) => codes::HANDSHAKE_EXCEPTION.to_string(),
            ConduitError::Handshake { result_code, .. }
            | ConduitError::PeerRejected { result_code, .. } => result_code.clone(),
            ConduitError::StateNotFound { .. } => codes::STATE_NOT_FOUND.to_string(),
            ConduitError::Engine(EngineError::Malformed(_) | EngineError::IntegrityCheckFailed) => {
                codes::DECODE_EXCEPTION.to_string()
            }
            ConduitError::Engine(_) => codes::STATE_CREATION.to_string(),
            ConduitError::Transport(err) => err.result_code().to_string(),
            ConduitError::Store(StoreError::Seal { .. }) => codes::STATE_SAVE.to_string(),
            ConduitError::Store(_) => codes::STATE_RETRIEVAL.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ConduitError>;
