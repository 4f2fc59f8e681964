//! Conduit client library
//!
//! Handshakes conversations with a remote peer over ECDH, drives encoded
//! round trips through the encrypted session-state store, and rotates
//! sessions before the engines reach their reseed limit.

pub mod config;
pub mod conversation;
pub mod driver;
pub mod handshake;
pub mod transport;

pub use config::{ClientConfig, ConfigError};
pub use conversation::{Conversation, TripOutcome};
pub use driver::{BatchReport, ConversationDriver, ConversationReport, DriverSettings};
pub use handshake::HandshakeOrchestrator;
pub use transport::{HttpTransport, PeerTransport};
