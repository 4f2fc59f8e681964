//! Conduit core: ECDH key agreement, the stateful engine contract, and the
//! encrypted session-state store shared by client and peer.

pub mod clock;
pub mod crypto;
pub mod engine;
pub mod error;
pub mod reseed;
pub mod store;
pub mod validation;
pub mod wire;

pub use clock::{Clock, ManualClock, SystemClock};
pub use crypto::{KeyExchange, SharedSecret};
pub use engine::{
    DrbgConfig, DrbgEngine, EngineRole, SeedMaterial, StateBlob, StatefulEngine,
};
pub use error::{
    ConduitError, EngineError, KeyAgreementError, Result, StoreError, TransportError,
};
pub use reseed::{ReseedDecision, ReseedMonitor};
pub use store::{spawn_sweeper, SessionStateStore, StoreConfig, DEFAULT_STATE_TTL};
pub use wire::{HandshakeModel, ResponseModel};
