mod at_rest;
mod key_exchange;
mod types;

pub use at_rest::{SealedState, StateCipher, NONCE_LEN};
pub use key_exchange::KeyExchange;
pub use types::{SharedSecret, SHARED_SECRET_LEN};
