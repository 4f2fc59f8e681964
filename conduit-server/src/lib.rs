//! Conduit echo peer
//!
//! Exposes the peer state and HTTP routes so the client's tests can run the
//! peer in process or behind a real listener.

mod handlers;
mod state;

pub use handlers::router;
pub use state::PeerState;
