//! In-process peer for client tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use conduit_client::{HandshakeOrchestrator, PeerTransport};
use conduit_core::wire::codes;
use conduit_core::{
    DrbgConfig, DrbgEngine, EngineRole, HandshakeModel, ReseedMonitor, ResponseModel,
    SessionStateStore, StatefulEngine, StoreConfig, TransportError,
};
use conduit_server::PeerState;

/// `PeerTransport` that calls a `PeerState` directly, with switches for
/// injecting the failures a real network would produce.
pub struct LocalPeer {
    pub state: PeerState,
    handshakes: AtomicUsize,
    messages: AtomicUsize,
    reject_handshakes: AtomicBool,
    corrupt_keys: AtomicBool,
    drop_messages: AtomicBool,
    stall_messages: AtomicBool,
    panic_messages: AtomicBool,
    reply_override: Mutex<Option<Vec<u8>>>,
}

impl LocalPeer {
    pub fn new(engine: DrbgConfig) -> Self {
        Self {
            state: PeerState::new(StoreConfig::default(), engine),
            handshakes: AtomicUsize::new(0),
            messages: AtomicUsize::new(0),
            reject_handshakes: AtomicBool::new(false),
            corrupt_keys: AtomicBool::new(false),
            drop_messages: AtomicBool::new(false),
            stall_messages: AtomicBool::new(false),
            panic_messages: AtomicBool::new(false),
            reply_override: Mutex::new(None),
        }
    }

    pub fn handshakes(&self) -> usize {
        self.handshakes.load(Ordering::SeqCst)
    }

    pub fn messages(&self) -> usize {
        self.messages.load(Ordering::SeqCst)
    }

    /// Simulate the peer losing (or expiring) a conversation.
    pub fn forget(&self, conversation_id: &str) {
        self.state.forget(conversation_id);
    }

    pub fn reject_handshakes(&self, on: bool) {
        self.reject_handshakes.store(on, Ordering::SeqCst);
    }

    pub fn corrupt_keys(&self, on: bool) {
        self.corrupt_keys.store(on, Ordering::SeqCst);
    }

    pub fn drop_messages(&self, on: bool) {
        self.drop_messages.store(on, Ordering::SeqCst);
    }

    pub fn stall_messages(&self, on: bool) {
        self.stall_messages.store(on, Ordering::SeqCst);
    }

    /// Make `send_message` panic, as a broken transport or engine would.
    pub fn panic_messages(&self, on: bool) {
        self.panic_messages.store(on, Ordering::SeqCst);
    }

    /// Answer messages with `bytes` instead of echoing, still encoded on the
    /// peer's real return channel.
    pub fn reply_with(&self, bytes: Option<Vec<u8>>) {
        *self.reply_override.lock().unwrap() = bytes;
    }

    fn reply_raw(&self, conversation_id: &str, ciphertext: &str, reply: &[u8]) -> String {
        let store = self.state.store();
        let mut decoder: DrbgEngine = store
            .take_engine(EngineRole::Decoder, conversation_id)
            .unwrap();
        decoder.decode(ciphertext).unwrap();
        let mut encoder: DrbgEngine = store
            .take_engine(EngineRole::Encoder, conversation_id)
            .unwrap();
        let encoded = encoder.encode(reply).unwrap();
        store.put_engine(conversation_id, decoder).unwrap();
        store.put_engine(conversation_id, encoder).unwrap();
        encoded
    }
}

impl PeerTransport for LocalPeer {
    async fn handshake(
        &self,
        conversation_id: &str,
        request: &HandshakeModel,
    ) -> Result<ResponseModel<HandshakeModel>, TransportError> {
        self.handshakes.fetch_add(1, Ordering::SeqCst);
        if self.reject_handshakes.load(Ordering::SeqCst) {
            return Ok(ResponseModel::failure(
                codes::HANDSHAKE_EXCEPTION,
                "Handshake refused",
            ));
        }

        let mut response = self.state.handshake(conversation_id, request.clone());
        if self.corrupt_keys.load(Ordering::SeqCst) {
            if let Some(data) = response.data.as_mut() {
                data.client_decoder_public_key = vec![0x04, 0x01, 0x02];
            }
        }
        Ok(response)
    }

    async fn send_message(
        &self,
        conversation_id: &str,
        ciphertext: &str,
    ) -> Result<ResponseModel<String>, TransportError> {
        self.messages.fetch_add(1, Ordering::SeqCst);
        if self.panic_messages.load(Ordering::SeqCst) {
            panic!("transport exploded for {}", conversation_id);
        }
        if self.stall_messages.load(Ordering::SeqCst) {
            tokio::time::sleep(Duration::from_secs(30)).await;
        }
        if self.drop_messages.load(Ordering::SeqCst) {
            return Err(TransportError::Request {
                route: "/api/multiclient".to_string(),
                reason: "connection reset".to_string(),
            });
        }
        let reply = self.reply_override.lock().unwrap().clone();
        if let Some(bytes) = reply {
            return Ok(ResponseModel::ok(self.reply_raw(
                conversation_id,
                ciphertext,
                &bytes,
            )));
        }
        Ok(self.state.exchange(conversation_id, ciphertext))
    }
}

pub struct Harness {
    pub peer: Arc<LocalPeer>,
    pub store: Arc<SessionStateStore>,
    pub orchestrator: Arc<HandshakeOrchestrator<LocalPeer, DrbgEngine>>,
    pub monitor: Arc<ReseedMonitor>,
}

pub fn harness() -> Harness {
    harness_with(DrbgConfig::default(), Duration::from_secs(5))
}

/// Client and peer share the same engine configuration.
pub fn harness_with(engine: DrbgConfig, request_timeout: Duration) -> Harness {
    let peer = Arc::new(LocalPeer::new(engine.clone()));
    let store = Arc::new(SessionStateStore::new(StoreConfig::default()));
    let orchestrator = Arc::new(HandshakeOrchestrator::new(
        peer.clone(),
        store.clone(),
        engine,
        request_timeout,
    ));
    Harness {
        peer,
        store,
        orchestrator,
        monitor: Arc::new(ReseedMonitor::default()),
    }
}
