use std::sync::Arc;

use conduit_core::wire::{codes, MESSAGE_ROUTE};
use conduit_core::{
    ConduitError, DrbgEngine, EngineError, EngineRole, ReseedDecision, ReseedMonitor, Result,
    StatefulEngine,
};
use tracing::{debug, info, warn};

use crate::handshake::{bounded, HandshakeOrchestrator};
use crate::transport::PeerTransport;

/// How a round trip ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TripOutcome {
    /// Reply decoded and both states persisted.
    Completed { reply: String },
    /// Reply decoded, then both engines were retired and the conversation
    /// rehandshaked because a counter passed the reseed threshold.
    Rotated { reply: String },
    /// State was missing locally or on the peer. The conversation was
    /// rehandshaked and the trip abandoned.
    Recovered,
}

/// One conversation's session with the peer.
///
/// Round trips take `&mut self`, so a conversation's live state is never
/// restored by two operations at once.
pub struct Conversation<T, E: StatefulEngine = DrbgEngine> {
    id: String,
    orchestrator: Arc<HandshakeOrchestrator<T, E>>,
    monitor: Arc<ReseedMonitor>,
}

impl<T: PeerTransport, E: StatefulEngine> Conversation<T, E> {
    /// Handshake `id` and return the open conversation.
    pub async fn open(
        id: impl Into<String>,
        orchestrator: Arc<HandshakeOrchestrator<T, E>>,
        monitor: Arc<ReseedMonitor>,
    ) -> Result<Self> {
        let id = id.into();
        orchestrator.handshake(&id).await?;
        Ok(Self {
            id,
            orchestrator,
            monitor,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    async fn rehandshake(&self, reason: &str) -> Result<TripOutcome> {
        info!(conversation_id = %self.id, reason, "Rehandshaking");
        self.orchestrator.handshake(&self.id).await?;
        Ok(TripOutcome::Recovered)
    }

    /// Encode `message`, exchange it with the peer, and decode the reply.
    pub async fn round_trip(&mut self, message: &str) -> Result<TripOutcome> {
        let store = self.orchestrator.store().clone();
        let id = self.id.as_str();

        let mut encoder: E = match store.take_engine(EngineRole::Encoder, id) {
            Ok(encoder) => encoder,
            Err(e) if e.is_state_not_found() => {
                return self.rehandshake("encoder state missing").await;
            }
            Err(e) => return Err(e),
        };

        // From here until the encoder is stored again, any early return drops
        // it; the next trip then finds no state and rehandshakes.
        let ciphertext = encoder.encode(message.as_bytes())?;
        let encoder_counter = encoder.reseed_counter();
        debug!(
            conversation_id = %id,
            preview = %ciphertext.chars().take(16).collect::<String>(),
            "Encoded message"
        );

        let response = bounded(
            MESSAGE_ROUTE,
            self.orchestrator.request_timeout(),
            self.orchestrator.transport().send_message(id, &ciphertext),
        )
        .await?;

        if response.is_state_not_found() {
            drop(encoder);
            return self.rehandshake("peer has no state").await;
        }
        if !response.success {
            warn!(
                conversation_id = %id,
                result_code = %response.result_code,
                "Peer rejected message: {}",
                response.message
            );
            return Err(ConduitError::PeerRejected {
                result_code: response.result_code,
                message: response.message,
            });
        }
        let reply_ciphertext = response.data.ok_or_else(|| ConduitError::PeerRejected {
            result_code: codes::DECODE_EXCEPTION.to_string(),
            message: "Peer reply carried no data".to_string(),
        })?;

        store.put_engine(id, encoder)?;

        let mut decoder: E = match store.take_engine(EngineRole::Decoder, id) {
            Ok(decoder) => decoder,
            Err(e) if e.is_state_not_found() => {
                return self.rehandshake("decoder state missing").await;
            }
            Err(e) => return Err(e),
        };

        let plaintext = match decoder.decode(&reply_ciphertext) {
            Ok(plaintext) => plaintext,
            Err(e) => {
                // Both directions are suspect now; force a fresh session next trip.
                store.remove_conversation(id);
                return Err(e.into());
            }
        };
        let reply = match String::from_utf8(plaintext) {
            Ok(reply) => reply,
            Err(e) => {
                // The reply authenticated, so both streams are still in step.
                warn!(conversation_id = %id, "Peer reply is not UTF-8");
                store.put_engine(id, decoder)?;
                return Err(EngineError::Malformed(format!("reply is not UTF-8: {}", e)).into());
            }
        };

        match self.monitor.check(id, encoder_counter, &decoder) {
            ReseedDecision::Persist => {
                store.put_engine(id, decoder)?;
                Ok(TripOutcome::Completed { reply })
            }
            ReseedDecision::Rotate => {
                decoder.uninstantiate()?;
                match store.take_engine::<E>(EngineRole::Encoder, id) {
                    Ok(encoder) => encoder.uninstantiate()?,
                    Err(e) if e.is_state_not_found() => {}
                    Err(e) => return Err(e),
                }
                self.orchestrator.handshake(id).await?;
                Ok(TripOutcome::Rotated { reply })
            }
        }
    }
}
