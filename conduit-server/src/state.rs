use std::sync::Arc;

use conduit_core::crypto::KeyExchange;
use conduit_core::validation::{validate_conversation_id, validate_matching_ids};
use conduit_core::wire::codes;
use conduit_core::{
    ConduitError, DrbgConfig, DrbgEngine, EngineRole, HandshakeModel, ResponseModel,
    SeedMaterial, SessionStateStore, StatefulEngine, StoreConfig,
};
use tracing::{debug, info, warn};

/// Server side of the handshake and echo exchange.
///
/// Holds one encoder and one decoder per conversation in its own encrypted
/// store. The peer's decoder pairs with the client's encoder, and the
/// peer's encoder with the client's decoder.
pub struct PeerState {
    store: Arc<SessionStateStore>,
    engine_config: DrbgConfig,
}

impl PeerState {
    pub fn new(store_config: StoreConfig, engine_config: DrbgConfig) -> Self {
        Self {
            store: Arc::new(SessionStateStore::new(store_config)),
            engine_config,
        }
    }

    pub fn store(&self) -> &Arc<SessionStateStore> {
        &self.store
    }

    /// Whether both channels of a conversation are held.
    pub fn has_conversation(&self, conversation_id: &str) -> bool {
        self.store.contains(EngineRole::Encoder, conversation_id)
            && self.store.contains(EngineRole::Decoder, conversation_id)
    }

    /// Drop all state for a conversation, as if it had expired.
    pub fn forget(&self, conversation_id: &str) {
        self.store.remove_conversation(conversation_id);
        info!(conversation_id = %conversation_id, "Forgot conversation state");
    }

    /// Run the mirrored ECDH derivation and seed this side's engine pair.
    pub fn handshake(
        &self,
        client_id: &str,
        request: HandshakeModel,
    ) -> ResponseModel<HandshakeModel> {
        if let Err(e) = validate_matching_ids(client_id, &request.conversation_identifier) {
            warn!(client_id = %client_id, "Rejected handshake: {}", e);
            return ResponseModel::failure(codes::VALIDATION_ERROR, e);
        }
        let conversation_id = request.conversation_identifier.as_str();

        let mut decoder_kex = KeyExchange::new();
        let mut encoder_kex = KeyExchange::new();
        let keys = decoder_kex
            .generate_key_pair()
            .and_then(|decoder_pub| Ok((decoder_pub, encoder_kex.generate_key_pair()?)));
        let (decoder_pub, encoder_pub) = match keys {
            Ok(keys) => keys,
            Err(e) => {
                warn!(conversation_id = %conversation_id, "Key generation failed: {}", e);
                return ResponseModel::failure(codes::HANDSHAKE_EXCEPTION, e.to_string());
            }
        };

        let secrets = decoder_kex
            .derive_shared_secret(&request.client_encoder_public_key)
            .and_then(|decoder_secret| {
                let encoder_secret =
                    encoder_kex.derive_shared_secret(&request.client_decoder_public_key)?;
                Ok((encoder_secret, decoder_secret))
            });
        let (encoder_secret, decoder_secret) = match secrets {
            Ok(secrets) => secrets,
            Err(e) => {
                warn!(conversation_id = %conversation_id, "Key agreement failed: {}", e);
                return ResponseModel::failure(codes::HANDSHAKE_EXCEPTION, e.to_string());
            }
        };

        let timestamp = u64::try_from(chrono::Utc::now().timestamp_millis()).unwrap_or_default();
        let engine = |role, entropy: &[u8]| {
            DrbgEngine::instantiate(
                &self.engine_config,
                role,
                SeedMaterial {
                    entropy,
                    nonce: timestamp,
                    personalization: conversation_id,
                },
            )
        };
        let engines = engine(EngineRole::Encoder, encoder_secret.as_ref()).and_then(|encoder| {
            let decoder = engine(EngineRole::Decoder, decoder_secret.as_ref())?;
            Ok((encoder, decoder))
        });
        let (encoder, decoder) = match engines {
            Ok(engines) => engines,
            Err(e) => {
                warn!(conversation_id = %conversation_id, "Engine instantiation failed: {}", e);
                return ResponseModel::failure(codes::STATE_CREATION, e.to_string());
            }
        };

        // A rehandshake replaces whatever was held before.
        self.store.remove_conversation(conversation_id);
        let persisted = self
            .store
            .put_engine(conversation_id, encoder)
            .and_then(|_| self.store.put_engine(conversation_id, decoder));
        if let Err(e) = persisted {
            self.store.remove_conversation(conversation_id);
            warn!(conversation_id = %conversation_id, "Failed to persist engine state: {}", e);
            return ResponseModel::failure(codes::STATE_SAVE, e.to_string());
        }

        info!(conversation_id = %conversation_id, timestamp, "Handshake complete");
        ResponseModel::ok(HandshakeModel {
            timestamp: timestamp.to_string(),
            conversation_identifier: conversation_id.to_string(),
            client_encoder_public_key: decoder_pub,
            client_decoder_public_key: encoder_pub,
        })
    }

    /// Decode a client message and echo it back encoded on the return channel.
    pub fn exchange(&self, client_id: &str, ciphertext: &str) -> ResponseModel<String> {
        if let Err(e) = validate_conversation_id(client_id) {
            warn!("Rejected message: {}", e);
            return ResponseModel::failure(codes::VALIDATION_ERROR, e);
        }

        let decoder = self.store.take_engine(EngineRole::Decoder, client_id);
        let mut decoder: DrbgEngine = match decoder {
            Ok(decoder) => decoder,
            Err(e) => return state_failure(client_id, e),
        };

        let plaintext = match decoder.decode(ciphertext) {
            Ok(plaintext) => plaintext,
            Err(e) => {
                warn!(conversation_id = %client_id, "Decode failed: {}", e);
                // The failed decode did not advance the stream.
                if let Err(e) = self.store.put_engine(client_id, decoder) {
                    warn!(conversation_id = %client_id, "Failed to restore decoder: {}", e);
                }
                return ResponseModel::failure(codes::DECODE_EXCEPTION, e.to_string());
            }
        };
        debug!(conversation_id = %client_id, bytes = plaintext.len(), "Decoded message");

        let encoder = self.store.take_engine(EngineRole::Encoder, client_id);
        let mut encoder: DrbgEngine = match encoder {
            Ok(encoder) => encoder,
            Err(e) => {
                // The decoder has advanced past a message that cannot be answered.
                self.store.remove_conversation(client_id);
                return state_failure(client_id, e);
            }
        };

        let reply = match encoder.encode(&plaintext) {
            Ok(reply) => reply,
            Err(e) => {
                warn!(conversation_id = %client_id, "Encode failed: {}", e);
                self.store.remove_conversation(client_id);
                return ResponseModel::failure(codes::ENCODE_EXCEPTION, e.to_string());
            }
        };

        let persisted = self
            .store
            .put_engine(client_id, encoder)
            .and_then(|_| self.store.put_engine(client_id, decoder));
        if let Err(e) = persisted {
            self.store.remove_conversation(client_id);
            warn!(conversation_id = %client_id, "Failed to persist engine state: {}", e);
            return ResponseModel::failure(codes::STATE_SAVE, e.to_string());
        }

        ResponseModel::ok(reply)
    }
}

impl Default for PeerState {
    fn default() -> Self {
        Self::new(StoreConfig::default(), DrbgConfig::default())
    }
}

fn state_failure<T>(conversation_id: &str, err: ConduitError) -> ResponseModel<T> {
    if err.is_state_not_found() {
        info!(conversation_id = %conversation_id, "No state for conversation");
        ResponseModel::failure(codes::STATE_NOT_FOUND, "State not found")
    } else {
        warn!(conversation_id = %conversation_id, "Failed to restore engine state: {}", err);
        ResponseModel::failure(codes::STATE_RETRIEVAL, err.to_string())
    }
}
