use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use conduit_core::crypto::KeyExchange;
use conduit_core::validation::validate_conversation_id;
use conduit_core::wire::{codes, HANDSHAKE_ROUTE};
use conduit_core::{
    ConduitError, DrbgEngine, EngineRole, HandshakeModel, Result, SeedMaterial,
    SessionStateStore, StatefulEngine, TransportError,
};
use tracing::{info, warn};

use crate::transport::PeerTransport;

/// Runs the two-channel ECDH handshake and seeds the engine pair for a
/// conversation.
///
/// The client's encoder key is agreed against the key the peer returns
/// under `ClientEncoderPublicKey` (the peer's decoder), and the client's
/// decoder key against `ClientDecoderPublicKey` (the peer's encoder), so
/// each direction has its own secret. Timestamp and conversation id are the
/// nonce and personalization for both engines.
pub struct HandshakeOrchestrator<T, E: StatefulEngine = DrbgEngine> {
    transport: Arc<T>,
    store: Arc<SessionStateStore>,
    engine_config: E::Config,
    request_timeout: Duration,
}

impl<T: PeerTransport, E: StatefulEngine> HandshakeOrchestrator<T, E> {
    pub fn new(
        transport: Arc<T>,
        store: Arc<SessionStateStore>,
        engine_config: E::Config,
        request_timeout: Duration,
    ) -> Self {
        Self {
            transport,
            store,
            engine_config,
            request_timeout,
        }
    }

    pub fn transport(&self) -> &Arc<T> {
        &self.transport
    }

    pub fn store(&self) -> &Arc<SessionStateStore> {
        &self.store
    }

    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    /// Establish (or replace) the session for `conversation_id`.
    ///
    /// Nothing is written to the store unless both engines instantiate, and
    /// a failed write leaves no half session behind.
    pub async fn handshake(&self, conversation_id: &str) -> Result<()> {
        validate_conversation_id(conversation_id).map_err(|message| ConduitError::Handshake {
            result_code: codes::VALIDATION_ERROR.to_string(),
            message,
        })?;

        let mut encoder_kex = KeyExchange::new();
        let mut decoder_kex = KeyExchange::new();
        let request = HandshakeModel::request(
            conversation_id,
            encoder_kex.generate_key_pair()?,
            decoder_kex.generate_key_pair()?,
        );

        let response = bounded(
            HANDSHAKE_ROUTE,
            self.request_timeout,
            self.transport.handshake(conversation_id, &request),
        )
        .await?;

        if !response.success {
            warn!(
                conversation_id = %conversation_id,
                result_code = %response.result_code,
                "Handshake rejected: {}",
                response.message
            );
            return Err(ConduitError::Handshake {
                result_code: response.result_code,
                message: response.message,
            });
        }
        let peer = response.data.ok_or_else(|| ConduitError::Handshake {
            result_code: codes::HANDSHAKE_EXCEPTION.to_string(),
            message: "Handshake response carried no data".to_string(),
        })?;
        if peer.conversation_identifier != conversation_id {
            return Err(ConduitError::Handshake {
                result_code: codes::HANDSHAKE_EXCEPTION.to_string(),
                message: format!(
                    "Peer answered for conversation {:?}",
                    peer.conversation_identifier
                ),
            });
        }
        let nonce = peer.nonce().map_err(|message| ConduitError::Handshake {
            result_code: codes::HANDSHAKE_EXCEPTION.to_string(),
            message,
        })?;

        let encoder_secret = encoder_kex.derive_shared_secret(&peer.client_encoder_public_key)?;
        let decoder_secret = decoder_kex.derive_shared_secret(&peer.client_decoder_public_key)?;

        let encoder = E::instantiate(
            &self.engine_config,
            EngineRole::Encoder,
            SeedMaterial {
                entropy: encoder_secret.as_bytes(),
                nonce,
                personalization: conversation_id,
            },
        )?;
        let decoder = E::instantiate(
            &self.engine_config,
            EngineRole::Decoder,
            SeedMaterial {
                entropy: decoder_secret.as_bytes(),
                nonce,
                personalization: conversation_id,
            },
        )?;

        self.store.remove_conversation(conversation_id);
        let persisted = self
            .store
            .put_engine(conversation_id, encoder)
            .and_then(|_| self.store.put_engine(conversation_id, decoder));
        if let Err(e) = persisted {
            self.store.remove_conversation(conversation_id);
            return Err(e);
        }

        info!(conversation_id = %conversation_id, nonce, "Handshake complete");
        Ok(())
    }
}

/// Await a transport call, failing with `TransportError::Timeout` after
/// `limit`.
pub(crate) async fn bounded<F, R>(route: &str, limit: Duration, call: F) -> Result<R>
where
    F: Future<Output = std::result::Result<R, TransportError>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => Ok(result?),
        Err(_) => Err(TransportError::Timeout {
            route: route.to_string(),
            millis: u64::try_from(limit.as_millis()).unwrap_or(u64::MAX),
        }
        .into()),
    }
}
