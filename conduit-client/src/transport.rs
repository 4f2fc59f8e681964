use std::future::Future;
use std::time::Duration;

use conduit_core::wire::{
    CLIENT_ID_HEADER, HANDSHAKE_ROUTE, JSON_CONTENT_TYPE, MESSAGE_ROUTE, TEXT_CONTENT_TYPE,
};
use conduit_core::{HandshakeModel, ResponseModel, TransportError};
use reqwest::header::CONTENT_TYPE;
use serde::de::DeserializeOwned;
use tracing::debug;

/// Connection to the remote peer.
///
/// A non-success `ResponseModel` is a normal return value; only failures to
/// obtain one are `TransportError`s.
pub trait PeerTransport: Send + Sync + 'static {
    fn handshake(
        &self,
        conversation_id: &str,
        request: &HandshakeModel,
    ) -> impl Future<Output = Result<ResponseModel<HandshakeModel>, TransportError>> + Send;

    /// Send base64 ciphertext; the reply's `Data` is the peer's ciphertext.
    fn send_message(
        &self,
        conversation_id: &str,
        ciphertext: &str,
    ) -> impl Future<Output = Result<ResponseModel<String>, TransportError>> + Send;
}

/// HTTP/JSON transport to the peer's handshake and message routes.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl HttpTransport {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, TransportError> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TransportError::Request {
                route: base_url.clone(),
                reason: e.to_string(),
            })?;

        Ok(Self {
            client,
            base_url,
            timeout,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, route: &str) -> String {
        format!("{}{}", self.base_url, route)
    }

    fn map_error(&self, route: &str, e: reqwest::Error) -> TransportError {
        if e.is_timeout() {
            TransportError::Timeout {
                route: route.to_string(),
                millis: u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX),
            }
        } else if e.is_decode() {
            TransportError::Decode {
                route: route.to_string(),
                reason: e.to_string(),
            }
        } else {
            TransportError::Request {
                route: route.to_string(),
                reason: e.to_string(),
            }
        }
    }

    async fn read<T: DeserializeOwned>(
        &self,
        route: &str,
        response: reqwest::Response,
    ) -> Result<ResponseModel<T>, TransportError> {
        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Status {
                route: route.to_string(),
                status: status.as_u16(),
            });
        }

        let body = response
            .text()
            .await
            .map_err(|e| self.map_error(route, e))?;
        serde_json::from_str(&body).map_err(|e| TransportError::Decode {
            route: route.to_string(),
            reason: e.to_string(),
        })
    }
}

impl PeerTransport for HttpTransport {
    async fn handshake(
        &self,
        conversation_id: &str,
        request: &HandshakeModel,
    ) -> Result<ResponseModel<HandshakeModel>, TransportError> {
        debug!(conversation_id = %conversation_id, "POST {}", HANDSHAKE_ROUTE);
        let response = self
            .client
            .post(self.url(HANDSHAKE_ROUTE))
            .header(CLIENT_ID_HEADER, conversation_id)
            .header(CONTENT_TYPE, JSON_CONTENT_TYPE)
            .json(request)
            .send()
            .await
            .map_err(|e| self.map_error(HANDSHAKE_ROUTE, e))?;

        self.read(HANDSHAKE_ROUTE, response).await
    }

    async fn send_message(
        &self,
        conversation_id: &str,
        ciphertext: &str,
    ) -> Result<ResponseModel<String>, TransportError> {
        debug!(conversation_id = %conversation_id, "POST {}", MESSAGE_ROUTE);
        let response = self
            .client
            .post(self.url(MESSAGE_ROUTE))
            .header(CLIENT_ID_HEADER, conversation_id)
            .header(CONTENT_TYPE, TEXT_CONTENT_TYPE)
            .body(ciphertext.to_string())
            .send()
            .await
            .map_err(|e| self.map_error(MESSAGE_ROUTE, e))?;

        self.read(MESSAGE_ROUTE, response).await
    }
}
