use std::sync::Arc;

use axum::extract::State;
use axum::http::HeaderMap;
use axum::routing::post;
use axum::{Json, Router};
use conduit_core::wire::{codes, CLIENT_ID_HEADER, HANDSHAKE_ROUTE, MESSAGE_ROUTE};
use conduit_core::{HandshakeModel, ResponseModel};
use tracing::{debug, warn};

use crate::state::PeerState;

/// HTTP routes for the handshake and message exchange.
pub fn router(state: Arc<PeerState>) -> Router {
    Router::new()
        .route(HANDSHAKE_ROUTE, post(handle_handshake))
        .route(MESSAGE_ROUTE, post(handle_message))
        .with_state(state)
}

fn client_id(headers: &HeaderMap) -> Result<&str, String> {
    headers
        .get(CLIENT_ID_HEADER)
        .ok_or_else(|| format!("Missing {} header", CLIENT_ID_HEADER))?
        .to_str()
        .map_err(|_| format!("Invalid {} header", CLIENT_ID_HEADER))
}

async fn handle_handshake(
    State(state): State<Arc<PeerState>>,
    headers: HeaderMap,
    body: String,
) -> Json<ResponseModel<HandshakeModel>> {
    let client_id = match client_id(&headers) {
        Ok(id) => id,
        Err(e) => {
            warn!("Rejected handshake: {}", e);
            return Json(ResponseModel::failure(codes::VALIDATION_ERROR, e));
        }
    };

    let request: HandshakeModel = match serde_json::from_str(&body) {
        Ok(request) => request,
        Err(e) => {
            warn!(client_id = %client_id, "Invalid handshake body: {}", e);
            return Json(ResponseModel::failure(
                codes::VALIDATION_ERROR,
                format!("Invalid handshake body: {}", e),
            ));
        }
    };

    Json(state.handshake(client_id, request))
}

async fn handle_message(
    State(state): State<Arc<PeerState>>,
    headers: HeaderMap,
    body: String,
) -> Json<ResponseModel<String>> {
    let client_id = match client_id(&headers) {
        Ok(id) => id,
        Err(e) => {
            warn!("Rejected message: {}", e);
            return Json(ResponseModel::failure(codes::VALIDATION_ERROR, e));
        }
    };

    debug!(
        client_id = %client_id,
        preview = %body.chars().take(16).collect::<String>(),
        "Received message"
    );
    Json(state.exchange(client_id, &body))
}
