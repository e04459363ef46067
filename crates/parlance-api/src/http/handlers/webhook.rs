//! WhatsApp webhook endpoints.
//!
//! Meta delivers at-least-once and retries on non-200 responses, so the POST
//! handler acknowledges immediately and does all real work (including
//! sending the reply) on a background task. Malformed payloads are logged
//! and still acknowledged; returning an error would only trigger redelivery
//! of the same bad payload.

use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use std::sync::Arc;

use parlance_types::whatsapp::WHATSAPP_OBJECT;
use parlance_types::WebhookPayload;

use crate::state::AppState;

/// Query parameters of Meta's verification handshake.
#[derive(Debug, Deserialize)]
pub struct VerifyQuery {
    #[serde(rename = "hub.mode")]
    pub mode: Option<String>,
    #[serde(rename = "hub.verify_token")]
    pub verify_token: Option<String>,
    #[serde(rename = "hub.challenge")]
    pub challenge: Option<String>,
}

/// GET /webhook/whatsapp - Verification handshake.
///
/// Echoes `hub.challenge` when `hub.mode` is `subscribe` and the token
/// matches the configured one; 403 otherwise.
pub async fn verify_webhook(
    State(state): State<AppState>,
    Query(query): Query<VerifyQuery>,
) -> Response {
    match verification_challenge(state.settings.whatsapp.verify_token.as_deref(), &query) {
        Some(challenge) => {
            tracing::info!("webhook verification succeeded");
            (StatusCode::OK, challenge).into_response()
        }
        None => {
            tracing::warn!("webhook verification failed");
            (StatusCode::FORBIDDEN, "verification failed").into_response()
        }
    }
}

fn verification_challenge(expected_token: Option<&str>, query: &VerifyQuery) -> Option<String> {
    let expected = expected_token?;
    if query.mode.as_deref() != Some("subscribe") {
        return None;
    }
    if query.verify_token.as_deref() != Some(expected) {
        return None;
    }
    query.challenge.clone()
}

/// POST /webhook/whatsapp - Receive a message delivery.
///
/// Always 200; processing happens in the background.
pub async fn receive_webhook(State(state): State<AppState>, body: Bytes) -> Json<serde_json::Value> {
    match serde_json::from_slice::<WebhookPayload>(&body) {
        Ok(payload) if payload.object == WHATSAPP_OBJECT => {
            let channel = Arc::clone(&state.channel);
            tokio::spawn(async move {
                channel.process_payload(payload).await;
            });
        }
        Ok(payload) => {
            tracing::debug!(object = %payload.object, "ignoring webhook for unknown object");
        }
        Err(err) => {
            tracing::warn!(error = %err, "unparseable webhook payload acknowledged");
        }
    }

    Json(serde_json::json!({ "status": "received" }))
}
