//! Axum router configuration with middleware.
//!
//! Three surfaces: management REST under `/api/`, the realtime WebSocket at
//! `/ws/chat`, and the WhatsApp webhook at `/webhook/whatsapp`.
//! Middleware: CORS, request tracing.

use axum::routing::{get, patch};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::http::handlers;
use crate::state::AppState;

/// Build the complete router with all routes and middleware.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Management REST
        .route("/api/chats", get(handlers::chat::list_chats))
        .route(
            "/api/chats/{chat_id}/messages",
            get(handlers::chat::list_messages),
        )
        .route(
            "/api/chats/{chat_id}/sessions",
            get(handlers::chat::list_sessions),
        )
        .route(
            "/api/chats/{chat_id}/title",
            patch(handlers::chat::update_title),
        )
        // Realtime channel
        .route("/ws/chat", get(handlers::ws::ws_handler))
        // WhatsApp webhook
        .route(
            "/webhook/whatsapp",
            get(handlers::webhook::verify_webhook).post(handlers::webhook::receive_webhook),
        )
        .route("/health", get(health_check))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// GET /health - Simple health check endpoint.
async fn health_check() -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
