//! WebSocket handler for realtime conversation turns.
//!
//! `GET /ws/chat` upgrades the connection, sends a `connected` event, then
//! runs a sequential read loop: each inbound JSON question runs one turn
//! and every turn event is relayed to the client in order as a text frame.
//!
//! Malformed frames get an immediate `error` event without touching the
//! orchestrator. Disconnecting mid-stream stops delivery but never cancels
//! the turn; the answer is persisted by the orchestrator's background task.
//! On disconnect the last active session is ended.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use uuid::Uuid;

use parlance_core::chat::TurnRequest;
use parlance_types::TurnEvent;

use crate::state::AppState;

/// An inbound question frame.
#[derive(Debug, serde::Deserialize)]
struct WsQuestion {
    user_id: String,
    question: String,
    chat_id: Option<Uuid>,
    session_id: Option<Uuid>,
}

/// Upgrade an HTTP request to a WebSocket conversation.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_ws_connection(socket, state))
}

async fn handle_ws_connection(mut socket: WebSocket, state: AppState) {
    let connected = TurnEvent::Connected {
        message: "connection established".to_string(),
    };
    if send_event(&mut socket, &connected).await.is_err() {
        return;
    }

    // (chat_id, session_id) of the most recent turn, ended on disconnect.
    let mut last_session: Option<(Uuid, Uuid)> = None;

    'conn: while let Some(frame) = socket.recv().await {
        let text = match frame {
            Ok(Message::Text(text)) => text,
            Ok(Message::Close(_)) | Err(_) => break,
            // Binary and protocol frames are ignored.
            Ok(_) => continue,
        };

        let request = match parse_question(&text) {
            Ok(request) => request,
            Err(message) => {
                tracing::debug!(error = %message, "rejecting malformed question frame");
                let event = TurnEvent::Error {
                    message,
                    message_id: None,
                };
                if send_event(&mut socket, &event).await.is_err() {
                    break;
                }
                continue;
            }
        };

        let turn = state
            .orchestrator
            .run(TurnRequest {
                user_id: request.user_id,
                chat_id: request.chat_id,
                session_id: request.session_id,
                question: request.question,
            })
            .await;

        let mut turn = match turn {
            Ok(turn) => turn,
            Err(err) => {
                // Busy and start-phase failures surface as a terminal error
                // event; the connection stays open for a retry.
                let event = TurnEvent::Error {
                    message: err.to_string(),
                    message_id: None,
                };
                if send_event(&mut socket, &event).await.is_err() {
                    break;
                }
                continue;
            }
        };

        last_session = Some((turn.chat_id, turn.session_id));
        while let Some(event) = turn.recv().await {
            if send_event(&mut socket, &event).await.is_err() {
                // Client gone; the orchestrator finishes the turn without us.
                break 'conn;
            }
        }
    }

    if let Some((chat_id, session_id)) = last_session {
        if let Err(err) = state.orchestrator.end_session(chat_id, session_id).await {
            tracing::warn!(
                chat_id = %chat_id,
                session_id = %session_id,
                error = %err,
                "failed to end session on disconnect"
            );
        }
    }
    tracing::debug!("websocket connection closed");
}

fn parse_question(text: &str) -> Result<WsQuestion, String> {
    let request: WsQuestion =
        serde_json::from_str(text).map_err(|e| format!("invalid question payload: {e}"))?;
    if request.user_id.trim().is_empty() {
        return Err("user_id must not be empty".to_string());
    }
    if request.question.trim().is_empty() {
        return Err("question must not be empty".to_string());
    }
    Ok(request)
}

async fn send_event(socket: &mut WebSocket, event: &TurnEvent) -> Result<(), axum::Error> {
    let json = match serde_json::to_string(event) {
        Ok(json) => json,
        Err(err) => {
            tracing::warn!(error = %err, "failed to serialize turn event");
            return Ok(());
        }
    };
    socket.send(Message::Text(json.into())).await
}
