//! Management REST handlers.
//!
//! Endpoints:
//! - GET   /api/chats?user_id=&limit=&cursor=           - List a user's chats
//! - GET   /api/chats/{chat_id}/messages?limit=&cursor= - List messages (ascending)
//! - GET   /api/chats/{chat_id}/sessions?limit=&cursor= - List sessions
//! - PATCH /api/chats/{chat_id}/title?user_id=          - Rename a chat

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use uuid::Uuid;

use parlance_core::chat::ChatStore;
use parlance_types::{Chat, Message, Page, Session};

use crate::http::error::AppError;
use crate::state::AppState;

/// Query parameters for chat listing.
#[derive(Debug, Deserialize)]
pub struct ChatListQuery {
    pub user_id: String,
    #[serde(default = "default_limit")]
    pub limit: u32,
    pub cursor: Option<String>,
}

/// Query parameters for message and session listing.
#[derive(Debug, Deserialize)]
pub struct PageQuery {
    #[serde(default = "default_limit")]
    pub limit: u32,
    pub cursor: Option<String>,
}

fn default_limit() -> u32 {
    50
}

#[derive(Debug, Deserialize)]
pub struct UserQuery {
    pub user_id: String,
}

#[derive(Debug, Deserialize)]
pub struct TitleBody {
    pub title: String,
}

/// GET /api/chats - List a user's chats, most recently updated first.
pub async fn list_chats(
    State(state): State<AppState>,
    Query(query): Query<ChatListQuery>,
) -> Result<Json<Page<Chat>>, AppError> {
    if query.user_id.trim().is_empty() {
        return Err(AppError::Validation("user_id must not be empty".to_string()));
    }
    let page = state
        .orchestrator
        .store()
        .list_chats(&query.user_id, query.limit, query.cursor.as_deref())
        .await?;
    Ok(Json(page))
}

/// GET /api/chats/{chat_id}/messages - List a chat's messages in order.
pub async fn list_messages(
    State(state): State<AppState>,
    Path(chat_id): Path<Uuid>,
    Query(query): Query<PageQuery>,
) -> Result<Json<Page<Message>>, AppError> {
    let page = state
        .orchestrator
        .store()
        .list_messages(chat_id, query.limit, query.cursor.as_deref())
        .await?;
    Ok(Json(page))
}

/// GET /api/chats/{chat_id}/sessions - List a chat's sessions.
pub async fn list_sessions(
    State(state): State<AppState>,
    Path(chat_id): Path<Uuid>,
    Query(query): Query<PageQuery>,
) -> Result<Json<Page<Session>>, AppError> {
    let page = state
        .orchestrator
        .store()
        .list_sessions(chat_id, query.limit, query.cursor.as_deref())
        .await?;
    Ok(Json(page))
}

/// PATCH /api/chats/{chat_id}/title - Rename a chat. 204 on success.
pub async fn update_title(
    State(state): State<AppState>,
    Path(chat_id): Path<Uuid>,
    Query(query): Query<UserQuery>,
    Json(body): Json<TitleBody>,
) -> Result<StatusCode, AppError> {
    let title = body.title.trim();
    if title.is_empty() {
        return Err(AppError::Validation("title must not be empty".to_string()));
    }
    state
        .orchestrator
        .store()
        .update_chat_title(&query.user_id, chat_id, title)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
