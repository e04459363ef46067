//! Chat, session, and message types for Parlance.
//!
//! These types model the conversation hierarchy: a durable `Chat` owned by
//! one user, containing bounded `Session` windows of activity and an ordered
//! stream of immutable `Message`s.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use std::fmt;
use std::str::FromStr;

/// Maximum length of an auto-generated chat title (from the first question).
const TITLE_MAX_CHARS: usize = 50;

/// Maximum length of the chat's last-message preview.
const PREVIEW_MAX_CHARS: usize = 160;

/// Who authored a message within a chat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
}

impl fmt::Display for MessageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageRole::User => write!(f, "user"),
            MessageRole::Assistant => write!(f, "assistant"),
        }
    }
}

impl FromStr for MessageRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "user" => Ok(MessageRole::User),
            "assistant" => Ok(MessageRole::Assistant),
            other => Err(format!("invalid message role: '{other}'")),
        }
    }
}

/// A durable, user-owned conversation thread container.
///
/// A chat is created on the first turn when no `chat_id` is supplied. Only
/// `title`, `updated_at`, and `preview` mutate after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chat {
    pub chat_id: Uuid,
    pub user_id: String,
    pub title: String,
    #[serde(with = "crate::key::serde_sort_ts")]
    pub created_at: DateTime<Utc>,
    /// Serialized fixed-width so chat listings can order on the raw string.
    #[serde(with = "crate::key::serde_sort_ts")]
    pub updated_at: DateTime<Utc>,
    /// Truncated text of the most recent message, for chat lists.
    pub preview: Option<String>,
}

/// A bounded window of activity within a chat.
///
/// A chat accumulates many sessions over its lifetime (reconnects, inactivity
/// timeouts, explicit resets). At most one session per chat is active at a
/// time; the store enforces this in the same write that creates a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub session_id: Uuid,
    pub chat_id: Uuid,
    pub user_id: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub is_active: bool,
}

/// A single immutable message within a chat.
///
/// Messages are ordered by their sort key (`MSG#<timestamp>#<message_id>`);
/// the UUIDv7 message id disambiguates same-timestamp collisions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub message_id: Uuid,
    pub chat_id: Uuid,
    pub user_id: String,
    pub role: MessageRole,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// One page of a cursor-paginated listing.
///
/// `next_cursor` is an opaque position of the last returned item (exclusive
/// start for the next page); `None` means the listing is exhausted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub next_cursor: Option<String>,
}

impl<T> Page<T> {
    /// An empty, exhausted page.
    pub fn empty() -> Self {
        Self {
            items: Vec::new(),
            next_cursor: None,
        }
    }
}

/// Derive a chat title from the first question of the conversation.
///
/// Truncated to 50 characters with a trailing ellipsis, matching the
/// title shown in chat lists.
pub fn title_from_question(question: &str) -> String {
    if question.chars().count() > TITLE_MAX_CHARS {
        let truncated: String = question.chars().take(TITLE_MAX_CHARS).collect();
        format!("{truncated}...")
    } else {
        question.to_string()
    }
}

/// Derive the chat preview from a message body (first 160 characters).
pub fn preview_from(content: &str) -> String {
    content.chars().take(PREVIEW_MAX_CHARS).collect()
}
