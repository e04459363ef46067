//! Turn event protocol.
//!
//! One turn emits an ordered, finite sequence of [`TurnEvent`]s:
//! `start`, zero or more `agent_response`, then exactly one of `end` or
//! `error`. The serialized shape is the realtime channel's wire protocol and
//! is a compatibility contract:
//!
//! ```json
//! {"type":"start","session_id":"...","chat_id":"...","message_id":"..."}
//! {"type":"agent_response","message_id":"...","content":"..."}
//! {"type":"end","message_id":"...","session_id":"...","chat_id":"...","full_text":"..."}
//! {"type":"error","message":"..."}
//! ```
//!
//! `agent_response.content` carries the **cumulative** text so far, not a
//! delta: consumers replace their displayed buffer on each event. Clients of
//! the original service depend on replace-not-append, so this must not be
//! "optimized" into delta streaming.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// An event emitted during one conversation turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TurnEvent {
    /// Sent once when a realtime connection is established.
    Connected { message: String },

    /// The turn has started: ids are resolved and the user message persisted.
    Start {
        session_id: Uuid,
        chat_id: Uuid,
        message_id: Uuid,
    },

    /// Incremental agent output. `content` is the full accumulated text.
    AgentResponse { message_id: Uuid, content: String },

    /// The turn failed; terminal. `message_id` is absent for failures that
    /// occur before the turn started.
    Error {
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        message_id: Option<Uuid>,
    },

    /// The turn completed; terminal. `full_text` is the final answer.
    End {
        message_id: Uuid,
        session_id: Uuid,
        chat_id: Uuid,
        full_text: String,
    },
}

impl TurnEvent {
    /// Whether this event terminates the turn's sequence.
    pub fn is_terminal(&self) -> bool {
        matches!(self, TurnEvent::End { .. } | TurnEvent::Error { .. })
    }
}
