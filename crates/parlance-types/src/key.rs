//! Single-table key construction.
//!
//! Every entity lives in one partitioned table under a composite
//! `(partition key, sort key)`. The key scheme is a compatibility contract
//! and must not change shape:
//!
//! - Chat:    `USER#<user_id>` / `CHAT#<chat_id>`
//! - Session: `CHAT#<chat_id>` / `SESSION#<session_id>`
//! - Message: `CHAT#<chat_id>` / `MSG#<timestamp>#<message_id>`
//!
//! Message sort keys embed a fixed-width UTC timestamp
//! (`%Y-%m-%dT%H:%M:%S%.6fZ`) so that lexicographic order over the sort key
//! is chronological order -- range scans return messages in insertion order
//! without a secondary index. The UUIDv7 message id breaks same-microsecond
//! ties.

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Sort-key prefix shared by all message rows in a chat partition.
pub const MSG_SK_PREFIX: &str = "MSG#";

/// Sort-key prefix shared by all session rows in a chat partition.
pub const SESSION_SK_PREFIX: &str = "SESSION#";

/// Sort-key prefix shared by all chat rows in a user partition.
pub const CHAT_SK_PREFIX: &str = "CHAT#";

/// Fixed-width sort-key timestamp format. Microsecond precision, always
/// 27 bytes, so lexicographic comparison equals chronological comparison.
const SORT_TS_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6fZ";

/// Partition key for a user's chat rows: `USER#<user_id>`.
pub fn user_pk(user_id: &str) -> String {
    format!("USER#{user_id}")
}

/// Partition key for a chat's session and message rows: `CHAT#<chat_id>`.
pub fn chat_pk(chat_id: &Uuid) -> String {
    format!("CHAT#{chat_id}")
}

/// Sort key of a chat row within its user partition: `CHAT#<chat_id>`.
pub fn chat_sk(chat_id: &Uuid) -> String {
    format!("CHAT#{chat_id}")
}

/// Sort key of a session row within its chat partition: `SESSION#<session_id>`.
pub fn session_sk(session_id: &Uuid) -> String {
    format!("SESSION#{session_id}")
}

/// Sort key of a message row: `MSG#<timestamp>#<message_id>`.
pub fn message_sk(created_at: &DateTime<Utc>, message_id: &Uuid) -> String {
    format!("MSG#{}#{message_id}", sort_timestamp(created_at))
}

/// Format a timestamp for sort-key embedding (fixed width, UTC).
pub fn sort_timestamp(dt: &DateTime<Utc>) -> String {
    dt.format(SORT_TS_FORMAT).to_string()
}

/// Serde adapter that writes timestamps in the fixed-width sort format.
///
/// Chat rows are ordered by comparing their serialized `updated_at` as a
/// string, so that field must serialize at constant width. Accepts any
/// RFC 3339 timestamp on the way back in.
pub mod serde_sort_ts {
    use super::{sort_timestamp, DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(dt: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&sort_timestamp(dt))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let s = String::deserialize(deserializer)?;
        DateTime::parse_from_rfc3339(&s)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(serde::de::Error::custom)
    }
}
