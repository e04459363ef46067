//! Single-table SQLite implementation of `ChatStore`.
//!
//! Every entity lives in the `items` table as a `(pk, sk)` row with its
//! domain object serialized into the `data` column as JSON:
//!
//! - Chat:    pk `USER#<user_id>`, sk `CHAT#<chat_id>`
//! - Session: pk `CHAT#<chat_id>`, sk `SESSION#<session_id>`
//! - Message: pk `CHAT#<chat_id>`, sk `MSG#<timestamp>#<message_id>`
//!
//! Listings are prefix scans over the sort key; message order falls out of
//! the fixed-width timestamp embedded in the key. Cursor pagination passes
//! the last-seen sort key back as the exclusive start of the next page.

use chrono::Utc;
use parlance_core::chat::ChatStore;
use parlance_types::key;
use parlance_types::{Chat, Message, MessageRole, Page, RepositoryError, Session};
use serde::Serialize;
use serde::de::DeserializeOwned;
use sqlx::Row;
use uuid::Uuid;

use super::pool::DatabasePool;

/// SQLite-backed implementation of `ChatStore`.
pub struct SqliteChatStore {
    pool: DatabasePool,
}

impl SqliteChatStore {
    /// Create a new store backed by the given database pool.
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }

    /// Read-modify-write a chat row inside one writer transaction.
    async fn modify_chat(
        &self,
        user_id: &str,
        chat_id: Uuid,
        apply: impl FnOnce(&mut Chat),
    ) -> Result<(), RepositoryError> {
        let pk = key::user_pk(user_id);
        let sk = key::chat_sk(&chat_id);

        let mut tx = self.pool.writer.begin().await.map_err(query_err)?;

        let row = sqlx::query("SELECT data FROM items WHERE pk = ? AND sk = ?")
            .bind(&pk)
            .bind(&sk)
            .fetch_optional(&mut *tx)
            .await
            .map_err(query_err)?;
        let Some(row) = row else {
            return Err(RepositoryError::NotFound);
        };

        let mut chat: Chat = parse_item(&row)?;
        apply(&mut chat);
        chat.updated_at = Utc::now();

        sqlx::query("UPDATE items SET data = ? WHERE pk = ? AND sk = ?")
            .bind(to_json(&chat)?)
            .bind(&pk)
            .bind(&sk)
            .execute(&mut *tx)
            .await
            .map_err(query_err)?;

        tx.commit().await.map_err(query_err)?;
        Ok(())
    }

    /// Prefix scan over one partition with cursor pagination.
    ///
    /// `ascending` controls scan direction; the cursor is the last sort key
    /// of the previous page (exclusive).
    async fn scan_prefix<T: DeserializeOwned>(
        &self,
        pk: &str,
        prefix: &str,
        ascending: bool,
        limit: u32,
        cursor: Option<&str>,
    ) -> Result<Page<T>, RepositoryError> {
        let limit = limit.max(1) as i64;
        let sql = match (ascending, cursor.is_some()) {
            (true, true) => {
                "SELECT sk, data FROM items WHERE pk = ? AND sk LIKE ? AND sk > ? ORDER BY sk ASC LIMIT ?"
            }
            (true, false) => {
                "SELECT sk, data FROM items WHERE pk = ? AND sk LIKE ? ORDER BY sk ASC LIMIT ?"
            }
            (false, true) => {
                "SELECT sk, data FROM items WHERE pk = ? AND sk LIKE ? AND sk < ? ORDER BY sk DESC LIMIT ?"
            }
            (false, false) => {
                "SELECT sk, data FROM items WHERE pk = ? AND sk LIKE ? ORDER BY sk DESC LIMIT ?"
            }
        };

        let mut query = sqlx::query(sql).bind(pk).bind(format!("{prefix}%"));
        if let Some(cursor) = cursor {
            query = query.bind(cursor.to_string());
        }
        // Fetch one extra row to learn whether another page exists.
        let rows = query
            .bind(limit + 1)
            .fetch_all(&self.pool.reader)
            .await
            .map_err(query_err)?;

        let has_more = rows.len() as i64 > limit;
        let mut items = Vec::with_capacity(rows.len().min(limit as usize));
        let mut last_sk = None;
        for row in rows.iter().take(limit as usize) {
            let sk: String = row.try_get("sk").map_err(query_err)?;
            items.push(parse_item(row)?);
            last_sk = Some(sk);
        }

        Ok(Page {
            items,
            next_cursor: if has_more { last_sk } else { None },
        })
    }
}

fn query_err(e: sqlx::Error) -> RepositoryError {
    RepositoryError::Query(e.to_string())
}

fn to_json<T: Serialize>(value: &T) -> Result<String, RepositoryError> {
    serde_json::to_string(value).map_err(|e| RepositoryError::Query(format!("serialize item: {e}")))
}

fn parse_item<T: DeserializeOwned>(row: &sqlx::sqlite::SqliteRow) -> Result<T, RepositoryError> {
    let data: String = row.try_get("data").map_err(query_err)?;
    serde_json::from_str(&data).map_err(|e| RepositoryError::Query(format!("corrupt item: {e}")))
}

impl ChatStore for SqliteChatStore {
    async fn create_or_get_chat(
        &self,
        user_id: &str,
        chat_id: Uuid,
        title: &str,
    ) -> Result<Chat, RepositoryError> {
        let now = Utc::now();
        let chat = Chat {
            chat_id,
            user_id: user_id.to_string(),
            title: title.to_string(),
            created_at: now,
            updated_at: now,
            preview: None,
        };
        let pk = key::user_pk(user_id);
        let sk = key::chat_sk(&chat_id);

        // Conditional insert: an existing row wins and keeps its title.
        sqlx::query(
            "INSERT INTO items (pk, sk, item_type, data) VALUES (?, ?, 'CHAT', ?) ON CONFLICT(pk, sk) DO NOTHING",
        )
        .bind(&pk)
        .bind(&sk)
        .bind(to_json(&chat)?)
        .execute(&self.pool.writer)
        .await
        .map_err(query_err)?;

        let row = sqlx::query("SELECT data FROM items WHERE pk = ? AND sk = ?")
            .bind(&pk)
            .bind(&sk)
            .fetch_one(&self.pool.writer)
            .await
            .map_err(query_err)?;
        parse_item(&row)
    }

    async fn get_chat(&self, user_id: &str, chat_id: Uuid) -> Result<Option<Chat>, RepositoryError> {
        let row = sqlx::query("SELECT data FROM items WHERE pk = ? AND sk = ?")
            .bind(key::user_pk(user_id))
            .bind(key::chat_sk(&chat_id))
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(query_err)?;
        row.as_ref().map(parse_item).transpose()
    }

    async fn list_chats(
        &self,
        user_id: &str,
        limit: u32,
        cursor: Option<&str>,
    ) -> Result<Page<Chat>, RepositoryError> {
        // Most recently updated first. The cursor carries the last row's
        // `(updated_at, sk)` so ties on updated_at page deterministically.
        let limit = limit.max(1) as i64;
        let sql = if cursor.is_some() {
            "SELECT sk, data, json_extract(data, '$.updated_at') AS updated \
             FROM items WHERE pk = ? AND sk LIKE ? \
             AND (json_extract(data, '$.updated_at') < ? \
                  OR (json_extract(data, '$.updated_at') = ? AND sk < ?)) \
             ORDER BY updated DESC, sk DESC LIMIT ?"
        } else {
            "SELECT sk, data, json_extract(data, '$.updated_at') AS updated \
             FROM items WHERE pk = ? AND sk LIKE ? \
             ORDER BY updated DESC, sk DESC LIMIT ?"
        };

        let mut query = sqlx::query(sql)
            .bind(key::user_pk(user_id))
            .bind(format!("{}%", key::CHAT_SK_PREFIX));
        if let Some(cursor) = cursor {
            let (updated, sk) = cursor
                .split_once('|')
                .ok_or_else(|| RepositoryError::Query("malformed cursor".to_string()))?;
            query = query
                .bind(updated.to_string())
                .bind(updated.to_string())
                .bind(sk.to_string());
        }
        let rows = query
            .bind(limit + 1)
            .fetch_all(&self.pool.reader)
            .await
            .map_err(query_err)?;

        let has_more = rows.len() as i64 > limit;
        let mut items = Vec::with_capacity(rows.len().min(limit as usize));
        let mut last_cursor = None;
        for row in rows.iter().take(limit as usize) {
            let sk: String = row.try_get("sk").map_err(query_err)?;
            let updated: String = row.try_get("updated").map_err(query_err)?;
            items.push(parse_item(row)?);
            last_cursor = Some(format!("{updated}|{sk}"));
        }

        Ok(Page {
            items,
            next_cursor: if has_more { last_cursor } else { None },
        })
    }

    async fn update_chat_title(
        &self,
        user_id: &str,
        chat_id: Uuid,
        title: &str,
    ) -> Result<(), RepositoryError> {
        self.modify_chat(user_id, chat_id, |chat| chat.title = title.to_string())
            .await
    }

    async fn update_chat_preview(
        &self,
        user_id: &str,
        chat_id: Uuid,
        preview: &str,
    ) -> Result<(), RepositoryError> {
        self.modify_chat(user_id, chat_id, |chat| chat.preview = Some(preview.to_string()))
            .await
    }

    async fn upsert_session(
        &self,
        chat_id: Uuid,
        session_id: Uuid,
        user_id: &str,
    ) -> Result<Session, RepositoryError> {
        let pk = key::chat_pk(&chat_id);
        let target_sk = key::session_sk(&session_id);
        let now = Utc::now();

        let mut tx = self.pool.writer.begin().await.map_err(query_err)?;

        let rows = sqlx::query("SELECT sk, data FROM items WHERE pk = ? AND sk LIKE ?")
            .bind(&pk)
            .bind(format!("{}%", key::SESSION_SK_PREFIX))
            .fetch_all(&mut *tx)
            .await
            .map_err(query_err)?;

        let mut target: Option<Session> = None;
        for row in &rows {
            let sk: String = row.try_get("sk").map_err(query_err)?;
            let mut session: Session = parse_item(row)?;
            if sk == target_sk {
                target = Some(session);
                continue;
            }
            // One active session per chat: deactivate the rest in the same
            // transaction that activates the target.
            if session.is_active {
                session.is_active = false;
                session.ended_at = Some(now);
                sqlx::query("UPDATE items SET data = ? WHERE pk = ? AND sk = ?")
                    .bind(to_json(&session)?)
                    .bind(&pk)
                    .bind(&sk)
                    .execute(&mut *tx)
                    .await
                    .map_err(query_err)?;
            }
        }

        let session = match target {
            Some(mut session) => {
                if !session.is_active {
                    session.is_active = true;
                    session.ended_at = None;
                    sqlx::query("UPDATE items SET data = ? WHERE pk = ? AND sk = ?")
                        .bind(to_json(&session)?)
                        .bind(&pk)
                        .bind(&target_sk)
                        .execute(&mut *tx)
                        .await
                        .map_err(query_err)?;
                }
                session
            }
            None => {
                let session = Session {
                    session_id,
                    chat_id,
                    user_id: user_id.to_string(),
                    started_at: now,
                    ended_at: None,
                    is_active: true,
                };
                sqlx::query(
                    "INSERT INTO items (pk, sk, item_type, data) VALUES (?, ?, 'SESSION', ?)",
                )
                .bind(&pk)
                .bind(&target_sk)
                .bind(to_json(&session)?)
                .execute(&mut *tx)
                .await
                .map_err(query_err)?;
                session
            }
        };

        tx.commit().await.map_err(query_err)?;
        Ok(session)
    }

    async fn end_session(&self, chat_id: Uuid, session_id: Uuid) -> Result<(), RepositoryError> {
        let pk = key::chat_pk(&chat_id);
        let sk = key::session_sk(&session_id);

        let row = sqlx::query("SELECT data FROM items WHERE pk = ? AND sk = ?")
            .bind(&pk)
            .bind(&sk)
            .fetch_optional(&self.pool.writer)
            .await
            .map_err(query_err)?;

        // Unknown or already-ended sessions are fine; ending is idempotent.
        let Some(row) = row else {
            return Ok(());
        };
        let mut session: Session = parse_item(&row)?;
        if !session.is_active {
            return Ok(());
        }

        session.is_active = false;
        session.ended_at = Some(Utc::now());
        sqlx::query("UPDATE items SET data = ? WHERE pk = ? AND sk = ?")
            .bind(to_json(&session)?)
            .bind(&pk)
            .bind(&sk)
            .execute(&self.pool.writer)
            .await
            .map_err(query_err)?;
        Ok(())
    }

    async fn list_sessions(
        &self,
        chat_id: Uuid,
        limit: u32,
        cursor: Option<&str>,
    ) -> Result<Page<Session>, RepositoryError> {
        self.scan_prefix(
            &key::chat_pk(&chat_id),
            key::SESSION_SK_PREFIX,
            false,
            limit,
            cursor,
        )
        .await
    }

    async fn append_message(
        &self,
        chat_id: Uuid,
        user_id: &str,
        role: MessageRole,
        content: &str,
        message_id: Uuid,
    ) -> Result<Message, RepositoryError> {
        let now = Utc::now();
        let message = Message {
            message_id,
            chat_id,
            user_id: user_id.to_string(),
            role,
            content: content.to_string(),
            created_at: now,
        };

        sqlx::query("INSERT INTO items (pk, sk, item_type, data) VALUES (?, ?, 'MSG', ?)")
            .bind(key::chat_pk(&chat_id))
            .bind(key::message_sk(&now, &message_id))
            .bind(to_json(&message)?)
            .execute(&self.pool.writer)
            .await
            .map_err(query_err)?;

        Ok(message)
    }

    async fn list_messages(
        &self,
        chat_id: Uuid,
        limit: u32,
        cursor: Option<&str>,
    ) -> Result<Page<Message>, RepositoryError> {
        self.scan_prefix(
            &key::chat_pk(&chat_id),
            key::MSG_SK_PREFIX,
            true,
            limit,
            cursor,
        )
        .await
    }
}
