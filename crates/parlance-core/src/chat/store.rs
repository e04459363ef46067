//! Persistence contract for chats, sessions, and messages.

use parlance_types::{Chat, Message, MessageRole, Page, RepositoryError, Session};
use uuid::Uuid;

/// Storage backend for the conversation domain.
///
/// All writes are idempotent where the orchestrator needs them to be:
/// creating an existing chat returns it unchanged, upserting the active
/// session is a no-op when it is already active, and ending an inactive
/// session succeeds silently.
pub trait ChatStore: Send + Sync + 'static {
    /// Create the chat if it does not exist, otherwise return the stored
    /// record untouched (the supplied title is ignored for existing chats).
    fn create_or_get_chat(
        &self,
        user_id: &str,
        chat_id: Uuid,
        title: &str,
    ) -> impl Future<Output = Result<Chat, RepositoryError>> + Send;

    fn get_chat(
        &self,
        user_id: &str,
        chat_id: Uuid,
    ) -> impl Future<Output = Result<Option<Chat>, RepositoryError>> + Send;

    /// Newest-first page of a user's chats.
    fn list_chats(
        &self,
        user_id: &str,
        limit: u32,
        cursor: Option<&str>,
    ) -> impl Future<Output = Result<Page<Chat>, RepositoryError>> + Send;

    fn update_chat_title(
        &self,
        user_id: &str,
        chat_id: Uuid,
        title: &str,
    ) -> impl Future<Output = Result<(), RepositoryError>> + Send;

    fn update_chat_preview(
        &self,
        user_id: &str,
        chat_id: Uuid,
        preview: &str,
    ) -> impl Future<Output = Result<(), RepositoryError>> + Send;

    /// Make `session_id` the single active session of the chat, deactivating
    /// any other active session. Idempotent for an already-active session.
    fn upsert_session(
        &self,
        chat_id: Uuid,
        session_id: Uuid,
        user_id: &str,
    ) -> impl Future<Output = Result<Session, RepositoryError>> + Send;

    /// Mark the session ended. Ending a session that is already inactive or
    /// absent is not an error.
    fn end_session(
        &self,
        chat_id: Uuid,
        session_id: Uuid,
    ) -> impl Future<Output = Result<(), RepositoryError>> + Send;

    fn list_sessions(
        &self,
        chat_id: Uuid,
        limit: u32,
        cursor: Option<&str>,
    ) -> impl Future<Output = Result<Page<Session>, RepositoryError>> + Send;

    /// Append a message. `message_id` is minted by the caller so the id in
    /// emitted events matches the persisted record.
    fn append_message(
        &self,
        chat_id: Uuid,
        user_id: &str,
        role: MessageRole,
        content: &str,
        message_id: Uuid,
    ) -> impl Future<Output = Result<Message, RepositoryError>> + Send;

    /// Oldest-first page of a chat's messages.
    fn list_messages(
        &self,
        chat_id: Uuid,
        limit: u32,
        cursor: Option<&str>,
    ) -> impl Future<Output = Result<Page<Message>, RepositoryError>> + Send;
}
