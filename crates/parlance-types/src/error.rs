use thiserror::Error;
use uuid::Uuid;

/// Errors from repository operations (used by trait definitions in
/// parlance-core).
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database connection error")]
    Connection,

    #[error("query error: {0}")]
    Query(String),

    #[error("entity not found")]
    NotFound,

    #[error("conflict: {0}")]
    Conflict(String),
}

/// Errors from the external agent capability.
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("agent invocation failed: {0}")]
    Invocation(String),

    #[error("agent stream error: {0}")]
    Stream(String),
}

/// Errors that terminate a conversation turn.
///
/// `ChatBusy` is deliberately distinct from `Agent`: a rejected concurrent
/// turn is retryable and must not be surfaced as a model failure.
#[derive(Debug, Error)]
pub enum TurnError {
    #[error("invalid turn request: {0}")]
    Validation(String),

    #[error("identity resolution failed: {0}")]
    Resolution(String),

    #[error("chat {0} already has a turn in flight")]
    ChatBusy(Uuid),

    #[error(transparent)]
    Agent(#[from] AgentError),

    #[error("storage error: {0}")]
    Storage(#[from] RepositoryError),
}

/// Errors from the outbound messaging capability (WhatsApp Cloud API).
#[derive(Debug, Error)]
pub enum OutboundError {
    #[error("outbound channel disabled (missing credentials)")]
    Disabled,

    #[error("send failed: {0}")]
    Send(String),
}
