//! External agent capability.

use futures_util::Stream;
use parlance_types::AgentError;
use std::pin::Pin;
use uuid::Uuid;

/// One invocation of the agent.
#[derive(Debug, Clone)]
pub struct AgentRequest {
    /// The user's question, verbatim.
    pub prompt: String,
    pub user_id: String,
    pub chat_id: Uuid,
    pub session_id: Uuid,
}

/// Boxed stream of cumulative response snapshots.
///
/// Each item replaces the previous one; the last successful item is the
/// complete answer. An `Err` item terminates the stream.
pub type AgentStream = Pin<Box<dyn Stream<Item = Result<String, AgentError>> + Send + 'static>>;

/// Capability that executes a question against the external agent.
///
/// Implementations must be cheap to call concurrently; the orchestrator
/// invokes one execution per in-flight turn.
pub trait AgentExecutor: Send + Sync + 'static {
    /// Human-readable executor name, used in logs.
    fn name(&self) -> &str;

    /// Start an execution. Invocation failures surface as the first (and
    /// only) stream item rather than a method error so callers drive a
    /// single code path.
    fn execute(&self, request: AgentRequest) -> AgentStream;
}
