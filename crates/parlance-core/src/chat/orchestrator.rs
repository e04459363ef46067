//! Turn orchestration.
//!
//! [`ChatOrchestrator::run`] drives one conversation turn: resolve ids,
//! persist the user message, stream the agent, persist the answer, and emit
//! the ordered [`TurnEvent`] sequence. Channel adapters stay protocol-only;
//! everything stateful happens here.

use crate::agent::{AgentExecutor, AgentRequest};
use crate::chat::ChatStore;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use futures_util::StreamExt;
use parlance_types::{MessageRole, RepositoryError, TurnError, TurnEvent, preview_from, title_from_question};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info};
use uuid::Uuid;

/// Input for one conversation turn.
///
/// `chat_id` and `session_id` are trusted when supplied (the caller resolved
/// them); when absent, fresh ids are minted and the chat/session created on
/// first write.
#[derive(Debug, Clone)]
pub struct TurnRequest {
    pub user_id: String,
    pub chat_id: Option<Uuid>,
    pub session_id: Option<Uuid>,
    pub question: String,
}

/// A started turn: resolved ids plus the ordered event sequence.
///
/// Dropping the `Turn` does not cancel the turn; the agent stream is drained
/// and the answer persisted regardless of whether anyone is still listening.
#[derive(Debug)]
pub struct Turn {
    pub chat_id: Uuid,
    pub session_id: Uuid,
    pub message_id: Uuid,
    events: mpsc::UnboundedReceiver<TurnEvent>,
}

impl Turn {
    /// Next event in the sequence; `None` after the terminal event.
    pub async fn recv(&mut self) -> Option<TurnEvent> {
        self.events.recv().await
    }
}

/// Removes the chat from the in-flight set when the turn finishes, whether
/// it ends normally, errors, or the driving task panics.
struct TurnGuard {
    chat_id: Uuid,
    in_flight: Arc<DashMap<Uuid, ()>>,
}

impl TurnGuard {
    fn acquire(in_flight: &Arc<DashMap<Uuid, ()>>, chat_id: Uuid) -> Option<Self> {
        match in_flight.entry(chat_id) {
            Entry::Occupied(_) => None,
            Entry::Vacant(slot) => {
                slot.insert(());
                Some(Self {
                    chat_id,
                    in_flight: Arc::clone(in_flight),
                })
            }
        }
    }
}

impl Drop for TurnGuard {
    fn drop(&mut self) {
        self.in_flight.remove(&self.chat_id);
    }
}

/// Drives conversation turns against a [`ChatStore`] and an
/// [`AgentExecutor`].
///
/// At most one turn per chat is in flight at a time; a second `run` for the
/// same chat returns [`TurnError::ChatBusy`] without touching storage.
pub struct ChatOrchestrator<S, A> {
    store: Arc<S>,
    agent: Arc<A>,
    in_flight: Arc<DashMap<Uuid, ()>>,
}

impl<S, A> ChatOrchestrator<S, A>
where
    S: ChatStore,
    A: AgentExecutor,
{
    pub fn new(store: Arc<S>, agent: Arc<A>) -> Self {
        Self {
            store,
            agent,
            in_flight: Arc::new(DashMap::new()),
        }
    }

    /// The underlying store, for read paths that bypass orchestration
    /// (chat/session/message listings).
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// End a session explicitly. Idempotent; ending an already-ended or
    /// unknown session succeeds.
    pub async fn end_session(&self, chat_id: Uuid, session_id: Uuid) -> Result<(), RepositoryError> {
        self.store.end_session(chat_id, session_id).await
    }

    /// Run one turn.
    ///
    /// Errors before the agent starts (validation, a concurrent turn, a
    /// failed initial write) are returned here and nothing streams. Once
    /// `Ok(Turn)` is returned the sequence is `start`, zero or more
    /// `agent_response`, then exactly one `end` or `error`; post-stream
    /// persistence failures are logged and do not suppress `end`.
    pub async fn run(&self, request: TurnRequest) -> Result<Turn, TurnError> {
        if request.user_id.trim().is_empty() {
            return Err(TurnError::Validation("user_id must not be empty".to_string()));
        }
        if request.question.trim().is_empty() {
            return Err(TurnError::Validation("question must not be empty".to_string()));
        }

        let chat_id = request.chat_id.unwrap_or_else(Uuid::now_v7);
        let session_id = request.session_id.unwrap_or_else(Uuid::now_v7);
        let message_id = Uuid::now_v7();

        let guard = TurnGuard::acquire(&self.in_flight, chat_id)
            .ok_or(TurnError::ChatBusy(chat_id))?;

        info!(
            user_id = %request.user_id,
            chat_id = %chat_id,
            session_id = %session_id,
            agent = self.agent.name(),
            "starting turn"
        );

        // Initial writes are turn-fatal: a turn whose user message was never
        // persisted must not stream.
        let title = title_from_question(&request.question);
        self.store
            .create_or_get_chat(&request.user_id, chat_id, &title)
            .await?;
        self.store
            .upsert_session(chat_id, session_id, &request.user_id)
            .await?;
        self.store
            .append_message(
                chat_id,
                &request.user_id,
                MessageRole::User,
                &request.question,
                Uuid::now_v7(),
            )
            .await?;
        self.store
            .update_chat_preview(&request.user_id, chat_id, &preview_from(&request.question))
            .await?;

        let (tx, rx) = mpsc::unbounded_channel();
        let _ = tx.send(TurnEvent::Start {
            session_id,
            chat_id,
            message_id,
        });

        let store = Arc::clone(&self.store);
        let agent = Arc::clone(&self.agent);
        let user_id = request.user_id;
        let question = request.question;

        tokio::spawn(async move {
            // Held for the task's full lifetime so the chat unlocks exactly
            // when the turn is over.
            let _guard = guard;

            let mut stream = agent.execute(AgentRequest {
                prompt: question,
                user_id: user_id.clone(),
                chat_id,
                session_id,
            });

            let mut full_text = String::new();
            while let Some(item) = stream.next().await {
                match item {
                    Ok(content) => {
                        // Cumulative snapshot: replaces, never appends.
                        full_text = content.clone();
                        let _ = tx.send(TurnEvent::AgentResponse { message_id, content });
                    }
                    Err(err) => {
                        error!(chat_id = %chat_id, error = %err, "agent stream failed");
                        let _ = tx.send(TurnEvent::Error {
                            message: err.to_string(),
                            message_id: Some(message_id),
                        });
                        return;
                    }
                }
            }

            // The answer is persisted even when the receiver is gone; the
            // send results are deliberately ignored.
            if !full_text.is_empty() {
                if let Err(err) = store
                    .append_message(chat_id, &user_id, MessageRole::Assistant, &full_text, message_id)
                    .await
                {
                    error!(chat_id = %chat_id, error = %err, "failed to persist agent response");
                }
                if let Err(err) = store
                    .update_chat_preview(&user_id, chat_id, &preview_from(&full_text))
                    .await
                {
                    error!(chat_id = %chat_id, error = %err, "failed to update chat preview");
                }
            }

            debug!(chat_id = %chat_id, chars = full_text.chars().count(), "turn complete");
            let _ = tx.send(TurnEvent::End {
                message_id,
                session_id,
                chat_id,
                full_text,
            });
        });

        Ok(Turn {
            chat_id,
            session_id,
            message_id,
            events: rx,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{MemoryStore, ScriptedAgent};
    use parlance_types::AgentError;
    use std::time::Duration;

    fn orchestrator(
        store: Arc<MemoryStore>,
        agent: Arc<ScriptedAgent>,
    ) -> ChatOrchestrator<MemoryStore, ScriptedAgent> {
        ChatOrchestrator::new(store, agent)
    }

    async fn drain(turn: &mut Turn) -> Vec<TurnEvent> {
        let mut events = Vec::new();
        while let Some(ev) = turn.recv().await {
            events.push(ev);
        }
        events
    }

    #[tokio::test]
    async fn test_turn_emits_ordered_sequence() {
        let store = Arc::new(MemoryStore::new());
        let agent = Arc::new(ScriptedAgent::ok(["Hel", "Hello", "Hello!"]));
        let orch = orchestrator(Arc::clone(&store), agent);

        let mut turn = orch
            .run(TurnRequest {
                user_id: "user_1".to_string(),
                chat_id: None,
                session_id: None,
                question: "Hi there".to_string(),
            })
            .await
            .unwrap();

        let events = drain(&mut turn).await;
        assert!(matches!(events[0], TurnEvent::Start { .. }));
        let contents: Vec<&str> = events
            .iter()
            .filter_map(|ev| match ev {
                TurnEvent::AgentResponse { content, .. } => Some(content.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(contents, ["Hel", "Hello", "Hello!"]);
        match events.last().unwrap() {
            TurnEvent::End { full_text, .. } => assert_eq!(full_text, "Hello!"),
            other => panic!("expected end, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_turn_persists_user_and_assistant_messages() {
        let store = Arc::new(MemoryStore::new());
        let agent = Arc::new(ScriptedAgent::ok(["42"]));
        let orch = orchestrator(Arc::clone(&store), agent);

        let mut turn = orch
            .run(TurnRequest {
                user_id: "user_1".to_string(),
                chat_id: None,
                session_id: None,
                question: "What is the answer?".to_string(),
            })
            .await
            .unwrap();
        let chat_id = turn.chat_id;
        drain(&mut turn).await;

        let messages = store.messages_for(chat_id);
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, MessageRole::User);
        assert_eq!(messages[0].content, "What is the answer?");
        assert_eq!(messages[1].role, MessageRole::Assistant);
        assert_eq!(messages[1].content, "42");
        assert_eq!(messages[1].message_id, turn.message_id);

        let chat = store
            .get_chat("user_1", chat_id)
            .await
            .unwrap()
            .expect("chat created");
        assert_eq!(chat.title, "What is the answer?");
        assert_eq!(chat.preview.as_deref(), Some("42"));
    }

    #[tokio::test]
    async fn test_existing_chat_keeps_title() {
        let store = Arc::new(MemoryStore::new());
        let agent = Arc::new(ScriptedAgent::ok(["ok"]));
        let orch = orchestrator(Arc::clone(&store), agent);

        let mut first = orch
            .run(TurnRequest {
                user_id: "user_1".to_string(),
                chat_id: None,
                session_id: None,
                question: "first question".to_string(),
            })
            .await
            .unwrap();
        let chat_id = first.chat_id;
        drain(&mut first).await;

        let mut second = orch
            .run(TurnRequest {
                user_id: "user_1".to_string(),
                chat_id: Some(chat_id),
                session_id: None,
                question: "second question".to_string(),
            })
            .await
            .unwrap();
        drain(&mut second).await;

        let chat = store.get_chat("user_1", chat_id).await.unwrap().unwrap();
        assert_eq!(chat.title, "first question");
        assert_eq!(store.messages_for(chat_id).len(), 4);
    }

    #[tokio::test]
    async fn test_concurrent_turn_rejected_as_busy() {
        let store = Arc::new(MemoryStore::new());
        let (agent, release) = ScriptedAgent::gated(["slow answer"]);
        let agent = Arc::new(agent);
        let orch = orchestrator(Arc::clone(&store), agent);

        let chat_id = Uuid::now_v7();
        let mut first = orch
            .run(TurnRequest {
                user_id: "user_1".to_string(),
                chat_id: Some(chat_id),
                session_id: None,
                question: "one".to_string(),
            })
            .await
            .unwrap();

        let err = orch
            .run(TurnRequest {
                user_id: "user_1".to_string(),
                chat_id: Some(chat_id),
                session_id: None,
                question: "two".to_string(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, TurnError::ChatBusy(id) if id == chat_id));

        release.send(()).unwrap();
        drain(&mut first).await;

        // The slot frees once the first turn finishes.
        orch.run(TurnRequest {
            user_id: "user_1".to_string(),
            chat_id: Some(chat_id),
            session_id: None,
            question: "three".to_string(),
        })
        .await
        .expect("chat no longer busy");
    }

    #[tokio::test]
    async fn test_busy_rejection_writes_nothing() {
        let store = Arc::new(MemoryStore::new());
        let (agent, release) = ScriptedAgent::gated(["answer"]);
        let orch = orchestrator(Arc::clone(&store), Arc::new(agent));

        let chat_id = Uuid::now_v7();
        let mut first = orch
            .run(TurnRequest {
                user_id: "user_1".to_string(),
                chat_id: Some(chat_id),
                session_id: None,
                question: "one".to_string(),
            })
            .await
            .unwrap();
        let before = store.messages_for(chat_id).len();

        let _ = orch
            .run(TurnRequest {
                user_id: "user_1".to_string(),
                chat_id: Some(chat_id),
                session_id: None,
                question: "two".to_string(),
            })
            .await
            .unwrap_err();
        assert_eq!(store.messages_for(chat_id).len(), before);

        release.send(()).unwrap();
        drain(&mut first).await;
    }

    #[tokio::test]
    async fn test_empty_question_rejected() {
        let store = Arc::new(MemoryStore::new());
        let agent = Arc::new(ScriptedAgent::ok(["unused"]));
        let orch = orchestrator(store, agent);

        let err = orch
            .run(TurnRequest {
                user_id: "user_1".to_string(),
                chat_id: None,
                session_id: None,
                question: "   ".to_string(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, TurnError::Validation(_)));
    }

    #[tokio::test]
    async fn test_initial_write_failure_is_fatal_and_releases_chat() {
        let store = Arc::new(MemoryStore::new());
        store.fail_writes(true);
        let agent = Arc::new(ScriptedAgent::ok(["unused"]));
        let orch = orchestrator(Arc::clone(&store), agent);

        let chat_id = Uuid::now_v7();
        let request = TurnRequest {
            user_id: "user_1".to_string(),
            chat_id: Some(chat_id),
            session_id: None,
            question: "hello".to_string(),
        };

        let err = orch.run(request.clone()).await.unwrap_err();
        assert!(matches!(err, TurnError::Storage(_)));

        // The guard was dropped with the error; the chat is not stuck busy.
        store.fail_writes(false);
        let mut turn = orch.run(request).await.expect("chat released");
        drain(&mut turn).await;
    }

    #[tokio::test]
    async fn test_agent_error_emits_terminal_error_without_assistant_message() {
        let store = Arc::new(MemoryStore::new());
        let agent = Arc::new(ScriptedAgent::new(vec![
            Ok("partial".to_string()),
            Err(AgentError::Stream("upstream closed".to_string())),
        ]));
        let orch = orchestrator(Arc::clone(&store), agent);

        let mut turn = orch
            .run(TurnRequest {
                user_id: "user_1".to_string(),
                chat_id: None,
                session_id: None,
                question: "hello".to_string(),
            })
            .await
            .unwrap();
        let chat_id = turn.chat_id;
        let events = drain(&mut turn).await;

        match events.last().unwrap() {
            TurnEvent::Error { message, message_id } => {
                assert!(message.contains("upstream closed"));
                assert_eq!(*message_id, Some(turn.message_id));
            }
            other => panic!("expected error, got {other:?}"),
        }

        // Only the user message was persisted.
        let messages = store.messages_for(chat_id);
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].role, MessageRole::User);
    }

    #[tokio::test]
    async fn test_persist_failure_after_stream_still_ends() {
        let store = Arc::new(MemoryStore::new());
        let agent = Arc::new(ScriptedAgent::ok(["answer"]));
        let orch = orchestrator(Arc::clone(&store), agent);

        let mut turn = orch
            .run(TurnRequest {
                user_id: "user_1".to_string(),
                chat_id: None,
                session_id: None,
                question: "hello".to_string(),
            })
            .await
            .unwrap();

        // Fail writes only after the initial phase succeeded.
        store.fail_writes(true);
        let events = drain(&mut turn).await;
        store.fail_writes(false);

        match events.last().unwrap() {
            TurnEvent::End { full_text, .. } => assert_eq!(full_text, "answer"),
            other => panic!("expected end, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_dropped_receiver_does_not_cancel_persistence() {
        let store = Arc::new(MemoryStore::new());
        let (agent, release) = ScriptedAgent::gated(["durable answer"]);
        let orch = orchestrator(Arc::clone(&store), Arc::new(agent));

        let turn = orch
            .run(TurnRequest {
                user_id: "user_1".to_string(),
                chat_id: None,
                session_id: None,
                question: "hello".to_string(),
            })
            .await
            .unwrap();
        let chat_id = turn.chat_id;
        drop(turn);
        release.send(()).unwrap();

        // Poll until the background task lands the assistant message.
        for _ in 0..50 {
            if store.messages_for(chat_id).len() == 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        let messages = store.messages_for(chat_id);
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[1].content, "durable answer");
    }

    #[tokio::test]
    async fn test_session_upserted_active() {
        let store = Arc::new(MemoryStore::new());
        let agent = Arc::new(ScriptedAgent::ok(["ok"]));
        let orch = orchestrator(Arc::clone(&store), agent);

        let mut turn = orch
            .run(TurnRequest {
                user_id: "user_1".to_string(),
                chat_id: None,
                session_id: None,
                question: "hello".to_string(),
            })
            .await
            .unwrap();
        let (chat_id, session_id) = (turn.chat_id, turn.session_id);
        drain(&mut turn).await;

        let sessions = store.sessions_for(chat_id);
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].session_id, session_id);
        assert!(sessions[0].is_active);

        orch.end_session(chat_id, session_id).await.unwrap();
        assert!(!store.sessions_for(chat_id)[0].is_active);
        // Idempotent.
        orch.end_session(chat_id, session_id).await.unwrap();
    }
}
