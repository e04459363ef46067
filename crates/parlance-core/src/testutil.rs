//! In-memory doubles shared by the crate's unit tests.

use crate::agent::{AgentExecutor, AgentRequest, AgentStream};
use crate::chat::ChatStore;
use chrono::Utc;
use parlance_types::{AgentError, Chat, Message, MessageRole, Page, RepositoryError, Session};
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::oneshot;
use uuid::Uuid;

/// In-memory [`ChatStore`] with a switchable write-failure mode.
pub struct MemoryStore {
    chats: Mutex<HashMap<(String, Uuid), Chat>>,
    sessions: Mutex<HashMap<Uuid, Vec<Session>>>,
    messages: Mutex<HashMap<Uuid, Vec<Message>>>,
    fail: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            chats: Mutex::new(HashMap::new()),
            sessions: Mutex::new(HashMap::new()),
            messages: Mutex::new(HashMap::new()),
            fail: AtomicBool::new(false),
        }
    }

    /// When set, every write returns a query error.
    pub fn fail_writes(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    fn check_writable(&self) -> Result<(), RepositoryError> {
        if self.fail.load(Ordering::SeqCst) {
            Err(RepositoryError::Query("injected failure".to_string()))
        } else {
            Ok(())
        }
    }

    pub fn messages_for(&self, chat_id: Uuid) -> Vec<Message> {
        self.messages
            .lock()
            .unwrap()
            .get(&chat_id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn sessions_for(&self, chat_id: Uuid) -> Vec<Session> {
        self.sessions
            .lock()
            .unwrap()
            .get(&chat_id)
            .cloned()
            .unwrap_or_default()
    }
}

impl ChatStore for MemoryStore {
    async fn create_or_get_chat(
        &self,
        user_id: &str,
        chat_id: Uuid,
        title: &str,
    ) -> Result<Chat, RepositoryError> {
        self.check_writable()?;
        let mut chats = self.chats.lock().unwrap();
        let key = (user_id.to_string(), chat_id);
        let chat = chats.entry(key).or_insert_with(|| Chat {
            chat_id,
            user_id: user_id.to_string(),
            title: title.to_string(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
            preview: None,
        });
        Ok(chat.clone())
    }

    async fn get_chat(&self, user_id: &str, chat_id: Uuid) -> Result<Option<Chat>, RepositoryError> {
        let chats = self.chats.lock().unwrap();
        Ok(chats.get(&(user_id.to_string(), chat_id)).cloned())
    }

    async fn list_chats(
        &self,
        user_id: &str,
        _limit: u32,
        _cursor: Option<&str>,
    ) -> Result<Page<Chat>, RepositoryError> {
        let chats = self.chats.lock().unwrap();
        let mut items: Vec<Chat> = chats
            .values()
            .filter(|c| c.user_id == user_id)
            .cloned()
            .collect();
        items.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(Page {
            items,
            next_cursor: None,
        })
    }

    async fn update_chat_title(
        &self,
        user_id: &str,
        chat_id: Uuid,
        title: &str,
    ) -> Result<(), RepositoryError> {
        self.check_writable()?;
        let mut chats = self.chats.lock().unwrap();
        let chat = chats
            .get_mut(&(user_id.to_string(), chat_id))
            .ok_or(RepositoryError::NotFound)?;
        chat.title = title.to_string();
        chat.updated_at = Utc::now();
        Ok(())
    }

    async fn update_chat_preview(
        &self,
        user_id: &str,
        chat_id: Uuid,
        preview: &str,
    ) -> Result<(), RepositoryError> {
        self.check_writable()?;
        let mut chats = self.chats.lock().unwrap();
        let chat = chats
            .get_mut(&(user_id.to_string(), chat_id))
            .ok_or(RepositoryError::NotFound)?;
        chat.preview = Some(preview.to_string());
        chat.updated_at = Utc::now();
        Ok(())
    }

    async fn upsert_session(
        &self,
        chat_id: Uuid,
        session_id: Uuid,
        user_id: &str,
    ) -> Result<Session, RepositoryError> {
        self.check_writable()?;
        let mut sessions = self.sessions.lock().unwrap();
        let list = sessions.entry(chat_id).or_default();
        for session in list.iter_mut() {
            if session.session_id != session_id && session.is_active {
                session.is_active = false;
                session.ended_at = Some(Utc::now());
            }
        }
        if let Some(existing) = list.iter_mut().find(|s| s.session_id == session_id) {
            existing.is_active = true;
            existing.ended_at = None;
            return Ok(existing.clone());
        }
        let session = Session {
            session_id,
            chat_id,
            user_id: user_id.to_string(),
            started_at: Utc::now(),
            ended_at: None,
            is_active: true,
        };
        list.push(session.clone());
        Ok(session)
    }

    async fn end_session(&self, chat_id: Uuid, session_id: Uuid) -> Result<(), RepositoryError> {
        self.check_writable()?;
        let mut sessions = self.sessions.lock().unwrap();
        if let Some(list) = sessions.get_mut(&chat_id)
            && let Some(session) = list.iter_mut().find(|s| s.session_id == session_id)
            && session.is_active
        {
            session.is_active = false;
            session.ended_at = Some(Utc::now());
        }
        Ok(())
    }

    async fn list_sessions(
        &self,
        chat_id: Uuid,
        _limit: u32,
        _cursor: Option<&str>,
    ) -> Result<Page<Session>, RepositoryError> {
        Ok(Page {
            items: self.sessions_for(chat_id),
            next_cursor: None,
        })
    }

    async fn append_message(
        &self,
        chat_id: Uuid,
        user_id: &str,
        role: MessageRole,
        content: &str,
        message_id: Uuid,
    ) -> Result<Message, RepositoryError> {
        self.check_writable()?;
        let message = Message {
            message_id,
            chat_id,
            user_id: user_id.to_string(),
            role,
            content: content.to_string(),
            created_at: Utc::now(),
        };
        self.messages
            .lock()
            .unwrap()
            .entry(chat_id)
            .or_default()
            .push(message.clone());
        Ok(message)
    }

    async fn list_messages(
        &self,
        chat_id: Uuid,
        _limit: u32,
        _cursor: Option<&str>,
    ) -> Result<Page<Message>, RepositoryError> {
        Ok(Page {
            items: self.messages_for(chat_id),
            next_cursor: None,
        })
    }
}

enum ScriptItem {
    Text(String),
    Fail(String),
}

impl Clone for ScriptItem {
    fn clone(&self) -> Self {
        match self {
            ScriptItem::Text(t) => ScriptItem::Text(t.clone()),
            ScriptItem::Fail(m) => ScriptItem::Fail(m.clone()),
        }
    }
}

/// Agent double that replays a fixed script, optionally gated on a oneshot
/// so tests can hold a turn open.
pub struct ScriptedAgent {
    items: Vec<ScriptItem>,
    gate: Mutex<Option<oneshot::Receiver<()>>>,
}

impl ScriptedAgent {
    pub fn new(script: Vec<Result<String, AgentError>>) -> Self {
        let items = script
            .into_iter()
            .map(|item| match item {
                Ok(text) => ScriptItem::Text(text),
                Err(AgentError::Invocation(m)) | Err(AgentError::Stream(m)) => ScriptItem::Fail(m),
            })
            .collect();
        Self {
            items,
            gate: Mutex::new(None),
        }
    }

    /// A script of successful cumulative snapshots.
    pub fn ok<I, S>(snapshots: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(snapshots.into_iter().map(|s| Ok(s.into())).collect())
    }

    /// Like [`ScriptedAgent::ok`], but the first execution blocks until the
    /// returned sender fires. Later executions run unblocked.
    pub fn gated<I, S>(snapshots: I) -> (Self, oneshot::Sender<()>)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let (tx, rx) = oneshot::channel();
        let agent = Self {
            items: snapshots
                .into_iter()
                .map(|s| ScriptItem::Text(s.into()))
                .collect(),
            gate: Mutex::new(Some(rx)),
        };
        (agent, tx)
    }
}

impl AgentExecutor for ScriptedAgent {
    fn name(&self) -> &str {
        "scripted"
    }

    fn execute(&self, _request: AgentRequest) -> AgentStream {
        let items = self.items.clone();
        let gate = self.gate.lock().unwrap().take();
        Box::pin(async_stream::stream! {
            if let Some(rx) = gate {
                let _ = rx.await;
            }
            for item in items {
                match item {
                    ScriptItem::Text(text) => yield Ok(text),
                    ScriptItem::Fail(message) => {
                        yield Err(AgentError::Stream(message));
                        return;
                    }
                }
            }
        })
    }
}
