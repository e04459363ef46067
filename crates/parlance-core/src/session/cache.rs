//! Session cache for webhook identities.
//!
//! The cache is an availability optimization, not the source of truth: a
//! lost entry only means the next message starts a fresh chat and session,
//! which storage records like any other.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use uuid::Uuid;

/// Cached resolution for one channel identity.
#[derive(Debug, Clone)]
pub struct CachedSession {
    pub user_id: String,
    pub chat_id: Uuid,
    pub session_id: Uuid,
    /// Last time the identity sent a message; drives inactivity expiry.
    pub last_activity: DateTime<Utc>,
}

/// Keyed by channel identity (the sender's phone number).
pub trait SessionCache: Send + Sync + 'static {
    fn get(&self, identity: &str) -> Option<CachedSession>;
    fn put(&self, identity: &str, session: CachedSession);
    fn remove(&self, identity: &str);
}

/// Process-local cache; entries survive for the process lifetime.
#[derive(Default)]
pub struct InMemorySessionCache {
    entries: DashMap<String, CachedSession>,
}

impl InMemorySessionCache {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionCache for InMemorySessionCache {
    fn get(&self, identity: &str) -> Option<CachedSession> {
        self.entries.get(identity).map(|entry| entry.clone())
    }

    fn put(&self, identity: &str, session: CachedSession) {
        self.entries.insert(identity.to_string(), session);
    }

    fn remove(&self, identity: &str) {
        self.entries.remove(identity);
    }
}
