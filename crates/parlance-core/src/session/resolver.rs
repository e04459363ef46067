//! Identity resolution for webhook channels.

use crate::session::{CachedSession, SessionCache};
use chrono::{Duration, Utc};
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

/// Prefix that namespaces WhatsApp senders in the user id space.
const WHATSAPP_USER_PREFIX: &str = "whatsapp_";

/// Resolved identity for one inbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub user_id: String,
    pub chat_id: Uuid,
    pub session_id: Uuid,
    /// Whether this resolution minted a fresh chat/session pair.
    pub is_new_session: bool,
}

/// Maps a channel identity (phone number) to a stable `(user_id, chat_id,
/// session_id)` triple.
///
/// Consecutive messages from the same phone within the inactivity window
/// share one chat and session; expiry, or an explicit reset, mints a fresh
/// pair. Resolutions for the same identity are serialized on a per-identity
/// lock so a burst of messages cannot mint competing sessions.
pub struct SessionResolver<C> {
    cache: Arc<C>,
    locks: DashMap<String, Arc<Mutex<()>>>,
    inactivity_window: Duration,
}

impl<C: SessionCache> SessionResolver<C> {
    pub fn new(cache: Arc<C>, inactivity_window: Duration) -> Self {
        Self {
            cache,
            locks: DashMap::new(),
            inactivity_window,
        }
    }

    /// The user id under which a phone's chats are stored.
    pub fn user_id_for(phone: &str) -> String {
        format!("{WHATSAPP_USER_PREFIX}{phone}")
    }

    /// Resolve `phone` to its conversation ids.
    ///
    /// `reset` drops any cached entry first, forcing a fresh pair.
    pub async fn resolve(&self, phone: &str, reset: bool) -> Resolution {
        // A lock held only by the map is idle; evict those so the map does
        // not grow with every identity ever seen.
        self.locks.retain(|_, lock| Arc::strong_count(lock) > 1);

        let lock = self
            .locks
            .entry(phone.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let _guard = lock.lock().await;

        let now = Utc::now();

        if reset {
            self.cache.remove(phone);
        } else if let Some(cached) = self.cache.get(phone) {
            if now - cached.last_activity <= self.inactivity_window {
                self.cache.put(
                    phone,
                    CachedSession {
                        last_activity: now,
                        ..cached.clone()
                    },
                );
                return Resolution {
                    user_id: cached.user_id,
                    chat_id: cached.chat_id,
                    session_id: cached.session_id,
                    is_new_session: false,
                };
            }
            debug!(phone, "cached session expired by inactivity");
        }

        let user_id = Self::user_id_for(phone);
        let fresh = CachedSession {
            user_id: user_id.clone(),
            chat_id: Uuid::now_v7(),
            session_id: Uuid::now_v7(),
            last_activity: now,
        };
        self.cache.put(phone, fresh.clone());

        Resolution {
            user_id,
            chat_id: fresh.chat_id,
            session_id: fresh.session_id,
            is_new_session: true,
        }
    }

    /// Record activity for `phone` after a completed turn, adopting the ids
    /// the turn actually ran under.
    pub fn touch(&self, phone: &str, chat_id: Uuid, session_id: Uuid) {
        if let Some(cached) = self.cache.get(phone) {
            self.cache.put(
                phone,
                CachedSession {
                    chat_id,
                    session_id,
                    last_activity: Utc::now(),
                    ..cached
                },
            );
        }
    }
}
