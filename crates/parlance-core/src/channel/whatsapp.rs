//! WhatsApp webhook channel.
//!
//! Non-streaming adapter: each inbound text message runs one full turn and
//! the final answer goes back as a single outbound message. Identity comes
//! from the sender's phone via [`SessionResolver`]; duplicate webhook
//! deliveries are dropped on the provider message id.

use crate::agent::AgentExecutor;
use crate::chat::{ChatOrchestrator, ChatStore, TurnRequest};
use crate::session::{SessionCache, SessionResolver};
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use parlance_types::{InboundMessage, OutboundError, TurnError, TurnEvent, WebhookPayload};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// How long a provider message id is remembered for deduplication. Meta
/// retries failed deliveries for well under an hour.
const DEDUPE_TTL_SECS: i64 = 3600;

const ERROR_REPLY: &str =
    "Sorry, something went wrong while processing your message. Please try again.";
const RESET_REPLY: &str = "Conversation reset. Your next message starts a fresh chat.";
const BUSY_REPLY: &str =
    "I'm still working on your previous message. Please wait a moment and try again.";

/// Outbound messaging capability (implemented over the Cloud API in
/// parlance-infra).
pub trait OutboundSender: Send + Sync + 'static {
    fn send_text(
        &self,
        to: &str,
        body: &str,
    ) -> impl Future<Output = Result<(), OutboundError>> + Send;

    fn mark_as_read(
        &self,
        provider_message_id: &str,
    ) -> impl Future<Output = Result<(), OutboundError>> + Send;
}

pub struct WhatsAppChannel<S, A, O, C> {
    orchestrator: Arc<ChatOrchestrator<S, A>>,
    resolver: SessionResolver<C>,
    sender: Arc<O>,
    reset_command: String,
    seen: DashMap<String, DateTime<Utc>>,
}

impl<S, A, O, C> WhatsAppChannel<S, A, O, C>
where
    S: ChatStore,
    A: AgentExecutor,
    O: OutboundSender,
    C: SessionCache,
{
    pub fn new(
        orchestrator: Arc<ChatOrchestrator<S, A>>,
        resolver: SessionResolver<C>,
        sender: Arc<O>,
        reset_command: String,
    ) -> Self {
        Self {
            orchestrator,
            resolver,
            sender,
            reset_command,
            seen: DashMap::new(),
        }
    }

    /// Process every message in a webhook delivery.
    ///
    /// Never fails: the webhook endpoint has already acknowledged the
    /// delivery, so per-message failures are logged and answered with an
    /// apology instead of bubbling up.
    pub async fn process_payload(&self, payload: WebhookPayload) {
        for message in payload.inbound_messages() {
            self.handle_message(message).await;
        }
    }

    async fn handle_message(&self, message: InboundMessage) {
        if self.already_seen(&message.provider_message_id) {
            debug!(
                provider_message_id = %message.provider_message_id,
                "duplicate delivery ignored"
            );
            return;
        }

        // Best effort; a failed read receipt never blocks the reply.
        if let Err(err) = self.sender.mark_as_read(&message.provider_message_id).await {
            debug!(error = %err, "mark_as_read failed");
        }

        let Some(text) = message.text.as_deref().map(str::trim).filter(|t| !t.is_empty())
        else {
            debug!(kind = %message.kind, phone = %message.phone, "ignoring non-text message");
            return;
        };

        if text == self.reset_command {
            self.resolver.resolve(&message.phone, true).await;
            info!(phone = %message.phone, "conversation reset");
            self.reply(&message.phone, RESET_REPLY).await;
            return;
        }

        let resolution = self.resolver.resolve(&message.phone, false).await;
        debug!(
            phone = %message.phone,
            chat_id = %resolution.chat_id,
            is_new_session = resolution.is_new_session,
            "resolved webhook identity"
        );

        let turn = self
            .orchestrator
            .run(TurnRequest {
                user_id: resolution.user_id,
                chat_id: Some(resolution.chat_id),
                session_id: Some(resolution.session_id),
                question: text.to_string(),
            })
            .await;

        let mut turn = match turn {
            Ok(turn) => turn,
            Err(TurnError::ChatBusy(_)) => {
                self.reply(&message.phone, BUSY_REPLY).await;
                return;
            }
            Err(err) => {
                error!(phone = %message.phone, error = %err, "turn failed to start");
                self.reply(&message.phone, ERROR_REPLY).await;
                return;
            }
        };

        let mut reply = String::new();
        while let Some(event) = turn.recv().await {
            match event {
                TurnEvent::End { full_text, .. } => reply = full_text,
                TurnEvent::Error { message: err, .. } => {
                    error!(phone = %message.phone, error = %err, "turn failed mid-stream");
                    reply = ERROR_REPLY.to_string();
                }
                _ => {}
            }
        }

        self.resolver.touch(&message.phone, turn.chat_id, turn.session_id);
        if !reply.is_empty() {
            self.reply(&message.phone, &reply).await;
        }
    }

    async fn reply(&self, phone: &str, body: &str) {
        if let Err(err) = self.sender.send_text(phone, body).await {
            warn!(phone = %phone, error = %err, "outbound send failed");
        }
    }

    fn already_seen(&self, provider_message_id: &str) -> bool {
        let now = Utc::now();
        let ttl = Duration::seconds(DEDUPE_TTL_SECS);
        self.seen.retain(|_, seen_at| now - *seen_at < ttl);
        self.seen
            .insert(provider_message_id.to_string(), now)
            .is_some()
    }
}
