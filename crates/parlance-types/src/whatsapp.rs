//! WhatsApp Cloud API webhook payload shapes.
//!
//! Models the provider envelope Meta POSTs to the webhook endpoint:
//!
//! ```json
//! {
//!   "object": "whatsapp_business_account",
//!   "entry": [{
//!     "id": "...",
//!     "changes": [{
//!       "field": "messages",
//!       "value": { "metadata": {...}, "contacts": [...], "messages": [...] }
//!     }]
//!   }]
//! }
//! ```
//!
//! [`WebhookPayload::inbound_messages`] flattens the envelope into the shape
//! the channel adapter consumes: sender phone, contact name, provider
//! message id (the idempotency key), message type, and text body.

use serde::Deserialize;
use std::collections::HashMap;

/// Object type Meta sets on business-account webhook deliveries.
pub const WHATSAPP_OBJECT: &str = "whatsapp_business_account";

/// Full webhook envelope.
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookPayload {
    pub object: String,
    #[serde(default)]
    pub entry: Vec<WebhookEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookEntry {
    pub id: String,
    #[serde(default)]
    pub changes: Vec<WebhookChange>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookChange {
    pub field: String,
    pub value: WebhookValue,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookValue {
    pub metadata: WebhookMetadata,
    #[serde(default)]
    pub contacts: Vec<WebhookContact>,
    #[serde(default)]
    pub messages: Vec<WebhookMessage>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookMetadata {
    pub display_phone_number: String,
    pub phone_number_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookContact {
    pub wa_id: String,
    pub profile: WebhookProfile,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookProfile {
    pub name: String,
}

/// A raw message inside the provider envelope.
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookMessage {
    pub from: String,
    pub id: String,
    pub timestamp: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub text: Option<WebhookText>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookText {
    pub body: String,
}

/// A flattened inbound message, ready for the channel adapter.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    /// Sender address (e.g. `5511999999999`).
    pub phone: String,
    /// Contact display name, when the envelope carries one.
    pub name: Option<String>,
    /// Provider message id; duplicate deliveries reuse it.
    pub provider_message_id: String,
    /// Message type as reported by the provider (`text`, `image`, ...).
    pub kind: String,
    /// Text body; `None` for non-text messages.
    pub text: Option<String>,
}

impl WebhookPayload {
    /// Extract every message from `field = "messages"` changes, joined with
    /// the contact names delivered alongside them.
    pub fn inbound_messages(&self) -> Vec<InboundMessage> {
        let mut out = Vec::new();
        for entry in &self.entry {
            for change in &entry.changes {
                if change.field != "messages" {
                    continue;
                }
                let names: HashMap<&str, &str> = change
                    .value
                    .contacts
                    .iter()
                    .map(|c| (c.wa_id.as_str(), c.profile.name.as_str()))
                    .collect();

                for msg in &change.value.messages {
                    out.push(InboundMessage {
                        phone: msg.from.clone(),
                        name: names.get(msg.from.as_str()).map(|n| n.to_string()),
                        provider_message_id: msg.id.clone(),
                        kind: msg.kind.clone(),
                        text: msg.text.as_ref().map(|t| t.body.clone()),
                    });
                }
            }
        }
        out
    }
}
