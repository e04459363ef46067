//! WhatsApp Cloud API outbound client.
//!
//! Implements [`OutboundSender`] against the Meta Graph API. The access
//! token is wrapped in [`secrecy::SecretString`] and only exposed when
//! building the Authorization header; it never appears in Debug output or
//! logs.

use std::time::Duration;

use parlance_core::channel::OutboundSender;
use parlance_types::{OutboundError, WhatsAppSettings};
use secrecy::{ExposeSecret, SecretString};
use tracing::debug;

const GRAPH_API_BASE: &str = "https://graph.facebook.com/v18.0";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Cloud API client, or a disabled stub when credentials are missing.
///
/// A missing `phone_number_id` or `access_token` turns every call into
/// [`OutboundError::Disabled`] so the webhook channel can run without
/// outbound capability in development.
pub struct WhatsAppClient {
    client: reqwest::Client,
    base_url: String,
    phone_number_id: Option<String>,
    access_token: Option<SecretString>,
}

impl WhatsAppClient {
    pub fn new(settings: &WhatsAppSettings) -> Self {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self {
            client,
            base_url: GRAPH_API_BASE.to_string(),
            phone_number_id: settings.phone_number_id.clone(),
            access_token: settings
                .access_token
                .clone()
                .map(|token| SecretString::from(token)),
        }
    }

    /// Whether credentials are configured.
    pub fn is_enabled(&self) -> bool {
        self.phone_number_id.is_some() && self.access_token.is_some()
    }

    /// Override the Graph API base URL.
    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = base_url;
        self
    }

    fn credentials(&self) -> Result<(&str, &SecretString), OutboundError> {
        match (&self.phone_number_id, &self.access_token) {
            (Some(id), Some(token)) => Ok((id.as_str(), token)),
            _ => Err(OutboundError::Disabled),
        }
    }

    async fn post(&self, body: serde_json::Value) -> Result<(), OutboundError> {
        let (phone_number_id, token) = self.credentials()?;
        let url = format!("{}/{}/messages", self.base_url, phone_number_id);

        let response = self
            .client
            .post(&url)
            .bearer_auth(token.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(|e| OutboundError::Send(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(OutboundError::Send(format!("{status}: {detail}")));
        }
        debug!(status = %status, "cloud api request accepted");
        Ok(())
    }
}

fn text_body(to: &str, body: &str) -> serde_json::Value {
    serde_json::json!({
        "messaging_product": "whatsapp",
        "recipient_type": "individual",
        "to": to,
        "type": "text",
        "text": { "body": body }
    })
}

fn read_receipt_body(provider_message_id: &str) -> serde_json::Value {
    serde_json::json!({
        "messaging_product": "whatsapp",
        "status": "read",
        "message_id": provider_message_id
    })
}

impl OutboundSender for WhatsAppClient {
    async fn send_text(&self, to: &str, body: &str) -> Result<(), OutboundError> {
        self.post(text_body(to, body)).await
    }

    async fn mark_as_read(&self, provider_message_id: &str) -> Result<(), OutboundError> {
        self.post(read_receipt_body(provider_message_id)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_without_credentials() {
        let client = WhatsAppClient::new(&WhatsAppSettings::default());
        assert!(!client.is_enabled());
        assert!(matches!(client.credentials(), Err(OutboundError::Disabled)));
    }

    #[test]
    fn test_enabled_with_credentials() {
        let client = WhatsAppClient::new(&WhatsAppSettings {
            phone_number_id: Some("111222333".to_string()),
            access_token: Some("EAAG-token".to_string()),
            verify_token: None,
        });
        assert!(client.is_enabled());
    }

    #[tokio::test]
    async fn test_disabled_client_rejects_sends() {
        let client = WhatsAppClient::new(&WhatsAppSettings::default());
        let err = client.send_text("5511999999999", "oi").await.unwrap_err();
        assert!(matches!(err, OutboundError::Disabled));
        let err = client.mark_as_read("wamid.1").await.unwrap_err();
        assert!(matches!(err, OutboundError::Disabled));
    }

    #[test]
    fn test_text_body_shape() {
        let body = text_body("5511999999999", "Olá!");
        assert_eq!(body["messaging_product"], "whatsapp");
        assert_eq!(body["to"], "5511999999999");
        assert_eq!(body["type"], "text");
        assert_eq!(body["text"]["body"], "Olá!");
    }

    #[test]
    fn test_read_receipt_body_shape() {
        let body = read_receipt_body("wamid.ABC123");
        assert_eq!(body["status"], "read");
        assert_eq!(body["message_id"], "wamid.ABC123");
    }
}
