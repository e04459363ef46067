//! Application settings.
//!
//! Deserialized from `config.toml` in the data directory; every field has a
//! default so a missing or partial file still yields a runnable
//! configuration (the WhatsApp channel stays disabled until its credentials
//! are present).

use serde::Deserialize;

/// Default inactivity window after which a cached webhook session expires.
const DEFAULT_INACTIVITY_SECS: u64 = 24 * 60 * 60;

/// Top-level application settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Bind address for the HTTP server.
    pub host: String,
    pub port: u16,

    /// SQLite database URL; defaults to `<data_dir>/parlance.db` when unset.
    pub database_url: Option<String>,

    /// Endpoint of the external agent capability.
    pub agent_url: String,

    /// Inactivity window for webhook-channel session expiry, in seconds.
    pub session_inactivity_secs: u64,

    /// Control input that forces a fresh chat/session for a webhook identity.
    pub reset_command: String,

    pub whatsapp: WhatsAppSettings,
}

/// Meta WhatsApp Cloud API credentials.
///
/// The outbound channel is enabled only when both `phone_number_id` and
/// `access_token` are configured.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct WhatsAppSettings {
    pub phone_number_id: Option<String>,
    pub access_token: Option<String>,
    /// Pre-shared token echoed back during the webhook GET handshake.
    pub verify_token: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8090,
            database_url: None,
            agent_url: "http://localhost:8091/agent".to_string(),
            session_inactivity_secs: DEFAULT_INACTIVITY_SECS,
            reset_command: "/reset".to_string(),
            whatsapp: WhatsAppSettings::default(),
        }
    }
}

impl Settings {
    /// Inactivity window as a `chrono::Duration`.
    pub fn inactivity_window(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.session_inactivity_secs as i64)
    }
}
