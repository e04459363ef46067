//! Application state wiring all services together.
//!
//! Core types are generic over the store, agent, outbound, and cache traits;
//! AppState pins them to the concrete infra implementations.

use std::path::PathBuf;
use std::sync::Arc;

use parlance_core::channel::WhatsAppChannel;
use parlance_core::chat::ChatOrchestrator;
use parlance_core::session::{InMemorySessionCache, SessionResolver};
use parlance_infra::agent::HttpAgent;
use parlance_infra::config::{default_database_url, load_settings, resolve_data_dir};
use parlance_infra::sqlite::{DatabasePool, SqliteChatStore};
use parlance_infra::whatsapp::WhatsAppClient;
use parlance_types::Settings;

/// Concrete type aliases pinning the core generics to infra implementations.
pub type Orchestrator = ChatOrchestrator<SqliteChatStore, HttpAgent>;
pub type Channel =
    WhatsAppChannel<SqliteChatStore, HttpAgent, WhatsAppClient, InMemorySessionCache>;

/// Shared application state for all HTTP handlers.
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
    pub channel: Arc<Channel>,
    pub settings: Settings,
    pub data_dir: PathBuf,
}

impl AppState {
    /// Initialize the application state: load settings, connect to the
    /// database, wire the orchestrator and the webhook channel.
    pub async fn init() -> anyhow::Result<Self> {
        let data_dir = resolve_data_dir();
        tokio::fs::create_dir_all(&data_dir).await?;

        let settings = load_settings(&data_dir).await;

        let db_url = settings
            .database_url
            .clone()
            .unwrap_or_else(|| default_database_url(&data_dir));
        let db_pool = DatabasePool::new(&db_url).await?;

        let store = Arc::new(SqliteChatStore::new(db_pool));
        let agent = Arc::new(HttpAgent::new(settings.agent_url.clone()));
        let orchestrator = Arc::new(ChatOrchestrator::new(Arc::clone(&store), agent));

        let whatsapp = Arc::new(WhatsAppClient::new(&settings.whatsapp));
        if !whatsapp.is_enabled() {
            tracing::warn!("WhatsApp outbound disabled (credentials not configured)");
        }

        let resolver = SessionResolver::new(
            Arc::new(InMemorySessionCache::new()),
            settings.inactivity_window(),
        );
        let channel = Arc::new(WhatsAppChannel::new(
            Arc::clone(&orchestrator),
            resolver,
            whatsapp,
            settings.reset_command.clone(),
        ));

        Ok(Self {
            orchestrator,
            channel,
            settings,
            data_dir,
        })
    }
}
