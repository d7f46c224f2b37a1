//! Application state shared across all request handlers.

use std::sync::Arc;

use crate::chat::orchestrator::ConversationService;
use crate::chat::sessions::SessionManager;
use crate::chat::store::{ChatStore, SqliteChatStore};
use crate::config::Config;
use crate::llm::ollama::OllamaGateway;

/// Shared application state.
pub struct AppState {
    /// Conversation orchestrator handling chat turns.
    pub chat: ConversationService,
    /// Session lifecycle and ownership layer.
    pub sessions: SessionManager,
    /// Ollama gateway, used directly for the health probe.
    pub gateway: OllamaGateway,
}

impl AppState {
    /// Open the database (running the legacy migration) and wire up the
    /// gateway and services.
    ///
    /// # Errors
    /// Returns an error if the store cannot be initialized or the HTTP
    /// client cannot be built.
    pub async fn new(
        config: &Config,
    ) -> Result<Arc<Self>, Box<dyn std::error::Error + Send + Sync>> {
        let store = SqliteChatStore::open(&config.database_path).await?;
        Self::from_store(Arc::new(store), config)
    }

    /// Assemble state over an already-initialized store.
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn from_store(
        store: Arc<dyn ChatStore>,
        config: &Config,
    ) -> Result<Arc<Self>, Box<dyn std::error::Error + Send + Sync>> {
        let gateway = OllamaGateway::new(config.gateway())?;
        let sessions = SessionManager::new(Arc::clone(&store));
        let chat = ConversationService::new(store, sessions.clone(), gateway.clone());
        Ok(Arc::new(Self {
            chat,
            sessions,
            gateway,
        }))
    }
}
