//! services/app/src/screens/state.rs
//!
//! Defines the state shared by every screen.

use crate::adapters::{FileCardStore, FileTokenStore, HttpApi};
use crate::config::Config;
use crate::error::AppError;
use saarthi_core::ports::{
    AuthService, CardStore, ChatService, KrishnaPathService, ThoughtService, TokenStore,
};
use saarthi_core::QueryCache;
use std::sync::Arc;

/// The shared application state, created once at startup and passed to all screens.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub krishna_path: Arc<dyn KrishnaPathService>,
    pub chat: Arc<dyn ChatService>,
    pub thoughts: Arc<dyn ThoughtService>,
    pub auth: Arc<dyn AuthService>,
    pub tokens: Arc<dyn TokenStore>,
    pub cards: Arc<dyn CardStore>,
    pub cache: QueryCache,
}

impl AppState {
    /// Wires the REST adapter and the file stores under the configured data dir.
    pub fn from_config(config: Config) -> Result<Self, AppError> {
        let tokens: Arc<dyn TokenStore> = Arc::new(FileTokenStore::new(config.token_path()));
        let cards: Arc<dyn CardStore> = Arc::new(FileCardStore::new(config.card_path()));
        let api = Arc::new(HttpApi::new(
            config.api_base_url.clone(),
            config.request_timeout,
            tokens.clone(),
        )?);

        Ok(Self {
            cache: QueryCache::new(config.cache_config()),
            config: Arc::new(config),
            krishna_path: api.clone(),
            chat: api.clone(),
            thoughts: api.clone(),
            auth: api,
            tokens,
            cards,
        })
    }

    pub async fn is_logged_in(&self) -> Result<bool, AppError> {
        Ok(self.tokens.load().await?.is_some())
    }
}
