//! Application state shared by the race and guess commands

use std::sync::Arc;

use crate::config::Config;
use crate::service::protocol::CreateGameRequest;
use crate::service::{HttpGameService, ServiceError};
use crate::store::{LocalStorage, StorageError};

/// State errors
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error(transparent)]
    Service(#[from] ServiceError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Shared application state
pub struct AppState {
    pub config: Arc<Config>,
    pub service: Arc<HttpGameService>,
    pub storage: LocalStorage,
}

impl AppState {
    pub fn new(config: Config) -> Result<Self, StateError> {
        let config = Arc::new(config);

        // Initialize game service client
        let service = Arc::new(HttpGameService::new(&config)?);

        // Initialize local storage
        let storage = LocalStorage::open(&config.storage_path)?;

        Ok(Self {
            config,
            service,
            storage,
        })
    }

    /// Create request for a new race from the configured roster
    pub fn create_request(&self) -> CreateGameRequest {
        CreateGameRequest {
            player_count: self.config.player_count,
            round_count: self.config.round_count,
            player_names: self.config.resolved_player_names(),
        }
    }
}
