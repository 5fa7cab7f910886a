//! Remote racing game service: the authoritative owner of game state

pub mod http;
pub mod protocol;

use std::future::Future;

pub use http::HttpGameService;
pub use protocol::{CreateGameRequest, GameSnapshot, ReactionRequest, RoundOutcome};

/// Operations the remote game service exposes.
///
/// Implementations must be cheap to share; the coordinator runtime keeps one
/// behind an `Arc` and issues calls from spawned tasks.
pub trait GameService: Send + Sync + 'static {
    /// Create a game and its players
    fn create(
        &self,
        req: &CreateGameRequest,
    ) -> impl Future<Output = Result<GameSnapshot, ServiceError>> + Send;

    /// (Re)initialise round state ahead of a countdown
    fn start(&self, game_id: &str) -> impl Future<Output = Result<GameSnapshot, ServiceError>> + Send;

    /// Tell the service the go signal fired
    fn trigger(&self, game_id: &str) -> impl Future<Output = Result<(), ServiceError>> + Send;

    /// Submit one player's reaction time
    fn react(&self, req: &ReactionRequest) -> impl Future<Output = Result<(), ServiceError>> + Send;

    /// Close the round and fetch scored results
    fn finish(&self, game_id: &str) -> impl Future<Output = Result<RoundOutcome, ServiceError>> + Send;

    /// Current round counters and players
    fn status(&self, game_id: &str) -> impl Future<Output = Result<GameSnapshot, ServiceError>> + Send;
}

/// Game service errors
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("API error (status {status}): {body}")]
    Api { status: u16, body: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl ServiceError {
    /// Network failures can be retried by the user; the coordinator never
    /// retries on its own
    pub fn is_network(&self) -> bool {
        matches!(self, ServiceError::Request(_))
    }

    pub fn is_invalid_response(&self) -> bool {
        matches!(self, ServiceError::InvalidResponse(_))
    }
}
