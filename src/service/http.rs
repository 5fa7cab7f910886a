//! Racing service REST client

use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::config::Config;

use super::protocol::{CreateGameRequest, GameSnapshot, ReactionRequest, RoundOutcome};
use super::{GameService, ServiceError};

/// HTTP client for the racing game API
#[derive(Clone)]
pub struct HttpGameService {
    client: Client,
    base_url: String,
}

impl HttpGameService {
    pub fn new(config: &Config) -> Result<Self, ServiceError> {
        let client = Client::builder().timeout(config.request_timeout).build()?;
        Ok(Self::with_client(client, &config.service_url))
    }

    pub fn with_client(client: Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Get the API URL for a racing endpoint
    fn api_url(&self, path: &str) -> String {
        format!("{}/api/racing/{}", self.base_url, path)
    }

    /// POST without a body and decode the reply
    async fn post_empty<T: DeserializeOwned>(&self, path: &str) -> Result<T, ServiceError> {
        let response = self
            .client
            .post(self.api_url(path))
            .header("Content-Type", "application/json")
            .send()
            .await
            .map_err(ServiceError::Request)?;

        decode(check_status(response).await?).await
    }
}

impl GameService for HttpGameService {
    async fn create(&self, req: &CreateGameRequest) -> Result<GameSnapshot, ServiceError> {
        let response = self
            .client
            .post(self.api_url("create"))
            .json(req)
            .send()
            .await
            .map_err(ServiceError::Request)?;

        let snapshot: GameSnapshot = decode(check_status(response).await?).await?;
        if snapshot.game_id.is_none() || snapshot.max_rounds.is_none() {
            return Err(ServiceError::InvalidResponse(
                "create response missing game_id or max_rounds".to_string(),
            ));
        }
        Ok(snapshot)
    }

    async fn start(&self, game_id: &str) -> Result<GameSnapshot, ServiceError> {
        self.post_empty(&format!("start/{}", game_id)).await
    }

    async fn trigger(&self, game_id: &str) -> Result<(), ServiceError> {
        let response = self
            .client
            .post(self.api_url(&format!("trigger/{}", game_id)))
            .send()
            .await
            .map_err(ServiceError::Request)?;

        check_status(response).await?;
        Ok(())
    }

    async fn react(&self, req: &ReactionRequest) -> Result<(), ServiceError> {
        let response = self
            .client
            .post(self.api_url("react"))
            .json(req)
            .send()
            .await
            .map_err(ServiceError::Request)?;

        // Any success is an acknowledgement; the body is advisory
        let response = check_status(response).await?;
        let body = response.text().await.unwrap_or_default();
        debug!(player_id = req.player_id, body = %body, "Reaction acknowledged");
        Ok(())
    }

    async fn finish(&self, game_id: &str) -> Result<RoundOutcome, ServiceError> {
        self.post_empty(&format!("finish/{}", game_id)).await
    }

    async fn status(&self, game_id: &str) -> Result<GameSnapshot, ServiceError> {
        let response = self
            .client
            .get(self.api_url(&format!("status/{}", game_id)))
            .send()
            .await
            .map_err(ServiceError::Request)?;

        let snapshot: GameSnapshot = decode(check_status(response).await?).await?;
        if snapshot.current_round.is_none() || snapshot.max_rounds.is_none() {
            return Err(ServiceError::InvalidResponse(
                "status response missing round counters".to_string(),
            ));
        }
        Ok(snapshot)
    }
}

/// Turn a non-success status into `ServiceError::Api`
async fn check_status(response: Response) -> Result<Response, ServiceError> {
    if !response.status().is_success() {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        return Err(ServiceError::Api { status: status.as_u16(), body });
    }
    Ok(response)
}

/// Read the body and parse it, keeping transport and format errors apart
async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, ServiceError> {
    let body = response.text().await.map_err(ServiceError::Request)?;
    serde_json::from_str(&body).map_err(|e| ServiceError::InvalidResponse(e.to_string()))
}
