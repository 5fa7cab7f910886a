//! Configuration module - environment variable parsing

use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Trigger keys are fixed, so a race never has more players than this
pub const MAX_PLAYERS: u8 = 4;

/// Application configuration loaded from environment variables
#[derive(Clone, Debug)]
pub struct Config {
    /// Base URL of the remote racing game service
    pub service_url: String,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Per-request timeout for game service calls
    pub request_timeout: Duration,

    /// Number of players in a new race (1-4)
    pub player_count: u8,
    /// Rounds per race
    pub round_count: u8,
    /// Display names, in player order; blanks fall back to "Player N"
    pub player_names: Vec<String>,
    /// Seed for the go-signal delay generator (random when unset)
    pub race_seed: Option<u64>,

    /// File backing local storage (best score)
    pub storage_path: PathBuf,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let player_count = parse_var("PLAYER_COUNT", 2u8)?;
        if player_count == 0 || player_count > MAX_PLAYERS {
            return Err(ConfigError::OutOfRange("PLAYER_COUNT"));
        }

        let round_count = parse_var("ROUND_COUNT", 3u8)?;
        if round_count == 0 {
            return Err(ConfigError::OutOfRange("ROUND_COUNT"));
        }

        let player_names = env::var("PLAYER_NAMES")
            .map(|names| names.split(',').map(|n| n.trim().to_string()).collect())
            .unwrap_or_default();

        let race_seed = match env::var("RACE_SEED") {
            Ok(raw) => Some(raw.parse().map_err(|_| ConfigError::Invalid("RACE_SEED"))?),
            Err(_) => None,
        };

        Ok(Self {
            service_url: env::var("GAME_SERVICE_URL")
                .unwrap_or_else(|_| "http://localhost:8082".to_string())
                .trim_end_matches('/')
                .to_string(),
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            request_timeout: Duration::from_millis(parse_var("REQUEST_TIMEOUT_MS", 5000u64)?),
            player_count,
            round_count,
            player_names,
            race_seed,
            storage_path: env::var("STORAGE_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(".reaction-race.json")),
        })
    }

    /// Player names padded to `player_count`, with defaults for blanks
    pub fn resolved_player_names(&self) -> Vec<String> {
        (1..=self.player_count)
            .map(|i| {
                let name = self
                    .player_names
                    .get((i - 1) as usize)
                    .map(|n| n.trim())
                    .filter(|n| !n.is_empty());
                match name {
                    Some(n) => n.chars().take(10).collect(),
                    None => format!("Player {}", i),
                }
            })
            .collect()
    }
}

fn parse_var<T: std::str::FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(key) {
        Ok(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid(key)),
        Err(_) => Ok(default),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for environment variable: {0}")]
    Invalid(&'static str),

    #[error("Environment variable out of range: {0}")]
    OutOfRange(&'static str),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_with_names(player_count: u8, names: &[&str]) -> Config {
        Config {
            service_url: "http://localhost:8082".to_string(),
            log_level: "info".to_string(),
            request_timeout: Duration::from_secs(5),
            player_count,
            round_count: 3,
            player_names: names.iter().map(|n| n.to_string()).collect(),
            race_seed: None,
            storage_path: PathBuf::from("unused.json"),
        }
    }

    #[test]
    fn test_names_padded_with_defaults() {
        let config = config_with_names(3, &["Ayrton", "  "]);
        assert_eq!(
            config.resolved_player_names(),
            vec!["Ayrton".to_string(), "Player 2".to_string(), "Player 3".to_string()]
        );
    }

    #[test]
    fn test_names_truncated_to_ten_chars() {
        let config = config_with_names(1, &["Maximilian Verstappen"]);
        assert_eq!(config.resolved_player_names(), vec!["Maximilian".to_string()]);
    }

    #[test]
    fn test_extra_names_ignored() {
        let config = config_with_names(1, &["A", "B", "C"]);
        assert_eq!(config.resolved_player_names().len(), 1);
    }
}
