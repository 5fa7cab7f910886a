//! Game service wire types
//! These mirror the JSON bodies exchanged with the remote racing service

use serde::{Deserialize, Serialize};

/// Lifecycle state as reported by the service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GameState {
    /// Created or between rounds
    Waiting,
    /// Lights counting down
    Countdown,
    /// Armed, waiting for the go signal
    Ready,
    /// Go signal fired, collecting reactions
    Racing,
    /// Round scored
    Finished,
    /// All rounds played
    GameOver,
}

/// Player as reported by the service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerInfo {
    pub id: u8,
    pub name: String,
    /// Service-side running score (the client keeps its own additive total)
    #[serde(default)]
    pub score: i32,
    /// Trigger key: " ", "Enter", "a" or "l"
    pub key: String,
    #[serde(default)]
    pub is_ready: bool,
}

/// Body of a create request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateGameRequest {
    pub player_count: u8,
    pub round_count: u8,
    pub player_names: Vec<String>,
}

/// Game state returned by create, start and status.
///
/// Every field the individual calls may omit is optional here; callers
/// check for the fields they need and report `InvalidResponse` otherwise.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameSnapshot {
    #[serde(default)]
    pub game_id: Option<String>,
    pub game_state: GameState,
    #[serde(default)]
    pub players: Vec<PlayerInfo>,
    #[serde(default)]
    pub current_round: Option<u8>,
    #[serde(default)]
    pub max_rounds: Option<u8>,
}

/// Body of a react request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReactionRequest {
    pub game_id: String,
    pub player_id: u8,
    /// Milliseconds since the go signal; negative means the player jumped it
    pub reaction_time: f64,
}

/// Body returned by finish
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoundOutcome {
    /// Round number as counted by the service (1-based), when provided
    #[serde(default)]
    pub round: Option<u8>,
    pub player_results: Vec<PlayerOutcome>,
}

/// One player's scored result for a round
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerOutcome {
    pub player_id: u8,
    #[serde(default)]
    pub reaction_time: Option<f64>,
    #[serde(default)]
    pub rank: Option<u8>,
    /// Absent on some service versions
    #[serde(default)]
    pub is_false_start: Option<bool>,
    /// Signed on the wire; some services deduct points for false starts
    #[serde(default)]
    pub points: i32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_game_state_wire_names() {
        let state: GameState = serde_json::from_str("\"gameover\"").unwrap();
        assert_eq!(state, GameState::GameOver);
        assert_eq!(serde_json::to_string(&GameState::Ready).unwrap(), "\"ready\"");
    }

    #[test]
    fn test_start_snapshot_without_id_or_max_rounds() {
        let json = r#"{
            "game_state": "countdown",
            "players": [{"id": 1, "name": "P1", "score": 0, "key": " ", "is_ready": false}],
            "current_round": 0
        }"#;
        let snapshot: GameSnapshot = serde_json::from_str(json).unwrap();
        assert!(snapshot.game_id.is_none());
        assert_eq!(snapshot.current_round, Some(0));
        assert!(snapshot.max_rounds.is_none());
        assert_eq!(snapshot.players[0].key, " ");
    }

    #[test]
    fn test_outcome_tolerates_missing_flag_and_negative_points() {
        let json = r#"{
            "round": 1,
            "player_results": [
                {"player_id": 1, "reaction_time": 120.0, "rank": 1, "is_false_start": false, "points": 25},
                {"player_id": 2, "reaction_time": null, "rank": null, "points": -5}
            ]
        }"#;
        let outcome: RoundOutcome = serde_json::from_str(json).unwrap();
        assert_eq!(outcome.player_results.len(), 2);
        assert_eq!(outcome.player_results[1].is_false_start, None);
        assert_eq!(outcome.player_results[1].points, -5);
    }

    #[test]
    fn test_reaction_request_body() {
        let req = ReactionRequest {
            game_id: "game_42".to_string(),
            player_id: 2,
            reaction_time: -50.0,
        };
        let value = serde_json::to_value(&req).unwrap();
        assert_eq!(value["player_id"], 2);
        assert_eq!(value["reaction_time"], -50.0);
    }
}
