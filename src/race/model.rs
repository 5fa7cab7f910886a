//! Client-side mirror of a race and its players

use crate::service::protocol::{GameSnapshot, GameState, PlayerInfo};
use crate::service::ServiceError;

pub type PlayerId = u8;

/// The fixed set of trigger keys, one per player slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TriggerKey {
    Space,
    Enter,
    A,
    L,
}

impl TriggerKey {
    pub const ALL: [TriggerKey; 4] = [TriggerKey::Space, TriggerKey::Enter, TriggerKey::A, TriggerKey::L];

    /// Parse the key name the service assigns to a player
    pub fn from_wire(key: &str) -> Option<Self> {
        match key {
            " " => Some(TriggerKey::Space),
            "Enter" | "\r" => Some(TriggerKey::Enter),
            "a" | "A" => Some(TriggerKey::A),
            "l" | "L" => Some(TriggerKey::L),
            _ => None,
        }
    }

    /// Key for a player slot when the service sends none we recognise
    pub fn for_player(player_id: PlayerId) -> Option<Self> {
        match player_id {
            1..=4 => Some(Self::ALL[(player_id - 1) as usize]),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            TriggerKey::Space => "Space",
            TriggerKey::Enter => "Enter",
            TriggerKey::A => "A",
            TriggerKey::L => "L",
        }
    }
}

/// Player as the client tracks it
#[derive(Debug, Clone, PartialEq)]
pub struct Player {
    pub id: PlayerId,
    pub name: String,
    pub key: Option<TriggerKey>,
    /// Sum of points merged from finished rounds
    pub score: u32,
    /// Reaction submitted this round, in signed milliseconds
    pub last_reaction_ms: Option<i64>,
    pub false_start: bool,
}

impl Player {
    fn from_info(info: &PlayerInfo) -> Self {
        Self {
            id: info.id,
            name: info.name.clone(),
            key: TriggerKey::from_wire(&info.key).or_else(|| TriggerKey::for_player(info.id)),
            score: 0,
            last_reaction_ms: None,
            false_start: false,
        }
    }

    /// Forget per-round reaction state
    pub fn clear_round(&mut self) {
        self.last_reaction_ms = None;
        self.false_start = false;
    }
}

/// Cached mirror of the service's game
#[derive(Debug, Clone)]
pub struct GameMirror {
    pub game_id: String,
    pub game_state: GameState,
    pub players: Vec<Player>,
    /// Rounds the service has finished
    pub current_round: u8,
    pub max_rounds: u8,
}

impl GameMirror {
    /// Build the mirror from a create response
    pub fn from_created(snapshot: GameSnapshot) -> Result<Self, ServiceError> {
        let game_id = snapshot
            .game_id
            .ok_or_else(|| ServiceError::InvalidResponse("missing game_id".to_string()))?;
        let max_rounds = snapshot
            .max_rounds
            .ok_or_else(|| ServiceError::InvalidResponse("missing max_rounds".to_string()))?;

        Ok(Self {
            game_id,
            game_state: snapshot.game_state,
            players: snapshot.players.iter().map(Player::from_info).collect(),
            current_round: snapshot.current_round.unwrap_or(0),
            max_rounds,
        })
    }

    /// Refresh state and counters from a start or status reply.
    ///
    /// Scores are not taken from the service: the local total is the sum of
    /// merged round points.
    pub fn apply_snapshot(&mut self, snapshot: &GameSnapshot) {
        self.game_state = snapshot.game_state;
        if let Some(round) = snapshot.current_round {
            self.current_round = round;
        }
        if let Some(max) = snapshot.max_rounds {
            self.max_rounds = max;
        }

        for info in &snapshot.players {
            match self.players.iter_mut().find(|p| p.id == info.id) {
                Some(player) => {
                    player.name = info.name.clone();
                    if let Some(key) = TriggerKey::from_wire(&info.key) {
                        player.key = Some(key);
                    }
                }
                None => self.players.push(Player::from_info(info)),
            }
        }
    }

    /// Terminal once every round has been played
    pub fn is_terminal(&self) -> bool {
        self.current_round >= self.max_rounds
    }

    pub fn player_for_key(&self, key: TriggerKey) -> Option<PlayerId> {
        self.players.iter().find(|p| p.key == Some(key)).map(|p| p.id)
    }

    pub fn player(&self, id: PlayerId) -> Option<&Player> {
        self.players.iter().find(|p| p.id == id)
    }

    pub fn player_mut(&mut self, id: PlayerId) -> Option<&mut Player> {
        self.players.iter_mut().find(|p| p.id == id)
    }
}

/// One player's result for a round, as displayed
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerResult {
    pub player_id: PlayerId,
    pub reaction_ms: Option<f64>,
    /// 1-based; `None` for false starts and players who never reacted
    pub rank: Option<u8>,
    pub is_false_start: bool,
    pub points: u32,
}

/// A row of the final leaderboard
#[derive(Debug, Clone, PartialEq)]
pub struct Standing {
    pub place: usize,
    pub player_id: PlayerId,
    pub name: String,
    pub score: u32,
}
