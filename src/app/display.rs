//! Text rendering of race notices

use std::collections::HashMap;

use crate::race::coordinator::{CallStep, InputRejection, Notice, RoundPhase};
use crate::race::model::{GameMirror, PlayerId, PlayerResult, Standing};

/// Display names and keys by player id
pub struct Roster {
    players: HashMap<PlayerId, (String, &'static str)>,
}

impl Roster {
    pub fn from_game(game: &GameMirror) -> Self {
        let players = game
            .players
            .iter()
            .map(|p| (p.id, (p.name.clone(), p.key.map(|k| k.label()).unwrap_or("-"))))
            .collect();
        Self { players }
    }

    pub fn name(&self, id: PlayerId) -> String {
        self.players
            .get(&id)
            .map(|(name, _)| name.clone())
            .unwrap_or_else(|| format!("Player {}", id))
    }

    /// One line per player: name and trigger key
    pub fn describe(&self) -> Vec<String> {
        let mut ids: Vec<&PlayerId> = self.players.keys().collect();
        ids.sort();
        ids.into_iter()
            .filter_map(|id| self.players.get(id))
            .map(|(name, key)| format!("  {:<10}  [{}]", name, key))
            .collect()
    }
}

/// Lines to print for a notice; empty when there is nothing to show
pub fn render(notice: &Notice, roster: &Roster) -> Vec<String> {
    match notice {
        Notice::PhaseChanged(RoundPhase::ArmedWaitingGo) => vec!["Wait for it...".to_string()],
        Notice::PhaseChanged(_) | Notice::ReactionConfirmed { .. } => Vec::new(),
        Notice::CountdownStep { lit, of } => {
            let lights: String = (0..*of).map(|i| if i < *lit { '●' } else { '○' }).collect();
            vec![lights]
        }
        Notice::GoSignal => vec!["GO!".to_string()],
        Notice::JumpedStart { player_id } => {
            vec![format!("{} jumped the start!", roster.name(*player_id))]
        }
        Notice::ReactionSubmitted { player_id, reaction_ms, false_start } => {
            if *false_start {
                vec![format!("{}: false start ({} ms)", roster.name(*player_id), reaction_ms)]
            } else {
                vec![format!("{}: {} ms", roster.name(*player_id), reaction_ms)]
            }
        }
        Notice::Rejected(InputRejection::DuplicateReaction { player_id }) => {
            vec![format!("{} already reacted this round", roster.name(*player_id))]
        }
        Notice::Rejected(InputRejection::ActionNotAllowed { action, phase }) => {
            vec![format!("{:?} is not available while {:?}", action, phase)]
        }
        Notice::ProvisionalResults { round, results } => {
            let mut lines = vec![format!("Round {} closed, waiting for official results", round)];
            lines.extend(results.iter().map(|r| result_line(r, roster)));
            lines
        }
        Notice::RoundResults { round, results } => {
            let mut lines = vec![format!("Round {} results", round)];
            lines.extend(results.iter().map(|r| result_line(r, roster)));
            lines
        }
        Notice::NoValidReactions { round } => {
            vec![format!("Round {}: no valid reactions this round", round)]
        }
        Notice::AwaitingNextRound { played, of } => {
            vec![format!("{}/{} rounds played. Press n for the next round", played, of)]
        }
        Notice::GameOver(standings) => {
            let mut lines = vec!["Final standings".to_string()];
            lines.extend(standings.iter().map(standing_line));
            lines.push("Press c for a new game or Esc to quit".to_string());
            lines
        }
        Notice::Failed { step, message, retryable } => {
            let mut lines = vec![format!("{} failed: {}", step_name(*step), message)];
            if *retryable {
                lines.push("The game service is unreachable".to_string());
            }
            if let Some(hint) = recovery_hint(*step) {
                lines.push(hint.to_string());
            }
            lines
        }
        Notice::SessionClosed => vec!["Session closed".to_string()],
    }
}

fn result_line(result: &PlayerResult, roster: &Roster) -> String {
    let place = match result.rank {
        Some(rank) => format!("#{}", rank),
        None => "--".to_string(),
    };
    let time = match (result.is_false_start, result.reaction_ms) {
        (true, _) => "false start".to_string(),
        (false, Some(ms)) => format!("{:.0} ms", ms),
        (false, None) => "no reaction".to_string(),
    };
    format!("  {:<3} {:<10} {:<12} +{}", place, roster.name(result.player_id), time, result.points)
}

fn standing_line(standing: &Standing) -> String {
    format!("  {}. {:<10} {}", standing.place, standing.name, standing.score)
}

fn step_name(step: CallStep) -> &'static str {
    match step {
        CallStep::Start => "Starting the round",
        CallStep::Trigger => "Go signal",
        CallStep::React => "Recording reaction",
        CallStep::Finish => "Fetching results",
        CallStep::Status => "Fetching game status",
    }
}

fn recovery_hint(step: CallStep) -> Option<&'static str> {
    match step {
        CallStep::Start => Some("Press g (or n) to try again"),
        CallStep::React => Some("Press your key again"),
        CallStep::Finish | CallStep::Status => Some("Press r to retry"),
        CallStep::Trigger => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::race::model::{Player, TriggerKey};
    use crate::service::protocol::GameState;

    fn roster() -> Roster {
        let game = GameMirror {
            game_id: "game_1".to_string(),
            game_state: GameState::Waiting,
            players: vec![Player {
                id: 1,
                name: "Ana".to_string(),
                key: Some(TriggerKey::Space),
                score: 0,
                last_reaction_ms: None,
                false_start: false,
            }],
            current_round: 0,
            max_rounds: 3,
        };
        Roster::from_game(&game)
    }

    #[test]
    fn test_countdown_lights() {
        let lines = render(&Notice::CountdownStep { lit: 2, of: 5 }, &roster());
        assert_eq!(lines, vec!["●●○○○".to_string()]);
    }

    #[test]
    fn test_unknown_player_gets_default_name() {
        let lines = render(&Notice::JumpedStart { player_id: 4 }, &roster());
        assert_eq!(lines, vec!["Player 4 jumped the start!".to_string()]);
    }

    #[test]
    fn test_round_results_lines() {
        let results = vec![PlayerResult {
            player_id: 1,
            reaction_ms: Some(182.4),
            rank: Some(1),
            is_false_start: false,
            points: 25,
        }];
        let lines = render(&Notice::RoundResults { round: 2, results }, &roster());
        assert_eq!(lines.len(), 2);
        assert!(lines[1].contains("Ana"));
        assert!(lines[1].contains("182 ms"));
        assert!(lines[1].ends_with("+25"));
    }

    #[test]
    fn test_confirmations_are_silent() {
        assert!(render(&Notice::ReactionConfirmed { player_id: 1 }, &roster()).is_empty());
    }

    #[test]
    fn test_game_over_offers_new_game() {
        let standings = vec![Standing {
            place: 1,
            player_id: 1,
            name: "Ana".to_string(),
            score: 47,
        }];
        let lines = render(&Notice::GameOver(standings), &roster());
        assert_eq!(lines[0], "Final standings");
        assert!(lines[1].contains("Ana"));
        assert!(lines.last().unwrap().contains("c for a new game"));
    }
}
