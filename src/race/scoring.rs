//! Round scoring: provisional local ranking and normalisation of service results

use std::collections::HashSet;

use tracing::warn;

use crate::service::protocol::RoundOutcome;

use super::model::{Player, PlayerId, PlayerResult, Standing};

/// A reaction the client submitted, kept in submission order
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Submission {
    pub player_id: PlayerId,
    pub reaction_ms: i64,
}

impl Submission {
    pub fn is_false_start(&self) -> bool {
        self.reaction_ms < 0
    }
}

/// Points for the reaction itself
pub fn base_points(reaction_ms: f64) -> u32 {
    if reaction_ms < 200.0 {
        15
    } else if reaction_ms < 300.0 {
        12
    } else if reaction_ms < 400.0 {
        10
    } else if reaction_ms < 500.0 {
        8
    } else {
        5
    }
}

/// Extra points for placing
pub fn rank_bonus(rank: u8) -> u32 {
    match rank {
        1 => 10,
        2 => 7,
        3 => 5,
        _ => 3,
    }
}

/// Rank this round's submissions locally.
///
/// Only used for immediate feedback when the round closes; the service's
/// finish reply replaces it. Returns one entry per player, in player order.
pub fn provisional_results(players: &[Player], submissions: &[Submission]) -> Vec<PlayerResult> {
    // First submission per player wins
    let mut seen = HashSet::new();
    let firsts: Vec<Submission> = submissions
        .iter()
        .filter(|s| seen.insert(s.player_id))
        .copied()
        .collect();

    // Stable sort keeps submission order for equal times
    let mut valid: Vec<&Submission> = firsts.iter().filter(|s| !s.is_false_start()).collect();
    valid.sort_by_key(|s| s.reaction_ms);

    players
        .iter()
        .map(|player| {
            let submission = firsts.iter().find(|s| s.player_id == player.id);
            let rank = valid
                .iter()
                .position(|s| s.player_id == player.id)
                .map(|idx| (idx + 1) as u8);

            match (submission, rank) {
                (Some(s), Some(rank)) => PlayerResult {
                    player_id: player.id,
                    reaction_ms: Some(s.reaction_ms as f64),
                    rank: Some(rank),
                    is_false_start: false,
                    points: base_points(s.reaction_ms as f64) + rank_bonus(rank),
                },
                (Some(s), None) => PlayerResult {
                    player_id: player.id,
                    reaction_ms: Some(s.reaction_ms as f64),
                    rank: None,
                    is_false_start: true,
                    points: 0,
                },
                (None, _) => PlayerResult {
                    player_id: player.id,
                    reaction_ms: None,
                    rank: None,
                    is_false_start: false,
                    points: 0,
                },
            }
        })
        .collect()
}

/// Convert a finish reply into display results.
///
/// The service decides ranks and points. Locally we only enforce what must
/// hold regardless of service version: a negative reaction is a false start,
/// false starts and non-reactions carry no rank and no points, points are
/// never negative, and the remaining ranks are renumbered densely in the
/// service's order. Entries for unknown or repeated players are dropped.
pub fn normalize_outcome(outcome: &RoundOutcome, players: &[Player]) -> Vec<PlayerResult> {
    let mut seen = HashSet::new();
    let mut results: Vec<PlayerResult> = Vec::with_capacity(outcome.player_results.len());

    for entry in &outcome.player_results {
        if !players.iter().any(|p| p.id == entry.player_id) {
            warn!(player_id = entry.player_id, "Result for unknown player ignored");
            continue;
        }
        if !seen.insert(entry.player_id) {
            warn!(player_id = entry.player_id, "Duplicate result ignored");
            continue;
        }

        let negative = entry.reaction_time.map(|t| t < 0.0).unwrap_or(false);
        let is_false_start = entry.is_false_start.unwrap_or(false) || negative;
        let scored = !is_false_start && entry.reaction_time.is_some();

        if entry.points < 0 {
            warn!(player_id = entry.player_id, points = entry.points, "Negative points clamped to zero");
        }

        results.push(PlayerResult {
            player_id: entry.player_id,
            reaction_ms: entry.reaction_time,
            rank: if scored { entry.rank } else { None },
            is_false_start,
            points: if scored { entry.points.max(0) as u32 } else { 0 },
        });
    }

    // Dense 1..=k over ranked entries, keeping the service's order
    let mut ranked: Vec<usize> = (0..results.len()).filter(|&i| results[i].rank.is_some()).collect();
    ranked.sort_by_key(|&i| results[i].rank);
    for (place, idx) in ranked.into_iter().enumerate() {
        results[idx].rank = Some((place + 1) as u8);
    }

    results
}

/// Rank ascending, unranked entries last
pub fn display_order(results: &[PlayerResult]) -> Vec<PlayerResult> {
    let mut sorted = results.to_vec();
    sorted.sort_by_key(|r| (r.rank.is_none(), r.rank));
    sorted
}

/// Final leaderboard by score, highest first
pub fn standings(players: &[Player]) -> Vec<Standing> {
    let mut sorted: Vec<&Player> = players.iter().collect();
    sorted.sort_by(|a, b| b.score.cmp(&a.score));
    sorted
        .into_iter()
        .enumerate()
        .map(|(i, p)| Standing {
            place: i + 1,
            player_id: p.id,
            name: p.name.clone(),
            score: p.score,
        })
        .collect()
}
