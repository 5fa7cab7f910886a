//! Number guessing: find a hidden number in 1..=100 in as few attempts as possible

pub mod best_score;

use std::time::{Duration, Instant};

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracing::debug;

pub use best_score::{BestScore, BEST_SCORE_KEY};

pub const MIN_GUESS: u8 = 1;
pub const MAX_GUESS: u8 = 100;

/// Guess errors
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum GuessError {
    #[error("Enter a number between 1 and 100")]
    OutOfRange,

    #[error("Not a number: {0}")]
    NotANumber(String),

    #[error("Game is over; start a new one")]
    NotActive,
}

/// How a guess compares to the target
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuessOutcome {
    Low,
    High,
    Win,
}

/// Distance band for a wrong guess
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Proximity {
    VeryClose,
    Close,
    Far,
    VeryFar,
}

impl Proximity {
    fn from_distance(distance: u8) -> Self {
        match distance {
            0..=5 => Proximity::VeryClose,
            6..=10 => Proximity::Close,
            11..=20 => Proximity::Far,
            _ => Proximity::VeryFar,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Proximity::VeryClose => "Very close!",
            Proximity::Close => "Close!",
            Proximity::Far => "A bit far.",
            Proximity::VeryFar => "Way off.",
        }
    }
}

/// Attempt-count badges awarded on a win
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Achievement {
    FirstTry,
    Genius,
    Excellent,
    Persistent,
}

impl Achievement {
    pub fn for_attempts(attempts: u32) -> Option<Self> {
        match attempts {
            1 => Some(Achievement::FirstTry),
            2..=3 => Some(Achievement::Genius),
            4..=5 => Some(Achievement::Excellent),
            n if n >= 20 => Some(Achievement::Persistent),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Achievement::FirstTry => "One shot, one hit!",
            Achievement::Genius => "Genius!",
            Achievement::Excellent => "Excellent!",
            Achievement::Persistent => "Never give up!",
        }
    }
}

/// One entry of the guess history
#[derive(Debug, Clone, PartialEq)]
pub struct GuessRecord {
    pub number: u8,
    /// Time since the game started
    pub elapsed: Duration,
    pub outcome: GuessOutcome,
}

/// Result of an accepted guess
#[derive(Debug, Clone, PartialEq)]
pub enum GuessFeedback {
    Hint {
        outcome: GuessOutcome,
        proximity: Proximity,
        /// Narrowest range still possible, inclusive
        range: (u8, u8),
    },
    Won {
        target: u8,
        attempts: u32,
        elapsed: Duration,
        achievement: Option<Achievement>,
    },
}

pub struct GuessGame {
    rng: ChaCha8Rng,
    target: u8,
    attempts: u32,
    history: Vec<GuessRecord>,
    started_at: Instant,
    finished_after: Option<Duration>,
    active: bool,
    low: u8,
    high: u8,
}

impl GuessGame {
    pub fn new(seed: Option<u64>, now: Instant) -> Self {
        let mut game = Self {
            rng: ChaCha8Rng::seed_from_u64(seed.unwrap_or_else(rand::random)),
            target: MIN_GUESS,
            attempts: 0,
            history: Vec::new(),
            started_at: now,
            finished_after: None,
            active: false,
            low: MIN_GUESS,
            high: MAX_GUESS,
        };
        game.new_game(now);
        game
    }

    /// Draw a new target and reset attempts, history and timer
    pub fn new_game(&mut self, now: Instant) {
        self.target = self.rng.gen_range(MIN_GUESS..=MAX_GUESS);
        self.attempts = 0;
        self.history.clear();
        self.started_at = now;
        self.finished_after = None;
        self.active = true;
        self.low = MIN_GUESS;
        self.high = MAX_GUESS;
        debug!("New guessing game");
    }

    /// Parse raw input into a guess
    pub fn parse(input: &str) -> Result<i64, GuessError> {
        let trimmed = input.trim();
        trimmed
            .parse::<i64>()
            .map_err(|_| GuessError::NotANumber(trimmed.to_string()))
    }

    /// Submit a guess. Out-of-range guesses are rejected without counting.
    pub fn guess(&mut self, number: i64, now: Instant) -> Result<GuessFeedback, GuessError> {
        if !self.active {
            return Err(GuessError::NotActive);
        }
        if number < MIN_GUESS as i64 || number > MAX_GUESS as i64 {
            return Err(GuessError::OutOfRange);
        }
        let number = number as u8;

        self.attempts += 1;
        let elapsed = now.saturating_duration_since(self.started_at);
        let outcome = match number.cmp(&self.target) {
            std::cmp::Ordering::Less => GuessOutcome::Low,
            std::cmp::Ordering::Greater => GuessOutcome::High,
            std::cmp::Ordering::Equal => GuessOutcome::Win,
        };
        self.history.push(GuessRecord { number, elapsed, outcome });

        match outcome {
            GuessOutcome::Win => {
                self.active = false;
                self.finished_after = Some(elapsed);
                Ok(GuessFeedback::Won {
                    target: self.target,
                    attempts: self.attempts,
                    elapsed,
                    achievement: Achievement::for_attempts(self.attempts),
                })
            }
            GuessOutcome::Low => {
                self.low = self.low.max(number + 1);
                Ok(self.hint(number, outcome))
            }
            GuessOutcome::High => {
                self.high = self.high.min(number - 1);
                Ok(self.hint(number, outcome))
            }
        }
    }

    fn hint(&self, number: u8, outcome: GuessOutcome) -> GuessFeedback {
        GuessFeedback::Hint {
            outcome,
            proximity: Proximity::from_distance(number.abs_diff(self.target)),
            range: (self.low, self.high),
        }
    }

    /// Drop the history; returns false when there was nothing to clear
    pub fn clear_history(&mut self) -> bool {
        if self.history.is_empty() {
            return false;
        }
        self.history.clear();
        true
    }

    pub fn history(&self) -> &[GuessRecord] {
        &self.history
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Elapsed play time, frozen once the game is won
    pub fn elapsed(&self, now: Instant) -> Duration {
        self.finished_after
            .unwrap_or_else(|| now.saturating_duration_since(self.started_at))
    }

    /// Progress bar fill: ten attempts fill it, a win fills it completely
    pub fn progress_percent(&self) -> u32 {
        if !self.active && self.finished_after.is_some() {
            return 100;
        }
        (self.attempts * 10).min(100)
    }
}
