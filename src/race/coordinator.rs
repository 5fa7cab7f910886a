//! Round lifecycle state machine
//!
//! `RoundCoordinator` is driven by one event at a time and answers with the
//! effects the runtime must carry out (schedule or cancel a timer, call the
//! game service, notify the UI). It never performs I/O itself.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tokio::time::Instant;
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

use crate::service::protocol::{GameSnapshot, ReactionRequest, RoundOutcome};
use crate::service::ServiceError;
use crate::util::time::{signed_millis, RaceTiming};

use super::model::{GameMirror, PlayerId, PlayerResult, Standing, TriggerKey};
use super::scoring::{self, Submission};
use super::timers::{TimerId, TimerKind};

/// Coordinator state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundPhase {
    /// Waiting for an explicit start
    Idle,
    /// Lights coming on one per step
    CountdownRunning,
    /// All lights on, random delay before go
    ArmedWaitingGo,
    /// Go signal fired, collecting reactions
    Racing,
    /// Round closed; scoring or waiting for the next round
    RoundFinished,
    /// All rounds played
    GameFinished,
}

/// Explicit user actions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserAction {
    Start,
    NextRound,
    RetryFinish,
    Reset,
    /// Close a finished game so a fresh one can be created
    NewGame,
}

/// Everything the coordinator reacts to, processed in arrival order
#[derive(Debug)]
pub enum CoordinatorEvent {
    Action(UserAction),
    /// A trigger key press, stamped when it was captured
    KeyPressed { key: TriggerKey, at: Instant },
    TimerFired { timer: TimerId, at: Instant },
    Reply(ServiceReply),
}

/// Completed service calls, tagged with the round that issued them
#[derive(Debug)]
pub enum ServiceReply {
    Started(Result<GameSnapshot, ServiceError>),
    Triggered { round: u32, result: Result<(), ServiceError> },
    Reacted { round: u32, player_id: PlayerId, result: Result<(), ServiceError> },
    Finished { round: u32, result: Result<RoundOutcome, ServiceError> },
    Status { round: u32, result: Result<GameSnapshot, ServiceError> },
}

/// Service calls the runtime should issue
#[derive(Debug, Clone, PartialEq)]
pub enum ServiceCall {
    Start { game_id: String },
    Trigger { game_id: String, round: u32 },
    React { round: u32, request: ReactionRequest },
    Finish { game_id: String, round: u32 },
    Status { game_id: String, round: u32 },
}

/// Which service step a failure belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallStep {
    Start,
    Trigger,
    React,
    Finish,
    Status,
}

/// Input rejected locally, without a network round-trip
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputRejection {
    /// The player already has a reaction in flight or recorded this round
    DuplicateReaction { player_id: PlayerId },
    /// The action does not apply in the current phase
    ActionNotAllowed { action: UserAction, phase: RoundPhase },
}

/// What the UI should show
#[derive(Debug, Clone, PartialEq)]
pub enum Notice {
    PhaseChanged(RoundPhase),
    CountdownStep { lit: u8, of: u8 },
    GoSignal,
    /// A press before the go signal; submitted as a false start once go fires
    JumpedStart { player_id: PlayerId },
    ReactionSubmitted { player_id: PlayerId, reaction_ms: i64, false_start: bool },
    ReactionConfirmed { player_id: PlayerId },
    Rejected(InputRejection),
    /// Local ranking shown until the service's results arrive
    ProvisionalResults { round: u32, results: Vec<PlayerResult> },
    /// Service results in display order, with scores after merging
    RoundResults { round: u32, results: Vec<PlayerResult> },
    NoValidReactions { round: u32 },
    AwaitingNextRound { played: u8, of: u8 },
    GameOver(Vec<Standing>),
    /// `retryable` is set when the service could not be reached at all
    Failed { step: CallStep, message: String, retryable: bool },
    SessionClosed,
}

/// Side effects requested by the coordinator
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    Schedule { timer: TimerId, after: Duration },
    Cancel(TimerId),
    Call(ServiceCall),
    Notify(Notice),
    /// The session is over; the runtime should stop
    Close,
}

/// Where the end-of-round exchange with the service stands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FinishProgress {
    AwaitingFinish,
    FinishFailed,
    AwaitingStatus,
    StatusFailed,
    Settled,
}

/// The reaction round coordinator for one game session
pub struct RoundCoordinator {
    session_id: Uuid,
    game: GameMirror,
    phase: RoundPhase,
    timing: RaceTiming,
    rng: ChaCha8Rng,

    /// Local round sequence, 1-based once the first round starts
    round: u32,
    countdown_lit: u8,
    live_timer: Option<TimerId>,
    next_timer_seq: u64,
    start_in_flight: bool,

    go_at: Option<Instant>,
    early_presses: Vec<(PlayerId, Instant)>,
    /// Reactions wait here until the service has taken the go signal
    trigger_acked: bool,
    held_reacts: Vec<ReactionRequest>,
    /// Rejected false starts, resent with their original time
    false_start_retries: HashMap<PlayerId, i64>,
    /// Players with a reaction pending or acknowledged this round
    suppressed: HashSet<PlayerId>,
    acknowledged: HashSet<PlayerId>,
    submissions: Vec<Submission>,

    finish: Option<FinishProgress>,
    /// Rounds whose points are already in the local scores
    scored_rounds: HashSet<u32>,
    closed: bool,
    new_game_requested: bool,
}

impl RoundCoordinator {
    pub fn new(game: GameMirror, timing: RaceTiming, seed: Option<u64>) -> Self {
        let phase = if game.is_terminal() {
            RoundPhase::GameFinished
        } else {
            RoundPhase::Idle
        };

        Self {
            session_id: Uuid::new_v4(),
            game,
            phase,
            timing,
            rng: ChaCha8Rng::seed_from_u64(seed.unwrap_or_else(rand::random)),
            round: 0,
            countdown_lit: 0,
            live_timer: None,
            next_timer_seq: 0,
            start_in_flight: false,
            go_at: None,
            early_presses: Vec::new(),
            trigger_acked: false,
            held_reacts: Vec::new(),
            false_start_retries: HashMap::new(),
            suppressed: HashSet::new(),
            acknowledged: HashSet::new(),
            submissions: Vec::new(),
            finish: None,
            scored_rounds: HashSet::new(),
            closed: false,
            new_game_requested: false,
        }
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn phase(&self) -> RoundPhase {
        self.phase
    }

    pub fn game(&self) -> &GameMirror {
        &self.game
    }

    pub fn round(&self) -> u32 {
        self.round
    }

    pub fn live_timer(&self) -> Option<TimerId> {
        self.live_timer
    }

    pub fn is_suppressed(&self, player_id: PlayerId) -> bool {
        self.suppressed.contains(&player_id)
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Set when the session was closed to make room for a new game
    pub fn new_game_requested(&self) -> bool {
        self.new_game_requested
    }

    /// Apply one event and return the resulting effects
    pub fn handle(&mut self, event: CoordinatorEvent) -> Vec<Effect> {
        let mut fx = Vec::new();
        if self.closed {
            trace!(session_id = %self.session_id, ?event, "Event after close ignored");
            return fx;
        }

        match event {
            CoordinatorEvent::Action(action) => self.on_action(action, &mut fx),
            CoordinatorEvent::KeyPressed { key, at } => self.on_key(key, at, &mut fx),
            CoordinatorEvent::TimerFired { timer, at } => self.on_timer(timer, at, &mut fx),
            CoordinatorEvent::Reply(reply) => self.on_reply(reply, &mut fx),
        }

        fx
    }

    // ------------------------------------------------------------------
    // User actions
    // ------------------------------------------------------------------

    fn on_action(&mut self, action: UserAction, fx: &mut Vec<Effect>) {
        match action {
            UserAction::Start if self.phase == RoundPhase::Idle && !self.start_in_flight => {
                self.request_start(fx);
            }
            UserAction::NextRound
                if self.phase == RoundPhase::RoundFinished
                    && self.finish == Some(FinishProgress::Settled)
                    && !self.start_in_flight =>
            {
                self.clear_round_state();
                self.request_start(fx);
            }
            UserAction::RetryFinish if self.phase == RoundPhase::RoundFinished => match self.finish {
                Some(FinishProgress::FinishFailed) => {
                    self.finish = Some(FinishProgress::AwaitingFinish);
                    fx.push(Effect::Call(ServiceCall::Finish {
                        game_id: self.game.game_id.clone(),
                        round: self.round,
                    }));
                }
                Some(FinishProgress::StatusFailed) => {
                    self.finish = Some(FinishProgress::AwaitingStatus);
                    fx.push(Effect::Call(ServiceCall::Status {
                        game_id: self.game.game_id.clone(),
                        round: self.round,
                    }));
                }
                _ => self.reject_action(action, fx),
            },
            UserAction::Reset => self.reset(fx),
            UserAction::NewGame if self.phase == RoundPhase::GameFinished => {
                self.new_game_requested = true;
                self.reset(fx);
            }
            _ => self.reject_action(action, fx),
        }
    }

    fn reject_action(&self, action: UserAction, fx: &mut Vec<Effect>) {
        debug!(session_id = %self.session_id, ?action, phase = ?self.phase, "Action rejected");
        fx.push(Effect::Notify(Notice::Rejected(InputRejection::ActionNotAllowed {
            action,
            phase: self.phase,
        })));
    }

    fn request_start(&mut self, fx: &mut Vec<Effect>) {
        self.start_in_flight = true;
        fx.push(Effect::Call(ServiceCall::Start {
            game_id: self.game.game_id.clone(),
        }));
    }

    fn reset(&mut self, fx: &mut Vec<Effect>) {
        self.cancel_live_timer(fx);
        self.clear_round_state();
        self.start_in_flight = false;
        self.finish = None;
        self.phase = RoundPhase::Idle;
        self.closed = true;

        info!(
            session_id = %self.session_id,
            game_id = %self.game.game_id,
            new_game = self.new_game_requested,
            "Session reset"
        );
        fx.push(Effect::Notify(Notice::SessionClosed));
        fx.push(Effect::Close);
    }

    // ------------------------------------------------------------------
    // Input
    // ------------------------------------------------------------------

    fn on_key(&mut self, key: TriggerKey, at: Instant, fx: &mut Vec<Effect>) {
        let Some(player_id) = self.game.player_for_key(key) else {
            trace!(key = key.label(), "Unmapped key ignored");
            return;
        };

        match self.phase {
            RoundPhase::ArmedWaitingGo => {
                if self.suppressed.insert(player_id) {
                    debug!(round = self.round, player_id, "Pressed before go");
                    self.early_presses.push((player_id, at));
                    fx.push(Effect::Notify(Notice::JumpedStart { player_id }));
                }
            }
            RoundPhase::Racing => {
                if !self.suppressed.insert(player_id) {
                    fx.push(Effect::Notify(Notice::Rejected(InputRejection::DuplicateReaction {
                        player_id,
                    })));
                    return;
                }
                let reaction_ms = match self.false_start_retries.remove(&player_id) {
                    Some(reaction_ms) => reaction_ms,
                    None => signed_millis(self.go_at.unwrap_or(at), at),
                };
                self.submit(player_id, reaction_ms, fx);
            }
            _ => trace!(player_id, phase = ?self.phase, "Key ignored outside racing"),
        }
    }

    /// Record a reaction locally and send it to the service once go is acknowledged
    fn submit(&mut self, player_id: PlayerId, reaction_ms: i64, fx: &mut Vec<Effect>) {
        let false_start = reaction_ms < 0;
        self.submissions.retain(|s| s.player_id != player_id);
        self.submissions.push(Submission { player_id, reaction_ms });
        if let Some(player) = self.game.player_mut(player_id) {
            player.last_reaction_ms = Some(reaction_ms);
            player.false_start = false_start;
        }

        info!(round = self.round, player_id, reaction_ms, false_start, "Reaction submitted");
        fx.push(Effect::Notify(Notice::ReactionSubmitted {
            player_id,
            reaction_ms,
            false_start,
        }));
        let request = ReactionRequest {
            game_id: self.game.game_id.clone(),
            player_id,
            reaction_time: reaction_ms as f64,
        };
        if self.trigger_acked {
            fx.push(Effect::Call(ServiceCall::React { round: self.round, request }));
        } else {
            debug!(round = self.round, player_id, "Reaction held until go is acknowledged");
            self.held_reacts.push(request);
        }
    }

    // ------------------------------------------------------------------
    // Timers
    // ------------------------------------------------------------------

    fn schedule(&mut self, kind: TimerKind, after: Duration, fx: &mut Vec<Effect>) {
        self.next_timer_seq += 1;
        let timer = TimerId {
            kind,
            seq: self.next_timer_seq,
        };
        self.live_timer = Some(timer);
        fx.push(Effect::Schedule { timer, after });
    }

    fn cancel_live_timer(&mut self, fx: &mut Vec<Effect>) {
        if let Some(timer) = self.live_timer.take() {
            fx.push(Effect::Cancel(timer));
        }
    }

    fn on_timer(&mut self, timer: TimerId, at: Instant, fx: &mut Vec<Effect>) {
        if self.live_timer != Some(timer) {
            debug!(?timer, phase = ?self.phase, "Stale timer ignored");
            return;
        }
        self.live_timer = None;

        match (timer.kind, self.phase) {
            (TimerKind::CountdownStep, RoundPhase::CountdownRunning) => {
                self.countdown_lit += 1;
                fx.push(Effect::Notify(Notice::CountdownStep {
                    lit: self.countdown_lit,
                    of: self.timing.countdown_steps,
                }));

                if self.countdown_lit >= self.timing.countdown_steps {
                    self.set_phase(RoundPhase::ArmedWaitingGo, fx);
                    let delay = self
                        .rng
                        .gen_range(self.timing.go_delay_min_ms..self.timing.go_delay_max_ms);
                    debug!(round = self.round, delay_ms = delay, "Go delay drawn");
                    self.schedule(TimerKind::GoDelay, Duration::from_millis(delay), fx);
                } else {
                    self.schedule(TimerKind::CountdownStep, self.timing.countdown_step, fx);
                }
            }
            (TimerKind::GoDelay, RoundPhase::ArmedWaitingGo) => self.go(at, fx),
            (TimerKind::RoundTimeout, RoundPhase::Racing) => {
                info!(round = self.round, reacted = self.acknowledged.len(), "Round timed out");
                self.finish_round(fx);
            }
            (kind, phase) => warn!(?kind, ?phase, "Timer fired in unexpected phase"),
        }
    }

    fn go(&mut self, at: Instant, fx: &mut Vec<Effect>) {
        self.go_at = Some(at);
        self.set_phase(RoundPhase::Racing, fx);
        fx.push(Effect::Notify(Notice::GoSignal));
        fx.push(Effect::Call(ServiceCall::Trigger {
            game_id: self.game.game_id.clone(),
            round: self.round,
        }));
        self.schedule(TimerKind::RoundTimeout, self.timing.round_duration, fx);

        for (player_id, pressed_at) in std::mem::take(&mut self.early_presses) {
            self.submit(player_id, signed_millis(at, pressed_at), fx);
        }
    }

    fn finish_round(&mut self, fx: &mut Vec<Effect>) {
        self.cancel_live_timer(fx);
        self.set_phase(RoundPhase::RoundFinished, fx);
        self.finish = Some(FinishProgress::AwaitingFinish);

        let provisional = scoring::provisional_results(&self.game.players, &self.submissions);
        fx.push(Effect::Notify(Notice::ProvisionalResults {
            round: self.round,
            results: scoring::display_order(&provisional),
        }));
        fx.push(Effect::Call(ServiceCall::Finish {
            game_id: self.game.game_id.clone(),
            round: self.round,
        }));
    }

    // ------------------------------------------------------------------
    // Service replies
    // ------------------------------------------------------------------

    fn on_reply(&mut self, reply: ServiceReply, fx: &mut Vec<Effect>) {
        match reply {
            ServiceReply::Started(result) => self.on_started(result, fx),
            ServiceReply::Triggered { round, result } => self.on_triggered(round, result, fx),
            ServiceReply::Reacted { round, player_id, result } => {
                self.on_reacted(round, player_id, result, fx)
            }
            ServiceReply::Finished { round, result } => self.on_finished(round, result, fx),
            ServiceReply::Status { round, result } => self.on_status(round, result, fx),
        }
    }

    fn on_started(&mut self, result: Result<GameSnapshot, ServiceError>, fx: &mut Vec<Effect>) {
        if !self.start_in_flight {
            debug!("Unexpected start reply ignored");
            return;
        }
        self.start_in_flight = false;

        match result {
            Ok(snapshot) => {
                self.game.apply_snapshot(&snapshot);
                if self.game.is_terminal() {
                    self.enter_game_finished(fx);
                    return;
                }

                self.round += 1;
                self.clear_round_state();
                self.finish = None;
                self.countdown_lit = 0;
                info!(
                    session_id = %self.session_id,
                    game_id = %self.game.game_id,
                    round = self.round,
                    "Round starting"
                );
                self.set_phase(RoundPhase::CountdownRunning, fx);
                self.schedule(TimerKind::CountdownStep, self.timing.countdown_step, fx);
            }
            Err(e) => {
                warn!(game_id = %self.game.game_id, error = %e, "Failed to start round");
                fx.push(failed(CallStep::Start, &e));
            }
        }
    }

    /// The service only accepts reactions after go; held ones go out now, in press order
    fn on_triggered(&mut self, round: u32, result: Result<(), ServiceError>, fx: &mut Vec<Effect>) {
        if round != self.round || self.trigger_acked {
            debug!(round, current = self.round, "Unexpected trigger reply ignored");
            return;
        }

        match result {
            Ok(()) => debug!(round, held = self.held_reacts.len(), "Go signal acknowledged"),
            Err(e) => warn!(round, error = %e, "Failed to notify go signal"),
        }
        self.trigger_acked = true;
        for request in std::mem::take(&mut self.held_reacts) {
            fx.push(Effect::Call(ServiceCall::React { round, request }));
        }
    }

    fn on_reacted(
        &mut self,
        round: u32,
        player_id: PlayerId,
        result: Result<(), ServiceError>,
        fx: &mut Vec<Effect>,
    ) {
        if round != self.round {
            debug!(round, current = self.round, player_id, "Reaction reply from an old round");
            return;
        }

        match result {
            Ok(()) => {
                self.acknowledged.insert(player_id);
                fx.push(Effect::Notify(Notice::ReactionConfirmed { player_id }));

                // Late acknowledgements only update bookkeeping
                if self.phase == RoundPhase::Racing
                    && self.acknowledged.len() >= self.game.players.len()
                {
                    info!(round, "All players reacted");
                    self.finish_round(fx);
                }
            }
            Err(e) => {
                warn!(round, player_id, error = %e, "Reaction not recorded; player may retry");
                self.suppressed.remove(&player_id);
                let false_start = self
                    .submissions
                    .iter()
                    .find(|s| s.player_id == player_id && s.is_false_start())
                    .map(|s| s.reaction_ms);
                match false_start {
                    // A false start stays one; the retry resends the same time
                    Some(reaction_ms) => {
                        self.false_start_retries.insert(player_id, reaction_ms);
                    }
                    None => {
                        self.submissions.retain(|s| s.player_id != player_id);
                        if let Some(player) = self.game.player_mut(player_id) {
                            player.clear_round();
                        }
                    }
                }
                fx.push(failed(CallStep::React, &e));
            }
        }
    }

    fn on_finished(
        &mut self,
        round: u32,
        result: Result<RoundOutcome, ServiceError>,
        fx: &mut Vec<Effect>,
    ) {
        if round != self.round
            || self.phase != RoundPhase::RoundFinished
            || self.finish != Some(FinishProgress::AwaitingFinish)
        {
            debug!(round, current = self.round, "Unexpected finish reply ignored");
            return;
        }

        let results = match result {
            Ok(outcome) => scoring::normalize_outcome(&outcome, &self.game.players),
            Err(e) if e.is_invalid_response() => {
                warn!(round, error = %e, "Malformed round results; treating as no reactions");
                Vec::new()
            }
            Err(e) => {
                warn!(round, error = %e, "Failed to fetch round results");
                self.finish = Some(FinishProgress::FinishFailed);
                fx.push(failed(CallStep::Finish, &e));
                return;
            }
        };

        self.merge_points(round, &results);

        if results.is_empty() {
            fx.push(Effect::Notify(Notice::NoValidReactions { round }));
        } else {
            fx.push(Effect::Notify(Notice::RoundResults {
                round,
                results: scoring::display_order(&results),
            }));
        }

        self.finish = Some(FinishProgress::AwaitingStatus);
        fx.push(Effect::Call(ServiceCall::Status {
            game_id: self.game.game_id.clone(),
            round,
        }));
    }

    /// Add a round's points to local scores, once per round
    fn merge_points(&mut self, round: u32, results: &[PlayerResult]) {
        if !self.scored_rounds.insert(round) {
            debug!(round, "Round already merged");
            return;
        }

        for result in results {
            if let Some(player) = self.game.player_mut(result.player_id) {
                player.score += result.points;
            }
        }
    }

    fn on_status(
        &mut self,
        round: u32,
        result: Result<GameSnapshot, ServiceError>,
        fx: &mut Vec<Effect>,
    ) {
        if round != self.round
            || self.phase != RoundPhase::RoundFinished
            || self.finish != Some(FinishProgress::AwaitingStatus)
        {
            debug!(round, current = self.round, "Unexpected status reply ignored");
            return;
        }

        match result {
            Ok(snapshot) => {
                self.game.apply_snapshot(&snapshot);
                if self.game.is_terminal() {
                    self.enter_game_finished(fx);
                } else {
                    self.finish = Some(FinishProgress::Settled);
                    fx.push(Effect::Notify(Notice::AwaitingNextRound {
                        played: self.game.current_round,
                        of: self.game.max_rounds,
                    }));
                }
            }
            Err(e) => {
                warn!(round, error = %e, "Failed to fetch game status");
                self.finish = Some(FinishProgress::StatusFailed);
                fx.push(failed(CallStep::Status, &e));
            }
        }
    }

    // ------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------

    fn set_phase(&mut self, phase: RoundPhase, fx: &mut Vec<Effect>) {
        debug!(round = self.round, from = ?self.phase, to = ?phase, "Phase change");
        self.phase = phase;
        fx.push(Effect::Notify(Notice::PhaseChanged(phase)));
    }

    fn enter_game_finished(&mut self, fx: &mut Vec<Effect>) {
        self.cancel_live_timer(fx);
        self.finish = None;
        self.set_phase(RoundPhase::GameFinished, fx);
        info!(
            session_id = %self.session_id,
            game_id = %self.game.game_id,
            rounds = self.game.current_round,
            "Game finished"
        );
        fx.push(Effect::Notify(Notice::GameOver(scoring::standings(&self.game.players))));
    }

    fn clear_round_state(&mut self) {
        self.go_at = None;
        self.early_presses.clear();
        self.trigger_acked = false;
        self.held_reacts.clear();
        self.false_start_retries.clear();
        self.suppressed.clear();
        self.acknowledged.clear();
        self.submissions.clear();
        for player in &mut self.game.players {
            player.clear_round();
        }
    }
}

fn failed(step: CallStep, error: &ServiceError) -> Effect {
    Effect::Notify(Notice::Failed {
        step,
        message: error.to_string(),
        retryable: error.is_network(),
    })
}
