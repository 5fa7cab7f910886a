//! Event loop that carries out coordinator effects

use std::future::Future;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::service::protocol::CreateGameRequest;
use crate::service::{GameService, ServiceError};
use crate::util::time::RaceTiming;

use super::coordinator::{
    CoordinatorEvent, Effect, Notice, RoundCoordinator, ServiceCall, ServiceReply, UserAction,
};
use super::model::{GameMirror, TriggerKey};
use super::timers::TimerSet;

const EVENT_QUEUE_SIZE: usize = 256;

/// Cloneable sender for user input
#[derive(Clone)]
pub struct CoordinatorHandle {
    tx: mpsc::Sender<CoordinatorEvent>,
}

impl CoordinatorHandle {
    /// Returns false once the session has stopped
    pub async fn action(&self, action: UserAction) -> bool {
        self.tx.send(CoordinatorEvent::Action(action)).await.is_ok()
    }

    pub async fn key_pressed(&self, key: TriggerKey, at: Instant) -> bool {
        self.tx.send(CoordinatorEvent::KeyPressed { key, at }).await.is_ok()
    }
}

/// A created game, ready to run
pub struct Session<S: GameService> {
    pub runtime: CoordinatorRuntime<S>,
    pub handle: CoordinatorHandle,
    pub notices: mpsc::UnboundedReceiver<Notice>,
}

/// Create the game on the service and wire up a coordinator for it
pub async fn create_session<S: GameService>(
    service: Arc<S>,
    request: &CreateGameRequest,
    timing: RaceTiming,
    seed: Option<u64>,
) -> Result<Session<S>, ServiceError> {
    let snapshot = service.create(request).await?;
    let game = GameMirror::from_created(snapshot)?;

    info!(
        game_id = %game.game_id,
        players = game.players.len(),
        max_rounds = game.max_rounds,
        "Game created"
    );

    let coordinator = RoundCoordinator::new(game, timing, seed);
    let (runtime, handle, notices) = CoordinatorRuntime::new(coordinator, service);
    Ok(Session {
        runtime,
        handle,
        notices,
    })
}

/// Owns the coordinator and performs its effects.
///
/// Timer firings, service replies and user input all arrive on one queue and
/// are applied strictly in arrival order.
pub struct CoordinatorRuntime<S: GameService> {
    coordinator: RoundCoordinator,
    service: Arc<S>,
    events_tx: mpsc::Sender<CoordinatorEvent>,
    events_rx: mpsc::Receiver<CoordinatorEvent>,
    timers: TimerSet,
    notices_tx: mpsc::UnboundedSender<Notice>,
}

impl<S: GameService> CoordinatorRuntime<S> {
    pub fn new(
        coordinator: RoundCoordinator,
        service: Arc<S>,
    ) -> (Self, CoordinatorHandle, mpsc::UnboundedReceiver<Notice>) {
        let (events_tx, events_rx) = mpsc::channel(EVENT_QUEUE_SIZE);
        let (notices_tx, notices_rx) = mpsc::unbounded_channel();

        let runtime = Self {
            coordinator,
            service,
            timers: TimerSet::new(events_tx.clone()),
            events_tx: events_tx.clone(),
            events_rx,
            notices_tx,
        };
        let handle = CoordinatorHandle { tx: events_tx };

        (runtime, handle, notices_rx)
    }

    pub fn coordinator(&self) -> &RoundCoordinator {
        &self.coordinator
    }

    /// Process events until the coordinator closes the session
    pub async fn run(mut self) -> RoundCoordinator {
        let session_id = self.coordinator.session_id();
        info!(
            session_id = %session_id,
            game_id = %self.coordinator.game().game_id,
            "Coordinator running"
        );

        while let Some(event) = self.events_rx.recv().await {
            if let CoordinatorEvent::TimerFired { timer, .. } = &event {
                self.timers.fired(*timer);
            }

            let mut closed = false;
            for effect in self.coordinator.handle(event) {
                match effect {
                    Effect::Schedule { timer, after } => self.timers.schedule(timer, after),
                    Effect::Cancel(timer) => self.timers.cancel(timer),
                    Effect::Call(call) => self.dispatch(call),
                    Effect::Notify(notice) => {
                        if self.notices_tx.send(notice).is_err() {
                            debug!("Notice receiver dropped");
                        }
                    }
                    Effect::Close => closed = true,
                }
            }

            if closed {
                break;
            }
        }

        debug!(session_id = %session_id, pending = self.timers.len(), "Cancelling timers");
        self.timers.cancel_all();
        info!(session_id = %session_id, "Coordinator stopped");
        self.coordinator
    }

    fn dispatch(&self, call: ServiceCall) {
        let service = self.service.clone();
        match call {
            ServiceCall::Start { game_id } => self.spawn_call(async move {
                ServiceReply::Started(service.start(&game_id).await)
            }),
            ServiceCall::Trigger { game_id, round } => self.spawn_call(async move {
                ServiceReply::Triggered {
                    round,
                    result: service.trigger(&game_id).await,
                }
            }),
            ServiceCall::React { round, request } => self.spawn_call(async move {
                ServiceReply::Reacted {
                    round,
                    player_id: request.player_id,
                    result: service.react(&request).await,
                }
            }),
            ServiceCall::Finish { game_id, round } => self.spawn_call(async move {
                ServiceReply::Finished {
                    round,
                    result: service.finish(&game_id).await,
                }
            }),
            ServiceCall::Status { game_id, round } => self.spawn_call(async move {
                ServiceReply::Status {
                    round,
                    result: service.status(&game_id).await,
                }
            }),
        }
    }

    /// Run a service call off the event loop and post its reply back
    fn spawn_call<F>(&self, call: F)
    where
        F: Future<Output = ServiceReply> + Send + 'static,
    {
        let tx = self.events_tx.clone();
        tokio::spawn(async move {
            let reply = call.await;
            if tx.send(CoordinatorEvent::Reply(reply)).await.is_err() {
                warn!("Service reply arrived after the session stopped");
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    use crate::race::coordinator::RoundPhase;
    use crate::service::protocol::{
        GameSnapshot, GameState, PlayerInfo, PlayerOutcome, ReactionRequest, RoundOutcome,
    };

    const KEYS: [&str; 4] = [" ", "Enter", "a", "l"];

    /// In-memory service that scores by arrival order and, like the real
    /// one, refuses reactions until the go signal has been processed
    struct FakeService {
        names: Mutex<Vec<String>>,
        max_rounds: AtomicU8,
        played: AtomicU8,
        reactions: Mutex<Vec<ReactionRequest>>,
        fail_next_finish: AtomicBool,
        trigger_delay: Duration,
        triggered: AtomicBool,
    }

    impl FakeService {
        fn new() -> Self {
            Self {
                names: Mutex::new(Vec::new()),
                max_rounds: AtomicU8::new(0),
                played: AtomicU8::new(0),
                reactions: Mutex::new(Vec::new()),
                fail_next_finish: AtomicBool::new(false),
                trigger_delay: Duration::ZERO,
                triggered: AtomicBool::new(false),
            }
        }

        fn with_trigger_delay(trigger_delay: Duration) -> Self {
            Self {
                trigger_delay,
                ..Self::new()
            }
        }

        fn snapshot(&self, state: GameState) -> GameSnapshot {
            let names = self.names.lock().unwrap();
            GameSnapshot {
                game_id: Some("game_1".to_string()),
                game_state: state,
                players: names
                    .iter()
                    .enumerate()
                    .map(|(i, name)| PlayerInfo {
                        id: i as u8 + 1,
                        name: name.clone(),
                        score: 0,
                        key: KEYS[i].to_string(),
                        is_ready: false,
                    })
                    .collect(),
                current_round: Some(self.played.load(Ordering::SeqCst)),
                max_rounds: Some(self.max_rounds.load(Ordering::SeqCst)),
            }
        }
    }

    impl GameService for FakeService {
        async fn create(&self, req: &CreateGameRequest) -> Result<GameSnapshot, ServiceError> {
            *self.names.lock().unwrap() = req.player_names.clone();
            self.max_rounds.store(req.round_count, Ordering::SeqCst);
            Ok(self.snapshot(GameState::Waiting))
        }

        async fn start(&self, _game_id: &str) -> Result<GameSnapshot, ServiceError> {
            self.reactions.lock().unwrap().clear();
            self.triggered.store(false, Ordering::SeqCst);
            Ok(self.snapshot(GameState::Countdown))
        }

        async fn trigger(&self, _game_id: &str) -> Result<(), ServiceError> {
            tokio::time::sleep(self.trigger_delay).await;
            self.triggered.store(true, Ordering::SeqCst);
            Ok(())
        }

        async fn react(&self, req: &ReactionRequest) -> Result<(), ServiceError> {
            if !self.triggered.load(Ordering::SeqCst) {
                return Err(ServiceError::Api {
                    status: 400,
                    body: "Game is not in racing state".to_string(),
                });
            }
            self.reactions.lock().unwrap().push(req.clone());
            Ok(())
        }

        async fn finish(&self, _game_id: &str) -> Result<RoundOutcome, ServiceError> {
            if self.fail_next_finish.swap(false, Ordering::SeqCst) {
                return Err(ServiceError::Api {
                    status: 503,
                    body: "unavailable".to_string(),
                });
            }

            let round = self.played.fetch_add(1, Ordering::SeqCst) + 1;
            let reactions = self.reactions.lock().unwrap();
            let mut rank = 0;
            let player_results = reactions
                .iter()
                .map(|r| {
                    let false_start = r.reaction_time < 0.0;
                    if !false_start {
                        rank += 1;
                    }
                    PlayerOutcome {
                        player_id: r.player_id,
                        reaction_time: Some(r.reaction_time),
                        rank: (!false_start).then_some(rank),
                        is_false_start: Some(false_start),
                        points: if false_start { -5 } else { 20 },
                    }
                })
                .collect();

            Ok(RoundOutcome {
                round: Some(round),
                player_results,
            })
        }

        async fn status(&self, _game_id: &str) -> Result<GameSnapshot, ServiceError> {
            Ok(self.snapshot(GameState::Finished))
        }
    }

    fn request(names: &[&str], rounds: u8) -> CreateGameRequest {
        CreateGameRequest {
            player_count: names.len() as u8,
            round_count: rounds,
            player_names: names.iter().map(|n| n.to_string()).collect(),
        }
    }

    async fn wait_for<F>(notices: &mut mpsc::UnboundedReceiver<Notice>, mut pred: F) -> Notice
    where
        F: FnMut(&Notice) -> bool,
    {
        let found = tokio::time::timeout(Duration::from_secs(60), async {
            while let Some(notice) = notices.recv().await {
                if pred(&notice) {
                    return Some(notice);
                }
            }
            None
        })
        .await;

        match found {
            Ok(Some(notice)) => notice,
            other => panic!("notice never arrived: {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_game_runs_to_completion() {
        let service = Arc::new(FakeService::new());
        let Session {
            runtime,
            handle,
            mut notices,
        } = create_session(service.clone(), &request(&["Ana"], 2), RaceTiming::default(), Some(1))
            .await
            .unwrap();
        let task = tokio::spawn(runtime.run());

        for round in 1..=2u8 {
            let action = if round == 1 {
                UserAction::Start
            } else {
                UserAction::NextRound
            };
            assert!(handle.action(action).await);
            wait_for(&mut notices, |n| matches!(n, Notice::GoSignal)).await;

            tokio::time::sleep(Duration::from_millis(180)).await;
            handle.key_pressed(TriggerKey::Space, Instant::now()).await;

            match wait_for(&mut notices, |n| matches!(n, Notice::RoundResults { .. })).await {
                Notice::RoundResults { results, .. } => {
                    assert_eq!(results[0].rank, Some(1));
                    assert_eq!(results[0].points, 20);
                }
                other => panic!("unexpected notice: {:?}", other),
            }

            if round == 1 {
                wait_for(&mut notices, |n| matches!(n, Notice::AwaitingNextRound { .. })).await;
            }
        }

        match wait_for(&mut notices, |n| matches!(n, Notice::GameOver(_))).await {
            Notice::GameOver(standings) => assert_eq!(standings[0].score, 40),
            other => panic!("unexpected notice: {:?}", other),
        }

        handle.action(UserAction::Reset).await;
        let coordinator = task.await.unwrap();
        assert!(coordinator.is_closed());
        assert!(!handle.action(UserAction::Start).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_round_times_out_without_reactions() {
        let service = Arc::new(FakeService::new());
        let Session {
            runtime,
            handle,
            mut notices,
        } = create_session(service, &request(&["Ana", "Ben"], 3), RaceTiming::default(), Some(2))
            .await
            .unwrap();
        let task = tokio::spawn(runtime.run());

        handle.action(UserAction::Start).await;
        wait_for(&mut notices, |n| matches!(n, Notice::GoSignal)).await;
        let go = Instant::now();

        wait_for(&mut notices, |n| matches!(n, Notice::NoValidReactions { round: 1 })).await;
        assert!(Instant::now().duration_since(go) >= Duration::from_millis(3000));

        handle.action(UserAction::Reset).await;
        let coordinator = task.await.unwrap();
        assert!(coordinator.game().players.iter().all(|p| p.score == 0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_after_finish_failure() {
        let service = Arc::new(FakeService::new());
        service.fail_next_finish.store(true, Ordering::SeqCst);
        let Session {
            runtime,
            handle,
            mut notices,
        } = create_session(service.clone(), &request(&["Ana"], 3), RaceTiming::default(), Some(3))
            .await
            .unwrap();
        let task = tokio::spawn(runtime.run());

        handle.action(UserAction::Start).await;
        wait_for(&mut notices, |n| matches!(n, Notice::GoSignal)).await;
        tokio::time::sleep(Duration::from_millis(300)).await;
        handle.key_pressed(TriggerKey::Space, Instant::now()).await;

        wait_for(&mut notices, |n| matches!(n, Notice::Failed { .. })).await;
        handle.action(UserAction::RetryFinish).await;
        wait_for(&mut notices, |n| matches!(n, Notice::AwaitingNextRound { played: 1, of: 3 })).await;

        handle.action(UserAction::Reset).await;
        let coordinator = task.await.unwrap();
        assert_eq!(coordinator.phase(), RoundPhase::Idle);
        assert_eq!(coordinator.game().player(1).unwrap().score, 20);
        assert_eq!(service.played.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_false_start_survives_slow_trigger() {
        let service = Arc::new(FakeService::with_trigger_delay(Duration::from_millis(20)));
        let Session {
            runtime,
            handle,
            mut notices,
        } = create_session(service.clone(), &request(&["Ana", "Ben"], 3), RaceTiming::default(), Some(4))
            .await
            .unwrap();
        let task = tokio::spawn(runtime.run());

        handle.action(UserAction::Start).await;
        wait_for(&mut notices, |n| *n == Notice::PhaseChanged(RoundPhase::ArmedWaitingGo)).await;
        handle.key_pressed(TriggerKey::Enter, Instant::now()).await;

        wait_for(&mut notices, |n| matches!(n, Notice::GoSignal)).await;
        tokio::time::sleep(Duration::from_millis(150)).await;
        handle.key_pressed(TriggerKey::Enter, Instant::now()).await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        handle.key_pressed(TriggerKey::Space, Instant::now()).await;

        match wait_for(&mut notices, |n| matches!(n, Notice::RoundResults { .. })).await {
            Notice::RoundResults { results, .. } => {
                let ben = results.iter().find(|r| r.player_id == 2).unwrap();
                assert!(ben.is_false_start);
                assert_eq!(ben.rank, None);
                let ana = results.iter().find(|r| r.player_id == 1).unwrap();
                assert_eq!(ana.rank, Some(1));
            }
            other => panic!("unexpected notice: {:?}", other),
        }

        let accepted = service.reactions.lock().unwrap().clone();
        let ben: Vec<f64> = accepted
            .iter()
            .filter(|r| r.player_id == 2)
            .map(|r| r.reaction_time)
            .collect();
        assert!(!ben.is_empty());
        assert!(ben.iter().all(|t| *t < 0.0), "accepted reactions for Ben: {:?}", ben);

        handle.action(UserAction::Reset).await;
        let coordinator = task.await.unwrap();
        assert_eq!(coordinator.game().player(2).unwrap().score, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_new_game_after_game_over_closes_session() {
        let service = Arc::new(FakeService::new());
        let Session {
            runtime,
            handle,
            mut notices,
        } = create_session(service, &request(&["Ana"], 1), RaceTiming::default(), Some(5))
            .await
            .unwrap();
        let task = tokio::spawn(runtime.run());

        handle.action(UserAction::Start).await;
        wait_for(&mut notices, |n| matches!(n, Notice::GameOver(_))).await;

        handle.action(UserAction::NewGame).await;
        wait_for(&mut notices, |n| matches!(n, Notice::SessionClosed)).await;
        let coordinator = task.await.unwrap();
        assert!(coordinator.is_closed());
        assert!(coordinator.new_game_requested());
    }
}
