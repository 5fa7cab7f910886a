//! Reaction race: round coordination against the remote game service

pub mod coordinator;
pub mod model;
pub mod runtime;
pub mod scoring;
pub mod timers;

pub use coordinator::{CoordinatorEvent, Effect, Notice, RoundCoordinator, RoundPhase, UserAction};
pub use model::{GameMirror, TriggerKey};
pub use runtime::{create_session, CoordinatorHandle, CoordinatorRuntime, Session};
