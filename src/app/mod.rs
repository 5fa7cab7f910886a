//! Application wiring and terminal front ends

pub mod display;
pub mod guess;
pub mod race;
pub mod state;

pub use state::AppState;
