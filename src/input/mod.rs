//! Terminal input capture

pub mod keyboard;

pub use keyboard::{forward_keys, map_key, InputCommand, TerminalGuard};
