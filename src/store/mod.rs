//! Local persistence

pub mod local;

pub use local::{LocalStorage, StorageError};
