//! Fewest attempts ever needed to win, kept in local storage

use tracing::{info, warn};

use crate::store::{LocalStorage, StorageError};

pub const BEST_SCORE_KEY: &str = "guessNumber_bestScore";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BestScore {
    attempts: Option<u32>,
}

impl BestScore {
    /// Read the stored best; an unparseable value counts as none
    pub fn load(storage: &LocalStorage) -> Self {
        let attempts = storage.get_item(BEST_SCORE_KEY).and_then(|raw| match raw.parse::<u32>() {
            Ok(0) | Err(_) => {
                warn!(value = raw, "Ignoring invalid stored best score");
                None
            }
            Ok(n) => Some(n),
        });
        Self { attempts }
    }

    pub fn get(&self) -> Option<u32> {
        self.attempts
    }

    /// Persist `attempts` if it beats the current best. Returns true on a new record.
    pub fn record(&mut self, attempts: u32, storage: &mut LocalStorage) -> Result<bool, StorageError> {
        if self.attempts.is_some_and(|best| attempts >= best) {
            return Ok(false);
        }

        storage.set_item(BEST_SCORE_KEY, &attempts.to_string())?;
        self.attempts = Some(attempts);
        info!(attempts, "New best score");
        Ok(true)
    }

    /// Forget the stored best
    pub fn clear(&mut self, storage: &mut LocalStorage) -> Result<(), StorageError> {
        storage.remove_item(BEST_SCORE_KEY)?;
        self.attempts = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use uuid::Uuid;

    fn temp_path() -> PathBuf {
        std::env::temp_dir().join(format!("best-score-{}.json", Uuid::new_v4()))
    }

    #[test]
    fn test_only_lower_attempts_replace_best() {
        let path = temp_path();
        let mut storage = LocalStorage::open(&path).unwrap();
        let mut best = BestScore::load(&storage);
        assert_eq!(best.get(), None);

        assert!(best.record(8, &mut storage).unwrap());
        assert!(!best.record(8, &mut storage).unwrap());
        assert!(!best.record(12, &mut storage).unwrap());
        assert!(best.record(5, &mut storage).unwrap());

        let reopened = LocalStorage::open(&path).unwrap();
        assert_eq!(BestScore::load(&reopened).get(), Some(5));
        std::fs::remove_file(path).ok();
    }

    #[test]
    fn test_invalid_stored_value_ignored() {
        let path = temp_path();
        let mut storage = LocalStorage::open(&path).unwrap();
        storage.set_item(BEST_SCORE_KEY, "lots").unwrap();

        assert_eq!(BestScore::load(&storage).get(), None);
        std::fs::remove_file(path).ok();
    }

    #[test]
    fn test_clear_removes_stored_best() {
        let path = temp_path();
        let mut storage = LocalStorage::open(&path).unwrap();
        let mut best = BestScore::load(&storage);
        best.record(6, &mut storage).unwrap();

        best.clear(&mut storage).unwrap();
        assert_eq!(best.get(), None);
        assert_eq!(storage.get_item(BEST_SCORE_KEY), None);

        let reopened = LocalStorage::open(&path).unwrap();
        assert_eq!(BestScore::load(&reopened).get(), None);

        // A fresh record is accepted again after clearing
        assert!(best.record(9, &mut storage).unwrap());
        std::fs::remove_file(path).ok();
    }
}
