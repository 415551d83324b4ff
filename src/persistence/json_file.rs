//! A [`StateStore`] backed by a single JSON document on local disk.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;

use super::{error::PersistenceError, traits::StateStore};
use crate::models::{PERSISTED_STATE_VERSION, PersistedState};

/// Stores the gate state as pretty-printed JSON.
///
/// Writes go to `<path>.tmp`, are synced, then renamed over `<path>`, so a
/// crash leaves either the previous or the new document, never a torn one.
/// A file that cannot be read back is moved aside to `<path>.corrupt` and
/// the gate starts from an empty state.
#[derive(Debug, Clone)]
pub struct JsonFileStateStore {
    path: PathBuf,
}

impl JsonFileStateStore {
    /// Creates a store for `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// The state file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn sibling(&self, suffix: &str) -> PathBuf {
        let mut name = self.path.clone().into_os_string();
        name.push(suffix);
        PathBuf::from(name)
    }

    /// Reads and validates the state file. `Ok(None)` means there is no file.
    pub async fn read(&self) -> Result<Option<PersistedState>, PersistenceError> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let state: PersistedState = serde_json::from_slice(&bytes)?;
        if !state.is_current_version() {
            return Err(PersistenceError::UnsupportedVersion {
                found: state.version,
                expected: PERSISTED_STATE_VERSION,
            });
        }
        Ok(Some(state))
    }

    async fn quarantine(&self) {
        let target = self.sibling(".corrupt");
        match tokio::fs::rename(&self.path, &target).await {
            Ok(()) => {
                tracing::warn!(path = %target.display(), "Moved unreadable state file aside.")
            }
            Err(e) => tracing::warn!(error = %e, "Could not move unreadable state file aside."),
        }
    }
}

#[async_trait]
impl StateStore for JsonFileStateStore {
    async fn load(&self) -> PersistedState {
        match self.read().await {
            Ok(Some(state)) => {
                tracing::info!(
                    path = %self.path.display(),
                    saved_at = ?state.saved_at,
                    species = state.cooldowns.len(),
                    "Restored gate state."
                );
                state
            }
            Ok(None) => {
                tracing::info!(path = %self.path.display(), "No state file found, starting fresh.");
                PersistedState::empty()
            }
            Err(e) => {
                tracing::warn!(
                    path = %self.path.display(),
                    error = %e,
                    "State file is unreadable, starting from an empty state."
                );
                self.quarantine().await;
                PersistedState::empty()
            }
        }
    }

    async fn save(&self, state: &PersistedState) -> Result<(), PersistenceError> {
        let bytes = serde_json::to_vec_pretty(state)?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let tmp = self.sibling(".tmp");
        let mut file = tokio::fs::File::create(&tmp).await?;
        file.write_all(&bytes).await?;
        file.flush().await?;
        file.sync_all().await?;
        drop(file);

        tokio::fs::rename(&tmp, &self.path).await?;
        tracing::debug!(path = %self.path.display(), bytes = bytes.len(), "Gate state saved.");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use tempfile::tempdir;

    use super::*;
    use crate::models::{MilestoneRecord, RarityTier, SpeciesCooldownState};

    fn sample_state() -> PersistedState {
        let at = Utc.with_ymd_and_hms(2025, 7, 1, 7, 0, 0).unwrap();
        let mut state = PersistedState::empty();
        state.saved_at = Some(at);
        state.cooldowns.insert(
            "erithacus rubecula".to_string(),
            SpeciesCooldownState {
                last_shown: at,
                tier: RarityTier::Common,
                cooldown_until: at + chrono::TimeDelta::minutes(10),
            },
        );
        state.milestones.insert(
            "erithacus rubecula".to_string(),
            MilestoneRecord { count: 7, ..Default::default() },
        );
        state.first_of_year.entry(2025).or_default().insert("erithacus rubecula".to_string());
        state
    }

    #[tokio::test]
    async fn test_save_then_load_round_trips() {
        let dir = tempdir().unwrap();
        let store = JsonFileStateStore::new(dir.path().join("nested/state.json"));
        let state = sample_state();

        store.save(&state).await.unwrap();
        assert!(!dir.path().join("nested/state.json.tmp").exists());
        assert_eq!(store.load().await, state);
    }

    #[tokio::test]
    async fn test_missing_file_loads_empty() {
        let dir = tempdir().unwrap();
        let store = JsonFileStateStore::new(dir.path().join("state.json"));
        assert_eq!(store.load().await, PersistedState::empty());
    }

    #[tokio::test]
    async fn test_corrupt_file_loads_empty_and_is_moved_aside() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state.json");
        tokio::fs::write(&path, b"{ not json").await.unwrap();

        let store = JsonFileStateStore::new(&path);
        assert_eq!(store.load().await, PersistedState::empty());
        assert!(!path.exists());
        assert!(dir.path().join("state.json.corrupt").exists());
    }

    #[tokio::test]
    async fn test_unknown_version_is_treated_as_corrupt() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state.json");
        tokio::fs::write(&path, br#"{"version": 99}"#).await.unwrap();

        let store = JsonFileStateStore::new(&path);
        assert!(matches!(
            store.read().await,
            Err(PersistenceError::UnsupportedVersion { found: 99, .. })
        ));
        assert_eq!(store.load().await, PersistedState::empty());
    }

    #[tokio::test]
    async fn test_save_overwrites_previous_state() {
        let dir = tempdir().unwrap();
        let store = JsonFileStateStore::new(dir.path().join("state.json"));
        store.save(&sample_state()).await.unwrap();
        store.save(&PersistedState::empty()).await.unwrap();
        assert_eq!(store.load().await, PersistedState::empty());
    }
}
