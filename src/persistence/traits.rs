//! The state store interface.

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;

use super::error::PersistenceError;
use crate::models::PersistedState;

/// Loads and saves the gate state.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Loads the last saved state. A missing or unreadable store yields an
    /// empty state instead of an error.
    async fn load(&self) -> PersistedState;

    /// Replaces the stored state. A failed save leaves the previous state
    /// intact.
    async fn save(&self, state: &PersistedState) -> Result<(), PersistenceError>;
}
