//! Persistence collaborator contract.

use async_trait::async_trait;

use crate::error::StoreError;
use crate::state::ConversationState;

/// Load and save [`ConversationState`] by thread id.
///
/// Implementations live in `waypoint-store`. A save replaces the whole
/// record; the core never deletes threads.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// A human-readable name for this backend (e.g., "sqlite", "file").
    fn name(&self) -> &str;

    async fn load(&self, thread_id: &str) -> Result<Option<ConversationState>, StoreError>;

    async fn save(&self, state: &ConversationState) -> Result<(), StoreError>;

    /// Known thread ids, most recently updated first.
    async fn list_threads(&self) -> Result<Vec<String>, StoreError>;
}
