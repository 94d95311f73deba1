//! In-memory backend, useful for testing and ephemeral sessions.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use waypoint_core::error::StoreError;
use waypoint_core::{ConversationState, StateStore};

/// Keeps every thread in a map. Nothing survives the process.
pub struct InMemoryStateStore {
    threads: Arc<RwLock<HashMap<String, ConversationState>>>,
}

impl InMemoryStateStore {
    pub fn new() -> Self {
        Self {
            threads: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

impl Default for InMemoryStateStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StateStore for InMemoryStateStore {
    fn name(&self) -> &str {
        "in_memory"
    }

    async fn load(&self, thread_id: &str) -> Result<Option<ConversationState>, StoreError> {
        Ok(self.threads.read().await.get(thread_id).cloned())
    }

    async fn save(&self, state: &ConversationState) -> Result<(), StoreError> {
        self.threads
            .write()
            .await
            .insert(state.thread_id.clone(), state.clone());
        Ok(())
    }

    async fn list_threads(&self) -> Result<Vec<String>, StoreError> {
        let threads = self.threads.read().await;
        let mut states: Vec<&ConversationState> = threads.values().collect();
        states.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(states.into_iter().map(|s| s.thread_id.clone()).collect())
    }
}
