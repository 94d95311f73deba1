//! Turn orchestration: one exclusive handle per thread, load, execute,
//! persist.
//!
//! The handle is a `tokio::sync::Mutex` holding the thread's last emitted
//! sequence number, so turns on a thread run strictly one after another and
//! the cursor keeps increasing even when a save fails. Different threads
//! never wait on each other. A handle is dropped once its turn is saved and
//! nobody else holds it; the persisted cursor takes over from there.

use std::any::Any;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, PoisonError};

use futures::FutureExt;
use thiserror::Error;
use tokio::sync::{mpsc, OwnedMutexGuard};
use tracing::{error, info, warn};
use waypoint_config::AppConfig;
use waypoint_core::{
    ConversationState, DomainEvent, ProtocolEvent, StateStore, StoreError, SystemClock,
};

use crate::emitter::EventEmitter;
use crate::executor::{GraphExecutor, TurnError};
use crate::services::Services;
use crate::WorkflowError;

/// Events buffered per turn before the executor waits on the client.
const EVENT_BUFFER: usize = 128;

const GENERIC_FAILURE: &str = "系统内部错误，本轮操作未生效，请重试。";

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Clone)]
pub struct Orchestrator {
    executor: Arc<GraphExecutor>,
    store: Arc<dyn StateStore>,
    threads: Arc<Mutex<HashMap<String, Arc<tokio::sync::Mutex<u64>>>>>,
}

impl Orchestrator {
    pub fn new(executor: GraphExecutor, store: Arc<dyn StateStore>) -> Self {
        Self {
            executor: Arc::new(executor),
            store,
            threads: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Built-in collaborators on the system clock.
    pub fn from_config(config: AppConfig, store: Arc<dyn StateStore>) -> Result<Self, WorkflowError> {
        let services = Services::from_config(config, Arc::new(SystemClock))?;
        Ok(Self::new(GraphExecutor::new(Arc::new(services))?, store))
    }

    pub fn executor(&self) -> &GraphExecutor {
        &self.executor
    }

    pub fn services(&self) -> &Arc<Services> {
        self.executor.services()
    }

    pub fn store(&self) -> &Arc<dyn StateStore> {
        &self.store
    }

    fn handle(&self, thread_id: &str) -> Arc<tokio::sync::Mutex<u64>> {
        let mut threads = self.threads.lock().unwrap_or_else(PoisonError::into_inner);
        threads.entry(thread_id.to_string()).or_default().clone()
    }

    fn existing_handle(&self, thread_id: &str) -> Option<Arc<tokio::sync::Mutex<u64>>> {
        let threads = self.threads.lock().unwrap_or_else(PoisonError::into_inner);
        threads.get(thread_id).cloned()
    }

    /// Forget an idle handle. Only the map and the caller's guard may hold it.
    fn release(&self, thread_id: &str) {
        let mut threads = self.threads.lock().unwrap_or_else(PoisonError::into_inner);
        if threads.get(thread_id).is_some_and(|h| Arc::strong_count(h) == 2) {
            threads.remove(thread_id);
        }
    }

    #[cfg(test)]
    fn tracked_threads(&self) -> usize {
        self.threads.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Start a turn and return its event stream.
    ///
    /// The thread's handle is acquired before this returns, so turns
    /// submitted in order on one thread run in that order. The stream ends
    /// after the turn's state is persisted. Dropping the receiver cancels
    /// the turn and discards its state changes.
    pub async fn stream_turn(
        &self,
        thread_id: &str,
        message: &str,
    ) -> Result<mpsc::Receiver<ProtocolEvent>, OrchestratorError> {
        let thread_id = thread_id.trim();
        let message = message.trim();
        if thread_id.is_empty() {
            return Err(OrchestratorError::InvalidInput("thread_id must not be empty".into()));
        }
        if message.is_empty() {
            return Err(OrchestratorError::InvalidInput("message must not be empty".into()));
        }

        let handle = self.handle(thread_id).lock_owned().await;
        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let this = self.clone();
        let thread_id = thread_id.to_string();
        let message = message.to_string();
        tokio::spawn(async move { this.drive(handle, thread_id, message, tx).await });
        Ok(rx)
    }

    /// Run a turn and collect every event it emits.
    pub async fn run_turn_collect(
        &self,
        thread_id: &str,
        message: &str,
    ) -> Result<Vec<ProtocolEvent>, OrchestratorError> {
        let mut rx = self.stream_turn(thread_id, message).await?;
        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        Ok(events)
    }

    /// The persisted state of a thread. Waits for a running turn to finish.
    pub async fn thread_state(&self, thread_id: &str) -> Result<Option<ConversationState>, OrchestratorError> {
        let _busy = match self.existing_handle(thread_id) {
            Some(handle) => Some(handle.lock_owned().await),
            None => None,
        };
        Ok(self.store.load(thread_id).await?)
    }

    pub async fn list_threads(&self) -> Result<Vec<String>, OrchestratorError> {
        Ok(self.store.list_threads().await?)
    }

    async fn drive(
        self,
        mut cursor: OwnedMutexGuard<u64>,
        thread_id: String,
        message: String,
        tx: mpsc::Sender<ProtocolEvent>,
    ) {
        let services = self.executor.services().clone();
        let snapshot = match self.store.load(&thread_id).await {
            Ok(Some(state)) => state,
            Ok(None) => ConversationState::new(thread_id.as_str(), services.clock.now()),
            Err(e) => {
                error!(thread = %thread_id, error = %e, "Failed to load thread state");
                let emitter = EventEmitter::new(tx, *cursor);
                let _ = emitter.error(GENERIC_FAILURE).await;
                *cursor = emitter.cursor();
                return;
            }
        };

        let start = snapshot.event_cursor.max(*cursor);
        let emitter = EventEmitter::new(tx.clone(), start);
        services.events.publish(DomainEvent::TurnStarted {
            thread_id: thread_id.clone(),
            timestamp: services.clock.now(),
        });

        let mut working = snapshot.clone();
        working.event_cursor = start;
        let turn = AssertUnwindSafe(self.executor.run_turn(working, &message, &emitter)).catch_unwind();

        let finished = tokio::select! {
            biased;
            _ = tx.closed() => None,
            result = turn => Some(result),
        };

        let (state, outcome) = match finished {
            Some(Ok(Ok(outcome))) => (outcome.state, outcome.status.as_str()),
            None | Some(Ok(Err(TurnError::Cancelled))) => {
                info!(thread = %thread_id, "Client disconnected, turn discarded");
                (rollback(snapshot, emitter.cursor()), "cancelled")
            }
            Some(Ok(Err(e))) => {
                error!(thread = %thread_id, error = %e, "Turn failed, rolling back");
                self.report(&emitter, "turn", e.to_string()).await;
                (rollback(snapshot, emitter.cursor()), "error")
            }
            Some(Err(panic)) => {
                let detail = panic_message(panic.as_ref());
                error!(thread = %thread_id, panic = %detail, "Turn panicked, rolling back");
                self.report(&emitter, "panic", detail).await;
                (rollback(snapshot, emitter.cursor()), "panic")
            }
        };

        *cursor = state.event_cursor;
        let saved = match self.store.save(&state).await {
            Ok(()) => true,
            Err(e) => {
                error!(thread = %thread_id, error = %e, "Failed to persist thread state");
                self.report(&emitter, "store", e.to_string()).await;
                false
            }
        };
        *cursor = (*cursor).max(emitter.cursor());
        if saved && *cursor == state.event_cursor {
            self.release(&thread_id);
        }
        drop(cursor);

        let events_emitted = emitter.cursor() - start;
        info!(thread = %thread_id, outcome, events_emitted, "Turn finished");
        services.events.publish(DomainEvent::TurnFinished {
            thread_id,
            outcome: outcome.to_string(),
            events_emitted,
            timestamp: services.clock.now(),
        });
    }

    /// Send the generic error event and publish the details internally.
    async fn report(&self, emitter: &EventEmitter, context: &str, detail: String) {
        if emitter.error(GENERIC_FAILURE).await.is_err() {
            warn!(context, "Client gone before the error event");
        }
        let services = self.executor.services();
        services.events.publish(DomainEvent::ErrorOccurred {
            context: context.to_string(),
            error_message: detail,
            timestamp: services.clock.now(),
        });
    }
}

/// The pre-turn state with only the event cursor moved forward.
fn rollback(mut snapshot: ConversationState, cursor: u64) -> ConversationState {
    snapshot.event_cursor = snapshot.event_cursor.max(cursor);
    snapshot
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}
