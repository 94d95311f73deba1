//! SQLite backend.
//!
//! One table, `threads`, keyed by thread id. The state is stored as a JSON
//! document next to its `updated_at` timestamp for ordering.

use std::str::FromStr;

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};
use tracing::{debug, info};
use waypoint_core::error::StoreError;
use waypoint_core::{ConversationState, StateStore};

pub struct SqliteStateStore {
    pool: SqlitePool,
}

impl SqliteStateStore {
    /// Open (creating if needed) the database at `url`.
    ///
    /// Pass `"sqlite::memory:"` for an in-process ephemeral database.
    pub async fn new(url: &str) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(url)
            .map_err(|e| StoreError::Storage(format!("Invalid SQLite path: {e}")))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal);

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await
            .map_err(|e| StoreError::Storage(format!("Failed to open SQLite: {e}")))?;

        let store = Self { pool };
        store.run_migrations().await?;
        info!("SQLite state store initialized at {url}");
        Ok(store)
    }

    /// Create from an existing pool.
    pub async fn from_pool(pool: SqlitePool) -> Result<Self, StoreError> {
        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    async fn run_migrations(&self) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS threads (
                thread_id   TEXT PRIMARY KEY NOT NULL,
                state       TEXT NOT NULL,
                updated_at  TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::MigrationFailed(format!("threads table: {e}")))?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_threads_updated_at ON threads(updated_at DESC)")
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::MigrationFailed(format!("updated_at index: {e}")))?;

        debug!("SQLite migrations complete");
        Ok(())
    }
}

#[async_trait]
impl StateStore for SqliteStateStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn load(&self, thread_id: &str) -> Result<Option<ConversationState>, StoreError> {
        let row = sqlx::query("SELECT state FROM threads WHERE thread_id = ?")
            .bind(thread_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::Storage(format!("load {thread_id}: {e}")))?;

        let Some(row) = row else {
            return Ok(None);
        };
        let raw: String = row
            .try_get("state")
            .map_err(|e| StoreError::Storage(format!("state column: {e}")))?;
        serde_json::from_str(&raw)
            .map(Some)
            .map_err(|e| StoreError::Corrupted {
                thread_id: thread_id.to_string(),
                reason: e.to_string(),
            })
    }

    async fn save(&self, state: &ConversationState) -> Result<(), StoreError> {
        let json = serde_json::to_string(state)
            .map_err(|e| StoreError::Storage(format!("serialize {}: {e}", state.thread_id)))?;

        sqlx::query(
            r#"
            INSERT INTO threads (thread_id, state, updated_at)
            VALUES (?, ?, ?)
            ON CONFLICT(thread_id) DO UPDATE SET
                state = excluded.state,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&state.thread_id)
        .bind(&json)
        .bind(state.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Storage(format!("save {}: {e}", state.thread_id)))?;

        debug!(thread = %state.thread_id, bytes = json.len(), "State saved");
        Ok(())
    }

    async fn list_threads(&self) -> Result<Vec<String>, StoreError> {
        let rows = sqlx::query("SELECT thread_id FROM threads ORDER BY updated_at DESC")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StoreError::Storage(format!("list threads: {e}")))?;

        rows.iter()
            .map(|row| {
                row.try_get::<String, _>("thread_id")
                    .map_err(|e| StoreError::Storage(format!("thread_id column: {e}")))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use serde_json::json;
    use waypoint_core::{Leg, PresentedOption};

    async fn test_store() -> SqliteStateStore {
        SqliteStateStore::new("sqlite::memory:").await.unwrap()
    }

    #[tokio::test]
    async fn missing_thread_loads_none() {
        let store = test_store().await;
        assert!(store.load("nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn upsert_keeps_one_row_per_thread() {
        let store = test_store().await;
        let mut state = ConversationState::new("t1", Utc::now());
        store.save(&state).await.unwrap();

        state.present(
            Leg::Flight,
            vec![PresentedOption {
                token: "F1".into(),
                title: "MU523".into(),
                price: 2380,
                detail: json!({"flight_no": "MU523"}),
            }],
        );
        state.lock_option(Leg::Flight, 1).unwrap();
        state.settle(Leg::Flight, || "FL-abc".into()).unwrap();
        state.event_cursor = 12;
        store.save(&state).await.unwrap();

        let loaded = store.load("t1").await.unwrap().unwrap();
        assert!(loaded.booking.flight.is_paid());
        assert_eq!(loaded.booking.flight.order_id(), Some("FL-abc"));
        assert_eq!(loaded.event_cursor, 12);
        assert_eq!(store.list_threads().await.unwrap(), vec!["t1"]);
    }

    #[tokio::test]
    async fn lists_most_recent_first() {
        let store = test_store().await;
        let now = Utc::now();
        store
            .save(&ConversationState::new("older", now - Duration::minutes(3)))
            .await
            .unwrap();
        store.save(&ConversationState::new("newer", now)).await.unwrap();
        assert_eq!(store.list_threads().await.unwrap(), vec!["newer", "older"]);
    }

    #[tokio::test]
    async fn corrupted_rows_are_reported() {
        let store = test_store().await;
        sqlx::query("INSERT INTO threads (thread_id, state, updated_at) VALUES ('bad', '{', '')")
            .execute(&store.pool)
            .await
            .unwrap();
        assert!(matches!(
            store.load("bad").await,
            Err(StoreError::Corrupted { .. })
        ));
    }
}
