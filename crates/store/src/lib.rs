//! Conversation state persistence for Waypoint.
//!
//! Three backends implement [`StateStore`]:
//! - [`InMemoryStateStore`]: ephemeral, for tests and one-shot runs
//! - [`FileStateStore`]: one JSON document per thread under a directory
//! - `SqliteStateStore`: a single SQLite database (default `sqlite` feature)

pub mod file_backend;
pub mod in_memory;

#[cfg(feature = "sqlite")]
pub mod sqlite;

use std::sync::Arc;

use tracing::info;
use waypoint_config::StoreConfig;
use waypoint_core::error::StoreError;
use waypoint_core::StateStore;

pub use file_backend::FileStateStore;
pub use in_memory::InMemoryStateStore;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStateStore;

/// Open the backend named in the configuration.
pub async fn open(config: &StoreConfig) -> Result<Arc<dyn StateStore>, StoreError> {
    let store: Arc<dyn StateStore> = match config.backend.as_str() {
        "memory" => Arc::new(InMemoryStateStore::new()),
        "file" => Arc::new(FileStateStore::new(config.resolved_path())),
        #[cfg(feature = "sqlite")]
        "sqlite" => {
            let path = config.resolved_path();
            if let Some(parent) = path.parent() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| StoreError::Storage(format!("create {}: {e}", parent.display())))?;
            }
            Arc::new(SqliteStateStore::new(&format!("sqlite://{}", path.display())).await?)
        }
        other => {
            return Err(StoreError::Storage(format!("unknown store backend '{other}'")));
        }
    };
    info!(backend = store.name(), "State store opened");
    Ok(store)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn opens_configured_backend() {
        let memory = StoreConfig {
            backend: "memory".into(),
            path: None,
        };
        assert_eq!(open(&memory).await.unwrap().name(), "in_memory");

        let dir = tempfile::tempdir().unwrap();
        let file = StoreConfig {
            backend: "file".into(),
            path: Some(dir.path().join("threads").display().to_string()),
        };
        assert_eq!(open(&file).await.unwrap().name(), "file");
    }

    #[cfg(feature = "sqlite")]
    #[tokio::test]
    async fn opens_sqlite_in_nested_directory() {
        let dir = tempfile::tempdir().unwrap();
        let config = StoreConfig {
            backend: "sqlite".into(),
            path: Some(dir.path().join("data").join("waypoint.db").display().to_string()),
        };
        let store = open(&config).await.unwrap();
        assert_eq!(store.name(), "sqlite");
    }

    #[tokio::test]
    async fn unknown_backend_is_an_error() {
        let config = StoreConfig {
            backend: "postgres".into(),
            path: None,
        };
        assert!(matches!(open(&config).await, Err(StoreError::Storage(_))));
    }
}
