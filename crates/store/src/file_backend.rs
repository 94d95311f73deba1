//! File backend: one pretty-printed JSON document per thread.
//!
//! Layout: `<dir>/<encoded thread id>.json`. Writes go to a temporary file
//! first and are renamed into place, so a crash never leaves a half-written
//! state behind.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{debug, warn};
use waypoint_core::error::StoreError;
use waypoint_core::{ConversationState, StateStore};

pub struct FileStateStore {
    dir: PathBuf,
}

impl FileStateStore {
    /// The directory is created on first save.
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, thread_id: &str) -> PathBuf {
        self.dir.join(format!("{}.json", encode(thread_id)))
    }
}

/// Keep `[A-Za-z0-9_-]` and percent-encode every other byte, so any thread
/// id maps to exactly one safe file name.
fn encode(thread_id: &str) -> String {
    let mut out = String::with_capacity(thread_id.len());
    for b in thread_id.bytes() {
        if b.is_ascii_alphanumeric() || b == b'-' || b == b'_' {
            out.push(b as char);
        } else {
            out.push_str(&format!("%{b:02X}"));
        }
    }
    out
}

fn parse(thread_id: &str, raw: &str) -> Result<ConversationState, StoreError> {
    serde_json::from_str(raw).map_err(|e| StoreError::Corrupted {
        thread_id: thread_id.to_string(),
        reason: e.to_string(),
    })
}

#[async_trait]
impl StateStore for FileStateStore {
    fn name(&self) -> &str {
        "file"
    }

    async fn load(&self, thread_id: &str) -> Result<Option<ConversationState>, StoreError> {
        let path = self.path_for(thread_id);
        let raw = match tokio::fs::read_to_string(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(StoreError::Storage(format!("read {}: {e}", path.display())));
            }
        };
        parse(thread_id, &raw).map(Some)
    }

    async fn save(&self, state: &ConversationState) -> Result<(), StoreError> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| StoreError::Storage(format!("create {}: {e}", self.dir.display())))?;

        let json = serde_json::to_string_pretty(state)
            .map_err(|e| StoreError::Storage(format!("serialize {}: {e}", state.thread_id)))?;
        let path = self.path_for(&state.thread_id);
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json)
            .await
            .map_err(|e| StoreError::Storage(format!("write {}: {e}", tmp.display())))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| StoreError::Storage(format!("rename {}: {e}", path.display())))?;

        debug!(thread = %state.thread_id, path = %path.display(), "State saved");
        Ok(())
    }

    async fn list_threads(&self) -> Result<Vec<String>, StoreError> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(StoreError::Storage(format!("list {}: {e}", self.dir.display())));
            }
        };

        let mut threads: Vec<(DateTime<Utc>, String)> = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| StoreError::Storage(format!("list {}: {e}", self.dir.display())))?
        {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Ok(raw) = tokio::fs::read_to_string(&path).await else {
                continue;
            };
            match parse(&path.display().to_string(), &raw) {
                Ok(state) => threads.push((state.updated_at, state.thread_id)),
                Err(e) => warn!(error = %e, "Skipping unreadable thread file"),
            }
        }
        threads.sort_by(|a, b| b.0.cmp(&a.0));
        Ok(threads.into_iter().map(|(_, id)| id).collect())
    }
}
