//! Apply record persistence
//!
//! Records of applied resources live in `.loam/state.json`: the
//! provider-assigned id, the declared-property snapshot the planner
//! diffs against, and the output fields deferred references resolve to.
//! Saving keeps a backup of the previous file; concurrent runs are
//! excluded through a JSON lock file with stale-lock takeover.

use crate::error::{EngineError, Result};
use crate::provider::Outputs;
use chrono::{DateTime, Utc};
use loam_core::Properties;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::fs;

const STATE_VERSION: u32 = 1;
const STATE_DIR: &str = ".loam";
const STATE_FILE: &str = "state.json";
const STATE_BACKUP: &str = "state.json.backup";
const LOCK_FILE: &str = "lock.json";

/// Terminal and in-flight states of a resource during a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceStatus {
    /// Not yet scheduled
    Pending,
    /// Provider call in flight
    Applying,
    /// Applied successfully (or confirmed unchanged)
    Applied,
    /// Provider call failed
    Failed,
    /// Not attempted because a dependency failed or the run was cancelled
    Skipped,
}

impl std::fmt::Display for ResourceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Applying => "applying",
            Self::Applied => "applied",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        };
        f.write_str(s)
    }
}

/// Persisted record of one applied resource
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Record {
    /// Provider-assigned resource id
    pub provider_id: String,

    /// Resource kind
    pub kind: String,

    pub status: ResourceStatus,

    /// Declared properties at apply time (references in raw form);
    /// the planner diffs the next declaration against this snapshot
    pub properties: Properties,

    /// Output fields recorded from the provider
    pub outputs: Outputs,

    /// Dependency ids at apply time, kept so destroy can order deletes
    /// without the original declarations
    #[serde(default)]
    pub depends_on: Vec<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Record {
    pub fn new(provider_id: impl Into<String>, kind: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            provider_id: provider_id.into(),
            kind: kind.into(),
            status: ResourceStatus::Applied,
            properties: Properties::new(),
            outputs: Outputs::new(),
            depends_on: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_properties(mut self, properties: Properties) -> Self {
        self.properties = properties;
        self
    }

    pub fn with_outputs(mut self, outputs: Outputs) -> Self {
        self.outputs = outputs;
        self
    }

    pub fn with_dependencies(mut self, depends_on: Vec<String>) -> Self {
        self.depends_on = depends_on;
        self
    }

    pub fn output(&self, field: &str) -> Option<&serde_json::Value> {
        self.outputs.get(field)
    }
}

/// All records of a stack
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StackState {
    /// State file version
    pub version: u32,

    /// Last modified timestamp
    pub updated_at: DateTime<Utc>,

    /// Records keyed by resource id
    pub records: BTreeMap<String, Record>,
}

impl Default for StackState {
    fn default() -> Self {
        Self {
            version: STATE_VERSION,
            updated_at: Utc::now(),
            records: BTreeMap::new(),
        }
    }
}

impl StackState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &str) -> Option<&Record> {
        self.records.get(id)
    }

    pub fn set(&mut self, id: impl Into<String>, record: Record) {
        self.records.insert(id.into(), record);
        self.updated_at = Utc::now();
    }

    pub fn remove(&mut self, id: &str) -> Option<Record> {
        let removed = self.records.remove(id);
        if removed.is_some() {
            self.updated_at = Utc::now();
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Recorded output of a resource, for deferred reference resolution
    pub fn output(&self, id: &str, field: &str) -> Option<serde_json::Value> {
        self.records.get(id).and_then(|r| r.output(field).cloned())
    }
}

/// Reads and writes the state directory of a stack
pub struct StateManager {
    project_root: PathBuf,
}

impl StateManager {
    pub fn new(project_root: impl AsRef<Path>) -> Self {
        Self {
            project_root: project_root.as_ref().to_path_buf(),
        }
    }

    fn state_dir(&self) -> PathBuf {
        self.project_root.join(STATE_DIR)
    }

    fn state_path(&self) -> PathBuf {
        self.state_dir().join(STATE_FILE)
    }

    fn backup_path(&self) -> PathBuf {
        self.state_dir().join(STATE_BACKUP)
    }

    fn lock_path(&self) -> PathBuf {
        self.state_dir().join(LOCK_FILE)
    }

    async fn ensure_state_dir(&self) -> Result<()> {
        let dir = self.state_dir();
        if !dir.exists() {
            fs::create_dir_all(&dir).await?;
            tracing::debug!("Created state directory: {}", dir.display());
        }
        Ok(())
    }

    /// Load prior records, or an empty state when none exist
    pub async fn load(&self) -> Result<StackState> {
        let path = self.state_path();
        if !path.exists() {
            tracing::debug!("State file not found, returning empty state");
            return Ok(StackState::new());
        }

        let content = fs::read_to_string(&path).await?;
        let state: StackState = serde_json::from_str(&content)?;

        if state.version > STATE_VERSION {
            return Err(EngineError::State(format!(
                "state file version {} is newer than supported version {}",
                state.version, STATE_VERSION
            )));
        }

        tracing::debug!("Loaded state with {} records", state.records.len());
        Ok(state)
    }

    /// Save records, keeping the previous file as a backup
    pub async fn save(&self, state: &StackState) -> Result<()> {
        self.ensure_state_dir().await?;

        let path = self.state_path();
        let backup = self.backup_path();

        if path.exists() {
            if backup.exists() {
                fs::remove_file(&backup).await?;
            }
            fs::rename(&path, &backup).await?;
        }

        let content = serde_json::to_string_pretty(state)?;
        fs::write(&path, content).await?;

        tracing::debug!("Saved state with {} records", state.records.len());
        Ok(())
    }

    /// Acquire the run lock.
    ///
    /// A lock older than an hour is treated as stale and taken over.
    pub async fn acquire_lock(&self) -> Result<StateLock> {
        self.ensure_state_dir().await?;

        let lock_path = self.lock_path();

        if lock_path.exists() {
            let content = fs::read_to_string(&lock_path).await?;
            let lock_info: LockInfo = serde_json::from_str(&content)?;

            let age = Utc::now().signed_duration_since(lock_info.acquired_at);
            if age.num_hours() < 1 {
                return Err(EngineError::Lock(format!(
                    "state is locked by {} since {}",
                    lock_info.holder, lock_info.acquired_at
                )));
            }

            tracing::warn!("Removing stale lock from {}", lock_info.holder);
        }

        let lock_info = LockInfo {
            holder: std::env::var("HOSTNAME")
                .or_else(|_| std::env::var("HOST"))
                .unwrap_or_else(|_| "unknown".to_string()),
            acquired_at: Utc::now(),
        };

        let content = serde_json::to_string_pretty(&lock_info)?;
        fs::write(&lock_path, content).await?;

        tracing::debug!("Acquired state lock");
        Ok(StateLock {
            lock_path,
            released: false,
        })
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct LockInfo {
    holder: String,
    acquired_at: DateTime<Utc>,
}

/// RAII guard for the run lock
pub struct StateLock {
    lock_path: PathBuf,
    released: bool,
}

impl StateLock {
    pub async fn release(mut self) -> Result<()> {
        if !self.released {
            if self.lock_path.exists() {
                fs::remove_file(&self.lock_path).await?;
                tracing::debug!("Released state lock");
            }
            self.released = true;
        }
        Ok(())
    }
}

impl Drop for StateLock {
    fn drop(&mut self) {
        if !self.released && self.lock_path.exists() {
            // Synchronous cleanup in drop - not ideal but necessary
            let _ = std::fs::remove_file(&self.lock_path);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_state_save_load() {
        let temp_dir = tempdir().unwrap();
        let manager = StateManager::new(temp_dir.path());

        let mut state = StackState::new();
        state.set(
            "hub-rg",
            Record::new("mem-000001", "resource-group")
                .with_outputs(Outputs::from_iter([
                    ("name".to_string(), json!("hub-rg")),
                ]))
                .with_dependencies(vec![]),
        );

        manager.save(&state).await.unwrap();

        let loaded = manager.load().await.unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded.output("hub-rg", "name"), Some(json!("hub-rg")));
    }

    #[tokio::test]
    async fn test_empty_state() {
        let temp_dir = tempdir().unwrap();
        let manager = StateManager::new(temp_dir.path());

        let state = manager.load().await.unwrap();
        assert!(state.is_empty());
    }

    #[tokio::test]
    async fn test_save_keeps_backup() {
        let temp_dir = tempdir().unwrap();
        let manager = StateManager::new(temp_dir.path());

        manager.save(&StackState::new()).await.unwrap();
        let mut state = StackState::new();
        state.set("rg", Record::new("mem-1", "resource-group"));
        manager.save(&state).await.unwrap();

        assert!(temp_dir.path().join(".loam/state.json.backup").exists());
        let loaded = manager.load().await.unwrap();
        assert_eq!(loaded.len(), 1);
    }

    #[tokio::test]
    async fn test_lock_excludes_second_run() {
        let temp_dir = tempdir().unwrap();
        let manager = StateManager::new(temp_dir.path());

        let lock = manager.acquire_lock().await.unwrap();
        let second = manager.acquire_lock().await;
        assert!(matches!(second, Err(EngineError::Lock(_))));

        lock.release().await.unwrap();
        let third = manager.acquire_lock().await;
        assert!(third.is_ok());
    }
}
