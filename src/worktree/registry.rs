use crate::errors::WorktreeError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Activity-derived lifecycle of a worktree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    Active,
    Idle,
    Stale,
}

/// Registry entry for one task worktree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorktreeInfo {
    pub task_id: String,
    pub path: PathBuf,
    pub branch_name: String,
    pub base_branch: String,
    pub created_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
    pub lifecycle_state: LifecycleState,
}

impl WorktreeInfo {
    /// Minutes since the last recorded activity.
    pub fn idle_minutes(&self, now: DateTime<Utc>) -> i64 {
        (now - self.last_activity_at).num_minutes()
    }
}

/// On-disk registry of live worktrees, one file per repository.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorktreeRegistry {
    pub schema_version: u32,
    pub repository_root: PathBuf,
    pub worktrees: HashMap<String, WorktreeInfo>,
    pub last_updated_at: DateTime<Utc>,
}

impl WorktreeRegistry {
    pub const SCHEMA_VERSION: u32 = 1;

    pub fn new(repository_root: PathBuf) -> Self {
        Self {
            schema_version: Self::SCHEMA_VERSION,
            repository_root,
            worktrees: HashMap::new(),
            last_updated_at: Utc::now(),
        }
    }

    /// Load the registry, or start a fresh one when the file is absent.
    /// A file that exists but does not parse is a hard error; silently
    /// replacing it would orphan every registered worktree.
    pub fn load(path: &Path, repository_root: &Path) -> Result<Self, WorktreeError> {
        if !path.exists() {
            return Ok(Self::new(repository_root.to_path_buf()));
        }
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content).map_err(|e| WorktreeError::CorruptRegistry {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    /// Persist atomically: write a sibling temp file, then rename over
    /// the registry so readers never observe a half-written file.
    pub fn save(&mut self, path: &Path) -> Result<(), WorktreeError> {
        self.last_updated_at = Utc::now();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self).map_err(|e| {
            WorktreeError::CorruptRegistry {
                path: path.to_path_buf(),
                message: e.to_string(),
            }
        })?;
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, content)?;
        std::fs::rename(&tmp, path)?;
        Ok(())
    }
}
