//! Crate configuration loaded from a TOML file.
//!
//! Every field has a default matching the orchestration core's documented
//! constants, so an empty file (or no file at all) yields a working setup.
//!
//! # Configuration file format
//!
//! ```toml
//! [lock]
//! timeout_ms = 5000
//! poll_ms = 50
//! steal_on_timeout = true
//!
//! [worktrees]
//! namespace = "taskhelm"
//! idle_after_mins = 15
//! stale_after_mins = 30
//! cleanup_max_age_mins = 60
//!
//! [checkpoints]
//! retention = 50
//! interval_mins = 120
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Top-level configuration for the orchestration core.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HelmConfig {
    #[serde(default)]
    pub lock: LockSettings,
    #[serde(default)]
    pub worktrees: WorktreeSettings,
    #[serde(default)]
    pub checkpoints: CheckpointSettings,
}

impl HelmConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file at {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file at {}", path.display()))
    }

    /// Load from a TOML file if it exists, otherwise use defaults.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }
}

/// Advisory registry lock behaviour.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockSettings {
    /// How long to wait before giving up (or stealing), in milliseconds.
    #[serde(default = "default_lock_timeout_ms")]
    pub timeout_ms: u64,
    /// Poll interval while the lock is held elsewhere, in milliseconds.
    #[serde(default = "default_lock_poll_ms")]
    pub poll_ms: u64,
    /// Steal the lock on timeout instead of failing the caller.
    #[serde(default = "default_true")]
    pub steal_on_timeout: bool,
}

impl Default for LockSettings {
    fn default() -> Self {
        Self {
            timeout_ms: default_lock_timeout_ms(),
            poll_ms: default_lock_poll_ms(),
            steal_on_timeout: true,
        }
    }
}

impl LockSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_ms)
    }
}

/// Worktree lifecycle and cleanup thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorktreeSettings {
    /// Branch namespace prefix (`<namespace>/task/<task-id>/<timestamp>`).
    #[serde(default = "default_namespace")]
    pub namespace: String,
    /// Minutes without activity before a worktree is considered idle.
    #[serde(default = "default_idle_after_mins")]
    pub idle_after_mins: i64,
    /// Minutes without activity before a worktree is considered stale.
    #[serde(default = "default_stale_after_mins")]
    pub stale_after_mins: i64,
    /// Default maximum age for `cleanup` eligibility, in minutes.
    #[serde(default = "default_cleanup_max_age_mins")]
    pub cleanup_max_age_mins: i64,
}

impl Default for WorktreeSettings {
    fn default() -> Self {
        Self {
            namespace: default_namespace(),
            idle_after_mins: default_idle_after_mins(),
            stale_after_mins: default_stale_after_mins(),
            cleanup_max_age_mins: default_cleanup_max_age_mins(),
        }
    }
}

/// Checkpoint retention and scheduling.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointSettings {
    /// Newest checkpoints kept per project; older ones are pruned.
    #[serde(default = "default_retention")]
    pub retention: usize,
    /// Interval between scheduled checkpoints, in minutes.
    #[serde(default = "default_interval_mins")]
    pub interval_mins: u64,
}

impl Default for CheckpointSettings {
    fn default() -> Self {
        Self {
            retention: default_retention(),
            interval_mins: default_interval_mins(),
        }
    }
}

impl CheckpointSettings {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_mins * 60)
    }
}

fn default_lock_timeout_ms() -> u64 {
    5_000
}

fn default_lock_poll_ms() -> u64 {
    50
}

fn default_true() -> bool {
    true
}

fn default_namespace() -> String {
    "taskhelm".to_string()
}

fn default_idle_after_mins() -> i64 {
    15
}

fn default_stale_after_mins() -> i64 {
    30
}

fn default_cleanup_max_age_mins() -> i64 {
    60
}

fn default_retention() -> usize {
    50
}

fn default_interval_mins() -> u64 {
    120
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_constants() {
        let config = HelmConfig::default();
        assert_eq!(config.lock.timeout_ms, 5_000);
        assert_eq!(config.lock.poll_ms, 50);
        assert!(config.lock.steal_on_timeout);
        assert_eq!(config.worktrees.idle_after_mins, 15);
        assert_eq!(config.worktrees.stale_after_mins, 30);
        assert_eq!(config.worktrees.cleanup_max_age_mins, 60);
        assert_eq!(config.checkpoints.retention, 50);
        assert_eq!(config.checkpoints.interval_mins, 120);
    }

    #[test]
    fn empty_toml_parses_to_defaults() {
        let config: HelmConfig = toml::from_str("").unwrap();
        assert_eq!(config.lock.timeout_ms, 5_000);
        assert_eq!(config.worktrees.namespace, "taskhelm");
    }

    #[test]
    fn partial_section_keeps_other_defaults() {
        let config: HelmConfig = toml::from_str(
            r#"
            [lock]
            timeout_ms = 250
            steal_on_timeout = false
            "#,
        )
        .unwrap();
        assert_eq!(config.lock.timeout_ms, 250);
        assert!(!config.lock.steal_on_timeout);
        assert_eq!(config.lock.poll_ms, 50);
        assert_eq!(config.checkpoints.retention, 50);
    }

    #[test]
    fn load_or_default_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = HelmConfig::load_or_default(&dir.path().join("helm.toml")).unwrap();
        assert_eq!(config.checkpoints.interval_mins, 120);
    }

    #[test]
    fn load_rejects_invalid_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("helm.toml");
        std::fs::write(&path, "[lock\ntimeout_ms = oops").unwrap();
        assert!(HelmConfig::load(&path).is_err());
    }
}
