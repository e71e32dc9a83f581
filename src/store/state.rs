use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::path::PathBuf;

/// Collaborator owning whole-project orchestration state.
///
/// The state document is opaque to this crate; the checkpoint manager
/// snapshots and restores it without interpreting it.
#[async_trait]
pub trait StateStore: Send + Sync {
    async fn load_state(&self, project_id: &str) -> Result<Option<Value>>;
    async fn save_state(&self, project_id: &str, state: &Value) -> Result<()>;
}

/// File-per-project state store: `<dir>/<project_id>.json`.
pub struct JsonStateStore {
    dir: PathBuf,
}

impl JsonStateStore {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    fn state_path(&self, project_id: &str) -> PathBuf {
        self.dir.join(format!("{project_id}.json"))
    }
}

#[async_trait]
impl StateStore for JsonStateStore {
    async fn load_state(&self, project_id: &str) -> Result<Option<Value>> {
        let path = self.state_path(project_id);
        if !path.exists() {
            return Ok(None);
        }
        let content = tokio::fs::read_to_string(&path)
            .await
            .with_context(|| format!("Failed to read state file at {}", path.display()))?;
        let state = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse state file at {}", path.display()))?;
        Ok(Some(state))
    }

    async fn save_state(&self, project_id: &str, state: &Value) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .context("Failed to create state directory")?;
        let path = self.state_path(project_id);
        let content = serde_json::to_string_pretty(state)?;
        tokio::fs::write(&path, content)
            .await
            .with_context(|| format!("Failed to write state file at {}", path.display()))?;
        Ok(())
    }
}
