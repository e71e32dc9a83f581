use crate::config::CheckpointSettings;
use crate::errors::CheckpointError;
use crate::events::{self, EventBus};
use crate::git::SourceControl;
use crate::store::{CheckpointStore, StateStore};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::fmt;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

/// An immutable snapshot of orchestration state.
///
/// `source_control_commit` is `None` when the commit lookup failed or the
/// repository had no commits; such checkpoints are still valid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub id: String,
    pub project_id: String,
    pub reason: String,
    /// Serialized orchestration state, opaque to this crate.
    pub state_snapshot: String,
    pub source_control_commit: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Fixed vocabulary for automatic checkpoint reasons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CheckpointTrigger {
    PhaseComplete,
    TaskFailed,
    AutomationExhausted,
    HumanRequest,
    Scheduled,
    FeatureComplete,
}

impl fmt::Display for CheckpointTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::PhaseComplete => "phase-complete",
            Self::TaskFailed => "task-failed",
            Self::AutomationExhausted => "automation-exhausted",
            Self::HumanRequest => "human-request",
            Self::Scheduled => "scheduled",
            Self::FeatureComplete => "feature-complete",
        };
        f.write_str(s)
    }
}

/// Creates, restores, and prunes checkpoints.
///
/// The state snapshot is the primary guarantee: commit-hash lookup during
/// creation and git checkout during restore are advisory sub-operations
/// whose failures are logged and swallowed.
pub struct CheckpointManager {
    store: Arc<dyn CheckpointStore>,
    state: Arc<dyn StateStore>,
    git: Arc<dyn SourceControl>,
    bus: Option<EventBus>,
    retention: usize,
}

impl CheckpointManager {
    pub fn new(
        store: Arc<dyn CheckpointStore>,
        state: Arc<dyn StateStore>,
        git: Arc<dyn SourceControl>,
        settings: &CheckpointSettings,
    ) -> Self {
        Self {
            store,
            state,
            git,
            bus: None,
            retention: settings.retention,
        }
    }

    /// Attach an event bus; `checkpoint-created` / `checkpoint-restored`
    /// events are emitted only when a bus is present.
    pub fn with_event_bus(mut self, bus: EventBus) -> Self {
        self.bus = Some(bus);
        self
    }

    /// Snapshot the project's current orchestration state.
    ///
    /// Fails with [`CheckpointError::ProjectNotFound`] when the state
    /// store has nothing for `project_id`.
    pub async fn create_checkpoint(
        &self,
        project_id: &str,
        reason: &str,
    ) -> Result<Checkpoint, CheckpointError> {
        let state = self
            .state
            .load_state(project_id)
            .await
            .map_err(CheckpointError::Store)?
            .ok_or_else(|| CheckpointError::ProjectNotFound(project_id.to_string()))?;

        // Advisory: a checkpoint without a commit reference is valid.
        let source_control_commit = match self.git.latest_commit_hash().await {
            Ok(commit) => commit,
            Err(e) => {
                warn!(error = %e, project_id, "commit lookup failed, checkpoint proceeds without one");
                None
            }
        };

        let state_snapshot =
            serde_json::to_string(&state).map_err(|e| CheckpointError::Store(e.into()))?;

        let checkpoint = Checkpoint {
            id: Uuid::new_v4().to_string(),
            project_id: project_id.to_string(),
            reason: reason.to_string(),
            state_snapshot,
            source_control_commit,
            created_at: Utc::now(),
        };

        self.store
            .insert_checkpoint(&checkpoint)
            .await
            .map_err(CheckpointError::Store)?;

        self.prune(project_id).await;

        info!(checkpoint_id = %checkpoint.id, project_id, reason, "checkpoint created");
        if let Some(bus) = &self.bus {
            bus.emit(
                events::CHECKPOINT_CREATED,
                json!({
                    "checkpoint_id": checkpoint.id,
                    "project_id": project_id,
                    "reason": reason,
                }),
            );
        }

        Ok(checkpoint)
    }

    /// Restore orchestration state from a checkpoint.
    ///
    /// State restoration is unconditional; when `restore_git` is set and
    /// the checkpoint carries a commit reference, the checkout is
    /// attempted best-effort.
    pub async fn restore_checkpoint(
        &self,
        checkpoint_id: &str,
        restore_git: bool,
    ) -> Result<(), CheckpointError> {
        let checkpoint = self
            .store
            .get_checkpoint(checkpoint_id)
            .await
            .map_err(CheckpointError::Store)?
            .ok_or_else(|| CheckpointError::NotFound(checkpoint_id.to_string()))?;

        let state: Value = serde_json::from_str(&checkpoint.state_snapshot)
            .map_err(|_| CheckpointError::InvalidStateData(checkpoint_id.to_string()))?;

        self.state
            .save_state(&checkpoint.project_id, &state)
            .await
            .map_err(CheckpointError::Store)?;

        if restore_git {
            if let Some(commit) = &checkpoint.source_control_commit {
                if let Err(e) = self.git.checkout_branch(commit).await {
                    warn!(error = %e, commit, "git restore failed, state restore stands");
                }
            }
        }

        info!(checkpoint_id, project_id = %checkpoint.project_id, "checkpoint restored");
        if let Some(bus) = &self.bus {
            bus.emit(
                events::CHECKPOINT_RESTORED,
                json!({
                    "checkpoint_id": checkpoint_id,
                    "project_id": checkpoint.project_id,
                }),
            );
        }

        Ok(())
    }

    /// All checkpoints for a project, newest first.
    pub async fn list_checkpoints(
        &self,
        project_id: &str,
    ) -> Result<Vec<Checkpoint>, CheckpointError> {
        self.store
            .list_checkpoints(project_id)
            .await
            .map_err(CheckpointError::Store)
    }

    pub async fn delete_checkpoint(&self, checkpoint_id: &str) -> Result<(), CheckpointError> {
        self.store
            .delete_checkpoint(checkpoint_id)
            .await
            .map_err(CheckpointError::Store)
    }

    /// Create a checkpoint with a reason synthesized from a fixed trigger.
    pub async fn create_auto_checkpoint(
        &self,
        project_id: &str,
        trigger: CheckpointTrigger,
    ) -> Result<Checkpoint, CheckpointError> {
        self.create_checkpoint(project_id, &format!("Automatic checkpoint: {trigger}"))
            .await
    }

    /// Delete checkpoints beyond the retention limit, oldest first.
    /// Pruning failures never fail the checkpoint that triggered them.
    async fn prune(&self, project_id: &str) {
        let listed = match self.store.list_checkpoints(project_id).await {
            Ok(listed) => listed,
            Err(e) => {
                warn!(error = %e, project_id, "retention listing failed, skipping prune");
                return;
            }
        };

        for old in listed.iter().skip(self.retention) {
            if let Err(e) = self.store.delete_checkpoint(&old.id).await {
                warn!(error = %e, checkpoint_id = %old.id, "retention prune failed for checkpoint");
            }
        }
    }
}
