//! Typed error hierarchy for the taskhelm orchestration core.
//!
//! One enum per subsystem so callers can branch on failure kind without
//! string matching:
//! - `GraphError`: dependency resolution failures
//! - `GitError`: source-control collaborator failures
//! - `WorktreeError`: registry and isolation failures
//! - `CheckpointError`: snapshot/restore failures
//! - `ReviewError`: human review gate failures

use std::path::PathBuf;
use thiserror::Error;

/// Errors from the dependency graph subsystem.
#[derive(Debug, Error)]
pub enum GraphError {
    #[error("cycle detected in task dependencies, unresolved tasks: {task_ids:?}")]
    CycleDetected { task_ids: Vec<String> },
}

/// Errors surfaced by the source-control collaborator.
#[derive(Debug, Error)]
pub enum GitError {
    #[error("not a git repository at {0}")]
    NotARepository(PathBuf),

    #[error("branch not found: {0}")]
    BranchNotFound(String),

    #[error("git {command} failed: {stderr}")]
    CommandFailed { command: String, stderr: String },

    #[error("git operation failed: {0}")]
    Internal(#[from] git2::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Errors from the worktree manager.
#[derive(Debug, Error)]
pub enum WorktreeError {
    #[error("worktree already exists for task {0}")]
    AlreadyExists(String),

    #[error("no worktree registered for task {0}")]
    NotFound(String),

    #[error("worktree registry at {path} is corrupt: {message}")]
    CorruptRegistry { path: PathBuf, message: String },

    #[error("timed out acquiring registry lock at {0}")]
    LockTimeout(PathBuf),

    #[error(transparent)]
    Git(#[from] GitError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Errors from the checkpoint manager.
#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("project not found: {0}")]
    ProjectNotFound(String),

    #[error("checkpoint not found: {0}")]
    NotFound(String),

    #[error("invalid state data in checkpoint {0}")]
    InvalidStateData(String),

    #[error("checkpoint store error: {0}")]
    Store(#[source] anyhow::Error),
}

/// Errors from the human review service.
#[derive(Debug, Error)]
pub enum ReviewError {
    #[error("no pending review with id {0}")]
    NotFound(String),

    #[error("review store error: {0}")]
    Store(#[source] anyhow::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cycle_error_carries_unresolved_ids() {
        let err = GraphError::CycleDetected {
            task_ids: vec!["a".into(), "b".into()],
        };
        match &err {
            GraphError::CycleDetected { task_ids } => {
                assert_eq!(task_ids, &["a".to_string(), "b".to_string()]);
            }
        }
        assert!(err.to_string().contains("cycle"));
    }

    #[test]
    fn worktree_variants_are_distinct() {
        let exists = WorktreeError::AlreadyExists("t1".into());
        let missing = WorktreeError::NotFound("t1".into());
        assert!(matches!(exists, WorktreeError::AlreadyExists(_)));
        assert!(matches!(missing, WorktreeError::NotFound(_)));
        assert!(!matches!(exists, WorktreeError::NotFound(_)));
    }

    #[test]
    fn git_command_failed_carries_stderr() {
        let err = GitError::CommandFailed {
            command: "worktree add".into(),
            stderr: "fatal: invalid reference".into(),
        };
        assert!(err.to_string().contains("worktree add"));
        assert!(err.to_string().contains("invalid reference"));
    }

    #[test]
    fn checkpoint_not_found_carries_id() {
        let err = CheckpointError::NotFound("cp-42".into());
        match &err {
            CheckpointError::NotFound(id) => assert_eq!(id, "cp-42"),
            _ => panic!("expected NotFound"),
        }
    }

    #[test]
    fn all_error_types_implement_std_error() {
        fn assert_std_error<E: std::error::Error>(_: &E) {}
        assert_std_error(&GraphError::CycleDetected { task_ids: vec![] });
        assert_std_error(&WorktreeError::NotFound("x".into()));
        assert_std_error(&CheckpointError::ProjectNotFound("p".into()));
        assert_std_error(&ReviewError::NotFound("r".into()));
        assert_std_error(&GitError::BranchNotFound("main".into()));
    }
}
