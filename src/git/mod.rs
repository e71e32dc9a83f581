//! Source-control collaborator seam.
//!
//! The orchestration core never shells out to git directly; everything
//! goes through the [`SourceControl`] trait so tests can substitute a
//! double. The production implementation is [`GitBackend`], which uses
//! git2 for in-repo queries and the `git` executable for the worktree
//! subcommands (which libgit2 does not cover well).

mod backend;

pub use backend::GitBackend;

pub use crate::errors::GitError;

use async_trait::async_trait;
use std::path::Path;

/// Primitives the core needs from source control.
#[async_trait]
pub trait SourceControl: Send + Sync {
    /// Shorthand name of the currently checked-out branch.
    async fn current_branch(&self) -> Result<String, GitError>;

    /// Create a local branch pointing at `from` (a branch name or rev).
    async fn create_branch(&self, name: &str, from: &str) -> Result<(), GitError>;

    /// Check out a branch name or commit rev (detached for bare revs).
    async fn checkout_branch(&self, rev: &str) -> Result<(), GitError>;

    /// Delete a local branch. Deletion does not require the branch to be
    /// merged; `force` is accepted for contract compatibility.
    async fn delete_branch(&self, name: &str, force: bool) -> Result<(), GitError>;

    /// Hash of the latest commit on HEAD, or `None` on an unborn branch.
    async fn latest_commit_hash(&self) -> Result<Option<String>, GitError>;

    /// Create `branch` from `base` and check it out as a linked worktree
    /// at `path`.
    async fn add_worktree(&self, path: &Path, branch: &str, base: &str) -> Result<(), GitError>;

    /// Remove the linked worktree at `path`.
    async fn remove_worktree(&self, path: &Path, force: bool) -> Result<(), GitError>;

    /// Prune worktree metadata whose directories are gone.
    async fn prune_worktrees(&self) -> Result<(), GitError>;
}
