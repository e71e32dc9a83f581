use crate::errors::GitError;
use crate::git::SourceControl;
use async_trait::async_trait;
use git2::{BranchType, ErrorCode, Repository, build::CheckoutBuilder};
use std::path::{Path, PathBuf};
use tokio::process::Command;

/// Production [`SourceControl`] implementation for a repository on disk.
///
/// Branch and commit queries go through git2; worktree add/remove/prune
/// shell out to the `git` executable.
pub struct GitBackend {
    repo_root: PathBuf,
}

impl GitBackend {
    pub fn new(repo_root: &Path) -> Self {
        Self {
            repo_root: repo_root.to_path_buf(),
        }
    }

    fn open(&self) -> Result<Repository, GitError> {
        Repository::open(&self.repo_root).map_err(|e| {
            if e.code() == ErrorCode::NotFound {
                GitError::NotARepository(self.repo_root.clone())
            } else {
                GitError::Internal(e)
            }
        })
    }

    async fn run_git(&self, args: &[&str]) -> Result<(), GitError> {
        let output = Command::new("git")
            .args(args)
            .current_dir(&self.repo_root)
            .output()
            .await?;

        if !output.status.success() {
            return Err(GitError::CommandFailed {
                command: args.join(" "),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl SourceControl for GitBackend {
    async fn current_branch(&self) -> Result<String, GitError> {
        let repo = self.open()?;
        let head = repo.head().map_err(|e| {
            if e.code() == ErrorCode::UnbornBranch || e.code() == ErrorCode::NotFound {
                GitError::BranchNotFound("HEAD".to_string())
            } else {
                GitError::Internal(e)
            }
        })?;
        head.shorthand()
            .map(str::to_string)
            .ok_or_else(|| GitError::BranchNotFound("HEAD".to_string()))
    }

    async fn create_branch(&self, name: &str, from: &str) -> Result<(), GitError> {
        let repo = self.open()?;
        let commit = repo
            .revparse_single(from)
            .map_err(|_| GitError::BranchNotFound(from.to_string()))?
            .peel_to_commit()
            .map_err(GitError::Internal)?;
        repo.branch(name, &commit, false)?;
        Ok(())
    }

    async fn checkout_branch(&self, rev: &str) -> Result<(), GitError> {
        let repo = self.open()?;
        let object = repo
            .revparse_single(rev)
            .map_err(|_| GitError::BranchNotFound(rev.to_string()))?;

        let mut checkout = CheckoutBuilder::new();
        checkout.force();
        repo.checkout_tree(&object, Some(&mut checkout))?;

        if repo.find_branch(rev, BranchType::Local).is_ok() {
            repo.set_head(&format!("refs/heads/{rev}"))?;
        } else {
            repo.set_head_detached(object.id())?;
        }
        Ok(())
    }

    async fn delete_branch(&self, name: &str, _force: bool) -> Result<(), GitError> {
        let repo = self.open()?;
        let mut branch = repo
            .find_branch(name, BranchType::Local)
            .map_err(|_| GitError::BranchNotFound(name.to_string()))?;
        branch.delete()?;
        Ok(())
    }

    async fn latest_commit_hash(&self) -> Result<Option<String>, GitError> {
        let repo = self.open()?;
        // Unborn branches have no commit yet.
        Ok(repo
            .head()
            .ok()
            .and_then(|head| head.peel_to_commit().ok())
            .map(|commit| commit.id().to_string()))
    }

    async fn add_worktree(&self, path: &Path, branch: &str, base: &str) -> Result<(), GitError> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let path_str = path.to_str().ok_or_else(|| {
            GitError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "worktree path contains invalid UTF-8",
            ))
        })?;

        self.run_git(&["worktree", "add", "-b", branch, path_str, base])
            .await
    }

    async fn remove_worktree(&self, path: &Path, force: bool) -> Result<(), GitError> {
        let path_str = path.to_str().ok_or_else(|| {
            GitError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "worktree path contains invalid UTF-8",
            ))
        })?;

        if force {
            self.run_git(&["worktree", "remove", "--force", path_str])
                .await
        } else {
            self.run_git(&["worktree", "remove", path_str]).await
        }
    }

    async fn prune_worktrees(&self) -> Result<(), GitError> {
        self.run_git(&["worktree", "prune"]).await
    }
}
