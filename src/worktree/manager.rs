use crate::config::{LockSettings, WorktreeSettings};
use crate::errors::WorktreeError;
use crate::git::SourceControl;
use crate::worktree::lock::RegistryLock;
use crate::worktree::registry::{LifecycleState, WorktreeInfo, WorktreeRegistry};
use chrono::{Duration, Utc};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

/// Knobs for a cleanup sweep.
#[derive(Debug, Clone, Default)]
pub struct CleanupOptions {
    /// Minimum inactivity before a worktree is eligible. Defaults to the
    /// configured `cleanup_max_age_mins`.
    pub max_age: Option<std::time::Duration>,
    /// Make every worktree eligible regardless of age.
    pub force: bool,
    /// Report what would be removed without touching anything.
    pub dry_run: bool,
}

/// Outcome of a cleanup sweep. In dry-run mode `removed` lists the
/// worktrees that would have been removed.
#[derive(Debug, Clone, Default)]
pub struct CleanupReport {
    pub removed: Vec<String>,
    pub failed: Vec<(String, String)>,
    pub skipped: Vec<String>,
}

/// Creates, tracks, and tears down per-task worktrees.
///
/// Every registry mutation happens under the advisory [`RegistryLock`]
/// and the registry is reloaded from disk each time, so multiple
/// orchestrator processes sharing a repository stay consistent.
pub struct WorktreeManager {
    repo_root: PathBuf,
    registry_path: PathBuf,
    git: Arc<dyn SourceControl>,
    lock_settings: LockSettings,
    settings: WorktreeSettings,
}

impl WorktreeManager {
    pub fn new(
        repo_root: &Path,
        git: Arc<dyn SourceControl>,
        lock_settings: LockSettings,
        settings: WorktreeSettings,
    ) -> Self {
        Self {
            repo_root: repo_root.to_path_buf(),
            registry_path: repo_root.join(".taskhelm").join("worktrees.json"),
            git,
            lock_settings,
            settings,
        }
    }

    /// Create an isolated worktree and branch for a task.
    ///
    /// The branch is cut from `base` (or the current branch when `base`
    /// is `None`) and named `<namespace>/task/<task-id>/<timestamp>`.
    pub async fn create_worktree(
        &self,
        task_id: &str,
        base: Option<&str>,
    ) -> Result<WorktreeInfo, WorktreeError> {
        let _lock = RegistryLock::acquire(&self.registry_path, &self.lock_settings).await?;
        let mut registry = WorktreeRegistry::load(&self.registry_path, &self.repo_root)?;

        if registry.worktrees.contains_key(task_id) {
            return Err(WorktreeError::AlreadyExists(task_id.to_string()));
        }

        let base_branch = match base {
            Some(base) => base.to_string(),
            None => self.git.current_branch().await?,
        };
        let branch_name = format!(
            "{}/task/{}/{}",
            self.settings.namespace,
            task_id,
            Utc::now().timestamp()
        );
        let path = self
            .repo_root
            .join(".taskhelm")
            .join("worktrees")
            .join(task_id);

        self.git
            .add_worktree(&path, &branch_name, &base_branch)
            .await?;

        let now = Utc::now();
        let worktree = WorktreeInfo {
            task_id: task_id.to_string(),
            path,
            branch_name,
            base_branch,
            created_at: now,
            last_activity_at: now,
            lifecycle_state: LifecycleState::Active,
        };
        registry
            .worktrees
            .insert(task_id.to_string(), worktree.clone());
        registry.save(&self.registry_path)?;

        info!(task_id, branch = %worktree.branch_name, path = %worktree.path.display(), "worktree created");
        Ok(worktree)
    }

    /// Look up a worktree by task id.
    pub async fn get_worktree(&self, task_id: &str) -> Result<Option<WorktreeInfo>, WorktreeError> {
        let _lock = RegistryLock::acquire(&self.registry_path, &self.lock_settings).await?;
        let registry = WorktreeRegistry::load(&self.registry_path, &self.repo_root)?;
        Ok(registry.worktrees.get(task_id).cloned())
    }

    /// All registered worktrees, ordered by creation time.
    pub async fn list_worktrees(&self) -> Result<Vec<WorktreeInfo>, WorktreeError> {
        let _lock = RegistryLock::acquire(&self.registry_path, &self.lock_settings).await?;
        let registry = WorktreeRegistry::load(&self.registry_path, &self.repo_root)?;
        let mut worktrees: Vec<_> = registry.worktrees.values().cloned().collect();
        worktrees.sort_by_key(|w| w.created_at);
        Ok(worktrees)
    }

    /// Remove a task's worktree, optionally deleting its branch.
    ///
    /// Directory and branch removal are forced and tolerant; the registry
    /// entry is dropped last so a crash mid-removal leaves the entry in
    /// place for a later cleanup sweep.
    pub async fn remove_worktree(
        &self,
        task_id: &str,
        delete_branch: bool,
    ) -> Result<(), WorktreeError> {
        let _lock = RegistryLock::acquire(&self.registry_path, &self.lock_settings).await?;
        let mut registry = WorktreeRegistry::load(&self.registry_path, &self.repo_root)?;

        let worktree = registry
            .worktrees
            .get(task_id)
            .cloned()
            .ok_or_else(|| WorktreeError::NotFound(task_id.to_string()))?;

        if let Err(e) = self.git.remove_worktree(&worktree.path, true).await {
            warn!(task_id, error = %e, "git worktree remove failed, falling back to direct deletion");
            if worktree.path.exists() {
                std::fs::remove_dir_all(&worktree.path)?;
            }
            if let Err(e) = self.git.prune_worktrees().await {
                warn!(task_id, error = %e, "worktree prune failed");
            }
        }

        if delete_branch {
            if let Err(e) = self.git.delete_branch(&worktree.branch_name, true).await {
                warn!(task_id, branch = %worktree.branch_name, error = %e, "branch deletion failed");
            }
        }

        registry.worktrees.remove(task_id);
        registry.save(&self.registry_path)?;

        info!(task_id, "worktree removed");
        Ok(())
    }

    /// Sweep worktrees whose last activity is older than the age cutoff.
    ///
    /// Age alone makes a worktree eligible; `force` makes every worktree
    /// eligible regardless of age. Lifecycle state is a derived read-time
    /// label and never gates removal. Eligibility is decided in one pass
    /// under the lock; removals then run per-task through
    /// [`Self::remove_worktree`] so a failure on one worktree never
    /// blocks the rest.
    pub async fn cleanup(&self, options: CleanupOptions) -> Result<CleanupReport, WorktreeError> {
        let max_age = options.max_age.unwrap_or_else(|| {
            std::time::Duration::from_secs(self.settings.cleanup_max_age_mins as u64 * 60)
        });
        let cutoff = Utc::now()
            - Duration::from_std(max_age).unwrap_or_else(|_| Duration::minutes(60));

        let mut report = CleanupReport::default();
        let eligible: Vec<String> = {
            let _lock = RegistryLock::acquire(&self.registry_path, &self.lock_settings).await?;
            let registry = WorktreeRegistry::load(&self.registry_path, &self.repo_root)?;
            let mut eligible = Vec::new();
            for worktree in registry.worktrees.values() {
                if options.force || worktree.last_activity_at <= cutoff {
                    eligible.push(worktree.task_id.clone());
                } else {
                    report.skipped.push(worktree.task_id.clone());
                }
            }
            eligible.sort();
            eligible
        };

        if options.dry_run {
            report.removed = eligible;
            return Ok(report);
        }

        // The lock is not reentrant; removal re-acquires it per task.
        for task_id in eligible {
            match self.remove_worktree(&task_id, true).await {
                Ok(()) => report.removed.push(task_id),
                Err(e) => report.failed.push((task_id, e.to_string())),
            }
        }

        info!(
            removed = report.removed.len(),
            failed = report.failed.len(),
            skipped = report.skipped.len(),
            "worktree cleanup finished"
        );
        Ok(report)
    }

    /// Record activity on a task's worktree, resetting it to active.
    pub async fn update_activity(&self, task_id: &str) -> Result<(), WorktreeError> {
        let _lock = RegistryLock::acquire(&self.registry_path, &self.lock_settings).await?;
        let mut registry = WorktreeRegistry::load(&self.registry_path, &self.repo_root)?;

        let worktree = registry
            .worktrees
            .get_mut(task_id)
            .ok_or_else(|| WorktreeError::NotFound(task_id.to_string()))?;
        worktree.last_activity_at = Utc::now();
        worktree.lifecycle_state = LifecycleState::Active;
        registry.save(&self.registry_path)?;
        Ok(())
    }

    /// Re-derive one worktree's lifecycle state from its activity
    /// timestamp. The timestamp itself is never touched here.
    ///
    /// Exactly at the stale threshold the worktree is still idle; it
    /// turns stale only past it.
    pub async fn refresh_status(&self, task_id: &str) -> Result<WorktreeInfo, WorktreeError> {
        let _lock = RegistryLock::acquire(&self.registry_path, &self.lock_settings).await?;
        let mut registry = WorktreeRegistry::load(&self.registry_path, &self.repo_root)?;

        let worktree = registry
            .worktrees
            .get_mut(task_id)
            .ok_or_else(|| WorktreeError::NotFound(task_id.to_string()))?;
        let idle = worktree.idle_minutes(Utc::now());
        worktree.lifecycle_state = if idle > self.settings.stale_after_mins {
            LifecycleState::Stale
        } else if idle >= self.settings.idle_after_mins {
            LifecycleState::Idle
        } else {
            LifecycleState::Active
        };
        let refreshed = worktree.clone();
        registry.save(&self.registry_path)?;
        Ok(refreshed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::GitError;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use tempfile::tempdir;

    /// Simulates git by creating and deleting plain directories.
    struct FakeGit {
        branches: Mutex<Vec<String>>,
    }

    impl FakeGit {
        fn new() -> Self {
            Self {
                branches: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl SourceControl for FakeGit {
        async fn current_branch(&self) -> Result<String, GitError> {
            Ok("main".to_string())
        }

        async fn create_branch(&self, name: &str, _from: &str) -> Result<(), GitError> {
            self.branches.lock().unwrap().push(name.to_string());
            Ok(())
        }

        async fn checkout_branch(&self, _rev: &str) -> Result<(), GitError> {
            Ok(())
        }

        async fn delete_branch(&self, name: &str, _force: bool) -> Result<(), GitError> {
            let mut branches = self.branches.lock().unwrap();
            let before = branches.len();
            branches.retain(|b| b != name);
            if branches.len() == before {
                return Err(GitError::BranchNotFound(name.to_string()));
            }
            Ok(())
        }

        async fn latest_commit_hash(&self) -> Result<Option<String>, GitError> {
            Ok(Some("deadbeef".to_string()))
        }

        async fn add_worktree(
            &self,
            path: &Path,
            branch: &str,
            _base: &str,
        ) -> Result<(), GitError> {
            std::fs::create_dir_all(path)?;
            self.branches.lock().unwrap().push(branch.to_string());
            Ok(())
        }

        async fn remove_worktree(&self, path: &Path, _force: bool) -> Result<(), GitError> {
            std::fs::remove_dir_all(path)?;
            Ok(())
        }

        async fn prune_worktrees(&self) -> Result<(), GitError> {
            Ok(())
        }
    }

    fn manager(repo_root: &Path) -> (WorktreeManager, Arc<FakeGit>) {
        let git = Arc::new(FakeGit::new());
        let manager = WorktreeManager::new(
            repo_root,
            git.clone(),
            LockSettings {
                timeout_ms: 500,
                poll_ms: 10,
                steal_on_timeout: true,
            },
            WorktreeSettings::default(),
        );
        (manager, git)
    }

    async fn backdate(manager: &WorktreeManager, task_id: &str, minutes: i64) {
        let _lock = RegistryLock::acquire(&manager.registry_path, &manager.lock_settings)
            .await
            .unwrap();
        let mut registry =
            WorktreeRegistry::load(&manager.registry_path, &manager.repo_root).unwrap();
        let entry = registry.worktrees.get_mut(task_id).unwrap();
        entry.last_activity_at = Utc::now() - Duration::minutes(minutes);
        registry.save(&manager.registry_path).unwrap();
    }

    #[tokio::test]
    async fn create_registers_and_builds_branch_name() {
        let dir = tempdir().unwrap();
        let (manager, git) = manager(dir.path());

        let worktree = manager.create_worktree("t1", None).await.unwrap();
        assert!(worktree.branch_name.starts_with("taskhelm/task/t1/"));
        assert_eq!(worktree.base_branch, "main");
        assert_eq!(worktree.lifecycle_state, LifecycleState::Active);
        assert!(worktree.path.exists());
        assert!(git.branches.lock().unwrap().contains(&worktree.branch_name));

        let found = manager.get_worktree("t1").await.unwrap().unwrap();
        assert_eq!(found, worktree);
    }

    #[tokio::test]
    async fn duplicate_task_is_rejected() {
        let dir = tempdir().unwrap();
        let (manager, _git) = manager(dir.path());

        manager.create_worktree("t1", None).await.unwrap();
        let err = manager.create_worktree("t1", None).await.unwrap_err();
        assert!(matches!(err, WorktreeError::AlreadyExists(_)));
    }

    #[tokio::test]
    async fn explicit_base_branch_is_recorded() {
        let dir = tempdir().unwrap();
        let (manager, _git) = manager(dir.path());

        let worktree = manager.create_worktree("t1", Some("develop")).await.unwrap();
        assert_eq!(worktree.base_branch, "develop");
    }

    #[tokio::test]
    async fn registry_survives_a_new_manager_instance() {
        let dir = tempdir().unwrap();
        let (manager, _git) = manager(dir.path());
        manager.create_worktree("t1", None).await.unwrap();
        drop(manager);

        let (revived, _git) = self::manager(dir.path());
        let listed = revived.list_worktrees().await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].task_id, "t1");
    }

    #[tokio::test]
    async fn remove_deletes_worktree_and_branch() {
        let dir = tempdir().unwrap();
        let (manager, git) = manager(dir.path());
        let worktree = manager.create_worktree("t1", None).await.unwrap();

        manager.remove_worktree("t1", true).await.unwrap();
        assert!(!worktree.path.exists());
        assert!(!git.branches.lock().unwrap().contains(&worktree.branch_name));
        assert!(manager.get_worktree("t1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn remove_unknown_task_is_not_found() {
        let dir = tempdir().unwrap();
        let (manager, _git) = manager(dir.path());
        let err = manager.remove_worktree("ghost", false).await.unwrap_err();
        assert!(matches!(err, WorktreeError::NotFound(_)));
    }

    #[tokio::test]
    async fn refresh_derives_idle_and_stale_states() {
        let dir = tempdir().unwrap();
        let (manager, _git) = manager(dir.path());
        manager.create_worktree("fresh", None).await.unwrap();
        manager.create_worktree("idle", None).await.unwrap();
        manager.create_worktree("stale", None).await.unwrap();
        backdate(&manager, "idle", 20).await;
        backdate(&manager, "stale", 45).await;

        let fresh = manager.refresh_status("fresh").await.unwrap();
        let idle = manager.refresh_status("idle").await.unwrap();
        let stale = manager.refresh_status("stale").await.unwrap();
        assert_eq!(fresh.lifecycle_state, LifecycleState::Active);
        assert_eq!(idle.lifecycle_state, LifecycleState::Idle);
        assert_eq!(stale.lifecycle_state, LifecycleState::Stale);
    }

    #[tokio::test]
    async fn refresh_stale_boundary_is_exclusive() {
        let dir = tempdir().unwrap();
        let (manager, _git) = manager(dir.path());
        manager.create_worktree("edge", None).await.unwrap();

        // Exactly at the stale threshold: still idle.
        backdate(&manager, "edge", 30).await;
        let at_threshold = manager.refresh_status("edge").await.unwrap();
        assert_eq!(at_threshold.lifecycle_state, LifecycleState::Idle);

        backdate(&manager, "edge", 31).await;
        let past_threshold = manager.refresh_status("edge").await.unwrap();
        assert_eq!(past_threshold.lifecycle_state, LifecycleState::Stale);
    }

    #[tokio::test]
    async fn refresh_unknown_task_is_not_found() {
        let dir = tempdir().unwrap();
        let (manager, _git) = manager(dir.path());
        let err = manager.refresh_status("ghost").await.unwrap_err();
        assert!(matches!(err, WorktreeError::NotFound(_)));
    }

    #[tokio::test]
    async fn update_activity_resets_to_active() {
        let dir = tempdir().unwrap();
        let (manager, _git) = manager(dir.path());
        manager.create_worktree("t1", None).await.unwrap();
        backdate(&manager, "t1", 45).await;
        assert_eq!(
            manager.refresh_status("t1").await.unwrap().lifecycle_state,
            LifecycleState::Stale
        );

        manager.update_activity("t1").await.unwrap();
        let worktree = manager.get_worktree("t1").await.unwrap().unwrap();
        assert_eq!(worktree.lifecycle_state, LifecycleState::Active);
        assert!(worktree.idle_minutes(Utc::now()) < 1);
    }

    #[tokio::test]
    async fn cleanup_removes_only_aged_worktrees() {
        let dir = tempdir().unwrap();
        let (manager, _git) = manager(dir.path());
        manager.create_worktree("old", None).await.unwrap();
        manager.create_worktree("new", None).await.unwrap();
        backdate(&manager, "old", 90).await;

        let report = manager.cleanup(CleanupOptions::default()).await.unwrap();
        assert_eq!(report.removed, vec!["old".to_string()]);
        assert_eq!(report.skipped, vec!["new".to_string()]);
        assert!(report.failed.is_empty());
        assert!(manager.get_worktree("old").await.unwrap().is_none());
        assert!(manager.get_worktree("new").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn cleanup_age_alone_is_sufficient() {
        let dir = tempdir().unwrap();
        let (manager, _git) = manager(dir.path());
        manager.create_worktree("old", None).await.unwrap();
        // Aged past the cutoff; lifecycle state never refreshed, still
        // recorded as active.
        backdate(&manager, "old", 120).await;
        assert_eq!(
            manager.get_worktree("old").await.unwrap().unwrap().lifecycle_state,
            LifecycleState::Active
        );

        let report = manager.cleanup(CleanupOptions::default()).await.unwrap();
        assert_eq!(report.removed, vec!["old".to_string()]);
        assert!(report.skipped.is_empty());
    }

    #[tokio::test]
    async fn cleanup_force_removes_fresh_worktrees() {
        let dir = tempdir().unwrap();
        let (manager, _git) = manager(dir.path());
        manager.create_worktree("fresh", None).await.unwrap();

        let report = manager
            .cleanup(CleanupOptions {
                force: true,
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(report.removed, vec!["fresh".to_string()]);
        assert!(report.skipped.is_empty());
        assert!(manager.get_worktree("fresh").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn cleanup_zero_age_forced_removes_everything() {
        let dir = tempdir().unwrap();
        let (manager, _git) = manager(dir.path());
        manager.create_worktree("t1", None).await.unwrap();
        manager.create_worktree("t2", None).await.unwrap();

        let report = manager
            .cleanup(CleanupOptions {
                max_age: Some(std::time::Duration::ZERO),
                force: true,
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(report.removed, vec!["t1".to_string(), "t2".to_string()]);
        assert!(manager.list_worktrees().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn dry_run_reports_without_removing() {
        let dir = tempdir().unwrap();
        let (manager, _git) = manager(dir.path());
        manager.create_worktree("old", None).await.unwrap();
        backdate(&manager, "old", 90).await;

        let report = manager
            .cleanup(CleanupOptions {
                dry_run: true,
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(report.removed, vec!["old".to_string()]);
        assert!(manager.get_worktree("old").await.unwrap().is_some());
    }
}
