use crate::config::LockSettings;
use crate::errors::WorktreeError;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::warn;

/// Advisory file lock guarding the worktree registry.
///
/// The lock is a sidecar file created with `create_new`; whichever
/// process wins the create owns the registry until the guard drops.
/// Contenders poll, and on timeout either steal the lock (assuming the
/// holder died) or fail, per [`LockSettings`].
#[derive(Debug)]
pub struct RegistryLock {
    path: PathBuf,
}

impl RegistryLock {
    /// Acquire the lock, polling until the deadline.
    pub async fn acquire(
        registry_path: &Path,
        settings: &LockSettings,
    ) -> Result<Self, WorktreeError> {
        let path = Self::lock_path(registry_path);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let deadline = Instant::now() + settings.timeout();
        loop {
            match std::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
            {
                Ok(_) => return Ok(Self { path }),
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {}
                Err(e) => return Err(e.into()),
            }

            if Instant::now() >= deadline {
                if !settings.steal_on_timeout {
                    return Err(WorktreeError::LockTimeout(path));
                }
                // The previous holder most likely died without releasing.
                warn!(lock = %path.display(), "registry lock held past timeout, stealing it");
                match std::fs::remove_file(&path) {
                    Ok(()) => {}
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                    Err(e) => return Err(e.into()),
                }
                match std::fs::OpenOptions::new()
                    .write(true)
                    .create_new(true)
                    .open(&path)
                {
                    Ok(_) => return Ok(Self { path }),
                    // Another contender won the steal race.
                    Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                        return Err(WorktreeError::LockTimeout(path));
                    }
                    Err(e) => return Err(e.into()),
                }
            }

            tokio::time::sleep(settings.poll_interval()).await;
        }
    }

    /// Release the lock now instead of waiting for scope end.
    pub fn release(self) {
        drop(self);
    }

    fn lock_path(registry_path: &Path) -> PathBuf {
        let mut name = registry_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "registry.json".to_string());
        name.push_str(".lock");
        registry_path.with_file_name(name)
    }
}

impl Drop for RegistryLock {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(lock = %self.path.display(), error = %e, "failed to release registry lock");
            }
        }
    }
}
