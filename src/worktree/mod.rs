//! Isolated git worktrees for parallel task execution.
//!
//! Each task gets its own worktree and branch
//! (`<namespace>/task/<task-id>/<timestamp>`) so agents never contend for
//! a working directory. Worktree metadata lives in a JSON registry file
//! guarded by an advisory lock, so concurrent orchestrator processes on
//! one machine serialize their registry mutations.

mod lock;
mod manager;
mod registry;

pub use lock::RegistryLock;
pub use manager::{CleanupOptions, CleanupReport, WorktreeManager};
pub use registry::{LifecycleState, WorktreeInfo, WorktreeRegistry};

pub use crate::errors::WorktreeError;
