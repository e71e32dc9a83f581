//! Checkpoint/recovery subsystem.
//!
//! [`CheckpointManager`] owns durable snapshots of orchestration state
//! plus an optional source-control commit reference; restoring a snapshot
//! always restores state, and restores the commit position best-effort.
//! [`CheckpointScheduler`] drives the manager on a timer and on
//! orchestration events.

mod manager;
mod scheduler;

pub use manager::{Checkpoint, CheckpointManager, CheckpointTrigger};
pub use scheduler::{CheckpointScheduler, TaskEscalation};

pub use crate::errors::CheckpointError;
