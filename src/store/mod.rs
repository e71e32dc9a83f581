//! Durable storage collaborators.
//!
//! Two seams: [`StateStore`] for whole-project orchestration state
//! (load/save an opaque JSON document) and the row stores
//! ([`CheckpointStore`], [`ReviewStore`]) for checkpoint and review
//! records. Production implementations are [`JsonStateStore`] (one file
//! per project) and [`SqliteStore`] (one SQLite database behind a
//! blocking-pool handle).

mod db;
mod state;

pub use db::{DbHandle, SqliteDb, SqliteStore};
pub use state::{JsonStateStore, StateStore};

use crate::checkpoint::Checkpoint;
use crate::review::{HumanReviewRequest, ReviewStatus};
use anyhow::Result;
use async_trait::async_trait;

/// Row store for checkpoint records.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    async fn insert_checkpoint(&self, checkpoint: &Checkpoint) -> Result<()>;
    async fn get_checkpoint(&self, id: &str) -> Result<Option<Checkpoint>>;
    /// All checkpoints for a project, newest first.
    async fn list_checkpoints(&self, project_id: &str) -> Result<Vec<Checkpoint>>;
    async fn delete_checkpoint(&self, id: &str) -> Result<()>;
}

/// Row store for human review requests.
#[async_trait]
pub trait ReviewStore: Send + Sync {
    async fn insert_review(&self, request: &HumanReviewRequest) -> Result<()>;
    async fn update_review(&self, request: &HumanReviewRequest) -> Result<()>;
    /// Rows with the given stored status, oldest first. Rows that fail to
    /// deserialize are skipped with a logged warning.
    async fn list_reviews_by_status(&self, status: ReviewStatus) -> Result<Vec<HumanReviewRequest>>;
}
