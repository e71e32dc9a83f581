use crate::checkpoint::Checkpoint;
use crate::review::{HumanReviewRequest, ReviewReason, ReviewStatus};
use crate::store::{CheckpointStore, ReviewStore};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use tracing::warn;

/// Async-safe handle to the orchestration database.
///
/// Wraps `SqliteDb` behind `Arc<Mutex>` and runs all access on tokio's
/// blocking thread pool via `spawn_blocking`, keeping synchronous SQLite
/// I/O off the async worker threads.
#[derive(Clone)]
pub struct DbHandle {
    inner: Arc<std::sync::Mutex<SqliteDb>>,
}

impl DbHandle {
    pub fn new(db: SqliteDb) -> Self {
        Self {
            inner: Arc::new(std::sync::Mutex::new(db)),
        }
    }

    /// Run a closure with access to the database on a blocking thread.
    /// All data passed into `f` must be owned (`'static`).
    pub async fn call<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&SqliteDb) -> Result<R> + Send + 'static,
        R: Send + 'static,
    {
        let db = self.inner.clone();
        tokio::task::spawn_blocking(move || {
            let guard = db
                .lock()
                .map_err(|e| anyhow::anyhow!("DB lock poisoned: {}", e))?;
            f(&guard)
        })
        .await
        .context("DB task panicked")?
    }

    /// Acquire the database mutex synchronously. For startup and tests;
    /// not for hot async paths.
    pub fn lock_sync(&self) -> Result<std::sync::MutexGuard<'_, SqliteDb>> {
        self.inner
            .lock()
            .map_err(|e| anyhow::anyhow!("DB lock poisoned: {}", e))
    }
}

pub struct SqliteDb {
    conn: Connection,
}

impl SqliteDb {
    /// Open (or create) a SQLite database at the given path and run migrations.
    pub fn new(path: &Path) -> Result<Self> {
        let conn = Connection::open(path).context("Failed to open SQLite database")?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    /// Create an in-memory SQLite database (for testing).
    pub fn new_in_memory() -> Result<Self> {
        let conn =
            Connection::open_in_memory().context("Failed to open in-memory SQLite database")?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    fn init(&self) -> Result<()> {
        self.conn
            .execute_batch("PRAGMA foreign_keys = ON;")
            .context("Failed to enable foreign keys")?;
        self.run_migrations().context("Failed to run migrations")?;
        Ok(())
    }

    fn run_migrations(&self) -> Result<()> {
        self.conn
            .execute_batch(
                "
                CREATE TABLE IF NOT EXISTS checkpoints (
                    id TEXT PRIMARY KEY,
                    project_id TEXT NOT NULL,
                    reason TEXT NOT NULL,
                    state_snapshot TEXT NOT NULL,
                    source_control_commit TEXT,
                    created_at TEXT NOT NULL
                );

                CREATE INDEX IF NOT EXISTS idx_checkpoints_project
                    ON checkpoints(project_id, created_at);

                CREATE TABLE IF NOT EXISTS review_requests (
                    id TEXT PRIMARY KEY,
                    task_id TEXT NOT NULL,
                    project_id TEXT NOT NULL,
                    reason TEXT NOT NULL,
                    context TEXT NOT NULL DEFAULT '{}',
                    status TEXT NOT NULL DEFAULT 'pending',
                    created_at TEXT NOT NULL,
                    resolved_at TEXT,
                    resolution TEXT
                );

                CREATE INDEX IF NOT EXISTS idx_review_requests_status
                    ON review_requests(status, created_at);
                ",
            )
            .context("Failed to create tables")?;
        Ok(())
    }

    pub fn insert_checkpoint(&self, checkpoint: &Checkpoint) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO checkpoints (id, project_id, reason, state_snapshot, source_control_commit, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    checkpoint.id,
                    checkpoint.project_id,
                    checkpoint.reason,
                    checkpoint.state_snapshot,
                    checkpoint.source_control_commit,
                    checkpoint.created_at.to_rfc3339(),
                ],
            )
            .context("Failed to insert checkpoint")?;
        Ok(())
    }

    pub fn get_checkpoint(&self, id: &str) -> Result<Option<Checkpoint>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT id, project_id, reason, state_snapshot, source_control_commit, created_at
                 FROM checkpoints WHERE id = ?1",
            )
            .context("Failed to prepare get_checkpoint")?;
        let row = stmt
            .query_row(params![id], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, Option<String>>(4)?,
                    row.get::<_, String>(5)?,
                ))
            })
            .optional()
            .context("Failed to query checkpoint")?;
        row.map(checkpoint_from_row).transpose()
    }

    pub fn list_checkpoints(&self, project_id: &str) -> Result<Vec<Checkpoint>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT id, project_id, reason, state_snapshot, source_control_commit, created_at
                 FROM checkpoints WHERE project_id = ?1 ORDER BY created_at DESC",
            )
            .context("Failed to prepare list_checkpoints")?;
        let rows = stmt
            .query_map(params![project_id], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, Option<String>>(4)?,
                    row.get::<_, String>(5)?,
                ))
            })
            .context("Failed to query checkpoints")?;

        let mut checkpoints = Vec::new();
        for row in rows {
            checkpoints.push(checkpoint_from_row(row?)?);
        }
        Ok(checkpoints)
    }

    pub fn delete_checkpoint(&self, id: &str) -> Result<()> {
        self.conn
            .execute("DELETE FROM checkpoints WHERE id = ?1", params![id])
            .context("Failed to delete checkpoint")?;
        Ok(())
    }

    pub fn insert_review(&self, request: &HumanReviewRequest) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO review_requests (id, task_id, project_id, reason, context, status, created_at, resolved_at, resolution)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    request.id,
                    request.task_id,
                    request.project_id,
                    request.reason.to_string(),
                    serde_json::to_string(&request.context)?,
                    request.status.to_string(),
                    request.created_at.to_rfc3339(),
                    request.resolved_at.map(|t| t.to_rfc3339()),
                    request.resolution,
                ],
            )
            .context("Failed to insert review request")?;
        Ok(())
    }

    pub fn update_review(&self, request: &HumanReviewRequest) -> Result<()> {
        self.conn
            .execute(
                "UPDATE review_requests SET status = ?2, resolved_at = ?3, resolution = ?4
                 WHERE id = ?1",
                params![
                    request.id,
                    request.status.to_string(),
                    request.resolved_at.map(|t| t.to_rfc3339()),
                    request.resolution,
                ],
            )
            .context("Failed to update review request")?;
        Ok(())
    }

    /// Rows with the given status, oldest first. Rows that no longer
    /// deserialize are skipped with a warning rather than failing the
    /// whole listing.
    pub fn list_reviews_by_status(&self, status: ReviewStatus) -> Result<Vec<HumanReviewRequest>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT id, task_id, project_id, reason, context, status, created_at, resolved_at, resolution
                 FROM review_requests WHERE status = ?1 ORDER BY created_at ASC",
            )
            .context("Failed to prepare list_reviews_by_status")?;
        let rows = stmt
            .query_map(params![status.to_string()], |row| {
                Ok(RawReviewRow {
                    id: row.get(0)?,
                    task_id: row.get(1)?,
                    project_id: row.get(2)?,
                    reason: row.get(3)?,
                    context: row.get(4)?,
                    status: row.get(5)?,
                    created_at: row.get(6)?,
                    resolved_at: row.get(7)?,
                    resolution: row.get(8)?,
                })
            })
            .context("Failed to query review requests")?;

        let mut requests = Vec::new();
        for row in rows {
            let raw = row?;
            let id = raw.id.clone();
            match review_from_row(raw) {
                Ok(request) => requests.push(request),
                Err(e) => warn!(error = %e, review_id = %id, "skipping corrupt review row"),
            }
        }
        Ok(requests)
    }
}

struct RawReviewRow {
    id: String,
    task_id: String,
    project_id: String,
    reason: String,
    context: String,
    status: String,
    created_at: String,
    resolved_at: Option<String>,
    resolution: Option<String>,
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(raw)
        .with_context(|| format!("Invalid timestamp: {raw}"))?
        .with_timezone(&Utc))
}

fn checkpoint_from_row(
    (id, project_id, reason, state_snapshot, source_control_commit, created_at): (
        String,
        String,
        String,
        String,
        Option<String>,
        String,
    ),
) -> Result<Checkpoint> {
    Ok(Checkpoint {
        id,
        project_id,
        reason,
        state_snapshot,
        source_control_commit,
        created_at: parse_timestamp(&created_at)?,
    })
}

fn review_from_row(raw: RawReviewRow) -> Result<HumanReviewRequest> {
    Ok(HumanReviewRequest {
        id: raw.id,
        task_id: raw.task_id,
        project_id: raw.project_id,
        reason: ReviewReason::from_str(&raw.reason).map_err(anyhow::Error::msg)?,
        context: serde_json::from_str(&raw.context).context("Invalid review context JSON")?,
        status: ReviewStatus::from_str(&raw.status).map_err(anyhow::Error::msg)?,
        created_at: parse_timestamp(&raw.created_at)?,
        resolved_at: raw.resolved_at.as_deref().map(parse_timestamp).transpose()?,
        resolution: raw.resolution,
    })
}

/// [`CheckpointStore`] and [`ReviewStore`] backed by a single SQLite
/// database behind a [`DbHandle`].
#[derive(Clone)]
pub struct SqliteStore {
    handle: DbHandle,
}

impl SqliteStore {
    pub fn new(path: &Path) -> Result<Self> {
        Ok(Self {
            handle: DbHandle::new(SqliteDb::new(path)?),
        })
    }

    pub fn new_in_memory() -> Result<Self> {
        Ok(Self {
            handle: DbHandle::new(SqliteDb::new_in_memory()?),
        })
    }

    pub fn handle(&self) -> &DbHandle {
        &self.handle
    }
}

#[async_trait]
impl CheckpointStore for SqliteStore {
    async fn insert_checkpoint(&self, checkpoint: &Checkpoint) -> Result<()> {
        let checkpoint = checkpoint.clone();
        self.handle.call(move |db| db.insert_checkpoint(&checkpoint)).await
    }

    async fn get_checkpoint(&self, id: &str) -> Result<Option<Checkpoint>> {
        let id = id.to_string();
        self.handle.call(move |db| db.get_checkpoint(&id)).await
    }

    async fn list_checkpoints(&self, project_id: &str) -> Result<Vec<Checkpoint>> {
        let project_id = project_id.to_string();
        self.handle
            .call(move |db| db.list_checkpoints(&project_id))
            .await
    }

    async fn delete_checkpoint(&self, id: &str) -> Result<()> {
        let id = id.to_string();
        self.handle.call(move |db| db.delete_checkpoint(&id)).await
    }
}

#[async_trait]
impl ReviewStore for SqliteStore {
    async fn insert_review(&self, request: &HumanReviewRequest) -> Result<()> {
        let request = request.clone();
        self.handle.call(move |db| db.insert_review(&request)).await
    }

    async fn update_review(&self, request: &HumanReviewRequest) -> Result<()> {
        let request = request.clone();
        self.handle.call(move |db| db.update_review(&request)).await
    }

    async fn list_reviews_by_status(&self, status: ReviewStatus) -> Result<Vec<HumanReviewRequest>> {
        self.handle
            .call(move |db| db.list_reviews_by_status(status))
            .await
    }
}
