use crate::checkpoint::{CheckpointManager, CheckpointTrigger};
use crate::errors::ReviewError;
use crate::events::{self, EventBus};
use crate::review::{HumanReviewRequest, ReviewReason, ReviewStatus};
use crate::store::ReviewStore;
use chrono::Utc;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};
use uuid::Uuid;

/// Inputs for a new review request.
pub struct ReviewParams {
    pub task_id: String,
    pub project_id: String,
    pub reason: ReviewReason,
    pub context: Value,
}

/// Durable approve/reject gate for escalated tasks.
///
/// The pending set lives in memory for cheap lookup and is seeded from
/// the row store at construction, so pending reviews survive a restart.
/// Resolution is a single terminal transition guarded by the pending-set
/// mutex held across the store write.
pub struct HumanReviewService {
    store: Arc<dyn ReviewStore>,
    checkpoints: Option<Arc<CheckpointManager>>,
    bus: Option<EventBus>,
    pending: Mutex<HashMap<String, HumanReviewRequest>>,
}

impl HumanReviewService {
    /// Build the service, rebuilding the pending set from stored rows.
    pub async fn load(store: Arc<dyn ReviewStore>) -> Result<Self, ReviewError> {
        let rows = store
            .list_reviews_by_status(ReviewStatus::Pending)
            .await
            .map_err(ReviewError::Store)?;

        if !rows.is_empty() {
            info!(count = rows.len(), "recovered pending review requests");
        }
        let pending = rows.into_iter().map(|r| (r.id.clone(), r)).collect();

        Ok(Self {
            store,
            checkpoints: None,
            bus: None,
            pending: Mutex::new(pending),
        })
    }

    /// Attach a checkpoint manager; a best-effort safety checkpoint is
    /// taken whenever a review is requested.
    pub fn with_checkpoints(mut self, checkpoints: Arc<CheckpointManager>) -> Self {
        self.checkpoints = Some(checkpoints);
        self
    }

    pub fn with_event_bus(mut self, bus: EventBus) -> Self {
        self.bus = Some(bus);
        self
    }

    /// Park a task behind a pending review request.
    pub async fn request_review(
        &self,
        params: ReviewParams,
    ) -> Result<HumanReviewRequest, ReviewError> {
        let request = HumanReviewRequest {
            id: Uuid::new_v4().to_string(),
            task_id: params.task_id,
            project_id: params.project_id,
            reason: params.reason,
            context: params.context,
            status: ReviewStatus::Pending,
            created_at: Utc::now(),
            resolved_at: None,
            resolution: None,
        };

        self.store
            .insert_review(&request)
            .await
            .map_err(ReviewError::Store)?;

        // Safety net before the task parks; its failure never blocks the gate.
        if let Some(checkpoints) = &self.checkpoints {
            if let Err(e) = checkpoints
                .create_auto_checkpoint(&request.project_id, CheckpointTrigger::HumanRequest)
                .await
            {
                warn!(error = %e, task_id = %request.task_id, "safety checkpoint failed for review request");
            }
        }

        self.pending
            .lock()
            .await
            .insert(request.id.clone(), request.clone());

        info!(review_id = %request.id, task_id = %request.task_id, reason = %request.reason, "review requested");
        if let Some(bus) = &self.bus {
            bus.emit(
                events::REVIEW_REQUESTED,
                json!({
                    "review_id": request.id,
                    "task_id": request.task_id,
                    "project_id": request.project_id,
                    "reason": request.reason.to_string(),
                }),
            );
        }

        Ok(request)
    }

    /// Approve a pending review, optionally with a note.
    pub async fn approve_review(
        &self,
        review_id: &str,
        resolution: Option<String>,
    ) -> Result<HumanReviewRequest, ReviewError> {
        self.resolve(review_id, ReviewStatus::Approved, resolution)
            .await
    }

    /// Reject a pending review with feedback for the next attempt.
    pub async fn reject_review(
        &self,
        review_id: &str,
        feedback: &str,
    ) -> Result<HumanReviewRequest, ReviewError> {
        self.resolve(review_id, ReviewStatus::Rejected, Some(feedback.to_string()))
            .await
    }

    /// All pending requests, oldest first.
    pub async fn list_pending_reviews(&self) -> Vec<HumanReviewRequest> {
        let pending = self.pending.lock().await;
        let mut rows: Vec<_> = pending.values().cloned().collect();
        rows.sort_by_key(|r| r.created_at);
        rows
    }

    /// Look up a pending request by id.
    pub async fn get_review(&self, review_id: &str) -> Option<HumanReviewRequest> {
        self.pending.lock().await.get(review_id).cloned()
    }

    async fn resolve(
        &self,
        review_id: &str,
        status: ReviewStatus,
        resolution: Option<String>,
    ) -> Result<HumanReviewRequest, ReviewError> {
        // Hold the lock across the store write so two concurrent
        // resolutions cannot both observe the request as pending.
        let mut pending = self.pending.lock().await;
        let mut request = pending
            .get(review_id)
            .cloned()
            .ok_or_else(|| ReviewError::NotFound(review_id.to_string()))?;

        request.status = status;
        request.resolved_at = Some(Utc::now());
        request.resolution = resolution;

        self.store
            .update_review(&request)
            .await
            .map_err(ReviewError::Store)?;
        pending.remove(review_id);
        drop(pending);

        info!(review_id, status = %status, task_id = %request.task_id, "review resolved");
        if let Some(bus) = &self.bus {
            let name = match status {
                ReviewStatus::Approved => events::REVIEW_APPROVED,
                _ => events::REVIEW_REJECTED,
            };
            bus.emit(
                name,
                json!({
                    "review_id": review_id,
                    "task_id": request.task_id,
                    "project_id": request.project_id,
                    "resolution": request.resolution,
                }),
            );
        }

        Ok(request)
    }
}
