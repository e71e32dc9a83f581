use crate::checkpoint::{CheckpointManager, CheckpointTrigger};
use crate::config::CheckpointSettings;
use crate::events::{self, EventBus};
use crate::review::{HumanReviewService, ReviewParams, ReviewReason};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Payload of a `task-escalated` event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskEscalation {
    pub task_id: String,
    pub reason: String,
    pub iteration_count: u32,
    #[serde(default)]
    pub last_error: Option<String>,
}

/// Drives automatic checkpoints on a timer and on orchestration events.
///
/// Every reaction is best-effort: a failed checkpoint or review request
/// is logged and the loops keep running.
pub struct CheckpointScheduler {
    checkpoints: Arc<CheckpointManager>,
    reviews: Arc<HumanReviewService>,
    bus: EventBus,
    interval: Duration,
    handles: Vec<JoinHandle<()>>,
}

impl CheckpointScheduler {
    pub fn new(
        checkpoints: Arc<CheckpointManager>,
        reviews: Arc<HumanReviewService>,
        bus: EventBus,
        settings: &CheckpointSettings,
    ) -> Self {
        Self {
            checkpoints,
            reviews,
            bus,
            interval: settings.interval(),
            handles: Vec::new(),
        }
    }

    /// Start the timer loop and the event loop for a project.
    pub fn start(&mut self, project_id: &str) {
        info!(project_id, interval_secs = self.interval.as_secs(), "checkpoint scheduler started");

        let checkpoints = self.checkpoints.clone();
        let project = project_id.to_string();
        let period = self.interval;
        self.handles.push(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            // The first tick fires immediately; skip it.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if let Err(e) = checkpoints
                    .create_auto_checkpoint(&project, CheckpointTrigger::Scheduled)
                    .await
                {
                    warn!(error = %e, project_id = %project, "scheduled checkpoint failed");
                }
            }
        }));

        let checkpoints = self.checkpoints.clone();
        let reviews = self.reviews.clone();
        let project = project_id.to_string();
        let mut rx = self.bus.subscribe();
        self.handles.push(tokio::spawn(async move {
            loop {
                let event = match rx.recv().await {
                    Ok(event) => event,
                    Err(RecvError::Lagged(missed)) => {
                        warn!(missed, "checkpoint scheduler lagged behind the event bus");
                        continue;
                    }
                    Err(RecvError::Closed) => break,
                };

                match event.name.as_str() {
                    events::FEATURE_COMPLETED => {
                        if let Err(e) = checkpoints
                            .create_auto_checkpoint(&project, CheckpointTrigger::FeatureComplete)
                            .await
                        {
                            warn!(error = %e, project_id = %project, "feature-complete checkpoint failed");
                        }
                    }
                    events::TASK_ESCALATED => {
                        let escalation: TaskEscalation =
                            match serde_json::from_value(event.payload.clone()) {
                                Ok(escalation) => escalation,
                                Err(e) => {
                                    warn!(error = %e, "malformed task escalation payload");
                                    continue;
                                }
                            };
                        handle_escalation(&checkpoints, &reviews, &project, escalation).await;
                    }
                    _ => {}
                }
            }
        }));
    }

    /// Abort both loops. Safe to call more than once.
    pub fn stop(&mut self) {
        for handle in self.handles.drain(..) {
            handle.abort();
        }
    }
}

impl Drop for CheckpointScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn handle_escalation(
    checkpoints: &CheckpointManager,
    reviews: &HumanReviewService,
    project_id: &str,
    escalation: TaskEscalation,
) {
    if let Err(e) = checkpoints
        .create_auto_checkpoint(project_id, CheckpointTrigger::AutomationExhausted)
        .await
    {
        warn!(error = %e, task_id = %escalation.task_id, "escalation checkpoint failed");
    }

    let params = ReviewParams {
        task_id: escalation.task_id.clone(),
        project_id: project_id.to_string(),
        reason: ReviewReason::AutomationExhausted,
        context: json!({
            "reason": escalation.reason,
            "iteration_count": escalation.iteration_count,
            "last_error": escalation.last_error,
        }),
    };
    if let Err(e) = reviews.request_review(params).await {
        warn!(error = %e, task_id = %escalation.task_id, "review request for escalated task failed");
    }
}
