//! In-process event bus connecting the orchestration subsystems.
//!
//! A single broadcast channel carries named events with JSON payloads;
//! subscribers receive everything and filter by name. Emitting with no
//! live subscribers is not an error.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::broadcast;

/// Event names emitted by the core.
pub const REVIEW_REQUESTED: &str = "review-requested";
pub const REVIEW_APPROVED: &str = "review-approved";
pub const REVIEW_REJECTED: &str = "review-rejected";
pub const CHECKPOINT_CREATED: &str = "checkpoint-created";
pub const CHECKPOINT_RESTORED: &str = "checkpoint-restored";

/// Event names consumed by the core.
pub const FEATURE_COMPLETED: &str = "feature-completed";
pub const TASK_ESCALATED: &str = "task-escalated";

/// A named event with an opaque JSON payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub name: String,
    pub payload: Value,
}

impl Event {
    pub fn new(name: &str, payload: Value) -> Self {
        Self {
            name: name.to_string(),
            payload,
        }
    }
}

/// Cloneable handle to the broadcast bus.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<Event>,
}

impl EventBus {
    /// Create a bus with the given channel capacity.
    ///
    /// Slow subscribers that fall more than `capacity` events behind see
    /// `RecvError::Lagged` and should resubscribe or skip ahead.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Emit a named event. A bus with no subscribers drops the event.
    pub fn emit(&self, name: &str, payload: Value) {
        let event = Event::new(name, payload);
        if self.tx.send(event).is_err() {
            tracing::debug!(event = name, "no subscribers for event");
        }
    }

    /// Subscribe to all events on the bus.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }

    /// Number of live subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
