//! Human-in-the-loop review gate.
//!
//! When automation runs out of road (exhausted retries, merge conflicts,
//! or a manual hold) a task is parked behind a [`HumanReviewRequest`]
//! until a human approves or rejects it. Requests are durable; the
//! in-memory pending set is rebuilt from the row store on startup.

mod service;

pub use service::{HumanReviewService, ReviewParams};

pub use crate::errors::ReviewError;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// Why a task was escalated to a human.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReviewReason {
    AutomationExhausted,
    MergeConflict,
    ManualHold,
}

impl fmt::Display for ReviewReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::AutomationExhausted => "automation-exhausted",
            Self::MergeConflict => "merge-conflict",
            Self::ManualHold => "manual-hold",
        };
        f.write_str(s)
    }
}

impl FromStr for ReviewReason {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "automation-exhausted" => Ok(Self::AutomationExhausted),
            "merge-conflict" => Ok(Self::MergeConflict),
            "manual-hold" => Ok(Self::ManualHold),
            other => Err(format!("unknown review reason: {other}")),
        }
    }
}

/// Lifecycle of a review request. `Approved` and `Rejected` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReviewStatus {
    Pending,
    Approved,
    Rejected,
}

impl fmt::Display for ReviewStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        };
        f.write_str(s)
    }
}

impl FromStr for ReviewStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "approved" => Ok(Self::Approved),
            "rejected" => Ok(Self::Rejected),
            other => Err(format!("unknown review status: {other}")),
        }
    }
}

/// A durable request for human judgement on a parked task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HumanReviewRequest {
    pub id: String,
    pub task_id: String,
    pub project_id: String,
    pub reason: ReviewReason,
    /// Free-form diagnostic context captured at escalation time.
    pub context: Value,
    pub status: ReviewStatus,
    pub created_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
    /// Approval note or rejection feedback, set on resolution.
    pub resolution: Option<String>,
}
