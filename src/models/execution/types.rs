use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::errors::AppError;

/// Lifecycle state of an execution. `Closed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    InProgress,
    Escalated,
    Closed,
}

impl ExecutionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ExecutionStatus::InProgress => "in_progress",
            ExecutionStatus::Escalated => "escalated",
            ExecutionStatus::Closed => "closed",
        }
    }

    pub fn is_closed(self) -> bool {
        self == ExecutionStatus::Closed
    }
}

impl FromStr for ExecutionStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "in_progress" => Ok(ExecutionStatus::InProgress),
            "escalated" => Ok(ExecutionStatus::Escalated),
            "closed" => Ok(ExecutionStatus::Closed),
            other => Err(AppError::validation("status", format!("unknown status '{other}'"))),
        }
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Record that one checklist step was performed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepCompletion {
    pub step_order: u32,
    pub completed_at: DateTime<Utc>,
    pub completed_by: i64,
    pub notes: Option<String>,
    pub evidence_ref: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Escalation {
    pub reason: String,
    pub escalated_at: DateTime<Utc>,
    pub escalated_by: i64,
    pub escalated_to: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Closure {
    pub completed_at: DateTime<Utc>,
    pub completed_by: i64,
    pub notes: Option<String>,
}

/// One enactment of a protocol against an alert.
///
/// `escalation` is set once the execution has been escalated and survives closure;
/// `closure` is set exactly when `status` is `Closed`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProtocolExecution {
    pub id: i64,
    pub organization_id: i64,
    pub alert_id: i64,
    /// None means the default catalog applies.
    pub template_id: Option<i64>,
    pub status: ExecutionStatus,
    pub started_at: DateTime<Utc>,
    pub started_by: i64,
    pub escalation: Option<Escalation>,
    pub closure: Option<Closure>,
    /// Sorted by `step_order`, at most one entry per order.
    pub completions: Vec<StepCompletion>,
}

impl ProtocolExecution {
    pub fn completion(&self, step_order: u32) -> Option<&StepCompletion> {
        self.completions.iter().find(|c| c.step_order == step_order)
    }

    /// Insert or replace the completion for `completion.step_order`.
    pub fn record_completion(&mut self, completion: StepCompletion) {
        match self
            .completions
            .binary_search_by_key(&completion.step_order, |c| c.step_order)
        {
            Ok(idx) => self.completions[idx] = completion,
            Err(idx) => self.completions.insert(idx, completion),
        }
    }
}

/// Values needed to open a new execution.
#[derive(Debug, Clone)]
pub struct NewExecution {
    pub organization_id: i64,
    pub alert_id: i64,
    pub template_id: Option<i64>,
    pub started_at: DateTime<Utc>,
    pub started_by: i64,
}
