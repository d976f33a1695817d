//! Per-task record: identity, status, step position, payloads, and failure.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque task identity, stable for the lifetime of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskId(Uuid);

impl TaskId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Lifecycle status of a task. Every status except `Initialized` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Initialized,
    Succeeded,
    Failed,
    Critical,
    Cancelled,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TaskStatus::Initialized)
    }
}

/// How a failure should be escalated. `Expected` failures terminate only the
/// task that hit them; everything else is treated as a run-level problem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Expected,
    Unexpected,
    PoolExhausted,
}

/// Failure captured on a record. Present exactly when the status is
/// `Failed` or `Critical`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskError {
    pub kind: FailureKind,
    pub message: String,
}

/// State of a single scraping task as it moves through the step machine.
///
/// `input` is set by the task source and never mutated afterwards; `output`
/// and `scratch` belong to the steps. Exactly one worker owns a record at a
/// time, so mutation needs no synchronization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRecord<I, O> {
    pub id: TaskId,
    pub status: TaskStatus,
    pub current_step: Option<String>,
    pub input: I,
    pub output: O,
    pub error: Option<TaskError>,
    pub scratch: HashMap<String, serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl<I, O> TaskRecord<I, O> {
    pub fn new(input: I, output: O) -> Self {
        Self {
            id: TaskId::new(),
            status: TaskStatus::Initialized,
            current_step: None,
            input,
            output,
            error: None,
            scratch: HashMap::new(),
            created_at: Utc::now(),
            finished_at: None,
        }
    }

    pub fn succeed(&mut self) {
        self.finish(TaskStatus::Succeeded);
    }

    pub fn cancel(&mut self) {
        self.finish(TaskStatus::Cancelled);
    }

    /// Terminate the task with a failure. `Expected` maps to `Failed`;
    /// `Unexpected` and `PoolExhausted` escalate to `Critical`.
    pub fn fail(&mut self, kind: FailureKind, message: impl Into<String>) {
        self.error = Some(TaskError {
            kind,
            message: message.into(),
        });
        let status = match kind {
            FailureKind::Expected => TaskStatus::Failed,
            FailureKind::Unexpected | FailureKind::PoolExhausted => TaskStatus::Critical,
        };
        self.finish(status);
    }

    /// Move to a terminal status, backfilling a generic error when a failing
    /// status arrives without one.
    pub fn finish(&mut self, status: TaskStatus) {
        if matches!(status, TaskStatus::Failed | TaskStatus::Critical) && self.error.is_none() {
            self.error = Some(TaskError {
                kind: if status == TaskStatus::Failed {
                    FailureKind::Expected
                } else {
                    FailureKind::Unexpected
                },
                message: match &self.current_step {
                    Some(step) => format!("step '{step}' reported {status:?} without detail"),
                    None => format!("task reported {status:?} without detail"),
                },
            });
        }
        self.status = status;
        self.finished_at = Some(Utc::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_record_is_initialized() {
        let record = TaskRecord::new("in".to_string(), 0u32);
        assert_eq!(record.status, TaskStatus::Initialized);
        assert!(!record.status.is_terminal());
        assert!(record.error.is_none());
        assert!(record.finished_at.is_none());
    }

    #[test]
    fn expected_failure_maps_to_failed() {
        let mut record = TaskRecord::new((), ());
        record.fail(FailureKind::Expected, "page missing");
        assert_eq!(record.status, TaskStatus::Failed);
        let err = record.error.unwrap();
        assert_eq!(err.kind, FailureKind::Expected);
        assert_eq!(err.message, "page missing");
        assert!(record.finished_at.is_some());
    }

    #[test]
    fn unexpected_and_pool_failures_escalate_to_critical() {
        let mut record = TaskRecord::new((), ());
        record.fail(FailureKind::Unexpected, "protocol error");
        assert_eq!(record.status, TaskStatus::Critical);

        let mut record = TaskRecord::new((), ());
        record.fail(FailureKind::PoolExhausted, "no driver");
        assert_eq!(record.status, TaskStatus::Critical);
    }

    #[test]
    fn success_and_cancel_carry_no_error() {
        let mut record = TaskRecord::new((), ());
        record.succeed();
        assert_eq!(record.status, TaskStatus::Succeeded);
        assert!(record.error.is_none());

        let mut record = TaskRecord::new((), ());
        record.cancel();
        assert_eq!(record.status, TaskStatus::Cancelled);
        assert!(record.error.is_none());
    }

    #[test]
    fn failing_finish_without_error_backfills_one() {
        let mut record = TaskRecord::new((), ());
        record.current_step = Some("fetch".to_string());
        record.finish(TaskStatus::Failed);
        let err = record.error.unwrap();
        assert_eq!(err.kind, FailureKind::Expected);
        assert!(err.message.contains("fetch"));
    }
}
