//! Step trait and transitions: the unit of work a task executes against a
//! checked-out driver.

use async_trait::async_trait;
use thiserror::Error;

use crate::record::{FailureKind, TaskRecord, TaskStatus};

/// Failure surfaced by a step. The variant is the step's own judgement of
/// severity; the scheduler escalates from it without inspecting the cause.
#[derive(Debug, Error)]
pub enum StepError {
    #[error("expected failure: {0}")]
    Expected(anyhow::Error),

    #[error("unexpected failure: {0}")]
    Unexpected(anyhow::Error),
}

impl StepError {
    pub fn expected(err: impl Into<anyhow::Error>) -> Self {
        Self::Expected(err.into())
    }

    pub fn unexpected(err: impl Into<anyhow::Error>) -> Self {
        Self::Unexpected(err.into())
    }

    pub fn kind(&self) -> FailureKind {
        match self {
            StepError::Expected(_) => FailureKind::Expected,
            StepError::Unexpected(_) => FailureKind::Unexpected,
        }
    }
}

/// What the machine should do after a step returns.
pub enum Transition<D, I, O> {
    /// Hand control to the next step.
    Next(Box<dyn Step<D, I, O>>),
    /// Terminate the task with the given status. Must be terminal.
    Finish(TaskStatus),
}

/// One stage of a task. Steps receive exclusive access to the driver for the
/// duration of their `run` call and may mutate the record's output and
/// scratch space freely.
#[async_trait]
pub trait Step<D, I, O>: Send + Sync
where
    D: Send,
    I: Send,
    O: Send,
{
    /// Stable name, recorded on the task for diagnostics.
    fn name(&self) -> &str;

    async fn run(
        &self,
        driver: &mut D,
        record: &mut TaskRecord<I, O>,
    ) -> Result<Transition<D, I, O>, StepError>;
}

/// Caller-supplied description of the step graph. The engine only ever asks
/// for the entry point; each step names its own successor.
pub trait StepGraph<D, I, O>: Send + Sync
where
    D: Send,
    I: Send,
    O: Send,
{
    fn initial_step(&self) -> Box<dyn Step<D, I, O>>;
}
