//! Collaborator contracts supplied by the embedding application.

use async_trait::async_trait;

use crate::record::TaskRecord;

/// Produces the full set of task records before any worker starts. A
/// generation failure aborts the run before drivers are created.
#[async_trait]
pub trait TaskSource<I, O>: Send + Sync
where
    I: Send,
    O: Send,
{
    async fn generate(&self) -> anyhow::Result<Vec<TaskRecord<I, O>>>;
}

/// Receives finished records in completion order, exactly one per task.
#[async_trait]
pub trait ResultSink<I, O>: Send + Sync
where
    I: Send,
    O: Send,
{
    async fn accept(&self, record: TaskRecord<I, O>);
}

/// Run lifecycle callbacks and final reporting.
#[async_trait]
pub trait LifecycleHooks: Send + Sync {
    type Report: Send;

    /// An external stop was requested. Invoked by the embedder before it
    /// cancels the run's shutdown token.
    async fn on_stop_requested(&self);

    /// All workers have finished and the pool is drained. Called exactly
    /// once per run.
    async fn on_processing_stopped(&self);

    async fn build_report(&self) -> Self::Report;
}
