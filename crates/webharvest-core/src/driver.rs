//! Driver abstraction: the pooled resource a task borrows for its lifetime.

use async_trait::async_trait;

use crate::record::TaskId;

/// A pooled automation resource (typically one browser instance). Drivers are
/// created by a [`DriverFactory`], live in the pool between tasks, and are
/// closed exactly once during drain.
#[async_trait]
pub trait Driver: Send + 'static {
    /// Stable identifier for log correlation.
    fn id(&self) -> &str;

    /// Record which task currently holds the driver. Diagnostic only.
    fn bind(&mut self, task: TaskId);

    /// Forget the binding. Called automatically when the driver returns to
    /// the pool.
    fn clear_binding(&mut self);

    /// Release underlying resources. Must tolerate being called on a driver
    /// whose session already died.
    async fn close(&mut self);
}

/// Creates drivers during pool warm-up. Each `create` call is independent;
/// one failing does not prevent the others from succeeding.
#[async_trait]
pub trait DriverFactory: Send + Sync + 'static {
    type Driver: Driver;

    async fn create(&self) -> anyhow::Result<Self::Driver>;
}
