//! Core scheduling engine for webharvest: bounded driver pool, per-task step
//! state machine, and the run orchestrator that ties them together.

pub mod config;
pub mod contracts;
pub mod driver;
pub mod error;
pub mod machine;
pub mod pool;
pub mod record;
pub mod retry;
pub mod scheduler;
pub mod step;

pub use config::ScraperConfig;
pub use contracts::{LifecycleHooks, ResultSink, TaskSource};
pub use driver::{Driver, DriverFactory};
pub use error::{HarvestError, Result};
pub use machine::StateMachine;
pub use pool::{DriverPool, PooledDriver};
pub use record::{FailureKind, TaskError, TaskId, TaskRecord, TaskStatus};
pub use retry::{retry, Backoff, RetryPolicy};
pub use scheduler::Scheduler;
pub use step::{Step, StepError, StepGraph, Transition};
