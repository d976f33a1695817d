//! Run orchestration: task generation, pool warm-up, bounded worker fan-out,
//! completion-order collection, and teardown.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use futures::stream::{FuturesUnordered, StreamExt};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::ScraperConfig;
use crate::contracts::{LifecycleHooks, ResultSink, TaskSource};
use crate::driver::{Driver, DriverFactory};
use crate::error::{HarvestError, Result};
use crate::machine::StateMachine;
use crate::pool::DriverPool;
use crate::record::{FailureKind, TaskId, TaskRecord, TaskStatus};
use crate::step::StepGraph;

/// Owns one scraping run end to end.
///
/// Shutdown is cooperative: the token returned by [`shutdown_token`] is
/// cancelled either by the embedder (external stop) or internally when a
/// task terminates `Critical`. Workers that observe the token still produce
/// a record, so the sink always sees exactly one record per generated task.
///
/// [`shutdown_token`]: Scheduler::shutdown_token
pub struct Scheduler<F, G, H, I, O> {
    config: ScraperConfig,
    factory: Arc<F>,
    graph: Arc<G>,
    source: Arc<dyn TaskSource<I, O>>,
    sink: Arc<dyn ResultSink<I, O>>,
    hooks: Arc<H>,
    shutdown: CancellationToken,
}

impl<F, G, H, I, O> Scheduler<F, G, H, I, O>
where
    F: DriverFactory,
    G: StepGraph<F::Driver, I, O> + 'static,
    H: LifecycleHooks,
    I: Clone + Send + 'static,
    O: Clone + Send + 'static,
{
    pub fn new(
        config: ScraperConfig,
        factory: Arc<F>,
        graph: Arc<G>,
        source: Arc<dyn TaskSource<I, O>>,
        sink: Arc<dyn ResultSink<I, O>>,
        hooks: Arc<H>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            factory,
            graph,
            source,
            sink,
            hooks,
            shutdown: CancellationToken::new(),
        })
    }

    /// Token cancelling this run. Embedders wire their stop signal (Ctrl-C,
    /// service shutdown) to it; cancelling mid-run lets in-flight steps
    /// finish and marks the remaining tasks `Cancelled`.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Execute the run and produce the hooks' report.
    ///
    /// Task generation failures abort before any driver is created. After
    /// scheduling starts, the run always gets to teardown: pool drain and
    /// `on_processing_stopped` happen no matter how the tasks ended.
    pub async fn run(self) -> Result<H::Report> {
        info!(run = %self.config.run_id, "Generating tasks");
        let records = self
            .source
            .generate()
            .await
            .map_err(HarvestError::TaskGeneration)?;
        info!(
            run = %self.config.run_id,
            tasks = records.len(),
            concurrency = self.config.concurrency,
            "Task generation complete"
        );

        let pool = DriverPool::new(self.config.concurrency);
        self.warm_pool(&pool).await;

        let semaphore = Arc::new(Semaphore::new(self.config.concurrency));
        let mut pending: HashMap<TaskId, TaskRecord<I, O>> = HashMap::new();
        let mut workers = FuturesUnordered::new();

        for record in records {
            let id = record.id;
            pending.insert(id, record.clone());
            let handle = tokio::spawn(run_worker(
                record,
                pool.clone(),
                Arc::clone(&self.graph),
                Arc::clone(&semaphore),
                self.config.acquire_timeout(),
                self.shutdown.clone(),
            ));
            workers.push(async move { (id, handle.await) });
        }

        while let Some((id, joined)) = workers.next().await {
            let record = match joined {
                Ok(record) => {
                    pending.remove(&id);
                    record
                }
                Err(err) => {
                    // The worker never returned its record; fall back to the
                    // snapshot taken at submission.
                    warn!(task = %id, error = %err, "Worker did not run to completion");
                    match pending.remove(&id) {
                        Some(mut record) => {
                            record.cancel();
                            record
                        }
                        None => continue,
                    }
                }
            };

            if record.status == TaskStatus::Critical {
                error!(
                    run = %self.config.run_id,
                    task = %record.id,
                    step = record.current_step.as_deref().unwrap_or("-"),
                    error = record.error.as_ref().map(|e| e.message.as_str()).unwrap_or("-"),
                    "Critical failure, cancelling remaining tasks"
                );
                self.shutdown.cancel();
            }
            self.sink.accept(record).await;
        }

        pool.drain(self.config.drain_timeout()).await;
        self.hooks.on_processing_stopped().await;
        info!(run = %self.config.run_id, "Processing stopped");
        Ok(self.hooks.build_report().await)
    }

    /// Start up to `concurrency` drivers concurrently. A slot that fails to
    /// start is skipped; the run proceeds with whatever came up.
    async fn warm_pool(&self, pool: &DriverPool<F::Driver>) {
        let creations = (0..self.config.concurrency).map(|_| self.factory.create());
        for result in join_all(creations).await {
            match result {
                Ok(driver) => {
                    pool.add(driver);
                }
                Err(err) => {
                    warn!(error = %err, "Driver start-up failed, continuing with a smaller pool");
                }
            }
        }
        info!(
            run = %self.config.run_id,
            ready = pool.population(),
            capacity = pool.capacity(),
            "Driver pool warmed"
        );
    }
}

/// One task from permit to terminal record. The pool guard guarantees the
/// driver goes back on every path out of this function.
async fn run_worker<D, G, I, O>(
    mut record: TaskRecord<I, O>,
    pool: DriverPool<D>,
    graph: Arc<G>,
    semaphore: Arc<Semaphore>,
    acquire_timeout: Duration,
    shutdown: CancellationToken,
) -> TaskRecord<I, O>
where
    D: Driver,
    G: StepGraph<D, I, O> + 'static,
    I: Send + 'static,
    O: Send + 'static,
{
    let permit = tokio::select! {
        _ = shutdown.cancelled() => {
            record.cancel();
            return record;
        }
        permit = semaphore.acquire_owned() => match permit {
            Ok(permit) => permit,
            Err(_) => {
                record.cancel();
                return record;
            }
        }
    };
    let _permit = permit;

    let mut driver = tokio::select! {
        _ = shutdown.cancelled() => {
            record.cancel();
            return record;
        }
        acquired = pool.acquire(acquire_timeout) => match acquired {
            Ok(guard) => guard,
            Err(err) => {
                record.fail(FailureKind::PoolExhausted, err.to_string());
                return record;
            }
        }
    };

    driver.bind(record.id);
    debug!(task = %record.id, driver = driver.id(), "Driver checked out");

    let machine = StateMachine::new(graph.initial_step());
    if let Err(err) = machine.run(&mut driver, &mut record, &shutdown).await {
        record.fail(err.kind(), err.to_string());
    }

    debug!(task = %record.id, status = ?record.status, "Task finished");
    record
}
