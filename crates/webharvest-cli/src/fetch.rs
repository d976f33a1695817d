//! The built-in page-fetch flow: navigate to each URL, capture title and
//! HTML, and write the results to disk.

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use webharvest_browser::CdpDriver;
use webharvest_core::{
    retry, LifecycleHooks, ResultSink, RetryPolicy, Step, StepError, StepGraph, TaskRecord,
    TaskSource, TaskStatus, Transition,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageInput {
    pub url: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PageCapture {
    pub title: String,
    pub html: String,
}

/// Navigates to the task's URL, retrying transient failures locally.
struct NavigateStep {
    screenshot_dir: Option<PathBuf>,
}

#[async_trait]
impl Step<CdpDriver, PageInput, PageCapture> for NavigateStep {
    fn name(&self) -> &str {
        "navigate"
    }

    async fn run(
        &self,
        driver: &mut CdpDriver,
        record: &mut TaskRecord<PageInput, PageCapture>,
    ) -> Result<Transition<CdpDriver, PageInput, PageCapture>, StepError> {
        let policy = RetryPolicy::exponential(3, Duration::from_millis(500));
        let url = record.input.url.clone();
        let page: &CdpDriver = &*driver;
        retry(&policy, "navigate", || {
            let url = url.clone();
            async move { page.goto(&url).await.map_err(StepError::expected) }
        })
        .await?;

        Ok(Transition::Next(Box::new(CapturePageStep {
            screenshot_dir: self.screenshot_dir.clone(),
        })))
    }
}

/// Reads the loaded page back out of the browser.
struct CapturePageStep {
    screenshot_dir: Option<PathBuf>,
}

impl CapturePageStep {
    async fn capture(
        &self,
        driver: &CdpDriver,
        record: &mut TaskRecord<PageInput, PageCapture>,
    ) -> Result<(), StepError> {
        let title = driver
            .eval_as::<String>("document.title")
            .await
            .map_err(StepError::unexpected)?;
        let html = driver.content().await.map_err(StepError::unexpected)?;
        record.output = PageCapture { title, html };
        Ok(())
    }
}

#[async_trait]
impl Step<CdpDriver, PageInput, PageCapture> for CapturePageStep {
    fn name(&self) -> &str {
        "capture"
    }

    async fn run(
        &self,
        driver: &mut CdpDriver,
        record: &mut TaskRecord<PageInput, PageCapture>,
    ) -> Result<Transition<CdpDriver, PageInput, PageCapture>, StepError> {
        match self.capture(driver, record).await {
            Ok(()) => Ok(Transition::Finish(TaskStatus::Succeeded)),
            Err(err) => {
                if let Some(dir) = &self.screenshot_dir {
                    let path = dir.join(format!("{}.png", record.id));
                    match driver.screenshot_to(&path).await {
                        Ok(()) => {
                            info!(task = %record.id, path = %path.display(), "Failure screenshot saved")
                        }
                        Err(shot_err) => {
                            warn!(task = %record.id, error = %shot_err, "Failure screenshot could not be taken")
                        }
                    }
                }
                Err(err)
            }
        }
    }
}

pub struct PageGraph {
    screenshot_dir: Option<PathBuf>,
}

impl PageGraph {
    pub fn new(screenshot_dir: Option<PathBuf>) -> Self {
        Self { screenshot_dir }
    }
}

impl StepGraph<CdpDriver, PageInput, PageCapture> for PageGraph {
    fn initial_step(&self) -> Box<dyn Step<CdpDriver, PageInput, PageCapture>> {
        Box::new(NavigateStep {
            screenshot_dir: self.screenshot_dir.clone(),
        })
    }
}

pub struct UrlSource {
    urls: Vec<String>,
}

impl UrlSource {
    pub fn new(urls: Vec<String>) -> Self {
        Self { urls }
    }
}

#[async_trait]
impl TaskSource<PageInput, PageCapture> for UrlSource {
    async fn generate(&self) -> anyhow::Result<Vec<TaskRecord<PageInput, PageCapture>>> {
        if self.urls.is_empty() {
            anyhow::bail!("no URLs to fetch");
        }
        Ok(self
            .urls
            .iter()
            .map(|url| TaskRecord::new(PageInput { url: url.clone() }, PageCapture::default()))
            .collect())
    }
}

#[derive(Default)]
pub struct RunCounters {
    pub succeeded: AtomicUsize,
    pub failed: AtomicUsize,
    pub critical: AtomicUsize,
    pub cancelled: AtomicUsize,
}

/// Writes captured pages under the output directory, one file per task.
pub struct PageSink {
    out_dir: PathBuf,
    counters: Arc<RunCounters>,
}

impl PageSink {
    pub fn new(out_dir: PathBuf, counters: Arc<RunCounters>) -> Self {
        Self { out_dir, counters }
    }
}

#[async_trait]
impl ResultSink<PageInput, PageCapture> for PageSink {
    async fn accept(&self, record: TaskRecord<PageInput, PageCapture>) {
        match record.status {
            TaskStatus::Succeeded => {
                self.counters.succeeded.fetch_add(1, Ordering::SeqCst);
                let path = self.out_dir.join(format!("{}.html", record.id));
                match tokio::fs::write(&path, &record.output.html).await {
                    Ok(()) => info!(
                        task = %record.id,
                        url = %record.input.url,
                        title = %record.output.title,
                        path = %path.display(),
                        "Page captured"
                    ),
                    Err(err) => warn!(
                        task = %record.id,
                        error = %err,
                        "Captured page could not be written"
                    ),
                }
            }
            TaskStatus::Failed => {
                self.counters.failed.fetch_add(1, Ordering::SeqCst);
                warn!(
                    task = %record.id,
                    url = %record.input.url,
                    error = record.error.as_ref().map(|e| e.message.as_str()).unwrap_or("-"),
                    "Page fetch failed"
                );
            }
            TaskStatus::Critical => {
                self.counters.critical.fetch_add(1, Ordering::SeqCst);
                error!(
                    task = %record.id,
                    url = %record.input.url,
                    error = record.error.as_ref().map(|e| e.message.as_str()).unwrap_or("-"),
                    "Page fetch hit a critical failure"
                );
            }
            TaskStatus::Cancelled | TaskStatus::Initialized => {
                self.counters.cancelled.fetch_add(1, Ordering::SeqCst);
                info!(task = %record.id, url = %record.input.url, "Page fetch cancelled");
            }
        }
    }
}

#[derive(Debug, Serialize)]
pub struct RunReport {
    pub succeeded: usize,
    pub failed: usize,
    pub critical: usize,
    pub cancelled: usize,
}

pub struct SummaryHooks {
    counters: Arc<RunCounters>,
}

impl SummaryHooks {
    pub fn new(counters: Arc<RunCounters>) -> Self {
        Self { counters }
    }
}

#[async_trait]
impl LifecycleHooks for SummaryHooks {
    type Report = RunReport;

    async fn on_stop_requested(&self) {
        info!("Stop requested; in-flight steps will finish before workers wind down");
    }

    async fn on_processing_stopped(&self) {
        info!("All workers finished and the browser pool is drained");
    }

    async fn build_report(&self) -> RunReport {
        RunReport {
            succeeded: self.counters.succeeded.load(Ordering::SeqCst),
            failed: self.counters.failed.load(Ordering::SeqCst),
            critical: self.counters.critical.load(Ordering::SeqCst),
            cancelled: self.counters.cancelled.load(Ordering::SeqCst),
        }
    }
}
