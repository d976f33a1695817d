//! One Chromium instance with a single working page.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::emulation::SetDeviceMetricsOverrideParams;
use chromiumoxide::cdp::browser_protocol::network::{Cookie, SetUserAgentOverrideParams};
use chromiumoxide::cdp::browser_protocol::page::CaptureScreenshotFormat;
use chromiumoxide::page::ScreenshotParams;
use chromiumoxide::{Browser, Element, Page};
use serde::de::DeserializeOwned;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use webharvest_core::{Driver, TaskId};

use crate::error::{BrowserError, Result};
use crate::options::BrowserOptions;

/// A pooled browser: the chromiumoxide handle, its event-handler task, and
/// the single page tasks work against.
pub struct CdpDriver {
    id: String,
    browser: Browser,
    page: Page,
    handler_task: JoinHandle<()>,
    options: BrowserOptions,
    bound: Option<TaskId>,
}

impl CdpDriver {
    pub(crate) fn new(
        id: String,
        browser: Browser,
        page: Page,
        handler_task: JoinHandle<()>,
        options: BrowserOptions,
    ) -> Self {
        Self {
            id,
            browser,
            page,
            handler_task,
            options,
            bound: None,
        }
    }

    /// Navigate the working page and wait for the navigation to settle.
    pub async fn goto(&self, url: &str) -> Result<()> {
        debug!(driver = %self.id, url, "Navigate");
        let timeout = Duration::from_millis(self.options.navigation_timeout_ms);
        tokio::time::timeout(timeout, self.page.goto(url))
            .await
            .map_err(|_| BrowserError::NavigationTimeout(timeout, url.to_string()))??;
        Ok(())
    }

    /// Evaluate a JS expression and return its value as raw JSON.
    pub async fn eval(&self, js: &str) -> Result<serde_json::Value> {
        let result = self.page.evaluate(js).await?;
        Ok(result.into_value()?)
    }

    /// Evaluate a JS expression into a typed value.
    pub async fn eval_as<T: DeserializeOwned>(&self, js: &str) -> Result<T> {
        let result = self.page.evaluate(js).await?;
        Ok(result.into_value()?)
    }

    /// Full HTML of the working page.
    pub async fn content(&self) -> Result<String> {
        Ok(self.page.content().await?)
    }

    /// Poll until `selector` matches, up to `timeout`.
    pub async fn wait_for_selector(&self, selector: &str, timeout: Duration) -> Result<Element> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if let Ok(element) = self.page.find_element(selector).await {
                return Ok(element);
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(BrowserError::SelectorTimeout(
                    timeout,
                    selector.to_string(),
                ));
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }

    /// Capture a full-page PNG, typically for failure diagnostics.
    pub async fn screenshot_to(&self, path: impl AsRef<Path>) -> Result<()> {
        let params = ScreenshotParams::builder()
            .format(CaptureScreenshotFormat::Png)
            .full_page(true)
            .build();
        self.page.save_screenshot(params, path).await?;
        Ok(())
    }

    /// Apply a random user agent and viewport to the working page.
    pub async fn randomize_fingerprint(&self) -> Result<()> {
        let user_agent = BrowserOptions::random_user_agent();
        let (width, height) = BrowserOptions::random_viewport();
        debug!(driver = %self.id, user_agent, width, height, "Randomizing fingerprint");

        self.page
            .set_user_agent(SetUserAgentOverrideParams::new(user_agent))
            .await?;
        let metrics = SetDeviceMetricsOverrideParams::builder()
            .width(width as i64)
            .height(height as i64)
            .device_scale_factor(1.0)
            .mobile(false)
            .build()
            .map_err(BrowserError::InvalidParams)?;
        self.page.execute(metrics).await?;
        Ok(())
    }

    /// Session cookies currently visible to the working page.
    pub async fn cookies(&self) -> Result<Vec<Cookie>> {
        Ok(self.page.get_cookies().await?)
    }

    /// The user agent the page is actually sending.
    pub async fn user_agent(&self) -> Result<String> {
        self.eval_as("navigator.userAgent").await
    }
}

#[async_trait]
impl Driver for CdpDriver {
    fn id(&self) -> &str {
        &self.id
    }

    fn bind(&mut self, task: TaskId) {
        self.bound = Some(task);
    }

    fn clear_binding(&mut self) {
        self.bound = None;
    }

    async fn close(&mut self) {
        if let Err(err) = self.browser.close().await {
            warn!(driver = %self.id, error = %err, "Browser close failed");
        }
        self.handler_task.abort();
        debug!(driver = %self.id, "Driver closed");
    }
}
