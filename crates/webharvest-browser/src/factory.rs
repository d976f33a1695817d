//! Creates pooled drivers by launching Chromium or attaching to a running
//! instance over its debug port.

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::{Browser, BrowserConfig};
use futures::StreamExt;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use webharvest_core::{Driver, DriverFactory};

use crate::driver::CdpDriver;
use crate::options::BrowserOptions;

pub struct CdpDriverFactory {
    options: BrowserOptions,
    counter: AtomicUsize,
}

impl CdpDriverFactory {
    pub fn new(options: BrowserOptions) -> Self {
        Self {
            options,
            counter: AtomicUsize::new(0),
        }
    }

    async fn launch(&self) -> anyhow::Result<(Browser, JoinHandle<()>)> {
        let mut builder = BrowserConfig::builder().args(self.options.chrome_args());
        if self.options.headless {
            builder = builder.new_headless_mode();
        } else {
            builder = builder.with_head();
        }
        if let Some(path) = &self.options.chrome_path {
            builder = builder.chrome_executable(Path::new(path));
        }
        let config = builder
            .build()
            .map_err(|e| anyhow::anyhow!("browser config: {e}"))?;

        let (browser, handler) = Browser::launch(config).await?;
        Ok((browser, spawn_handler(handler)))
    }

    async fn connect(&self, port: u16) -> anyhow::Result<(Browser, JoinHandle<()>)> {
        let url = format!("http://localhost:{port}");
        info!(url = %url, "Attaching to running browser");
        let (browser, handler) = Browser::connect(&url).await?;
        Ok((browser, spawn_handler(handler)))
    }
}

fn spawn_handler(mut handler: chromiumoxide::Handler) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = handler.next().await {
            if event.is_err() {
                break;
            }
        }
    })
}

#[async_trait]
impl DriverFactory for CdpDriverFactory {
    type Driver = CdpDriver;

    async fn create(&self) -> anyhow::Result<CdpDriver> {
        let n = self.counter.fetch_add(1, Ordering::SeqCst);
        let id = format!("cdp-{n}");

        let (browser, handler_task) = match self.options.debug_port {
            Some(port) => self.connect(port).await?,
            None => self.launch().await?,
        };

        // Give the browser a moment to settle before opening pages.
        tokio::time::sleep(Duration::from_millis(300)).await;

        let page = browser.new_page("about:blank").await?;
        let driver = CdpDriver::new(id, browser, page, handler_task, self.options.clone());

        if self.options.randomize_fingerprint {
            driver.randomize_fingerprint().await?;
        }

        debug!(driver = driver.id(), "Driver ready");
        Ok(driver)
    }
}
