mod fetch;

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing::info;

use webharvest_browser::{BrowserOptions, CdpDriverFactory};
use webharvest_core::{LifecycleHooks, ResultSink, Scheduler, ScraperConfig, TaskSource};

use crate::fetch::{
    PageCapture, PageGraph, PageInput, PageSink, RunCounters, SummaryHooks, UrlSource,
};

#[derive(Parser)]
#[command(
    name = "webharvest",
    about = "Fetch a batch of pages through a pool of headless browsers",
    version
)]
struct Cli {
    /// URLs to fetch
    urls: Vec<String>,

    /// Run config file (JSON)
    #[arg(short, long)]
    config: Option<String>,

    /// Worker and browser concurrency override
    #[arg(long)]
    concurrency: Option<usize>,

    /// Attach to a running Chrome debug port instead of launching browsers
    #[arg(long)]
    debug_port: Option<u16>,

    /// Run browsers with a visible window
    #[arg(long)]
    headed: bool,

    /// Directory for captured pages and failure screenshots
    #[arg(short, long, default_value = "harvest-out")]
    out_dir: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .init();

    let mut config: ScraperConfig = match &cli.config {
        Some(path) => serde_json::from_str(&std::fs::read_to_string(path)?)?,
        None => ScraperConfig::default(),
    };
    if let Some(concurrency) = cli.concurrency {
        config.concurrency = concurrency;
    }

    std::fs::create_dir_all(&cli.out_dir)?;

    let options = BrowserOptions {
        headless: !cli.headed,
        debug_port: cli.debug_port,
        ..BrowserOptions::default()
    };

    let counters = Arc::new(RunCounters::default());
    let factory = Arc::new(CdpDriverFactory::new(options));
    let graph = Arc::new(PageGraph::new(Some(cli.out_dir.clone())));
    let source = Arc::new(UrlSource::new(cli.urls.clone()));
    let sink = Arc::new(PageSink::new(cli.out_dir.clone(), Arc::clone(&counters)));
    let hooks = Arc::new(SummaryHooks::new(counters));

    let scheduler = Scheduler::new(
        config,
        factory,
        graph,
        source as Arc<dyn TaskSource<PageInput, PageCapture>>,
        sink as Arc<dyn ResultSink<PageInput, PageCapture>>,
        Arc::clone(&hooks),
    )?;

    // Ctrl-C requests a cooperative stop: running steps finish, queued tasks
    // are marked cancelled, and teardown still runs.
    let token = scheduler.shutdown_token();
    let stop_hooks = Arc::clone(&hooks);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            stop_hooks.on_stop_requested().await;
            token.cancel();
        }
    });

    let report = scheduler.run().await?;
    info!(
        succeeded = report.succeeded,
        failed = report.failed,
        critical = report.critical,
        cancelled = report.cancelled,
        "Run complete"
    );

    if report.critical > 0 {
        std::process::exit(1);
    }
    Ok(())
}
