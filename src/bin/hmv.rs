//! Collects file-host download links from the HackMyVM catalog.

use std::path::PathBuf;

use anyhow::{Context, Result, anyhow};
use clap::Parser;
use tracing::info;
use vmcrawler::log_sink::{default_level, init_tracing};
use vmcrawler::{Credentials, HmvConfig, HmvCrawler, LogSink, RateLimiter};

/// Log in to HackMyVM and save every machine's download link.
#[derive(Parser)]
#[command(name = "hmv-crawler")]
#[command(version, about)]
struct Args {
    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long)]
    quiet: bool,

    /// JSON file overriding the built-in settings
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long, env = "HMV_USERNAME")]
    username: String,

    #[arg(long, env = "HMV_PASSWORD", hide_env_values = true)]
    password: String,

    /// Number of listing pages to scan
    #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
    max_pages: Option<u32>,

    /// Stop the crawl when this machine is reached (repeatable)
    #[arg(long = "stop-at", value_name = "NAME")]
    stop_at: Vec<String>,

    /// File receiving the download links
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// File receiving a copy of the console log
    #[arg(long)]
    log_file: Option<PathBuf>,

    #[arg(long)]
    base_url: Option<String>,
}

impl Args {
    fn crawl_config(&self) -> Result<HmvConfig> {
        let mut config = HmvConfig::load(self.config.as_deref())?;
        if let Some(max_pages) = self.max_pages {
            config.max_pages = max_pages;
        }
        if !self.stop_at.is_empty() {
            config.stop_names = self.stop_at.clone();
        }
        if let Some(output) = &self.output {
            config.output_path = output.clone();
        }
        if let Some(log_file) = &self.log_file {
            config.log_path = log_file.clone();
        }
        if let Some(base_url) = &self.base_url {
            config.base_url = base_url.clone();
        }
        config.validate()?;
        Ok(config)
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = args.crawl_config()?;
    let credentials = Credentials::new(&args.username, &args.password);

    let sink = LogSink::create(&config.log_path)
        .with_context(|| format!("failed to open log file {}", config.log_path.display()))?;
    init_tracing(sink, default_level(args.verbose, args.quiet)).map_err(|err| anyhow!(err))?;

    info!("HackMyVM Download Links Crawler");
    info!("{}", "=".repeat(50));

    let log_path = config.log_path.clone();
    let crawler = HmvCrawler::new(config, RateLimiter::new())?;
    let result = crawler.run(&credentials).await;

    info!("Log saved to {}", log_path.display());
    result?;
    Ok(())
}
