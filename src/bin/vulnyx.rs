//! Collects storage download links from the Vulnyx catalog, one manually
//! solved CAPTCHA per machine.

use std::path::PathBuf;

use anyhow::{Context, Result, anyhow};
use clap::Parser;
use tracing::info;
use vmcrawler::log_sink::{default_level, init_tracing};
use vmcrawler::{ConsoleSolver, LogSink, RateLimiter, VulnyxConfig, VulnyxCrawler};

/// Walk the Vulnyx catalog, prompting for each CAPTCHA, and save the links.
#[derive(Parser, Debug)]
#[command(name = "nyx-crawler")]
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

    /// Process this machine, then stop (repeatable)
    #[arg(long = "stop-at", value_name = "NAME")]
    stop_at: Vec<String>,

    /// File receiving the download links
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// File receiving a copy of the console log
    #[arg(long)]
    log_file: Option<PathBuf>,

    /// Save CAPTCHA images without opening an image viewer
    #[arg(long)]
    no_viewer: bool,

    #[arg(long)]
    base_url: Option<String>,
}

impl Args {
    fn crawl_config(&self) -> Result<VulnyxConfig> {
        let mut config = VulnyxConfig::load(self.config.as_deref())?;
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
        if self.no_viewer {
            config.open_viewer = false;
        }
        config.validate()?;
        Ok(config)
    }
}

fn main() -> Result<()> {
    let args = Args::parse();
    let config = args.crawl_config()?;

    let sink = LogSink::create(&config.log_path)
        .with_context(|| format!("failed to open log file {}", config.log_path.display()))?;
    init_tracing(sink, default_level(args.verbose, args.quiet)).map_err(|err| anyhow!(err))?;

    info!("Vulnyx Download Links Crawler (Manual CAPTCHA Mode)");
    info!("{}", "=".repeat(50));
    info!("NOTE: You will need to manually solve each CAPTCHA");
    info!("{}", "=".repeat(50));

    let log_path = config.log_path.clone();
    let solver = ConsoleSolver::new(
        &config.captcha_path,
        config.open_viewer,
        config.solution_length,
    );
    let crawler = VulnyxCrawler::new(config, Box::new(solver), RateLimiter::new())?;

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    let result = runtime.block_on(crawler.run());
    // A Ctrl-C during the CAPTCHA prompt leaves a thread blocked on stdin.
    runtime.shutdown_background();

    info!("Log saved to {}", log_path.display());
    result?;
    Ok(())
}
