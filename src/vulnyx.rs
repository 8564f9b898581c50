//! Crawler for the CAPTCHA-gated catalog.
//!
//! Every machine page hides its download link behind an image CAPTCHA that
//! a [`CaptchaSolver`] answers. Requests are spaced out by several seconds
//! each, and the output file is rewritten after every machine so an
//! interrupted run keeps what it already resolved.

use std::future::Future;

use reqwest::StatusCode;
use thiserror::Error;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::captcha::{normalize_solution, CaptchaError, CaptchaSolver};
use crate::config::VulnyxConfig;
use crate::crawl::{CrawlError, CrawlSummary};
use crate::http_client::{FetchError, FormResponse, HttpClient};
use crate::machine::{MachineRef, StopRule};
use crate::parser::{
    contains_any, find_captcha_image, find_storage_link, normalize_image_src, parse_machine_names,
};
use crate::rate_limiter::RateLimiter;
use crate::writer::LinkWriter;

const BROWSER_HEADERS: [(&str, &str); 2] = [
    (
        "Accept",
        "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8",
    ),
    ("Accept-Language", "en-US,en;q=0.5"),
];

/// Why a single machine produced no link. Only logged; the crawl moves on.
#[derive(Debug, Error)]
pub enum ResolveFailure {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error("No CAPTCHA image found")]
    NoCaptchaImage,
    #[error("CAPTCHA image has no src")]
    MissingImageSrc,
    #[error(transparent)]
    Captcha(#[from] CaptchaError),
    #[error("Unexpected redirect to: {0}")]
    UnexpectedRedirect(String),
    #[error("No storage link found (wrong CAPTCHA?)")]
    NoStorageLink,
}

impl From<lol_html::errors::RewritingError> for ResolveFailure {
    fn from(err: lol_html::errors::RewritingError) -> Self {
        ResolveFailure::Fetch(FetchError::from(err))
    }
}

/// Reads the storage link out of the CAPTCHA form response. A 302 must
/// point at the storage host; anything else is searched for a link.
pub fn extract_storage_link(
    response: &FormResponse,
    markers: &[String],
) -> Result<String, ResolveFailure> {
    if response.status == StatusCode::FOUND {
        let location = response.location.clone().unwrap_or_default();
        return if contains_any(&location, markers) {
            Ok(location)
        } else {
            Err(ResolveFailure::UnexpectedRedirect(location))
        };
    }

    find_storage_link(&response.body, markers)?.ok_or(ResolveFailure::NoStorageLink)
}

pub struct VulnyxCrawler {
    client: HttpClient,
    config: VulnyxConfig,
    base: Url,
    origin: String,
    stop_rule: StopRule,
    limiter: RateLimiter,
    writer: LinkWriter,
    solver: Box<dyn CaptchaSolver>,
}

impl VulnyxCrawler {
    pub fn new(
        config: VulnyxConfig,
        solver: Box<dyn CaptchaSolver>,
        limiter: RateLimiter,
    ) -> Result<Self, CrawlError> {
        let base = Url::parse(&config.base_url).map_err(FetchError::from)?;
        let origin = base.origin().ascii_serialization();
        let client = HttpClient::new(&config.user_agent, &BROWSER_HEADERS)?;
        let stop_rule = StopRule::new(&config.stop_names);
        let writer = LinkWriter::new(&config.output_path);

        Ok(Self {
            client,
            config,
            base,
            origin,
            stop_rule,
            limiter,
            writer,
            solver,
        })
    }

    /// Names listed in the index table, in page order. Empty on any failure.
    pub async fn machine_names(&self) -> Vec<String> {
        match self.try_machine_names().await {
            Ok(Some(names)) => names,
            Ok(None) => {
                error!("Error: vm-table not found");
                Vec::new()
            }
            Err(err) => {
                error!(error = %err, "Error fetching main page");
                Vec::new()
            }
        }
    }

    async fn try_machine_names(&self) -> Result<Option<Vec<String>>, FetchError> {
        let html = self.client.fetch(self.base.as_str()).await?;
        Ok(parse_machine_names(&html)?)
    }

    pub fn machine(&self, name: &str) -> MachineRef {
        let url = match self.base.join(&format!("vm/{name}/")) {
            Ok(url) => url.to_string(),
            Err(_) => format!("{}/vm/{name}/", self.origin),
        };
        MachineRef {
            name: name.to_string(),
            url,
        }
    }

    /// Resolves one machine to its storage link, or `None` after logging why.
    pub async fn download_link(&self, name: &str) -> Option<String> {
        let machine = self.machine(name);
        match self.try_download_link(&machine).await {
            Ok(link) => Some(link),
            Err(err) => {
                warn!(machine = %machine.name, "    ✗ {err}");
                None
            }
        }
    }

    async fn try_download_link(&self, machine: &MachineRef) -> Result<String, ResolveFailure> {
        let delays = self.config.delays;

        self.limiter.wait(delays.before_page).await;
        let html = self.client.fetch(&machine.url).await?;
        self.limiter.wait(delays.after_page).await;

        let image = find_captcha_image(&html)?.ok_or(ResolveFailure::NoCaptchaImage)?;
        let src = image.src.ok_or(ResolveFailure::MissingImageSrc)?;
        let captcha_url = normalize_image_src(&src, &self.origin);
        debug!(tier = ?image.tier, url = %captcha_url, "CAPTCHA image located");

        self.limiter.wait(delays.before_captcha).await;
        self.limiter.wait(delays.captcha_fetch).await;
        let image_bytes = self.client.fetch_bytes(&captcha_url).await?;
        self.limiter.wait(delays.after_captcha).await;

        let answer = self.solver.solve(&image_bytes).await?;
        let solution = normalize_solution(&answer, self.config.solution_length)?;
        info!(machine = %machine.name, "    Using CAPTCHA: {solution}");

        self.limiter.wait(delays.before_submit).await;
        let response = self
            .client
            .post_form(
                &machine.url,
                &[("captcha", solution.as_str())],
                &[("Referer", machine.url.as_str()), ("Origin", self.origin.as_str())],
                false,
            )
            .await?;

        extract_storage_link(&response, &self.config.storage_markers)
    }

    /// Processes one machine and saves progress. Returns `false` once the
    /// crawl must stop.
    async fn step(
        &self,
        index: usize,
        total: usize,
        name: &str,
        summary: &mut CrawlSummary,
    ) -> bool {
        info!(machine = name, "[{index}/{total}] Processing: {name}");

        let is_last = self.stop_rule.matches(name);
        if is_last {
            info!(machine = name, "  Found '{name}' machine - this is the last one. Stopping after this.");
        }

        summary.attempted += 1;
        match self.download_link(name).await {
            Some(link) => {
                info!(machine = name, "  ✓ {link}");
                summary.links.push(link);
            }
            None => {
                warn!(machine = name, "  ✗ Failed");
                summary.failed += 1;
            }
        }

        if let Err(err) = self.writer.save(&summary.links) {
            error!(path = %self.writer.path().display(), error = %err, "failed to save progress");
        }

        if is_last {
            info!(machine = name, "Stopping at {name} machine as requested.");
            summary.stopped_at = Some(name.to_string());
            return false;
        }

        if index < total {
            let wait = self.config.delays.between_machines.sample();
            info!("  Waiting {} seconds before next machine...", wait.as_secs());
            self.limiter.sleep(wait).await;
        }

        true
    }

    /// Crawls until a stop machine, the end of the list, or Ctrl-C.
    pub async fn run(&self) -> Result<CrawlSummary, CrawlError> {
        self.run_until(tokio::signal::ctrl_c()).await
    }

    /// Like [`run`](Self::run) but stops early when `interrupt` completes.
    /// The machine in flight at that moment is abandoned.
    pub async fn run_until<F: Future>(&self, interrupt: F) -> Result<CrawlSummary, CrawlError> {
        info!("Fetching machine list...");
        let names = self.machine_names().await;

        if names.is_empty() {
            error!("No machines found. Exiting.");
            return Err(CrawlError::NoMachines);
        }

        info!("Found {} machines", names.len());
        info!("Starting crawl. Press Ctrl+C to stop and save progress.");

        let mut summary = CrawlSummary::default();
        let total = names.len();
        tokio::pin!(interrupt);

        for (i, name) in names.iter().enumerate() {
            let outcome = tokio::select! {
                _ = &mut interrupt => None,
                keep_going = self.step(i + 1, total, name, &mut summary) => Some(keep_going),
            };

            match outcome {
                Some(true) => continue,
                Some(false) => break,
                None => {
                    warn!("Interrupted by user. Saving progress...");
                    summary.interrupted = true;
                    break;
                }
            }
        }

        info!("Total download links found: {}", summary.links.len());
        self.writer
            .save(&summary.links)
            .map_err(|source| CrawlError::Output {
                path: self.writer.path().to_path_buf(),
                source,
            })?;
        info!("Download links saved to {}", self.writer.path().display());

        Ok(summary)
    }
}
