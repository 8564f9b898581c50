//! Crawler for the authenticated catalog.
//!
//! Logs in, walks a fixed number of listing pages, and resolves each
//! machine's download button to its file-host URL. Links are written once,
//! after the crawl.

use reqwest::StatusCode;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::config::{Credentials, HmvConfig};
use crate::crawl::{CrawlError, CrawlSummary};
use crate::http_client::{FetchError, HttpClient};
use crate::machine::{MachineRef, StopRule};
use crate::parser::{parse_download_anchor, parse_machine_links};
use crate::rate_limiter::RateLimiter;
use crate::writer::LinkWriter;

const LOGIN_PATH: &str = "login/auth.php";
const DASHBOARD_MARKER: &str = "dashboard";
const SIGN_IN_MARKER: &str = "Sign in";

/// Which branch of the login heuristic decided the result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginOutcome {
    /// Redirected to the dashboard.
    Dashboard,
    /// A 200 page without the sign-in form.
    NoSignInMarker,
    Rejected,
}

impl LoginOutcome {
    pub fn is_success(self) -> bool {
        !matches!(self, LoginOutcome::Rejected)
    }
}

/// The site gives no explicit login result. A 200 without the sign-in
/// marker is accepted even though an unrelated page would also pass.
pub fn classify_login(final_url: &str, status: StatusCode, body: &str) -> LoginOutcome {
    if final_url.contains(DASHBOARD_MARKER) {
        LoginOutcome::Dashboard
    } else if !body.contains(SIGN_IN_MARKER) && status == StatusCode::OK {
        LoginOutcome::NoSignInMarker
    } else {
        LoginOutcome::Rejected
    }
}

pub struct HmvCrawler {
    client: HttpClient,
    config: HmvConfig,
    base: Url,
    stop_rule: StopRule,
    limiter: RateLimiter,
    writer: LinkWriter,
}

impl HmvCrawler {
    pub fn new(config: HmvConfig, limiter: RateLimiter) -> Result<Self, CrawlError> {
        let base = Url::parse(&config.base_url).map_err(FetchError::from)?;
        let client = HttpClient::new(&config.user_agent, &[])?;
        let stop_rule = StopRule::new(&config.stop_names);
        let writer = LinkWriter::new(&config.output_path);

        Ok(Self {
            client,
            config,
            base,
            stop_rule,
            limiter,
            writer,
        })
    }

    pub async fn login(&self, credentials: &Credentials) -> bool {
        match self.try_login(credentials).await {
            Ok(outcome) if outcome.is_success() => {
                debug!(?outcome, "login heuristic accepted response");
                info!("✓ Login successful");
                true
            }
            Ok(_) => {
                warn!("✗ Login failed");
                false
            }
            Err(err) => {
                warn!(error = %err, "✗ Login error");
                false
            }
        }
    }

    async fn try_login(&self, credentials: &Credentials) -> Result<LoginOutcome, FetchError> {
        let url = self.base.join(LOGIN_PATH)?;
        let form = [
            ("admin", credentials.username.as_str()),
            ("password_usuario", credentials.password()),
        ];
        let response = self.client.post_form(url.as_str(), &form, &[], true).await?;
        Ok(classify_login(
            response.final_url.as_str(),
            response.status,
            &response.body,
        ))
    }

    /// Machine page URLs on listing page `page`. Empty on any failure.
    pub async fn machine_links(&self, page: u32) -> Vec<String> {
        match self.try_machine_links(page).await {
            Ok(links) => links,
            Err(err) => {
                warn!(page, error = %err, "Error fetching page {page}");
                Vec::new()
            }
        }
    }

    async fn try_machine_links(&self, page: u32) -> Result<Vec<String>, FetchError> {
        let url = self.base.join(&format!("machines/?p={page}"))?;
        let html = self.client.fetch(url.as_str()).await?;
        Ok(parse_machine_links(&html, &self.base)?)
    }

    /// Target of the download button on a machine page.
    pub async fn download_anchor(&self, machine_url: &str) -> Option<String> {
        match self.try_download_anchor(machine_url).await {
            Ok(anchor) => anchor,
            Err(err) => {
                warn!(url = machine_url, error = %err, "Error fetching machine page");
                None
            }
        }
    }

    async fn try_download_anchor(&self, machine_url: &str) -> Result<Option<String>, FetchError> {
        let page = Url::parse(machine_url)?;
        let html = self.client.fetch(machine_url).await?;
        Ok(parse_download_anchor(&html, &page)?)
    }

    /// Follows the download URL's redirects; keeps the result only if it
    /// lands on the file host.
    pub async fn follow_redirect(&self, download_url: &str) -> Option<String> {
        match self.client.final_url(download_url).await {
            Ok(url) if url.as_str().contains(&self.config.file_host_marker) => Some(url.to_string()),
            Ok(url) => {
                debug!(url = %url, "redirect did not reach file host");
                None
            }
            Err(err) => {
                warn!(url = download_url, error = %err, "Error following redirect");
                None
            }
        }
    }

    pub async fn resolve(&self, machine: &MachineRef) -> Option<String> {
        let Some(download_url) = self.download_anchor(&machine.url).await else {
            warn!(machine = %machine.name, "  {} ✗ (no download link)", machine.name);
            return None;
        };

        self.limiter.wait(self.config.delays.before_redirect).await;

        match self.follow_redirect(&download_url).await {
            Some(link) => {
                info!(machine = %machine.name, "  {} ✓", machine.name);
                Some(link)
            }
            None => {
                warn!(
                    machine = %machine.name,
                    "  {} ✗ (no {} link)", machine.name, self.config.file_host_marker
                );
                None
            }
        }
    }

    /// Walks the listing pages until the page cap or a stop machine.
    pub async fn crawl(&self) -> CrawlSummary {
        let mut summary = CrawlSummary::default();

        'pages: for page in 1..=self.config.max_pages {
            info!(page, "Crawling page {page}...");
            let links = self.machine_links(page).await;

            if links.is_empty() {
                info!(page, "No machines found on page {page}.");
                continue;
            }
            info!(page, count = links.len(), "Found {} machines on page {page}", links.len());

            for url in links {
                let machine = MachineRef::from_catalog_url(url);

                if self.stop_rule.matches(&machine.name) {
                    info!(machine = %machine.name, "  {} ✓ (STOPPING)", machine.name);
                    summary.stopped_at = Some(machine.name);
                    break 'pages;
                }

                summary.attempted += 1;
                match self.resolve(&machine).await {
                    Some(link) => summary.links.push(link),
                    None => summary.failed += 1,
                }

                self.limiter.wait(self.config.delays.per_machine).await;
            }

            self.limiter.wait(self.config.delays.per_page).await;
        }

        summary
    }

    /// Login, crawl, then write every collected link.
    pub async fn run(&self, credentials: &Credentials) -> Result<CrawlSummary, CrawlError> {
        if !self.login(credentials).await {
            error!("Failed to login. Exiting.");
            return Err(CrawlError::LoginFailed);
        }

        let summary = self.crawl().await;
        if let Some(name) = &summary.stopped_at {
            info!(machine = %name, "Found '{name}' machine. Stopping crawl.");
        }

        info!(
            "Total {} links found: {}",
            self.config.file_host_marker,
            summary.links.len()
        );
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
