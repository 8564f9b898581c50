//! Crawl settings for both catalogs.
//!
//! Defaults reproduce the values the crawlers were tuned with. A JSON file
//! may override any subset of fields; the binaries then apply CLI flags on
//! top.

use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::rate_limiter::DelayRange;

pub const HMV_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36";
pub const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid base URL {0:?}: {1}")]
    BaseUrl(String, url::ParseError),
    #[error("delay `{0}` must satisfy 0 <= min_secs <= max_secs")]
    InvalidDelay(&'static str),
    #[error("max_pages must be at least 1")]
    InvalidMaxPages,
    #[error("solution_length must be at least 1")]
    InvalidSolutionLength,
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct HmvDelays {
    pub before_redirect: DelayRange,
    pub per_machine: DelayRange,
    pub per_page: DelayRange,
}

impl Default for HmvDelays {
    fn default() -> Self {
        Self {
            before_redirect: DelayRange::fixed(0.5),
            per_machine: DelayRange::fixed(0.5),
            per_page: DelayRange::fixed(1.0),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HmvConfig {
    pub base_url: String,
    pub max_pages: u32,
    pub stop_names: Vec<String>,
    pub file_host_marker: String,
    pub output_path: PathBuf,
    pub log_path: PathBuf,
    pub user_agent: String,
    pub delays: HmvDelays,
}

impl Default for HmvConfig {
    fn default() -> Self {
        Self {
            base_url: "https://hackmyvm.eu".to_string(),
            max_pages: 5,
            stop_names: vec!["RealSaga".to_string()],
            file_host_marker: "mega.nz".to_string(),
            output_path: PathBuf::from("hmv_links.txt"),
            log_path: PathBuf::from("hmv_logs.txt"),
            user_agent: HMV_USER_AGENT.to_string(),
            delays: HmvDelays::default(),
        }
    }
}

impl HmvConfig {
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config: Self = match path {
            Some(path) => read_json(path)?,
            None => Self::default(),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        check_base_url(&self.base_url)?;
        if self.max_pages == 0 {
            return Err(ConfigError::InvalidMaxPages);
        }
        check_delay("before_redirect", self.delays.before_redirect)?;
        check_delay("per_machine", self.delays.per_machine)?;
        check_delay("per_page", self.delays.per_page)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct VulnyxDelays {
    pub before_page: DelayRange,
    pub after_page: DelayRange,
    pub before_captcha: DelayRange,
    pub captcha_fetch: DelayRange,
    pub after_captcha: DelayRange,
    pub before_submit: DelayRange,
    pub between_machines: DelayRange,
}

impl Default for VulnyxDelays {
    fn default() -> Self {
        Self {
            before_page: DelayRange::between(8.0, 12.0),
            after_page: DelayRange::between(6.0, 10.0),
            before_captcha: DelayRange::between(6.0, 10.0),
            captcha_fetch: DelayRange::between(4.0, 7.0),
            after_captcha: DelayRange::between(4.0, 7.0),
            before_submit: DelayRange::between(6.0, 10.0),
            between_machines: DelayRange::between(90.0, 120.0),
        }
    }
}

impl VulnyxDelays {
    fn named(&self) -> [(&'static str, DelayRange); 7] {
        [
            ("before_page", self.before_page),
            ("after_page", self.after_page),
            ("before_captcha", self.before_captcha),
            ("captcha_fetch", self.captcha_fetch),
            ("after_captcha", self.after_captcha),
            ("before_submit", self.before_submit),
            ("between_machines", self.between_machines),
        ]
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct VulnyxConfig {
    pub base_url: String,
    pub stop_names: Vec<String>,
    pub storage_markers: Vec<String>,
    pub output_path: PathBuf,
    pub log_path: PathBuf,
    pub captcha_path: PathBuf,
    pub solution_length: usize,
    pub open_viewer: bool,
    pub user_agent: String,
    pub delays: VulnyxDelays,
}

impl Default for VulnyxConfig {
    fn default() -> Self {
        Self {
            base_url: "https://vulnyx.com".to_string(),
            stop_names: vec!["Memory".to_string()],
            storage_markers: vec!["proton.me".to_string(), "drive.proton".to_string()],
            output_path: PathBuf::from("nyx_output.txt"),
            log_path: PathBuf::from("nyx_logs.txt"),
            captcha_path: PathBuf::from("temp_captcha.png"),
            solution_length: 5,
            open_viewer: true,
            user_agent: BROWSER_USER_AGENT.to_string(),
            delays: VulnyxDelays::default(),
        }
    }
}

impl VulnyxConfig {
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config: Self = match path {
            Some(path) => read_json(path)?,
            None => Self::default(),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        check_base_url(&self.base_url)?;
        if self.solution_length == 0 {
            return Err(ConfigError::InvalidSolutionLength);
        }
        for (name, range) in self.delays.named() {
            check_delay(name, range)?;
        }
        Ok(())
    }
}

/// Login for the authenticated catalog. `Debug` never prints the password.
#[derive(Clone)]
pub struct Credentials {
    pub username: String,
    password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    pub fn password(&self) -> &str {
        &self.password
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(serde_json::from_str(&raw)?)
}

fn check_base_url(base_url: &str) -> Result<(), ConfigError> {
    url::Url::parse(base_url)
        .map(|_| ())
        .map_err(|err| ConfigError::BaseUrl(base_url.to_string(), err))
}

fn check_delay(name: &'static str, range: DelayRange) -> Result<(), ConfigError> {
    if range.is_valid() {
        Ok(())
    } else {
        Err(ConfigError::InvalidDelay(name))
    }
}
