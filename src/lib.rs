//! Download-link crawlers for two virtual-machine catalogs.
//!
//! - [`hmv`] logs into an authenticated catalog and follows each machine's
//!   download redirect to the file host.
//! - [`vulnyx`] walks a CAPTCHA-gated catalog, handing every CAPTCHA to a
//!   [`captcha::CaptchaSolver`].
//!
//! Both write plain-text link lists and mirror their console output into a
//! log file through [`log_sink::LogSink`].

pub mod captcha;
pub mod config;
pub mod crawl;
pub mod hmv;
pub mod http_client;
pub mod log_sink;
pub mod machine;
pub mod parser;
pub mod rate_limiter;
pub mod vulnyx;
pub mod writer;

pub use captcha::{CaptchaError, CaptchaSolver, ConsoleSolver};
pub use config::{ConfigError, Credentials, HmvConfig, VulnyxConfig};
pub use crawl::{CrawlError, CrawlSummary};
pub use hmv::{HmvCrawler, LoginOutcome};
pub use http_client::{FetchError, HttpClient};
pub use log_sink::LogSink;
pub use machine::{MachineRef, StopRule};
pub use rate_limiter::{DelayRange, RateLimiter};
pub use vulnyx::VulnyxCrawler;
pub use writer::LinkWriter;
