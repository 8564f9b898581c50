use std::io;
use std::path::PathBuf;
use thiserror::Error;

use crate::http_client::FetchError;

/// Conditions that end a run before or instead of producing output.
#[derive(Debug, Error)]
pub enum CrawlError {
    #[error("login failed")]
    LoginFailed,
    #[error("no machines found")]
    NoMachines,
    #[error("failed to write {path}: {source}")]
    Output {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error(transparent)]
    Setup(#[from] FetchError),
}

/// What a finished (or interrupted) crawl produced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CrawlSummary {
    /// Resolved download links in crawl order.
    pub links: Vec<String>,
    pub attempted: usize,
    pub failed: usize,
    /// Sentinel machine that ended the crawl, if any.
    pub stopped_at: Option<String>,
    pub interrupted: bool,
}
