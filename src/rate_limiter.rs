use rand::Rng;
use serde::Deserialize;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::debug;

/// Longest single pause a config may ask for.
pub const MAX_DELAY_SECS: f64 = 3600.0;

/// Inclusive range of seconds to sleep between two requests.
/// `min == max` gives a fixed delay.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct DelayRange {
    pub min_secs: f64,
    pub max_secs: f64,
}

impl DelayRange {
    pub const ZERO: DelayRange = DelayRange::fixed(0.0);

    pub const fn fixed(secs: f64) -> Self {
        Self {
            min_secs: secs,
            max_secs: secs,
        }
    }

    pub const fn between(min_secs: f64, max_secs: f64) -> Self {
        Self { min_secs, max_secs }
    }

    pub fn is_valid(&self) -> bool {
        self.min_secs.is_finite()
            && self.max_secs.is_finite()
            && self.min_secs >= 0.0
            && self.min_secs <= self.max_secs
            && self.max_secs <= MAX_DELAY_SECS
    }

    /// Picks a delay uniformly inside the range.
    pub fn sample(&self) -> Duration {
        if !self.is_valid() {
            return Duration::ZERO;
        }
        let secs = if self.min_secs == self.max_secs {
            self.min_secs
        } else {
            rand::thread_rng().gen_range(self.min_secs..=self.max_secs)
        };
        Duration::try_from_secs_f64(secs).unwrap_or(Duration::ZERO)
    }
}

/// Sleeps between requests so the crawl stays under the sites' abuse
/// thresholds. A disabled limiter never sleeps.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    enabled: bool,
    history: Option<Arc<Mutex<Vec<Duration>>>>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self {
            enabled: true,
            history: None,
        }
    }

    pub fn disabled() -> Self {
        Self {
            enabled: false,
            history: None,
        }
    }

    /// Never sleeps, but remembers every delay it was asked for.
    /// Clones share the same history.
    pub fn recording() -> Self {
        Self {
            enabled: false,
            history: Some(Arc::new(Mutex::new(Vec::new()))),
        }
    }

    /// Delays requested so far, in order. Empty unless built with
    /// [`recording`](Self::recording).
    pub fn recorded(&self) -> Vec<Duration> {
        self.history
            .as_ref()
            .and_then(|history| history.lock().ok().map(|delays| delays.clone()))
            .unwrap_or_default()
    }

    /// Samples `range` and sleeps for it. Returns the delay that was chosen.
    pub async fn wait(&self, range: DelayRange) -> Duration {
        let delay = range.sample();
        self.sleep(delay).await;
        delay
    }

    pub async fn sleep(&self, delay: Duration) {
        if let Some(history) = &self.history
            && let Ok(mut delays) = history.lock()
        {
            delays.push(delay);
        }
        if !self.enabled || delay.is_zero() {
            return;
        }
        debug!(delay_ms = delay.as_millis() as u64, "pausing before next request");
        tokio::time::sleep(delay).await;
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}
