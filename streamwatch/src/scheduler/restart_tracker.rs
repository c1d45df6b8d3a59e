//! Restart backoff for faulted host workers.
//!
//! A worker that fails a reconciliation pass stops itself. The supervisor
//! records the fault here and asks whether the host may be resubscribed yet.
//!
//! # Backoff Algorithm
//!
//! - First 3 faults within the failure window: no backoff (resubscribe on the next pass)
//! - After that: backoff = base * 2^(faults - 3)
//! - Backoff is capped at max_backoff
//! - Faults older than the failure window are forgotten

use std::collections::HashMap;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info};

/// Default base backoff duration.
pub const DEFAULT_BASE_BACKOFF: Duration = Duration::from_secs(30);

/// Default maximum backoff duration.
pub const DEFAULT_MAX_BACKOFF: Duration = Duration::from_secs(600);

/// Default failure window.
pub const DEFAULT_FAILURE_WINDOW: Duration = Duration::from_secs(600);

/// Default number of faults tolerated before backing off.
pub const DEFAULT_FAILURE_THRESHOLD: usize = 3;

/// Maximum exponent to prevent overflow.
const MAX_EXPONENT: u32 = 10;

/// Configuration for the restart tracker.
#[derive(Debug, Clone)]
pub struct RestartTrackerConfig {
    pub base_backoff: Duration,
    pub max_backoff: Duration,
    /// Window for counting faults.
    pub failure_window: Duration,
    /// Number of faults before applying backoff.
    pub failure_threshold: usize,
}

impl Default for RestartTrackerConfig {
    fn default() -> Self {
        Self {
            base_backoff: DEFAULT_BASE_BACKOFF,
            max_backoff: DEFAULT_MAX_BACKOFF,
            failure_window: DEFAULT_FAILURE_WINDOW,
            failure_threshold: DEFAULT_FAILURE_THRESHOLD,
        }
    }
}

#[derive(Debug, Default)]
struct FaultHistory {
    faults: Vec<Instant>,
    /// Earliest time the host may be resubscribed.
    not_before: Option<Instant>,
}

/// Tracks worker faults per host URL.
#[derive(Debug, Default)]
pub struct RestartTracker {
    history: HashMap<String, FaultHistory>,
    config: RestartTrackerConfig,
}

impl RestartTracker {
    pub fn new() -> Self {
        Self::with_config(RestartTrackerConfig::default())
    }

    pub fn with_config(config: RestartTrackerConfig) -> Self {
        Self {
            history: HashMap::new(),
            config,
        }
    }

    /// Record a worker fault and return the backoff before resubscribing.
    pub fn record_fault(&mut self, host_url: &str) -> Duration {
        let now = Instant::now();
        let window = self.config.failure_window;
        let history = self.history.entry(host_url.to_string()).or_default();

        history.faults.retain(|&t| now.duration_since(t) < window);
        history.faults.push(now);
        let faults = history.faults.len();

        let backoff = calculate_backoff(&self.config, faults);
        history.not_before = Some(now + backoff);

        if backoff.is_zero() {
            debug!(
                "Worker for {} faulted ({} times in window), resubscribing",
                host_url, faults
            );
        } else {
            info!(
                "Worker for {} faulted ({} times in window), backoff: {:?}",
                host_url, faults, backoff
            );
        }

        backoff
    }

    /// Time left before `host_url` may be resubscribed.
    pub fn remaining_backoff(&self, host_url: &str) -> Duration {
        self.history
            .get(host_url)
            .and_then(|h| h.not_before)
            .map(|t| t.saturating_duration_since(Instant::now()))
            .unwrap_or(Duration::ZERO)
    }

    /// Whether `host_url` may be resubscribed now.
    pub fn may_restart(&self, host_url: &str) -> bool {
        self.remaining_backoff(host_url).is_zero()
    }

    /// Number of faults within the failure window.
    pub fn recent_faults(&self, host_url: &str) -> usize {
        let now = Instant::now();
        self.history
            .get(host_url)
            .map(|h| {
                h.faults
                    .iter()
                    .filter(|&&t| now.duration_since(t) < self.config.failure_window)
                    .count()
            })
            .unwrap_or(0)
    }

    /// Drop the history of a host that left the registry.
    pub fn forget(&mut self, host_url: &str) {
        self.history.remove(host_url);
    }
}

/// base * 2^(faults - threshold) once the threshold is reached.
fn calculate_backoff(config: &RestartTrackerConfig, faults: usize) -> Duration {
    if faults < config.failure_threshold {
        return Duration::ZERO;
    }

    let exponent = (faults - config.failure_threshold).min(MAX_EXPONENT as usize) as u32;
    let multiplier = 2u32.saturating_pow(exponent);
    config
        .base_backoff
        .saturating_mul(multiplier)
        .min(config.max_backoff)
}
