use crate::config::FetcherConfig;
use std::time::{Duration, Instant};

/// Quiet period after the last failure before the delay snaps back to its initial value
pub const DELAY_RESET_INTERVAL: Duration = Duration::from_secs(60);

/// Factor applied to the delay after each successful request
pub const SUCCESS_DECAY: f64 = 0.85;

/// Adaptive per-fetcher request delay
///
/// The delay shrinks on success, grows on rate-limit and network failures,
/// and is always kept within `[min_delay, max_delay]`. All time-dependent
/// methods take `now` so callers (and tests) control the clock.
#[derive(Debug, Clone)]
pub struct DelayController {
    initial_delay_ms: f64,
    min_delay_ms: f64,
    max_delay_ms: f64,
    backoff_multiplier: f64,

    current_delay_ms: f64,
    last_error_time: Option<Instant>,
    last_request_time: Option<Instant>,

    failure_count: u64,
    success_count: u64,
}

impl DelayController {
    /// Creates a controller starting at the configured initial delay
    pub fn new(config: &FetcherConfig) -> Self {
        let min_delay_ms = config.min_delay as f64;
        let max_delay_ms = (config.max_delay as f64).max(min_delay_ms);
        let initial_delay_ms = (config.initial_delay as f64).clamp(min_delay_ms, max_delay_ms);

        Self {
            initial_delay_ms,
            min_delay_ms,
            max_delay_ms,
            backoff_multiplier: config.backoff_multiplier,
            current_delay_ms: initial_delay_ms,
            last_error_time: None,
            last_request_time: None,
            failure_count: 0,
            success_count: 0,
        }
    }

    /// Decays the delay toward `min_delay`
    pub fn on_success(&mut self) {
        self.current_delay_ms = (self.current_delay_ms * SUCCESS_DECAY).max(self.min_delay_ms);
        self.success_count += 1;
    }

    /// Grows the delay toward `max_delay` and records the failure time
    pub fn on_failure(&mut self, now: Instant) {
        self.current_delay_ms = (self.current_delay_ms * self.backoff_multiplier).min(self.max_delay_ms);
        self.last_error_time = Some(now);
        self.failure_count += 1;
        tracing::info!(
            "Rate limit hit, increasing delay to {}ms",
            self.current_delay().as_millis()
        );
    }

    /// Resets an elevated delay once no failure has happened for [`DELAY_RESET_INTERVAL`]
    ///
    /// Returns true if the error window was cleared.
    pub fn maybe_reset(&mut self, now: Instant) -> bool {
        let Some(last_error) = self.last_error_time else {
            return false;
        };

        if now.saturating_duration_since(last_error) <= DELAY_RESET_INTERVAL {
            return false;
        }

        if self.current_delay_ms > self.initial_delay_ms {
            tracing::info!(
                "No errors for {}s, resetting delay from {}ms to {}ms",
                DELAY_RESET_INTERVAL.as_secs(),
                self.current_delay().as_millis(),
                self.initial_delay().as_millis()
            );
            self.current_delay_ms = self.initial_delay_ms;
        }
        self.last_error_time = None;
        true
    }

    /// Records that a request was issued at `now`
    pub fn record_request(&mut self, now: Instant) {
        self.last_request_time = Some(now);
    }

    /// Calculates how long the rate gate must still be held closed
    ///
    /// Returns None if a request can be made now.
    pub fn time_until_next_request(&self, now: Instant) -> Option<Duration> {
        let last = self.last_request_time?;
        let elapsed = now.saturating_duration_since(last);
        let delay = self.current_delay();
        if elapsed < delay {
            Some(delay - elapsed)
        } else {
            None
        }
    }

    pub fn current_delay(&self) -> Duration {
        millis_to_duration(self.current_delay_ms)
    }

    pub fn initial_delay(&self) -> Duration {
        millis_to_duration(self.initial_delay_ms)
    }

    pub fn last_error_time(&self) -> Option<Instant> {
        self.last_error_time
    }

    /// Number of failures recorded over the controller's lifetime
    pub fn failure_count(&self) -> u64 {
        self.failure_count
    }

    /// Number of successes recorded over the controller's lifetime
    pub fn success_count(&self) -> u64 {
        self.success_count
    }
}

fn millis_to_duration(ms: f64) -> Duration {
    Duration::from_micros((ms * 1000.0).round() as u64)
}
