//! Integration tests for the harvester
//!
//! These tests use wiremock to stand in for the catalog site and exercise
//! the fetcher and the full harvest cycle end-to-end.

mod fetcher_tests;
mod harvest_tests;

use catalog_harvest::config::FetcherConfig;

/// Fetcher settings with millisecond delays so retries do not slow the suite
pub fn fast_fetcher_config(max_retries: u32) -> FetcherConfig {
    FetcherConfig {
        initial_delay: 1,
        min_delay: 1,
        max_delay: 5,
        backoff_multiplier: 2.0,
        max_retries,
        jitter_max: 0,
        ..FetcherConfig::default()
    }
}
