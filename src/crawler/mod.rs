//! Crawler module for catalog fetching and ingestion
//!
//! This module contains the network-facing side of the harvester:
//! - Adaptive, session-aware HTTP fetching with retry logic
//! - HTML parsing of listing and detail pages
//! - Harvest coordination (seeding, listing pass, re-scrape, image download)

mod coordinator;
mod fetcher;
mod parser;

pub use coordinator::{CrawlSummary, Harvester, ImageSummary, PageSummary};
pub use fetcher::{
    build_http_client, AdaptiveFetcher, FetchFailure, FetchResult, DEFAULT_USER_AGENT,
};
pub use parser::{CatalogParser, HtmlCatalogParser};

use crate::config::Config;

/// Runs the default harvest: seed, listing pass, then replacement merge
///
/// # Example
///
/// ```no_run
/// use catalog_harvest::config::load_config;
/// use catalog_harvest::crawler::harvest;
/// use std::path::Path;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = load_config(Path::new("harvest.toml"))?;
/// let summary = harvest(config).await?;
/// println!("{} pages completed", summary.completed);
/// # Ok(())
/// # }
/// ```
pub async fn harvest(config: Config) -> crate::Result<CrawlSummary> {
    let mut harvester = Harvester::new(config)?;
    harvester.seed()?;
    let summary = harvester.crawl_pending().await?;
    harvester.merge_replacements()?;
    Ok(summary)
}
