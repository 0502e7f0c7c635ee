//! Harvest coordination
//!
//! The [`Harvester`] owns the one fetcher, the store and the URL layout, and
//! drives every pass that touches the network:
//! - Seeding the progress ledger
//! - The listing pass over pending and failed URLs
//! - Re-scraping completed listing pages
//! - Diagram image download
//!
//! Page ingestion turns one listing page (and the detail pages it links to)
//! into group, subgroup, diagram and part rows.

use crate::catalog::{
    humanize_slug, safe_file_stem, CatalogNameCleaner, Diagram, Group, NameNormalizer, Part,
    Section, Subgroup,
};
use crate::config::Config;
use crate::consolidate::{self, image_path_for, ConsolidationReport, ReplacementReport};
use crate::crawler::{AdaptiveFetcher, CatalogParser, FetchResult, HtmlCatalogParser};
use crate::storage::{SqliteStorage, Storage};
use crate::tags::{self, TagReport};
use crate::url::{image_extension, CatalogLayout, ListingPath};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use url::Url;

/// Outcome of a listing or re-scrape pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CrawlSummary {
    pub attempted: usize,
    pub completed: usize,
    pub failed: usize,
    pub parts_inserted: usize,
}

/// Outcome of ingesting one listing page
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageSummary {
    pub sections: usize,
    pub diagrams: usize,
    pub detail_pages_fetched: usize,
    pub detail_pages_skipped: usize,
    pub detail_pages_failed: usize,
    pub parts_inserted: usize,
}

/// Outcome of an image download pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImageSummary {
    pub downloaded: usize,
    /// Diagrams pointed at a file that was already on disk
    pub reused: usize,
    pub failed: usize,
}

/// Where a detail page's parts are filed
struct DetailTarget {
    detail_page_id: String,
    subgroup_id: String,
    diagram_id: String,
}

/// Drives crawling, ingestion and the post-processing passes for one catalog
pub struct Harvester {
    config: Config,
    layout: CatalogLayout,
    storage: SqliteStorage,
    fetcher: AdaptiveFetcher,
    parser: Box<dyn CatalogParser>,
    names: Box<dyn NameNormalizer>,
}

impl Harvester {
    /// Opens the configured database and builds the fetcher
    pub fn new(config: Config) -> crate::Result<Self> {
        let storage = SqliteStorage::new(Path::new(&config.output.database_path))?;
        Self::with_storage(config, storage)
    }

    /// Builds a harvester around an already opened store
    pub fn with_storage(config: Config, storage: SqliteStorage) -> crate::Result<Self> {
        let layout = CatalogLayout::from_config(&config.catalog)?;
        let fetcher = AdaptiveFetcher::new(&config.fetcher)?;
        let names = CatalogNameCleaner::from_config(&config.names);

        Ok(Self {
            config,
            layout,
            storage,
            fetcher,
            parser: Box::new(HtmlCatalogParser),
            names: Box::new(names),
        })
    }

    /// Replaces the page parser
    pub fn with_parser(mut self, parser: Box<dyn CatalogParser>) -> Self {
        self.parser = parser;
        self
    }

    /// Replaces the name normalizer
    pub fn with_name_normalizer(mut self, names: Box<dyn NameNormalizer>) -> Self {
        self.names = names;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn layout(&self) -> &CatalogLayout {
        &self.layout
    }

    pub fn storage(&self) -> &SqliteStorage {
        &self.storage
    }

    pub fn storage_mut(&mut self) -> &mut SqliteStorage {
        &mut self.storage
    }

    pub fn fetcher(&self) -> &AdaptiveFetcher {
        &self.fetcher
    }

    /// Marks every configured seed URL pending; returns how many were new
    pub fn seed(&mut self) -> crate::Result<usize> {
        let mut added = 0;
        for seed in &self.config.catalog.seeds {
            if !self.layout.is_listing(seed) {
                tracing::warn!("Seed {} is not a listing page of this catalog; skipping", seed);
                continue;
            }
            if self.storage.mark_pending(seed)? {
                added += 1;
            }
        }

        tracing::info!(
            "Seeded {} new URLs ({} configured)",
            added,
            self.config.catalog.seeds.len()
        );
        Ok(added)
    }

    /// Moves every failed URL back to pending
    pub fn reset_failed(&mut self) -> crate::Result<u64> {
        let reset = self.storage.reset_failed()?;
        tracing::info!("Reset {} failed URLs to pending", reset);
        Ok(reset)
    }

    /// Fetches and ingests every pending or failed listing URL
    ///
    /// A failure on one URL is recorded in the ledger and the pass moves on.
    pub async fn crawl_pending(&mut self) -> crate::Result<CrawlSummary> {
        let mut urls = self.storage.pending_urls()?;
        urls.extend(self.storage.failed_urls()?);

        tracing::info!("Listing pass: {} URLs to fetch", urls.len());
        let mut summary = CrawlSummary::default();

        for url in urls {
            summary.attempted += 1;

            let html = match self.fetcher.fetch(&url).await {
                FetchResult::Success { body, .. } => body,
                FetchResult::Failure(failure) => {
                    tracing::warn!("Failed to fetch {}: {}", url, failure);
                    self.storage.mark_failed(&url, &failure.to_string())?;
                    summary.failed += 1;
                    continue;
                }
            };

            match self.ingest_listing(&url, &html).await {
                Ok(page) => {
                    self.storage.mark_completed(&url)?;
                    summary.completed += 1;
                    summary.parts_inserted += page.parts_inserted;
                }
                Err(e) => {
                    tracing::error!("Failed to ingest {}: {}", url, e);
                    self.storage.mark_failed(&url, &e.to_string())?;
                    summary.failed += 1;
                }
            }

            if summary.attempted % 10 == 0 {
                tracing::info!(
                    "Progress: {} URLs processed, {} parts inserted, current delay {:?}",
                    summary.attempted,
                    summary.parts_inserted,
                    self.fetcher.delay().current_delay()
                );
            }
        }

        tracing::info!(
            "Listing pass finished: {} completed, {} failed, {} parts inserted",
            summary.completed,
            summary.failed,
            summary.parts_inserted
        );
        Ok(summary)
    }

    /// Re-fetches and re-ingests every completed listing URL
    ///
    /// Detail pages whose parts are already stored are not fetched again.
    /// Failures are logged but never move a completed URL back.
    pub async fn rescrape_completed(&mut self) -> crate::Result<CrawlSummary> {
        let (urls, other): (Vec<String>, Vec<String>) = self
            .storage
            .completed_urls()?
            .into_iter()
            .partition(|url| self.layout.is_listing(url));
        if !other.is_empty() {
            tracing::debug!("Re-scrape ignores {} non-listing URLs", other.len());
        }
        tracing::info!("Re-scrape pass: {} completed URLs", urls.len());
        let mut summary = CrawlSummary::default();

        for url in urls {
            summary.attempted += 1;

            let html = match self.fetcher.fetch(&url).await {
                FetchResult::Success { body, .. } => body,
                FetchResult::Failure(failure) => {
                    tracing::warn!("Skipping {}: {}", url, failure);
                    summary.failed += 1;
                    continue;
                }
            };

            match self.ingest_listing(&url, &html).await {
                Ok(page) => {
                    summary.completed += 1;
                    summary.parts_inserted += page.parts_inserted;
                }
                Err(e) => {
                    tracing::warn!("Failed to re-ingest {}: {}", url, e);
                    summary.failed += 1;
                }
            }
        }

        tracing::info!(
            "Re-scrape finished: {} pages, {} new parts",
            summary.completed,
            summary.parts_inserted
        );
        Ok(summary)
    }

    /// Ingests one fetched listing page and the detail pages it links to
    pub async fn ingest_listing(&mut self, url: &str, html: &str) -> crate::Result<PageSummary> {
        let page_url = Url::parse(url)?;
        let listing = self.layout.listing_path(&page_url)?;
        let sections = self.parser.parse_sections(html, &page_url);

        let mut summary = PageSummary {
            sections: sections.len(),
            ..PageSummary::default()
        };

        if sections.is_empty() {
            tracing::warn!("No sections found on {}; skipping", url);
            return Ok(summary);
        }

        let raw_title = self
            .parser
            .extract_page_title(html)
            .unwrap_or_else(|| listing.fallback_title());
        let mut title = self.names.clean(&raw_title);
        if title.is_empty() {
            title = self.names.clean(&listing.fallback_title());
        }

        tracing::debug!(
            "Ingesting {} ({} section(s)): {}",
            listing.base_path(),
            sections.len(),
            title
        );

        self.storage.insert_group(&Group {
            id: listing.group.clone(),
            name: humanize_slug(&listing.group),
        })?;

        let targets = if let [section] = sections.as_slice() {
            self.file_single_section(url, &listing, &title, section, &mut summary)?
        } else {
            self.file_sections(url, &listing, &title, &sections, &mut summary)?
        };

        for target in targets {
            self.ingest_detail(&listing, &target, &mut summary).await?;
        }

        tracing::info!(
            "{}: {} detail pages fetched, {} skipped, {} parts inserted",
            listing.base_path(),
            summary.detail_pages_fetched,
            summary.detail_pages_skipped,
            summary.parts_inserted
        );
        Ok(summary)
    }

    /// A page with one section becomes one subgroup and one diagram, both
    /// keyed by the page's base path. The diagram has no image URL when the
    /// section shows none.
    fn file_single_section(
        &mut self,
        url: &str,
        listing: &ListingPath,
        title: &str,
        section: &Section,
        summary: &mut PageSummary,
    ) -> crate::Result<Vec<DetailTarget>> {
        let base = listing.base_path();

        self.storage.insert_subgroup(&Subgroup {
            id: base.clone(),
            name: title.to_string(),
            group_id: listing.group.clone(),
            path: base.clone(),
        })?;

        self.storage.insert_diagram(&Diagram {
            id: base.clone(),
            group_id: listing.group.clone(),
            subgroup_id: Some(base.clone()),
            name: title.to_string(),
            image_url: section.image_url.clone(),
            image_path: None,
            source_url: url.to_string(),
        })?;
        summary.diagrams += 1;

        let diagram_id = base.clone();
        Ok(detail_targets(std::iter::once((section, base, diagram_id))))
    }

    /// A page with several sections becomes one subgroup and one diagram per
    /// section, all sharing the page's base path
    fn file_sections(
        &mut self,
        url: &str,
        listing: &ListingPath,
        title: &str,
        sections: &[Section],
        summary: &mut PageSummary,
    ) -> crate::Result<Vec<DetailTarget>> {
        let base = listing.base_path();

        // An earlier scrape stored this page as a single section
        if self.storage.get_subgroup(&base)?.is_some() {
            tracing::info!("{} now has {} sections; rebuilding", base, sections.len());
            self.storage.delete_subgroups_by_path(&base)?;
        }

        let mut filed = Vec::with_capacity(sections.len());
        for section in sections {
            let subgroup_id = format!("{}/{}", base, section.slug);
            let heading = self.names.clean(&section.heading);

            self.storage.insert_subgroup(&Subgroup {
                id: subgroup_id.clone(),
                name: format!("{} - {}", title, heading),
                group_id: listing.group.clone(),
                path: base.clone(),
            })?;

            self.storage.insert_diagram(&Diagram {
                id: subgroup_id.clone(),
                group_id: listing.group.clone(),
                subgroup_id: Some(subgroup_id.clone()),
                name: heading,
                image_url: section.image_url.clone(),
                image_path: None,
                source_url: url.to_string(),
            })?;
            summary.diagrams += 1;

            let diagram_id = subgroup_id.clone();
            filed.push((section, subgroup_id, diagram_id));
        }

        Ok(detail_targets(filed))
    }

    async fn ingest_detail(
        &mut self,
        listing: &ListingPath,
        target: &DetailTarget,
        summary: &mut PageSummary,
    ) -> crate::Result<()> {
        let diagram_id = target.diagram_id.as_str();

        if self
            .storage
            .parts_exist_for_detail(&target.detail_page_id, &target.subgroup_id)?
        {
            summary.detail_pages_skipped += 1;
            return Ok(());
        }

        let detail_url = self.layout.detail_url(listing, &target.detail_page_id)?;
        let html = match self.fetcher.fetch(detail_url.as_str()).await {
            FetchResult::Success { body, .. } => body,
            FetchResult::Failure(failure) => {
                tracing::warn!("Skipping detail page {}: {}", detail_url, failure);
                summary.detail_pages_failed += 1;
                return Ok(());
            }
        };
        summary.detail_pages_fetched += 1;

        let parts: Vec<Part> = self
            .parser
            .parse_parts(&html)
            .into_iter()
            .map(|parsed| {
                parsed.into_part(
                    &target.detail_page_id,
                    diagram_id,
                    &listing.group,
                    &target.subgroup_id,
                )
            })
            .collect();

        if parts.is_empty() {
            tracing::debug!("No parts on detail page {}", detail_url);
            return Ok(());
        }

        let inserted = self.storage.insert_parts(&parts)?;
        tracing::debug!(
            "Detail {}: {} parts parsed, {} new",
            target.detail_page_id,
            parts.len(),
            inserted
        );
        summary.parts_inserted += inserted;
        Ok(())
    }

    /// Downloads the image of every diagram that has a URL but no local file
    ///
    /// Diagrams sharing an image URL share one file; a file already on disk
    /// is reused without fetching it again.
    pub async fn download_images(&mut self) -> crate::Result<ImageSummary> {
        let images_dir = PathBuf::from(&self.config.output.images_dir);
        tokio::fs::create_dir_all(&images_dir).await?;

        let diagrams = self.storage.diagrams_without_images()?;
        tracing::info!("{} diagrams need images", diagrams.len());
        let mut summary = ImageSummary::default();

        for diagram in diagrams {
            let Some(image_url) = diagram.image_url.as_deref() else {
                continue;
            };

            let filename = image_file_name(image_url, &diagram.id);
            let path = images_dir.join(&filename);

            if tokio::fs::try_exists(&path).await? {
                summary.reused += 1;
            } else {
                match self.fetcher.fetch_image(image_url).await {
                    FetchResult::Success { body, .. } => {
                        let partial = images_dir.join(format!("{filename}.partial"));
                        if let Err(e) = save_image(&partial, &path, &body).await {
                            tracing::warn!("Failed to save {} for {}: {}", path.display(), diagram.id, e);
                            if let Err(e) = tokio::fs::remove_file(&partial).await {
                                tracing::debug!("Could not remove {}: {}", partial.display(), e);
                            }
                            summary.failed += 1;
                            continue;
                        }
                        tracing::debug!("Saved {} ({} bytes)", path.display(), body.len());
                        summary.downloaded += 1;
                    }
                    FetchResult::Failure(failure) => {
                        tracing::warn!("Failed to download {} for {}: {}", image_url, diagram.id, failure);
                        summary.failed += 1;
                        continue;
                    }
                }
            }

            self.storage
                .set_image_path_if_null(&diagram.id, &image_path_for(&images_dir, &filename))?;
        }

        tracing::info!(
            "Images: {} downloaded, {} reused, {} failed",
            summary.downloaded,
            summary.reused,
            summary.failed
        );
        Ok(summary)
    }

    /// Runs every consolidation pass in order
    pub fn consolidate(&mut self) -> crate::Result<ConsolidationReport> {
        let images_dir = PathBuf::from(&self.config.output.images_dir);
        consolidate::run_all(&mut self.storage, &images_dir, self.names.as_ref())
    }

    pub fn merge_replacements(&mut self) -> crate::Result<ReplacementReport> {
        consolidate::merge_replacement_parts(&mut self.storage)
    }

    pub fn regenerate_tags(&mut self) -> crate::Result<TagReport> {
        tags::regenerate_tags(&mut self.storage)
    }
}

/// Writes to `partial` then renames onto `path`, so a cut-off write never
/// looks like a complete file
async fn save_image(partial: &Path, path: &Path, body: &[u8]) -> std::io::Result<()> {
    tokio::fs::write(partial, body).await?;
    tokio::fs::rename(partial, path).await
}

/// Flattens filed sections into per-detail-page targets, first filing wins
fn detail_targets<'a, I>(filed: I) -> Vec<DetailTarget>
where
    I: IntoIterator<Item = (&'a Section, String, String)>,
{
    let mut seen = HashSet::new();
    let mut targets = Vec::new();

    for (section, subgroup_id, diagram_id) in filed {
        for detail in &section.detail_page_ids {
            if !seen.insert(detail.clone()) {
                tracing::debug!("Detail page {} listed in more than one section", detail);
                continue;
            }
            targets.push(DetailTarget {
                detail_page_id: detail.clone(),
                subgroup_id: subgroup_id.clone(),
                diagram_id: diagram_id.clone(),
            });
        }
    }
    targets
}

/// File name an image is stored under: the URL's own file stem made safe,
/// or the diagram id when the URL has none
pub(crate) fn image_file_name(image_url: &str, diagram_id: &str) -> String {
    let stem = Url::parse(image_url)
        .ok()
        .and_then(|u| {
            u.path_segments()?
                .filter(|s| !s.is_empty())
                .last()
                .map(|s| s.to_string())
        })
        .map(|last| match last.rsplit_once('.') {
            Some((stem, _)) => stem.to_string(),
            None => last,
        })
        .map(|stem| safe_file_stem(&stem))
        .filter(|stem| !stem.is_empty())
        .unwrap_or_else(|| safe_file_stem(diagram_id));

    format!("{}.{}", stem, image_extension(image_url))
}
