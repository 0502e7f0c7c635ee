//! Storage traits and error types
//!
//! This module defines the trait interface for storage backends and
//! associated error types.

use crate::catalog::{Diagram, Group, Part, PartRecord, Subgroup};
use crate::state::CrawlStatus;
use crate::storage::{ProgressRecord, QueryResult};
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid ledger transition for {url}: {from} -> {to}")]
    InvalidTransition {
        url: String,
        from: CrawlStatus,
        to: CrawlStatus,
    },

    #[error("Unknown crawl status in database: {0}")]
    UnknownStatus(String),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Trait for storage backend implementations
///
/// Covers the crawl progress ledger, the idempotent entity upserts, and the
/// read side used by ingestion and reporting. Consolidation passes work on
/// the underlying connection directly since they need row-group transactions.
pub trait Storage {
    // ===== Crawl Progress Ledger =====

    /// Adds `url` to the ledger as pending
    ///
    /// Returns false if the URL was already known, in any state.
    fn mark_pending(&mut self, url: &str) -> StorageResult<bool>;

    /// Records a successful fetch of `url`
    ///
    /// An unknown URL is first recorded as pending.
    fn mark_completed(&mut self, url: &str) -> StorageResult<()>;

    /// Records a failed fetch of `url` with its error message
    fn mark_failed(&mut self, url: &str, error: &str) -> StorageResult<()>;

    /// Moves every failed URL back to pending, returning how many moved
    fn reset_failed(&mut self) -> StorageResult<u64>;

    /// Gets the ledger row for `url`
    fn url_status(&self, url: &str) -> StorageResult<Option<ProgressRecord>>;

    /// Gets all URLs in a given state, in the order they were first recorded
    fn urls_by_status(&self, status: CrawlStatus) -> StorageResult<Vec<String>>;

    fn pending_urls(&self) -> StorageResult<Vec<String>> {
        self.urls_by_status(CrawlStatus::Pending)
    }

    fn failed_urls(&self) -> StorageResult<Vec<String>> {
        self.urls_by_status(CrawlStatus::Failed)
    }

    fn completed_urls(&self) -> StorageResult<Vec<String>> {
        self.urls_by_status(CrawlStatus::Completed)
    }

    // ===== Entity Upserts =====

    /// Inserts a group unless one with the same id exists
    fn insert_group(&mut self, group: &Group) -> StorageResult<bool>;

    /// Inserts a subgroup unless one with the same id exists
    ///
    /// The parent group is created first if missing, named after its id.
    fn insert_subgroup(&mut self, subgroup: &Subgroup) -> StorageResult<bool>;

    /// Inserts a diagram or overwrites the existing row with the same id
    ///
    /// A downloaded `image_path` survives the overwrite as long as the
    /// image URL is unchanged.
    fn insert_diagram(&mut self, diagram: &Diagram) -> StorageResult<()>;

    /// Inserts a part unless an identical (detail page, part number, diagram) row exists
    fn insert_part(&mut self, part: &Part) -> StorageResult<bool>;

    /// Inserts a batch of parts, returning how many rows were new
    ///
    /// A failing row is logged and skipped; it never blocks the rest.
    fn insert_parts(&mut self, parts: &[Part]) -> StorageResult<usize>;

    // ===== Entity Reads =====

    fn get_group(&self, id: &str) -> StorageResult<Option<Group>>;

    fn get_subgroup(&self, id: &str) -> StorageResult<Option<Subgroup>>;

    fn get_diagram(&self, id: &str) -> StorageResult<Option<Diagram>>;

    /// Gets all parts attached to a diagram, in insertion order
    fn parts_for_diagram(&self, diagram_id: &str) -> StorageResult<Vec<PartRecord>>;

    /// Returns true if any part was already ingested from this detail page
    /// for this subgroup
    ///
    /// Parts keep their subgroup when consolidation moves them to another diagram.
    fn parts_exist_for_detail(&self, detail_page_id: &str, subgroup_id: &str)
        -> StorageResult<bool>;

    /// Gets diagrams that have an image URL but no downloaded file yet
    fn diagrams_without_images(&self) -> StorageResult<Vec<Diagram>>;

    /// Sets a diagram's local image path unless one is already set
    ///
    /// Returns true if the row was updated.
    fn set_image_path_if_null(&mut self, diagram_id: &str, image_path: &str)
        -> StorageResult<bool>;

    /// Full-text search over part number, PNC, description and notes
    fn search_parts(&self, query: &str) -> StorageResult<Vec<PartRecord>>;

    // ===== Bulk Deletion =====

    /// Deletes every subgroup scraped from the listing page at `path`
    ///
    /// Also removes their diagrams, parts and tag links in one transaction.
    /// Returns the number of subgroups removed.
    fn delete_subgroups_by_path(&mut self, path: &str) -> StorageResult<u64>;

    // ===== Statistics =====

    /// Counts ledger URLs in a given state
    fn count_urls_by_status(&self, status: CrawlStatus) -> StorageResult<u64>;

    fn count_groups(&self) -> StorageResult<u64>;

    fn count_subgroups(&self) -> StorageResult<u64>;

    fn count_diagrams(&self) -> StorageResult<u64>;

    fn count_parts(&self) -> StorageResult<u64>;

    /// Counts diagrams whose image has been downloaded
    fn count_diagrams_with_images(&self) -> StorageResult<u64>;

    /// Runs an arbitrary SQL statement for ad hoc inspection
    fn execute_query(&self, sql: &str) -> StorageResult<QueryResult>;
}
