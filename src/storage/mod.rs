//! Storage module for persisting the harvested catalog
//!
//! This module handles all database operations for the harvester, including:
//! - SQLite database initialization, schema creation and migrations
//! - The crawl progress ledger (`scrape_progress`)
//! - Idempotent upserts of groups, subgroups, diagrams and parts
//! - Full-text part search and ad hoc reporting queries

mod schema;
mod sqlite;
mod traits;

pub use schema::{create_schema, run_migrations};
pub use sqlite::SqliteStorage;
pub use traits::{Storage, StorageError, StorageResult};

use crate::state::CrawlStatus;
use rusqlite::types::Value;
use std::fmt;
use std::path::Path;

/// Opens (or creates) the harvest database at `path`
pub fn open_storage(path: &Path) -> crate::Result<SqliteStorage> {
    SqliteStorage::new(path)
}

/// One row of the crawl progress ledger
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressRecord {
    pub url: String,
    pub status: CrawlStatus,
    /// Set when the URL reaches `completed` or `failed`
    pub scraped_at: Option<String>,
    /// Set only while the URL is `failed`
    pub error: Option<String>,
}

/// Column names and raw values returned by [`Storage::execute_query`]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryResult {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl QueryResult {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Renders a single SQLite value the way the CLI prints it
pub struct DisplayValue<'a>(pub &'a Value);

impl fmt::Display for DisplayValue<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Value::Null => write!(f, "NULL"),
            Value::Integer(i) => write!(f, "{}", i),
            Value::Real(r) => write!(f, "{}", r),
            Value::Text(s) => write!(f, "{}", s),
            Value::Blob(b) => write!(f, "<{} bytes>", b.len()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_value() {
        assert_eq!(DisplayValue(&Value::Null).to_string(), "NULL");
        assert_eq!(DisplayValue(&Value::Integer(42)).to_string(), "42");
        assert_eq!(DisplayValue(&Value::Text("gasket".into())).to_string(), "gasket");
        assert_eq!(DisplayValue(&Value::Blob(vec![1, 2, 3])).to_string(), "<3 bytes>");
    }
}
