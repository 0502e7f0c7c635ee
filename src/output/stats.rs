//! Harvest statistics from the catalog database
//!
//! This module provides functionality for extracting and displaying
//! progress and entity counts from the storage layer.

use crate::state::CrawlStatus;
use crate::storage::{Storage, StorageResult};
use std::collections::BTreeMap;

/// Harvest statistics summary
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HarvestStats {
    /// Ledger URLs per crawl status
    pub urls_by_status: BTreeMap<CrawlStatus, u64>,

    pub groups: u64,
    pub subgroups: u64,
    pub diagrams: u64,
    pub parts: u64,

    /// Diagrams with a downloaded image file
    pub diagrams_with_images: u64,
}

impl HarvestStats {
    /// Loads statistics from storage
    pub fn collect(storage: &impl Storage) -> StorageResult<Self> {
        let mut urls_by_status = BTreeMap::new();
        for status in CrawlStatus::all() {
            urls_by_status.insert(status, storage.count_urls_by_status(status)?);
        }

        Ok(Self {
            urls_by_status,
            groups: storage.count_groups()?,
            subgroups: storage.count_subgroups()?,
            diagrams: storage.count_diagrams()?,
            parts: storage.count_parts()?,
            diagrams_with_images: storage.count_diagrams_with_images()?,
        })
    }

    /// Every URL in the ledger regardless of status
    pub fn total_urls(&self) -> u64 {
        self.urls_by_status.values().sum()
    }

    fn urls(&self, status: CrawlStatus) -> u64 {
        self.urls_by_status.get(&status).copied().unwrap_or(0)
    }
}

/// Alias kept for callers that think of this as `get_stats`
pub fn get_stats(storage: &impl Storage) -> StorageResult<HarvestStats> {
    HarvestStats::collect(storage)
}

/// Prints statistics to stdout in a formatted manner
pub fn print_stats(stats: &HarvestStats) {
    println!("=== Harvest Statistics ===\n");

    let total = stats.total_urls();
    println!("Listing URLs ({}):", total);
    for (status, count) in &stats.urls_by_status {
        let percentage = if total > 0 {
            (*count as f64 / total as f64) * 100.0
        } else {
            0.0
        };
        println!("  {:<10} {:>6} ({:.1}%)", status, count, percentage);
    }
    println!();

    println!("Catalog:");
    println!("  Groups:    {}", stats.groups);
    println!("  Subgroups: {}", stats.subgroups);
    println!("  Diagrams:  {}", stats.diagrams);
    println!("  Parts:     {}", stats.parts);
    println!();

    println!(
        "Images: {} / {} diagrams have a local file",
        stats.diagrams_with_images, stats.diagrams
    );

    let failed = stats.urls(CrawlStatus::Failed);
    if failed > 0 {
        println!("\n{} URLs failed; run with --reset-failed to retry them", failed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{Diagram, Part, Subgroup};
    use crate::storage::SqliteStorage;

    #[test]
    fn test_collect_counts() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        storage.mark_pending("https://example.com/cat/a/b/").unwrap();
        storage.mark_pending("https://example.com/cat/a/c/").unwrap();
        storage.mark_completed("https://example.com/cat/a/c/").unwrap();

        storage
            .insert_subgroup(&Subgroup {
                id: "a/b".to_string(),
                name: "B".to_string(),
                group_id: "a".to_string(),
                path: "a/b".to_string(),
            })
            .unwrap();
        storage
            .insert_diagram(&Diagram {
                id: "a/b".to_string(),
                group_id: "a".to_string(),
                subgroup_id: Some("a/b".to_string()),
                name: "B".to_string(),
                image_url: Some("https://example.com/b.png".to_string()),
                image_path: Some("images/b.png".to_string()),
                source_url: "https://example.com/cat/a/b/".to_string(),
            })
            .unwrap();
        storage
            .insert_part(&Part {
                detail_page_id: Some("1".to_string()),
                part_number: "MD1".to_string(),
                pnc: Some("11010".to_string()),
                diagram_id: "a/b".to_string(),
                group_id: "a".to_string(),
                subgroup_id: Some("a/b".to_string()),
                ..Part::default()
            })
            .unwrap();

        let stats = HarvestStats::collect(&storage).unwrap();
        assert_eq!(stats.total_urls(), 2);
        assert_eq!(stats.urls(CrawlStatus::Pending), 1);
        assert_eq!(stats.urls(CrawlStatus::Completed), 1);
        assert_eq!(stats.urls(CrawlStatus::Failed), 0);
        assert_eq!(stats.groups, 1);
        assert_eq!(stats.subgroups, 1);
        assert_eq!(stats.diagrams, 1);
        assert_eq!(stats.parts, 1);
        assert_eq!(stats.diagrams_with_images, 1);
    }
}
