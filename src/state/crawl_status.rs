/// Crawl ledger status definitions
///
/// Every URL the harvester visits carries one of these states in the
/// `scrape_progress` table.
use std::fmt;

/// Fetch status of a single URL in the crawl ledger
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CrawlStatus {
    /// Known but not yet fetched successfully
    Pending,

    /// Fetched successfully (says nothing about ingestion completeness)
    Completed,

    /// Last fetch attempt failed; eligible for a reset back to pending
    Failed,
}

impl CrawlStatus {
    /// Returns true if a URL in this state should be fetched again
    pub fn needs_fetch(&self) -> bool {
        matches!(self, Self::Pending | Self::Failed)
    }

    /// Checks whether the ledger allows moving from `self` to `next`
    ///
    /// Re-marking a URL with its current state is always allowed so the
    /// ledger operations stay idempotent.
    pub fn can_transition_to(&self, next: CrawlStatus) -> bool {
        if *self == next {
            return true;
        }
        matches!(
            (self, next),
            (Self::Pending, Self::Completed)
                | (Self::Pending, Self::Failed)
                | (Self::Failed, Self::Pending)
                | (Self::Failed, Self::Completed)
        )
    }

    /// Converts the status to its database string representation
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// Parses a status from its database string representation
    ///
    /// Returns None if the string doesn't match any known status.
    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    /// Returns all statuses
    pub fn all() -> [Self; 3] {
        [Self::Pending, Self::Completed, Self::Failed]
    }
}

impl fmt::Display for CrawlStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.to_db_string())
    }
}
