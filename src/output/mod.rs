//! Output module for harvest reports
//!
//! This module handles:
//! - Collecting and printing harvest statistics
//! - Rendering ad hoc query results and part search hits

mod query;
pub mod stats;

pub use query::{format_query_result, print_query_result, print_search_results};
pub use stats::{get_stats, print_stats, HarvestStats};
