//! State module for the fetcher and the crawl ledger
//!
//! # Components
//!
//! - `DelayController`: adaptive request delay driven by success/failure signal
//! - `SessionState`: cookie jar and referer anchor for one crawl stream
//! - `CrawlStatus`: the per-URL ledger state machine

mod crawl_status;
mod delay;
mod session;

// Re-export main types
pub use crawl_status::CrawlStatus;
pub use delay::{DelayController, DELAY_RESET_INTERVAL, SUCCESS_DECAY};
pub use session::{Cookie, SessionState};
