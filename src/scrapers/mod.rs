//! Scrapers for list pages and their detail pages.
//!
//! `UniversalScraper` extracts one flat record per list container.
//! `MergedScraper` additionally follows each item to its detail page and
//! merges both into a single record.

pub mod config;
pub mod detail;
pub mod driver;
pub mod extract;
pub mod merged;
pub mod models;
pub mod pagination;
pub mod universal;
mod wait;

#[cfg(test)]
pub mod testing;

pub use config::{FieldSpec, Job, MergeConfig, NavigationMode, ScrapeConfig, Timeouts};
pub use detail::{resolve_detail_url, DetailNavigator, DetailOutcome};
pub use driver::{DriverError, ElementHandle, PageDriver, WaitUntil};
pub use extract::{extract_current_page, extract_field, extract_fields};
pub use merged::MergedScraper;
pub use models::{FieldValue, MergedRecord, Record, RecordMetadata, RunStats, ScrapeStatus};
pub use pagination::{scrape_with_pagination, PaginationOutcome, Paginator, StopReason};
pub use universal::UniversalScraper;
