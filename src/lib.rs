//! mergescrape: paginated list and detail page scraping.
//!
//! A job names a list page, the fields to read from each list item, how to
//! reach the next page and, for merged jobs, which list field links to the
//! item's detail page and what to read there. The scrapers drive a single
//! browser page through [`scrapers::PageDriver`] and produce JSON documents
//! through [`output`].

#[cfg(feature = "browser")]
pub mod cli;
pub mod config;
pub mod error;
pub mod output;
pub mod scrapers;

pub use error::{Result, ScrapeError};
