//! Error types for scraping runs.
//!
//! Most failures during a run are recovered locally and recorded on the
//! record they belong to (see `RecordMetadata`). The variants here are the
//! ones that can surface to a caller: invalid configuration, aborted runs,
//! and unsupported navigation modes.

use thiserror::Error;

use crate::scrapers::driver::DriverError;

/// Errors produced by the scraping engine.
#[derive(Debug, Error)]
pub enum ScrapeError {
    /// Invalid job configuration. Raised at construction, never during a run.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// The list container never appeared on the current page.
    #[error("container '{selector}' did not appear: {reason}")]
    ContainerTimeout { selector: String, reason: String },

    /// A single detail page attempt failed (navigation, wait or extraction).
    #[error("detail page '{url}' failed: {reason}")]
    DetailFetch { url: String, reason: String },

    /// A detail page exhausted its retries while `continue_on_error` is off.
    #[error("aborting run: detail for item {item_index} on page {page} failed: {reason}")]
    DetailAborted {
        page: u32,
        item_index: usize,
        reason: String,
    },

    /// Returning to the list page failed.
    #[error("failed to return to list page: {0}")]
    NavigationBack(String),

    /// The configured navigation mode has no implementation.
    #[error("navigation mode '{0}' is not implemented")]
    UnimplementedMode(&'static str),

    #[error(transparent)]
    Driver(#[from] DriverError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ScrapeError {
    /// Errors that must stop a run no matter how error tolerance is configured.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ScrapeError::UnimplementedMode(_) | ScrapeError::DetailAborted { .. }
        )
    }
}

/// Result alias for scraping operations.
pub type Result<T> = std::result::Result<T, ScrapeError>;
