//! Page driver capability.
//!
//! The scrapers never talk to a browser directly. They drive a single page
//! (one browser tab) through [`PageDriver`] and read DOM values through
//! [`ElementHandle`]s it hands out. The browser-backed implementation lives in
//! [`chromium`]; tests use an in-memory site.
//!
//! A page driver is a single mutable resource: navigating it changes what
//! every outstanding element handle refers to. Scrapers therefore own their
//! driver and take `&mut self` for every operation that navigates.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

#[cfg(feature = "browser")]
pub mod chromium;

#[cfg(feature = "browser")]
pub use chromium::{ChromiumPage, LaunchOptions};

/// Errors reported by a page driver.
#[derive(Debug, Error)]
pub enum DriverError {
    #[error("navigation to '{url}' failed: {reason}")]
    NavigationFailed { url: String, reason: String },

    #[error("wait for {condition} timed out after {timeout:?}")]
    WaitTimeout { condition: String, timeout: Duration },

    #[error("no element matches '{0}'")]
    ElementNotFound(String),

    #[error("script execution failed: {0}")]
    ScriptFailed(String),

    /// The element is no longer attached to the current document.
    #[error("element is detached from the document")]
    Detached,

    #[error("browser connection failed: {0}")]
    Connection(String),

    #[error("page is closed")]
    Closed,
}

impl DriverError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, DriverError::WaitTimeout { .. })
    }
}

pub type DriverResult<T> = std::result::Result<T, DriverError>;

/// Lifecycle event a navigation waits for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WaitUntil {
    /// `DOMContentLoaded` fired.
    #[default]
    DomContentLoaded,
    /// The `load` event fired.
    Load,
    /// No network activity for a short quiet window.
    NetworkIdle,
}

impl WaitUntil {
    pub fn as_str(&self) -> &'static str {
        match self {
            WaitUntil::DomContentLoaded => "domcontentloaded",
            WaitUntil::Load => "load",
            WaitUntil::NetworkIdle => "networkidle",
        }
    }
}

/// A handle to one element (or to the whole document) on the current page.
#[async_trait]
pub trait ElementHandle: Send + Sync {
    /// All descendants matching `selector`, in document order.
    async fn locate_all(&self, selector: &str) -> DriverResult<Vec<Box<dyn ElementHandle>>>;

    /// Raw `textContent`, untrimmed.
    async fn text_content(&self) -> DriverResult<Option<String>>;

    async fn attribute(&self, name: &str) -> DriverResult<Option<String>>;

    async fn is_visible(&self) -> DriverResult<bool>;

    async fn is_enabled(&self) -> DriverResult<bool>;

    async fn click(&self) -> DriverResult<()>;
}

/// Navigation and query operations on a single browser page.
#[async_trait]
pub trait PageDriver: Send + Sync {
    async fn goto(&self, url: &str, wait_until: WaitUntil, timeout: Duration) -> DriverResult<()>;

    /// Wait until at least one element matches `selector`.
    async fn wait_for_selector(&self, selector: &str, timeout: Duration) -> DriverResult<()>;

    /// All elements matching `selector` in the whole document, in document order.
    async fn locate_all(&self, selector: &str) -> DriverResult<Vec<Box<dyn ElementHandle>>>;

    async fn count(&self, selector: &str) -> DriverResult<usize> {
        Ok(self.locate_all(selector).await?.len())
    }

    /// The document root, for extracting fields that are not scoped to a container.
    async fn document(&self) -> DriverResult<Box<dyn ElementHandle>>;

    async fn go_back(&self, wait_until: WaitUntil, timeout: Duration) -> DriverResult<()>;

    async fn wait_for_load_state(&self, state: WaitUntil, timeout: Duration) -> DriverResult<()>;

    async fn current_url(&self) -> DriverResult<String>;
}
