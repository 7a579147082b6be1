//! Detail page navigation.
//!
//! Every detail visit moves the shared page forward and then back, so the
//! navigator is only ever driven by one orchestrator, one item at a time.

use std::time::Duration;

use tokio::time::sleep;
use tracing::{debug, warn};
use url::Url;

use super::config::{MergeConfig, NavigationMode};
use super::driver::{DriverError, PageDriver, WaitUntil};
use super::extract::extract_fields;
use super::models::{FieldValue, Record};
use crate::error::{Result, ScrapeError};

/// Pause between detail attempts.
pub const RETRY_BACKOFF: Duration = Duration::from_secs(1);

/// Turn a list field value into a detail page URL.
///
/// Absolute http(s) URLs are kept as written; root-relative paths are joined
/// to `base`. Anything else (placeholders like `--`, blanks, fragments,
/// multi-valued fields) is not a link.
pub fn resolve_detail_url(value: Option<&FieldValue>, base: &str) -> Option<String> {
    let raw = value?.as_text()?.trim();

    if raw.starts_with("http://") || raw.starts_with("https://") {
        Url::parse(raw).ok()?;
        return Some(raw.to_string());
    }
    if raw.starts_with('/') {
        let joined = Url::parse(base).ok()?.join(raw).ok()?;
        return Some(joined.to_string());
    }
    None
}

fn fetch_error(url: &str, err: DriverError) -> ScrapeError {
    ScrapeError::DetailFetch {
        url: url.to_string(),
        reason: err.to_string(),
    }
}

/// Result of fetching one detail page with retries.
#[derive(Debug, Clone)]
pub struct DetailOutcome {
    /// Extracted detail fields, if any attempt succeeded.
    pub data: Option<Record>,
    pub attempts: u32,
    pub last_error: Option<String>,
}

pub struct DetailNavigator<'a> {
    config: &'a MergeConfig,
}

impl<'a> DetailNavigator<'a> {
    pub fn new(config: &'a MergeConfig) -> Self {
        Self { config }
    }

    /// The detail URL of `list_item`, resolved against the current page.
    pub async fn detail_url<D>(&self, page: &D, list_item: &Record) -> Option<String>
    where
        D: PageDriver + ?Sized,
    {
        let value = list_item.get(&self.config.detail_url_field);
        let base = page.current_url().await.unwrap_or_default();
        resolve_detail_url(value, &base)
    }

    /// One attempt: open `url`, wait for the detail container, extract.
    pub async fn fetch_detail<D>(&self, page: &D, url: &str) -> Result<Record>
    where
        D: PageDriver + ?Sized,
    {
        if self.config.navigation_mode == NavigationMode::NewTab {
            return Err(ScrapeError::UnimplementedMode(NavigationMode::NewTab.as_str()));
        }
        let timeouts = self.config.timeouts();

        page.goto(url, WaitUntil::DomContentLoaded, timeouts.navigation())
            .await
            .map_err(|e| fetch_error(url, e))?;
        page.wait_for_selector(
            &self.config.detail_container_selector,
            timeouts.detail_container(),
        )
        .await
        .map_err(|e| fetch_error(url, e))?;

        sleep(self.config.detail_wait()).await;

        // Detail pages hold one logical item: extract against the whole document
        let document = page.document().await.map_err(|e| fetch_error(url, e))?;
        Ok(extract_fields(document.as_ref(), &self.config.detail_fields).await)
    }

    /// Fetch `url`, retrying `max_detail_retries` times with a fixed backoff.
    ///
    /// Exhausted retries are not an error; only fatal errors are returned.
    pub async fn fetch_with_retries<D>(&self, page: &D, url: &str) -> Result<DetailOutcome>
    where
        D: PageDriver + ?Sized,
    {
        let total = self.config.max_detail_retries.saturating_add(1);
        let mut last_error = None;

        for attempt in 1..=total {
            if attempt > 1 {
                debug!("Retrying {} (attempt {}/{})", url, attempt, total);
            }
            match self.fetch_detail(page, url).await {
                Ok(data) => {
                    return Ok(DetailOutcome {
                        data: Some(data),
                        attempts: attempt,
                        last_error: None,
                    })
                }
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    warn!("Detail attempt {}/{} failed: {}", attempt, total, e);
                    last_error = Some(e.to_string());
                    if attempt < total {
                        sleep(RETRY_BACKOFF).await;
                    }
                }
            }
        }

        Ok(DetailOutcome {
            data: None,
            attempts: total,
            last_error,
        })
    }

    /// Navigate back to the list page.
    ///
    /// A failed back navigation is `NavigationBack`. A failed verification
    /// afterwards only yields a warning, returned for the record's metadata.
    pub async fn return_to_list<D>(&self, page: &D) -> Result<Option<String>>
    where
        D: PageDriver + ?Sized,
    {
        if self.config.navigation_mode == NavigationMode::NewTab {
            return Err(ScrapeError::UnimplementedMode(NavigationMode::NewTab.as_str()));
        }
        let timeouts = self.config.timeouts();

        page.go_back(WaitUntil::DomContentLoaded, timeouts.back())
            .await
            .map_err(|e| ScrapeError::NavigationBack(e.to_string()))?;
        sleep(self.config.back_wait()).await;

        if !self.config.verify_list_page_state {
            return Ok(None);
        }
        match self.verify_list_page(page).await {
            Ok(()) => Ok(None),
            Err(e) => {
                let warning = format!("list page verification failed: {e}");
                warn!("{}", warning);
                Ok(Some(warning))
            }
        }
    }

    async fn verify_list_page<D>(&self, page: &D) -> std::result::Result<(), DriverError>
    where
        D: PageDriver + ?Sized,
    {
        let timeout = self.config.timeouts().verify();
        page.wait_for_selector(&self.config.list_config.container_selector, timeout)
            .await?;
        page.wait_for_load_state(WaitUntil::NetworkIdle, timeout)
            .await
    }
}
