//! Page-turning policy.
//!
//! Pagination affordances differ from site to site and fail in many ways, so
//! anything short of a clear "there is a next page and we reached it" ends
//! pagination. That is never an error: the reason is reported in
//! [`StopReason`] for the caller to log or inspect.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use tokio::time::sleep;
use tracing::{debug, info};

use super::config::{fill_page_template, ScrapeConfig};
use super::driver::{PageDriver, WaitUntil};

/// Why a paginated scrape stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    MaxPagesReached(u32),
    PageRangeEnd(u32),
    /// No next-page affordance configured.
    NoPagination,
    NextNotFound,
    /// The next control exists but is hidden or disabled.
    NextUnavailable,
    /// A template page returned no records.
    EmptyPage(u32),
    AdvanceFailed(String),
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopReason::MaxPagesReached(n) => write!(f, "reached max pages ({n})"),
            StopReason::PageRangeEnd(n) => write!(f, "reached end of page range ({n})"),
            StopReason::NoPagination => write!(f, "no pagination configured"),
            StopReason::NextNotFound => write!(f, "next page control not found"),
            StopReason::NextUnavailable => write!(f, "next page control hidden or disabled"),
            StopReason::EmptyPage(n) => write!(f, "page {n} was empty"),
            StopReason::AdvanceFailed(reason) => write!(f, "pagination ended: {reason}"),
        }
    }
}

/// What to do with the current page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageStep {
    /// Before the page range: turn the page without extracting.
    Skip,
    Extract,
    Stop(StopReason),
}

enum Affordance {
    NextSelector(String),
    UrlTemplate(String),
    None,
}

/// Page cursor: decides per page whether to extract, and turns pages.
///
/// Owns a copy of its policy so a caller can keep using `&mut self` while
/// the cursor is alive.
pub struct Paginator {
    current_page: u32,
    max_pages: u32,
    page_range: Option<(u32, u32)>,
    affordance: Affordance,
    delay: Duration,
    navigation_timeout: Duration,
    settle_timeout: Duration,
}

impl Paginator {
    pub fn new(config: &ScrapeConfig) -> Self {
        let affordance = match (&config.next_selector, &config.url_template) {
            (Some(selector), _) => Affordance::NextSelector(selector.clone()),
            (None, Some(template)) => Affordance::UrlTemplate(template.clone()),
            (None, None) => Affordance::None,
        };
        Self {
            current_page: 1,
            max_pages: config.max_pages,
            page_range: config.page_range,
            affordance,
            delay: config.delay(),
            navigation_timeout: config.timeouts.navigation(),
            settle_timeout: config.timeouts.settle(),
        }
    }

    pub fn current_page(&self) -> u32 {
        self.current_page
    }

    pub fn has_pagination(&self) -> bool {
        !matches!(self.affordance, Affordance::None)
    }

    /// Template pagination has no "last page" signal; an empty page is it.
    pub fn stops_on_empty_page(&self) -> bool {
        matches!(self.affordance, Affordance::UrlTemplate(_))
    }

    pub fn step(&self) -> PageStep {
        let page = self.current_page;
        if self.max_pages > 0 && page > self.max_pages {
            return PageStep::Stop(StopReason::MaxPagesReached(self.max_pages));
        }
        if let Some((start, end)) = self.page_range {
            if page < start {
                return PageStep::Skip;
            }
            if page > end {
                return PageStep::Stop(StopReason::PageRangeEnd(end));
            }
        }
        PageStep::Extract
    }

    /// Move to the next page. Any failure ends pagination.
    pub async fn advance<D>(&mut self, page: &D) -> Result<(), StopReason>
    where
        D: PageDriver + ?Sized,
    {
        let next = self.current_page + 1;
        match &self.affordance {
            Affordance::None => return Err(StopReason::NoPagination),
            Affordance::NextSelector(selector) => {
                let controls = page
                    .locate_all(selector)
                    .await
                    .map_err(|e| StopReason::AdvanceFailed(e.to_string()))?;
                let Some(control) = controls.first() else {
                    return Err(StopReason::NextNotFound);
                };

                let visible = control
                    .is_visible()
                    .await
                    .map_err(|e| StopReason::AdvanceFailed(e.to_string()))?;
                let enabled = control
                    .is_enabled()
                    .await
                    .map_err(|e| StopReason::AdvanceFailed(e.to_string()))?;
                if !visible || !enabled {
                    return Err(StopReason::NextUnavailable);
                }

                debug!("Clicking '{}' for page {}", selector, next);
                control
                    .click()
                    .await
                    .map_err(|e| StopReason::AdvanceFailed(e.to_string()))?;
            }
            Affordance::UrlTemplate(template) => {
                let url = fill_page_template(template, next);
                debug!("Loading page {} from {}", next, url);
                page.goto(&url, WaitUntil::DomContentLoaded, self.navigation_timeout)
                    .await
                    .map_err(|e| StopReason::AdvanceFailed(e.to_string()))?;
            }
        }

        sleep(self.delay).await;
        page.wait_for_load_state(WaitUntil::NetworkIdle, self.settle_timeout)
            .await
            .map_err(|e| StopReason::AdvanceFailed(e.to_string()))?;

        self.current_page = next;
        Ok(())
    }
}

/// Result of a paginated scrape.
#[derive(Debug)]
pub struct PaginationOutcome<T> {
    pub items: Vec<T>,
    /// Pages that were extracted, in order.
    pub pages_visited: Vec<u32>,
    pub stop_reason: StopReason,
}

/// Drive `on_page` over every page the configuration selects.
///
/// `on_page` receives the 1-based page number and returns that page's items;
/// how to turn pages stays here.
pub async fn scrape_with_pagination<D, T, F, Fut>(
    page: &D,
    config: &ScrapeConfig,
    mut on_page: F,
) -> PaginationOutcome<T>
where
    D: PageDriver + ?Sized,
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Vec<T>>,
{
    let mut pager = Paginator::new(config);
    let mut items = Vec::new();
    let mut pages_visited = Vec::new();

    let stop_reason = loop {
        match pager.step() {
            PageStep::Stop(reason) => break reason,
            PageStep::Skip => {
                debug!("Skipping page {} (before page range)", pager.current_page());
                if let Err(reason) = pager.advance(page).await {
                    break reason;
                }
                continue;
            }
            PageStep::Extract => {}
        }

        let page_number = pager.current_page();
        info!("Scraping page {}", page_number);
        let page_items = on_page(page_number).await;
        pages_visited.push(page_number);
        info!("Page {}: {} items", page_number, page_items.len());

        let empty = page_items.is_empty();
        items.extend(page_items);
        if empty && pager.stops_on_empty_page() {
            break StopReason::EmptyPage(page_number);
        }

        if let Err(reason) = pager.advance(page).await {
            break reason;
        }
    };

    info!("Pagination stopped: {}", stop_reason);
    PaginationOutcome {
        items,
        pages_visited,
        stop_reason,
    }
}
