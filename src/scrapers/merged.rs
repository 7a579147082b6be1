//! List + detail merged scraping.
//!
//! For every list item the orchestrator reads the list fields, follows the
//! item's detail link, extracts the detail fields and returns to the list,
//! all before touching the next item. List and detail data for one item are
//! therefore always combined in a single step and can never be mismatched.
//!
//! The page is one browser tab shared by every step, so items and pages are
//! processed strictly in order. The scraper owns its page driver and every
//! operation that navigates takes `&mut self`.

use std::path::{Path, PathBuf};

use chrono::Utc;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use super::config::{FieldSpec, MergeConfig};
use super::detail::DetailNavigator;
use super::driver::{PageDriver, WaitUntil};
use super::extract::extract_current_page;
use super::models::{MergedRecord, Record, RunStats, ScrapeStatus};
use super::pagination::{PageStep, Paginator, StopReason};
use crate::error::{Result, ScrapeError};
use crate::output::{self, PARTIAL_RESULTS_FILENAME};

/// Items processed on a page between partial saves.
const PARTIAL_SAVE_EVERY: usize = 5;

pub struct MergedScraper<D: PageDriver> {
    page: D,
    config: MergeConfig,
    list_fields: Vec<FieldSpec>,
    records: Vec<MergedRecord>,
    stats: RunStats,
    partial_path: PathBuf,
    stop_reason: Option<StopReason>,
}

impl<D: PageDriver> MergedScraper<D> {
    /// Create a scraper driving `page`. The configuration is validated here.
    pub fn new(page: D, config: MergeConfig) -> Result<Self> {
        config.validate()?;
        let list_fields = config.list_fields();
        Ok(Self {
            page,
            config,
            list_fields,
            records: Vec::new(),
            stats: RunStats::default(),
            partial_path: PathBuf::from(PARTIAL_RESULTS_FILENAME),
            stop_reason: None,
        })
    }

    /// Where partial results are written during the run.
    pub fn with_partial_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.partial_path = path.into();
        self
    }

    pub fn config(&self) -> &MergeConfig {
        &self.config
    }

    pub fn page(&self) -> &D {
        &self.page
    }

    pub fn records(&self) -> &[MergedRecord] {
        &self.records
    }

    pub fn into_records(self) -> Vec<MergedRecord> {
        self.records
    }

    pub fn stats(&self) -> &RunStats {
        &self.stats
    }

    /// Why pagination stopped, once a run has finished.
    pub fn stop_reason(&self) -> Option<&StopReason> {
        self.stop_reason.as_ref()
    }

    pub fn partial_path(&self) -> &Path {
        &self.partial_path
    }

    /// Open the configured list URL, then scrape from there.
    pub async fn scrape(&mut self) -> Result<&[MergedRecord]> {
        let url = self.config.list_config.url.clone();
        info!("Opening list page {}", url);
        self.page
            .goto(
                &url,
                WaitUntil::DomContentLoaded,
                self.config.timeouts().navigation(),
            )
            .await?;
        self.scrape_from_current_page().await
    }

    /// Scrape starting from whatever list page is already open.
    pub async fn scrape_from_current_page(&mut self) -> Result<&[MergedRecord]> {
        let current = self.page.current_url().await.unwrap_or_default();
        info!("Starting merged scrape at {}", current);
        debug!(
            "List container '{}', detail container '{}'",
            self.config.list_config.container_selector, self.config.detail_container_selector
        );

        sleep(self.config.list_config.delay()).await;
        self.scrape_with_pagination().await
    }

    /// Scrape every selected list page with its details.
    ///
    /// On an abort the records gathered so far are flushed to the partial
    /// results file before the error is returned.
    pub async fn scrape_with_pagination(&mut self) -> Result<&[MergedRecord]> {
        self.stats.start_time = Some(Utc::now());
        self.stop_reason = None;
        let mut pager = Paginator::new(&self.config.list_config);

        let stop_reason = loop {
            match pager.step() {
                PageStep::Stop(reason) => break reason,
                PageStep::Skip => {
                    debug!("Skipping list page {} (before page range)", pager.current_page());
                    if let Err(reason) = pager.advance(&self.page).await {
                        break reason;
                    }
                    continue;
                }
                PageStep::Extract => {}
            }

            let page_num = pager.current_page();
            let found = match self.scrape_current_list_page_with_details(page_num).await {
                Ok(page_records) => page_records.len(),
                Err(e) => {
                    self.stats.end_time = Some(Utc::now());
                    warn!("Run aborted on list page {}: {}", page_num, e);
                    self.flush_partial();
                    return Err(e);
                }
            };

            if found == 0 && pager.stops_on_empty_page() {
                break StopReason::EmptyPage(page_num);
            }

            // Detail excursions may have changed the list page; the next
            // control is located afresh on every advance.
            if let Err(reason) = pager.advance(&self.page).await {
                break reason;
            }
        };

        info!("Pagination stopped: {}", stop_reason);
        self.stop_reason = Some(stop_reason);
        self.stats.end_time = Some(Utc::now());
        Ok(&self.records)
    }

    /// Extract the open list page and process each item in document order.
    ///
    /// Returns the records added for this page.
    pub async fn scrape_current_list_page_with_details(
        &mut self,
        page_num: u32,
    ) -> Result<&[MergedRecord]> {
        info!("Scraping list page {}", page_num);
        let start = self.records.len();

        let items = extract_current_page(
            &self.page,
            &self.config.list_config.container_selector,
            &self.list_fields,
            self.config.timeouts().container(),
        )
        .await;

        if items.is_empty() {
            warn!("List page {} has no items", page_num);
            return Ok(&self.records[start..]);
        }
        info!("Found {} list items", items.len());
        self.stats.total_list_items += items.len() as u64;

        for (index, item) in items.into_iter().enumerate() {
            self.scrape_list_item_with_detail(item, index, page_num)
                .await?;

            if self.config.save_partial_results && (index + 1) % PARTIAL_SAVE_EVERY == 0 {
                self.save_partial();
            }
        }

        Ok(&self.records[start..])
    }

    /// Process one list item: fetch its detail page, merge, return to the list.
    ///
    /// The record is appended to the run's results before any abort error is
    /// returned, so a failing item is never lost.
    pub async fn scrape_list_item_with_detail(
        &mut self,
        list_item: Record,
        item_index: usize,
        page_num: u32,
    ) -> Result<&MergedRecord> {
        debug!("Processing item {} on list page {}", item_index + 1, page_num);

        let mut record = MergedRecord::pending(list_item, item_index, page_num);
        let result = self.process_item(&mut record).await;

        self.stats.record_outcome(record.status());
        // An unusable URL counts as skipped even when the item then fails
        if record.status() == ScrapeStatus::Failed && record.metadata.detail_url.is_none() {
            self.stats.skipped_details += 1;
        }
        let position = self.records.len();
        self.records.push(record);

        result?;
        Ok(&self.records[position])
    }

    async fn process_item(&self, record: &mut MergedRecord) -> Result<()> {
        let navigator = DetailNavigator::new(&self.config);

        let url = navigator.detail_url(&self.page, &record.list_data).await;
        record.metadata.detail_url = url.clone();

        let Some(url) = url else {
            let reason = format!(
                "detail URL field '{}' is missing or not a link",
                self.config.detail_url_field
            );
            if self.config.skip_invalid_urls {
                warn!("Skipping item {}: {}", record.metadata.item_index + 1, reason);
                record.mark_skipped(reason);
                return Ok(());
            }
            // Nothing was opened, so there is nothing to return from
            record.mark_failed(reason);
            return self.abort_unless_tolerant(record).map_or(Ok(()), Err);
        };

        let outcome = match navigator.fetch_with_retries(&self.page, &url).await {
            Ok(outcome) => outcome,
            Err(e) => {
                record.mark_failed(e.to_string());
                return Err(e);
            }
        };
        record.metadata.attempts = outcome.attempts;

        let abort = match outcome.data {
            Some(data) => {
                debug!("Detail page {} scraped", url);
                record.mark_success(data);
                None
            }
            None => {
                let reason = outcome
                    .last_error
                    .unwrap_or_else(|| "detail page failed".to_string());
                warn!(
                    "Item {} failed after {} attempts: {}",
                    record.metadata.item_index + 1,
                    outcome.attempts,
                    reason
                );
                record.mark_failed(reason);
                self.abort_unless_tolerant(record)
            }
        };

        match navigator.return_to_list(&self.page).await {
            Ok(None) => {}
            Ok(Some(warning)) => record.metadata.navigation_error = Some(warning),
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                warn!("{}", e);
                record.metadata.navigation_error = Some(e.to_string());
            }
        }

        abort.map_or(Ok(()), Err)
    }

    /// The abort error for a failed record when errors are not tolerated.
    fn abort_unless_tolerant(&self, record: &MergedRecord) -> Option<ScrapeError> {
        if self.config.continue_on_error {
            return None;
        }
        Some(ScrapeError::DetailAborted {
            page: record.metadata.list_page,
            item_index: record.metadata.item_index,
            reason: record
                .metadata
                .error_message
                .clone()
                .unwrap_or_default(),
        })
    }

    fn save_partial(&self) {
        match output::save_merged(&self.partial_path, &self.records, &self.stats, &self.config) {
            Ok(path) => debug!("Saved partial results to {}", path.display()),
            Err(e) => warn!("Failed to save partial results: {}", e),
        }
    }

    fn flush_partial(&self) {
        if self.records.is_empty() {
            return;
        }
        self.save_partial();
        info!(
            "Flushed {} records to {}",
            self.records.len(),
            self.partial_path.display()
        );
    }

    /// Write the results of the run, even if there are none.
    pub fn save_to_json(&self, path: &Path) -> Result<PathBuf> {
        output::save_merged(path, &self.records, &self.stats, &self.config)
    }
}
