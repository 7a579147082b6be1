//! Flat list scraping: one record per container, optionally across pages.

use std::path::{Path, PathBuf};

use tokio::time::sleep;
use tracing::info;

use super::config::ScrapeConfig;
use super::driver::{PageDriver, WaitUntil};
use super::extract::extract_current_page;
use super::models::Record;
use super::pagination::{self, StopReason};
use crate::error::Result;
use crate::output;

pub struct UniversalScraper<D: PageDriver> {
    page: D,
    config: ScrapeConfig,
    records: Vec<Record>,
    pages_visited: Vec<u32>,
    stop_reason: Option<StopReason>,
}

impl<D: PageDriver> UniversalScraper<D> {
    pub fn new(page: D, config: ScrapeConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            page,
            config,
            records: Vec::new(),
            pages_visited: Vec::new(),
            stop_reason: None,
        })
    }

    pub fn config(&self) -> &ScrapeConfig {
        &self.config
    }

    pub fn page(&self) -> &D {
        &self.page
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn into_records(self) -> Vec<Record> {
        self.records
    }

    pub fn pages_visited(&self) -> &[u32] {
        &self.pages_visited
    }

    pub fn stop_reason(&self) -> Option<&StopReason> {
        self.stop_reason.as_ref()
    }

    /// Open the configured URL, then scrape from there.
    pub async fn scrape(&mut self) -> Result<&[Record]> {
        info!("Opening {}", self.config.url);
        self.page
            .goto(
                &self.config.url,
                WaitUntil::DomContentLoaded,
                self.config.timeouts.navigation(),
            )
            .await?;
        Ok(self.scrape_from_current_page().await)
    }

    /// Scrape the already open page, following pagination if configured.
    pub async fn scrape_from_current_page(&mut self) -> &[Record] {
        sleep(self.config.delay()).await;
        if self.config.is_paginated() {
            self.scrape_with_pagination().await
        } else {
            self.scrape_current_page().await
        }
    }

    /// Extract the open page only. Records are appended to the run's results.
    pub async fn scrape_current_page(&mut self) -> &[Record] {
        let start = self.records.len();
        let records = self.extract().await;
        info!("Extracted {} records", records.len());
        self.records.extend(records);
        &self.records[start..]
    }

    pub async fn scrape_with_pagination(&mut self) -> &[Record] {
        let start = self.records.len();
        let outcome = pagination::scrape_with_pagination(&self.page, &self.config, |_| {
            extract_current_page(
                &self.page,
                &self.config.container_selector,
                &self.config.fields,
                self.config.timeouts.container(),
            )
        })
        .await;

        self.records.extend(outcome.items);
        self.pages_visited.extend(outcome.pages_visited);
        self.stop_reason = Some(outcome.stop_reason);
        &self.records[start..]
    }

    /// The first `limit` records of the open page, without keeping them.
    pub async fn preview(&self, limit: usize) -> Vec<Record> {
        let mut records = self.extract().await;
        records.truncate(limit);
        records
    }

    async fn extract(&self) -> Vec<Record> {
        extract_current_page(
            &self.page,
            &self.config.container_selector,
            &self.config.fields,
            self.config.timeouts.container(),
        )
        .await
    }

    pub fn save_to_json(&self, path: &Path) -> Result<PathBuf> {
        output::save_flat(path, &self.records, &self.config)
    }
}
