//! Scrape job configuration.
//!
//! Jobs are plain JSON documents. Every type here is validated before a
//! scraper accepts it: selectors must be non-empty, field names unique, and a
//! merged job's detail URL field must be one of its list fields.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{Result, ScrapeError};

/// Placeholder substituted with the page number in `url_template`.
pub const PAGE_PLACEHOLDER: &str = "{page}";

/// How to extract one named value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub name: String,
    pub selector: String,
    /// Attribute to read instead of the text content.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attribute: Option<String>,
    /// Collect every match instead of the first.
    #[serde(default)]
    pub multiple: bool,
}

impl FieldSpec {
    pub fn new(name: impl Into<String>, selector: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            selector: selector.into(),
            attribute: None,
            multiple: false,
        }
    }

    pub fn attribute(mut self, attribute: impl Into<String>) -> Self {
        self.attribute = Some(attribute.into());
        self
    }

    pub fn multiple(mut self) -> Self {
        self.multiple = true;
        self
    }
}

/// Accepts either a list of field specs or the `{"name": "selector"}` shorthand.
#[derive(Deserialize)]
#[serde(untagged)]
enum FieldsRepr {
    Specs(Vec<FieldSpec>),
    Shorthand(IndexMap<String, String>),
}

fn deserialize_fields<'de, D>(deserializer: D) -> std::result::Result<Vec<FieldSpec>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match FieldsRepr::deserialize(deserializer)? {
        FieldsRepr::Specs(specs) => specs,
        FieldsRepr::Shorthand(map) => map
            .into_iter()
            .map(|(name, selector)| FieldSpec::new(name, selector))
            .collect(),
    })
}

/// Reject empty selectors and duplicate names within one field set.
pub fn validate_fields(fields: &[FieldSpec], context: &str) -> Result<()> {
    let mut seen = HashSet::new();
    for field in fields {
        if field.name.trim().is_empty() {
            return Err(ScrapeError::Config(format!("{context}: field with empty name")));
        }
        if field.selector.trim().is_empty() {
            return Err(ScrapeError::Config(format!(
                "{context}: field '{}' has an empty selector",
                field.name
            )));
        }
        if !seen.insert(field.name.as_str()) {
            return Err(ScrapeError::Config(format!(
                "{context}: duplicate field name '{}'",
                field.name
            )));
        }
    }
    Ok(())
}

/// Bounds on every wait a scrape performs, in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Timeouts {
    /// List container wait.
    pub container_ms: u64,
    /// Detail page navigation.
    pub navigation_ms: u64,
    /// Detail container wait.
    pub detail_container_ms: u64,
    /// History back navigation.
    pub back_ms: u64,
    /// List container and network idle checks after returning.
    pub verify_ms: u64,
    /// Network idle after turning a page.
    pub settle_ms: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            container_ms: 10_000,
            navigation_ms: 30_000,
            detail_container_ms: 15_000,
            back_ms: 15_000,
            verify_ms: 10_000,
            settle_ms: 15_000,
        }
    }
}

impl Timeouts {
    pub fn container(&self) -> Duration {
        Duration::from_millis(self.container_ms)
    }

    pub fn navigation(&self) -> Duration {
        Duration::from_millis(self.navigation_ms)
    }

    pub fn detail_container(&self) -> Duration {
        Duration::from_millis(self.detail_container_ms)
    }

    pub fn back(&self) -> Duration {
        Duration::from_millis(self.back_ms)
    }

    pub fn verify(&self) -> Duration {
        Duration::from_millis(self.verify_ms)
    }

    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }
}

fn default_delay_ms() -> u64 {
    3000
}

/// One list scrape: where to go, what to extract, how to turn pages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScrapeConfig {
    pub url: String,
    #[serde(deserialize_with = "deserialize_fields")]
    pub fields: Vec<FieldSpec>,
    /// Selector matching one element per record.
    pub container_selector: String,
    /// "Next page" button or link.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_selector: Option<String>,
    /// URL with a `{page}` placeholder, used instead of clicking.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url_template: Option<String>,
    /// Inclusive 1-based page range to extract.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_range: Option<(u32, u32)>,
    /// Pause after loading or turning a page.
    #[serde(default = "default_delay_ms")]
    pub delay_ms: u64,
    /// 0 = no limit.
    #[serde(default)]
    pub max_pages: u32,
    #[serde(default)]
    pub timeouts: Timeouts,
}

impl ScrapeConfig {
    pub fn new(
        url: impl Into<String>,
        fields: Vec<FieldSpec>,
        container_selector: impl Into<String>,
    ) -> Self {
        Self {
            url: url.into(),
            fields,
            container_selector: container_selector.into(),
            next_selector: None,
            url_template: None,
            page_range: None,
            delay_ms: default_delay_ms(),
            max_pages: 0,
            timeouts: Timeouts::default(),
        }
    }

    pub fn with_next_selector(mut self, selector: impl Into<String>) -> Self {
        self.next_selector = Some(selector.into());
        self
    }

    pub fn with_url_template(mut self, template: impl Into<String>) -> Self {
        self.url_template = Some(template.into());
        self
    }

    pub fn with_page_range(mut self, start: u32, end: u32) -> Self {
        self.page_range = Some((start, end));
        self
    }

    pub fn with_max_pages(mut self, max_pages: u32) -> Self {
        self.max_pages = max_pages;
        self
    }

    pub fn with_delay_ms(mut self, delay_ms: u64) -> Self {
        self.delay_ms = delay_ms;
        self
    }

    pub fn with_timeouts(mut self, timeouts: Timeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }

    /// Whether any way of reaching a next page is configured.
    pub fn has_pagination(&self) -> bool {
        self.next_selector.is_some() || self.url_template.is_some()
    }

    /// Whether this job may visit more than its first page.
    pub fn is_paginated(&self) -> bool {
        self.has_pagination() || self.page_range.is_some()
    }

    /// URL of `page` under the configured template.
    pub fn page_url(&self, page: u32) -> Option<String> {
        self.url_template
            .as_deref()
            .map(|template| fill_page_template(template, page))
    }

    pub fn field_names(&self) -> Vec<String> {
        self.fields.iter().map(|f| f.name.clone()).collect()
    }

    pub fn validate(&self) -> Result<()> {
        if self.fields.is_empty() {
            return Err(ScrapeError::Config("list fields must not be empty".to_string()));
        }
        validate_fields(&self.fields, "list fields")?;

        if self.container_selector.trim().is_empty() {
            return Err(ScrapeError::Config(
                "container_selector must not be empty".to_string(),
            ));
        }
        if let Some(selector) = &self.next_selector {
            if selector.trim().is_empty() {
                return Err(ScrapeError::Config("next_selector is empty".to_string()));
            }
        }
        if let Some(template) = &self.url_template {
            if !template.contains(PAGE_PLACEHOLDER) {
                return Err(ScrapeError::Config(format!(
                    "url_template '{template}' has no {PAGE_PLACEHOLDER} placeholder"
                )));
            }
        }
        if let Some((start, end)) = self.page_range {
            if start == 0 || start > end {
                return Err(ScrapeError::Config(format!(
                    "invalid page_range ({start}, {end})"
                )));
            }
            if start > 1 && !self.has_pagination() {
                return Err(ScrapeError::Config(format!(
                    "page_range starts at page {start} but neither next_selector nor url_template is set"
                )));
            }
        }
        Ok(())
    }
}

/// Substitute `page` into every `{page}` of a URL template.
pub fn fill_page_template(template: &str, page: u32) -> String {
    template.replace(PAGE_PLACEHOLDER, &page.to_string())
}

/// How the scraper gets from a detail page back to its list page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NavigationMode {
    /// Browser history back.
    #[default]
    GoBack,
    /// Open details in a separate tab. Not implemented.
    NewTab,
}

impl NavigationMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            NavigationMode::GoBack => "go_back",
            NavigationMode::NewTab => "new_tab",
        }
    }
}

fn default_url_attribute() -> String {
    "href".to_string()
}

fn default_wait_ms() -> u64 {
    2000
}

fn default_retries() -> u32 {
    2
}

fn default_true() -> bool {
    true
}

/// A list scrape whose items are each followed to a detail page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeConfig {
    pub list_config: ScrapeConfig,
    #[serde(deserialize_with = "deserialize_fields")]
    pub detail_fields: Vec<FieldSpec>,
    /// Waited for on every detail page before extracting.
    pub detail_container_selector: String,
    /// List field holding the detail page link.
    pub detail_url_field: String,
    /// Attribute read for the link when that field has none of its own.
    #[serde(default = "default_url_attribute")]
    pub detail_url_attribute: String,
    #[serde(default)]
    pub navigation_mode: NavigationMode,
    /// Pause after returning to the list page.
    #[serde(default = "default_wait_ms")]
    pub back_wait_ms: u64,
    /// Pause after the detail container appears.
    #[serde(default = "default_wait_ms")]
    pub detail_wait_ms: u64,
    /// Extra attempts after the first failed detail fetch.
    #[serde(default = "default_retries")]
    pub max_detail_retries: u32,
    #[serde(default = "default_true")]
    pub continue_on_error: bool,
    #[serde(default = "default_true")]
    pub skip_invalid_urls: bool,
    #[serde(default = "default_true")]
    pub verify_list_page_state: bool,
    #[serde(default = "default_true")]
    pub save_partial_results: bool,
}

impl MergeConfig {
    /// Build and validate a merged job with default navigation and error policy.
    pub fn new(
        list_config: ScrapeConfig,
        detail_fields: Vec<FieldSpec>,
        detail_container_selector: impl Into<String>,
        detail_url_field: impl Into<String>,
    ) -> Result<Self> {
        let config = Self {
            list_config,
            detail_fields,
            detail_container_selector: detail_container_selector.into(),
            detail_url_field: detail_url_field.into(),
            detail_url_attribute: default_url_attribute(),
            navigation_mode: NavigationMode::default(),
            back_wait_ms: default_wait_ms(),
            detail_wait_ms: default_wait_ms(),
            max_detail_retries: default_retries(),
            continue_on_error: true,
            skip_invalid_urls: true,
            verify_list_page_state: true,
            save_partial_results: true,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn with_navigation_mode(mut self, mode: NavigationMode) -> Self {
        self.navigation_mode = mode;
        self
    }

    pub fn with_max_detail_retries(mut self, retries: u32) -> Self {
        self.max_detail_retries = retries;
        self
    }

    pub fn with_continue_on_error(mut self, continue_on_error: bool) -> Self {
        self.continue_on_error = continue_on_error;
        self
    }

    pub fn with_skip_invalid_urls(mut self, skip: bool) -> Self {
        self.skip_invalid_urls = skip;
        self
    }

    pub fn with_waits(mut self, back_wait_ms: u64, detail_wait_ms: u64) -> Self {
        self.back_wait_ms = back_wait_ms;
        self.detail_wait_ms = detail_wait_ms;
        self
    }

    pub fn with_verify_list_page_state(mut self, verify: bool) -> Self {
        self.verify_list_page_state = verify;
        self
    }

    pub fn with_save_partial_results(mut self, save: bool) -> Self {
        self.save_partial_results = save;
        self
    }

    pub fn back_wait(&self) -> Duration {
        Duration::from_millis(self.back_wait_ms)
    }

    pub fn detail_wait(&self) -> Duration {
        Duration::from_millis(self.detail_wait_ms)
    }

    pub fn timeouts(&self) -> &Timeouts {
        &self.list_config.timeouts
    }

    pub fn validate(&self) -> Result<()> {
        self.list_config.validate()?;

        if self.detail_fields.is_empty() {
            return Err(ScrapeError::Config("detail_fields must not be empty".to_string()));
        }
        validate_fields(&self.detail_fields, "detail fields")?;

        if self.detail_container_selector.trim().is_empty() {
            return Err(ScrapeError::Config(
                "detail_container_selector must not be empty".to_string(),
            ));
        }
        if self.detail_url_field.trim().is_empty() {
            return Err(ScrapeError::Config("detail_url_field must not be empty".to_string()));
        }
        if !self
            .list_config
            .fields
            .iter()
            .any(|f| f.name == self.detail_url_field)
        {
            return Err(ScrapeError::Config(format!(
                "detail_url_field '{}' must be one of the list fields",
                self.detail_url_field
            )));
        }
        Ok(())
    }

    /// List fields as extracted for a merged run: the detail URL field reads
    /// `detail_url_attribute` unless it names an attribute itself.
    pub fn list_fields(&self) -> Vec<FieldSpec> {
        self.list_config
            .fields
            .iter()
            .map(|field| {
                if field.name == self.detail_url_field && field.attribute.is_none() {
                    field.clone().attribute(self.detail_url_attribute.clone())
                } else {
                    field.clone()
                }
            })
            .collect()
    }

    pub fn detail_field_names(&self) -> Vec<String> {
        self.detail_fields.iter().map(|f| f.name.clone()).collect()
    }
}

/// A job file: either a flat list scrape or a merged list + detail scrape.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Job {
    Scrape(ScrapeConfig),
    Merge(MergeConfig),
}

impl Job {
    /// Load and validate a job file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let job: Job = serde_json::from_str(&contents).map_err(|e| {
            ScrapeError::Config(format!("failed to parse job file {}: {}", path.display(), e))
        })?;
        job.validate()?;
        Ok(job)
    }

    pub fn validate(&self) -> Result<()> {
        match self {
            Job::Scrape(config) => config.validate(),
            Job::Merge(config) => config.validate(),
        }
    }

    /// The list scrape underlying either job kind.
    pub fn list_config(&self) -> &ScrapeConfig {
        match self {
            Job::Scrape(config) => config,
            Job::Merge(config) => &config.list_config,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Job::Scrape(_) => "scrape",
            Job::Merge(_) => "merge",
        }
    }

    /// Default output file name for this job kind.
    pub fn default_output(&self) -> PathBuf {
        match self {
            Job::Scrape(_) => PathBuf::from("scraped_data.json"),
            Job::Merge(_) => PathBuf::from("merged_data.json"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn list_config() -> ScrapeConfig {
        ScrapeConfig::new(
            "https://example.com/list",
            vec![
                FieldSpec::new("title", "h3 a"),
                FieldSpec::new("link", "h3 a"),
            ],
            ".item",
        )
    }

    #[test]
    fn test_merge_config_rejects_unknown_url_field() {
        let result = MergeConfig::new(
            list_config(),
            vec![FieldSpec::new("body", ".content")],
            ".content",
            "href",
        );
        assert!(matches!(result, Err(ScrapeError::Config(_))));
    }

    #[test]
    fn test_merge_config_accepts_known_url_field() {
        let config = MergeConfig::new(
            list_config(),
            vec![FieldSpec::new("body", ".content")],
            ".content",
            "link",
        )
        .unwrap();
        assert_eq!(config.navigation_mode, NavigationMode::GoBack);
        assert_eq!(config.max_detail_retries, 2);
        assert!(config.continue_on_error);
        assert!(config.skip_invalid_urls);
    }

    #[test]
    fn test_duplicate_and_empty_fields_rejected() {
        let dup = ScrapeConfig::new(
            "https://example.com",
            vec![FieldSpec::new("a", ".x"), FieldSpec::new("a", ".y")],
            ".item",
        );
        assert!(matches!(dup.validate(), Err(ScrapeError::Config(_))));

        let empty = ScrapeConfig::new("https://example.com", vec![FieldSpec::new("a", " ")], ".item");
        assert!(matches!(empty.validate(), Err(ScrapeError::Config(_))));

        let no_container = ScrapeConfig::new("https://example.com", vec![FieldSpec::new("a", ".x")], "");
        assert!(no_container.validate().is_err());
    }

    #[test]
    fn test_page_range_and_template_validation() {
        assert!(list_config().with_page_range(3, 2).validate().is_err());
        assert!(list_config().with_page_range(0, 2).validate().is_err());
        assert!(list_config()
            .with_next_selector(".next")
            .with_page_range(2, 3)
            .validate()
            .is_ok());
        assert!(list_config().with_page_range(1, 3).validate().is_ok());

        // Pages before the range can't be turned without an affordance
        let unreachable = list_config().with_page_range(2, 3).validate();
        assert!(matches!(unreachable, Err(ScrapeError::Config(_))));
        assert!(list_config()
            .with_url_template("https://example.com/list?page={page}")
            .with_page_range(2, 3)
            .validate()
            .is_ok());
        assert!(list_config()
            .with_url_template("https://example.com/list?p=1")
            .validate()
            .is_err());
    }

    #[test]
    fn test_page_url_substitution() {
        let config = list_config().with_url_template("https://example.com/list?page={page}");
        assert_eq!(
            config.page_url(4).as_deref(),
            Some("https://example.com/list?page=4")
        );
        assert!(config.has_pagination());
        assert!(list_config().page_url(4).is_none());
        assert_eq!(
            fill_page_template("https://example.com/{page}/list?p={page}", 7),
            "https://example.com/7/list?p=7"
        );
    }

    #[test]
    fn test_list_fields_apply_url_attribute() {
        let config = MergeConfig::new(
            list_config(),
            vec![FieldSpec::new("body", ".content")],
            ".content",
            "link",
        )
        .unwrap();
        let fields = config.list_fields();
        assert_eq!(fields[0].attribute, None);
        assert_eq!(fields[1].attribute.as_deref(), Some("href"));
    }

    #[test]
    fn test_job_parses_shorthand_fields() {
        let json = r#"{
            "kind": "merge",
            "list_config": {
                "url": "https://example.com/list",
                "fields": {"标题": "h3 a", "链接": "h3 a"},
                "container_selector": ".item",
                "next_selector": "a[rel='next']",
                "page_range": [2, 3]
            },
            "detail_fields": [{"name": "tags", "selector": ".tag", "multiple": true}],
            "detail_container_selector": ".article",
            "detail_url_field": "链接",
            "navigation_mode": "go_back",
            "max_detail_retries": 1
        }"#;

        let job: Job = serde_json::from_str(json).unwrap();
        job.validate().unwrap();
        let Job::Merge(config) = job else {
            panic!("expected merge job");
        };
        assert_eq!(config.list_config.field_names(), vec!["标题", "链接"]);
        assert_eq!(config.list_config.page_range, Some((2, 3)));
        assert_eq!(config.list_config.delay_ms, 3000);
        assert!(config.detail_fields[0].multiple);
        assert_eq!(config.max_detail_retries, 1);
        assert_eq!(config.back_wait_ms, 2000);
        assert!(config.verify_list_page_state);
    }

    #[test]
    fn test_job_new_tab_mode_parses() {
        let json = r#"{
            "kind": "merge",
            "list_config": {"url": "u", "fields": {"link": "a"}, "container_selector": ".i"},
            "detail_fields": {"body": ".b"},
            "detail_container_selector": ".b",
            "detail_url_field": "link",
            "navigation_mode": "new_tab"
        }"#;
        let job: Job = serde_json::from_str(json).unwrap();
        assert!(job.validate().is_ok());
        match job {
            Job::Merge(config) => assert_eq!(config.navigation_mode, NavigationMode::NewTab),
            Job::Scrape(_) => panic!("expected merge job"),
        }
    }
}
