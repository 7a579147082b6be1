//! Records produced by the scrapers.

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// An extracted value: a single string, or one entry per matched element
/// for `multiple` fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Text(String),
    List(Vec<Option<String>>),
}

impl FieldValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            FieldValue::List(_) => None,
        }
    }
}

/// Field name -> extracted value, in field configuration order.
///
/// `None` means the selector matched nothing or extraction failed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record(IndexMap<String, Option<FieldValue>>);

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: Option<FieldValue>) {
        self.0.insert(name.into(), value);
    }

    /// The value of `name`, flattening "absent" and "extracted as null".
    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.0.get(name).and_then(Option::as_ref)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }
}

impl FromIterator<(String, Option<FieldValue>)> for Record {
    fn from_iter<I: IntoIterator<Item = (String, Option<FieldValue>)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Lifecycle of one merged record. `Pending` is the only non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScrapeStatus {
    Pending,
    Success,
    Failed,
    Skipped,
}

impl ScrapeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScrapeStatus::Pending => "pending",
            ScrapeStatus::Success => "success",
            ScrapeStatus::Failed => "failed",
            ScrapeStatus::Skipped => "skipped",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, ScrapeStatus::Pending)
    }
}

/// Bookkeeping attached to every merged record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordMetadata {
    /// 1-based list page number.
    pub list_page: u32,
    /// 0-based position of the item on its list page, in document order.
    pub item_index: usize,
    pub detail_url: Option<String>,
    pub scrape_status: ScrapeStatus,
    pub error_message: Option<String>,
    /// Failure returning to the list page after the detail visit.
    pub navigation_error: Option<String>,
    /// Detail fetch attempts made (0 when no navigation happened).
    pub attempts: u32,
    pub scraped_at: DateTime<Utc>,
}

/// One list item merged with its detail page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergedRecord {
    pub list_data: Record,
    pub detail_data: Record,
    pub metadata: RecordMetadata,
}

impl MergedRecord {
    pub fn pending(list_data: Record, item_index: usize, list_page: u32) -> Self {
        Self {
            list_data,
            detail_data: Record::new(),
            metadata: RecordMetadata {
                list_page,
                item_index,
                detail_url: None,
                scrape_status: ScrapeStatus::Pending,
                error_message: None,
                navigation_error: None,
                attempts: 0,
                scraped_at: Utc::now(),
            },
        }
    }

    pub fn status(&self) -> ScrapeStatus {
        self.metadata.scrape_status
    }

    pub fn mark_success(&mut self, detail_data: Record) {
        debug_assert!(!self.status().is_terminal());
        self.detail_data = detail_data;
        self.metadata.scrape_status = ScrapeStatus::Success;
        self.metadata.error_message = None;
    }

    pub fn mark_failed(&mut self, reason: impl Into<String>) {
        debug_assert!(!self.status().is_terminal());
        self.metadata.scrape_status = ScrapeStatus::Failed;
        self.metadata.error_message = Some(reason.into());
    }

    pub fn mark_skipped(&mut self, reason: impl Into<String>) {
        debug_assert!(!self.status().is_terminal());
        self.metadata.scrape_status = ScrapeStatus::Skipped;
        self.metadata.error_message = Some(reason.into());
    }
}

/// Counters for one merged run. Only grow; a new scraper starts from zero.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStats {
    pub total_list_items: u64,
    pub successful_details: u64,
    pub failed_details: u64,
    pub skipped_details: u64,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
}

impl RunStats {
    /// Successful details as a percentage of list items, if any were seen.
    pub fn success_rate(&self) -> Option<f64> {
        if self.total_list_items == 0 {
            return None;
        }
        Some(self.successful_details as f64 / self.total_list_items as f64 * 100.0)
    }

    pub(crate) fn record_outcome(&mut self, status: ScrapeStatus) {
        match status {
            ScrapeStatus::Success => self.successful_details += 1,
            ScrapeStatus::Failed => self.failed_details += 1,
            ScrapeStatus::Skipped => self.skipped_details += 1,
            ScrapeStatus::Pending => {}
        }
    }
}
