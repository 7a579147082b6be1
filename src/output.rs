//! JSON result documents.
//!
//! Output is pretty-printed UTF-8 with non-ASCII text kept literal. Field
//! order is fixed by the types below and by each record's field order, so
//! saving the same records twice gives the same bytes.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::debug;

use crate::error::Result;
use crate::scrapers::config::{MergeConfig, ScrapeConfig};
use crate::scrapers::models::{MergedRecord, Record, RunStats};

/// Written during a merged run so an interrupted run leaves something behind.
pub const PARTIAL_RESULTS_FILENAME: &str = "partial_merged_data.json";

/// The parts of a merged job echoed into its output.
#[derive(Debug, Clone, Serialize)]
pub struct ConfigSummary {
    pub list_url: String,
    pub list_fields: Vec<String>,
    pub detail_fields: Vec<String>,
    pub detail_url_field: String,
}

impl From<&MergeConfig> for ConfigSummary {
    fn from(config: &MergeConfig) -> Self {
        Self {
            list_url: config.list_config.url.clone(),
            list_fields: config.list_config.field_names(),
            detail_fields: config.detail_field_names(),
            detail_url_field: config.detail_url_field.clone(),
        }
    }
}

#[derive(Serialize)]
struct MergedMetadata<'a> {
    total_items: usize,
    statistics: &'a RunStats,
    config: ConfigSummary,
}

#[derive(Serialize)]
struct MergedDocument<'a> {
    metadata: MergedMetadata<'a>,
    data: &'a [MergedRecord],
}

#[derive(Serialize)]
struct FlatMetadata<'a> {
    total_items: usize,
    url: &'a str,
    fields: Vec<String>,
}

#[derive(Serialize)]
struct FlatDocument<'a> {
    metadata: FlatMetadata<'a>,
    data: &'a [Record],
}

pub fn render_merged(
    records: &[MergedRecord],
    stats: &RunStats,
    config: &MergeConfig,
) -> Result<String> {
    let document = MergedDocument {
        metadata: MergedMetadata {
            total_items: records.len(),
            statistics: stats,
            config: ConfigSummary::from(config),
        },
        data: records,
    };
    Ok(serde_json::to_string_pretty(&document)?)
}

/// Write a merged result document, replacing any existing file.
pub fn save_merged(
    path: &Path,
    records: &[MergedRecord],
    stats: &RunStats,
    config: &MergeConfig,
) -> Result<PathBuf> {
    let contents = render_merged(records, stats, config)?;
    write_document(path, &contents)
}

pub fn render_flat(records: &[Record], config: &ScrapeConfig) -> Result<String> {
    let document = FlatDocument {
        metadata: FlatMetadata {
            total_items: records.len(),
            url: &config.url,
            fields: config.field_names(),
        },
        data: records,
    };
    Ok(serde_json::to_string_pretty(&document)?)
}

/// Write a flat result document, replacing any existing file.
pub fn save_flat(path: &Path, records: &[Record], config: &ScrapeConfig) -> Result<PathBuf> {
    let contents = render_flat(records, config)?;
    write_document(path, &contents)
}

fn write_document(path: &Path, contents: &str) -> Result<PathBuf> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    fs::write(path, contents)?;
    debug!("Wrote {} bytes to {}", contents.len(), path.display());
    Ok(path.to_path_buf())
}
