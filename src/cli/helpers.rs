//! Shared helper functions for CLI commands.

use std::path::Path;

use anyhow::Context;
use console::style;

use crate::config::Settings;
use crate::scrapers::driver::ChromiumPage;
use crate::scrapers::{FieldValue, Job, Record, RunStats, ScrapeConfig, StopReason};

/// Load and validate a job file.
pub fn load_job(path: &Path) -> anyhow::Result<Job> {
    Job::load(path).with_context(|| format!("Failed to load job {}", path.display()))
}

/// Apply settings that override job values.
pub fn apply_overrides(settings: &Settings, config: &mut ScrapeConfig) {
    if let Some(delay) = settings.delay_ms {
        config.delay_ms = delay;
    }
}

/// Attach to the configured browser, or launch one.
pub async fn open_page(settings: &Settings) -> anyhow::Result<ChromiumPage> {
    let page = match &settings.cdp_url {
        Some(url) => ChromiumPage::connect(url)
            .await
            .with_context(|| format!("Failed to connect to browser at {}", url))?,
        None => ChromiumPage::launch(&settings.launch_options())
            .await
            .context("Failed to launch browser")?,
    };
    Ok(page)
}

/// Truncate a string to a maximum number of characters.
pub fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        return s.to_string();
    }
    let kept: String = s.chars().take(max_chars.saturating_sub(3)).collect();
    format!("{}...", kept)
}

/// One-line rendering of a field value for terminal output.
pub fn display_value(value: Option<&FieldValue>) -> String {
    match value {
        None => "-".to_string(),
        Some(FieldValue::Text(text)) => text.clone(),
        Some(FieldValue::List(items)) => items
            .iter()
            .map(|item| item.as_deref().unwrap_or("-"))
            .collect::<Vec<_>>()
            .join(", "),
    }
}

pub fn print_record(index: usize, record: &Record) {
    println!("{}", style(format!("#{}", index + 1)).bold());
    for name in record.field_names() {
        println!(
            "  {:<20} {}",
            format!("{}:", truncate(name, 19)),
            truncate(&display_value(record.get(name)), 80)
        );
    }
}

pub fn print_stop_reason(pages: usize, reason: Option<&StopReason>) {
    if let Some(reason) = reason {
        println!("{:<20} {} ({})", "Pages:", pages, reason);
    }
}

/// Print the statistics summary of a merged run.
pub fn print_run_stats(stats: &RunStats) {
    println!("\n{}", style("Scrape Statistics").bold());
    println!("{}", "-".repeat(40));
    println!("{:<20} {}", "List items:", stats.total_list_items);
    println!(
        "{:<20} {}",
        "Succeeded:",
        style(stats.successful_details).green()
    );
    println!("{:<20} {}", "Failed:", style(stats.failed_details).red());
    println!("{:<20} {}", "Skipped:", style(stats.skipped_details).yellow());
    if let Some(rate) = stats.success_rate() {
        println!("{:<20} {:.1}%", "Success rate:", rate);
    }
    if let (Some(start), Some(end)) = (stats.start_time, stats.end_time) {
        let elapsed = end - start;
        println!("{:<20} {}s", "Elapsed:", elapsed.num_seconds());
    }
}

pub fn print_saved(path: &Path, count: usize) {
    println!(
        "{} Saved {} records to {}",
        style("✓").green(),
        count,
        path.display()
    );
}
