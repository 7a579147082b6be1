//! Preview command for checking selectors against a live page.

use std::path::Path;

use console::style;

use crate::config::Settings;
use crate::scrapers::driver::WaitUntil;
use crate::scrapers::{PageDriver, UniversalScraper};

use crate::cli::helpers::{load_job, open_page, print_record};

/// Print the first `limit` records of the job's list page.
pub async fn cmd_preview(
    settings: &Settings,
    job_path: &Path,
    limit: usize,
    current_page: bool,
) -> anyhow::Result<()> {
    let job = load_job(job_path)?;
    let config = job.list_config().clone();

    let page = open_page(settings).await?;
    if !current_page {
        page.goto(
            &config.url,
            WaitUntil::DomContentLoaded,
            config.timeouts.navigation(),
        )
        .await?;
    }

    let scraper = UniversalScraper::new(page, config)?;
    let records = scraper.preview(limit).await;

    if records.is_empty() {
        println!(
            "{} No records matched '{}'",
            style("!").yellow(),
            scraper.config().container_selector
        );
        return Ok(());
    }

    println!("\n{}", style("Preview").bold());
    println!("{}", "-".repeat(60));
    for (index, record) in records.iter().enumerate() {
        print_record(index, record);
    }

    Ok(())
}
