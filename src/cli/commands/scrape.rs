//! Flat list scrape command.

use std::path::Path;

use console::style;

use crate::config::Settings;
use crate::scrapers::UniversalScraper;

use crate::cli::helpers::{apply_overrides, load_job, open_page, print_saved, print_stop_reason};

/// Scrape the job's list pages into flat records.
pub async fn cmd_scrape(
    settings: &Settings,
    job_path: &Path,
    output: Option<&Path>,
    current_page: bool,
) -> anyhow::Result<()> {
    let job = load_job(job_path)?;
    let mut config = job.list_config().clone();
    apply_overrides(settings, &mut config);

    let output_path = settings.output_path(output.unwrap_or(&job.default_output()));

    println!(
        "{} Scraping {} ({} fields)",
        style("→").cyan(),
        config.url,
        config.fields.len()
    );

    let page = open_page(settings).await?;
    let mut scraper = UniversalScraper::new(page, config)?;
    if current_page {
        scraper.scrape_from_current_page().await;
    } else {
        scraper.scrape().await?;
    }

    settings.ensure_directories()?;
    let saved = scraper.save_to_json(&output_path)?;
    print_saved(&saved, scraper.records().len());
    print_stop_reason(scraper.pages_visited().len(), scraper.stop_reason());

    Ok(())
}
