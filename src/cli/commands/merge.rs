//! Merged list + detail scrape command.

use std::path::Path;

use console::style;

use crate::config::Settings;
use crate::scrapers::{Job, MergedScraper};

use crate::cli::helpers::{
    apply_overrides, load_job, open_page, print_run_stats, print_saved, print_stop_reason,
};

/// Scrape every list item together with its detail page.
///
/// An aborted run still leaves its records in the partial results file.
pub async fn cmd_merge(
    settings: &Settings,
    job_path: &Path,
    output: Option<&Path>,
    current_page: bool,
) -> anyhow::Result<()> {
    let job = load_job(job_path)?;
    let output_path = settings.output_path(output.unwrap_or(&job.default_output()));
    let Job::Merge(mut config) = job else {
        anyhow::bail!(
            "{} is a flat scrape job; use `mergescrape scrape`",
            job_path.display()
        );
    };
    apply_overrides(settings, &mut config.list_config);

    println!(
        "{} Merging {} ({} list fields, {} detail fields, via '{}')",
        style("→").cyan(),
        config.list_config.url,
        config.list_config.fields.len(),
        config.detail_fields.len(),
        config.detail_url_field
    );

    settings.ensure_directories()?;
    let page = open_page(settings).await?;
    let mut scraper = MergedScraper::new(page, config)?.with_partial_path(settings.partial_path());

    let result = if current_page {
        scraper.scrape_from_current_page().await.map(|r| r.len())
    } else {
        scraper.scrape().await.map(|r| r.len())
    };

    print_run_stats(scraper.stats());

    if let Err(e) = result {
        if !scraper.records().is_empty() {
            println!(
                "{} Partial results ({} records) in {}",
                style("!").yellow(),
                scraper.records().len(),
                scraper.partial_path().display()
            );
        }
        return Err(e.into());
    }

    let saved = scraper.save_to_json(&output_path)?;
    print_saved(&saved, scraper.records().len());
    let pages = scraper
        .records()
        .iter()
        .map(|r| r.metadata.list_page)
        .collect::<std::collections::BTreeSet<_>>()
        .len();
    print_stop_reason(pages, scraper.stop_reason());

    Ok(())
}
