//! Job file validation command.

use std::path::Path;

use console::style;

use crate::scrapers::Job;

use crate::cli::helpers::load_job;

/// Validate a job file and summarize it.
pub fn cmd_validate(job_path: &Path) -> anyhow::Result<()> {
    let job = load_job(job_path)?;
    let list = job.list_config();

    println!("{} {} is a valid {} job", style("✓").green(), job_path.display(), job.kind());
    println!("{:<20} {}", "URL:", list.url);
    println!("{:<20} {}", "Container:", list.container_selector);
    println!("{:<20} {}", "List fields:", list.field_names().join(", "));

    let pagination = match (&list.next_selector, &list.url_template) {
        (Some(selector), _) => format!("click '{}'", selector),
        (None, Some(template)) => format!("template {}", template),
        (None, None) => "single page".to_string(),
    };
    println!("{:<20} {}", "Pagination:", pagination);
    if let Some((start, end)) = list.page_range {
        println!("{:<20} {}-{}", "Page range:", start, end);
    }
    if list.max_pages > 0 {
        println!("{:<20} {}", "Max pages:", list.max_pages);
    }

    if let Job::Merge(config) = &job {
        println!("{:<20} {}", "Detail fields:", config.detail_field_names().join(", "));
        println!("{:<20} {}", "Detail container:", config.detail_container_selector);
        println!("{:<20} {}", "Detail URL field:", config.detail_url_field);
        println!("{:<20} {}", "Navigation:", config.navigation_mode.as_str());
        println!("{:<20} {}", "Retries:", config.max_detail_retries);
    }

    Ok(())
}
