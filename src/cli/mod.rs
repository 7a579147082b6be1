//! Command line interface.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::config::{load_settings_with_options, LoadOptions, Settings};

pub mod commands;
pub mod helpers;

/// Scrape paginated lists and their detail pages into JSON.
#[derive(Parser)]
#[command(name = "mergescrape")]
#[command(version)]
pub struct Cli {
    /// Configuration file (JSON); discovered automatically if omitted
    #[arg(long, env = "MERGESCRAPE_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Resolve relative config paths against the current directory
    #[arg(long, global = true)]
    pub cwd: bool,

    /// Directory for result files
    #[arg(long, global = true)]
    pub output_dir: Option<PathBuf>,

    /// Debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// How to reach the browser.
#[derive(Args, Debug, Clone, Default)]
pub struct BrowserArgs {
    /// Attach to a running browser at this CDP endpoint instead of launching one
    #[arg(long)]
    pub cdp_url: Option<String>,

    /// Launch the browser with a visible window
    #[arg(long)]
    pub headed: bool,

    /// Scrape the page the browser already shows instead of opening the job URL
    #[arg(long)]
    pub current_page: bool,
}

impl BrowserArgs {
    fn apply(&self, settings: &mut Settings) {
        if let Some(url) = &self.cdp_url {
            settings.cdp_url = Some(url.clone());
        }
        if self.headed {
            settings.headless = false;
        }
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Flat list scrape (uses the list part of a merge job)
    Scrape {
        /// Job file
        job: PathBuf,

        /// Output file, relative to the output directory
        #[arg(short, long)]
        output: Option<PathBuf>,

        #[command(flatten)]
        browser: BrowserArgs,
    },

    /// List + detail merged scrape
    Merge {
        /// Job file (kind "merge")
        job: PathBuf,

        /// Output file, relative to the output directory
        #[arg(short, long)]
        output: Option<PathBuf>,

        #[command(flatten)]
        browser: BrowserArgs,
    },

    /// Show the first records of the list page without saving
    Preview {
        /// Job file
        job: PathBuf,

        /// Number of records to show
        #[arg(short, long, default_value_t = 5)]
        limit: usize,

        #[command(flatten)]
        browser: BrowserArgs,
    },

    /// Check a job file without opening a browser
    Validate {
        /// Job file
        job: PathBuf,
    },
}

/// Load settings and dispatch the selected command.
pub async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut settings = load_settings_with_options(LoadOptions {
        config_path: cli.config.clone(),
        use_cwd: cli.cwd,
        output_dir: cli.output_dir.clone(),
    })
    .await;

    match cli.command {
        Commands::Scrape {
            job,
            output,
            browser,
        } => {
            browser.apply(&mut settings);
            commands::cmd_scrape(&settings, &job, output.as_deref(), browser.current_page).await
        }
        Commands::Merge {
            job,
            output,
            browser,
        } => {
            browser.apply(&mut settings);
            commands::cmd_merge(&settings, &job, output.as_deref(), browser.current_page).await
        }
        Commands::Preview {
            job,
            limit,
            browser,
        } => {
            browser.apply(&mut settings);
            commands::cmd_preview(&settings, &job, limit, browser.current_page).await
        }
        Commands::Validate { job } => commands::cmd_validate(&job),
    }
}
