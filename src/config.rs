//! Configuration management for mergescrape using the prefer crate.
//!
//! Precedence, lowest first: built-in defaults, the config file (discovered
//! or given with `--config`), `MERGESCRAPE_*` environment variables, then
//! command line flags.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::output::PARTIAL_RESULTS_FILENAME;

/// Environment variable naming a running browser's CDP endpoint.
pub const ENV_CDP_URL: &str = "MERGESCRAPE_CDP_URL";
/// Environment variable overriding the output directory.
pub const ENV_OUTPUT_DIR: &str = "MERGESCRAPE_OUTPUT_DIR";
/// Environment variable selecting headless (`true`) or headed (`false`) launch.
pub const ENV_HEADLESS: &str = "MERGESCRAPE_HEADLESS";

/// Application settings.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Directory relative output paths are written to.
    pub output_dir: PathBuf,
    /// Filename for partial results of merged runs.
    pub partial_filename: String,
    /// Attach to this browser instead of launching one.
    pub cdp_url: Option<String>,
    /// Launch the browser without a window.
    pub headless: bool,
    /// Browser executable; auto-detected if unset.
    pub chrome_path: Option<String>,
    /// Window size of a launched browser.
    pub window_size: (u32, u32),
    /// Overrides the job's page delay in milliseconds.
    pub delay_ms: Option<u64>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("."),
            partial_filename: PARTIAL_RESULTS_FILENAME.to_string(),
            cdp_url: None,
            headless: true,
            chrome_path: None,
            window_size: (1920, 1080),
            delay_ms: None,
        }
    }
}

impl Settings {
    /// Resolve an output file name against the output directory.
    pub fn output_path(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.output_dir.join(path)
        }
    }

    /// Full path of the partial results file.
    pub fn partial_path(&self) -> PathBuf {
        self.output_dir.join(&self.partial_filename)
    }

    /// Ensure the output directory exists.
    pub fn ensure_directories(&self) -> std::io::Result<()> {
        fs::create_dir_all(&self.output_dir)
    }

    #[cfg(feature = "browser")]
    pub fn launch_options(&self) -> crate::scrapers::driver::LaunchOptions {
        crate::scrapers::driver::LaunchOptions {
            headless: self.headless,
            window_size: self.window_size,
            chrome_path: self.chrome_path.clone(),
            ..Default::default()
        }
    }

    /// Apply `MERGESCRAPE_*` overrides read through `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(ENV_CDP_URL).filter(|v| !v.trim().is_empty()) {
            self.cdp_url = Some(url);
        }
        if let Some(dir) = lookup(ENV_OUTPUT_DIR).filter(|v| !v.trim().is_empty()) {
            self.output_dir = PathBuf::from(shellexpand::tilde(&dir).as_ref());
        }
        if let Some(headless) = lookup(ENV_HEADLESS).and_then(|v| parse_bool(&v)) {
            self.headless = headless;
        }
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Configuration file structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Output directory for result files.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_dir: Option<String>,
    /// Partial results filename.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partial_filename: Option<String>,
    /// CDP endpoint of a running browser, e.g. `http://localhost:9222`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cdp_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headless: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chrome_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub window_size: Option<(u32, u32)>,
    /// Page delay in milliseconds, overriding the job's.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delay_ms: Option<u64>,

    /// Path to the config file this was loaded from (not serialized).
    #[serde(skip)]
    pub source_path: Option<PathBuf>,
}

impl Config {
    /// Load configuration using prefer crate.
    /// Automatically discovers mergescrape config files in standard locations.
    pub async fn load() -> Self {
        match prefer::load("mergescrape").await {
            Ok(pref_config) => {
                let output_dir: Option<String> = pref_config.get("output_dir").ok();
                let partial_filename: Option<String> =
                    pref_config.get("partial_filename").ok();
                let cdp_url: Option<String> = pref_config.get("cdp_url").ok();
                let headless: Option<bool> = pref_config.get("headless").ok();
                let chrome_path: Option<String> = pref_config.get("chrome_path").ok();
                let window_size: Option<(u32, u32)> = pref_config
                    .get::<Vec<u32>>("window_size")
                    .ok()
                    .and_then(|v| match v.as_slice() {
                        [w, h] => Some((*w, *h)),
                        _ => None,
                    });
                let delay_ms: Option<u64> = pref_config.get("delay_ms").ok();

                let source_path = pref_config.source_path().cloned();

                Config {
                    output_dir,
                    partial_filename,
                    cdp_url,
                    headless,
                    chrome_path,
                    window_size,
                    delay_ms,
                    source_path,
                }
            }
            Err(_) => {
                // No config file found, use defaults
                Self::default()
            }
        }
    }

    /// Load configuration from a specific file path.
    pub async fn load_from_path(path: &Path) -> Result<Self, String> {
        let contents = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| format!("Failed to read config file: {}", e))?;

        let mut config: Config = serde_json::from_str(&contents)
            .map_err(|e| format!("Failed to parse config file: {}", e))?;

        config.source_path = Some(path.to_path_buf());
        Ok(config)
    }

    /// Get the base directory for resolving relative paths.
    pub fn base_dir(&self) -> Option<PathBuf> {
        self.source_path
            .as_ref()
            .and_then(|p| p.parent().map(|p| p.to_path_buf()))
    }

    /// Resolve a path that may be relative to the config file.
    /// - Absolute paths are returned as-is
    /// - Paths starting with ~ are expanded
    /// - Relative paths are resolved relative to `base_dir`
    pub fn resolve_path(&self, path_str: &str, base_dir: &Path) -> PathBuf {
        let expanded = shellexpand::tilde(path_str);
        let path = Path::new(expanded.as_ref());

        if path.is_absolute() {
            path.to_path_buf()
        } else {
            base_dir.join(path)
        }
    }

    /// Apply configuration to settings.
    pub fn apply_to_settings(&self, settings: &mut Settings, base_dir: &Path) {
        if let Some(ref dir) = self.output_dir {
            settings.output_dir = self.resolve_path(dir, base_dir);
        }
        if let Some(ref name) = self.partial_filename {
            settings.partial_filename = name.clone();
        }
        if let Some(ref url) = self.cdp_url {
            settings.cdp_url = Some(url.clone());
        }
        if let Some(headless) = self.headless {
            settings.headless = headless;
        }
        if let Some(ref path) = self.chrome_path {
            settings.chrome_path = Some(path.clone());
        }
        if let Some(size) = self.window_size {
            settings.window_size = size;
        }
        if let Some(delay) = self.delay_ms {
            settings.delay_ms = Some(delay);
        }
    }
}

/// Options for loading settings.
#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    /// Explicit config file path (overrides auto-discovery).
    pub config_path: Option<PathBuf>,
    /// Use CWD for relative paths instead of config file directory.
    pub use_cwd: bool,
    /// Override output directory (--output-dir flag).
    pub output_dir: Option<PathBuf>,
}

/// Load settings with explicit options.
pub async fn load_settings_with_options(options: LoadOptions) -> Settings {
    let config = match &options.config_path {
        Some(path) => match Config::load_from_path(path).await {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!("{}; using defaults", e);
                Config::default()
            }
        },
        None => Config::load().await,
    };

    let mut settings = Settings::default();

    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    let base_dir = if options.use_cwd {
        cwd
    } else {
        config.base_dir().unwrap_or(cwd)
    };

    config.apply_to_settings(&mut settings, &base_dir);
    settings.apply_env(|key| std::env::var(key).ok());

    // --output-dir override takes precedence
    if let Some(output_dir) = options.output_dir {
        settings.output_dir = output_dir;
    }

    settings
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_relative_output_dir_resolves_against_config_dir() {
        let config = Config {
            output_dir: Some("results".to_string()),
            headless: Some(false),
            delay_ms: Some(500),
            ..Default::default()
        };
        let mut settings = Settings::default();
        config.apply_to_settings(&mut settings, Path::new("/etc/mergescrape"));

        assert_eq!(settings.output_dir, PathBuf::from("/etc/mergescrape/results"));
        assert!(!settings.headless);
        assert_eq!(settings.delay_ms, Some(500));
        assert_eq!(
            settings.partial_path(),
            PathBuf::from("/etc/mergescrape/results/partial_merged_data.json")
        );
    }

    #[test]
    fn test_output_path_keeps_absolute() {
        let settings = Settings {
            output_dir: PathBuf::from("/data"),
            ..Default::default()
        };
        assert_eq!(
            settings.output_path(Path::new("out.json")),
            PathBuf::from("/data/out.json")
        );
        assert_eq!(
            settings.output_path(Path::new("/tmp/out.json")),
            PathBuf::from("/tmp/out.json")
        );
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            (ENV_CDP_URL, "http://localhost:9222"),
            (ENV_OUTPUT_DIR, "/srv/out"),
            (ENV_HEADLESS, "false"),
        ]
        .into_iter()
        .collect();

        let mut settings = Settings::default();
        settings.apply_env(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(settings.cdp_url.as_deref(), Some("http://localhost:9222"));
        assert_eq!(settings.output_dir, PathBuf::from("/srv/out"));
        assert!(!settings.headless);

        // Unparseable values leave the setting alone
        settings.apply_env(|key| (key == ENV_HEADLESS).then(|| "maybe".to_string()));
        assert!(!settings.headless);
    }

    #[tokio::test]
    async fn test_load_from_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mergescrape.json");
        fs::write(
            &path,
            r#"{"output_dir": "out", "cdp_url": "http://127.0.0.1:9222", "window_size": [1280, 800]}"#,
        )
        .unwrap();

        let config = Config::load_from_path(&path).await.unwrap();
        assert_eq!(config.base_dir().as_deref(), Some(dir.path()));
        assert_eq!(config.window_size, Some((1280, 800)));

        let mut settings = Settings::default();
        config.apply_to_settings(&mut settings, dir.path());
        assert_eq!(settings.output_dir, dir.path().join("out"));

        assert!(Config::load_from_path(&dir.path().join("missing.json"))
            .await
            .is_err());
    }
}
