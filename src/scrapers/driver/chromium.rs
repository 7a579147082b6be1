//! Page driver backed by chromiumoxide.
//!
//! Either attaches to a running Chrome over CDP (reusing its most recently
//! opened tab, so a user can log in or filter a list by hand first) or
//! launches a fresh browser.

use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::element::Element;
use chromiumoxide::page::Page;
use futures::StreamExt;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use super::{DriverError, DriverResult, ElementHandle, PageDriver, WaitUntil};
use crate::scrapers::wait::{poll_until, poll_until_stable, WaitConfig};

/// Quiet window used to approximate network idle.
const NETWORK_QUIET: Duration = Duration::from_millis(500);

const TEXT_CONTENT_FN: &str = "function() { return this.textContent; }";

const IS_VISIBLE_FN: &str = r#"function() {
    const style = window.getComputedStyle(this);
    if (style.visibility === 'hidden' || style.display === 'none') return false;
    const rect = this.getBoundingClientRect();
    return rect.width > 0 && rect.height > 0;
}"#;

const IS_ENABLED_FN: &str = r#"function() {
    if (this.disabled) return false;
    if (this.getAttribute('aria-disabled') === 'true') return false;
    return !this.classList.contains('disabled');
}"#;

/// Options for launching a local browser.
#[derive(Debug, Clone)]
pub struct LaunchOptions {
    pub headless: bool,
    pub window_size: (u32, u32),
    pub chrome_path: Option<String>,
    pub args: Vec<String>,
}

impl Default for LaunchOptions {
    fn default() -> Self {
        Self {
            headless: true,
            window_size: (1920, 1080),
            chrome_path: None,
            args: vec!["--disable-dev-shm-usage".to_string()],
        }
    }
}

impl LaunchOptions {
    fn to_browser_config(&self) -> DriverResult<BrowserConfig> {
        let mut config = BrowserConfig::builder().window_size(self.window_size.0, self.window_size.1);

        if !self.headless {
            config = config.with_head();
        }
        if let Some(path) = &self.chrome_path {
            config = config.chrome_executable(path.clone());
        }
        for arg in &self.args {
            config = config.arg(arg.clone());
        }

        config
            .build()
            .map_err(|e| DriverError::Connection(format!("invalid browser configuration: {e}")))
    }
}

/// A single browser tab driven over CDP.
pub struct ChromiumPage {
    page: Page,
    _browser: Browser,
    handler: JoinHandle<()>,
}

impl ChromiumPage {
    /// Attach to a running browser (`http://host:port` or a `ws://` debugger URL)
    /// and take its most recently opened page.
    pub async fn connect(cdp_url: &str) -> DriverResult<Self> {
        info!("Connecting to browser at {}", cdp_url);
        let (browser, handler) = Browser::connect(cdp_url)
            .await
            .map_err(|e| DriverError::Connection(e.to_string()))?;
        let handler = spawn_handler(handler);

        let pages = browser
            .pages()
            .await
            .map_err(|e| DriverError::Connection(e.to_string()))?;

        let page = match pages.into_iter().last() {
            Some(page) => page,
            None => {
                debug!("Browser has no open pages, creating one");
                browser
                    .new_page("about:blank")
                    .await
                    .map_err(|e| DriverError::Connection(e.to_string()))?
            }
        };

        Ok(Self {
            page,
            _browser: browser,
            handler,
        })
    }

    /// Launch a browser and open a blank page.
    pub async fn launch(options: &LaunchOptions) -> DriverResult<Self> {
        info!("Launching browser (headless: {})", options.headless);
        let (browser, handler) = Browser::launch(options.to_browser_config()?)
            .await
            .map_err(|e| DriverError::Connection(e.to_string()))?;
        let handler = spawn_handler(handler);

        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|e| DriverError::Connection(e.to_string()))?;

        Ok(Self {
            page,
            _browser: browser,
            handler,
        })
    }

    async fn evaluate<T: serde::de::DeserializeOwned>(&self, script: &str) -> DriverResult<T> {
        self.page
            .evaluate(script)
            .await
            .map_err(|e| DriverError::ScriptFailed(e.to_string()))?
            .into_value()
            .map_err(|e| DriverError::ScriptFailed(e.to_string()))
    }

    /// Run a script for its side effect. `undefined` and `null` results are fine.
    async fn run_script(&self, script: &str) -> DriverResult<serde_json::Value> {
        let result = self
            .page
            .evaluate(script)
            .await
            .map_err(|e| DriverError::ScriptFailed(e.to_string()))?;
        Ok(value_or_null(result.value().cloned()))
    }

    async fn wait_ready(&self, wait_until: WaitUntil, limit: Duration) -> DriverResult<()> {
        match wait_until {
            WaitUntil::DomContentLoaded => {
                let page = &self.page;
                poll_until(
                    || async move {
                        let state: String = page
                            .evaluate("document.readyState")
                            .await
                            .map_err(|e| DriverError::ScriptFailed(e.to_string()))?
                            .into_value()
                            .map_err(|e| DriverError::ScriptFailed(e.to_string()))?;
                        Ok(state != "loading")
                    },
                    WaitConfig::with_timeout(limit),
                    "DOMContentLoaded",
                )
                .await
            }
            WaitUntil::Load => {
                let page = &self.page;
                poll_until(
                    || async move {
                        let state: String = page
                            .evaluate("document.readyState")
                            .await
                            .map_err(|e| DriverError::ScriptFailed(e.to_string()))?
                            .into_value()
                            .map_err(|e| DriverError::ScriptFailed(e.to_string()))?;
                        Ok(state == "complete")
                    },
                    WaitConfig::with_timeout(limit),
                    "load",
                )
                .await
            }
            WaitUntil::NetworkIdle => {
                let page = &self.page;
                poll_until_stable(
                    || async move {
                        let count: u64 = page
                            .evaluate(
                                "document.readyState === 'complete' \
                                 ? performance.getEntriesByType('resource').length : -1",
                            )
                            .await
                            .map_err(|e| DriverError::ScriptFailed(e.to_string()))?
                            .into_value::<i64>()
                            .map_err(|e| DriverError::ScriptFailed(e.to_string()))
                            .and_then(|n| {
                                u64::try_from(n)
                                    .map_err(|_| DriverError::ScriptFailed("loading".to_string()))
                            })?;
                        Ok(count)
                    },
                    NETWORK_QUIET,
                    WaitConfig::with_timeout(limit),
                    "network idle",
                )
                .await
            }
        }
    }
}

impl Drop for ChromiumPage {
    fn drop(&mut self) {
        self.handler.abort();
    }
}

fn spawn_handler(mut handler: chromiumoxide::handler::Handler) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = handler.next().await {
            if let Err(e) = event {
                warn!("Browser handler error: {}", e);
                break;
            }
        }
    })
}

fn wrap(elements: Vec<Element>) -> Vec<Box<dyn ElementHandle>> {
    elements
        .into_iter()
        .map(|element| Box::new(ChromiumElement { element }) as Box<dyn ElementHandle>)
        .collect()
}

#[async_trait]
impl PageDriver for ChromiumPage {
    async fn goto(&self, url: &str, wait_until: WaitUntil, limit: Duration) -> DriverResult<()> {
        debug!("Navigating to {} (wait until {})", url, wait_until.as_str());
        let started = tokio::time::Instant::now();

        timeout(limit, self.page.goto(url))
            .await
            .map_err(|_| DriverError::NavigationFailed {
                url: url.to_string(),
                reason: format!("timed out after {:?}", limit),
            })?
            .map_err(|e| DriverError::NavigationFailed {
                url: url.to_string(),
                reason: e.to_string(),
            })?;

        let remaining = limit.saturating_sub(started.elapsed());
        self.wait_ready(wait_until, remaining).await
    }

    async fn wait_for_selector(&self, selector: &str, limit: Duration) -> DriverResult<()> {
        let page = &self.page;
        poll_until(
            || async move {
                Ok(!page
                    .find_elements(selector)
                    .await
                    .map_err(|e| DriverError::ScriptFailed(e.to_string()))?
                    .is_empty())
            },
            WaitConfig::with_timeout(limit),
            &format!("selector '{}'", selector),
        )
        .await
    }

    async fn locate_all(&self, selector: &str) -> DriverResult<Vec<Box<dyn ElementHandle>>> {
        match self.page.find_elements(selector).await {
            Ok(elements) => Ok(wrap(elements)),
            // CDP reports "no match" as an error on some versions
            Err(e) if e.to_string().contains("Could not find node") => Ok(Vec::new()),
            Err(e) => Err(DriverError::ScriptFailed(e.to_string())),
        }
    }

    async fn document(&self) -> DriverResult<Box<dyn ElementHandle>> {
        let element = self
            .page
            .find_element("html")
            .await
            .map_err(|_| DriverError::ElementNotFound("html".to_string()))?;
        Ok(Box::new(ChromiumElement { element }))
    }

    async fn go_back(&self, wait_until: WaitUntil, limit: Duration) -> DriverResult<()> {
        let before = self.current_url().await?;
        self.run_script("window.history.back()").await?;

        let page = &self.page;
        let before_ref = before.as_str();
        poll_until(
            || async move {
                let url = page
                    .url()
                    .await
                    .map_err(|e| DriverError::ScriptFailed(e.to_string()))?;
                Ok(url.as_deref().is_some_and(|u| u != before_ref))
            },
            WaitConfig::with_timeout(limit),
            "history back",
        )
        .await?;

        self.wait_ready(wait_until, limit).await
    }

    async fn wait_for_load_state(&self, state: WaitUntil, limit: Duration) -> DriverResult<()> {
        self.wait_ready(state, limit).await
    }

    async fn current_url(&self) -> DriverResult<String> {
        match self.page.url().await {
            Ok(Some(url)) => Ok(url),
            Ok(None) => self.evaluate("window.location.href").await,
            Err(e) => Err(DriverError::ScriptFailed(e.to_string())),
        }
    }
}

struct ChromiumElement {
    element: Element,
}

impl ChromiumElement {
    async fn call_fn(&self, function: &str) -> DriverResult<serde_json::Value> {
        let returns = self
            .element
            .call_js_fn(function, false)
            .await
            .map_err(|e| classify(e.to_string()))?;
        Ok(value_or_null(returns.result.value))
    }
}

/// CDP omits `value` for `undefined` and deserializes `null` as absent.
fn value_or_null(value: Option<serde_json::Value>) -> serde_json::Value {
    value.unwrap_or(serde_json::Value::Null)
}

/// Stale node ids mean the page navigated underneath the handle.
fn classify(message: String) -> DriverError {
    if message.contains("No node") || message.contains("Cannot find context") {
        DriverError::Detached
    } else {
        DriverError::ScriptFailed(message)
    }
}

#[async_trait]
impl ElementHandle for ChromiumElement {
    async fn locate_all(&self, selector: &str) -> DriverResult<Vec<Box<dyn ElementHandle>>> {
        match self.element.find_elements(selector).await {
            Ok(elements) => Ok(wrap(elements)),
            Err(e) if e.to_string().contains("Could not find node") => Ok(Vec::new()),
            Err(e) => Err(classify(e.to_string())),
        }
    }

    async fn text_content(&self) -> DriverResult<Option<String>> {
        Ok(self.call_fn(TEXT_CONTENT_FN).await?.as_str().map(str::to_string))
    }

    async fn attribute(&self, name: &str) -> DriverResult<Option<String>> {
        self.element
            .attribute(name)
            .await
            .map_err(|e| classify(e.to_string()))
    }

    async fn is_visible(&self) -> DriverResult<bool> {
        Ok(self.call_fn(IS_VISIBLE_FN).await?.as_bool().unwrap_or(false))
    }

    async fn is_enabled(&self) -> DriverResult<bool> {
        Ok(self.call_fn(IS_ENABLED_FN).await?.as_bool().unwrap_or(true))
    }

    async fn click(&self) -> DriverResult<()> {
        self.element
            .click()
            .await
            .map_err(|e| classify(e.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_detached_node() {
        assert!(matches!(
            classify("No node with given id found".to_string()),
            DriverError::Detached
        ));
        assert!(matches!(
            classify("Runtime.callFunctionOn failed".to_string()),
            DriverError::ScriptFailed(_)
        ));
    }

    #[test]
    fn test_missing_script_value_is_null() {
        assert_eq!(value_or_null(None), serde_json::Value::Null);
        assert_eq!(
            value_or_null(Some(serde_json::json!("https://example.com/list"))),
            serde_json::json!("https://example.com/list")
        );
    }

    #[test]
    fn test_launch_options_default_headless() {
        let options = LaunchOptions::default();
        assert!(options.headless);
        assert_eq!(options.window_size, (1920, 1080));
        assert!(options.chrome_path.is_none());
    }
}
