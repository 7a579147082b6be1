//! In-memory page driver for tests.
//!
//! A `FakeSite` is a set of pages keyed by URL. Each page is a tree of
//! `FakeElement`s where children are grouped under the selector that finds
//! them, so `locate_all(".item")` returns exactly the children registered as
//! `.item`. Navigation keeps a history stack and bumps an epoch; element
//! handles from an earlier epoch report `Detached`, like a real browser after
//! the page changed underneath them. Navigating to the URL already shown
//! replaces the history entry instead of pushing one.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;

use super::config::{FieldSpec, MergeConfig, ScrapeConfig};
use super::driver::{DriverError, DriverResult, ElementHandle, PageDriver, WaitUntil};

#[derive(Debug, Clone, Default)]
pub struct FakeElement {
    text: Option<String>,
    attributes: HashMap<String, String>,
    hidden: bool,
    disabled: bool,
    broken: bool,
    navigates_to: Option<String>,
    children: Vec<(String, FakeElement)>,
}

impl FakeElement {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    pub fn child(mut self, selector: impl Into<String>, element: FakeElement) -> Self {
        self.children.push((selector.into(), element));
        self
    }

    pub fn hidden(mut self) -> Self {
        self.hidden = true;
        self
    }

    pub fn disabled(mut self) -> Self {
        self.disabled = true;
        self
    }

    /// Reading this element fails with a driver error.
    pub fn broken(mut self) -> Self {
        self.broken = true;
        self
    }

    /// Clicking this element navigates the page to `url`.
    pub fn navigates_to(mut self, url: impl Into<String>) -> Self {
        self.navigates_to = Some(url.into());
        self
    }

    fn matching(&self, selector: &str) -> Vec<FakeElement> {
        self.children
            .iter()
            .filter(|(s, _)| s == selector)
            .map(|(_, e)| e.clone())
            .collect()
    }
}

#[derive(Debug, Clone)]
pub struct FakePage {
    url: String,
    root: FakeElement,
}

impl FakePage {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            root: FakeElement::new(),
        }
    }

    pub fn with(mut self, selector: impl Into<String>, element: FakeElement) -> Self {
        self.root = self.root.child(selector, element);
        self
    }
}

#[derive(Debug, Default)]
struct SiteState {
    pages: HashMap<String, FakePage>,
    current: Option<String>,
    history: Vec<String>,
    epoch: u64,
    goto_log: Vec<String>,
    goto_failures: HashMap<String, u32>,
    back_failures: u32,
    back_count: u32,
    clicks: u32,
}

impl SiteState {
    fn navigate(&mut self, url: &str) -> DriverResult<()> {
        if !self.pages.contains_key(url) {
            return Err(DriverError::NavigationFailed {
                url: url.to_string(),
                reason: "404".to_string(),
            });
        }
        // Same-URL navigation replaces the entry, as browsers do
        if let Some(current) = self.current.take() {
            if current != url {
                self.history.push(current);
            }
        }
        self.current = Some(url.to_string());
        self.epoch += 1;
        Ok(())
    }

    fn current_page(&self) -> DriverResult<&FakePage> {
        self.current
            .as_ref()
            .and_then(|url| self.pages.get(url))
            .ok_or(DriverError::Closed)
    }
}

/// Shared handle to an in-memory site; clones observe the same state.
#[derive(Debug, Clone, Default)]
pub struct FakeSite {
    state: Arc<Mutex<SiteState>>,
}

impl FakeSite {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn page(self, page: FakePage) -> Self {
        self.lock().pages.insert(page.url.clone(), page);
        self
    }

    /// Open `url` without recording a navigation.
    pub fn start_at(self, url: &str) -> Self {
        {
            let mut state = self.lock();
            state.current = Some(url.to_string());
            state.epoch += 1;
        }
        self
    }

    /// The next `times` navigations to `url` fail.
    pub fn fail_goto(self, url: &str, times: u32) -> Self {
        self.lock().goto_failures.insert(url.to_string(), times);
        self
    }

    /// The next `times` history-back calls fail without navigating.
    pub fn fail_back(self, times: u32) -> Self {
        self.lock().back_failures = times;
        self
    }

    /// Every `goto` call, including failed ones.
    pub fn goto_log(&self) -> Vec<String> {
        self.lock().goto_log.clone()
    }

    pub fn goto_count(&self, url: &str) -> usize {
        self.lock().goto_log.iter().filter(|u| *u == url).count()
    }

    pub fn back_count(&self) -> u32 {
        self.lock().back_count
    }

    pub fn clicks(&self) -> u32 {
        self.lock().clicks
    }

    pub fn current(&self) -> Option<String> {
        self.lock().current.clone()
    }

    fn lock(&self) -> MutexGuard<'_, SiteState> {
        self.state.lock().unwrap()
    }

    fn handles(&self, elements: Vec<FakeElement>, epoch: u64) -> Vec<Box<dyn ElementHandle>> {
        elements
            .into_iter()
            .map(|element| {
                Box::new(FakeHandle {
                    site: self.clone(),
                    element,
                    epoch,
                }) as Box<dyn ElementHandle>
            })
            .collect()
    }
}

#[async_trait]
impl PageDriver for FakeSite {
    async fn goto(&self, url: &str, _wait_until: WaitUntil, _timeout: Duration) -> DriverResult<()> {
        let mut state = self.lock();
        state.goto_log.push(url.to_string());
        if let Some(remaining) = state.goto_failures.get_mut(url) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(DriverError::NavigationFailed {
                    url: url.to_string(),
                    reason: "connection reset".to_string(),
                });
            }
        }
        state.navigate(url)
    }

    async fn wait_for_selector(&self, selector: &str, timeout: Duration) -> DriverResult<()> {
        let state = self.lock();
        if state.current_page()?.root.matching(selector).is_empty() {
            return Err(DriverError::WaitTimeout {
                condition: format!("selector '{}'", selector),
                timeout,
            });
        }
        Ok(())
    }

    async fn locate_all(&self, selector: &str) -> DriverResult<Vec<Box<dyn ElementHandle>>> {
        let (elements, epoch) = {
            let state = self.lock();
            (state.current_page()?.root.matching(selector), state.epoch)
        };
        Ok(self.handles(elements, epoch))
    }

    async fn document(&self) -> DriverResult<Box<dyn ElementHandle>> {
        let (root, epoch) = {
            let state = self.lock();
            (state.current_page()?.root.clone(), state.epoch)
        };
        Ok(Box::new(FakeHandle {
            site: self.clone(),
            element: root,
            epoch,
        }))
    }

    async fn go_back(&self, _wait_until: WaitUntil, _timeout: Duration) -> DriverResult<()> {
        let mut state = self.lock();
        state.back_count += 1;
        if state.back_failures > 0 {
            state.back_failures -= 1;
            return Err(DriverError::NavigationFailed {
                url: "history:back".to_string(),
                reason: "navigation interrupted".to_string(),
            });
        }
        let previous = state.history.pop().ok_or_else(|| DriverError::NavigationFailed {
            url: "history:back".to_string(),
            reason: "history is empty".to_string(),
        })?;
        state.current = Some(previous);
        state.epoch += 1;
        Ok(())
    }

    async fn wait_for_load_state(&self, _state: WaitUntil, _timeout: Duration) -> DriverResult<()> {
        self.lock().current_page().map(|_| ())
    }

    async fn current_url(&self) -> DriverResult<String> {
        Ok(self
            .lock()
            .current
            .clone()
            .unwrap_or_else(|| "about:blank".to_string()))
    }
}

struct FakeHandle {
    site: FakeSite,
    element: FakeElement,
    epoch: u64,
}

impl FakeHandle {
    fn check(&self) -> DriverResult<()> {
        if self.site.lock().epoch != self.epoch {
            return Err(DriverError::Detached);
        }
        if self.element.broken {
            return Err(DriverError::ScriptFailed("element read failed".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl ElementHandle for FakeHandle {
    async fn locate_all(&self, selector: &str) -> DriverResult<Vec<Box<dyn ElementHandle>>> {
        self.check()?;
        Ok(self.site.handles(self.element.matching(selector), self.epoch))
    }

    async fn text_content(&self) -> DriverResult<Option<String>> {
        self.check()?;
        Ok(self.element.text.clone())
    }

    async fn attribute(&self, name: &str) -> DriverResult<Option<String>> {
        self.check()?;
        Ok(self.element.attributes.get(name).cloned())
    }

    async fn is_visible(&self) -> DriverResult<bool> {
        self.check()?;
        Ok(!self.element.hidden)
    }

    async fn is_enabled(&self) -> DriverResult<bool> {
        self.check()?;
        Ok(!self.element.disabled)
    }

    async fn click(&self) -> DriverResult<()> {
        self.check()?;
        let mut state = self.site.lock();
        state.clicks += 1;
        match &self.element.navigates_to {
            Some(url) => state.navigate(url),
            None => Ok(()),
        }
    }
}

pub const BASE: &str = "https://shop.test";

pub fn list_url(page: u32) -> String {
    format!("{BASE}/list?page={page}")
}

pub fn detail_url(page: u32, item: u32) -> String {
    format!("{BASE}/item/{page}-{item}")
}

/// A paginated catalogue: `pages` list pages of `per_page` items, each item
/// linking (root-relative) to a detail page. Page N has an `a.next` link to
/// page N+1 except the last.
pub fn catalogue(pages: u32, per_page: u32) -> FakeSite {
    let mut site = FakeSite::new();
    for page in 1..=pages {
        let mut list = FakePage::new(list_url(page));
        for item in 1..=per_page {
            list = list.with(
                ".item",
                FakeElement::new()
                    .child(".title", FakeElement::new().text(format!("  Item {page}-{item}\n")))
                    .child(
                        "a.link",
                        FakeElement::new()
                            .text("more")
                            .attr("href", format!("/item/{page}-{item}")),
                    ),
            );
            site = site.page(
                FakePage::new(detail_url(page, item))
                    .with(".article", FakeElement::new().text("article"))
                    .with(".body", FakeElement::new().text(format!("Body {page}-{item}")))
                    .with(".tag", FakeElement::new().text("new"))
                    .with(".tag", FakeElement::new().text(format!("p{page}"))),
            );
        }
        if page < pages {
            list = list.with(".next", FakeElement::new().navigates_to(list_url(page + 1)));
        }
        site = site.page(list);
    }
    site.start_at(&list_url(1))
}

/// Merged job over [`catalogue`]: title and link on the list, body and tags
/// on the detail page. No pagination.
pub fn catalogue_job() -> MergeConfig {
    let list = ScrapeConfig::new(
        list_url(1),
        vec![FieldSpec::new("title", ".title"), FieldSpec::new("link", "a.link")],
        ".item",
    )
    .with_delay_ms(0);
    MergeConfig::new(
        list,
        vec![
            FieldSpec::new("body", ".body"),
            FieldSpec::new("tags", ".tag").multiple(),
        ],
        ".article",
        "link",
    )
    .unwrap()
}
