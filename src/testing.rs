//! Scripted stand-ins for the browser, page fetching and memory sampling.

use crate::browser::{BrowserSession, SessionFactory};
use crate::crawlers::{MemoryProbe, PageFetcher};
use crate::error::{HarvestError, Result};
use crate::parsers::LinkExtractor;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const LINK_SELECTOR: &str = "a.item";
pub const NEXT_SELECTOR: &str = "a.next";
pub const LOAD_MORE_SELECTOR: &str = "button.load-more";
pub const FOOTER_SELECTOR: &str = "#footer";

/// One page of a scripted site
#[derive(Debug, Clone, Default)]
pub struct FakePage {
    pub links: Vec<String>,
    /// Where clicking the next control leads
    pub next: Option<String>,
    /// Chunks revealed one at a time by scrolling or by the load-more control
    pub more: Vec<Vec<String>>,
    /// Chunks only appear through the load-more control, not by scrolling
    pub load_more_button: bool,
}

impl FakePage {
    pub fn with_links(links: &[&str]) -> Self {
        Self {
            links: links.iter().map(|l| l.to_string()).collect(),
            ..Self::default()
        }
    }

    pub fn next(mut self, url: &str) -> Self {
        self.next = Some(url.to_string());
        self
    }

    pub fn more(mut self, chunk: &[&str]) -> Self {
        self.more.push(chunk.iter().map(|l| l.to_string()).collect());
        self
    }

    pub fn load_more_button(mut self) -> Self {
        self.load_more_button = true;
        self
    }

    fn render(&self, revealed: usize) -> String {
        let mut html = String::from("<html><body><ul>");
        for link in self.links.iter().chain(self.more.iter().take(revealed).flatten()) {
            html.push_str(&format!("<li><a class=\"item\" href=\"{link}\">item</a></li>"));
        }
        html.push_str("</ul>");
        if self.next.is_some() {
            html.push_str("<a class=\"next\" href=\"#\">Next</a>");
        }
        if self.load_more_button && revealed < self.more.len() {
            html.push_str("<button class=\"load-more\">Load more</button>");
        }
        html.push_str("<footer id=\"footer\"></footer></body></html>");
        html
    }
}

#[derive(Debug, Default)]
pub struct FakeSite {
    pages: HashMap<String, FakePage>,
}

impl FakeSite {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn page(mut self, url: &str, page: FakePage) -> Self {
        self.pages.insert(url.to_string(), page);
        self
    }
}

/// Opens [`FakeSession`]s over a shared [`FakeSite`], counting opens and closes
pub struct FakeSessionFactory {
    site: Arc<FakeSite>,
    goto_failures: Arc<Mutex<HashMap<String, u32>>>,
    open_failures: AtomicU32,
    opened: AtomicUsize,
    closed: Arc<AtomicUsize>,
}

impl FakeSessionFactory {
    pub fn new(site: FakeSite) -> Self {
        Self {
            site: Arc::new(site),
            goto_failures: Arc::new(Mutex::new(HashMap::new())),
            open_failures: AtomicU32::new(0),
            opened: AtomicUsize::new(0),
            closed: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Make the next `times` navigations to `url` fail
    pub fn fail_goto(self, url: &str, times: u32) -> Self {
        self.goto_failures
            .lock()
            .unwrap()
            .insert(url.to_string(), times);
        self
    }

    /// Make the next `times` session opens fail
    pub fn fail_open(self, times: u32) -> Self {
        self.open_failures.store(times, Ordering::SeqCst);
        self
    }

    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SessionFactory for FakeSessionFactory {
    async fn open(&self) -> Result<Box<dyn BrowserSession>> {
        let remaining = self.open_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.open_failures.store(remaining - 1, Ordering::SeqCst);
            return Err(HarvestError::Browser("no WebDriver available".to_string()));
        }
        self.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeSession {
            site: Arc::clone(&self.site),
            goto_failures: Arc::clone(&self.goto_failures),
            closed: Arc::clone(&self.closed),
            state: Mutex::new(SessionState::default()),
        }))
    }
}

#[derive(Debug, Default)]
struct SessionState {
    url: Option<String>,
    revealed: usize,
}

pub struct FakeSession {
    site: Arc<FakeSite>,
    goto_failures: Arc<Mutex<HashMap<String, u32>>>,
    closed: Arc<AtomicUsize>,
    state: Mutex<SessionState>,
}

impl FakeSession {
    fn current_page(&self) -> Result<(FakePage, usize)> {
        let state = self.state.lock().unwrap();
        let url = state
            .url
            .as_ref()
            .ok_or_else(|| HarvestError::Browser("no page loaded".to_string()))?;
        let page = self
            .site
            .pages
            .get(url)
            .cloned()
            .ok_or_else(|| HarvestError::fetch(url, "not found"))?;
        Ok((page, state.revealed))
    }

    fn reveal(&self) -> Result<bool> {
        let (page, revealed) = self.current_page()?;
        if revealed < page.more.len() {
            self.state.lock().unwrap().revealed += 1;
            return Ok(true);
        }
        Ok(false)
    }
}

#[async_trait]
impl BrowserSession for FakeSession {
    async fn goto(&self, url: &str) -> Result<()> {
        {
            let mut failures = self.goto_failures.lock().unwrap();
            if let Some(remaining) = failures.get_mut(url) {
                if *remaining > 0 {
                    *remaining -= 1;
                    return Err(HarvestError::fetch(url, "connection reset"));
                }
            }
        }
        if !self.site.pages.contains_key(url) {
            return Err(HarvestError::fetch(url, "not found"));
        }
        let mut state = self.state.lock().unwrap();
        state.url = Some(url.to_string());
        state.revealed = 0;
        Ok(())
    }

    async fn current_url(&self) -> Result<String> {
        self.state
            .lock()
            .unwrap()
            .url
            .clone()
            .ok_or_else(|| HarvestError::Browser("no page loaded".to_string()))
    }

    async fn page_source(&self) -> Result<String> {
        let (page, revealed) = self.current_page()?;
        Ok(page.render(revealed))
    }

    async fn click(&self, selector: &str, _wait: Duration) -> Result<()> {
        let (page, revealed) = self.current_page()?;
        match selector {
            NEXT_SELECTOR => match page.next {
                Some(next) => self.goto(&next).await,
                None => Err(HarvestError::navigation(selector, "element not found")),
            },
            LOAD_MORE_SELECTOR if page.load_more_button && revealed < page.more.len() => {
                self.reveal().map(|_| ())
            }
            _ => Err(HarvestError::navigation(selector, "element not found")),
        }
    }

    async fn scroll_to_bottom(&self) -> Result<()> {
        let (page, _) = self.current_page()?;
        if !page.load_more_button {
            self.reveal()?;
        }
        Ok(())
    }

    async fn scroll_into_view(&self, selector: &str) -> Result<bool> {
        if selector != FOOTER_SELECTOR {
            return Ok(false);
        }
        self.scroll_to_bottom().await?;
        Ok(true)
    }

    async fn scroll_height(&self) -> Result<u64> {
        let (_, revealed) = self.current_page()?;
        Ok(1000 + 100 * revealed as u64)
    }

    async fn close(&self) -> Result<()> {
        self.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Scripted outcome of fetching one URL
#[derive(Debug, Clone)]
pub enum FetchScript {
    /// Fail this many times, then return the links
    Links { failures: u32, links: Vec<String> },
    /// The page loads but the selector never matches
    Timeout,
    /// Every attempt fails
    Unreachable,
}

impl FetchScript {
    pub fn links(links: &[&str]) -> Self {
        Self::flaky(0, links)
    }

    pub fn flaky(failures: u32, links: &[&str]) -> Self {
        Self::Links {
            failures,
            links: links.iter().map(|l| l.to_string()).collect(),
        }
    }
}

/// [`PageFetcher`] that plays back per-URL scripts and records attempts
#[derive(Default)]
pub struct ScriptedFetcher {
    scripts: HashMap<String, FetchScript>,
    attempts: Mutex<HashMap<String, u32>>,
    delay: Duration,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    completed: AtomicUsize,
}

impl ScriptedFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(mut self, url: &str, script: FetchScript) -> Self {
        self.scripts.insert(url.to_string(), script);
        self
    }

    /// Hold each attempt for `delay` so overlapping fetches can be observed
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn attempts(&self, url: &str) -> u32 {
        self.attempts
            .lock()
            .unwrap()
            .get(url)
            .copied()
            .unwrap_or(0)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    /// Attempts that have finished, successfully or not
    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PageFetcher for ScriptedFetcher {
    async fn fetch_links(&self, url: &str, extractor: &LinkExtractor) -> Result<HashSet<String>> {
        let attempt = {
            let mut attempts = self.attempts.lock().unwrap();
            let count = attempts.entry(url.to_string()).or_insert(0);
            *count += 1;
            *count
        };

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.completed.fetch_add(1, Ordering::SeqCst);

        match self.scripts.get(url) {
            Some(FetchScript::Links { failures, links }) if attempt > *failures => {
                Ok(links.iter().cloned().collect())
            }
            Some(FetchScript::Links { .. }) | Some(FetchScript::Unreachable) | None => {
                Err(HarvestError::fetch(url, format!("attempt {attempt} failed")))
            }
            Some(FetchScript::Timeout) => Err(HarvestError::ExtractionTimeout {
                selector: extractor.selector().to_string(),
                waited_secs: 0,
            }),
        }
    }
}

/// Plays back memory readings in order, repeating the last one
pub struct SequenceMemoryProbe {
    readings: Mutex<VecDeque<f64>>,
    last: Mutex<f64>,
    samples: AtomicUsize,
}

impl SequenceMemoryProbe {
    pub fn new(readings: &[f64]) -> Self {
        Self {
            readings: Mutex::new(readings.iter().copied().collect()),
            last: Mutex::new(0.0),
            samples: AtomicUsize::new(0),
        }
    }

    pub fn samples(&self) -> usize {
        self.samples.load(Ordering::SeqCst)
    }
}

impl MemoryProbe for SequenceMemoryProbe {
    fn used_percent(&self) -> f64 {
        self.samples.fetch_add(1, Ordering::SeqCst);
        let mut last = self.last.lock().unwrap();
        if let Some(next) = self.readings.lock().unwrap().pop_front() {
            *last = next;
        }
        *last
    }
}
