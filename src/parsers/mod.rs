pub mod html;


use crate::browser::BrowserSession;
use crate::error::{HarvestError, Result};
use crate::filter::LinkFilter;
use crate::report::Reporter;
use std::collections::HashSet;
use std::time::Duration;
use tokio::time::Instant;

/// Pulls link targets out of a loaded page with a CSS selector
///
/// Waits a bounded time for at least one matching element, re-reading the
/// page source every `poll_interval`.
#[derive(Debug, Clone)]
pub struct LinkExtractor {
    selector: String,
    filter: LinkFilter,
    wait: Duration,
    poll_interval: Duration,
}

impl LinkExtractor {
    /// Fails fast on a malformed selector
    pub fn new(selector: &str, wait: Duration, poll_interval: Duration) -> Result<Self> {
        html::validate_selector(selector)?;
        Ok(Self {
            selector: selector.to_string(),
            filter: LinkFilter::allow_all(),
            wait,
            poll_interval,
        })
    }

    pub fn with_filter(mut self, filter: LinkFilter) -> Self {
        self.filter = filter;
        self
    }

    pub fn selector(&self) -> &str {
        &self.selector
    }

    /// Links on the current page, or why there are none
    ///
    /// Returns `ExtractionTimeout` when nothing matched within the wait window.
    pub async fn try_extract(&self, session: &dyn BrowserSession) -> Result<HashSet<String>> {
        let deadline = Instant::now() + self.wait;
        loop {
            let source = session.page_source().await?;
            let page_url = session.current_url().await.ok();
            let selected = html::select_links(&source, &self.selector, page_url.as_deref())?;

            if selected.matched > 0 {
                return Ok(self.apply_filter(selected.links));
            }
            if Instant::now() >= deadline {
                return Err(HarvestError::ExtractionTimeout {
                    selector: self.selector.clone(),
                    waited_secs: self.wait.as_secs(),
                });
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    /// Links on the current page; any failure is logged and yields an empty set
    pub async fn extract(
        &self,
        session: &dyn BrowserSession,
        reporter: &dyn Reporter,
    ) -> HashSet<String> {
        reporter.on_log(&format!(
            "Extracting links using selector: {}",
            self.selector
        ));
        match self.try_extract(session).await {
            Ok(links) => {
                reporter.on_log(&format!("Found {} unique links.", links.len()));
                links
            }
            Err(HarvestError::ExtractionTimeout { .. }) => {
                ::log::warn!("Timeout while extracting links with selector: {}", self.selector);
                reporter.on_log(&format!(
                    "Timeout while extracting links with selector: {}",
                    self.selector
                ));
                HashSet::new()
            }
            Err(e) => {
                ::log::error!("Error while extracting links: {}", e);
                reporter.on_log(&format!("Error while extracting links: {e}"));
                HashSet::new()
            }
        }
    }

    fn apply_filter(&self, links: HashSet<String>) -> HashSet<String> {
        if self.filter.is_empty() {
            return links;
        }
        let before = links.len();
        let kept: HashSet<String> = links
            .into_iter()
            .filter(|link| self.filter.accepts(link))
            .collect();
        if kept.len() < before {
            ::log::debug!("Link filter dropped {} links", before - kept.len());
        }
        kept
    }
}
