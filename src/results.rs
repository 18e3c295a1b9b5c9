use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Terminal status of one URL in a crawl batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchStatus {
    Pending,
    Succeeded,
    Failed,
}

/// What the dispatcher learned about one URL
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UrlOutcome {
    pub status: FetchStatus,

    /// Fetch attempts made, retries included
    pub attempts: u32,

    /// Links extracted from the page (empty unless succeeded)
    pub links: HashSet<String>,

    /// Last error seen for a failed URL
    pub error: Option<String>,
}

impl UrlOutcome {
    pub fn pending() -> Self {
        Self {
            status: FetchStatus::Pending,
            attempts: 0,
            links: HashSet::new(),
            error: None,
        }
    }
}

/// Unordered mapping from batch URL to its outcome
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchReport {
    pub outcomes: HashMap<String, UrlOutcome>,
}

impl BatchReport {
    /// A report with every URL still pending
    pub fn pending<'a>(urls: impl IntoIterator<Item = &'a String>) -> Self {
        Self {
            outcomes: urls
                .into_iter()
                .map(|url| (url.clone(), UrlOutcome::pending()))
                .collect(),
        }
    }

    pub fn status(&self, url: &str) -> Option<FetchStatus> {
        self.outcomes.get(url).map(|o| o.status)
    }

    /// Union of the links of every succeeded URL
    pub fn all_links(&self) -> HashSet<String> {
        self.outcomes
            .values()
            .filter(|o| o.status == FetchStatus::Succeeded)
            .flat_map(|o| o.links.iter().cloned())
            .collect()
    }

    pub fn succeeded(&self) -> usize {
        self.count(FetchStatus::Succeeded)
    }

    pub fn failed_urls(&self) -> Vec<String> {
        let mut failed: Vec<String> = self
            .outcomes
            .iter()
            .filter(|(_, o)| o.status == FetchStatus::Failed)
            .map(|(url, _)| url.clone())
            .collect();
        failed.sort();
        failed
    }

    fn count(&self, status: FetchStatus) -> usize {
        self.outcomes.values().filter(|o| o.status == status).count()
    }
}

/// Totals for one harvesting run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HarvestSummary {
    /// Seed tasks that ran
    pub tasks: usize,

    /// Pages (or scroll iterations) from which links were extracted
    pub pages_visited: usize,

    /// Links added to the store during this run
    pub new_links: usize,

    /// URLs given up on after exhausting retries
    pub failed_urls: Vec<String>,

    /// The run ended early because a stop was requested
    pub stopped: bool,
}

impl HarvestSummary {
    pub fn absorb(&mut self, other: HarvestSummary) {
        self.tasks += other.tasks;
        self.pages_visited += other.pages_visited;
        self.new_links += other.new_links;
        self.failed_urls.extend(other.failed_urls);
        self.stopped |= other.stopped;
    }
}
