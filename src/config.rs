use crate::error::{HarvestError, Result};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Which exploration strategy a harvest request asks for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    /// Page URLs built from a template with a `{page_number}` placeholder
    Pagination,
    /// Follow a clickable "next" control page by page
    NextButton,
    /// Scroll the page, optionally clicking a "load more" control
    ScrollLoadMore,
    /// Delegated to a user-supplied handler
    Custom,
}

/// A harvesting request as handed over by the caller
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HarvestRequest {
    /// Pages to start from
    pub base_urls: Vec<String>,

    /// CSS selectors locating the anchors to harvest
    pub link_selectors: Vec<String>,

    /// Explicit strategy; inferred from the configured method when absent
    #[serde(default)]
    pub strategy: Option<StrategyKind>,

    /// Pagination URL templates containing `{page_number}`
    #[serde(default)]
    pub pagination_templates: Vec<String>,

    /// Selectors for the "next page" control
    #[serde(default)]
    pub next_button_selectors: Vec<String>,

    /// Selector for the "load more" control
    #[serde(default)]
    pub load_more_selector: Option<String>,

    /// Whether the scrolled page has an explicit "load more" control
    #[serde(default)]
    pub has_explicit_load_more_button: bool,

    /// Element scrolled into view on infinite-scroll pages without a control
    #[serde(default)]
    pub footer_selector: Option<String>,

    /// Per-URL page limits
    #[serde(default)]
    pub max_pages: Vec<u32>,

    /// Pair the lists element-wise instead of using only their first entries
    #[serde(default)]
    pub multiple_targets: bool,

    /// Retries per URL after the first attempt
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Maximum concurrent page fetches
    #[serde(default = "default_max_session")]
    pub max_session: usize,

    /// Memory usage percentage above which new fetches are held back
    #[serde(default = "default_memory_threshold")]
    pub memory_threshold: f64,

    /// Regex patterns a link must match to be kept (empty keeps all)
    #[serde(default)]
    pub include_patterns: Vec<String>,

    /// Regex patterns that drop a link (take precedence over includes)
    #[serde(default)]
    pub exclude_patterns: Vec<String>,

    /// Link store file
    #[serde(default = "default_output")]
    pub output: PathBuf,

    /// Timing and browser settings
    #[serde(default)]
    pub settings: HarvestSettings,
}

/// Tuning knobs shared by every strategy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HarvestSettings {
    /// How long to wait for matching elements or clickable controls
    #[serde(default = "default_element_wait_secs")]
    pub element_wait_secs: u64,

    /// How often the page is re-checked while waiting for elements
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Pause after scrolling or clicking, to let content load
    #[serde(default = "default_scroll_pause_ms")]
    pub scroll_pause_ms: u64,

    /// Upper bound on scroll iterations per task
    #[serde(default = "default_max_scrolls")]
    pub max_scrolls: u32,

    /// Consecutive scrolls without new links before giving up
    #[serde(default = "default_max_repeats")]
    pub max_repeats: u32,

    /// Lower bound of the randomized retry delay
    #[serde(default = "default_backoff_min_ms")]
    pub backoff_min_ms: u64,

    /// Upper bound of the randomized retry delay
    #[serde(default = "default_backoff_max_ms")]
    pub backoff_max_ms: u64,

    /// Cap on any single retry delay
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    /// How often memory pressure is re-sampled while admission is stalled
    #[serde(default = "default_memory_check_interval_ms")]
    pub memory_check_interval_ms: u64,

    /// URL for the WebDriver instance
    #[serde(default = "default_webdriver_url")]
    pub webdriver_url: String,

    /// Run the browser headless
    #[serde(default = "default_headless")]
    pub headless: bool,
}

impl Default for HarvestSettings {
    fn default() -> Self {
        Self {
            element_wait_secs: default_element_wait_secs(),
            poll_interval_ms: default_poll_interval_ms(),
            scroll_pause_ms: default_scroll_pause_ms(),
            max_scrolls: default_max_scrolls(),
            max_repeats: default_max_repeats(),
            backoff_min_ms: default_backoff_min_ms(),
            backoff_max_ms: default_backoff_max_ms(),
            max_delay_ms: default_max_delay_ms(),
            memory_check_interval_ms: default_memory_check_interval_ms(),
            webdriver_url: default_webdriver_url(),
            headless: default_headless(),
        }
    }
}

impl HarvestSettings {
    pub fn element_wait(&self) -> Duration {
        Duration::from_secs(self.element_wait_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn scroll_pause(&self) -> Duration {
        Duration::from_millis(self.scroll_pause_ms)
    }

    pub fn memory_check_interval(&self) -> Duration {
        Duration::from_millis(self.memory_check_interval_ms)
    }

    /// Zero waits everywhere, for driving the engine against scripted sessions
    pub fn immediate() -> Self {
        Self {
            element_wait_secs: 0,
            poll_interval_ms: 0,
            scroll_pause_ms: 0,
            backoff_min_ms: 0,
            backoff_max_ms: 0,
            max_delay_ms: 0,
            memory_check_interval_ms: 1,
            ..Self::default()
        }
    }
}

fn default_max_retries() -> u32 {
    2
}

fn default_max_session() -> usize {
    10
}

fn default_memory_threshold() -> f64 {
    80.0
}

fn default_output() -> PathBuf {
    PathBuf::from("links").join("links.csv")
}

fn default_element_wait_secs() -> u64 {
    20
}

fn default_poll_interval_ms() -> u64 {
    500
}

fn default_scroll_pause_ms() -> u64 {
    2000
}

fn default_max_scrolls() -> u32 {
    50
}

fn default_max_repeats() -> u32 {
    3
}

fn default_backoff_min_ms() -> u64 {
    1000
}

fn default_backoff_max_ms() -> u64 {
    2000
}

fn default_max_delay_ms() -> u64 {
    30_000
}

fn default_memory_check_interval_ms() -> u64 {
    1000
}

/// Default value for webdriver_url
fn default_webdriver_url() -> String {
    "http://localhost:4444".to_string()
}

fn default_headless() -> bool {
    true
}

impl HarvestRequest {
    /// A single-target request with default limits and no strategy set
    pub fn new(base_url: &str, link_selector: &str) -> Self {
        Self {
            base_urls: vec![base_url.to_string()],
            link_selectors: vec![link_selector.to_string()],
            strategy: None,
            pagination_templates: Vec::new(),
            next_button_selectors: Vec::new(),
            load_more_selector: None,
            has_explicit_load_more_button: false,
            footer_selector: None,
            max_pages: Vec::new(),
            multiple_targets: false,
            max_retries: default_max_retries(),
            max_session: default_max_session(),
            memory_threshold: default_memory_threshold(),
            include_patterns: Vec::new(),
            exclude_patterns: Vec::new(),
            output: default_output(),
            settings: HarvestSettings::default(),
        }
    }

    /// Load a request from a JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let mut contents = String::new();
        File::open(path)
            .and_then(|mut file| file.read_to_string(&mut contents))
            .map_err(|e| {
                HarvestError::Configuration(format!("cannot read {}: {}", path.display(), e))
            })?;
        Self::from_json(&contents)
    }

    /// Parse a request from a JSON string
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| HarvestError::Configuration(format!("invalid harvest request: {e}")))
    }

    /// The strategy to run, explicit or inferred from whichever method is set
    pub fn resolved_strategy(&self) -> Option<StrategyKind> {
        if self.strategy.is_some() {
            return self.strategy;
        }
        if !self.pagination_templates.is_empty() {
            Some(StrategyKind::Pagination)
        } else if !self.next_button_selectors.is_empty() {
            Some(StrategyKind::NextButton)
        } else if self.load_more_selector.is_some() || self.has_explicit_load_more_button {
            Some(StrategyKind::ScrollLoadMore)
        } else {
            None
        }
    }

    /// Check the dispatcher limits before anything is fetched
    pub fn validate_limits(&self) -> Result<()> {
        if self.max_session == 0 {
            return Err(HarvestError::Configuration(
                "max_session must be at least 1".to_string(),
            ));
        }
        if !(0.0..=100.0).contains(&self.memory_threshold) {
            return Err(HarvestError::Configuration(format!(
                "memory_threshold must be within 0..100, got {}",
                self.memory_threshold
            )));
        }
        if self.settings.backoff_min_ms > self.settings.backoff_max_ms {
            return Err(HarvestError::Configuration(
                "backoff_min_ms must not exceed backoff_max_ms".to_string(),
            ));
        }
        Ok(())
    }
}
