use crate::error::{HarvestError, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Configuration for filtering harvested links
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LinkFilterConfig {
    /// Regex patterns for links to keep (if empty, all links are kept unless excluded)
    #[serde(default)]
    pub include_patterns: Vec<String>,

    /// Regex patterns for links to drop (these take precedence over include patterns)
    #[serde(default)]
    pub exclude_patterns: Vec<String>,
}

/// Regex filter deciding which extracted links reach the link store
#[derive(Debug, Clone, Default)]
pub struct LinkFilter {
    include_regexes: Vec<Regex>,
    exclude_regexes: Vec<Regex>,
}

impl LinkFilter {
    /// Create a new link filter from configuration
    pub fn new(config: &LinkFilterConfig) -> Result<Self> {
        Ok(Self {
            include_regexes: compile(&config.include_patterns)?,
            exclude_regexes: compile(&config.exclude_patterns)?,
        })
    }

    /// A filter that keeps everything
    pub fn allow_all() -> Self {
        Self::default()
    }

    /// Determine if a link should be kept
    pub fn accepts(&self, link: &str) -> bool {
        // Exclusions take precedence
        if self.exclude_regexes.iter().any(|re| re.is_match(link)) {
            return false;
        }

        self.include_regexes.is_empty() || self.include_regexes.iter().any(|re| re.is_match(link))
    }

    pub fn is_empty(&self) -> bool {
        self.include_regexes.is_empty() && self.exclude_regexes.is_empty()
    }
}

fn compile(patterns: &[String]) -> Result<Vec<Regex>> {
    patterns
        .iter()
        .map(|pattern| {
            Regex::new(pattern).map_err(|e| {
                HarvestError::Configuration(format!("invalid link pattern '{pattern}': {e}"))
            })
        })
        .collect()
}
