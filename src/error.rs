use thiserror::Error;

/// Errors raised while harvesting links
///
/// Only `Configuration` and `Persistence` ever terminate a run. Everything
/// else is absorbed at the page or URL where it happened and reported as a
/// log event.
#[derive(Debug, Error)]
pub enum HarvestError {
    /// Selector matched nothing within the wait window
    #[error("timed out after {waited_secs}s waiting for elements matching '{selector}'")]
    ExtractionTimeout { selector: String, waited_secs: u64 },

    /// A next/load-more control could not be activated, or a page was unreachable
    #[error("navigation failed at {target}: {reason}")]
    Navigation { target: String, reason: String },

    /// Network or browser error while fetching one URL
    #[error("failed to fetch {url}: {reason}")]
    Fetch { url: String, reason: String },

    /// WebDriver session could not be opened or was lost
    #[error("browser session error: {0}")]
    Browser(String),

    /// Malformed or mismatched harvest input
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Link store could not be read or written
    #[error("link store error at {path}: {reason}")]
    Persistence { path: String, reason: String },
}

impl HarvestError {
    pub fn fetch(url: &str, reason: impl ToString) -> Self {
        Self::Fetch {
            url: url.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn navigation(target: &str, reason: impl ToString) -> Self {
        Self::Navigation {
            target: target.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn persistence(path: &std::path::Path, reason: impl ToString) -> Self {
        Self::Persistence {
            path: path.display().to_string(),
            reason: reason.to_string(),
        }
    }

    /// Whether the dispatcher should try the same URL again
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Fetch { .. } | Self::Navigation { .. } | Self::Browser(_)
        )
    }

    /// Whether this error must abort the whole run
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Configuration(_) | Self::Persistence { .. })
    }
}

pub type Result<T> = std::result::Result<T, HarvestError>;
