//! Link harvesting: explore paginated or infinitely scrolling sites, pull
//! out candidate links with a CSS selector and collect them, deduplicated,
//! in a flat link store for downstream archival.

pub mod browser;
pub mod config;
pub mod convergence;
pub mod crawlers;
pub mod error;
pub mod filter;
pub mod parsers;
pub mod report;
pub mod results;
pub mod seeds;
pub mod store;
pub mod strategies;
pub mod utils;

#[cfg(test)]
pub(crate) mod testing;

// Re-export commonly used types for convenience
pub use config::{HarvestRequest, HarvestSettings, StrategyKind};
pub use error::{HarvestError, Result};
pub use report::{ChannelReporter, HarvestEvent, LogReporter, Reporter};
pub use results::HarvestSummary;
pub use seeds::{SeedTask, Strategy};
pub use store::LinkStore;
pub use strategies::{CustomStrategy, Harvester};

use browser::{SessionFactory, WebDriverFactory};
use std::sync::Arc;

/// WebDriver factory for a request, honouring the `WEBDRIVER_URL` override
pub fn webdriver_factory(request: &HarvestRequest) -> WebDriverFactory {
    let mut webdriver_url = request.settings.webdriver_url.clone();

    // Override the WebDriver URL with an environment variable if provided
    if let Ok(url) = std::env::var("WEBDRIVER_URL") {
        if !url.is_empty() {
            webdriver_url = url;
        }
    }

    WebDriverFactory::new(&webdriver_url, request.settings.headless)
}

/// Run a harvest request end to end
///
/// Expands the request into seed tasks, opens the link store at
/// `request.output` and runs every task against it. Configuration problems
/// fail before any page is fetched.
pub async fn harvest(
    request: &HarvestRequest,
    sessions: Arc<dyn SessionFactory>,
    reporter: Arc<dyn Reporter>,
) -> Result<HarvestSummary> {
    let harvester = Harvester::from_request(request, sessions)?.with_reporter(reporter);
    harvest_with(request, &harvester).await
}

/// Like [`harvest`], with a harvester the caller has configured
pub async fn harvest_with(request: &HarvestRequest, harvester: &Harvester) -> Result<HarvestSummary> {
    let tasks = seeds::expand(request)?;
    let mut store = LinkStore::open(&request.output)?;
    harvester.run(&tasks, &mut store).await
}
