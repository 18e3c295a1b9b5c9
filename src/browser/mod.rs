//! Browser sessions the engine drives.
//!
//! A [`BrowserSession`] is one live page: navigate, read the source, click a
//! control, scroll. Sessions come from a [`SessionFactory`]; whoever opens a
//! session closes it, on every exit path.

pub mod webdriver;

use crate::error::Result;
use async_trait::async_trait;
use std::time::Duration;

pub use webdriver::{WebDriverFactory, WebDriverSession};

#[async_trait]
pub trait BrowserSession: Send + Sync {
    /// Navigate to `url` and wait for the document to load
    async fn goto(&self, url: &str) -> Result<()>;

    /// URL of the page currently shown
    async fn current_url(&self) -> Result<String>;

    /// Serialized DOM of the current page
    async fn page_source(&self) -> Result<String>;

    /// Wait up to `wait` for a clickable element matching `selector` and click it
    ///
    /// Fails with a navigation error when no such element shows up.
    async fn click(&self, selector: &str, wait: Duration) -> Result<()>;

    async fn scroll_to_bottom(&self) -> Result<()>;

    /// Scroll the first element matching `selector` into view; false if absent
    async fn scroll_into_view(&self, selector: &str) -> Result<bool>;

    /// Scrollable height of the document body
    async fn scroll_height(&self) -> Result<u64>;

    async fn close(&self) -> Result<()>;
}

#[async_trait]
pub trait SessionFactory: Send + Sync {
    async fn open(&self) -> Result<Box<dyn BrowserSession>>;
}

/// Close a session, logging rather than propagating a failure
pub async fn release(session: Box<dyn BrowserSession>) {
    if let Err(e) = session.close().await {
        ::log::warn!("Failed to close browser session: {}", e);
    }
}
