use crate::browser::{self, BrowserSession, SessionFactory};
use crate::error::{HarvestError, Result};
use crate::parsers::LinkExtractor;
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Fetches one page and extracts its links
#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// Load `url` and return the links `extractor` finds on it
    ///
    /// An `ExtractionTimeout` means the page loaded but nothing matched.
    async fn fetch_links(&self, url: &str, extractor: &LinkExtractor) -> Result<HashSet<String>>;

    /// Release whatever the fetcher holds on to
    async fn shutdown(&self) {}
}

/// Fetches pages through browser sessions, keeping idle ones for reuse
///
/// Sessions are opened lazily, so the pool never grows beyond the number of
/// fetches that were in flight at the same time. A session that fails is
/// closed instead of being returned to the pool.
pub struct SessionPageFetcher {
    factory: Arc<dyn SessionFactory>,
    idle: Mutex<Vec<Box<dyn BrowserSession>>>,
}

impl SessionPageFetcher {
    pub fn new(factory: Arc<dyn SessionFactory>) -> Self {
        Self {
            factory,
            idle: Mutex::new(Vec::new()),
        }
    }

    async fn checkout(&self) -> Result<Box<dyn BrowserSession>> {
        let reused = self.idle.lock().await.pop();
        match reused {
            Some(session) => Ok(session),
            None => {
                ::log::debug!("Opening a new browser session");
                self.factory.open().await
            }
        }
    }

    async fn checkin(&self, session: Box<dyn BrowserSession>) {
        self.idle.lock().await.push(session);
    }

    pub async fn idle_sessions(&self) -> usize {
        self.idle.lock().await.len()
    }
}

#[async_trait]
impl PageFetcher for SessionPageFetcher {
    async fn fetch_links(&self, url: &str, extractor: &LinkExtractor) -> Result<HashSet<String>> {
        let session = self.checkout().await?;

        if let Err(e) = session.goto(url).await {
            browser::release(session).await;
            return Err(e);
        }

        let result = extractor.try_extract(session.as_ref()).await;
        match &result {
            Ok(_) | Err(HarvestError::ExtractionTimeout { .. }) => self.checkin(session).await,
            Err(_) => browser::release(session).await,
        }
        result
    }

    async fn shutdown(&self) {
        let sessions: Vec<_> = self.idle.lock().await.drain(..).collect();
        for session in sessions {
            browser::release(session).await;
        }
    }
}
