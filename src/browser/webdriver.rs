use crate::browser::{BrowserSession, SessionFactory};
use crate::error::{HarvestError, Result};
use async_trait::async_trait;
use fantoccini::error::CmdError;
use fantoccini::{Client, ClientBuilder, Locator};
use serde_json::{Map, Value, json};
use std::time::Duration;

/// Common WebDriver ports tried when the configured URL does not answer
const FALLBACK_WEBDRIVER_URLS: [&str; 4] = [
    "http://localhost:9515", // ChromeDriver default
    "http://localhost:4723", // Appium default
    "http://localhost:9222", // Chrome debug port default
    "http://127.0.0.1:4444", // Try with IP instead of localhost
];

const SCROLL_HEIGHT_SCRIPT: &str = "return document.body.scrollHeight;";
const SCROLL_TO_BOTTOM_SCRIPT: &str = "window.scrollTo(0, document.body.scrollHeight);";
const SCROLL_INTO_VIEW_SCRIPT: &str = "const el = document.querySelector(arguments[0]); \
     if (el) { el.scrollIntoView(); return true; } return false;";

/// Opens Chrome sessions on a WebDriver server
#[derive(Debug, Clone)]
pub struct WebDriverFactory {
    webdriver_url: String,
    headless: bool,
}

impl WebDriverFactory {
    pub fn new(webdriver_url: &str, headless: bool) -> Self {
        Self {
            webdriver_url: webdriver_url.to_string(),
            headless,
        }
    }

    fn capabilities(&self) -> Map<String, Value> {
        let mut args = vec!["--no-sandbox", "--disable-dev-shm-usage"];
        if self.headless {
            args.push("--headless");
        }

        let mut caps = Map::new();
        caps.insert("goog:chromeOptions".to_string(), json!({ "args": args }));
        caps
    }

    async fn connect(&self, url: &str) -> std::result::Result<Client, String> {
        ClientBuilder::native()
            .capabilities(self.capabilities())
            .connect(url)
            .await
            .map_err(|e| e.to_string())
    }
}

#[async_trait]
impl SessionFactory for WebDriverFactory {
    async fn open(&self) -> Result<Box<dyn BrowserSession>> {
        let first_error = match self.connect(&self.webdriver_url).await {
            Ok(client) => {
                ::log::debug!("Connected to WebDriver at {}", self.webdriver_url);
                return Ok(Box::new(WebDriverSession::new(client)));
            }
            Err(e) => {
                ::log::error!(
                    "Failed to connect to WebDriver at {}: {}",
                    self.webdriver_url,
                    e
                );
                e
            }
        };

        for url in FALLBACK_WEBDRIVER_URLS.iter() {
            if *url == self.webdriver_url {
                continue;
            }

            ::log::info!("Trying fallback WebDriver URL: {}", url);
            // Fallback failures are not logged individually to avoid log spam
            if let Ok(client) = self.connect(url).await {
                ::log::debug!("Connected to fallback WebDriver at {}", url);
                return Ok(Box::new(WebDriverSession::new(client)));
            }
        }

        ::log::error!(
            "Make sure a WebDriver server is running or set the WEBDRIVER_URL environment variable"
        );
        Err(HarvestError::Browser(format!(
            "no WebDriver server reachable (first error: {first_error})"
        )))
    }
}

/// A fantoccini client driving one browser window
#[derive(Clone)]
pub struct WebDriverSession {
    client: Client,
}

impl WebDriverSession {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    async fn run_script(&self, script: &str, args: Vec<Value>) -> Result<Value> {
        self.client
            .execute(script, args)
            .await
            .map_err(|e| command_error(e, "running script"))
    }
}

/// Map a WebDriver command error, flagging lost sessions
fn command_error(error: CmdError, context: &str) -> HarvestError {
    let message = error.to_string();
    if message.contains("Unable to find session") || message.contains("invalid session id") {
        ::log::warn!("Lost browser session while {}", context);
        HarvestError::Browser(format!("session lost while {context}: {message}"))
    } else {
        HarvestError::Browser(format!("{context}: {message}"))
    }
}

#[async_trait]
impl BrowserSession for WebDriverSession {
    async fn goto(&self, url: &str) -> Result<()> {
        self.client
            .goto(url)
            .await
            .map_err(|e| HarvestError::fetch(url, e))
    }

    async fn current_url(&self) -> Result<String> {
        self.client
            .current_url()
            .await
            .map(|url| url.to_string())
            .map_err(|e| command_error(e, "reading current URL"))
    }

    async fn page_source(&self) -> Result<String> {
        self.client
            .source()
            .await
            .map_err(|e| command_error(e, "getting page source"))
    }

    async fn click(&self, selector: &str, wait: Duration) -> Result<()> {
        let element = self
            .client
            .wait()
            .at_most(wait)
            .for_element(Locator::Css(selector))
            .await
            .map_err(|e| HarvestError::navigation(selector, e))?;
        element
            .click()
            .await
            .map_err(|e| HarvestError::navigation(selector, e))
    }

    async fn scroll_to_bottom(&self) -> Result<()> {
        self.run_script(SCROLL_TO_BOTTOM_SCRIPT, Vec::new())
            .await
            .map(|_| ())
    }

    async fn scroll_into_view(&self, selector: &str) -> Result<bool> {
        let found = self
            .run_script(SCROLL_INTO_VIEW_SCRIPT, vec![json!(selector)])
            .await?;
        Ok(found.as_bool().unwrap_or(false))
    }

    async fn scroll_height(&self) -> Result<u64> {
        let height = self.run_script(SCROLL_HEIGHT_SCRIPT, Vec::new()).await?;
        height
            .as_u64()
            .or_else(|| height.as_f64().map(|h| h.max(0.0) as u64))
            .ok_or_else(|| HarvestError::Browser(format!("unexpected scroll height {height}")))
    }

    async fn close(&self) -> Result<()> {
        self.client
            .clone()
            .close()
            .await
            .map_err(|e| command_error(e, "closing session"))
    }
}
