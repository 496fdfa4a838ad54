// Rendered-browser strategy over WebDriver

use super::{FetchStrategy, FetchedPage};
use crate::config::IngestConfig;
use crate::error::{IngestError, Result};
use async_trait::async_trait;
use fantoccini::{Client, ClientBuilder, Locator};
use reqwest::cookie::Jar;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

const POLL_INTERVAL: Duration = Duration::from_millis(500);

const HIDE_WEBDRIVER: &str =
    "Object.defineProperty(navigator, 'webdriver', {get: () => undefined})";

/// Renders the page in headless Chrome and captures its source and cookies
///
/// Needs a running WebDriver server (chromedriver) at `webdriver_url`; without one the
/// strategy reports itself unavailable.
pub struct HeadlessBrowserStrategy {
    webdriver_url: Option<String>,
    user_agent: String,
    render_timeout: Duration,
    min_anchors: usize,
    marker: String,
}

impl HeadlessBrowserStrategy {
    pub fn new(config: &IngestConfig) -> Self {
        HeadlessBrowserStrategy {
            webdriver_url: config.webdriver_url.clone(),
            user_agent: config.user_agent.clone(),
            render_timeout: config.render_timeout(),
            min_anchors: config.render_min_anchors,
            marker: config.render_marker.to_lowercase(),
        }
    }

    fn capabilities(&self) -> serde_json::Map<String, serde_json::Value> {
        let mut caps = serde_json::Map::new();
        caps.insert("browserName".to_string(), json!("chrome"));
        caps.insert(
            "goog:chromeOptions".to_string(),
            json!({
                "args": [
                    "--no-sandbox",
                    "--disable-dev-shm-usage",
                    "--disable-blink-features=AutomationControlled",
                    "--headless",
                    format!("--user-agent={}", self.user_agent),
                ],
                "excludeSwitches": ["enable-automation"],
                "useAutomationExtension": false,
            }),
        );
        caps
    }

    async fn fetch(&self, webdriver_url: &str, url: &str) -> Result<FetchedPage> {
        let client = ClientBuilder::native()
            .capabilities(self.capabilities())
            .connect(webdriver_url)
            .await
            .map_err(|e| browser_error(url, e))?;

        let rendered = self.render(&client, url).await;

        if let Err(e) = client.close().await {
            debug!(error = %e, "Failed to close browser session");
        }

        let (html, cookies) = rendered?;
        info!("Fetched download page with headless browser");
        Ok(FetchedPage::with_cookies(html, self.name(), cookies))
    }

    async fn render(&self, client: &Client, url: &str) -> Result<(String, Arc<Jar>)> {
        client.goto(url).await.map_err(|e| browser_error(url, e))?;
        client
            .execute(HIDE_WEBDRIVER, vec![])
            .await
            .map_err(|e| browser_error(url, e))?;

        self.wait_until_loaded(client).await;

        let html = client.source().await.map_err(|e| browser_error(url, e))?;

        let jar = Arc::new(Jar::default());
        let origin = url::Url::parse(url).map_err(|e| browser_error(url, e))?;
        let cookies = client
            .get_all_cookies()
            .await
            .map_err(|e| browser_error(url, e))?;
        for cookie in &cookies {
            let cookie_str = match cookie.domain() {
                Some(domain) => format!("{}={}; Domain={}", cookie.name(), cookie.value(), domain),
                None => format!("{}={}", cookie.name(), cookie.value()),
            };
            jar.add_cookie_str(&cookie_str, &origin);
        }
        debug!(cookies = cookies.len(), "Captured browser cookies");

        Ok((html, jar))
    }

    /// Poll until the page has enough anchors or shows the marker, or the timeout passes
    async fn wait_until_loaded(&self, client: &Client) {
        let deadline = Instant::now() + self.render_timeout;

        loop {
            if let Ok(anchors) = client.find_all(Locator::Css("a")).await {
                if anchors.len() > self.min_anchors {
                    debug!(anchors = anchors.len(), "Page rendered");
                    return;
                }
            }

            if let Ok(source) = client.source().await {
                if source.to_lowercase().contains(&self.marker) {
                    debug!(marker = %self.marker, "Page rendered");
                    return;
                }
            }

            if Instant::now() >= deadline {
                warn!(
                    timeout_secs = self.render_timeout.as_secs(),
                    "Render wait timed out, capturing page as is"
                );
                return;
            }

            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }
}

fn browser_error(url: &str, e: impl std::fmt::Display) -> IngestError {
    IngestError::Fetch {
        url: url.to_string(),
        reason: format!("headless browser: {}", e),
    }
}

#[async_trait]
impl FetchStrategy for HeadlessBrowserStrategy {
    fn name(&self) -> &'static str {
        "headless-browser"
    }

    async fn attempt(&self, url: &str) -> Option<Result<FetchedPage>> {
        let webdriver_url = self.webdriver_url.as_deref()?;
        info!(webdriver = webdriver_url, "Attempting download page with headless browser");
        Some(self.fetch(webdriver_url, url).await)
    }
}
