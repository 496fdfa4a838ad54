// Desktop-browser HTTP profile

use super::{browser_headers, FetchStrategy, FetchedPage};
use crate::config::IngestConfig;
use crate::error::{IngestError, Result};
use async_trait::async_trait;
use reqwest::cookie::Jar;
use reqwest::header::{HeaderValue, CACHE_CONTROL, UPGRADE_INSECURE_REQUESTS};
use reqwest::{Client, StatusCode};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Fetches the page with the header set and cookie handling of a desktop Chrome
///
/// Challenge responses (403/503) often set a clearance cookie, so one such response is
/// followed by a single retry in the same session.
pub struct BrowserProfileStrategy {
    client: Client,
    cookies: Arc<Jar>,
    challenge_pause: Duration,
}

impl BrowserProfileStrategy {
    pub fn new(config: &IngestConfig) -> Result<Self> {
        let mut headers = browser_headers();
        headers.insert(
            "sec-ch-ua",
            HeaderValue::from_static(
                "\"Not_A Brand\";v=\"8\", \"Chromium\";v=\"120\", \"Google Chrome\";v=\"120\"",
            ),
        );
        headers.insert("sec-ch-ua-mobile", HeaderValue::from_static("?0"));
        headers.insert("sec-ch-ua-platform", HeaderValue::from_static("\"Windows\""));
        headers.insert("sec-fetch-dest", HeaderValue::from_static("document"));
        headers.insert("sec-fetch-mode", HeaderValue::from_static("navigate"));
        headers.insert("sec-fetch-site", HeaderValue::from_static("none"));
        headers.insert("sec-fetch-user", HeaderValue::from_static("?1"));
        headers.insert(UPGRADE_INSECURE_REQUESTS, HeaderValue::from_static("1"));
        headers.insert(CACHE_CONTROL, HeaderValue::from_static("max-age=0"));

        let cookies = Arc::new(Jar::default());
        let client = Client::builder()
            .timeout(config.page_timeout())
            .user_agent(config.user_agent.as_str())
            .default_headers(headers)
            .cookie_provider(cookies.clone())
            .build()?;

        Ok(BrowserProfileStrategy {
            client,
            cookies,
            challenge_pause: Duration::from_secs(2),
        })
    }

    /// Wait this long before retrying after a challenge response
    pub fn with_challenge_pause(mut self, pause: Duration) -> Self {
        self.challenge_pause = pause;
        self
    }

    async fn get(&self, url: &str) -> Result<(StatusCode, String)> {
        let response = self.client.get(url).send().await?;
        let status = response.status();
        let body = response.text().await?;
        Ok((status, body))
    }

    async fn fetch(&self, url: &str) -> Result<FetchedPage> {
        let (mut status, mut body) = self.get(url).await?;

        if is_challenge(status) {
            debug!(%status, "Challenge response, retrying in the same session");
            tokio::time::sleep(self.challenge_pause).await;
            (status, body) = self.get(url).await?;
        }

        if !status.is_success() {
            return Err(IngestError::Fetch {
                url: url.to_string(),
                reason: format!("HTTP {}", status),
            });
        }

        info!("Fetched download page with browser profile");
        Ok(FetchedPage::with_cookies(body, self.name(), self.cookies.clone()))
    }
}

fn is_challenge(status: StatusCode) -> bool {
    status == StatusCode::FORBIDDEN || status == StatusCode::SERVICE_UNAVAILABLE
}

#[async_trait]
impl FetchStrategy for BrowserProfileStrategy {
    fn name(&self) -> &'static str {
        "browser-profile"
    }

    async fn attempt(&self, url: &str) -> Option<Result<FetchedPage>> {
        info!("Attempting download page with browser profile");
        Some(self.fetch(url).await)
    }
}
