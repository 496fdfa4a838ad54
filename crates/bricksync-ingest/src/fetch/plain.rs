// Plain request, the last resort

use super::{browser_headers, FetchStrategy, FetchedPage};
use crate::config::IngestConfig;
use crate::error::{IngestError, Result};
use async_trait::async_trait;
use reqwest::cookie::Jar;
use reqwest::{Client, StatusCode};
use std::sync::Arc;
use tracing::{error, warn};

/// Single GET with browser-like headers and no challenge handling
pub struct PlainRequestStrategy {
    client: Client,
    cookies: Arc<Jar>,
}

impl PlainRequestStrategy {
    pub fn new(config: &IngestConfig) -> Result<Self> {
        let cookies = Arc::new(Jar::default());
        let client = Client::builder()
            .timeout(config.page_timeout())
            .user_agent(config.user_agent.as_str())
            .default_headers(browser_headers())
            .cookie_provider(cookies.clone())
            .build()?;

        Ok(PlainRequestStrategy { client, cookies })
    }

    async fn fetch(&self, url: &str) -> Result<FetchedPage> {
        let response = self.client.get(url).send().await?;
        let status = response.status();

        if status == StatusCode::FORBIDDEN {
            error!("Blocked by bot protection (403 Forbidden)");
            return Err(IngestError::AccessDenied {
                url: url.to_string(),
            });
        }

        let body = response.error_for_status()?.text().await?;
        Ok(FetchedPage::with_cookies(body, self.name(), self.cookies.clone()))
    }
}

#[async_trait]
impl FetchStrategy for PlainRequestStrategy {
    fn name(&self) -> &'static str {
        "plain-request"
    }

    async fn attempt(&self, url: &str) -> Option<Result<FetchedPage>> {
        warn!("All bypass methods failed, trying a plain request");
        Some(self.fetch(url).await)
    }
}
