// Rebrickable archive downloader

use crate::config::IngestConfig;
use crate::error::{IngestError, Result};
use crate::fetch::{browser_headers, FetchedPage};
use crate::links::DiscoveredLink;
use rand::Rng;
use reqwest::header::{HeaderValue, CONTENT_TYPE, REFERER};
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Downloads archives within the session that fetched the listing page
pub struct FileDownloader {
    client: Client,
    config: IngestConfig,
}

impl FileDownloader {
    /// Create a downloader sharing the cookies the listing page was fetched with
    pub fn new(config: IngestConfig, page: &FetchedPage) -> Result<Self> {
        let mut headers = browser_headers();
        headers.insert("sec-fetch-dest", HeaderValue::from_static("document"));
        headers.insert("sec-fetch-mode", HeaderValue::from_static("navigate"));
        headers.insert("sec-fetch-site", HeaderValue::from_static("cross-site"));
        if let Ok(referer) = HeaderValue::from_str(&config.listing_url) {
            headers.insert(REFERER, referer);
        }

        let client = Client::builder()
            .timeout(config.download_timeout())
            .user_agent(config.user_agent.as_str())
            .default_headers(headers)
            .cookie_provider(page.cookies.clone())
            .build()?;

        Ok(FileDownloader { client, config })
    }

    /// Download one archive
    ///
    /// Waits a random pause first, then tries up to `max_retries` times with exponential
    /// backoff plus jitter between attempts. A response that arrives but is empty, or is a
    /// small markup page, fails the file without further attempts.
    pub async fn download(&self, link: &DiscoveredLink) -> Result<Vec<u8>> {
        let name = link.file.compressed_name;

        let delay = self.download_delay();
        debug!(file = name, delay_ms = delay.as_millis() as u64, "Pausing before download");
        tokio::time::sleep(delay).await;

        let (body, content_type) = self.download_with_retry(link).await?;

        if body.is_empty() {
            error!(file = name, "Downloaded file is empty");
            return Err(IngestError::Download {
                file: name.to_string(),
                attempts: 1,
                reason: "empty response body".to_string(),
            });
        }

        if is_blocked_response(&content_type, body.len(), self.config.blocked_size_threshold) {
            error!(
                file = name,
                content_type = %content_type,
                size = body.len(),
                "Possibly blocked, got a page instead of the archive"
            );
            debug!(preview = %String::from_utf8_lossy(&body[..body.len().min(500)]), "Blocked response");
            return Err(IngestError::Blocked {
                file: name.to_string(),
                content_type,
                size: body.len(),
            });
        }

        info!(file = name, bytes = body.len(), "Downloaded archive");
        Ok(body)
    }

    /// Download URL with retry logic
    async fn download_with_retry(&self, link: &DiscoveredLink) -> Result<(Vec<u8>, String)> {
        let name = link.file.compressed_name;
        let max_retries = self.config.max_retries;
        let mut last_error = String::new();

        for attempt in 0..max_retries {
            info!(file = name, "Download attempt {}/{}", attempt + 1, max_retries);

            match self.download_once(&link.url).await {
                Ok(result) => return Ok(result),
                Err(e) => {
                    warn!(file = name, "Download attempt {} failed: {}", attempt + 1, e);
                    last_error = e.to_string();

                    if attempt + 1 < max_retries {
                        let backoff = self.backoff(attempt);
                        info!("Waiting {:.1} seconds before retry...", backoff.as_secs_f64());
                        tokio::time::sleep(backoff).await;
                    }
                },
            }
        }

        error!(file = name, "Failed to download after {} attempts", max_retries);
        Err(IngestError::Download {
            file: name.to_string(),
            attempts: max_retries,
            reason: last_error,
        })
    }

    /// Download URL without retry
    async fn download_once(&self, url: &str) -> Result<(Vec<u8>, String)> {
        let response = self.client.get(url).send().await?.error_for_status()?;

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_ascii_lowercase();

        let bytes = response.bytes().await?;
        Ok((bytes.to_vec(), content_type))
    }

    fn download_delay(&self) -> Duration {
        Duration::from_millis(random_between(
            self.config.min_download_delay_ms,
            self.config.max_download_delay_ms,
        ))
    }

    /// `base * 2^attempt` plus jitter, `attempt` counted from 0
    fn backoff(&self, attempt: u32) -> Duration {
        let exponential = self
            .config
            .retry_base_ms
            .saturating_mul(2u64.saturating_pow(attempt));
        let jitter = random_between(
            self.config.min_retry_jitter_ms,
            self.config.max_retry_jitter_ms,
        );
        Duration::from_millis(exponential.saturating_add(jitter))
    }
}

fn random_between(min: u64, max: u64) -> u64 {
    if max <= min {
        return min;
    }
    rand::thread_rng().gen_range(min..=max)
}

/// Small markup responses stand in for a block or challenge page
pub fn is_blocked_response(content_type: &str, size: usize, threshold: usize) -> bool {
    content_type.to_ascii_lowercase().contains("text/html") && size < threshold
}
