//! Listing page retrieval
//!
//! The downloads page sits behind bot mitigation, so it is fetched through an ordered chain
//! of [`FetchStrategy`] implementations. The first strategy that returns a non-empty page
//! wins, and the cookies it collected travel on to the downloader.
//!
//! # Strategies
//!
//! 1. [`BrowserProfileStrategy`]: HTTP client presenting a full desktop Chrome profile
//! 2. [`HeadlessBrowserStrategy`]: page rendered by a WebDriver-controlled Chrome
//! 3. [`PlainRequestStrategy`]: single request with browser-like headers

pub mod browser_profile;
pub mod headless;
pub mod plain;

pub use browser_profile::BrowserProfileStrategy;
pub use headless::HeadlessBrowserStrategy;
pub use plain::PlainRequestStrategy;

use crate::config::IngestConfig;
use crate::error::{IngestError, Result};
use async_trait::async_trait;
use reqwest::cookie::Jar;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// HTML of the listing page and the session it was obtained in
#[derive(Debug, Clone)]
pub struct FetchedPage {
    pub html: String,
    /// Name of the strategy that produced the page
    pub strategy: &'static str,
    /// Cookies set while fetching, reused for the downloads
    pub cookies: Arc<Jar>,
}

impl FetchedPage {
    pub fn new(html: String, strategy: &'static str) -> Self {
        Self::with_cookies(html, strategy, Arc::new(Jar::default()))
    }

    pub fn with_cookies(html: String, strategy: &'static str, cookies: Arc<Jar>) -> Self {
        FetchedPage {
            html,
            strategy,
            cookies,
        }
    }
}

/// One way of obtaining the listing page
#[async_trait]
pub trait FetchStrategy: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &'static str;

    /// Try to fetch `url`
    ///
    /// Returns `None` when the strategy cannot run in this environment (for example no
    /// WebDriver endpoint is configured), so the chain moves on without counting a failure.
    async fn attempt(&self, url: &str) -> Option<Result<FetchedPage>>;
}

/// Headers a desktop Chrome sends on a top-level navigation
pub fn browser_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(
        ACCEPT,
        HeaderValue::from_static(
            "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,image/apng,*/*;q=0.8,application/signed-exchange;v=b3;q=0.7",
        ),
    );
    headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));
    headers
}

/// Runs the strategy chain
pub struct PageFetcher {
    strategies: Vec<Box<dyn FetchStrategy>>,
}

impl PageFetcher {
    pub fn new(strategies: Vec<Box<dyn FetchStrategy>>) -> Self {
        Self { strategies }
    }

    /// The standard chain: browser profile, headless browser, plain request
    pub fn from_config(config: &IngestConfig) -> Result<Self> {
        Ok(Self::new(vec![
            Box::new(BrowserProfileStrategy::new(config)?),
            Box::new(HeadlessBrowserStrategy::new(config)),
            Box::new(PlainRequestStrategy::new(config)?),
        ]))
    }

    pub fn strategy_names(&self) -> Vec<&'static str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    /// Fetch `url` with the first strategy that yields a non-empty page
    ///
    /// When every strategy fails and the last failure was an access-denied response, that
    /// error is returned as is so its hint reaches the operator.
    pub async fn fetch(&self, url: &str) -> Result<FetchedPage> {
        info!(url, "Fetching download page");

        let mut failures = Vec::new();
        let mut last_error = None;

        for strategy in &self.strategies {
            let name = strategy.name();
            match strategy.attempt(url).await {
                None => {
                    debug!(strategy = name, "Strategy unavailable, skipping");
                },
                Some(Ok(page)) if !page.html.trim().is_empty() => {
                    info!(strategy = name, bytes = page.html.len(), "Fetched download page");
                    return Ok(page);
                },
                Some(Ok(_)) => {
                    warn!(strategy = name, "Strategy returned an empty page");
                    failures.push(format!("{}: empty page", name));
                    last_error = None;
                },
                Some(Err(e)) => {
                    warn!(strategy = name, error = %e, "Strategy failed");
                    failures.push(format!("{}: {}", name, e));
                    last_error = Some(e);
                },
            }
        }

        if let Some(e @ IngestError::AccessDenied { .. }) = last_error {
            return Err(e);
        }

        Err(IngestError::Fetch {
            url: url.to_string(),
            reason: if failures.is_empty() {
                "no strategy available".to_string()
            } else {
                failures.join("; ")
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    enum Outcome {
        Unavailable,
        Page(&'static str),
        Fail,
        Denied,
    }

    struct Scripted {
        name: &'static str,
        outcome: Outcome,
        calls: Arc<AtomicUsize>,
    }

    impl Scripted {
        fn boxed(name: &'static str, outcome: Outcome, calls: &Arc<AtomicUsize>) -> Box<dyn FetchStrategy> {
            Box::new(Scripted {
                name,
                outcome,
                calls: calls.clone(),
            })
        }
    }

    #[async_trait]
    impl FetchStrategy for Scripted {
        fn name(&self) -> &'static str {
            self.name
        }

        async fn attempt(&self, url: &str) -> Option<Result<FetchedPage>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.outcome {
                Outcome::Unavailable => None,
                Outcome::Page(html) => Some(Ok(FetchedPage::new(html.to_string(), self.name))),
                Outcome::Fail => Some(Err(IngestError::Fetch {
                    url: url.to_string(),
                    reason: "challenge".to_string(),
                })),
                Outcome::Denied => Some(Err(IngestError::AccessDenied {
                    url: url.to_string(),
                })),
            }
        }
    }

    #[tokio::test]
    async fn test_first_non_empty_page_wins() {
        let calls = Arc::new(AtomicUsize::new(0));
        let fetcher = PageFetcher::new(vec![
            Scripted::boxed("profile", Outcome::Fail, &calls),
            Scripted::boxed("headless", Outcome::Page("  "), &calls),
            Scripted::boxed("plain", Outcome::Page("<html>ok</html>"), &calls),
        ]);

        let page = fetcher.fetch("https://rebrickable.com/downloads/").await.unwrap();
        assert_eq!(page.strategy, "plain");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_later_strategies_not_tried_after_success() {
        let calls = Arc::new(AtomicUsize::new(0));
        let fetcher = PageFetcher::new(vec![
            Scripted::boxed("profile", Outcome::Page("<html>ok</html>"), &calls),
            Scripted::boxed("plain", Outcome::Fail, &calls),
        ]);

        let page = fetcher.fetch("https://rebrickable.com/downloads/").await.unwrap();
        assert_eq!(page.strategy, "profile");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_access_denied_from_last_strategy_surfaces() {
        let calls = Arc::new(AtomicUsize::new(0));
        let fetcher = PageFetcher::new(vec![
            Scripted::boxed("profile", Outcome::Fail, &calls),
            Scripted::boxed("headless", Outcome::Unavailable, &calls),
            Scripted::boxed("plain", Outcome::Denied, &calls),
        ]);

        let err = fetcher.fetch("https://rebrickable.com/downloads/").await.unwrap_err();
        assert!(matches!(err, IngestError::AccessDenied { .. }));
    }

    #[tokio::test]
    async fn test_all_failures_are_reported() {
        let calls = Arc::new(AtomicUsize::new(0));
        let fetcher = PageFetcher::new(vec![
            Scripted::boxed("profile", Outcome::Fail, &calls),
            Scripted::boxed("plain", Outcome::Page(""), &calls),
        ]);

        match fetcher.fetch("https://rebrickable.com/downloads/").await {
            Err(IngestError::Fetch { reason, .. }) => {
                assert!(reason.contains("profile"));
                assert!(reason.contains("plain: empty page"));
            },
            other => panic!("expected fetch error, got {:?}", other.map(|p| p.strategy)),
        }
    }

    #[test]
    fn test_default_chain_order() {
        let fetcher = PageFetcher::from_config(&IngestConfig::default()).unwrap();
        assert_eq!(
            fetcher.strategy_names(),
            vec!["browser-profile", "headless-browser", "plain-request"]
        );
    }
}
