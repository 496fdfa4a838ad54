// Rebrickable ingestion configuration

use crate::error::{IngestError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

// ============================================================================
// Defaults
// ============================================================================

/// Downloads page listing the CSV dumps
pub const DEFAULT_LISTING_URL: &str = "https://rebrickable.com/downloads/";

/// Host serving the compressed files
pub const DEFAULT_CDN_DOMAIN: &str = "cdn.rebrickable.com";

/// Path the CDN usually serves the dumps from
pub const DEFAULT_CDN_BASE_URL: &str = "https://cdn.rebrickable.com/media/downloads/";

/// Desktop Chrome on Windows
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Default MySQL port
pub const DEFAULT_DB_PORT: u16 = 3306;

/// Configuration for fetching and downloading the Rebrickable dumps
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    /// Page that links to the compressed files
    pub listing_url: String,

    /// Host every valid download link points at
    pub cdn_domain: String,

    /// Base URL used when a download link has to be synthesized
    pub cdn_base_url: String,

    /// User agent sent by every strategy
    pub user_agent: String,

    /// Listing page timeout in seconds
    pub page_timeout_secs: u64,

    /// Per-file download timeout in seconds
    pub download_timeout_secs: u64,

    /// Longest wait for the rendered page to settle, in seconds
    pub render_timeout_secs: u64,

    /// WebDriver endpoint (e.g. chromedriver on http://localhost:9515).
    /// Without it the rendered-browser strategy is skipped.
    pub webdriver_url: Option<String>,

    /// Rendered page counts as loaded once it has more anchors than this
    pub render_min_anchors: usize,

    /// ...or once its source contains this marker
    pub render_marker: String,

    /// Shortest pause before each download, in milliseconds
    pub min_download_delay_ms: u64,

    /// Longest pause before each download, in milliseconds
    pub max_download_delay_ms: u64,

    /// Attempts per file
    pub max_retries: u32,

    /// Backoff before retry `n` (0-based) is `retry_base_ms * 2^n` plus jitter
    pub retry_base_ms: u64,

    /// Smallest jitter added to each backoff, in milliseconds
    pub min_retry_jitter_ms: u64,

    /// Largest jitter added to each backoff, in milliseconds
    pub max_retry_jitter_ms: u64,

    /// Markup responses smaller than this many bytes are treated as blocked
    pub blocked_size_threshold: usize,

    /// Guess CDN URLs when the page yields no links
    pub synthesize_links: bool,
}

impl Default for IngestConfig {
    fn default() -> Self {
        IngestConfig {
            listing_url: DEFAULT_LISTING_URL.to_string(),
            cdn_domain: DEFAULT_CDN_DOMAIN.to_string(),
            cdn_base_url: DEFAULT_CDN_BASE_URL.to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            page_timeout_secs: 30,
            download_timeout_secs: 120,
            render_timeout_secs: 30,
            webdriver_url: None,
            render_min_anchors: 10,
            render_marker: "gzip".to_string(),
            min_download_delay_ms: 3_000,
            max_download_delay_ms: 7_000,
            max_retries: 3,
            retry_base_ms: 1_000,
            min_retry_jitter_ms: 1_000,
            max_retry_jitter_ms: 3_000,
            blocked_size_threshold: 10_000,
            synthesize_links: true,
        }
    }
}

impl IngestConfig {
    pub fn builder() -> IngestConfigBuilder {
        IngestConfigBuilder::default()
    }

    /// Configuration for tests against a local mock server: no delays, no browser
    pub fn test_config(listing_url: impl Into<String>) -> Self {
        IngestConfig {
            listing_url: listing_url.into(),
            page_timeout_secs: 5,
            download_timeout_secs: 5,
            render_timeout_secs: 1,
            min_download_delay_ms: 0,
            max_download_delay_ms: 0,
            retry_base_ms: 0,
            min_retry_jitter_ms: 0,
            max_retry_jitter_ms: 0,
            ..IngestConfig::default()
        }
    }

    pub fn page_timeout(&self) -> Duration {
        Duration::from_secs(self.page_timeout_secs)
    }

    pub fn download_timeout(&self) -> Duration {
        Duration::from_secs(self.download_timeout_secs)
    }

    pub fn render_timeout(&self) -> Duration {
        Duration::from_secs(self.render_timeout_secs)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        url::Url::parse(&self.listing_url).map_err(|e| {
            IngestError::Configuration(format!("Invalid listing URL '{}': {}", self.listing_url, e))
        })?;

        if self.cdn_domain.is_empty() {
            return Err(IngestError::Configuration("CDN domain cannot be empty".to_string()));
        }

        if self.synthesize_links && self.cdn_base_url.is_empty() {
            return Err(IngestError::Configuration(
                "CDN base URL is required when link synthesis is enabled".to_string(),
            ));
        }

        if self.page_timeout_secs == 0 || self.download_timeout_secs == 0 {
            return Err(IngestError::Configuration(
                "Timeouts must be greater than 0".to_string(),
            ));
        }

        if self.max_retries == 0 {
            return Err(IngestError::Configuration(
                "max_retries must be at least 1".to_string(),
            ));
        }

        if self.min_download_delay_ms > self.max_download_delay_ms {
            return Err(IngestError::Configuration(format!(
                "Download delay window is inverted ({}ms > {}ms)",
                self.min_download_delay_ms, self.max_download_delay_ms
            )));
        }

        if self.min_retry_jitter_ms > self.max_retry_jitter_ms {
            return Err(IngestError::Configuration(format!(
                "Retry jitter window is inverted ({}ms > {}ms)",
                self.min_retry_jitter_ms, self.max_retry_jitter_ms
            )));
        }

        Ok(())
    }
}

/// Builder for IngestConfig
#[derive(Debug, Default)]
pub struct IngestConfigBuilder {
    config: IngestConfig,
}

impl IngestConfigBuilder {
    pub fn listing_url(mut self, url: impl Into<String>) -> Self {
        self.config.listing_url = url.into();
        self
    }

    pub fn cdn_domain(mut self, domain: impl Into<String>) -> Self {
        self.config.cdn_domain = domain.into();
        self
    }

    pub fn cdn_base_url(mut self, url: impl Into<String>) -> Self {
        self.config.cdn_base_url = url.into();
        self
    }

    pub fn webdriver_url(mut self, url: impl Into<String>) -> Self {
        self.config.webdriver_url = Some(url.into());
        self
    }

    pub fn download_delay_ms(mut self, min: u64, max: u64) -> Self {
        self.config.min_download_delay_ms = min;
        self.config.max_download_delay_ms = max;
        self
    }

    pub fn retry_backoff_ms(mut self, base: u64, min_jitter: u64, max_jitter: u64) -> Self {
        self.config.retry_base_ms = base;
        self.config.min_retry_jitter_ms = min_jitter;
        self.config.max_retry_jitter_ms = max_jitter;
        self
    }

    pub fn max_retries(mut self, retries: u32) -> Self {
        self.config.max_retries = retries;
        self
    }

    pub fn blocked_size_threshold(mut self, bytes: usize) -> Self {
        self.config.blocked_size_threshold = bytes;
        self
    }

    pub fn synthesize_links(mut self, enabled: bool) -> Self {
        self.config.synthesize_links = enabled;
        self
    }

    pub fn build(self) -> IngestConfig {
        self.config
    }
}

// ============================================================================
// Environment Variable Support
// ============================================================================

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.parse().ok())
}

impl IngestConfig {
    /// Load configuration from environment variables, falling back to defaults
    pub fn from_env() -> Self {
        let default = IngestConfig::default();
        IngestConfig {
            listing_url: std::env::var("REBRICKABLE_DOWNLOADS_URL")
                .unwrap_or(default.listing_url),
            cdn_domain: std::env::var("REBRICKABLE_CDN_DOMAIN").unwrap_or(default.cdn_domain),
            cdn_base_url: std::env::var("REBRICKABLE_CDN_BASE_URL")
                .unwrap_or(default.cdn_base_url),
            user_agent: std::env::var("INGEST_USER_AGENT").unwrap_or(default.user_agent),
            page_timeout_secs: env_parse("INGEST_PAGE_TIMEOUT_SECS")
                .unwrap_or(default.page_timeout_secs),
            download_timeout_secs: env_parse("INGEST_DOWNLOAD_TIMEOUT_SECS")
                .unwrap_or(default.download_timeout_secs),
            render_timeout_secs: env_parse("INGEST_RENDER_TIMEOUT_SECS")
                .unwrap_or(default.render_timeout_secs),
            webdriver_url: std::env::var("WEBDRIVER_URL").ok().filter(|s| !s.is_empty()),
            max_retries: env_parse("INGEST_MAX_RETRIES").unwrap_or(default.max_retries),
            synthesize_links: env_parse("INGEST_SYNTHESIZE_LINKS")
                .unwrap_or(default.synthesize_links),
            ..default
        }
    }
}

// ============================================================================
// Database
// ============================================================================

/// MySQL connection settings
#[derive(Clone, PartialEq, Eq)]
pub struct DatabaseConfig {
    pub host: String,
    pub user: String,
    pub password: String,
    pub database: String,
    pub port: u16,
}

impl std::fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("host", &self.host)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("database", &self.database)
            .field("port", &self.port)
            .finish()
    }
}

impl std::fmt::Display for DatabaseConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}:{}/{}", self.user, self.host, self.port, self.database)
    }
}

impl DatabaseConfig {
    /// Read `SQL_DB_HOST`, `SQL_DB_USER`, `SQL_DB_PASS`, `SQL_DB_NAME` and `SQL_DB_PORT`
    ///
    /// Fails with every missing variable named, so the run stops before any network or
    /// database work.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) over an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let host = get("SQL_DB_HOST");
        let user = get("SQL_DB_USER");
        let password = get("SQL_DB_PASS");
        let database = get("SQL_DB_NAME");

        let missing: Vec<&str> = [
            ("SQL_DB_HOST", host.is_none()),
            ("SQL_DB_USER", user.is_none()),
            ("SQL_DB_PASS", password.is_none()),
            ("SQL_DB_NAME", database.is_none()),
        ]
        .into_iter()
        .filter_map(|(key, absent)| absent.then_some(key))
        .collect();

        let (Some(host), Some(user), Some(password), Some(database)) =
            (host, user, password, database)
        else {
            return Err(IngestError::Configuration(format!(
                "Missing required environment variables: {}",
                missing.join(", ")
            )));
        };

        let port = match get("SQL_DB_PORT") {
            Some(raw) => raw.trim().parse().map_err(|_| {
                IngestError::Configuration(format!("SQL_DB_PORT is not a valid port: {}", raw))
            })?,
            None => DEFAULT_DB_PORT,
        };

        Ok(DatabaseConfig {
            host,
            user,
            password,
            database,
            port,
        })
    }

    /// sqlx connect options for this database
    pub fn connect_options(&self) -> sqlx::mysql::MySqlConnectOptions {
        sqlx::mysql::MySqlConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .username(&self.user)
            .password(&self.password)
            .database(&self.database)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = IngestConfig::default();
        assert_eq!(config.listing_url, "https://rebrickable.com/downloads/");
        assert_eq!(config.cdn_domain, "cdn.rebrickable.com");
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.blocked_size_threshold, 10_000);
        assert_eq!(config.page_timeout(), Duration::from_secs(30));
        assert_eq!(config.download_timeout(), Duration::from_secs(120));
        assert!(config.webdriver_url.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder_pattern() {
        let config = IngestConfig::builder()
            .listing_url("http://127.0.0.1:8080/downloads/")
            .download_delay_ms(0, 0)
            .max_retries(5)
            .synthesize_links(false)
            .build();

        assert_eq!(config.listing_url, "http://127.0.0.1:8080/downloads/");
        assert_eq!(config.max_download_delay_ms, 0);
        assert_eq!(config.max_retries, 5);
        assert!(!config.synthesize_links);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let config = IngestConfig::builder().listing_url("not a url").build();
        assert!(config.validate().is_err());

        let config = IngestConfig::builder().max_retries(0).build();
        assert!(config.validate().is_err());

        let config = IngestConfig::builder().download_delay_ms(7_000, 3_000).build();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_test_config_has_no_delays() {
        let config = IngestConfig::test_config("http://localhost/downloads/");
        assert_eq!(config.max_download_delay_ms, 0);
        assert_eq!(config.retry_base_ms, 0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_database_config_defaults_port() {
        let config = DatabaseConfig::from_lookup(lookup(&[
            ("SQL_DB_HOST", "db.local"),
            ("SQL_DB_USER", "lego"),
            ("SQL_DB_PASS", "secret"),
            ("SQL_DB_NAME", "bricks"),
        ]))
        .unwrap();

        assert_eq!(config.port, 3306);
        assert_eq!(config.to_string(), "lego@db.local:3306/bricks");
        assert!(!format!("{:?}", config).contains("secret"));
    }

    #[test]
    fn test_database_config_names_missing_variables() {
        let err = DatabaseConfig::from_lookup(lookup(&[
            ("SQL_DB_HOST", "db.local"),
            ("SQL_DB_PASS", ""),
        ]))
        .unwrap_err();

        let message = err.to_string();
        assert!(message.contains("SQL_DB_USER"));
        assert!(message.contains("SQL_DB_PASS"));
        assert!(message.contains("SQL_DB_NAME"));
        assert!(!message.contains("SQL_DB_HOST"));
    }

    #[test]
    fn test_database_config_rejects_bad_port() {
        let err = DatabaseConfig::from_lookup(lookup(&[
            ("SQL_DB_HOST", "db.local"),
            ("SQL_DB_USER", "lego"),
            ("SQL_DB_PASS", "secret"),
            ("SQL_DB_NAME", "bricks"),
            ("SQL_DB_PORT", "mysql"),
        ]))
        .unwrap_err();

        assert!(matches!(err, IngestError::Configuration(_)));
    }
}
