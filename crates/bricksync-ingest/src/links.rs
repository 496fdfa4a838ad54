//! Download link discovery on the listing page
//!
//! Links are found by an ordered chain of [`LinkStrategy`] implementations. The first
//! strategy to return at least one link wins; results are never merged across strategies.

use crate::config::IngestConfig;
use crate::error::{IngestError, Result};
use crate::tables::{self, RequiredFile, REQUIRED_FILES};
use scraper::{ElementRef, Html, Selector};
use std::collections::HashMap;
use std::path::PathBuf;
use tracing::{debug, error, info, warn};
use url::Url;

/// A download URL found for one required file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredLink {
    pub file: &'static RequiredFile,
    pub url: String,
}

/// Links found so far, keyed by compressed file name
///
/// The first URL recorded for a file is kept.
#[derive(Debug, Default)]
pub struct LinkSet {
    found: HashMap<&'static str, DiscoveredLink>,
}

impl LinkSet {
    pub fn contains(&self, file: &RequiredFile) -> bool {
        self.found.contains_key(file.compressed_name)
    }

    /// Record `url` for `file` unless one is already known; returns whether it was added
    pub fn record(&mut self, file: &'static RequiredFile, url: String) -> bool {
        if self.contains(file) {
            return false;
        }
        self.found
            .insert(file.compressed_name, DiscoveredLink { file, url });
        true
    }

    pub fn len(&self) -> usize {
        self.found.len()
    }

    pub fn is_empty(&self) -> bool {
        self.found.is_empty()
    }

    /// Links in catalog order
    pub fn into_links(mut self) -> Vec<DiscoveredLink> {
        REQUIRED_FILES
            .iter()
            .filter_map(|file| self.found.remove(file.compressed_name))
            .collect()
    }
}

/// One way of pulling download links out of the page
pub trait LinkStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// Returns `None` when the strategy is disabled
    fn attempt(&self, document: &Html, base: &Url) -> Option<Result<LinkSet>>;
}

fn css(selector: &str) -> Result<Selector> {
    Selector::parse(selector)
        .map_err(|e| IngestError::Configuration(format!("Invalid selector '{}': {}", selector, e)))
}

fn element_text(element: &ElementRef<'_>) -> String {
    element.text().collect::<String>().trim().to_string()
}

/// Resolve an href against the page it appeared on
fn absolute(base: &Url, href: &str) -> Option<String> {
    match base.join(href.trim()) {
        Ok(url) => Some(url.to_string()),
        Err(e) => {
            debug!(href, error = %e, "Skipping unresolvable link");
            None
        },
    }
}

/// Scans containers that pair a filename label with a `gzip` link
///
/// For every `div`, the first `span.mr-10` inside it is read as a file name; when that name
/// plus `.gz` is a required file, the first `a` in the same `div` whose text is `gzip`
/// provides the URL.
pub struct StructuredScan {
    container: Selector,
    label: Selector,
    anchor: Selector,
}

impl StructuredScan {
    pub fn new() -> Result<Self> {
        Ok(StructuredScan {
            container: css("div")?,
            label: css("span.mr-10")?,
            anchor: css("a")?,
        })
    }
}

impl LinkStrategy for StructuredScan {
    fn name(&self) -> &'static str {
        "structured"
    }

    fn attempt(&self, document: &Html, base: &Url) -> Option<Result<LinkSet>> {
        let mut links = LinkSet::default();

        for container in document.select(&self.container) {
            let Some(label) = container.select(&self.label).next() else {
                continue;
            };
            let compressed_name = format!("{}.gz", element_text(&label));
            let Some(file) = tables::by_compressed_name(&compressed_name) else {
                continue;
            };
            if links.contains(file) {
                continue;
            }

            let href = container
                .select(&self.anchor)
                .find(|a| element_text(a) == "gzip")
                .and_then(|a| a.value().attr("href"));

            if let Some(url) = href.and_then(|href| absolute(base, href)) {
                info!(file = %file, url = %url, "Found download link");
                links.record(file, url);
            }
        }

        Some(Ok(links))
    }
}

/// Accepts any link on the CDN whose target mentions a required file
///
/// The name must start a path segment, so `minifigs.csv.gz` does not match a link to
/// `inventory_minifigs.csv.gz`.
pub struct CdnAnchorScan {
    anchor: Selector,
    cdn_domain: String,
}

impl CdnAnchorScan {
    pub fn new(cdn_domain: impl Into<String>) -> Result<Self> {
        Ok(CdnAnchorScan {
            anchor: css("a[href]")?,
            cdn_domain: cdn_domain.into(),
        })
    }
}

impl LinkStrategy for CdnAnchorScan {
    fn name(&self) -> &'static str {
        "cdn-anchor"
    }

    fn attempt(&self, document: &Html, base: &Url) -> Option<Result<LinkSet>> {
        let mut links = LinkSet::default();

        for anchor in document.select(&self.anchor) {
            let Some(href) = anchor.value().attr("href") else {
                continue;
            };
            if !href.contains(&self.cdn_domain) {
                continue;
            }

            for file in REQUIRED_FILES {
                let path_suffix = format!("/{}", file.compressed_name);
                if href.contains(&path_suffix) && !links.contains(file) {
                    if let Some(url) = absolute(base, href) {
                        info!(file = %file, url = %url, "Found download link via fallback");
                        links.record(file, url);
                    }
                }
            }
        }

        Some(Ok(links))
    }
}

/// Guesses CDN URLs from the usual path and a current timestamp
///
/// Best effort: the guessed URLs may not exist.
pub struct SynthesizedLinks {
    cdn_base_url: String,
}

impl SynthesizedLinks {
    pub fn new(cdn_base_url: impl Into<String>) -> Self {
        SynthesizedLinks {
            cdn_base_url: cdn_base_url.into(),
        }
    }

    pub fn url_for(&self, file: &RequiredFile, timestamp: i64) -> String {
        let base = self.cdn_base_url.trim_end_matches('/');
        format!("{}/{}?{}", base, file.compressed_name, timestamp)
    }
}

impl LinkStrategy for SynthesizedLinks {
    fn name(&self) -> &'static str {
        "synthesized"
    }

    fn attempt(&self, _document: &Html, _base: &Url) -> Option<Result<LinkSet>> {
        let timestamp = chrono::Utc::now().timestamp();
        let mut links = LinkSet::default();
        for file in REQUIRED_FILES {
            let url = self.url_for(file, timestamp);
            info!(file = %file, url = %url, "Constructed candidate download link");
            links.record(file, url);
        }
        Some(Ok(links))
    }
}

/// Extracts download links, dumping the page for inspection when none are found
pub struct LinkResolver {
    strategies: Vec<Box<dyn LinkStrategy>>,
    base_url: Url,
    debug_page: PathBuf,
}

impl LinkResolver {
    pub fn new(
        strategies: Vec<Box<dyn LinkStrategy>>,
        base_url: Url,
        debug_page: impl Into<PathBuf>,
    ) -> Self {
        Self {
            strategies,
            base_url,
            debug_page: debug_page.into(),
        }
    }

    /// The standard chain: structured scan, CDN anchor scan, then synthesis if enabled
    pub fn from_config(config: &IngestConfig, debug_page: impl Into<PathBuf>) -> Result<Self> {
        let base_url = Url::parse(&config.listing_url).map_err(|e| {
            IngestError::Configuration(format!("Invalid listing URL '{}': {}", config.listing_url, e))
        })?;

        let mut strategies: Vec<Box<dyn LinkStrategy>> = vec![
            Box::new(StructuredScan::new()?),
            Box::new(CdnAnchorScan::new(config.cdn_domain.clone())?),
        ];
        if config.synthesize_links {
            strategies.push(Box::new(SynthesizedLinks::new(config.cdn_base_url.clone())));
        }

        Ok(Self::new(strategies, base_url, debug_page))
    }

    /// Find download links in `html`
    ///
    /// Returns the links in catalog order. Fails with `Resolution` when no strategy finds
    /// anything, after writing the page to the debug location.
    pub fn resolve(&self, html: &str) -> Result<Vec<DiscoveredLink>> {
        let document = Html::parse_document(html);

        for (idx, strategy) in self.strategies.iter().enumerate() {
            if idx > 0 {
                warn!(strategy = strategy.name(), "Previous parsing method found nothing, trying next");
            }

            match strategy.attempt(&document, &self.base_url) {
                None => continue,
                Some(Err(e)) => {
                    warn!(strategy = strategy.name(), error = %e, "Link strategy failed");
                },
                Some(Ok(links)) if !links.is_empty() => {
                    info!(
                        strategy = strategy.name(),
                        found = links.len(),
                        required = REQUIRED_FILES.len(),
                        "Resolved download links"
                    );
                    return Ok(links.into_links());
                },
                Some(Ok(_)) => {},
            }
        }

        error!("No required files found on the download page");
        self.dump_page(html);
        Err(IngestError::Resolution {
            details: diagnostics(&document),
        })
    }

    fn dump_page(&self, html: &str) {
        if let Some(parent) = self.debug_page.parent() {
            if let Err(e) = std::fs::create_dir_all(parent) {
                warn!(error = %e, "Failed to create debug directory");
                return;
            }
        }
        match std::fs::write(&self.debug_page, html) {
            Ok(()) => info!(path = %self.debug_page.display(), "Saved page content for inspection"),
            Err(e) => warn!(path = %self.debug_page.display(), error = %e, "Failed to save page content"),
        }
    }
}

fn select_all<'a>(document: &'a Html, selector: &str) -> Vec<ElementRef<'a>> {
    css(selector)
        .map(|s| document.select(&s).collect())
        .unwrap_or_default()
}

/// Summarise what the page did contain, logging samples at debug level
fn diagnostics(document: &Html) -> String {
    let spans = select_all(document, "span");
    let labels = select_all(document, "span.mr-10");
    let gzip_links: Vec<_> = select_all(document, "a")
        .into_iter()
        .filter(|a| element_text(a) == "gzip")
        .collect();

    let label_samples: Vec<String> = labels.iter().take(5).map(element_text).collect();
    let href_samples: Vec<&str> = gzip_links
        .iter()
        .take(3)
        .filter_map(|a| a.value().attr("href"))
        .collect();

    debug!(count = spans.len(), "span elements on page");
    debug!(count = labels.len(), samples = ?label_samples, "filename label spans on page");
    debug!(count = gzip_links.len(), samples = ?href_samples, "gzip links on page");

    format!(
        "{} span elements, {} filename labels, {} gzip links",
        spans.len(),
        labels.len(),
        gzip_links.len()
    )
}
