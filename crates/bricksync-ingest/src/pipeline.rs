// Rebrickable Pipeline Orchestration
//
// fetch page -> resolve links -> download + decompress -> generate statements -> load

use crate::config::IngestConfig;
use crate::decompression::stage_archive;
use crate::downloader::FileDownloader;
use crate::error::{IngestError, Result};
use crate::fetch::PageFetcher;
use crate::links::LinkResolver;
use crate::loader::{LoadReport, Loader, StatementExecutor};
use crate::statements::{StatementFile, StatementGenerator};
use crate::tables::RequiredFile;
use bricksync_common::DataDirs;
use std::future::Future;
use std::path::PathBuf;
use tracing::{error, info, warn};

/// A required file downloaded and staged as CSV
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcquiredFile {
    pub file: &'static RequiredFile,
    pub path: PathBuf,
}

/// A required file that could not be obtained
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedFile {
    pub file: &'static RequiredFile,
    pub reason: String,
}

/// Outcome of the acquisition stage
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcquisitionReport {
    /// Fetch strategy that produced the listing page
    pub strategy: &'static str,
    pub acquired: Vec<AcquiredFile>,
    pub skipped: Vec<SkippedFile>,
}

/// Outcome of a full run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineReport {
    pub acquisition: AcquisitionReport,
    pub statement_files: Vec<StatementFile>,
    pub load: LoadReport,
}

/// Rebrickable ingestion pipeline
pub struct IngestPipeline {
    config: IngestConfig,
    dirs: DataDirs,
    fetcher: PageFetcher,
}

impl IngestPipeline {
    /// Create a pipeline with the standard fetch strategy chain
    pub fn new(config: IngestConfig, dirs: DataDirs) -> Result<Self> {
        config.validate()?;
        let fetcher = PageFetcher::from_config(&config)?;
        Ok(Self {
            config,
            dirs,
            fetcher,
        })
    }

    /// Replace the fetch strategy chain
    pub fn with_fetcher(mut self, fetcher: PageFetcher) -> Self {
        self.fetcher = fetcher;
        self
    }

    pub fn dirs(&self) -> &DataDirs {
        &self.dirs
    }

    /// Fetch the listing page, resolve links, then download and stage every file
    ///
    /// Page and link failures end the run. A file that fails to download or decompress is
    /// skipped; no file at all fails with `NoFilesAcquired`. Staging is emptied first, so
    /// later stages only see files acquired by this call.
    pub async fn acquire(&self) -> Result<AcquisitionReport> {
        self.dirs.ensure()?;
        self.dirs.clean_staging()?;

        let page = self.fetcher.fetch(&self.config.listing_url).await?;

        let links = LinkResolver::from_config(&self.config, self.dirs.debug_page())?
            .resolve(&page.html)?;
        info!(
            found = links.len(),
            files = ?links.iter().map(|l| l.file.compressed_name).collect::<Vec<_>>(),
            "Found required files"
        );

        let downloader = FileDownloader::new(self.config.clone(), &page)?;
        let mut acquired = Vec::new();
        let mut skipped = Vec::new();

        for link in &links {
            info!(file = %link.file, url = %link.url, "Processing file");

            let staged = match downloader.download(link).await {
                Ok(bytes) => stage_archive(&self.dirs, link.file, &bytes),
                Err(e) => Err(e),
            };

            match staged {
                Ok(path) => acquired.push(AcquiredFile {
                    file: link.file,
                    path,
                }),
                Err(e) => {
                    error!(file = %link.file, error = %e, "Skipping file");
                    skipped.push(SkippedFile {
                        file: link.file,
                        reason: e.to_string(),
                    });
                },
            }
        }

        info!(
            acquired = acquired.len(),
            skipped = skipped.len(),
            "Downloaded and extracted files"
        );

        if acquired.is_empty() {
            return Err(IngestError::NoFilesAcquired);
        }

        Ok(AcquisitionReport {
            strategy: page.strategy,
            acquired,
            skipped,
        })
    }

    /// Turn the staged CSV tables into statement files
    pub fn generate(&self) -> Result<Vec<StatementFile>> {
        StatementGenerator::new(self.dirs.clone()).generate_all()
    }

    /// Apply the given statement files and rebuild the summaries
    pub async fn load<E>(&self, executor: &mut E, files: &[StatementFile]) -> Result<LoadReport>
    where
        E: StatementExecutor + ?Sized,
    {
        Loader::new(self.dirs.clone()).load(executor, files).await
    }

    /// Run every stage, connecting to the store only once statements are ready
    ///
    /// Staged files are removed after a load that returns without error.
    pub async fn run<C, F, E>(&self, connect: C) -> Result<PipelineReport>
    where
        C: FnOnce() -> F,
        F: Future<Output = Result<E>>,
        E: StatementExecutor,
    {
        info!("Step 1/3: Acquiring files...");
        let acquisition = self.acquire().await?;

        info!("Step 2/3: Generating insert statements...");
        let statement_files = self.generate()?;

        info!("Step 3/3: Loading statements...");
        let mut executor = connect().await?;
        let load = self.load(&mut executor, &statement_files).await?;

        if let Err(e) = self.dirs.clean_staging() {
            warn!(error = %e, "Failed to clean staging directory");
        }

        if load.is_complete() {
            info!(
                inserted = load.inserted_rows(),
                executed = load.executed_statements(),
                "Data update completed"
            );
        } else {
            warn!(
                inserted = load.inserted_rows(),
                failed = load.failed_statements(),
                "Data update completed with failures"
            );
        }

        Ok(PipelineReport {
            acquisition,
            statement_files,
            load,
        })
    }
}
