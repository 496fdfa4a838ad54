//! End-to-end pipeline runs against a mock downloads site and SQLite

mod common;

use bricksync_common::DataDirs;
use bricksync_ingest::tables::{LOAD_ORDER, REQUIRED_FILES};
use bricksync_ingest::{IngestConfig, IngestError, IngestPipeline};
use common::{fixture_tables, gzip, init_tracing, listing_page, SqliteStore};
use tempfile::TempDir;
use wiremock::{
    matchers::{method, path},
    Mock, MockServer, ResponseTemplate,
};

async fn mount_listing(server: &MockServer, html: String) {
    Mock::given(method("GET"))
        .and(path("/downloads/"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/html; charset=utf-8")
                .set_body_string(html),
        )
        .mount(server)
        .await;
}

/// Serve every fixture archive except `failing`, which always answers 500
async fn mount_archives(server: &MockServer, failing: Option<&str>) {
    for (table, csv) in fixture_tables() {
        let file_path = format!("/media/downloads/{}.csv.gz", table);
        let response = if failing == Some(table) {
            ResponseTemplate::new(500)
        } else {
            ResponseTemplate::new(200)
                .insert_header("content-type", "application/gzip")
                .set_body_bytes(gzip(csv.as_bytes()))
        };

        let mock = Mock::given(method("GET")).and(path(file_path)).respond_with(response);
        let mock = if failing == Some(table) { mock.expect(3) } else { mock.expect(1) };
        mock.mount(server).await;
    }
}

fn all_files() -> Vec<&'static str> {
    REQUIRED_FILES.iter().map(|f| f.compressed_name).collect()
}

fn pipeline(server: &MockServer, tmp: &TempDir) -> IngestPipeline {
    let config = IngestConfig::test_config(format!("{}/downloads/", server.uri()));
    IngestPipeline::new(config, DataDirs::under(tmp.path())).unwrap()
}

#[tokio::test]
async fn test_full_run() {
    init_tracing();
    let server = MockServer::start().await;
    mount_listing(&server, listing_page(&server.uri(), &all_files())).await;
    mount_archives(&server, None).await;

    let tmp = TempDir::new().unwrap();
    let pipeline = pipeline(&server, &tmp);
    let mut store = SqliteStore::new().await;

    let executor = &mut store;
    let report = pipeline
        .run(move || async move { Ok::<_, IngestError>(executor) })
        .await
        .unwrap();

    assert_eq!(report.acquisition.strategy, "browser-profile");
    assert_eq!(report.acquisition.acquired.len(), 6);
    assert!(report.acquisition.skipped.is_empty());

    let generated: Vec<_> = report.statement_files.iter().map(|f| f.table).collect();
    assert_eq!(generated, LOAD_ORDER.to_vec());
    assert!(report.statement_files.iter().all(|f| f.statements > 0));

    assert_eq!(report.load.failed_statements(), 0);
    assert!(report.load.summaries.iter().all(|s| s.result.is_ok()));
    assert_eq!(store.count("sets").await, 16);
    assert_eq!(store.count("popular_themes").await, 5);

    let per_theme: Vec<(i64, i64)> =
        sqlx::query_as("SELECT theme_id, COUNT(*) FROM recent_set_additions GROUP BY theme_id")
            .fetch_all(&mut store.conn)
            .await
            .unwrap();
    assert!(per_theme.iter().all(|(_, count)| *count <= 5));

    // Staging is cleared after the load, statement files stay
    let dirs = pipeline.dirs();
    assert!(!dirs.staged_table("sets").exists());
    assert!(!dirs.compressed_file("sets.csv.gz").exists());
    assert!(dirs.statement_file("sets").exists());
}

#[tokio::test]
async fn test_one_failing_download_is_skipped() {
    init_tracing();
    let server = MockServer::start().await;
    mount_listing(&server, listing_page(&server.uri(), &all_files())).await;
    mount_archives(&server, Some("minifigs")).await;

    let tmp = TempDir::new().unwrap();
    let pipeline = pipeline(&server, &tmp);
    let mut store = SqliteStore::new().await;

    let executor = &mut store;
    let report = pipeline
        .run(move || async move { Ok::<_, IngestError>(executor) })
        .await
        .unwrap();

    assert_eq!(report.acquisition.acquired.len(), 5);
    assert_eq!(report.acquisition.skipped.len(), 1);
    assert_eq!(report.acquisition.skipped[0].file.table, "minifigs");
    assert!(report.acquisition.skipped[0].reason.contains("3 attempt"));

    assert_eq!(report.statement_files.len(), 5);
    assert!(report.statement_files.iter().all(|f| f.table != "minifigs"));
    assert_eq!(store.count("minifigs").await, 0);
    assert_eq!(store.count("themes").await, 8);
}

#[tokio::test]
async fn test_rerun_does_not_reload_previous_files() {
    init_tracing();
    let tmp = TempDir::new().unwrap();

    let first_server = MockServer::start().await;
    mount_listing(&first_server, listing_page(&first_server.uri(), &all_files())).await;
    mount_archives(&first_server, None).await;

    let mut first_store = SqliteStore::new().await;
    let executor = &mut first_store;
    pipeline(&first_server, &tmp)
        .run(move || async move { Ok::<_, IngestError>(executor) })
        .await
        .unwrap();
    assert_eq!(first_store.count("minifigs").await, 3);

    // Same directories, minifigs now unavailable, a store that has never seen it
    let second_server = MockServer::start().await;
    mount_listing(&second_server, listing_page(&second_server.uri(), &all_files())).await;
    mount_archives(&second_server, Some("minifigs")).await;

    let second = pipeline(&second_server, &tmp);
    let mut second_store = SqliteStore::new().await;
    let executor = &mut second_store;
    let report = second
        .run(move || async move { Ok::<_, IngestError>(executor) })
        .await
        .unwrap();

    assert_eq!(report.statement_files.len(), 5);
    assert!(report.load.table("minifigs").is_none());
    assert_eq!(second_store.count("minifigs").await, 0);
    assert_eq!(second_store.count("themes").await, 8);
    assert!(!second.dirs().statement_file("minifigs").exists());
}

#[tokio::test]
async fn test_acquire_clears_previous_staging() {
    init_tracing();
    let server = MockServer::start().await;
    mount_listing(&server, listing_page(&server.uri(), &["themes.csv.gz"])).await;
    Mock::given(method("GET"))
        .and(path("/media/downloads/themes.csv.gz"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(gzip(common::THEMES_CSV.as_bytes())))
        .mount(&server)
        .await;

    let tmp = TempDir::new().unwrap();
    let pipeline = pipeline(&server, &tmp);
    pipeline.dirs().ensure().unwrap();
    std::fs::write(pipeline.dirs().staged_table("minifigs"), common::MINIFIGS_CSV).unwrap();

    pipeline.acquire().await.unwrap();
    let produced = pipeline.generate().unwrap();

    assert!(!pipeline.dirs().staged_table("minifigs").exists());
    assert_eq!(produced.len(), 1);
    assert_eq!(produced[0].table, "themes");
}

#[tokio::test]
async fn test_undecodable_archive_is_skipped() {
    init_tracing();
    let server = MockServer::start().await;
    mount_listing(&server, listing_page(&server.uri(), &["themes.csv.gz", "sets.csv.gz"])).await;

    Mock::given(method("GET"))
        .and(path("/media/downloads/themes.csv.gz"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(gzip(common::THEMES_CSV.as_bytes())))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/media/downloads/sets.csv.gz"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "application/octet-stream")
                .set_body_bytes(b"PK\x03\x04 definitely not gzip".to_vec()),
        )
        .mount(&server)
        .await;

    let tmp = TempDir::new().unwrap();
    let report = pipeline(&server, &tmp).acquire().await.unwrap();

    assert_eq!(report.acquired.len(), 1);
    assert_eq!(report.acquired[0].file.table, "themes");
    assert_eq!(report.skipped.len(), 1);
    assert_eq!(report.skipped[0].file.table, "sets");
}

#[tokio::test]
async fn test_no_acquired_files_is_fatal() {
    init_tracing();
    let server = MockServer::start().await;
    mount_listing(&server, listing_page(&server.uri(), &["themes.csv.gz"])).await;

    Mock::given(method("GET"))
        .and(path("/media/downloads/themes.csv.gz"))
        .respond_with(ResponseTemplate::new(404))
        .expect(3)
        .mount(&server)
        .await;

    let tmp = TempDir::new().unwrap();
    let err = pipeline(&server, &tmp).acquire().await.unwrap_err();
    assert!(matches!(err, IngestError::NoFilesAcquired));
}

#[tokio::test]
async fn test_page_without_links_is_dumped() {
    init_tracing();
    let server = MockServer::start().await;
    let html = "<html><body><span>Checking your browser before accessing</span></body></html>";
    mount_listing(&server, html.to_string()).await;

    let tmp = TempDir::new().unwrap();
    let config = IngestConfig {
        synthesize_links: false,
        ..IngestConfig::test_config(format!("{}/downloads/", server.uri()))
    };
    let pipeline = IngestPipeline::new(config, DataDirs::under(tmp.path())).unwrap();

    let err = pipeline.acquire().await.unwrap_err();
    assert!(matches!(err, IngestError::Resolution { .. }));
    assert!(err.is_fatal());

    let dumped = std::fs::read_to_string(pipeline.dirs().debug_page()).unwrap();
    assert_eq!(dumped, html);
}
