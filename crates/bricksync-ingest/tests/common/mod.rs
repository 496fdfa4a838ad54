//! Shared fixtures for the ingest integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use bricksync_ingest::loader::StatementExecutor;
use flate2::write::GzEncoder;
use flate2::Compression;
use sqlx::sqlite::SqliteConnection;
use sqlx::Connection;
use std::io::Write;

/// Initialize test logging once
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("bricksync_ingest=debug")
        .with_test_writer()
        .try_init();
}

pub fn gzip(data: &[u8]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

pub const THEMES_CSV: &str = "\
id,name,parent_id
1,Technic,
2,Arctic Technic,1
3,Castle,
4,Pirates,
5,Space,
6,Town,
7,Trains,6
8,Ninjago,
";

pub const SETS_CSV: &str = "\
set_num,name,year,theme_id,num_parts,img_url
8855-1,Prop Plane,1990,1,,
8880-1,Super Car,1994,1,1343,
6520-1,Arctic Expedition,2001,2,147,
42056-1,Porsche 911 GT3 RS,2016,1,2704,
42083-1,Bugatti Chiron,2018,1,3599,
42115-1,Lamborghini Sian FKP 37,2020,1,3696,
42143-1,Ferrari Daytona SP3,2022,1,3778,
6080-1,King's Castle,1988,3,,
10305-1,Lion Knights' Castle,2022,3,4514,
6285-1,Black Seas Barracuda,1989,4,,
10320-1,Eldorado Fortress,2023,4,2509,
6930-1,Space Supply Station,1983,5,,
9999-1,Unreleased Shuttle,,5,NaN,
60200-1,Capital City,2018,6,1211,
10194-1,Emerald Night,2009,7,1085,
70751-1,Temple of Airjitzu,2015,8,2028,
";

pub const MINIFIGS_CSV: &str = "\
fig_num,name,num_parts,img_url
fig-000001,Toy Store Employee,4,
fig-000002,Customer Kid,4,
fig-000003,\"Knight, Lion Crest\",5,
";

pub const INVENTORIES_CSV: &str = "\
id,version,set_num
1,1,8880-1
2,1,10305-1
3,1,6285-1
";

pub const INVENTORY_MINIFIGS_CSV: &str = "\
inventory_id,fig_num,quantity
2,fig-000001,1
2,fig-000003,3
3,fig-000002,1
";

pub const INVENTORY_SETS_CSV: &str = "\
inventory_id,set_num,quantity
1,42083-1,1
3,10320-1,2
";

/// Every fixture table as (table, CSV)
pub fn fixture_tables() -> Vec<(&'static str, &'static str)> {
    vec![
        ("sets", SETS_CSV),
        ("inventory_sets", INVENTORY_SETS_CSV),
        ("inventory_minifigs", INVENTORY_MINIFIGS_CSV),
        ("minifigs", MINIFIGS_CSV),
        ("themes", THEMES_CSV),
        ("inventories", INVENTORIES_CSV),
    ]
}

/// Listing page in the downloads-page layout, one row per file, linking to `base`
pub fn listing_page(base: &str, files: &[&str]) -> String {
    let rows: String = files
        .iter()
        .map(|gz| {
            let csv = gz.trim_end_matches(".gz");
            format!(
                r#"<div class="mb-10"><span class="mr-10">{csv}</span>
                   <a href="{base}/media/downloads/{csv}.zip?1700000000">zip</a>
                   <a href="{base}/media/downloads/{gz}?1700000000">gzip</a></div>
"#
            )
        })
        .collect();

    format!(
        "<html><head><title>Downloads</title></head><body><div class=\"container\">{}</div></body></html>",
        rows
    )
}

/// No unique constraints, so only the statements themselves prevent duplicates
const BASE_SCHEMA: &[&str] = &[
    "CREATE TABLE themes (id INTEGER NOT NULL, name TEXT NOT NULL, parent_id INTEGER)",
    "CREATE TABLE sets (set_num TEXT NOT NULL, name TEXT NOT NULL, year INTEGER, theme_id INTEGER, num_parts INTEGER, img_url TEXT)",
    "CREATE TABLE minifigs (fig_num TEXT NOT NULL, name TEXT NOT NULL, num_parts INTEGER, img_url TEXT)",
    "CREATE TABLE inventories (id INTEGER, version INTEGER, set_num TEXT)",
    "CREATE TABLE inventory_minifigs (inventory_id INTEGER, fig_num TEXT, quantity INTEGER)",
    "CREATE TABLE inventory_sets (inventory_id INTEGER, set_num TEXT, quantity INTEGER)",
    "CREATE TABLE collection (id INTEGER PRIMARY KEY, set_num TEXT NOT NULL)",
];

const SQLITE_SUMMARY_DDL: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS popular_themes (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        theme_id INTEGER NOT NULL,
        collection_count INTEGER NOT NULL,
        snapshot_date TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
    )",
    "CREATE TABLE IF NOT EXISTS recent_set_additions (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        set_num TEXT,
        theme_id INTEGER,
        added_date TIMESTAMP DEFAULT CURRENT_TIMESTAMP
    )",
];

/// Collection entries: Technic family 5, Castle 2, Town family 2, others 1
const COLLECTION: &[&str] = &[
    "42083-1", "42083-1", "42083-1", "42115-1", "6520-1", "10305-1", "6080-1", "6285-1",
    "6930-1", "10194-1", "60200-1", "70751-1",
];

/// In-memory SQLite store with the catalog schema
pub struct SqliteStore {
    pub conn: SqliteConnection,
}

impl SqliteStore {
    pub async fn new() -> Self {
        let mut conn = SqliteConnection::connect("sqlite::memory:").await.unwrap();
        for ddl in BASE_SCHEMA {
            sqlx::raw_sql(ddl).execute(&mut conn).await.unwrap();
        }
        for (idx, set_num) in COLLECTION.iter().enumerate() {
            sqlx::query("INSERT INTO collection (id, set_num) VALUES (?, ?)")
                .bind(idx as i64 + 1)
                .bind(*set_num)
                .execute(&mut conn)
                .await
                .unwrap();
        }
        SqliteStore { conn }
    }

    pub async fn count(&mut self, table: &str) -> i64 {
        let sql = format!("SELECT COUNT(*) FROM {}", table);
        sqlx::query_scalar(&sql)
            .fetch_one(&mut self.conn)
            .await
            .unwrap()
    }

    pub async fn table_counts(&mut self) -> Vec<(String, i64)> {
        let mut counts = Vec::new();
        for table in bricksync_ingest::tables::LOAD_ORDER {
            counts.push((table.to_string(), self.count(table).await));
        }
        counts
    }
}

#[async_trait(?Send)]
impl StatementExecutor for SqliteStore {
    async fn execute(&mut self, sql: &str) -> Result<u64, sqlx::Error> {
        let result = sqlx::raw_sql(sql).execute(&mut self.conn).await?;
        Ok(result.rows_affected())
    }

    fn summary_table_ddl(&self) -> &'static [&'static str] {
        SQLITE_SUMMARY_DDL
    }
}
