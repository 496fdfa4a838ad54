//! Statement execution and summary refresh
//!
//! The loader replays the statement files produced by the current run in foreign-key order
//! over one connection. Each
//! statement runs on its own (the connection is in autocommit mode), so a failing statement
//! is logged and skipped while the rest of the file still applies. After the inserts, the two
//! summary tables are rebuilt from scratch.

use crate::config::DatabaseConfig;
use crate::error::{IngestError, Result};
use crate::statements::StatementFile;
use crate::tables::LOAD_ORDER;
use async_trait::async_trait;
use bricksync_common::DataDirs;
use sqlx::mysql::MySqlConnection;
use sqlx::ConnectOptions;
use tracing::{debug, error, info, warn};

/// Summary tables in MySQL syntax
pub const MYSQL_SUMMARY_DDL: &[&str] = &[
    r#"CREATE TABLE IF NOT EXISTS popular_themes (
    id int NOT NULL AUTO_INCREMENT,
    theme_id int NOT NULL,
    collection_count int NOT NULL,
    snapshot_date timestamp NOT NULL DEFAULT CURRENT_TIMESTAMP,
    PRIMARY KEY (id),
    KEY theme_id (theme_id),
    KEY snapshot_date (snapshot_date),
    CONSTRAINT popular_themes_ibfk_1 FOREIGN KEY (theme_id) REFERENCES themes (id)
)"#,
    r#"CREATE TABLE IF NOT EXISTS recent_set_additions (
    id int NOT NULL AUTO_INCREMENT,
    set_num varchar(20) DEFAULT NULL,
    theme_id int DEFAULT NULL,
    added_date timestamp NULL DEFAULT CURRENT_TIMESTAMP,
    PRIMARY KEY (id),
    KEY set_num (set_num),
    KEY theme_id (theme_id),
    CONSTRAINT recent_set_additions_ibfk_1 FOREIGN KEY (set_num) REFERENCES sets (set_num),
    CONSTRAINT recent_set_additions_ibfk_2 FOREIGN KEY (theme_id) REFERENCES themes (id)
)"#,
];

/// Top five themes (rolled up to their parent) by distinct collection entries
const POPULAR_THEMES_REFRESH: &[&str] = &[
    "DELETE FROM popular_themes",
    r#"INSERT INTO popular_themes (theme_id, collection_count)
SELECT
    COALESCE(parent.id, t.id) AS theme_id,
    COUNT(DISTINCT c.id) AS collection_count
FROM sets s
JOIN themes t ON t.id = s.theme_id
LEFT JOIN themes parent ON t.parent_id = parent.id
JOIN collection c ON c.set_num = s.set_num
GROUP BY COALESCE(parent.id, t.id)
ORDER BY collection_count DESC
LIMIT 5"#,
];

/// Up to five newest sets for each popular theme
const RECENT_SET_ADDITIONS_REFRESH: &[&str] = &[
    "DELETE FROM recent_set_additions",
    r#"INSERT INTO recent_set_additions (set_num, theme_id)
SELECT set_num, theme_id
FROM (
    SELECT
        s.set_num,
        COALESCE(parent.id, t.id) AS theme_id,
        ROW_NUMBER() OVER (
            PARTITION BY COALESCE(parent.id, t.id)
            ORDER BY s.year DESC, s.set_num DESC
        ) AS rn
    FROM sets s
    JOIN themes t ON t.id = s.theme_id
    LEFT JOIN themes parent ON t.parent_id = parent.id
    JOIN popular_themes pt ON COALESCE(parent.id, t.id) = pt.theme_id
    WHERE s.year IS NOT NULL
) ranked
WHERE rn <= 5"#,
];

/// Run once per connection before any statement file
///
/// Generated literals double quotes but leave backslashes alone.
pub const MYSQL_SESSION_SETUP: &[&str] = &[
    "SET SESSION sql_mode = CONCAT_WS(',', NULLIF(@@SESSION.sql_mode, ''), 'NO_BACKSLASH_ESCAPES')",
];

/// Summary tables rebuilt after every load, in refresh order
pub const SUMMARY_REFRESHES: &[(&str, &[&str])] = &[
    ("popular_themes", POPULAR_THEMES_REFRESH),
    ("recent_set_additions", RECENT_SET_ADDITIONS_REFRESH),
];

/// Something that can run one SQL statement and commit it
///
/// Futures are not required to be `Send`: a load runs start to finish on one task.
#[async_trait(?Send)]
pub trait StatementExecutor {
    /// Execute `sql`, returning the number of affected rows
    async fn execute(&mut self, sql: &str) -> std::result::Result<u64, sqlx::Error>;

    /// Statements creating the summary tables if absent
    fn summary_table_ddl(&self) -> &'static [&'static str] {
        MYSQL_SUMMARY_DDL
    }
}

#[async_trait(?Send)]
impl StatementExecutor for MySqlConnection {
    async fn execute(&mut self, sql: &str) -> std::result::Result<u64, sqlx::Error> {
        let result = sqlx::raw_sql(sql).execute(&mut *self).await?;
        Ok(result.rows_affected())
    }
}

#[async_trait(?Send)]
impl<T> StatementExecutor for &mut T
where
    T: StatementExecutor + ?Sized,
{
    async fn execute(&mut self, sql: &str) -> std::result::Result<u64, sqlx::Error> {
        (**self).execute(sql).await
    }

    fn summary_table_ddl(&self) -> &'static [&'static str] {
        (**self).summary_table_ddl()
    }
}

/// Open the single connection used for a load
pub async fn connect(config: &DatabaseConfig) -> Result<MySqlConnection> {
    info!(database = %config, "Connecting to database");
    let mut conn = config.connect_options().connect().await?;
    for statement in MYSQL_SESSION_SETUP {
        conn.execute(statement).await?;
    }
    Ok(conn)
}

/// Split a statement file on `;` terminators outside single-quoted literals
///
/// Blank fragments are dropped and every returned statement is trimmed.
pub fn split_statements(content: &str) -> Vec<&str> {
    let mut statements = Vec::new();
    let mut in_literal = false;
    let mut start = 0;

    for (idx, ch) in content.char_indices() {
        match ch {
            '\'' => in_literal = !in_literal,
            ';' if !in_literal => {
                statements.push(&content[start..idx]);
                start = idx + 1;
            },
            _ => {},
        }
    }
    statements.push(&content[start..]);

    statements
        .into_iter()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect()
}

/// Outcome of replaying one table's statement file
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableLoad {
    pub table: &'static str,
    /// Statements that ran successfully
    pub executed: usize,
    /// Statements that failed and were skipped
    pub failed: usize,
    /// Rows inserted, i.e. statements whose existence check passed
    pub inserted: u64,
}

/// Outcome of rebuilding one summary table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SummaryRefresh {
    pub table: &'static str,
    /// Rows written, or the error that stopped the rebuild
    pub result: std::result::Result<u64, String>,
}

/// What a load did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadReport {
    pub tables: Vec<TableLoad>,
    pub summaries: Vec<SummaryRefresh>,
}

impl LoadReport {
    pub fn executed_statements(&self) -> usize {
        self.tables.iter().map(|t| t.executed).sum()
    }

    pub fn failed_statements(&self) -> usize {
        self.tables.iter().map(|t| t.failed).sum()
    }

    pub fn inserted_rows(&self) -> u64 {
        self.tables.iter().map(|t| t.inserted).sum()
    }

    /// Every statement and every summary rebuild succeeded
    pub fn is_complete(&self) -> bool {
        self.failed_statements() == 0 && self.summaries.iter().all(|s| s.result.is_ok())
    }

    pub fn table(&self, table: &str) -> Option<&TableLoad> {
        self.tables.iter().find(|t| t.table == table)
    }
}

/// Replays statement files into the store
pub struct Loader {
    dirs: DataDirs,
}

impl Loader {
    pub fn new(dirs: DataDirs) -> Self {
        Self { dirs }
    }

    /// Statement files currently in the output directory, in load order
    ///
    /// For loading files generated by an earlier invocation; a full run hands
    /// [`load`](Self::load) exactly the files it generated instead.
    pub fn statement_files(&self) -> Result<Vec<StatementFile>> {
        let mut files = Vec::new();
        for table in LOAD_ORDER {
            let path = self.dirs.statement_file(table);
            if !path.exists() {
                continue;
            }
            let content = std::fs::read_to_string(&path)?;
            files.push(StatementFile {
                table,
                statements: split_statements(&content).len(),
                path,
            });
        }
        Ok(files)
    }

    /// Ensure the summary tables, replay `files` in load order, then rebuild the summaries
    ///
    /// Only the given files are replayed, whatever else sits in the output directory. Only a
    /// failure to create the summary tables or to read a statement file is returned as an
    /// error; statement and summary failures are logged and reported.
    pub async fn load<E>(&self, executor: &mut E, files: &[StatementFile]) -> Result<LoadReport>
    where
        E: StatementExecutor + ?Sized,
    {
        for ddl in executor.summary_table_ddl() {
            executor.execute(ddl).await?;
        }
        debug!("Summary tables ready");

        let mut report = LoadReport::default();

        for table in LOAD_ORDER {
            let Some(file) = files.iter().find(|f| f.table == table) else {
                debug!(table, "No statement file this run, skipping");
                continue;
            };

            info!(table, path = %file.path.display(), "Executing statement file");
            let content = tokio::fs::read_to_string(&file.path).await?;
            let table_load = execute_file(executor, table, &content).await;

            if table_load.failed > 0 {
                warn!(
                    table,
                    executed = table_load.executed,
                    failed = table_load.failed,
                    "Statement file applied with failures"
                );
            } else {
                info!(
                    table,
                    executed = table_load.executed,
                    inserted = table_load.inserted,
                    "Statement file applied"
                );
            }
            report.tables.push(table_load);
        }

        for &(table, statements) in SUMMARY_REFRESHES {
            report.summaries.push(refresh_summary(executor, table, statements).await);
        }

        Ok(report)
    }
}

async fn execute_file<E>(executor: &mut E, table: &'static str, content: &str) -> TableLoad
where
    E: StatementExecutor + ?Sized,
{
    let mut outcomes = Vec::new();
    for statement in split_statements(content) {
        let outcome = executor
            .execute(statement)
            .await
            .map_err(|e| IngestError::StatementExecution {
                table: table.to_string(),
                reason: e.to_string(),
            });
        outcomes.push(outcome);
    }

    let mut load = TableLoad {
        table,
        ..TableLoad::default()
    };
    for outcome in outcomes {
        match outcome {
            Ok(rows) => {
                load.executed += 1;
                load.inserted += rows;
            },
            Err(e) => {
                error!(error = %e, "Error executing SQL");
                load.failed += 1;
            },
        }
    }
    load
}

async fn refresh_summary<E>(executor: &mut E, table: &'static str, statements: &[&str]) -> SummaryRefresh
where
    E: StatementExecutor + ?Sized,
{
    info!(table, "Updating summary table");

    let mut rows = 0;
    for statement in statements {
        match executor.execute(statement).await {
            Ok(affected) => rows = affected,
            Err(e) => {
                error!(table, error = %e, "Error updating summary table");
                return SummaryRefresh {
                    table,
                    result: Err(e.to_string()),
                };
            },
        }
    }

    info!(table, rows, "Summary table rebuilt");
    SummaryRefresh {
        table,
        result: Ok(rows),
    }
}
