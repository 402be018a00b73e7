//! Shared fixtures for the loader integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use std::path::Path;
use std::sync::{Mutex, Once};

use feedload_core::{Connection, Params, QueryResult, Result, StatementResult, Value};
use feedload_driver_sqlite::SqliteConnection;
use indoc::indoc;
use tempfile::TempDir;

pub const SCHEMA: &str = indoc! {r#"
    CREATE TABLE T (
        feed TEXT NOT NULL,
        a,
        b
    );
    CREATE TABLE agency (
        feed TEXT NOT NULL,
        agency_id TEXT NOT NULL,
        agency_name TEXT,
        PRIMARY KEY (feed, agency_id)
    );
    CREATE TABLE routes (
        feed TEXT NOT NULL,
        route_id TEXT NOT NULL,
        agency_id TEXT NOT NULL,
        route_short_name TEXT,
        PRIMARY KEY (feed, route_id),
        FOREIGN KEY (feed, agency_id) REFERENCES agency (feed, agency_id)
    );
    CREATE TABLE stops (
        feed TEXT NOT NULL,
        stop_id TEXT NOT NULL,
        stop_name TEXT,
        parent_station TEXT,
        PRIMARY KEY (feed, stop_id),
        FOREIGN KEY (feed, parent_station) REFERENCES stops (feed, stop_id)
    );
    CREATE TABLE odd (
        feed TEXT NOT NULL,
        "stop name" TEXT,
        "x""y" TEXT
    );
"#};

/// Initialize logging for tests if not already initialized
pub fn initialize_logging() {
    static INIT: Once = Once::new();

    INIT.call_once(|| {
        let subscriber = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::from_default_env()
                    .add_directive("feedload_interchange=debug".parse().unwrap()),
            )
            .with_test_writer()
            .finish();

        let _ = tracing::subscriber::set_global_default(subscriber);
    });
}

/// A SQLite connection that records every SQL string it is asked to run
pub struct CountingConnection {
    inner: SqliteConnection,
    executed: Mutex<Vec<String>>,
}

impl CountingConnection {
    pub fn new(inner: SqliteConnection) -> Self {
        Self {
            inner,
            executed: Mutex::new(Vec::new()),
        }
    }

    pub fn inner(&self) -> &SqliteConnection {
        &self.inner
    }

    pub fn executed(&self) -> Vec<String> {
        self.executed.lock().unwrap().clone()
    }

    pub fn clear_log(&self) {
        self.executed.lock().unwrap().clear();
    }
}

#[async_trait]
impl Connection for CountingConnection {
    fn driver_name(&self) -> &str {
        self.inner.driver_name()
    }

    async fn execute(&self, sql: &str, params: &Params) -> Result<StatementResult> {
        self.executed.lock().unwrap().push(sql.to_string());
        self.inner.execute(sql, params).await
    }

    async fn query(&self, sql: &str, params: &Params) -> Result<QueryResult> {
        self.executed.lock().unwrap().push(sql.to_string());
        self.inner.query(sql, params).await
    }

    async fn close(&self) -> Result<()> {
        self.inner.close().await
    }

    fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }
}

/// A feeds root and a database file with the test schema, both in one temp dir
pub struct Fixture {
    pub dir: TempDir,
    pub conn: CountingConnection,
}

impl Fixture {
    pub async fn new() -> Self {
        initialize_logging();

        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let db_path = dir.path().join("feeds.sqlite");
        let inner = SqliteConnection::open(db_path.to_str().unwrap())
            .expect("Failed to create test database");
        inner
            .execute_batch(SCHEMA)
            .await
            .expect("Failed to setup schema");
        std::fs::create_dir(dir.path().join("feeds")).unwrap();

        Self {
            dir,
            conn: CountingConnection::new(inner),
        }
    }

    pub fn feeds_root(&self) -> std::path::PathBuf {
        self.dir.path().join("feeds")
    }

    /// Write `<feeds_root>/<feed>/<file>`
    pub fn write_feed_file(&self, feed: &str, file: &str, contents: &str) {
        write_file(&self.feeds_root().join(feed), file, contents);
    }

    pub async fn count(&self, table: &str) -> i64 {
        count(&self.conn.inner, table).await
    }

    pub async fn rows(&self, sql: &str) -> Vec<Vec<Value>> {
        self.conn
            .inner
            .query(sql, &Params::None)
            .await
            .expect("query failed")
            .rows
            .into_iter()
            .map(|row| row.values)
            .collect()
    }

    pub fn in_transaction(&self) -> bool {
        self.conn.inner.get_info().unwrap().in_transaction
    }
}

pub fn write_file(dir: &Path, file: &str, contents: &str) {
    std::fs::create_dir_all(dir).unwrap();
    std::fs::write(dir.join(file), contents).unwrap();
}

pub async fn count(conn: &SqliteConnection, table: &str) -> i64 {
    conn.query(&format!("SELECT COUNT(*) FROM \"{table}\""), &Params::None)
        .await
        .expect("Failed to count rows")
        .scalar()
        .and_then(Value::as_i64)
        .expect("count is an integer")
}
