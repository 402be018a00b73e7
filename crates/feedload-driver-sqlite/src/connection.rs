//! SQLite connection implementation

use async_trait::async_trait;
use parking_lot::Mutex;
use rusqlite::{Connection as RusqliteConnection, DatabaseName, OpenFlags};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use feedload_core::{
    Connection, FeedloadError, Params, QueryResult, Result, Row, StatementResult, Value,
};

use crate::SqliteOptions;

/// SQLite connection wrapper.
///
/// The rusqlite handle sits behind a mutex so the connection can be shared by many
/// in-flight statement futures; SQLite itself serializes the writes. Closing takes the
/// handle out of the mutex, after which every call fails with `FeedloadError::Closed`.
pub struct SqliteConnection {
    conn: Arc<Mutex<Option<RusqliteConnection>>>,
    closed: AtomicBool,
    path: String,
    deadline: Option<StatementDeadline>,
}

/// Interrupts a statement once it runs past its deadline.
///
/// The deadline is stored as nanoseconds since `epoch` (0 meaning disarmed) so the
/// progress handler closure only has to capture plain atomics.
struct StatementDeadline {
    timeout: Duration,
    epoch: Instant,
    deadline_nanos: Arc<AtomicU64>,
}

impl StatementDeadline {
    fn install(conn: &RusqliteConnection, timeout: Duration) -> Self {
        let epoch = Instant::now();
        let deadline_nanos = Arc::new(AtomicU64::new(0));

        let armed = Arc::clone(&deadline_nanos);
        conn.progress_handler(
            1_000,
            Some(move || {
                let deadline = armed.load(Ordering::Relaxed);
                deadline != 0 && epoch.elapsed().as_nanos() as u64 >= deadline
            }),
        );

        Self {
            timeout,
            epoch,
            deadline_nanos,
        }
    }

    fn arm(&self) -> DeadlineGuard<'_> {
        let deadline = (self.epoch.elapsed() + self.timeout).as_nanos() as u64;
        self.deadline_nanos.store(deadline.max(1), Ordering::Relaxed);
        DeadlineGuard { deadline: self }
    }
}

struct DeadlineGuard<'a> {
    deadline: &'a StatementDeadline,
}

impl Drop for DeadlineGuard<'_> {
    fn drop(&mut self) {
        self.deadline.deadline_nanos.store(0, Ordering::Relaxed);
    }
}

impl SqliteConnection {
    /// Open a SQLite database with default options
    pub fn open(path: &str) -> Result<Self> {
        Self::open_with_options(path, &SqliteOptions::default())
    }

    /// Open a SQLite database.
    ///
    /// Returns only once the store is usable. Foreign key enforcement is switched on
    /// as part of opening; if SQLite does not report it as enabled afterwards the
    /// open fails.
    pub fn open_with_options(path: &str, options: &SqliteOptions) -> Result<Self> {
        tracing::info!(path = %path, "opening SQLite database");
        let expanded_path = Self::expand_path(path)?;

        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_URI
            | OpenFlags::SQLITE_OPEN_NO_MUTEX;

        let conn = if path == ":memory:" {
            RusqliteConnection::open_in_memory().map_err(|e| {
                FeedloadError::Connection(format!("Failed to open in-memory database: {}", e))
            })?
        } else {
            if !expanded_path.starts_with("file:") {
                let file_path = Path::new(&expanded_path);
                if let Some(parent) = file_path.parent()
                    && !parent.as_os_str().is_empty()
                    && !parent.exists()
                {
                    return Err(FeedloadError::Connection(format!(
                        "Parent directory does not exist: {}",
                        parent.display()
                    )));
                }
            }

            RusqliteConnection::open_with_flags(&expanded_path, flags).map_err(|e| {
                FeedloadError::Connection(format!(
                    "Failed to open SQLite database at '{}': {}",
                    expanded_path, e
                ))
            })?
        };

        conn.pragma_update(None, "foreign_keys", "ON").map_err(|e| {
            FeedloadError::Connection(format!("Failed to enable foreign keys: {}", e))
        })?;
        let foreign_keys: i64 = conn
            .query_row("PRAGMA foreign_keys", [], |row| row.get(0))
            .map_err(|e| {
                FeedloadError::Connection(format!("Failed to read foreign key state: {}", e))
            })?;
        if foreign_keys != 1 {
            return Err(FeedloadError::Connection(
                "SQLite build does not support foreign key enforcement".into(),
            ));
        }

        if let Some(mode) = options.journal_mode {
            conn.pragma_update(None, "journal_mode", mode.as_pragma())
                .map_err(|e| {
                    FeedloadError::Connection(format!("Failed to set journal mode: {}", e))
                })?;
        }

        if let Some(mode) = options.synchronous {
            conn.pragma_update(None, "synchronous", mode.as_pragma())
                .map_err(|e| {
                    FeedloadError::Connection(format!("Failed to set synchronous mode: {}", e))
                })?;
        }

        if let Some(timeout) = options.busy_timeout() {
            conn.busy_timeout(timeout).map_err(|e| {
                FeedloadError::Connection(format!("Failed to set busy timeout: {}", e))
            })?;
        }

        let deadline = options
            .statement_timeout()
            .map(|timeout| StatementDeadline::install(&conn, timeout));

        tracing::info!(path = %expanded_path, "SQLite database connection established");
        Ok(Self {
            conn: Arc::new(Mutex::new(Some(conn))),
            closed: AtomicBool::new(false),
            path: expanded_path,
            deadline,
        })
    }

    /// Open a private in-memory database
    pub fn open_in_memory() -> Result<Self> {
        Self::open_with_options(
            ":memory:",
            &SqliteOptions {
                journal_mode: None,
                synchronous: None,
                ..SqliteOptions::default()
            },
        )
    }

    /// Path the connection was opened with, after `~` and relative path expansion
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Expand path to handle ~ (home directory) and relative paths
    fn expand_path(path: &str) -> Result<String> {
        if path == ":memory:" || path.starts_with("file:") {
            return Ok(path.to_string());
        }

        let expanded = if let Some(rest) = path.strip_prefix("~/") {
            match std::env::var_os("HOME") {
                Some(home) => std::path::PathBuf::from(home)
                    .join(rest)
                    .to_string_lossy()
                    .to_string(),
                None => {
                    return Err(FeedloadError::Configuration(
                        "Unable to determine HOME directory".into(),
                    ));
                }
            }
        } else if path.starts_with('~') {
            return Err(FeedloadError::Configuration(
                "User-specific home directories (~user) are not supported".into(),
            ));
        } else {
            path.to_string()
        };

        let path_buf = std::path::PathBuf::from(&expanded);
        if path_buf.is_relative() {
            Ok(std::env::current_dir()?
                .join(path_buf)
                .to_string_lossy()
                .to_string())
        } else {
            Ok(expanded)
        }
    }

    fn with_conn<T>(&self, f: impl FnOnce(&RusqliteConnection) -> Result<T>) -> Result<T> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(FeedloadError::Closed);
        }
        let guard = self.conn.lock();
        let conn = guard.as_ref().ok_or(FeedloadError::Closed)?;
        f(conn)
    }

    fn statement_error(&self, e: rusqlite::Error) -> FeedloadError {
        if let rusqlite::Error::SqliteFailure(code, _) = &e
            && code.code == rusqlite::ErrorCode::OperationInterrupted
            && let Some(deadline) = &self.deadline
        {
            return FeedloadError::Timeout(format!(
                "statement exceeded {} ms",
                deadline.timeout.as_millis()
            ));
        }
        FeedloadError::Statement(e.to_string())
    }

    /// Get database file information
    pub fn get_info(&self) -> Result<DatabaseFileInfo> {
        self.with_conn(|conn| {
            let pragma_i64 = |name: &str| -> Result<i64> {
                conn.query_row(&format!("PRAGMA {}", name), [], |row| row.get(0))
                    .map_err(|e| FeedloadError::Statement(e.to_string()))
            };
            let pragma_text = |name: &str| -> Result<String> {
                conn.query_row(&format!("PRAGMA {}", name), [], |row| row.get(0))
                    .map_err(|e| FeedloadError::Statement(e.to_string()))
            };

            let page_count = pragma_i64("page_count")?;
            let page_size = pragma_i64("page_size")?;

            Ok(DatabaseFileInfo {
                file_size_bytes: page_count * page_size,
                page_count: page_count as usize,
                page_size: page_size as usize,
                encoding: pragma_text("encoding")?,
                journal_mode: pragma_text("journal_mode")?,
                foreign_keys_enabled: pragma_i64("foreign_keys")? != 0,
                defer_foreign_keys: pragma_i64("defer_foreign_keys")? != 0,
                in_transaction: !conn.is_autocommit(),
            })
        })
    }

    /// Execute a script of several statements, such as a schema definition
    pub async fn execute_batch(&self, sql: &str) -> Result<()> {
        tracing::debug!(bytes = sql.len(), "executing SQL batch");
        self.with_conn(|conn| {
            conn.execute_batch(sql)
                .map_err(|e| FeedloadError::Statement(e.to_string()))
        })
    }

    /// Write a copy of the main database to `destination` using the online backup API.
    ///
    /// An existing file at `destination` is replaced.
    #[tracing::instrument(skip(self), fields(destination = %destination.display()))]
    pub async fn backup_to(&self, destination: &Path) -> Result<()> {
        match std::fs::remove_file(destination) {
            Ok(()) => tracing::debug!("removed previous backup file"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        self.with_conn(|conn| {
            conn.backup(DatabaseName::Main, destination, None)
                .map_err(|e| FeedloadError::Statement(format!("Backup failed: {}", e)))
        })?;
        tracing::info!("database backup written");
        Ok(())
    }
}

/// Information about the SQLite database file
#[derive(Debug, Clone)]
pub struct DatabaseFileInfo {
    pub file_size_bytes: i64,
    pub page_count: usize,
    pub page_size: usize,
    pub encoding: String,
    pub journal_mode: String,
    pub foreign_keys_enabled: bool,
    pub defer_foreign_keys: bool,
    pub in_transaction: bool,
}

#[async_trait]
impl Connection for SqliteConnection {
    fn driver_name(&self) -> &str {
        "sqlite"
    }

    #[tracing::instrument(skip(self, sql, params), fields(sql_preview = %sql.chars().take(100).collect::<String>()))]
    async fn execute(&self, sql: &str, params: &Params) -> Result<StatementResult> {
        self.with_conn(|conn| {
            let _armed = self.deadline.as_ref().map(StatementDeadline::arm);

            let mut stmt = prepare_bound(conn, sql, params).map_err(|e| self.statement_error(e))?;
            let rows_affected = stmt.raw_execute().map_err(|e| self.statement_error(e))?;

            let last_insert_rowid = is_insert(sql).then(|| conn.last_insert_rowid());

            tracing::debug!(affected_rows = rows_affected, "statement executed");
            Ok(StatementResult {
                affected_rows: rows_affected as u64,
                last_insert_rowid,
            })
        })
    }

    #[tracing::instrument(skip(self, sql, params), fields(sql_preview = %sql.chars().take(100).collect::<String>()))]
    async fn query(&self, sql: &str, params: &Params) -> Result<QueryResult> {
        let start_time = Instant::now();

        self.with_conn(|conn| {
            let _armed = self.deadline.as_ref().map(StatementDeadline::arm);

            let mut stmt = prepare_bound(conn, sql, params).map_err(|e| self.statement_error(e))?;
            let columns: Vec<String> = stmt.column_names().iter().map(|c| c.to_string()).collect();

            let mut rows = Vec::new();
            let mut query_rows = stmt.raw_query();
            while let Some(row) = query_rows.next().map_err(|e| self.statement_error(e))? {
                let mut values = Vec::with_capacity(columns.len());
                for i in 0..columns.len() {
                    values.push(rusqlite_to_value(row, i)?);
                }
                rows.push(Row::new(columns.clone(), values));
            }

            let execution_time_ms = start_time.elapsed().as_millis() as u64;
            tracing::debug!(
                row_count = rows.len(),
                execution_time_ms = execution_time_ms,
                "query executed successfully"
            );
            Ok(QueryResult {
                columns,
                rows,
                execution_time_ms,
            })
        })
    }

    async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        tracing::info!(path = %self.path, "closing SQLite connection");

        let conn = self.conn.lock().take();
        if let Some(conn) = conn {
            conn.close().map_err(|(_, e)| {
                FeedloadError::Connection(format!("Failed to close SQLite connection: {}", e))
            })?;
        }
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// Prepare `sql` and bind `params` to it. The statement is prepared fresh on every call.
fn prepare_bound<'c>(
    conn: &'c RusqliteConnection,
    sql: &str,
    params: &Params,
) -> rusqlite::Result<rusqlite::Statement<'c>> {
    let mut stmt = conn.prepare(sql)?;

    match params {
        Params::None => {}
        Params::Positional(values) => {
            let expected = stmt.parameter_count();
            if values.len() != expected {
                return Err(rusqlite::Error::InvalidParameterCount(values.len(), expected));
            }
            for (idx, value) in values.iter().enumerate() {
                stmt.raw_bind_parameter(idx + 1, value_to_rusqlite(value))?;
            }
        }
        Params::Named(pairs) => {
            for (name, value) in pairs {
                let idx = stmt
                    .parameter_index(name)?
                    .ok_or_else(|| rusqlite::Error::InvalidParameterName(name.clone()))?;
                stmt.raw_bind_parameter(idx, value_to_rusqlite(value))?;
            }
        }
    }

    Ok(stmt)
}

fn is_insert(sql: &str) -> bool {
    let head = sql.trim_start();
    ["INSERT", "REPLACE"].iter().any(|keyword| {
        head.get(..keyword.len())
            .is_some_and(|prefix| prefix.eq_ignore_ascii_case(keyword))
    })
}

fn value_to_rusqlite(value: &Value) -> rusqlite::types::Value {
    match value {
        Value::Null => rusqlite::types::Value::Null,
        Value::Int64(i) => rusqlite::types::Value::Integer(*i),
        Value::Float64(f) => rusqlite::types::Value::Real(*f),
        Value::String(s) => rusqlite::types::Value::Text(s.clone()),
        Value::Bytes(b) => rusqlite::types::Value::Blob(b.clone()),
    }
}

/// Convert rusqlite row value to our Value type
fn rusqlite_to_value(row: &rusqlite::Row, idx: usize) -> Result<Value> {
    use rusqlite::types::ValueRef;

    let value_ref = row
        .get_ref(idx)
        .map_err(|e| FeedloadError::Statement(e.to_string()))?;

    let value = match value_ref {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::Int64(i),
        ValueRef::Real(f) => Value::Float64(f),
        ValueRef::Text(s) => Value::String(String::from_utf8_lossy(s).to_string()),
        ValueRef::Blob(b) => Value::Bytes(b.to_vec()),
    };

    Ok(value)
}
