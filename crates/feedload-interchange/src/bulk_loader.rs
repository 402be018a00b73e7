//! Bulk loading of one feed file into one table
//!
//! A load runs inside its own transaction with foreign key checks deferred to
//! `COMMIT`, so the rows of a file may reference each other in any order. Rows
//! are streamed from the file and their inserts are kept in flight concurrently
//! against the single connection; the commit is only issued once every insert
//! has settled. One failing row fails the whole load.
//!
//! Loading is not idempotent: loading the same file twice inserts its rows
//! twice. Use [`BulkLoader::clear_feed`] first when a reload should replace the
//! previous rows.

use chrono::{DateTime, Utc};
use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use uuid::Uuid;

use feedload_core::{
    BatchExecutor, Connection, FeedloadError, Identifier, IdentifierPolicy, Params, Result, Value,
    execute_sql,
};

use crate::coercion::CoercionTracker;
use crate::config::{FailurePolicy, LoaderConfig};
use crate::insert::{FEED_MARKER, InsertTemplate};
use crate::reader::FeedReader;

/// Result of a load that did not fail
#[derive(Debug, Clone, PartialEq)]
pub enum LoadOutcome {
    /// The source file does not exist; nothing was executed
    SourceMissing { path: PathBuf },
    /// The file was loaded and committed
    Loaded(LoadSummary),
}

impl LoadOutcome {
    pub fn is_loaded(&self) -> bool {
        matches!(self, LoadOutcome::Loaded(_))
    }

    /// Rows committed by this load; zero when the source was missing
    pub fn rows_inserted(&self) -> u64 {
        match self {
            LoadOutcome::SourceMissing { .. } => 0,
            LoadOutcome::Loaded(summary) => summary.rows_inserted,
        }
    }

    pub fn summary(&self) -> Option<&LoadSummary> {
        match self {
            LoadOutcome::Loaded(summary) => Some(summary),
            LoadOutcome::SourceMissing { .. } => None,
        }
    }
}

/// What a committed load did
#[derive(Debug, Clone, PartialEq)]
pub struct LoadSummary {
    /// Id of this load, also attached to its log span
    pub run_id: Uuid,
    pub feed: String,
    pub table: String,
    pub path: PathBuf,
    pub rows_inserted: u64,
    /// Header columns in file order
    pub columns: Vec<String>,
    /// Columns whose fields coerced to numbers in some rows and strings in others
    pub mixed_type_columns: Vec<String>,
    pub started_at: DateTime<Utc>,
    pub elapsed_ms: u64,
}

/// Rows and columns produced by the insert phase
struct InsertPhase {
    rows_inserted: u64,
    columns: Vec<String>,
    mixed_type_columns: Vec<String>,
}

/// Loads feed files into tables of one connection
#[derive(Debug, Clone)]
pub struct BulkLoader {
    executor: BatchExecutor,
    failure_policy: FailurePolicy,
    identifier_policy: IdentifierPolicy,
    feed_column: String,
    delimiter: u8,
    io_timeout: Option<Duration>,
}

impl Default for BulkLoader {
    fn default() -> Self {
        Self::from_validated(&LoaderConfig::default())
    }
}

impl BulkLoader {
    /// Build a loader from `config`, rejecting it with
    /// [`FeedloadError::Configuration`] when [`LoaderConfig::validate`] fails
    pub fn new(config: &LoaderConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::from_validated(config))
    }

    fn from_validated(config: &LoaderConfig) -> Self {
        Self {
            executor: BatchExecutor::new(config.max_in_flight),
            failure_policy: config.failure_policy,
            identifier_policy: config.identifier_policy,
            feed_column: config.feed_column.clone(),
            delimiter: config.delimiter_byte(),
            io_timeout: config.io_timeout(),
        }
    }

    pub fn failure_policy(&self) -> FailurePolicy {
        self.failure_policy
    }

    /// Load `source_root/feed_id/file_name` into `target_table`.
    ///
    /// Every row is inserted with the feed column set to `feed_id`. A missing
    /// source file is not an error: it yields [`LoadOutcome::SourceMissing`] and
    /// no statement reaches the connection. Any other failure is returned after
    /// the configured [`FailurePolicy`] has been applied to the open transaction.
    #[tracing::instrument(
        skip(self, connection, source_root),
        fields(run_id = tracing::field::Empty)
    )]
    pub async fn load(
        &self,
        connection: &dyn Connection,
        source_root: &Path,
        feed_id: &str,
        file_name: &str,
        target_table: &str,
    ) -> Result<LoadOutcome> {
        let table = Identifier::parse(target_table, self.identifier_policy)?;
        let feed_column = Identifier::parse(&self.feed_column, self.identifier_policy)?;
        let path = source_root.join(feed_id).join(file_name);

        if !self.source_exists(&path).await? {
            tracing::info!(path = %path.display(), "source file absent, nothing to load");
            return Ok(LoadOutcome::SourceMissing { path });
        }

        let run_id = Uuid::new_v4();
        tracing::Span::current().record("run_id", tracing::field::display(run_id));
        let started_at = Utc::now();
        let timer = Instant::now();
        tracing::info!(path = %path.display(), "loading feed file");

        execute_sql(connection, "PRAGMA defer_foreign_keys = ON", Params::None).await?;
        execute_sql(connection, "BEGIN", Params::None).await?;

        let phase = match self
            .insert_and_commit(connection, &path, feed_id, &table, &feed_column)
            .await
        {
            Ok(phase) => phase,
            Err(e) => {
                tracing::error!(error = %e, path = %path.display(), "load failed");
                self.abandon(connection).await;
                return Err(e);
            }
        };

        let summary = LoadSummary {
            run_id,
            feed: feed_id.to_string(),
            table: target_table.to_string(),
            path,
            rows_inserted: phase.rows_inserted,
            columns: phase.columns,
            mixed_type_columns: phase.mixed_type_columns,
            started_at,
            elapsed_ms: timer.elapsed().as_millis() as u64,
        };

        tracing::info!(
            rows = summary.rows_inserted,
            elapsed_ms = summary.elapsed_ms,
            "feed file committed"
        );
        Ok(LoadOutcome::Loaded(summary))
    }

    /// Delete every row of `feed_id` from `target_table`, returning how many went
    pub async fn clear_feed(
        &self,
        connection: &dyn Connection,
        feed_id: &str,
        target_table: &str,
    ) -> Result<u64> {
        let table = Identifier::parse(target_table, self.identifier_policy)?;
        let feed_column = Identifier::parse(&self.feed_column, self.identifier_policy)?;
        let sql = format!(
            "DELETE FROM {} WHERE {} = {}",
            table.quoted(),
            feed_column.quoted(),
            FEED_MARKER
        );

        let result = execute_sql(
            connection,
            &sql,
            Params::Named(vec![(FEED_MARKER.to_string(), Value::from(feed_id))]),
        )
        .await?;

        tracing::info!(feed = feed_id, table = target_table, rows = result.affected_rows, "cleared feed rows");
        Ok(result.affected_rows)
    }

    /// `Ok(false)` when `path` does not exist
    async fn source_exists(&self, path: &Path) -> Result<bool> {
        let metadata = within_io_timeout(self.io_timeout, path, tokio::fs::metadata(path)).await?;

        match metadata {
            Ok(metadata) if metadata.is_file() => Ok(true),
            Ok(_) => Err(FeedloadError::Probe {
                path: path.to_path_buf(),
                source: std::io::Error::other("source is not a regular file"),
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(FeedloadError::Probe {
                path: path.to_path_buf(),
                source: e,
            }),
        }
    }

    async fn insert_and_commit(
        &self,
        connection: &dyn Connection,
        path: &Path,
        feed_id: &str,
        table: &Identifier,
        feed_column: &Identifier,
    ) -> Result<InsertPhase> {
        let reader = FeedReader::open(path, self.delimiter)?;
        let columns = reader.headers().to_vec();
        let template = InsertTemplate::new(table, feed_column, &columns, self.identifier_policy)?;
        let mut tracker = CoercionTracker::new(columns.len());

        let statements = reader.map(|row| {
            let row = row?;
            tracker.observe(row.values());
            Ok(template.statement(feed_id, row))
        });
        let report = self.executor.run_stream(connection, statements).await?;

        let mixed_type_columns: Vec<String> = tracker
            .mixed_columns()
            .into_iter()
            .filter_map(|idx| columns.get(idx).cloned())
            .collect();
        for column in &mixed_type_columns {
            tracing::debug!(column = %column, "column coerced to both numbers and strings");
        }

        execute_sql(connection, "COMMIT", Params::None).await?;

        Ok(InsertPhase {
            rows_inserted: report.affected_rows,
            columns,
            mixed_type_columns,
        })
    }

    async fn abandon(&self, connection: &dyn Connection) {
        match self.failure_policy {
            FailurePolicy::Rollback => {
                tracing::warn!("rolling back failed load");
                if let Err(e) = execute_sql(connection, "ROLLBACK", Params::None).await {
                    tracing::error!(error = %e, "rollback after failed load also failed");
                }
            }
            FailurePolicy::LeaveOpen => {
                tracing::warn!("leaving transaction of failed load open");
            }
        }
    }
}

/// Await `io`, giving up with [`FeedloadError::Timeout`] once `limit` has passed
async fn within_io_timeout<T>(
    limit: Option<Duration>,
    path: &Path,
    io: impl Future<Output = io::Result<T>>,
) -> Result<io::Result<T>> {
    let Some(limit) = limit else {
        return Ok(io.await);
    };
    tokio::time::timeout(limit, io).await.map_err(|_| {
        FeedloadError::Timeout(format!(
            "reading metadata of '{}' exceeded {} ms",
            path.display(),
            limit.as_millis()
        ))
    })
}
