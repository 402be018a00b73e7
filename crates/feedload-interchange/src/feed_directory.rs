//! Loading whole feed directories
//!
//! A feeds root holds one directory per feed, each containing one file per
//! table (`<feeds_root>/<feed>/<table>.<ext>`). Tables listed in the configured
//! order are loaded first, in that order, so parents precede the tables that
//! reference them; any other table files follow alphabetically. Every table is
//! loaded in its own transaction.

use std::path::{Path, PathBuf};

use feedload_core::{Connection, FeedloadError, Result};

use crate::bulk_loader::{BulkLoader, LoadOutcome};
use crate::config::LoaderConfig;

/// Outcomes of every table loaded for one feed
#[derive(Debug, Clone, PartialEq)]
pub struct FeedReport {
    pub feed: String,
    /// (table, outcome) in load order
    pub outcomes: Vec<(String, LoadOutcome)>,
}

impl FeedReport {
    pub fn rows_inserted(&self) -> u64 {
        self.outcomes.iter().map(|(_, o)| o.rows_inserted()).sum()
    }

    pub fn outcome(&self, table: &str) -> Option<&LoadOutcome> {
        self.outcomes
            .iter()
            .find(|(t, _)| t == table)
            .map(|(_, outcome)| outcome)
    }
}

pub struct FeedDirectoryLoader {
    loader: BulkLoader,
    config: LoaderConfig,
}

impl FeedDirectoryLoader {
    /// Fails with [`FeedloadError::Configuration`] when `config` does not validate
    pub fn new(config: LoaderConfig) -> Result<Self> {
        Ok(Self {
            loader: BulkLoader::new(&config)?,
            config,
        })
    }

    pub fn loader(&self) -> &BulkLoader {
        &self.loader
    }

    /// Load every feed directory under `feeds_root`, sorted by name.
    ///
    /// Stops at the first failing table; feeds loaded before it stay committed.
    #[tracing::instrument(skip(self, connection))]
    pub async fn load_all(
        &self,
        connection: &dyn Connection,
        feeds_root: &Path,
    ) -> Result<Vec<FeedReport>> {
        let feeds = self.feed_ids(feeds_root).await?;
        tracing::info!(feeds = feeds.len(), "loading feeds");

        let mut reports = Vec::with_capacity(feeds.len());
        for feed in feeds {
            reports.push(self.load_feed(connection, feeds_root, &feed).await?);
        }
        Ok(reports)
    }

    /// Load the tables of one feed directory in dependency order
    #[tracing::instrument(skip(self, connection, feeds_root))]
    pub async fn load_feed(
        &self,
        connection: &dyn Connection,
        feeds_root: &Path,
        feed_id: &str,
    ) -> Result<FeedReport> {
        let tables = self.table_files(&feeds_root.join(feed_id)).await?;

        let mut outcomes = Vec::with_capacity(tables.len());
        for (table, file_name) in tables {
            let outcome = self
                .loader
                .load(connection, feeds_root, feed_id, &file_name, &table)
                .await?;
            outcomes.push((table, outcome));
        }

        let report = FeedReport {
            feed: feed_id.to_string(),
            outcomes,
        };
        tracing::info!(tables = report.outcomes.len(), rows = report.rows_inserted(), "feed loaded");
        Ok(report)
    }

    async fn feed_ids(&self, feeds_root: &Path) -> Result<Vec<String>> {
        let mut feeds = Vec::new();
        for (name, path) in read_dir(feeds_root).await? {
            let metadata = tokio::fs::metadata(&path).await.map_err(|e| probe_error(&path, e))?;
            if metadata.is_dir() {
                feeds.push(name);
            }
        }
        feeds.sort();
        Ok(feeds)
    }

    /// (table, file name) pairs of one feed directory in load order
    async fn table_files(&self, feed_dir: &Path) -> Result<Vec<(String, String)>> {
        let suffix = format!(".{}", self.config.file_extension);

        let mut present = Vec::new();
        for (name, path) in read_dir(feed_dir).await? {
            let Some(table) = name.strip_suffix(&suffix) else {
                continue;
            };
            if table.is_empty() || self.config.is_skipped(table) {
                continue;
            }
            let metadata = tokio::fs::metadata(&path).await.map_err(|e| probe_error(&path, e))?;
            if metadata.is_file() {
                present.push((table.to_string(), name.clone()));
            }
        }

        let order = &self.config.table_order;
        present.sort_by(|(a, _), (b, _)| {
            let rank = |t: &String| order.iter().position(|o| o == t).unwrap_or(order.len());
            rank(a).cmp(&rank(b)).then_with(|| a.cmp(b))
        });

        tracing::debug!(
            feed_dir = %feed_dir.display(),
            tables = ?present.iter().map(|(t, _)| t.as_str()).collect::<Vec<_>>(),
            "resolved table files"
        );
        Ok(present)
    }
}

/// Entries of `dir` with UTF-8 names
async fn read_dir(dir: &Path) -> Result<Vec<(String, PathBuf)>> {
    let mut entries = tokio::fs::read_dir(dir).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            FeedloadError::NotFound(format!("directory '{}'", dir.display()))
        } else {
            probe_error(dir, e)
        }
    })?;

    let mut found = Vec::new();
    while let Some(entry) = entries.next_entry().await.map_err(|e| probe_error(dir, e))? {
        match entry.file_name().into_string() {
            Ok(name) => found.push((name, entry.path())),
            Err(name) => {
                tracing::warn!(name = ?name, dir = %dir.display(), "skipping entry with non UTF-8 name")
            }
        }
    }
    Ok(found)
}

fn probe_error(path: &Path, source: std::io::Error) -> FeedloadError {
    FeedloadError::Probe {
        path: path.to_path_buf(),
        source,
    }
}
