//! Loader configuration
//!
//! Loaded from TOML. Every field has a default, so an empty document is a valid
//! configuration:
//!
//! ```toml
//! max_in_flight = 64
//! failure_policy = "rollback"
//! identifier_policy = "quoted"
//! feed_column = "feed"
//! delimiter = ","
//! io_timeout_ms = 5000
//! file_extension = "txt"
//! skip_tables = ["shapes"]
//!
//! [sqlite]
//! journal_mode = "memory"
//! synchronous = "off"
//! statement_timeout_ms = 30000
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use feedload_core::{
    DEFAULT_MAX_IN_FLIGHT, FeedloadError, Identifier, IdentifierPolicy, Result,
};
use feedload_driver_sqlite::{SqliteConnection, SqliteOptions};

/// Tables of a GTFS feed, parents before the tables that reference them
pub const GTFS_TABLE_ORDER: &[&str] = &[
    "feed_info",
    "agency",
    "levels",
    "stops",
    "routes",
    "trips",
    "location_groups",
    "stop_times",
    "calendar",
    "calendar_dates",
    "areas",
    "stop_areas",
    "networks",
    "route_networks",
    "shapes",
    "frequencies",
    "pathways",
];

/// What the loader does with the open transaction after a load fails
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Issue `ROLLBACK`; nothing from the failed load stays visible
    #[default]
    Rollback,
    /// Leave the transaction open for the caller to resolve
    LeaveOpen,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoaderConfig {
    /// Insert statements kept in flight per load
    pub max_in_flight: usize,
    pub failure_policy: FailurePolicy,
    pub identifier_policy: IdentifierPolicy,
    /// Column that receives the feed id in every target table
    pub feed_column: String,
    /// Field separator; must be a single ASCII character
    pub delimiter: char,
    /// Upper bound on probing a source file
    pub io_timeout_ms: Option<u64>,
    /// Extension of feed files, without the dot
    pub file_extension: String,
    /// Load order of known tables within a feed directory
    pub table_order: Vec<String>,
    /// Tables never loaded
    pub skip_tables: Vec<String>,
    /// Options for the SQLite store the loader writes to
    pub sqlite: SqliteOptions,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            max_in_flight: DEFAULT_MAX_IN_FLIGHT,
            failure_policy: FailurePolicy::default(),
            identifier_policy: IdentifierPolicy::default(),
            feed_column: "feed".to_string(),
            delimiter: ',',
            io_timeout_ms: None,
            file_extension: "txt".to_string(),
            table_order: GTFS_TABLE_ORDER.iter().map(|t| t.to_string()).collect(),
            skip_tables: Vec::new(),
            sqlite: SqliteOptions::bulk_load(),
        }
    }
}

impl LoaderConfig {
    /// Parse and validate a TOML document
    pub fn from_toml_str(toml_str: &str) -> Result<Self> {
        let config: LoaderConfig = toml::from_str(toml_str)
            .map_err(|e| FeedloadError::Configuration(e.message().to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Read and validate a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            FeedloadError::Configuration(format!(
                "Failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        tracing::debug!(path = %path.display(), "loaded loader configuration");
        Self::from_toml_str(&contents)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_in_flight == 0 {
            return Err(FeedloadError::Configuration(
                "max_in_flight must be at least 1".into(),
            ));
        }
        if !self.delimiter.is_ascii() || matches!(self.delimiter, '"' | '\n' | '\r') {
            return Err(FeedloadError::Configuration(format!(
                "delimiter {:?} is not usable; pick a single ASCII character other than a quote or line break",
                self.delimiter
            )));
        }
        if self.file_extension.is_empty() || self.file_extension.starts_with('.') {
            return Err(FeedloadError::Configuration(
                "file_extension must be non-empty and given without the leading dot".into(),
            ));
        }
        Identifier::parse(&self.feed_column, self.identifier_policy).map_err(|e| {
            FeedloadError::Configuration(format!("feed_column is not a valid identifier: {e}"))
        })?;
        Ok(())
    }

    /// The delimiter as the byte the CSV reader expects
    pub fn delimiter_byte(&self) -> u8 {
        // Loaders only accept validated configs, so the fallback is unreachable there
        u8::try_from(self.delimiter).unwrap_or(b',')
    }

    pub fn io_timeout(&self) -> Option<Duration> {
        self.io_timeout_ms.map(Duration::from_millis)
    }

    /// Open the store loads write to, with the `[sqlite]` options applied
    pub fn open_store(&self, path: &str) -> Result<SqliteConnection> {
        SqliteConnection::open_with_options(path, &self.sqlite)
    }

    /// Whether files for `table` are loaded at all
    pub fn is_skipped(&self, table: &str) -> bool {
        self.skip_tables.iter().any(|t| t == table)
    }
}
