//! Connection options applied when a SQLite store is opened

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// `PRAGMA journal_mode` values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JournalMode {
    Delete,
    Truncate,
    Persist,
    Memory,
    Wal,
    Off,
}

impl JournalMode {
    pub fn as_pragma(&self) -> &'static str {
        match self {
            JournalMode::Delete => "DELETE",
            JournalMode::Truncate => "TRUNCATE",
            JournalMode::Persist => "PERSIST",
            JournalMode::Memory => "MEMORY",
            JournalMode::Wal => "WAL",
            JournalMode::Off => "OFF",
        }
    }
}

/// `PRAGMA synchronous` values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SynchronousMode {
    Off,
    Normal,
    Full,
    Extra,
}

impl SynchronousMode {
    pub fn as_pragma(&self) -> &'static str {
        match self {
            SynchronousMode::Off => "OFF",
            SynchronousMode::Normal => "NORMAL",
            SynchronousMode::Full => "FULL",
            SynchronousMode::Extra => "EXTRA",
        }
    }
}

/// Options for `SqliteConnection::open_with_options`.
///
/// Foreign key enforcement is not optional: every connection enables it while opening.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SqliteOptions {
    /// Journal mode; `None` keeps SQLite's default
    pub journal_mode: Option<JournalMode>,
    /// Synchronous mode; `None` keeps SQLite's default
    pub synchronous: Option<SynchronousMode>,
    /// How long a statement waits on a locked database before failing
    pub busy_timeout_ms: Option<u64>,
    /// Upper bound on the run time of a single statement
    pub statement_timeout_ms: Option<u64>,
}

impl Default for SqliteOptions {
    fn default() -> Self {
        Self {
            journal_mode: Some(JournalMode::Wal),
            synchronous: Some(SynchronousMode::Normal),
            busy_timeout_ms: Some(5_000),
            statement_timeout_ms: None,
        }
    }
}

impl SqliteOptions {
    /// Settings for a one-shot bulk build: no journal on disk, no fsync.
    pub fn bulk_load() -> Self {
        Self {
            journal_mode: Some(JournalMode::Memory),
            synchronous: Some(SynchronousMode::Off),
            ..Self::default()
        }
    }

    pub fn statement_timeout(&self) -> Option<Duration> {
        self.statement_timeout_ms.map(Duration::from_millis)
    }

    pub fn busy_timeout(&self) -> Option<Duration> {
        self.busy_timeout_ms.map(Duration::from_millis)
    }
}
