//! Feedload Interchange - Loading delimited feed files into SQLite
//!
//! - `BulkLoader` - Loads one feed file into one table inside a transaction
//! - `FeedDirectoryLoader` - Loads every table file of every feed under a root
//! - `LoaderConfig` - TOML configuration for both
//! - `coerce_field` - Per-field conversion of raw text into values
//! - `logging` - Subscriber setup for processes running loads

mod bulk_loader;
mod coercion;
mod config;
mod feed_directory;
mod insert;
pub mod logging;
mod reader;

pub use bulk_loader::{BulkLoader, LoadOutcome, LoadSummary};
pub use coercion::{CoercionTracker, coerce_field};
pub use config::{FailurePolicy, GTFS_TABLE_ORDER, LoaderConfig};
pub use feed_directory::{FeedDirectoryLoader, FeedReport};
pub use insert::{FEED_MARKER, InsertTemplate};
pub use reader::{FeedReader, FeedRow};
