//! SQLite connection provider

mod connection;
mod options;

pub use connection::{DatabaseFileInfo, SqliteConnection};
pub use options::{JournalMode, SqliteOptions, SynchronousMode};
