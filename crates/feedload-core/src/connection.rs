//! Connection trait

use crate::{Params, QueryResult, Result, StatementResult};
use async_trait::async_trait;

/// An open handle to one relational store.
///
/// A value implementing this trait only exists once the store is usable, so there
/// is no separate "ready" state to wait for. After `close` has started, every call
/// to `execute` or `query` fails with `FeedloadError::Closed`.
#[async_trait]
pub trait Connection: Send + Sync {
    /// Get the driver name (e.g., "sqlite")
    fn driver_name(&self) -> &str;

    /// Execute a statement that does not return rows (INSERT/UPDATE/DELETE/DDL/PRAGMA)
    async fn execute(&self, sql: &str, params: &Params) -> Result<StatementResult>;

    /// Execute a query that returns rows (SELECT)
    async fn query(&self, sql: &str, params: &Params) -> Result<QueryResult>;

    /// Close the connection
    async fn close(&self) -> Result<()>;

    /// Check if the connection is closed
    fn is_closed(&self) -> bool;
}
