//! Statement executor
//!
//! The single entry point every higher layer uses to run one statement. It adds
//! validation and tracing around `Connection::execute` and otherwise passes the
//! store's result or diagnostic through untouched.

use crate::{Connection, FeedloadError, Result, Statement, StatementResult};

/// Run one parameterized statement against an open connection.
///
/// Errors are propagated verbatim; nothing is retried.
#[tracing::instrument(skip_all, fields(sql_preview = %statement.preview(), params = statement.params().len()))]
pub async fn execute(connection: &dyn Connection, statement: &Statement) -> Result<StatementResult> {
    if statement.sql().trim().is_empty() {
        return Err(FeedloadError::Statement("empty SQL statement".into()));
    }

    match connection.execute(statement.sql(), statement.params()).await {
        Ok(result) => {
            tracing::trace!(
                affected_rows = result.affected_rows,
                last_insert_rowid = ?result.last_insert_rowid,
                "statement executed"
            );
            Ok(result)
        }
        Err(e) => {
            tracing::debug!(error = %e, "statement failed");
            Err(e)
        }
    }
}

/// Run a statement given as SQL text and parameters
pub async fn execute_sql(
    connection: &dyn Connection,
    sql: &str,
    params: crate::Params,
) -> Result<StatementResult> {
    execute(connection, &Statement::new(sql, params)).await
}
