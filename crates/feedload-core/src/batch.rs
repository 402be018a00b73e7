//! Batch execution of many statements against one connection
//!
//! All statements share the same connection. They are polled together from a
//! `FuturesUnordered` so no ordering between them is guaranteed; the store
//! serializes the physical writes. A batch only completes once every submitted
//! statement has settled, and then reports the first failure it observed.
//! Once a failure has been observed no further statements are submitted.
//! Statements that already ran are not undone here; wrap the batch in a
//! transaction if that is needed.

use futures::{FutureExt, StreamExt};
use futures::stream::FuturesUnordered;
use std::future::Future;

use crate::{Connection, FeedloadError, Result, Statement, StatementResult, execute};

/// Default number of statements kept in flight at once
pub const DEFAULT_MAX_IN_FLIGHT: usize = 64;

/// Counters for a settled batch
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    /// Statements handed to the connection
    pub submitted: usize,
    /// Statements that completed successfully
    pub succeeded: usize,
    /// Sum of rows affected by the successful statements
    pub affected_rows: u64,
}

/// Runs statements against a single connection with a bounded in-flight window
#[derive(Debug, Clone)]
pub struct BatchExecutor {
    max_in_flight: usize,
}

impl Default for BatchExecutor {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_IN_FLIGHT)
    }
}

impl BatchExecutor {
    /// Create an executor that keeps at most `max_in_flight` statements outstanding.
    /// Zero is treated as one.
    pub fn new(max_in_flight: usize) -> Self {
        Self {
            max_in_flight: max_in_flight.max(1),
        }
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight
    }

    /// Execute every statement and wait until all of them have settled.
    pub async fn run_all<I>(&self, connection: &dyn Connection, statements: I) -> Result<BatchReport>
    where
        I: IntoIterator<Item = Statement>,
    {
        self.run_stream(connection, statements.into_iter().map(Ok)).await
    }

    /// Execute statements produced lazily by `statements`.
    ///
    /// An `Err` from the source, or a failed statement, stops further pulling;
    /// statements already in flight are still awaited before the error is
    /// returned.
    #[tracing::instrument(skip_all, fields(max_in_flight = self.max_in_flight))]
    pub async fn run_stream<I>(&self, connection: &dyn Connection, statements: I) -> Result<BatchReport>
    where
        I: IntoIterator<Item = Result<Statement>>,
    {
        let mut in_flight = FuturesUnordered::new();
        let mut report = BatchReport::default();
        let mut first_error: Option<FeedloadError> = None;

        for item in statements {
            let statement = match item {
                Ok(statement) => statement,
                Err(e) => {
                    tracing::debug!(error = %e, "statement source failed, draining in-flight statements");
                    first_error.get_or_insert(e);
                    break;
                }
            };

            report.submitted += 1;
            in_flight.push(submit(connection, statement));

            // Settle whatever is already done without waiting
            while let Some(Some(result)) = in_flight.next().now_or_never() {
                settle(result, &mut report, &mut first_error);
            }

            if in_flight.len() >= self.max_in_flight
                && let Some(result) = in_flight.next().await
            {
                settle(result, &mut report, &mut first_error);
            }

            if let Some(e) = &first_error {
                tracing::debug!(error = %e, "statement failed, no further statements submitted");
                break;
            }
        }

        while let Some(result) = in_flight.next().await {
            settle(result, &mut report, &mut first_error);
        }

        tracing::debug!(
            submitted = report.submitted,
            succeeded = report.succeeded,
            affected_rows = report.affected_rows,
            "batch settled"
        );

        match first_error {
            Some(e) => Err(e),
            None => Ok(report),
        }
    }
}

fn submit<'a>(
    connection: &'a dyn Connection,
    statement: Statement,
) -> impl Future<Output = Result<StatementResult>> + Send + 'a {
    async move { execute(connection, &statement).await }
}

fn settle(
    result: Result<StatementResult>,
    report: &mut BatchReport,
    first_error: &mut Option<FeedloadError>,
) {
    match result {
        Ok(outcome) => {
            report.succeeded += 1;
            report.affected_rows += outcome.affected_rows;
        }
        Err(e) => {
            if first_error.is_none() {
                *first_error = Some(e);
            }
        }
    }
}
