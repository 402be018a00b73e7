//! In-memory connections used by the unit tests of this crate

use async_trait::async_trait;
use std::future::Future;
use std::pin::Pin;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::task::{Context, Poll};

use crate::{Connection, FeedloadError, Params, QueryResult, Result, StatementResult};

/// Records every executed SQL string; fails statements containing a configured needle.
pub(crate) struct RecordingConnection {
    executed: Mutex<Vec<String>>,
    fail_on: Option<&'static str>,
    closed: AtomicBool,
}

impl RecordingConnection {
    pub(crate) fn new() -> Self {
        Self {
            executed: Mutex::new(Vec::new()),
            fail_on: None,
            closed: AtomicBool::new(false),
        }
    }

    pub(crate) fn failing_on(mut self, needle: &'static str) -> Self {
        self.fail_on = Some(needle);
        self
    }

    pub(crate) fn executed(&self) -> Vec<String> {
        self.executed.lock().unwrap().clone()
    }
}

#[async_trait]
impl Connection for RecordingConnection {
    fn driver_name(&self) -> &str {
        "recording"
    }

    async fn execute(&self, sql: &str, _params: &Params) -> Result<StatementResult> {
        if self.is_closed() {
            return Err(FeedloadError::Closed);
        }
        self.executed.lock().unwrap().push(sql.to_string());
        if let Some(needle) = self.fail_on
            && sql.contains(needle)
        {
            return Err(FeedloadError::Statement(format!(
                "UNIQUE constraint failed: t.{needle}"
            )));
        }
        Ok(StatementResult {
            affected_rows: 1,
            last_insert_rowid: None,
        })
    }

    async fn query(&self, _sql: &str, _params: &Params) -> Result<QueryResult> {
        Ok(QueryResult::empty())
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// Statements take several polls to finish; the failing one finishes sooner than the rest.
pub(crate) struct SlowConnection {
    fail_on: &'static str,
    started: AtomicUsize,
    completed: AtomicUsize,
}

impl SlowConnection {
    pub(crate) fn failing_on(needle: &'static str) -> Self {
        Self {
            fail_on: needle,
            started: AtomicUsize::new(0),
            completed: AtomicUsize::new(0),
        }
    }

    pub(crate) fn started(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }

    pub(crate) fn completed(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }
}

/// Pending for the given number of polls, waking itself each time
struct PendingFor(usize);

impl Future for PendingFor {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        if self.0 == 0 {
            return Poll::Ready(());
        }
        self.0 -= 1;
        cx.waker().wake_by_ref();
        Poll::Pending
    }
}

#[async_trait]
impl Connection for SlowConnection {
    fn driver_name(&self) -> &str {
        "slow"
    }

    async fn execute(&self, sql: &str, _params: &Params) -> Result<StatementResult> {
        self.started.fetch_add(1, Ordering::SeqCst);
        let fails = sql.contains(self.fail_on);
        PendingFor(if fails { 1 } else { 3 }).await;

        if fails {
            return Err(FeedloadError::Statement("constraint failed".into()));
        }
        self.completed.fetch_add(1, Ordering::SeqCst);
        Ok(StatementResult {
            affected_rows: 1,
            last_insert_rowid: None,
        })
    }

    async fn query(&self, _sql: &str, _params: &Params) -> Result<QueryResult> {
        Ok(QueryResult::empty())
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }

    fn is_closed(&self) -> bool {
        false
    }
}
