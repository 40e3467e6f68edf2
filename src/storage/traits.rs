//! Store traits and error types
//!
//! These traits are the external-collaborator boundary of the crate. Errors
//! from a backend propagate unchanged to the caller; no retries happen here.

use crate::storage::{ClaimedTask, CrawlRunRecord, EventLevel, EventRecord, JobRecord, QueueStatus};
use crate::task::TaskContext;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;

/// Errors that can occur during store operations
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Shared handle to a job store backend
pub type SharedJobStore = Arc<dyn JobStore>;

/// Shared handle to a crawl-state store backend
pub type SharedCrawlStore = Arc<dyn CrawlStore>;

/// The shared task queue, namespaced per crawler
///
/// Implementations must be safe to call from many processes or threads at
/// once; this crate performs no locking above the store.
pub trait JobStore: Send + Sync {
    /// Enqueues one task for a stage of the given crawler
    ///
    /// `delay` defers visibility of the task to claimers by that many seconds;
    /// it is an advisory queue policy, not enforced elsewhere.
    fn enqueue(
        &self,
        crawler: &str,
        stage: &str,
        context: &TaskContext,
        payload: &Value,
        delay: u64,
    ) -> StoreResult<()>;

    /// Claims the next available task addressed to any of `stages`
    ///
    /// Returns `None` when no task is currently available. A claimed task is
    /// invisible to other claimers until completed or cancelled.
    fn claim(&self, stages: &[String]) -> StoreResult<Option<ClaimedTask>>;

    /// Marks a claimed task as done
    fn complete(&self, task_id: i64) -> StoreResult<()>;

    /// Lists per-run queue summaries for one crawler
    fn list_jobs(&self, crawler: &str) -> StoreResult<Vec<JobRecord>>;

    /// Removes all queued and claimed tasks in a crawler's namespace
    fn cancel_all(&self, crawler: &str) -> StoreResult<()>;

    /// Aggregate queue counts for one crawler
    fn status(&self, crawler: &str) -> StoreResult<QueueStatus>;
}

/// Run timestamps, operation counters, event log, and tag side-data
pub trait CrawlStore: Send + Sync {
    /// Accounts one executed operation against a run
    ///
    /// Creates the run record (with a start timestamp) on first call for a
    /// given `run_id`, then increments its operation counter.
    fn record_operation(&self, crawler: &str, run_id: &str) -> StoreResult<()>;

    /// Timestamp of the most recent run, or `None` if the crawler never ran
    fn last_run(&self, crawler: &str) -> StoreResult<Option<DateTime<Utc>>>;

    /// Total operations performed across all runs of a crawler
    fn op_count(&self, crawler: &str) -> StoreResult<u64>;

    /// All recorded runs of a crawler, most recent first
    fn runs(&self, crawler: &str) -> StoreResult<Vec<CrawlRunRecord>>;

    /// Identifier of the most recent run, if any
    fn latest_run_id(&self, crawler: &str) -> StoreResult<Option<String>>;

    /// Marks every run of a crawler as aborted
    fn abort_all(&self, crawler: &str) -> StoreResult<()>;

    /// Appends one entry to a crawler's event log
    fn append_event(
        &self,
        crawler: &str,
        run_id: &str,
        stage: &str,
        level: EventLevel,
        message: &str,
    ) -> StoreResult<()>;

    /// All logged events for a crawler, oldest first
    fn events(&self, crawler: &str) -> StoreResult<Vec<EventRecord>>;

    /// Deletes all event-log entries for a crawler
    fn delete_events(&self, crawler: &str) -> StoreResult<()>;

    /// Deletes all run records for a crawler
    fn flush(&self, crawler: &str) -> StoreResult<()>;

    /// Records a tag in a crawler's side-data namespace
    fn set_tag(&self, crawler: &str, key: &str) -> StoreResult<()>;

    /// Whether a tag exists for the crawler
    fn has_tag(&self, crawler: &str, key: &str) -> StoreResult<bool>;

    /// Deletes all tags for a crawler
    fn delete_tags(&self, crawler: &str) -> StoreResult<()>;
}
