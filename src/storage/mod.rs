//! Store interfaces and backends for queue and crawl-run state
//!
//! Two capability sets back the crawlers, both namespaced by crawler name:
//! - [`JobStore`]: the shared task queue (enqueue, claim, cancel, status)
//! - [`CrawlStore`]: run timestamps, operation counters, the append-only
//!   event log, and tag side-data
//!
//! All crawler-visible runtime state (`is_running`, `last_run`, `pending`,
//! `op_count`) is re-derived from these stores on every query; staleness
//! between a read and the next write is accepted by design.

mod memory;
mod schema;
mod sqlite;
mod traits;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use traits::{CrawlStore, JobStore, SharedCrawlStore, SharedJobStore, StoreError, StoreResult};

use crate::task::TaskContext;
use serde_json::Value;

/// A task claimed from the queue for execution
#[derive(Debug, Clone)]
pub struct ClaimedTask {
    pub id: i64,
    pub crawler: String,
    pub stage: String,
    pub context: TaskContext,
    pub payload: Value,
}

/// Per-run queue summary for one crawler
#[derive(Debug, Clone)]
pub struct JobRecord {
    pub run_id: String,
    pub total: u64,
    pub pending: u64,
}

impl JobRecord {
    /// A job is done once none of its tasks remain pending or running
    pub fn is_done(&self) -> bool {
        self.pending == 0
    }
}

/// Aggregate queue counts for one crawler namespace
#[derive(Debug, Clone, Copy, Default)]
pub struct QueueStatus {
    pub pending: u64,
    pub running: u64,
    pub done: u64,
}

/// One crawl run as tracked by the crawl-state store
#[derive(Debug, Clone)]
pub struct CrawlRunRecord {
    pub run_id: String,
    pub started_at: String,
    pub operations: u64,
    pub aborted: bool,
}

/// Severity of a logged event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventLevel {
    Info,
    Warning,
    Error,
}

impl EventLevel {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "info" => Some(Self::Info),
            "warning" => Some(Self::Warning),
            "error" => Some(Self::Error),
            _ => None,
        }
    }
}

/// One entry of a crawler's append-only event log
#[derive(Debug, Clone)]
pub struct EventRecord {
    pub run_id: String,
    pub stage: String,
    pub level: EventLevel,
    pub message: String,
    pub at: String,
}
