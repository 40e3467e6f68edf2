//! In-memory store backend
//!
//! Backs tests and the `file-run` command, where the run should leave no
//! state behind. Semantics mirror the SQLite backend.

use crate::storage::traits::{CrawlStore, JobStore, StoreError, StoreResult};
use crate::storage::{
    ClaimedTask, CrawlRunRecord, EventLevel, EventRecord, JobRecord, QueueStatus,
};
use crate::task::TaskContext;
use chrono::{DateTime, Duration, Utc};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TaskStatus {
    Pending,
    Running,
    Done,
}

#[derive(Debug, Clone)]
struct MemTask {
    id: i64,
    crawler: String,
    stage: String,
    context: TaskContext,
    payload: Value,
    status: TaskStatus,
    available_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
struct MemRun {
    run_id: String,
    started_at: DateTime<Utc>,
    operations: u64,
    aborted: bool,
}

#[derive(Default)]
struct Inner {
    next_id: i64,
    tasks: Vec<MemTask>,
    runs: HashMap<String, Vec<MemRun>>,
    events: HashMap<String, Vec<EventRecord>>,
    tags: HashMap<String, HashSet<String>>,
}

/// In-memory job and crawl-state store
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> StoreResult<std::sync::MutexGuard<'_, Inner>> {
        self.inner
            .lock()
            .map_err(|e| StoreError::Database(format!("store mutex poisoned: {e}")))
    }
}

impl JobStore for MemoryStore {
    fn enqueue(
        &self,
        crawler: &str,
        stage: &str,
        context: &TaskContext,
        payload: &Value,
        delay: u64,
    ) -> StoreResult<()> {
        let mut inner = self.lock()?;
        inner.next_id += 1;
        let id = inner.next_id;
        inner.tasks.push(MemTask {
            id,
            crawler: crawler.to_string(),
            stage: stage.to_string(),
            context: context.clone(),
            payload: payload.clone(),
            status: TaskStatus::Pending,
            available_at: Utc::now() + Duration::seconds(delay as i64),
        });
        Ok(())
    }

    fn claim(&self, stages: &[String]) -> StoreResult<Option<ClaimedTask>> {
        let mut inner = self.lock()?;
        let now = Utc::now();

        let task = inner.tasks.iter_mut().find(|t| {
            t.status == TaskStatus::Pending
                && t.available_at <= now
                && stages.contains(&format!("{}:{}", t.crawler, t.stage))
        });

        match task {
            Some(task) => {
                task.status = TaskStatus::Running;
                Ok(Some(ClaimedTask {
                    id: task.id,
                    crawler: task.crawler.clone(),
                    stage: task.stage.clone(),
                    context: task.context.clone(),
                    payload: task.payload.clone(),
                }))
            }
            None => Ok(None),
        }
    }

    fn complete(&self, task_id: i64) -> StoreResult<()> {
        let mut inner = self.lock()?;
        if let Some(task) = inner.tasks.iter_mut().find(|t| t.id == task_id) {
            task.status = TaskStatus::Done;
        }
        Ok(())
    }

    fn list_jobs(&self, crawler: &str) -> StoreResult<Vec<JobRecord>> {
        let inner = self.lock()?;
        let mut by_run: HashMap<String, (u64, u64)> = HashMap::new();

        for task in inner.tasks.iter().filter(|t| t.crawler == crawler) {
            let entry = by_run.entry(task.context.run_id.clone()).or_default();
            entry.0 += 1;
            if task.status != TaskStatus::Done {
                entry.1 += 1;
            }
        }

        Ok(by_run
            .into_iter()
            .map(|(run_id, (total, pending))| JobRecord {
                run_id,
                total,
                pending,
            })
            .collect())
    }

    fn cancel_all(&self, crawler: &str) -> StoreResult<()> {
        let mut inner = self.lock()?;
        inner.tasks.retain(|t| t.crawler != crawler);
        Ok(())
    }

    fn status(&self, crawler: &str) -> StoreResult<QueueStatus> {
        let inner = self.lock()?;
        let mut status = QueueStatus::default();
        for task in inner.tasks.iter().filter(|t| t.crawler == crawler) {
            match task.status {
                TaskStatus::Pending => status.pending += 1,
                TaskStatus::Running => status.running += 1,
                TaskStatus::Done => status.done += 1,
            }
        }
        Ok(status)
    }
}

impl CrawlStore for MemoryStore {
    fn record_operation(&self, crawler: &str, run_id: &str) -> StoreResult<()> {
        let mut inner = self.lock()?;
        let runs = inner.runs.entry(crawler.to_string()).or_default();
        match runs.iter_mut().find(|r| r.run_id == run_id) {
            Some(run) => run.operations += 1,
            None => runs.push(MemRun {
                run_id: run_id.to_string(),
                started_at: Utc::now(),
                operations: 1,
                aborted: false,
            }),
        }
        Ok(())
    }

    fn last_run(&self, crawler: &str) -> StoreResult<Option<DateTime<Utc>>> {
        let inner = self.lock()?;
        Ok(inner
            .runs
            .get(crawler)
            .and_then(|runs| runs.iter().map(|r| r.started_at).max()))
    }

    fn op_count(&self, crawler: &str) -> StoreResult<u64> {
        let inner = self.lock()?;
        Ok(inner
            .runs
            .get(crawler)
            .map(|runs| runs.iter().map(|r| r.operations).sum())
            .unwrap_or(0))
    }

    fn runs(&self, crawler: &str) -> StoreResult<Vec<CrawlRunRecord>> {
        let inner = self.lock()?;
        Ok(inner
            .runs
            .get(crawler)
            .map(|runs| {
                runs.iter()
                    .rev()
                    .map(|r| CrawlRunRecord {
                        run_id: r.run_id.clone(),
                        started_at: r.started_at.to_rfc3339(),
                        operations: r.operations,
                        aborted: r.aborted,
                    })
                    .collect()
            })
            .unwrap_or_default())
    }

    fn latest_run_id(&self, crawler: &str) -> StoreResult<Option<String>> {
        let inner = self.lock()?;
        Ok(inner
            .runs
            .get(crawler)
            .and_then(|runs| runs.last())
            .map(|r| r.run_id.clone()))
    }

    fn abort_all(&self, crawler: &str) -> StoreResult<()> {
        let mut inner = self.lock()?;
        if let Some(runs) = inner.runs.get_mut(crawler) {
            for run in runs.iter_mut() {
                run.aborted = true;
            }
        }
        Ok(())
    }

    fn append_event(
        &self,
        crawler: &str,
        run_id: &str,
        stage: &str,
        level: EventLevel,
        message: &str,
    ) -> StoreResult<()> {
        let mut inner = self.lock()?;
        inner
            .events
            .entry(crawler.to_string())
            .or_default()
            .push(EventRecord {
                run_id: run_id.to_string(),
                stage: stage.to_string(),
                level,
                message: message.to_string(),
                at: Utc::now().to_rfc3339(),
            });
        Ok(())
    }

    fn events(&self, crawler: &str) -> StoreResult<Vec<EventRecord>> {
        let inner = self.lock()?;
        Ok(inner.events.get(crawler).cloned().unwrap_or_default())
    }

    fn delete_events(&self, crawler: &str) -> StoreResult<()> {
        let mut inner = self.lock()?;
        inner.events.remove(crawler);
        Ok(())
    }

    fn flush(&self, crawler: &str) -> StoreResult<()> {
        let mut inner = self.lock()?;
        inner.runs.remove(crawler);
        Ok(())
    }

    fn set_tag(&self, crawler: &str, key: &str) -> StoreResult<()> {
        let mut inner = self.lock()?;
        inner
            .tags
            .entry(crawler.to_string())
            .or_default()
            .insert(key.to_string());
        Ok(())
    }

    fn has_tag(&self, crawler: &str, key: &str) -> StoreResult<bool> {
        let inner = self.lock()?;
        Ok(inner
            .tags
            .get(crawler)
            .map(|tags| tags.contains(key))
            .unwrap_or(false))
    }

    fn delete_tags(&self, crawler: &str) -> StoreResult<()> {
        let mut inner = self.lock()?;
        inner.tags.remove(crawler);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(run_id: &str) -> TaskContext {
        TaskContext::new("news", run_id.to_string(), false)
    }

    #[test]
    fn test_claim_marks_running() {
        let store = MemoryStore::new();
        store
            .enqueue("news", "init", &ctx("r1"), &Value::Null, 0)
            .unwrap();

        let stages = vec!["news:init".to_string()];
        let task = store.claim(&stages).unwrap().unwrap();
        assert_eq!(task.stage, "init");

        assert!(store.claim(&stages).unwrap().is_none());

        let status = JobStore::status(&store, "news").unwrap();
        assert_eq!(status.running, 1);
    }

    #[test]
    fn test_delayed_task_not_claimable() {
        let store = MemoryStore::new();
        store
            .enqueue("news", "init", &ctx("r1"), &Value::Null, 600)
            .unwrap();

        assert!(store
            .claim(&["news:init".to_string()])
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_op_count_accumulates_across_runs() {
        let store = MemoryStore::new();
        store.record_operation("news", "r1").unwrap();
        store.record_operation("news", "r2").unwrap();
        store.record_operation("news", "r2").unwrap();

        assert_eq!(store.op_count("news").unwrap(), 3);
        assert_eq!(store.latest_run_id("news").unwrap().as_deref(), Some("r2"));
        assert_eq!(store.runs("news").unwrap().len(), 2);
    }

    #[test]
    fn test_flush_and_events_are_namespaced() {
        let store = MemoryStore::new();
        store.record_operation("news", "r1").unwrap();
        store.record_operation("docs", "r9").unwrap();
        store
            .append_event("news", "r1", "init", EventLevel::Info, "started")
            .unwrap();

        CrawlStore::flush(&store, "news").unwrap();
        store.delete_events("news").unwrap();

        assert_eq!(store.op_count("news").unwrap(), 0);
        assert!(store.events("news").unwrap().is_empty());
        assert_eq!(store.op_count("docs").unwrap(), 1);
    }
}
