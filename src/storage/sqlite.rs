//! SQLite store backend
//!
//! One database file backs both store traits. The connection sits behind a
//! mutex so a single handle can be shared by the manager, the crawlers and
//! the worker.

use crate::storage::schema::initialize_schema;
use crate::storage::traits::{CrawlStore, JobStore, StoreError, StoreResult};
use crate::storage::{
    ClaimedTask, CrawlRunRecord, EventLevel, EventRecord, JobRecord, QueueStatus,
};
use crate::task::TaskContext;
use chrono::{DateTime, Duration, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;
use std::path::Path;
use std::sync::Mutex;

/// SQLite-backed job and crawl-state store
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Opens or creates the database at `path`
    pub fn new(path: &Path) -> StoreResult<Self> {
        let conn = Connection::open(path)?;

        // Configure SQLite for better performance
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            PRAGMA temp_store = MEMORY;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Creates an in-memory database (for testing)
    #[cfg(test)]
    pub fn new_in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> StoreResult<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| StoreError::Database(format!("connection mutex poisoned: {e}")))
    }
}

impl JobStore for SqliteStore {
    fn enqueue(
        &self,
        crawler: &str,
        stage: &str,
        context: &TaskContext,
        payload: &Value,
        delay: u64,
    ) -> StoreResult<()> {
        let conn = self.lock()?;
        let now = Utc::now();
        let available_at = now + Duration::seconds(delay as i64);
        conn.execute(
            "INSERT INTO tasks (crawler, stage, run_id, context, payload, status, available_at, enqueued_at)
             VALUES (?1, ?2, ?3, ?4, ?5, 'pending', ?6, ?7)",
            params![
                crawler,
                stage,
                context.run_id,
                serde_json::to_string(context)?,
                serde_json::to_string(payload)?,
                available_at.to_rfc3339(),
                now.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    fn claim(&self, stages: &[String]) -> StoreResult<Option<ClaimedTask>> {
        if stages.is_empty() {
            return Ok(None);
        }

        let conn = self.lock()?;
        let now = Utc::now().to_rfc3339();

        // Match on the namespaced stage name, "crawler:stage"
        let placeholders = vec!["?"; stages.len()].join(", ");
        let sql = format!(
            "SELECT id, crawler, stage, context, payload FROM tasks
             WHERE status = 'pending' AND available_at <= ?1
               AND (crawler || ':' || stage) IN ({placeholders})
             ORDER BY id LIMIT 1"
        );

        let mut stmt = conn.prepare(&sql)?;
        let mut bindings: Vec<&dyn rusqlite::ToSql> = vec![&now];
        for stage in stages {
            bindings.push(stage);
        }

        let row = stmt
            .query_row(bindings.as_slice(), |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                ))
            })
            .optional()?;

        let (id, crawler, stage, context_json, payload_json) = match row {
            Some(row) => row,
            None => return Ok(None),
        };

        conn.execute("UPDATE tasks SET status = 'running' WHERE id = ?1", [id])?;

        Ok(Some(ClaimedTask {
            id,
            crawler,
            stage,
            context: serde_json::from_str(&context_json)?,
            payload: serde_json::from_str(&payload_json)?,
        }))
    }

    fn complete(&self, task_id: i64) -> StoreResult<()> {
        let conn = self.lock()?;
        conn.execute("UPDATE tasks SET status = 'done' WHERE id = ?1", [task_id])?;
        Ok(())
    }

    fn list_jobs(&self, crawler: &str) -> StoreResult<Vec<JobRecord>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT run_id, COUNT(*), SUM(status != 'done') FROM tasks
             WHERE crawler = ?1 GROUP BY run_id",
        )?;

        let jobs = stmt
            .query_map([crawler], |row| {
                Ok(JobRecord {
                    run_id: row.get(0)?,
                    total: row.get::<_, i64>(1)? as u64,
                    pending: row.get::<_, i64>(2)? as u64,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(jobs)
    }

    fn cancel_all(&self, crawler: &str) -> StoreResult<()> {
        let conn = self.lock()?;
        conn.execute("DELETE FROM tasks WHERE crawler = ?1", [crawler])?;
        Ok(())
    }

    fn status(&self, crawler: &str) -> StoreResult<QueueStatus> {
        let conn = self.lock()?;
        let status = conn.query_row(
            "SELECT
                COALESCE(SUM(status = 'pending'), 0),
                COALESCE(SUM(status = 'running'), 0),
                COALESCE(SUM(status = 'done'), 0)
             FROM tasks WHERE crawler = ?1",
            [crawler],
            |row| {
                Ok(QueueStatus {
                    pending: row.get::<_, i64>(0)? as u64,
                    running: row.get::<_, i64>(1)? as u64,
                    done: row.get::<_, i64>(2)? as u64,
                })
            },
        )?;
        Ok(status)
    }
}

impl CrawlStore for SqliteStore {
    fn record_operation(&self, crawler: &str, run_id: &str) -> StoreResult<()> {
        let conn = self.lock()?;
        let now = Utc::now().to_rfc3339();
        conn.execute(
            "INSERT INTO crawl_runs (crawler, run_id, started_at, operations)
             VALUES (?1, ?2, ?3, 1)
             ON CONFLICT(crawler, run_id)
             DO UPDATE SET operations = operations + 1",
            params![crawler, run_id, now],
        )?;
        Ok(())
    }

    fn last_run(&self, crawler: &str) -> StoreResult<Option<DateTime<Utc>>> {
        let conn = self.lock()?;
        let started: Option<String> = conn
            .query_row(
                "SELECT MAX(started_at) FROM crawl_runs WHERE crawler = ?1",
                [crawler],
                |row| row.get(0),
            )
            .optional()?
            .flatten();

        match started {
            Some(ts) => {
                let parsed = DateTime::parse_from_rfc3339(&ts)
                    .map_err(|e| StoreError::Database(format!("bad run timestamp '{ts}': {e}")))?;
                Ok(Some(parsed.with_timezone(&Utc)))
            }
            None => Ok(None),
        }
    }

    fn op_count(&self, crawler: &str) -> StoreResult<u64> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row(
            "SELECT COALESCE(SUM(operations), 0) FROM crawl_runs WHERE crawler = ?1",
            [crawler],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    fn runs(&self, crawler: &str) -> StoreResult<Vec<CrawlRunRecord>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT run_id, started_at, operations, aborted FROM crawl_runs
             WHERE crawler = ?1 ORDER BY id DESC",
        )?;

        let runs = stmt
            .query_map([crawler], |row| {
                Ok(CrawlRunRecord {
                    run_id: row.get(0)?,
                    started_at: row.get(1)?,
                    operations: row.get::<_, i64>(2)? as u64,
                    aborted: row.get::<_, i64>(3)? != 0,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(runs)
    }

    fn latest_run_id(&self, crawler: &str) -> StoreResult<Option<String>> {
        let conn = self.lock()?;
        let run_id = conn
            .query_row(
                "SELECT run_id FROM crawl_runs WHERE crawler = ?1 ORDER BY id DESC LIMIT 1",
                [crawler],
                |row| row.get(0),
            )
            .optional()?;
        Ok(run_id)
    }

    fn abort_all(&self, crawler: &str) -> StoreResult<()> {
        let conn = self.lock()?;
        conn.execute(
            "UPDATE crawl_runs SET aborted = 1 WHERE crawler = ?1",
            [crawler],
        )?;
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
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO events (crawler, run_id, stage, level, message, at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                crawler,
                run_id,
                stage,
                level.to_db_string(),
                message,
                Utc::now().to_rfc3339()
            ],
        )?;
        Ok(())
    }

    fn events(&self, crawler: &str) -> StoreResult<Vec<EventRecord>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT run_id, stage, level, message, at FROM events
             WHERE crawler = ?1 ORDER BY id",
        )?;

        let events = stmt
            .query_map([crawler], |row| {
                Ok(EventRecord {
                    run_id: row.get(0)?,
                    stage: row.get(1)?,
                    level: EventLevel::from_db_string(&row.get::<_, String>(2)?)
                        .unwrap_or(EventLevel::Info),
                    message: row.get(3)?,
                    at: row.get(4)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(events)
    }

    fn delete_events(&self, crawler: &str) -> StoreResult<()> {
        let conn = self.lock()?;
        conn.execute("DELETE FROM events WHERE crawler = ?1", [crawler])?;
        Ok(())
    }

    fn flush(&self, crawler: &str) -> StoreResult<()> {
        let conn = self.lock()?;
        conn.execute("DELETE FROM crawl_runs WHERE crawler = ?1", [crawler])?;
        Ok(())
    }

    fn set_tag(&self, crawler: &str, key: &str) -> StoreResult<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO tags (crawler, key, created_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(crawler, key) DO NOTHING",
            params![crawler, key, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    fn has_tag(&self, crawler: &str, key: &str) -> StoreResult<bool> {
        let conn = self.lock()?;
        let found: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM tags WHERE crawler = ?1 AND key = ?2",
                params![crawler, key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    fn delete_tags(&self, crawler: &str) -> StoreResult<()> {
        let conn = self.lock()?;
        conn.execute("DELETE FROM tags WHERE crawler = ?1", [crawler])?;
        Ok(())
    }
}
