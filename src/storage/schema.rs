//! Database schema definitions
//!
//! All SQL schema for the SQLite store backend.

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- Queued, claimed and completed stage tasks
CREATE TABLE IF NOT EXISTS tasks (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    crawler TEXT NOT NULL,
    stage TEXT NOT NULL,
    run_id TEXT NOT NULL,
    context TEXT NOT NULL,
    payload TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'pending',
    available_at TEXT NOT NULL,
    enqueued_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_tasks_crawler ON tasks(crawler);
CREATE INDEX IF NOT EXISTS idx_tasks_claim ON tasks(status, stage, available_at);
CREATE INDEX IF NOT EXISTS idx_tasks_run ON tasks(crawler, run_id);

-- Crawl run counters and timestamps
CREATE TABLE IF NOT EXISTS crawl_runs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    crawler TEXT NOT NULL,
    run_id TEXT NOT NULL,
    started_at TEXT NOT NULL,
    operations INTEGER NOT NULL DEFAULT 0,
    aborted INTEGER NOT NULL DEFAULT 0,
    UNIQUE(crawler, run_id)
);

CREATE INDEX IF NOT EXISTS idx_crawl_runs_crawler ON crawl_runs(crawler);

-- Append-only event log
CREATE TABLE IF NOT EXISTS events (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    crawler TEXT NOT NULL,
    run_id TEXT NOT NULL,
    stage TEXT NOT NULL,
    level TEXT NOT NULL,
    message TEXT NOT NULL,
    at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_events_crawler ON events(crawler);

-- Tag side-data (incremental skip markers and similar)
CREATE TABLE IF NOT EXISTS tags (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    crawler TEXT NOT NULL,
    key TEXT NOT NULL,
    created_at TEXT NOT NULL,
    UNIQUE(crawler, key)
);

CREATE INDEX IF NOT EXISTS idx_tags_crawler ON tags(crawler);
"#;

/// Initializes the database schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    #[test]
    fn test_schema_initializes() {
        let conn = Connection::open_in_memory().unwrap();
        assert!(initialize_schema(&conn).is_ok());
    }

    #[test]
    fn test_schema_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();

        initialize_schema(&conn).unwrap();
        assert!(initialize_schema(&conn).is_ok());
    }

    #[test]
    fn test_tables_exist_after_init() {
        let conn = Connection::open_in_memory().unwrap();
        initialize_schema(&conn).unwrap();

        for table in ["tasks", "crawl_runs", "events", "tags"] {
            let count: i64 = conn
                .query_row(
                    "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name=?1",
                    [table],
                    |row| row.get(0),
                )
                .unwrap();
            assert_eq!(count, 1, "Table {} should exist", table);
        }
    }
}
