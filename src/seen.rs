//! Processed-message log.
//!
//! A message id, once recorded here, is never re-classified or re-written.
//! Ids are recorded only after a successful store write, so a failed write
//! leaves the message eligible for the next run.

use std::path::{Path, PathBuf};

use chrono::Utc;
use rusqlite::{params, Connection};

/// Default on-disk location of the log.
pub fn default_log_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_default()
        .join(".jobtrail")
        .join("jobtrail.db")
}

/// Durable set of message ids considered done.
pub struct ProcessedLog {
    conn: Connection,
}

impl ProcessedLog {
    pub fn open(path: &Path) -> Result<Self, rusqlite::Error> {
        if let Some(parent) = path.parent() {
            // Best-effort; the open below surfaces a real failure.
            let _ = std::fs::create_dir_all(parent);
        }
        let conn = Connection::open(path)?;
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self, rusqlite::Error> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, rusqlite::Error> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS processed_messages (
                message_id TEXT PRIMARY KEY,
                thread_id TEXT NOT NULL,
                processed_at TEXT NOT NULL
            )",
            [],
        )?;
        Ok(Self { conn })
    }

    pub fn contains(&self, message_id: &str) -> Result<bool, rusqlite::Error> {
        let mut stmt = self
            .conn
            .prepare("SELECT 1 FROM processed_messages WHERE message_id = ?1")?;
        stmt.exists(params![message_id])
    }

    /// Record a message as done. Re-recording is a no-op.
    pub fn mark(&self, message_id: &str, thread_id: &str) -> Result<(), rusqlite::Error> {
        self.conn.execute(
            "INSERT OR IGNORE INTO processed_messages (message_id, thread_id, processed_at)
             VALUES (?1, ?2, ?3)",
            params![message_id, thread_id, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    pub fn count(&self) -> Result<u64, rusqlite::Error> {
        self.conn
            .query_row("SELECT COUNT(*) FROM processed_messages", [], |row| {
                row.get::<_, i64>(0)
            })
            .map(|n| n as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mark_and_contains() {
        let log = ProcessedLog::open_in_memory().unwrap();
        assert!(!log.contains("m1").unwrap());
        log.mark("m1", "t1").unwrap();
        assert!(log.contains("m1").unwrap());
        assert_eq!(log.count().unwrap(), 1);
    }

    #[test]
    fn test_mark_is_idempotent() {
        let log = ProcessedLog::open_in_memory().unwrap();
        log.mark("m1", "t1").unwrap();
        log.mark("m1", "t1").unwrap();
        assert_eq!(log.count().unwrap(), 1);
    }

    #[test]
    fn test_open_creates_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("log.db");
        let log = ProcessedLog::open(&path).unwrap();
        log.mark("m1", "t1").unwrap();
        drop(log);

        let reopened = ProcessedLog::open(&path).unwrap();
        assert!(reopened.contains("m1").unwrap());
    }
}
