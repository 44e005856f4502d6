//! Usage recording
//!
//! Every run, successful or not, leaves one row behind. Recording is
//! best-effort: the orchestrator logs a failed write and still returns the
//! answer to the user.

use async_trait::async_trait;
use rusqlite::{params, Connection};
use std::path::PathBuf;

use crate::agent::trace::RunSummary;
use crate::error::{AttacheError, Result};

/// Sink for per-run usage records
#[async_trait]
pub trait UsageRecorder: Send + Sync {
    /// Persists one run summary
    async fn record(&self, summary: &RunSummary) -> Result<()>;
}

/// SQLite-backed recorder, one JSON row per run
pub struct SqliteUsageRecorder {
    db_path: PathBuf,
}

impl SqliteUsageRecorder {
    /// Creates the recorder and its schema
    pub fn new(db_path: impl Into<PathBuf>) -> Result<Self> {
        let db_path = db_path.into();
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let recorder = Self { db_path };
        recorder.init()?;
        Ok(recorder)
    }

    fn open(&self) -> Result<Connection> {
        Connection::open(&self.db_path)
            .map_err(|e| AttacheError::Recorder(format!("failed to open database: {}", e)).into())
    }

    fn init(&self) -> Result<()> {
        let conn = self.open()?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS usage_runs (
                message_id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                created_at TEXT NOT NULL,
                summary TEXT NOT NULL
            )",
            [],
        )
        .map_err(|e| AttacheError::Recorder(format!("failed to create tables: {}", e)))?;
        Ok(())
    }

    /// Loads all summaries recorded for a user, oldest first
    pub fn load_for_user(&self, user_id: &str) -> Result<Vec<RunSummary>> {
        let conn = self.open()?;
        let mut stmt = conn
            .prepare(
                "SELECT summary FROM usage_runs WHERE user_id = ? ORDER BY created_at ASC",
            )
            .map_err(|e| AttacheError::Recorder(format!("failed to prepare query: {}", e)))?;
        let rows = stmt
            .query_map(params![user_id], |row| row.get::<_, String>(0))
            .map_err(|e| AttacheError::Recorder(format!("failed to query runs: {}", e)))?;

        let mut summaries = Vec::new();
        for row in rows {
            let json =
                row.map_err(|e| AttacheError::Recorder(format!("failed to read row: {}", e)))?;
            summaries.push(serde_json::from_str(&json)?);
        }
        Ok(summaries)
    }
}

#[async_trait]
impl UsageRecorder for SqliteUsageRecorder {
    async fn record(&self, summary: &RunSummary) -> Result<()> {
        let json = serde_json::to_string(summary)?;
        let conn = self.open()?;
        conn.execute(
            "INSERT OR REPLACE INTO usage_runs (message_id, user_id, created_at, summary)
             VALUES (?, ?, ?, ?)",
            params![
                summary.message_id,
                summary.user_id,
                chrono::Utc::now().to_rfc3339(),
                json
            ],
        )
        .map_err(|e| AttacheError::Recorder(format!("failed to write run: {}", e)))?;
        tracing::debug!("Recorded run {} for {}", summary.message_id, summary.user_id);
        Ok(())
    }
}

/// Recorder that drops everything; for tests and recording-disabled setups
pub struct NoopRecorder;

#[async_trait]
impl UsageRecorder for NoopRecorder {
    async fn record(&self, _summary: &RunSummary) -> Result<()> {
        Ok(())
    }
}
