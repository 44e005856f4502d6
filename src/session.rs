//! Per-user session transcripts with TTL
//!
//! The session store is the loop's working memory: an ordered message
//! sequence per user, persisted between turns. Writes are whole-sequence
//! replaces inside one transaction, never row appends, so a failed write
//! leaves the previous sequence intact. A transcript whose TTL has elapsed
//! is treated as absent on the next load; this caps unbounded growth of
//! per-user state.
//!
//! Connections are opened per call, like the teacher storage layer; session
//! rows are partitioned by user id, so no cross-user locking is needed.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{AttacheError, Result};
use crate::providers::Message;

/// Storage backend for per-user conversation transcripts
pub struct SessionStore {
    db_path: PathBuf,
    ttl: Duration,
    system_prompt: String,
}

impl SessionStore {
    /// Creates a session store backed by the given database path
    ///
    /// # Arguments
    ///
    /// * `db_path` - SQLite file; parent directories are created
    /// * `ttl` - Idle lifetime of a transcript; reset on every save
    /// * `system_prompt` - Seed message for fresh transcripts
    ///
    /// # Examples
    ///
    /// ```
    /// use std::time::Duration;
    /// use attache::session::SessionStore;
    ///
    /// # fn example() -> attache::error::Result<()> {
    /// let store = SessionStore::new(
    ///     "/tmp/attache_sessions.db",
    ///     Duration::from_secs(3600),
    ///     "You are a CRM assistant.",
    /// )?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn new(
        db_path: impl Into<PathBuf>,
        ttl: Duration,
        system_prompt: impl Into<String>,
    ) -> Result<Self> {
        let db_path = db_path.into();
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let store = Self {
            db_path,
            ttl,
            system_prompt: system_prompt.into(),
        };
        store.init()?;
        Ok(store)
    }

    fn open(&self) -> Result<Connection> {
        Connection::open(&self.db_path)
            .map_err(|e| AttacheError::Session(format!("failed to open database: {}", e)).into())
    }

    /// Initializes the schema
    fn init(&self) -> Result<()> {
        let conn = self.open()?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS sessions (
                user_id TEXT PRIMARY KEY,
                messages TEXT NOT NULL,
                expires_at TEXT NOT NULL
            )",
            [],
        )
        .map_err(|e| AttacheError::Session(format!("failed to create tables: {}", e)))?;
        Ok(())
    }

    /// Loads the transcript for a user
    ///
    /// An absent or expired row yields a fresh single-element transcript
    /// containing the system prompt, which is persisted immediately so
    /// concurrent readers converge on the same seed.
    pub fn load(&self, user_id: &str) -> Result<Vec<Message>> {
        let conn = self.open()?;
        let row: Option<(String, String)> = conn
            .query_row(
                "SELECT messages, expires_at FROM sessions WHERE user_id = ?",
                params![user_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()
            .map_err(|e| AttacheError::Session(format!("failed to query session: {}", e)))?;

        if let Some((messages_json, expires_at)) = row {
            let expires_at = expires_at.parse::<DateTime<Utc>>().map_err(|e| {
                AttacheError::Session(format!("malformed expiry timestamp: {}", e))
            })?;
            if Utc::now() < expires_at {
                let messages: Vec<Message> = serde_json::from_str(&messages_json)
                    .map_err(|e| AttacheError::Session(format!("corrupt transcript: {}", e)))?;
                return Ok(messages);
            }
            tracing::debug!("Session expired for {}, starting fresh", user_id);
        }

        let seed = vec![Message::system(self.system_prompt.clone())];
        self.save(user_id, &seed)?;
        Ok(seed)
    }

    /// Replaces the stored transcript atomically and resets the TTL
    pub fn save(&self, user_id: &str, messages: &[Message]) -> Result<()> {
        let messages_json = serde_json::to_string(messages)?;
        let expires_at = (Utc::now()
            + ChronoDuration::seconds(self.ttl.as_secs() as i64))
        .to_rfc3339();

        let mut conn = self.open()?;
        let tx = conn
            .transaction()
            .map_err(|e| AttacheError::Session(format!("failed to start transaction: {}", e)))?;
        tx.execute(
            "INSERT INTO sessions (user_id, messages, expires_at)
             VALUES (?, ?, ?)
             ON CONFLICT(user_id) DO UPDATE SET
                messages = excluded.messages,
                expires_at = excluded.expires_at",
            params![user_id, messages_json, expires_at],
        )
        .map_err(|e| AttacheError::Session(format!("failed to write session: {}", e)))?;
        tx.commit()
            .map_err(|e| AttacheError::Session(format!("failed to commit session: {}", e)))?;
        Ok(())
    }

    /// Deletes a user's transcript; a no-op when none exists
    pub fn clear(&self, user_id: &str) -> Result<()> {
        let conn = self.open()?;
        conn.execute("DELETE FROM sessions WHERE user_id = ?", params![user_id])
            .map_err(|e| AttacheError::Session(format!("failed to delete session: {}", e)))?;
        Ok(())
    }
}
