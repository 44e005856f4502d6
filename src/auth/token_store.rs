//! OAuth token persistence
//!
//! The token record is stored as a single JSON file. Writes go through a
//! temp file in the same directory followed by a rename, so a failed write
//! leaves the previous record intact.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::Result;

// ---------------------------------------------------------------------------
// TokenRecord
// ---------------------------------------------------------------------------

/// A complete OAuth token response, as persisted at rest.
///
/// `expires_at` is an absolute UNIX timestamp computed from `expires_in`
/// when the record is persisted, so expiry can be determined without an
/// upstream round-trip.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenRecord {
    /// The access token issued by the authorization server
    pub access_token: String,

    /// Refresh token used to obtain a new access token
    ///
    /// Retained across refreshes even when a renewal response omits one.
    #[serde(default)]
    pub refresh_token: Option<String>,

    /// Lifetime of the access token in seconds, as reported upstream
    #[serde(default)]
    pub expires_in: Option<u64>,

    /// Absolute UNIX timestamp at which the access token expires
    #[serde(default)]
    pub expires_at: Option<f64>,

    /// Token type, typically `"bearer"`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,

    /// Space-separated OAuth scopes granted by the authorization server
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

impl TokenRecord {
    /// Returns `true` when the access token expires within `skew_secs`.
    ///
    /// A record without `expires_at` is treated as expired: it cannot be
    /// proven valid, and a refresh attempt is the safe path.
    ///
    /// # Examples
    ///
    /// ```
    /// use attache::auth::TokenRecord;
    ///
    /// let mut record = TokenRecord {
    ///     access_token: "tok".to_string(),
    ///     refresh_token: Some("refresh".to_string()),
    ///     expires_in: Some(1800),
    ///     expires_at: Some(chrono::Utc::now().timestamp() as f64 + 1800.0),
    ///     token_type: None,
    ///     scope: None,
    /// };
    /// assert!(!record.is_expired(300));
    ///
    /// record.expires_at = Some(chrono::Utc::now().timestamp() as f64 + 60.0);
    /// assert!(record.is_expired(300));
    /// ```
    pub fn is_expired(&self, skew_secs: u64) -> bool {
        match self.expires_at {
            None => true,
            Some(expires_at) => Utc::now().timestamp() as f64 >= expires_at - skew_secs as f64,
        }
    }

    /// Stamps `expires_at` from `expires_in` relative to now.
    pub fn stamp_expiry(&mut self) {
        if let Some(expires_in) = self.expires_in {
            self.expires_at = Some(Utc::now().timestamp() as f64 + expires_in as f64);
        }
    }
}

// ---------------------------------------------------------------------------
// TokenStore
// ---------------------------------------------------------------------------

/// File-backed accessor for the single shared token record.
///
/// # Examples
///
/// ```no_run
/// use attache::auth::{TokenRecord, TokenStore};
///
/// # fn example() -> attache::error::Result<()> {
/// let store = TokenStore::new("/var/lib/attache/token.json");
/// if let Some(record) = store.load()? {
///     println!("access token: {}", record.access_token);
/// }
/// # Ok(())
/// # }
/// ```
pub struct TokenStore {
    path: PathBuf,
}

impl TokenStore {
    /// Creates a store backed by the given file path
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the backing file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads the stored token record
    ///
    /// Returns `Ok(None)` when the file does not exist, so callers can
    /// distinguish "never authorized" from a genuine IO error.
    pub fn load(&self) -> Result<Option<TokenRecord>> {
        match std::fs::read_to_string(&self.path) {
            Ok(json) => Ok(Some(serde_json::from_str(&json)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Persists the token record atomically
    ///
    /// Writes to a temp file in the same directory and renames over the
    /// target, so a failure at any point leaves the previous record intact.
    pub fn save(&self, record: &TokenRecord) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(record)?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    /// Deletes the stored record; a no-op when none exists
    pub fn delete(&self) -> Result<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
