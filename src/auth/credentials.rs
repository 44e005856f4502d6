//! Credential manager: expiry skew, single-flight refresh, code exchange
//!
//! The stored token record is the one piece of cross-user shared state in
//! the system. The upstream auth API invalidates the previous refresh token
//! on every exchange, so refresh MUST be single-flight: concurrent callers
//! that observe an expired token await one in-flight refresh instead of
//! issuing parallel exchanges.

use sha2::{Digest, Sha256};
use std::time::Duration;
use tokio::sync::Mutex;

use crate::auth::token_store::{TokenRecord, TokenStore};
use crate::error::{AttacheError, Result};

/// Seconds before nominal expiry at which a token is treated as stale
const EXPIRY_SKEW_SECS: u64 = 300;

/// Coordinates the lifecycle of the shared OAuth token.
///
/// "Never authorized" (no stored record) and "expired with failed refresh"
/// both surface as `Ok(None)` from [`get_valid_token`](Self::get_valid_token);
/// callers treat them identically and direct the user to the authorize
/// endpoint rather than retrying.
pub struct CredentialManager {
    http: reqwest::Client,
    store: TokenStore,
    token_url: String,
    client_id: String,
    client_secret: String,
    redirect_uri: String,
    /// Serializes refresh attempts. Held across the upstream exchange.
    refresh_lock: Mutex<()>,
}

/// Token endpoint response body
#[derive(Debug, serde::Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<u64>,
    #[serde(default)]
    token_type: Option<String>,
    #[serde(default)]
    scope: Option<String>,
}

impl CredentialManager {
    /// Creates a new manager over the given token store
    ///
    /// # Errors
    ///
    /// Returns `AttacheError::Authentication` if the HTTP client cannot be
    /// built.
    pub fn new(
        store: TokenStore,
        token_url: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        redirect_uri: impl Into<String>,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| {
                AttacheError::Authentication(format!("failed to create HTTP client: {}", e))
            })?;
        Ok(Self {
            http,
            store,
            token_url: token_url.into(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            redirect_uri: redirect_uri.into(),
            refresh_lock: Mutex::new(()),
        })
    }

    /// Returns a valid access token, refreshing when necessary.
    ///
    /// The resolution order is:
    ///
    /// 1. Load the stored record; absent means never authorized -> `None`.
    /// 2. If the record expires more than 300 s from now, return its
    ///    access token without any upstream call.
    /// 3. Otherwise refresh. A failed refresh also yields `None`.
    pub async fn get_valid_token(&self) -> Result<Option<String>> {
        tracing::debug!("Checking for valid token");
        let record = match self.store.load()? {
            Some(record) => record,
            None => return Ok(None),
        };

        if !record.is_expired(EXPIRY_SKEW_SECS) {
            return Ok(Some(record.access_token));
        }

        Ok(self.refresh().await?.map(|r| r.access_token))
    }

    /// Exchanges the stored refresh token for a new access/refresh pair.
    ///
    /// Single-flight: the lock is held across the upstream exchange, and
    /// after acquiring it the stored record is re-checked so waiters reuse
    /// the token the winning caller just persisted instead of spending
    /// another refresh token.
    ///
    /// On any non-success response the stored record is left untouched and
    /// `Ok(None)` is returned. A renewal response that omits
    /// `refresh_token` keeps the previous one.
    pub async fn refresh(&self) -> Result<Option<TokenRecord>> {
        let _guard = self.refresh_lock.lock().await;

        // Another task may have refreshed while we waited on the lock.
        let record = match self.store.load()? {
            Some(record) => record,
            None => return Ok(None),
        };
        if !record.is_expired(EXPIRY_SKEW_SECS) {
            return Ok(Some(record));
        }

        self.exchange_refresh(record).await
    }

    /// Refreshes after the upstream API rejected an access token with 401.
    ///
    /// Unlike [`refresh`](Self::refresh) this ignores the local expiry
    /// check, since the rejection proves the token is no longer honored.
    /// Still single-flight: if the stored token already differs from the
    /// rejected one, another task refreshed first and that record is
    /// returned as-is.
    pub async fn refresh_rejected(&self, rejected_access_token: &str) -> Result<Option<TokenRecord>> {
        let _guard = self.refresh_lock.lock().await;

        let record = match self.store.load()? {
            Some(record) => record,
            None => return Ok(None),
        };
        if record.access_token != rejected_access_token {
            return Ok(Some(record));
        }

        self.exchange_refresh(record).await
    }

    /// Performs the refresh-grant exchange. Caller holds `refresh_lock`.
    async fn exchange_refresh(&self, record: TokenRecord) -> Result<Option<TokenRecord>> {
        let refresh_token = match &record.refresh_token {
            Some(token) => token.clone(),
            None => return Ok(None),
        };

        let params = [
            ("grant_type", "refresh_token"),
            ("client_id", &self.client_id),
            ("client_secret", &self.client_secret),
            ("refresh_token", &refresh_token),
        ];

        let response = self.http.post(&self.token_url).form(&params).send().await?;
        if !response.status().is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!("Token refresh failed: {}", body);
            return Ok(None);
        }

        let body: TokenResponse = response.json().await?;
        let mut renewed = TokenRecord {
            access_token: body.access_token,
            // Upstream may omit the refresh token on renewal; keep ours.
            refresh_token: body.refresh_token.or(Some(refresh_token)),
            expires_in: body.expires_in,
            expires_at: None,
            token_type: body.token_type,
            scope: body.scope,
        };
        renewed.stamp_expiry();
        self.store.save(&renewed)?;
        tracing::info!("Token refreshed successfully");

        Ok(Some(renewed))
    }

    /// Exchanges an authorization code for a token record and persists it.
    ///
    /// Used by the OAuth callback endpoint.
    ///
    /// # Errors
    ///
    /// Returns `AttacheError::Authentication` when the upstream exchange
    /// fails; nothing is persisted in that case.
    pub async fn exchange_code(&self, code: &str) -> Result<TokenRecord> {
        let params = [
            ("grant_type", "authorization_code"),
            ("client_id", &self.client_id),
            ("client_secret", &self.client_secret),
            ("redirect_uri", &self.redirect_uri),
            ("code", code),
        ];

        let response = self.http.post(&self.token_url).form(&params).send().await?;
        if !response.status().is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(
                AttacheError::Authentication(format!("code exchange failed: {}", body)).into(),
            );
        }

        let body: TokenResponse = response.json().await?;
        let mut record = TokenRecord {
            access_token: body.access_token,
            refresh_token: body.refresh_token,
            expires_in: body.expires_in,
            expires_at: None,
            token_type: body.token_type,
            scope: body.scope,
        };
        record.stamp_expiry();
        self.store.save(&record)?;
        tracing::info!("User authorized, token saved");

        Ok(record)
    }

    /// Derives the stable user identity for the stored credential.
    ///
    /// The refresh token is the longest-lived secret tied to the
    /// authorization grant, so its hash partitions session state per
    /// authorized account.
    ///
    /// # Errors
    ///
    /// Returns `AttacheError::Authentication` when the record has no
    /// refresh token.
    pub fn derive_user_id(record: &TokenRecord) -> Result<String> {
        let refresh_token = record.refresh_token.as_deref().ok_or_else(|| {
            AttacheError::Authentication("missing refresh token in stored record".to_string())
        })?;
        let digest = Sha256::digest(refresh_token.as_bytes());
        let hex: String = digest.iter().map(|b| format!("{:02x}", b)).collect();
        Ok(format!("user_{}", &hex[..16]))
    }

    /// Loads the stored record without touching upstream
    pub fn stored_record(&self) -> Result<Option<TokenRecord>> {
        self.store.load()
    }
}
