//! Configuration management for Attache
//!
//! Every knob is both a CLI flag and an environment variable, with a
//! default where one makes sense. Secrets (client secret, model API key)
//! have no defaults and must be provided through the environment.

use clap::Parser;
use directories::ProjectDirs;
use std::path::PathBuf;

use crate::error::{AttacheError, Result};

/// Runtime configuration for the Attache service
///
/// Parsed from command-line arguments with environment-variable
/// fallbacks. Call [`Config::validate`] after parsing; the service
/// refuses to start on an invalid configuration rather than failing
/// mid-request.
#[derive(Parser, Debug, Clone)]
#[command(name = "attache", version, about = "Conversational CRM assistant service")]
pub struct Config {
    /// OAuth client id for the CRM application
    #[arg(long, env = "CRM_CLIENT_ID", default_value = "")]
    pub crm_client_id: String,

    /// OAuth client secret for the CRM application
    #[arg(long, env = "CRM_CLIENT_SECRET", default_value = "", hide_env_values = true)]
    pub crm_client_secret: String,

    /// Redirect URI registered for the OAuth callback
    #[arg(
        long,
        env = "CRM_REDIRECT_URI",
        default_value = "http://localhost:8000/auth/callback"
    )]
    pub crm_redirect_uri: String,

    /// Upstream OAuth authorize URL
    #[arg(
        long,
        env = "CRM_AUTHORIZE_URL",
        default_value = "https://app.hubspot.com/oauth/authorize"
    )]
    pub crm_authorize_url: String,

    /// Upstream OAuth token endpoint
    #[arg(
        long,
        env = "CRM_TOKEN_URL",
        default_value = "https://api.hubapi.com/oauth/v1/token"
    )]
    pub crm_token_url: String,

    /// Base URL of the CRM REST API
    #[arg(long, env = "CRM_BASE_URL", default_value = "https://api.hubapi.com")]
    pub crm_base_url: String,

    /// Space-separated OAuth scopes requested at authorization
    #[arg(
        long,
        env = "CRM_SCOPES",
        default_value = "crm.objects.contacts.read crm.objects.contacts.write oauth"
    )]
    pub crm_scopes: String,

    /// API key for the model provider
    #[arg(long, env = "LLM_API_KEY", default_value = "", hide_env_values = true)]
    pub llm_api_key: String,

    /// Base URL of the OpenAI-compatible chat completions API
    #[arg(
        long,
        env = "LLM_BASE_URL",
        default_value = "https://api.groq.com/openai/v1"
    )]
    pub llm_base_url: String,

    /// Model name sent with every completion request
    #[arg(long, env = "MODEL_NAME", default_value = "llama-3.3-70b-versatile")]
    pub model_name: String,

    /// Maximum completion tokens per model call
    #[arg(long, env = "MAX_COMPLETION_TOKENS", default_value_t = 4096)]
    pub max_completion_tokens: u32,

    /// Session transcript time-to-live in seconds
    #[arg(long, env = "SESSION_TTL_SECS", default_value_t = 3600)]
    pub session_ttl_secs: u64,

    /// Maximum reasoning cycles per request
    #[arg(long, env = "MAX_CYCLES", default_value_t = 5)]
    pub max_cycles: usize,

    /// Wall-clock budget for one request, in seconds
    #[arg(long, env = "REQUEST_TIMEOUT_SECS", default_value_t = 60)]
    pub request_timeout_secs: u64,

    /// Address the HTTP server binds to
    #[arg(long, env = "ATTACHE_BIND", default_value = "0.0.0.0:8000")]
    pub bind_addr: String,

    /// Directory holding tool descriptor JSON files
    #[arg(long, env = "ATTACHE_DESCRIPTOR_DIR", default_value = "descriptors")]
    pub descriptor_dir: PathBuf,

    /// Override for the data directory (token file, session and usage DBs)
    #[arg(long, env = "ATTACHE_DATA_DIR")]
    pub data_dir: Option<PathBuf>,
}

impl Config {
    /// Validates the configuration
    ///
    /// # Errors
    ///
    /// Returns `AttacheError::Config` when a required field is empty or a
    /// limit is zero.
    pub fn validate(&self) -> Result<()> {
        if self.crm_client_id.is_empty() {
            return Err(AttacheError::Config("CRM_CLIENT_ID must be set".to_string()).into());
        }
        if self.crm_client_secret.is_empty() {
            return Err(AttacheError::Config("CRM_CLIENT_SECRET must be set".to_string()).into());
        }
        if self.llm_api_key.is_empty() {
            return Err(AttacheError::Config("LLM_API_KEY must be set".to_string()).into());
        }
        if self.max_cycles == 0 {
            return Err(
                AttacheError::Config("max_cycles must be greater than 0".to_string()).into(),
            );
        }
        if self.session_ttl_secs == 0 {
            return Err(
                AttacheError::Config("session_ttl_secs must be greater than 0".to_string()).into(),
            );
        }
        if self.request_timeout_secs == 0 {
            return Err(AttacheError::Config(
                "request_timeout_secs must be greater than 0".to_string(),
            )
            .into());
        }
        Ok(())
    }

    /// Resolves the data directory, creating it if necessary
    ///
    /// Uses the `--data-dir` override when provided, otherwise the
    /// platform data directory for the application.
    pub fn resolve_data_dir(&self) -> Result<PathBuf> {
        let dir = match &self.data_dir {
            Some(dir) => dir.clone(),
            None => ProjectDirs::from("dev", "attache", "attache")
                .ok_or_else(|| {
                    AttacheError::Config("could not determine data directory".to_string())
                })?
                .data_dir()
                .to_path_buf(),
        };
        std::fs::create_dir_all(&dir)?;
        Ok(dir)
    }

    /// Path of the persisted OAuth token record
    pub fn token_file(&self) -> Result<PathBuf> {
        Ok(self.resolve_data_dir()?.join("token.json"))
    }

    /// Path of the session transcript database
    pub fn session_db(&self) -> Result<PathBuf> {
        Ok(self.resolve_data_dir()?.join("sessions.db"))
    }

    /// Path of the usage record database
    pub fn usage_db(&self) -> Result<PathBuf> {
        Ok(self.resolve_data_dir()?.join("usage.db"))
    }
}

impl Default for Config {
    fn default() -> Self {
        // Defaults mirror the clap attributes; used by tests that do not
        // go through argument parsing.
        Self::parse_from(["attache"])
    }
}
