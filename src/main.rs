//! Attache service entrypoint

use clap::Parser;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

use attache::agent::Orchestrator;
use attache::auth::{CredentialManager, TokenStore};
use attache::config::Config;
use attache::error::Result;
use attache::providers::GroqProvider;
use attache::recorder::SqliteUsageRecorder;
use attache::server::{self, AppState};
use attache::session::SessionStore;
use attache::tools::contacts::{
    CreateContactTool, CrmClient, DeleteContactTool, GetContactsTool, SearchByIdentifierTool,
    UpdateContactTool,
};
use attache::tools::{ToolCatalog, ToolExecutor};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::parse();
    config.validate()?;

    let credentials = Arc::new(CredentialManager::new(
        TokenStore::new(config.token_file()?),
        config.crm_token_url.clone(),
        config.crm_client_id.clone(),
        config.crm_client_secret.clone(),
        config.crm_redirect_uri.clone(),
    )?);

    let crm = Arc::new(CrmClient::new(
        config.crm_base_url.clone(),
        Arc::clone(&credentials),
        config.request_timeout_secs,
    )?);
    let mut executors: HashMap<String, Arc<dyn ToolExecutor>> = HashMap::new();
    executors.insert(
        "get_contacts".to_string(),
        Arc::new(GetContactsTool::new(Arc::clone(&crm))),
    );
    executors.insert(
        "create_contact".to_string(),
        Arc::new(CreateContactTool::new(Arc::clone(&crm))),
    );
    executors.insert(
        "update_contact".to_string(),
        Arc::new(UpdateContactTool::new(Arc::clone(&crm))),
    );
    executors.insert(
        "delete_contact".to_string(),
        Arc::new(DeleteContactTool::new(Arc::clone(&crm))),
    );
    executors.insert(
        "search_by_identifier".to_string(),
        Arc::new(SearchByIdentifierTool::new(Arc::clone(&crm))),
    );
    let catalog = Arc::new(ToolCatalog::from_descriptor_dir(
        &config.descriptor_dir,
        executors,
    )?);
    tracing::info!("Loaded {} tools", catalog.len());

    let sessions = Arc::new(SessionStore::new(
        config.session_db()?,
        Duration::from_secs(config.session_ttl_secs),
        attache::prompts::system_prompt(),
    )?);
    let recorder = Arc::new(SqliteUsageRecorder::new(config.usage_db()?)?);

    let provider = Arc::new(GroqProvider::new(
        config.llm_base_url.clone(),
        config.llm_api_key.clone(),
        config.model_name.clone(),
        config.max_completion_tokens,
        config.request_timeout_secs,
    )?);

    let orchestrator = Orchestrator::new(
        provider,
        catalog,
        sessions,
        recorder,
        config.max_cycles as u32,
        Duration::from_secs(config.request_timeout_secs),
    );

    let state = Arc::new(AppState {
        orchestrator,
        credentials,
        authorize_url: config.crm_authorize_url.clone(),
        client_id: config.crm_client_id.clone(),
        redirect_uri: config.crm_redirect_uri.clone(),
        scopes: config.crm_scopes.clone(),
    });

    server::serve(&config.bind_addr, state).await
}
