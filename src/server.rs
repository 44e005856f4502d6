//! HTTP surface
//!
//! Four endpoints: the chat entrypoint, the OAuth authorize redirect, the
//! OAuth callback, and a health probe. Handlers own the HTTP status
//! mapping; everything below them speaks [`crate::error::AttacheError`].

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Redirect, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;

use crate::agent::{Orchestrator, RunStatus};
use crate::auth::CredentialManager;
use crate::error::Result;

/// Shared state handed to every handler
pub struct AppState {
    pub orchestrator: Orchestrator,
    pub credentials: Arc<CredentialManager>,
    pub authorize_url: String,
    pub client_id: String,
    pub redirect_uri: String,
    pub scopes: String,
}

/// Body of a chat request
#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub query: String,
}

/// Body of a chat response
#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub message_id: String,
    pub response: String,
    pub status: RunStatus,
    pub react_cycles: u32,
    pub tokens_used: u64,
    pub tool_calls: u64,
    pub response_time_seconds: f64,
}

#[derive(Debug, Deserialize)]
struct CallbackParams {
    #[serde(default)]
    code: Option<String>,
}

/// Builds the application router
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/auth/authorize", get(authorize))
        .route("/auth/callback", get(callback))
        .route("/api/v1/agent/chat", post(chat))
        .with_state(state)
}

/// Binds and serves the router until the process is stopped
pub async fn serve(bind_addr: &str, state: Arc<AppState>) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    tracing::info!("Listening on {}", bind_addr);
    axum::serve(listener, router(state)).await?;
    Ok(())
}

async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

/// Redirects the browser to the upstream consent screen
async fn authorize(State(state): State<Arc<AppState>>) -> Response {
    let url = url::Url::parse_with_params(
        &state.authorize_url,
        &[
            ("client_id", state.client_id.as_str()),
            ("redirect_uri", state.redirect_uri.as_str()),
            ("scope", state.scopes.as_str()),
            ("response_type", "code"),
        ],
    );
    match url {
        Ok(url) => Redirect::temporary(url.as_str()).into_response(),
        Err(e) => error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("malformed authorize URL: {}", e),
        ),
    }
}

/// Completes the OAuth flow with the code the consent screen sent back
async fn callback(
    State(state): State<Arc<AppState>>,
    Query(params): Query<CallbackParams>,
) -> Response {
    let code = match params.code {
        Some(code) if !code.is_empty() => code,
        _ => return error_response(StatusCode::BAD_REQUEST, "missing authorization code"),
    };

    let record = match state.credentials.exchange_code(&code).await {
        Ok(record) => record,
        Err(e) => {
            tracing::error!("Code exchange failed: {}", e);
            return error_response(StatusCode::BAD_GATEWAY, "authorization exchange failed");
        }
    };

    match CredentialManager::derive_user_id(&record) {
        Ok(user_id) => Json(json!({
            "message": "Authorization successful",
            "user_id": user_id,
        }))
        .into_response(),
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

/// Serves one chat turn
async fn chat(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ChatRequest>,
) -> Response {
    if request.query.trim().is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "query must not be empty");
    }

    let record = match state.credentials.stored_record() {
        Ok(Some(record)) => record,
        Ok(None) => {
            return (
                StatusCode::UNAUTHORIZED,
                Json(json!({
                    "error": "No valid token available. Please authorize first",
                    "authorize_url": "/auth/authorize",
                })),
            )
                .into_response()
        }
        Err(e) => return error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    };
    let user_id = match CredentialManager::derive_user_id(&record) {
        Ok(user_id) => user_id,
        Err(e) => return error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    };

    match state.orchestrator.run(&user_id, &request.query).await {
        Ok(outcome) => Json(ChatResponse {
            message_id: outcome.message_id,
            response: outcome.response,
            status: outcome.status,
            react_cycles: outcome.react_cycles,
            tokens_used: outcome.tokens_used,
            tool_calls: outcome.tool_calls,
            response_time_seconds: outcome.response_time_seconds,
        })
        .into_response(),
        Err(e) => {
            tracing::error!("Run failed: {}", e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(json!({ "error": message.into() }))).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{TokenRecord, TokenStore};
    use crate::providers::{CompletionResponse, Message, Provider, ToolChoice};
    use crate::recorder::NoopRecorder;
    use crate::session::SessionStore;
    use crate::tools::{Tool, ToolCatalog, ToolExecutor, ToolResult};
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::Request;
    use std::time::Duration;
    use tower::ServiceExt;

    struct CannedProvider;

    #[async_trait]
    impl Provider for CannedProvider {
        async fn complete(
            &self,
            _messages: &[Message],
            _tools: &[serde_json::Value],
            _tool_choice: ToolChoice,
        ) -> Result<CompletionResponse> {
            Ok(CompletionResponse::new(Message::assistant("canned answer")))
        }

        fn model(&self) -> String {
            "canned".to_string()
        }
    }

    struct NoopTool;

    #[async_trait]
    impl ToolExecutor for NoopTool {
        async fn execute(&self, _args: serde_json::Value) -> Result<ToolResult> {
            Ok(ToolResult::success(json!({})))
        }
    }

    fn state(tmp: &tempfile::TempDir, with_token: bool) -> Arc<AppState> {
        let store = TokenStore::new(tmp.path().join("token.json"));
        if with_token {
            store
                .save(&TokenRecord {
                    access_token: "access".to_string(),
                    refresh_token: Some("refresh".to_string()),
                    expires_in: Some(1800),
                    expires_at: Some(chrono::Utc::now().timestamp() as f64 + 1800.0),
                    token_type: None,
                    scope: None,
                })
                .unwrap();
        }
        let credentials = Arc::new(
            CredentialManager::new(
                store,
                "http://localhost:1/oauth/v1/token",
                "client",
                "secret",
                "http://localhost:8000/auth/callback",
            )
            .unwrap(),
        );
        let catalog = Arc::new(ToolCatalog::from_entries(vec![(
            Tool {
                name: "get_contacts".to_string(),
                description: "test".to_string(),
                parameters: json!({ "type": "object", "properties": {} }),
            },
            Arc::new(NoopTool) as Arc<dyn ToolExecutor>,
        )]));
        let sessions = Arc::new(
            SessionStore::new(
                tmp.path().join("sessions.db"),
                Duration::from_secs(3600),
                "seed",
            )
            .unwrap(),
        );
        let orchestrator = Orchestrator::new(
            Arc::new(CannedProvider),
            catalog,
            sessions,
            Arc::new(NoopRecorder),
            5,
            Duration::from_secs(60),
        );
        Arc::new(AppState {
            orchestrator,
            credentials,
            authorize_url: "https://app.example.com/oauth/authorize".to_string(),
            client_id: "client".to_string(),
            redirect_uri: "http://localhost:8000/auth/callback".to_string(),
            scopes: "crm.objects.contacts.read oauth".to_string(),
        })
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let tmp = tempfile::tempdir().unwrap();
        let response = router(state(&tmp, false))
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["status"], "ok");
    }

    #[tokio::test]
    async fn test_authorize_redirects_with_oauth_params() {
        let tmp = tempfile::tempdir().unwrap();
        let response = router(state(&tmp, false))
            .oneshot(Request::get("/auth/authorize").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
        let location = response.headers()["location"].to_str().unwrap();
        assert!(location.starts_with("https://app.example.com/oauth/authorize?"));
        assert!(location.contains("client_id=client"));
        assert!(location.contains("response_type=code"));
        assert!(location.contains("scope="));
    }

    #[tokio::test]
    async fn test_callback_without_code_is_bad_request() {
        let tmp = tempfile::tempdir().unwrap();
        let response = router(state(&tmp, false))
            .oneshot(Request::get("/auth/callback").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_chat_without_credential_points_at_authorize() {
        let tmp = tempfile::tempdir().unwrap();
        let response = router(state(&tmp, false))
            .oneshot(
                Request::post("/api/v1/agent/chat")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"query":"hi"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let body = body_json(response).await;
        assert_eq!(body["authorize_url"], "/auth/authorize");
    }

    #[tokio::test]
    async fn test_chat_rejects_empty_query() {
        let tmp = tempfile::tempdir().unwrap();
        let response = router(state(&tmp, true))
            .oneshot(
                Request::post("/api/v1/agent/chat")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"query":"   "}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_chat_happy_path() {
        let tmp = tempfile::tempdir().unwrap();
        let response = router(state(&tmp, true))
            .oneshot(
                Request::post("/api/v1/agent/chat")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"query":"hello"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["response"], "canned answer");
        assert_eq!(body["status"], "completed");
        assert_eq!(body["react_cycles"], 1);
        assert_eq!(body["tool_calls"], 0);
    }
}
