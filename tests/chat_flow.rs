//! End-to-end chat flows: HTTP surface, loop, catalog, CRM client
//!
//! The model is scripted; the CRM is a wiremock server. Everything in
//! between (router, orchestrator, tool catalog, credential manager, session
//! and usage stores) is the real thing.

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::json;
use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tower::ServiceExt;
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use attache::agent::Orchestrator;
use attache::auth::{CredentialManager, TokenRecord, TokenStore};
use attache::providers::{
    CompletionResponse, FunctionCall, Message, Provider, TokenUsage, ToolCall, ToolChoice,
};
use attache::recorder::SqliteUsageRecorder;
use attache::server::{router, AppState};
use attache::session::SessionStore;
use attache::tools::contacts::{
    CreateContactTool, CrmClient, DeleteContactTool, GetContactsTool, SearchByIdentifierTool,
    UpdateContactTool,
};
use attache::tools::{ToolCatalog, ToolExecutor};

/// Replays a fixed sequence of model responses, then plain text
struct ScriptProvider {
    responses: Mutex<VecDeque<CompletionResponse>>,
    calls: AtomicUsize,
}

impl ScriptProvider {
    fn new(responses: Vec<CompletionResponse>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl Provider for ScriptProvider {
    async fn complete(
        &self,
        _messages: &[Message],
        _tools: &[serde_json::Value],
        _tool_choice: ToolChoice,
    ) -> attache::error::Result<CompletionResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| text("done")))
    }

    fn model(&self) -> String {
        "scripted".to_string()
    }
}

/// Requests a tool on every Auto call; answers in text once tools are off
struct LoopingProvider {
    calls: AtomicUsize,
}

#[async_trait]
impl Provider for LoopingProvider {
    async fn complete(
        &self,
        _messages: &[Message],
        _tools: &[serde_json::Value],
        tool_choice: ToolChoice,
    ) -> attache::error::Result<CompletionResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(match tool_choice {
            ToolChoice::Auto => tool_response("call_loop", "get_contacts", "{}"),
            ToolChoice::None => text("Here's what I found so far."),
        })
    }

    fn model(&self) -> String {
        "looping".to_string()
    }
}

fn text(content: &str) -> CompletionResponse {
    CompletionResponse::new(Message::assistant(content)).with_usage(TokenUsage::new(20, 10))
}

fn tool_response(id: &str, name: &str, arguments: &str) -> CompletionResponse {
    CompletionResponse::new(Message::assistant_with_tools(
        None,
        vec![ToolCall {
            id: id.to_string(),
            function: FunctionCall {
                name: name.to_string(),
                arguments: arguments.to_string(),
            },
        }],
    ))
    .with_usage(TokenUsage::new(20, 10))
}

struct Harness {
    state: Arc<AppState>,
    recorder: Arc<SqliteUsageRecorder>,
    user_id: String,
}

fn harness(
    tmp: &tempfile::TempDir,
    crm_server: &MockServer,
    provider: Arc<dyn Provider>,
) -> Harness {
    let store = TokenStore::new(tmp.path().join("token.json"));
    let record = TokenRecord {
        access_token: "crm-access".to_string(),
        refresh_token: Some("refresh-1".to_string()),
        expires_in: Some(1800),
        expires_at: Some(chrono::Utc::now().timestamp() as f64 + 1800.0),
        token_type: Some("bearer".to_string()),
        scope: None,
    };
    store.save(&record).unwrap();
    let user_id = CredentialManager::derive_user_id(&record).unwrap();

    let credentials = Arc::new(
        CredentialManager::new(
            store,
            format!("{}/oauth/v1/token", crm_server.uri()),
            "client",
            "secret",
            "http://localhost:8000/auth/callback",
        )
        .unwrap(),
    );

    let crm = Arc::new(CrmClient::new(crm_server.uri(), Arc::clone(&credentials), 10).unwrap());
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
    // The same descriptor files the binary ships with.
    let descriptor_dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("descriptors");
    let catalog = Arc::new(ToolCatalog::from_descriptor_dir(&descriptor_dir, executors).unwrap());

    let sessions = Arc::new(
        SessionStore::new(
            tmp.path().join("sessions.db"),
            Duration::from_secs(3600),
            attache::prompts::system_prompt(),
        )
        .unwrap(),
    );
    let recorder = Arc::new(SqliteUsageRecorder::new(tmp.path().join("usage.db")).unwrap());

    let orchestrator = Orchestrator::new(
        provider,
        catalog,
        sessions,
        Arc::clone(&recorder) as Arc<dyn attache::recorder::UsageRecorder>,
        5,
        Duration::from_secs(60),
    );

    let state = Arc::new(AppState {
        orchestrator,
        credentials,
        authorize_url: "https://app.example.com/oauth/authorize".to_string(),
        client_id: "client".to_string(),
        redirect_uri: "http://localhost:8000/auth/callback".to_string(),
        scopes: "crm.objects.contacts.read oauth".to_string(),
    });

    Harness {
        state,
        recorder,
        user_id,
    }
}

async fn chat(state: Arc<AppState>, query: &str) -> (StatusCode, serde_json::Value) {
    let response = router(state)
        .oneshot(
            Request::post("/api/v1/agent/chat")
                .header("content-type", "application/json")
                .body(Body::from(json!({ "query": query }).to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

#[tokio::test]
async fn create_without_email_asks_instead_of_calling_the_tool() {
    let crm = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/crm/v3/objects/contacts"))
        .respond_with(ResponseTemplate::new(201))
        .expect(0)
        .mount(&crm)
        .await;

    let tmp = tempfile::tempdir().unwrap();
    let provider = Arc::new(ScriptProvider::new(vec![text(
        "Could you share John's email address? I need it to create the contact.",
    )]));
    let h = harness(&tmp, &crm, provider);

    let (status, body) = chat(Arc::clone(&h.state), "Create a contact for John Doe").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "completed");
    assert!(body["response"].as_str().unwrap().contains("email"));

    let runs = h.recorder.load_for_user(&h.user_id).unwrap();
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].total_tool_calls, 0);
}

#[tokio::test]
async fn create_with_email_invokes_the_tool_exactly_once() {
    let crm = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/crm/v3/objects/contacts"))
        .and(body_json(json!({
            "properties": {
                "email": "john@doe.com",
                "firstname": "John",
                "lastname": "Doe",
            }
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "id": "1001" })))
        .expect(1)
        .mount(&crm)
        .await;

    let tmp = tempfile::tempdir().unwrap();
    let provider = Arc::new(ScriptProvider::new(vec![
        tool_response(
            "call_1",
            "create_contact",
            r#"{"firstname":"John","lastname":"Doe","email":"john@doe.com"}"#,
        ),
        text("Created John Doe (john@doe.com)."),
    ]));
    let h = harness(&tmp, &crm, provider);

    let (status, body) = chat(
        Arc::clone(&h.state),
        "Create a contact for John Doe, email john@doe.com",
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "completed");
    assert!(body["react_cycles"].as_u64().unwrap() <= 2);
    assert_eq!(body["tool_calls"], 1);

    let runs = h.recorder.load_for_user(&h.user_id).unwrap();
    assert_eq!(runs[0].total_tool_calls, 1);
    let invocation = &runs[0].react_cycles[0].tool_invocations[0];
    assert_eq!(invocation.function_name, "create_contact");
    assert_eq!(invocation.status, "success");
}

#[tokio::test]
async fn tool_hungry_model_is_cut_off_at_the_cycle_cap() {
    let crm = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/crm/v3/objects/contacts"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "results": [] })))
        .expect(5)
        .mount(&crm)
        .await;

    let tmp = tempfile::tempdir().unwrap();
    let provider = Arc::new(LoopingProvider {
        calls: AtomicUsize::new(0),
    });
    let h = harness(&tmp, &crm, Arc::clone(&provider) as Arc<dyn Provider>);

    let (status, body) = chat(Arc::clone(&h.state), "keep listing contacts").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "capped");
    // Cap plus exactly one tool-free closing call.
    assert_eq!(provider.calls.load(Ordering::SeqCst), 6);
    assert_eq!(body["response"], "Here's what I found so far.");

    let runs = h.recorder.load_for_user(&h.user_id).unwrap();
    assert_eq!(runs[0].total_react_cycles, 6);
    assert_eq!(runs[0].total_tool_calls, 5);
}

#[tokio::test]
async fn implausible_identifier_never_reaches_the_crm() {
    let crm = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/crm/v3/objects/contacts/search"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&crm)
        .await;

    let tmp = tempfile::tempdir().unwrap();
    let provider = Arc::new(ScriptProvider::new(vec![
        tool_response("call_1", "search_by_identifier", r#"{"identifier":"Taha"}"#),
        text("I need an email address or phone number to look that up."),
    ]));
    let h = harness(&tmp, &crm, provider);

    let (status, body) = chat(Arc::clone(&h.state), "find Taha").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "completed");

    let runs = h.recorder.load_for_user(&h.user_id).unwrap();
    let invocation = &runs[0].react_cycles[0].tool_invocations[0];
    assert_eq!(invocation.status, "error");
}

#[tokio::test]
async fn failing_tool_is_fed_back_and_the_conversation_continues() {
    let crm = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/crm/v3/objects/contacts/9999"))
        .respond_with(ResponseTemplate::new(404).set_body_string("contact not found"))
        .expect(1)
        .mount(&crm)
        .await;

    let tmp = tempfile::tempdir().unwrap();
    let provider = Arc::new(ScriptProvider::new(vec![
        tool_response("call_1", "delete_contact", r#"{"contact_id":"9999"}"#),
        text("That contact doesn't exist anymore."),
    ]));
    let h = harness(&tmp, &crm, provider);

    let (status, body) = chat(Arc::clone(&h.state), "delete contact 9999").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "completed");

    let runs = h.recorder.load_for_user(&h.user_id).unwrap();
    let invocation = &runs[0].react_cycles[0].tool_invocations[0];
    assert_eq!(invocation.status, "error");
    assert_eq!(invocation.result["error"], 404);
}

#[tokio::test]
async fn transcript_survives_across_requests() {
    let crm = MockServer::start().await;
    let tmp = tempfile::tempdir().unwrap();
    let provider = Arc::new(ScriptProvider::new(vec![
        text("Nice to meet you, Alice."),
        text("Your name is Alice."),
    ]));
    let h = harness(&tmp, &crm, provider);

    let (_, first) = chat(Arc::clone(&h.state), "My name is Alice").await;
    assert_eq!(first["status"], "completed");

    let (_, second) = chat(Arc::clone(&h.state), "What's my name?").await;
    assert_eq!(second["response"], "Your name is Alice.");

    let runs = h.recorder.load_for_user(&h.user_id).unwrap();
    assert_eq!(runs.len(), 2);
}
