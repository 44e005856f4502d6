//! CRM contact tools
//!
//! All five contact tools share one [`CrmClient`], which owns bearer-token
//! injection and the single refresh-and-retry on a 401. Upstream failures
//! become [`ToolResult::Error`] payloads for the model, never `Err`.

use async_trait::async_trait;
use reqwest::Method;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

use crate::auth::CredentialManager;
use crate::error::{AttacheError, Result};
use crate::tools::gate::plausible_identifier;
use crate::tools::{ToolExecutor, ToolResult};

/// Error message returned when no usable credential exists
pub const AUTHORIZE_FIRST: &str = "No valid token available. Please authorize first";

const CONTACTS_PATH: &str = "/crm/v3/objects/contacts";
const CONTACT_PROPERTIES: [&str; 5] = ["email", "firstname", "lastname", "phone", "company"];

/// Hard ceiling on pagination follow-ups for a single get_contacts call
const MAX_CONTACT_PAGES: usize = 10;
const PAGE_SIZE: usize = 100;

// ---------------------------------------------------------------------------
// CrmClient
// ---------------------------------------------------------------------------

/// Outcome of one authenticated CRM request
enum CrmCall {
    /// Upstream returned 2xx
    Success { body: Value },
    /// The request could not or should not proceed; payload for the model
    Rejected(ToolResult),
}

/// Authenticated HTTP client for the CRM API
///
/// A 401 response triggers exactly one forced refresh followed by one
/// retry; a second 401 is reported upstream like any other failure status.
pub struct CrmClient {
    http: reqwest::Client,
    base_url: String,
    credentials: Arc<CredentialManager>,
}

impl CrmClient {
    /// Creates a client for the CRM API at `base_url`
    pub fn new(
        base_url: impl Into<String>,
        credentials: Arc<CredentialManager>,
        timeout_secs: u64,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| AttacheError::Tool(format!("failed to create HTTP client: {}", e)))?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            credentials,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn send(
        &self,
        method: Method,
        url: &str,
        body: Option<&Value>,
        token: &str,
    ) -> Result<reqwest::Response> {
        let mut request = self.http.request(method, url).bearer_auth(token);
        if let Some(body) = body {
            request = request.json(body);
        }
        Ok(request.send().await?)
    }

    /// Issues an authenticated request against an absolute URL
    async fn request(&self, method: Method, url: &str, body: Option<&Value>) -> Result<CrmCall> {
        let token = match self.credentials.get_valid_token().await? {
            Some(token) => token,
            None => return Ok(CrmCall::Rejected(ToolResult::error(AUTHORIZE_FIRST))),
        };

        let mut response = self.send(method.clone(), url, body, &token).await?;

        if response.status() == reqwest::StatusCode::UNAUTHORIZED {
            tracing::warn!("CRM rejected access token, forcing refresh");
            let renewed = match self.credentials.refresh_rejected(&token).await? {
                Some(record) => record,
                None => return Ok(CrmCall::Rejected(ToolResult::error(AUTHORIZE_FIRST))),
            };
            response = self.send(method, url, body, &renewed.access_token).await?;
        }

        let status = response.status().as_u16();
        let text = response.text().await.unwrap_or_default();

        if !(200..300).contains(&status) {
            tracing::warn!("CRM request failed with status {}: {}", status, text);
            return Ok(CrmCall::Rejected(ToolResult::upstream_error(status, text)));
        }

        let body = if text.is_empty() {
            json!({})
        } else {
            serde_json::from_str(&text).unwrap_or(Value::String(text))
        };
        Ok(CrmCall::Success { body })
    }
}

// ---------------------------------------------------------------------------
// Argument types
// ---------------------------------------------------------------------------

/// Contact fields accepted by create_contact
#[derive(Debug, Deserialize)]
pub struct ContactProperties {
    pub email: String,
    #[serde(default)]
    pub firstname: Option<String>,
    #[serde(default)]
    pub lastname: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub company: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GetContactsArgs {
    /// Optional cap on the number of contacts returned
    #[serde(default)]
    limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct UpdateContactArgs {
    contact_id: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    firstname: Option<String>,
    #[serde(default)]
    lastname: Option<String>,
    #[serde(default)]
    phone: Option<String>,
    #[serde(default)]
    company: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DeleteContactArgs {
    contact_id: String,
}

#[derive(Debug, Deserialize)]
struct SearchArgs {
    identifier: String,
}

fn parse_args<T: serde::de::DeserializeOwned>(tool: &str, args: Value) -> std::result::Result<T, ToolResult> {
    serde_json::from_value(args)
        .map_err(|e| ToolResult::error(format!("invalid arguments for '{}': {}", tool, e)))
}

fn insert_if_some(properties: &mut serde_json::Map<String, Value>, key: &str, value: Option<String>) {
    if let Some(value) = value {
        properties.insert(key.to_string(), Value::String(value));
    }
}

// ---------------------------------------------------------------------------
// Executors
// ---------------------------------------------------------------------------

/// Lists contacts, following pagination up to a hard page ceiling
pub struct GetContactsTool {
    client: Arc<CrmClient>,
}

impl GetContactsTool {
    pub fn new(client: Arc<CrmClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ToolExecutor for GetContactsTool {
    async fn execute(&self, args: Value) -> Result<ToolResult> {
        let args: GetContactsArgs = match parse_args("get_contacts", args) {
            Ok(args) => args,
            Err(result) => return Ok(result),
        };

        let mut contacts: Vec<Value> = Vec::new();
        let mut next_url = format!(
            "{}?limit={}&properties={}",
            self.client.url(CONTACTS_PATH),
            PAGE_SIZE,
            CONTACT_PROPERTIES.join(",")
        );

        for _page in 0..MAX_CONTACT_PAGES {
            let body = match self.client.request(Method::GET, &next_url, None).await? {
                CrmCall::Success { body } => body,
                CrmCall::Rejected(result) => return Ok(result),
            };

            if let Some(results) = body["results"].as_array() {
                contacts.extend(results.iter().cloned());
            }

            if let Some(limit) = args.limit {
                if contacts.len() >= limit {
                    contacts.truncate(limit);
                    break;
                }
            }

            match body["paging"]["next"]["link"].as_str() {
                Some(link) => next_url = link.to_string(),
                None => break,
            }
        }

        Ok(ToolResult::success(json!({
            "total": contacts.len(),
            "contacts": contacts,
        })))
    }
}

/// Creates a contact; email is mandatory
pub struct CreateContactTool {
    client: Arc<CrmClient>,
}

impl CreateContactTool {
    pub fn new(client: Arc<CrmClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ToolExecutor for CreateContactTool {
    async fn execute(&self, args: Value) -> Result<ToolResult> {
        let args: ContactProperties = match parse_args("create_contact", args) {
            Ok(args) => args,
            Err(result) => return Ok(result),
        };
        if args.email.trim().is_empty() {
            return Ok(ToolResult::error("email is required to create a contact"));
        }

        let mut properties = serde_json::Map::new();
        properties.insert("email".to_string(), Value::String(args.email));
        insert_if_some(&mut properties, "firstname", args.firstname);
        insert_if_some(&mut properties, "lastname", args.lastname);
        insert_if_some(&mut properties, "phone", args.phone);
        insert_if_some(&mut properties, "company", args.company);

        let payload = json!({ "properties": properties });
        let url = self.client.url(CONTACTS_PATH);
        match self.client.request(Method::POST, &url, Some(&payload)).await? {
            CrmCall::Success { body } => Ok(ToolResult::success(body)),
            CrmCall::Rejected(result) => Ok(result),
        }
    }
}

/// Updates fields on an existing contact
pub struct UpdateContactTool {
    client: Arc<CrmClient>,
}

impl UpdateContactTool {
    pub fn new(client: Arc<CrmClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ToolExecutor for UpdateContactTool {
    async fn execute(&self, args: Value) -> Result<ToolResult> {
        let args: UpdateContactArgs = match parse_args("update_contact", args) {
            Ok(args) => args,
            Err(result) => return Ok(result),
        };

        // contact_id addresses the row; it never goes into the payload.
        let mut properties = serde_json::Map::new();
        insert_if_some(&mut properties, "email", args.email);
        insert_if_some(&mut properties, "firstname", args.firstname);
        insert_if_some(&mut properties, "lastname", args.lastname);
        insert_if_some(&mut properties, "phone", args.phone);
        insert_if_some(&mut properties, "company", args.company);
        if properties.is_empty() {
            return Ok(ToolResult::error("no properties to update"));
        }

        let payload = json!({ "properties": properties });
        let url = format!("{}/{}", self.client.url(CONTACTS_PATH), args.contact_id);
        match self.client.request(Method::PATCH, &url, Some(&payload)).await? {
            CrmCall::Success { body } => Ok(ToolResult::success(body)),
            CrmCall::Rejected(result) => Ok(result),
        }
    }
}

/// Deletes a contact by id
pub struct DeleteContactTool {
    client: Arc<CrmClient>,
}

impl DeleteContactTool {
    pub fn new(client: Arc<CrmClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ToolExecutor for DeleteContactTool {
    async fn execute(&self, args: Value) -> Result<ToolResult> {
        let args: DeleteContactArgs = match parse_args("delete_contact", args) {
            Ok(args) => args,
            Err(result) => return Ok(result),
        };

        let url = format!("{}/{}", self.client.url(CONTACTS_PATH), args.contact_id);
        match self.client.request(Method::DELETE, &url, None).await? {
            // The CRM answers 204 with an empty body; report something usable.
            CrmCall::Success { .. } => Ok(ToolResult::success(json!({
                "message": "contact deleted",
                "contact_id": args.contact_id,
            }))),
            CrmCall::Rejected(result) => Ok(result),
        }
    }
}

/// Looks up a contact by email address or phone number
pub struct SearchByIdentifierTool {
    client: Arc<CrmClient>,
}

impl SearchByIdentifierTool {
    pub fn new(client: Arc<CrmClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ToolExecutor for SearchByIdentifierTool {
    async fn execute(&self, args: Value) -> Result<ToolResult> {
        let args: SearchArgs = match parse_args("search_by_identifier", args) {
            Ok(args) => args,
            Err(result) => return Ok(result),
        };

        let identifier = args.identifier.trim();
        if !plausible_identifier(identifier) {
            return Ok(ToolResult::error(
                "identifier must be an email address or a phone number",
            ));
        }
        let property = if identifier.contains('@') {
            "email"
        } else {
            "phone"
        };

        let payload = json!({
            "filterGroups": [{
                "filters": [{
                    "propertyName": property,
                    "operator": "EQ",
                    "value": identifier,
                }],
            }],
            "properties": CONTACT_PROPERTIES,
        });
        let url = format!("{}/search", self.client.url(CONTACTS_PATH));
        match self.client.request(Method::POST, &url, Some(&payload)).await? {
            CrmCall::Success { body } => Ok(ToolResult::success(body)),
            CrmCall::Rejected(result) => Ok(result),
        }
    }
}
