//! Tool catalog for Attache
//!
//! Tools are declared by JSON descriptor files loaded at startup and bound
//! to executor implementations by name. The catalog is immutable after
//! startup and safe for unsynchronized concurrent reads.
//!
//! Every invocation produces an explicit two-variant [`ToolResult`]; tool
//! failures are data fed back to the model, never control flow.

pub mod contacts;
pub mod gate;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use crate::error::{AttacheError, Result};

/// Tool descriptor as declared in a descriptor file
///
/// Follows the OpenAI function-calling format: `{name, description,
/// parameters}` with a JSON-schema-like parameters object.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tool {
    /// Name of the tool
    pub name: String,
    /// Description shown to the model
    pub description: String,
    /// JSON schema for the tool's arguments
    pub parameters: serde_json::Value,
}

/// Outcome of one tool invocation
///
/// The two variants replace exception-as-control-flow: the orchestrator
/// inspects the variant, and either payload is JSON-encoded into the tool
/// message fed back to the model.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolResult {
    /// The tool ran and produced a payload
    Success(serde_json::Value),
    /// The tool was rejected or failed; the payload describes why
    Error(serde_json::Value),
}

impl ToolResult {
    /// Creates a success result from any serializable payload
    pub fn success(payload: serde_json::Value) -> Self {
        Self::Success(payload)
    }

    /// Creates an error result with a plain message
    ///
    /// # Examples
    ///
    /// ```
    /// use attache::tools::ToolResult;
    ///
    /// let result = ToolResult::error("No valid token available. Please authorize first");
    /// assert!(!result.is_success());
    /// ```
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error(serde_json::json!({ "error": message.into() }))
    }

    /// Creates an error result carrying upstream status and details
    pub fn upstream_error(status: u16, details: impl Into<String>) -> Self {
        Self::Error(serde_json::json!({ "error": status, "details": details.into() }))
    }

    /// Whether this is a success result
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    /// Status label for invocation records
    pub fn status(&self) -> &'static str {
        if self.is_success() {
            "success"
        } else {
            "error"
        }
    }

    /// The payload, regardless of variant
    pub fn payload(&self) -> &serde_json::Value {
        match self {
            Self::Success(v) | Self::Error(v) => v,
        }
    }

    /// JSON-encodes the payload for the tool message content
    pub fn to_json(&self) -> String {
        self.payload().to_string()
    }
}

/// Trait implemented by every tool
///
/// Executors deserialize their own typed argument structs from the raw
/// JSON value; an argument that does not fit the schema becomes a
/// [`ToolResult::Error`], not an `Err`. An `Err` return is reserved for
/// unexpected internal failures and is converted to an error result by the
/// catalog.
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    /// Executes the tool with the given arguments
    async fn execute(&self, args: serde_json::Value) -> Result<ToolResult>;
}

struct CatalogEntry {
    descriptor: Tool,
    executor: Arc<dyn ToolExecutor>,
}

/// Immutable registry mapping tool names to descriptors and executors
pub struct ToolCatalog {
    entries: HashMap<String, CatalogEntry>,
}

impl ToolCatalog {
    /// Builds a catalog from a descriptor directory and executor bindings
    ///
    /// Reads every `*.json` file in `descriptor_dir` as a [`Tool`]
    /// descriptor and binds it to the executor registered under the same
    /// name.
    ///
    /// # Errors
    ///
    /// Returns `AttacheError::Config` when a descriptor is malformed or
    /// has no matching executor, or when the directory yields no
    /// descriptors at all.
    pub fn from_descriptor_dir(
        descriptor_dir: &Path,
        mut executors: HashMap<String, Arc<dyn ToolExecutor>>,
    ) -> Result<Self> {
        let mut entries = HashMap::new();

        for entry in std::fs::read_dir(descriptor_dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let json = std::fs::read_to_string(&path)?;
            let descriptor: Tool = serde_json::from_str(&json).map_err(|e| {
                AttacheError::Config(format!("malformed descriptor {}: {}", path.display(), e))
            })?;
            let executor = executors.remove(&descriptor.name).ok_or_else(|| {
                AttacheError::Config(format!("no executor bound for tool '{}'", descriptor.name))
            })?;
            tracing::debug!("Registered tool: {}", descriptor.name);
            entries.insert(
                descriptor.name.clone(),
                CatalogEntry {
                    descriptor,
                    executor,
                },
            );
        }

        if entries.is_empty() {
            return Err(AttacheError::Config(format!(
                "no tool descriptors found in {}",
                descriptor_dir.display()
            ))
            .into());
        }

        Ok(Self { entries })
    }

    /// Builds a catalog directly from (descriptor, executor) pairs
    ///
    /// Used by tests and embedded setups that do not read descriptor files.
    pub fn from_entries(pairs: Vec<(Tool, Arc<dyn ToolExecutor>)>) -> Self {
        let entries = pairs
            .into_iter()
            .map(|(descriptor, executor)| {
                (
                    descriptor.name.clone(),
                    CatalogEntry {
                        descriptor,
                        executor,
                    },
                )
            })
            .collect();
        Self { entries }
    }

    /// Whether a tool with the given name exists
    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Number of registered tools
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the catalog is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All tool definitions, for the provider call
    pub fn definitions(&self) -> Vec<serde_json::Value> {
        let mut definitions: Vec<_> = self
            .entries
            .values()
            .map(|entry| serde_json::to_value(&entry.descriptor).unwrap_or_default())
            .collect();
        // Stable order keeps provider requests reproducible.
        definitions.sort_by(|a, b| {
            a["name"]
                .as_str()
                .unwrap_or_default()
                .cmp(b["name"].as_str().unwrap_or_default())
        });
        definitions
    }

    /// Invokes a tool with the raw argument string from the model
    ///
    /// Raw arguments of `"null"` or empty normalize to `{}` before
    /// dispatch. Unparseable argument JSON and executor `Err` returns both
    /// become [`ToolResult::Error`]. Returns the result together with the
    /// execution time.
    ///
    /// # Errors
    ///
    /// Returns `AttacheError::Tool` only when the tool name is unknown;
    /// the caller decides whether to skip or abort.
    pub async fn invoke(
        &self,
        name: &str,
        raw_args: &str,
    ) -> Result<(ToolResult, std::time::Duration)> {
        let entry = self
            .entries
            .get(name)
            .ok_or_else(|| AttacheError::Tool(format!("tool not found: {}", name)))?;

        let started = Instant::now();

        let args: serde_json::Value = if raw_args.trim().is_empty() || raw_args.trim() == "null" {
            serde_json::json!({})
        } else {
            match serde_json::from_str(raw_args) {
                Ok(value) => value,
                Err(e) => {
                    return Ok((
                        ToolResult::error(format!("invalid arguments for '{}': {}", name, e)),
                        started.elapsed(),
                    ))
                }
            }
        };

        let result = match entry.executor.execute(args).await {
            Ok(result) => result,
            Err(e) => ToolResult::error(e.to_string()),
        };

        Ok((result, started.elapsed()))
    }
}
