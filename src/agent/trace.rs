//! Per-run trace structures
//!
//! Every run produces a [`RunSummary`]: the user-visible outcome plus a
//! cycle-by-cycle trace of model responses and tool invocations. The
//! summary is what the usage recorder persists.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One tool call executed during a cycle
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolInvocation {
    /// Correlation id from the model's tool call
    pub tool_call_id: String,
    /// Name of the invoked tool
    pub function_name: String,
    /// Arguments as dispatched, after normalization
    pub arguments: serde_json::Value,
    /// Result payload fed back to the model
    pub result: serde_json::Value,
    /// `"success"` or `"error"`
    pub status: String,
    /// Wall-clock execution time of the tool
    pub execution_time_ms: u64,
    /// When the invocation completed
    pub timestamp: DateTime<Utc>,
}

/// One reason/act cycle: a model response and the tool calls it requested
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CycleRecord {
    /// 1-based cycle number within the run
    pub cycle_number: u32,
    /// When the model response arrived
    pub timestamp: DateTime<Utc>,
    /// Text content of the model response, if any
    pub response_text: Option<String>,
    /// Tool invocations dispatched for this cycle, in request order
    pub tool_invocations: Vec<ToolInvocation>,
    /// Tokens consumed by this cycle's model call
    pub tokens_used: u64,
}

/// Terminal status of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    /// The model produced a final answer within the cycle budget
    Completed,
    /// The cycle or time budget ran out and a forced closing answer was used
    Capped,
    /// The run aborted; `error` holds the cause
    Error,
}

/// Complete record of one chat run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    /// Unique id for this run
    pub message_id: String,
    /// Owner of the session the run executed in
    pub user_id: String,
    /// The query that started the run
    pub user_query: String,
    /// Final answer returned to the user
    pub ai_response: String,
    /// Cycle-by-cycle trace
    pub react_cycles: Vec<CycleRecord>,
    /// Token total across every model call in the run
    pub total_tokens: u64,
    /// Tool invocations across every cycle
    pub total_tool_calls: u64,
    /// Number of cycles executed
    pub total_react_cycles: u32,
    /// End-to-end wall-clock duration
    pub response_time_seconds: f64,
    /// Model that served the run
    pub model: String,
    /// Terminal status
    pub status: RunStatus,
    /// Cause of failure when `status` is `error`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}
