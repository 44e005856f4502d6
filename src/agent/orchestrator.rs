//! The reason/act loop
//!
//! One [`Orchestrator::run`] call serves one user query. The loop holds two
//! budgets, a cycle cap and a wall-clock limit; hitting either forces one
//! last model call with tool use disabled so the user still gets prose
//! instead of a dangling tool request. Tool failures are payloads fed back
//! to the model; only a failed model call aborts the run.

use chrono::Utc;
use serde_json::json;
use std::sync::Arc;
use std::time::{Duration, Instant};
use uuid::Uuid;

use crate::agent::trace::{CycleRecord, RunStatus, RunSummary, ToolInvocation};
use crate::error::Result;
use crate::providers::{Message, Provider, ToolChoice};
use crate::recorder::UsageRecorder;
use crate::session::SessionStore;
use crate::tools::ToolCatalog;

/// Answer returned when the run aborts on a model-call failure
const APOLOGY: &str =
    "I'm sorry, I ran into a problem while processing your request. Please try again.";

/// What the caller gets back from one run
#[derive(Debug, Clone)]
pub struct RunOutcome {
    /// Unique id of the run, matching the recorded summary
    pub message_id: String,
    /// Final answer text
    pub response: String,
    /// Terminal status of the run
    pub status: RunStatus,
    /// Number of cycles executed
    pub react_cycles: u32,
    /// Token total across the run's model calls
    pub tokens_used: u64,
    /// Tool invocations dispatched across the run
    pub tool_calls: u64,
    /// End-to-end wall-clock duration
    pub response_time_seconds: f64,
}

/// Drives the loop for every incoming chat request
pub struct Orchestrator {
    provider: Arc<dyn Provider>,
    catalog: Arc<ToolCatalog>,
    sessions: Arc<SessionStore>,
    recorder: Arc<dyn UsageRecorder>,
    max_cycles: u32,
    time_budget: Duration,
}

impl Orchestrator {
    /// Creates an orchestrator over the given components
    ///
    /// # Arguments
    ///
    /// * `max_cycles` - Cycle cap per run; the forced closing call is extra
    /// * `time_budget` - Wall-clock limit, checked at the top of each cycle
    pub fn new(
        provider: Arc<dyn Provider>,
        catalog: Arc<ToolCatalog>,
        sessions: Arc<SessionStore>,
        recorder: Arc<dyn UsageRecorder>,
        max_cycles: u32,
        time_budget: Duration,
    ) -> Self {
        Self {
            provider,
            catalog,
            sessions,
            recorder,
            max_cycles,
            time_budget,
        }
    }

    /// Runs one query to completion
    ///
    /// Loads the user's transcript, appends the query, then cycles until the
    /// model answers in plain text or a budget runs out. The transcript is
    /// persisted after every append, so a crash mid-run loses at most the
    /// in-flight cycle.
    ///
    /// # Errors
    ///
    /// Returns an error only for session-store failures; model and tool
    /// failures are folded into the outcome's status.
    pub async fn run(&self, user_id: &str, query: &str) -> Result<RunOutcome> {
        let message_id = Uuid::new_v4().to_string();
        let started = Instant::now();
        tracing::info!("Starting run {} for {}", message_id, user_id);

        let mut messages = self.sessions.load(user_id)?;
        messages.push(Message::user(query));
        self.sessions.save(user_id, &messages)?;

        let definitions = self.catalog.definitions();
        let mut cycles: Vec<CycleRecord> = Vec::new();
        let mut total_tokens: u64 = 0;
        let mut total_tool_calls: u64 = 0;

        let (response, status, error) = loop {
            if cycles.len() as u32 >= self.max_cycles {
                tracing::warn!("Cycle cap reached for run {}", message_id);
                break self
                    .forced_close(user_id, &mut messages, &mut cycles, &mut total_tokens)
                    .await?;
            }
            if started.elapsed() >= self.time_budget {
                if cycles.is_empty() {
                    break (
                        APOLOGY.to_string(),
                        RunStatus::Error,
                        Some("time budget exhausted before the first model call".to_string()),
                    );
                }
                tracing::warn!("Time budget exhausted for run {}", message_id);
                break self
                    .forced_close(user_id, &mut messages, &mut cycles, &mut total_tokens)
                    .await?;
            }

            let response = match self
                .provider
                .complete(&messages, &definitions, ToolChoice::Auto)
                .await
            {
                Ok(response) => response,
                Err(e) => {
                    tracing::error!("Model call failed for run {}: {}", message_id, e);
                    messages.push(Message::assistant(APOLOGY));
                    self.sessions.save(user_id, &messages)?;
                    break (APOLOGY.to_string(), RunStatus::Error, Some(e.to_string()));
                }
            };

            let cycle_tokens = response.usage.map(|u| u.total_tokens as u64).unwrap_or(0);
            total_tokens += cycle_tokens;
            let mut cycle = CycleRecord {
                cycle_number: cycles.len() as u32 + 1,
                timestamp: Utc::now(),
                response_text: response.message.content.clone(),
                tool_invocations: Vec::new(),
                tokens_used: cycle_tokens,
            };

            messages.push(response.message.clone());
            self.sessions.save(user_id, &messages)?;

            let tool_calls = match &response.message.tool_calls {
                Some(calls) if !calls.is_empty() => calls.clone(),
                _ => {
                    let answer = response.message.content.unwrap_or_default();
                    cycles.push(cycle);
                    break (answer, RunStatus::Completed, None);
                }
            };

            for call in tool_calls {
                if !self.catalog.contains(&call.function.name) {
                    tracing::warn!("Skipping unknown tool '{}'", call.function.name);
                    continue;
                }
                let (result, elapsed) = self
                    .catalog
                    .invoke(&call.function.name, &call.function.arguments)
                    .await?;
                tracing::debug!(
                    "Tool {} finished with {} in {:?}",
                    call.function.name,
                    result.status(),
                    elapsed
                );

                messages.push(Message::tool_result(&call.id, result.to_json()));
                self.sessions.save(user_id, &messages)?;

                total_tool_calls += 1;
                cycle.tool_invocations.push(ToolInvocation {
                    tool_call_id: call.id,
                    function_name: call.function.name,
                    arguments: serde_json::from_str(&call.function.arguments)
                        .unwrap_or_else(|_| json!({})),
                    result: result.payload().clone(),
                    status: result.status().to_string(),
                    execution_time_ms: elapsed.as_millis() as u64,
                    timestamp: Utc::now(),
                });
            }
            cycles.push(cycle);
        };

        let summary = RunSummary {
            message_id: message_id.clone(),
            user_id: user_id.to_string(),
            user_query: query.to_string(),
            ai_response: response.clone(),
            total_react_cycles: cycles.len() as u32,
            react_cycles: cycles,
            total_tokens,
            total_tool_calls,
            response_time_seconds: started.elapsed().as_secs_f64(),
            model: self.provider.model(),
            status,
            error,
        };
        // Recording is best-effort; the answer still goes out.
        if let Err(e) = self.recorder.record(&summary).await {
            tracing::error!("Failed to record run {}: {}", message_id, e);
        }

        Ok(RunOutcome {
            message_id,
            response,
            status,
            react_cycles: summary.total_react_cycles,
            tokens_used: total_tokens,
            tool_calls: total_tool_calls,
            response_time_seconds: summary.response_time_seconds,
        })
    }

    /// One final model call with tool use disabled
    ///
    /// Used when a budget runs out while the model is still requesting
    /// tools. The model must summarize what it has so far.
    async fn forced_close(
        &self,
        user_id: &str,
        messages: &mut Vec<Message>,
        cycles: &mut Vec<CycleRecord>,
        total_tokens: &mut u64,
    ) -> Result<(String, RunStatus, Option<String>)> {
        let response = match self
            .provider
            .complete(messages, &[], ToolChoice::None)
            .await
        {
            Ok(response) => response,
            Err(e) => {
                tracing::error!("Forced closing call failed: {}", e);
                messages.push(Message::assistant(APOLOGY));
                self.sessions.save(user_id, messages)?;
                return Ok((APOLOGY.to_string(), RunStatus::Error, Some(e.to_string())));
            }
        };

        let cycle_tokens = response.usage.map(|u| u.total_tokens as u64).unwrap_or(0);
        *total_tokens += cycle_tokens;
        cycles.push(CycleRecord {
            cycle_number: cycles.len() as u32 + 1,
            timestamp: Utc::now(),
            response_text: response.message.content.clone(),
            tool_invocations: Vec::new(),
            tokens_used: cycle_tokens,
        });

        let answer = response.message.content.clone().unwrap_or_default();
        messages.push(Message::assistant(answer.clone()));
        self.sessions.save(user_id, messages)?;

        Ok((answer, RunStatus::Capped, None))
    }
}
