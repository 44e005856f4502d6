//! Agent loop
//!
//! The orchestrator drives the reason/act cycle: it feeds the transcript to
//! the model, dispatches the tool calls the model requests, and stops when
//! the model answers in plain text or a budget runs out. [`trace`] holds the
//! per-run record types the usage recorder persists.

pub mod orchestrator;
pub mod trace;

pub use orchestrator::{Orchestrator, RunOutcome};
pub use trace::{CycleRecord, RunStatus, RunSummary, ToolInvocation};
