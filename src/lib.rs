//! # Attache
//!
//! Conversational CRM assistant service. One HTTP endpoint accepts a
//! natural-language query, a bounded reason/act loop lets the model call
//! CRM contact tools, and the final answer goes back to the caller.
//!
//! ## Architecture
//!
//! - [`agent`] - The loop: cycle and time budgets, tool dispatch, traces
//! - [`auth`] - OAuth token lifecycle: store, refresh, code exchange
//! - [`providers`] - Model backends behind the [`providers::Provider`] trait
//! - [`tools`] - Tool catalog, validation gate, CRM contact tools
//! - [`session`] - Per-user transcripts with TTL
//! - [`recorder`] - Per-run usage records
//! - [`server`] - The axum HTTP surface
//!
//! ## Example
//!
//! ```no_run
//! use attache::config::Config;
//!
//! let config = Config::default();
//! assert_eq!(config.max_cycles, 5);
//! ```

pub mod agent;
pub mod auth;
pub mod config;
pub mod error;
pub mod prompts;
pub mod providers;
pub mod recorder;
pub mod server;
pub mod session;
pub mod tools;

pub use agent::{Orchestrator, RunOutcome, RunStatus};
pub use config::Config;
pub use error::{AttacheError, Result};
