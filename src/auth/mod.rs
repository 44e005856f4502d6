//! Credential lifecycle for the shared CRM OAuth token
//!
//! One token record is shared by every request in the process. The
//! [`TokenStore`] persists it on disk; the [`CredentialManager`] owns
//! expiry checking, single-flight refresh, and the authorization-code
//! exchange used by the OAuth callback endpoint.

pub mod credentials;
pub mod token_store;

pub use credentials::CredentialManager;
pub use token_store::{TokenRecord, TokenStore};
