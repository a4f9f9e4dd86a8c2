//! # strongbox-core
//!
//! Core types, configuration, and services for the Strongbox secret client.
//!
//! This crate provides the pieces shared by the RPC client and the CLI:
//!
//! - **Domain model**: secret types, secret metadata, buffered and streamed secrets
//! - **Errors**: the stable error taxonomy surfaced to every caller
//! - **Call context**: cancellation and deadlines carried by every operation
//! - **Configuration**: loading and validation of client settings
//! - **Tokens**: the bearer token accessor and its file-backed store
//! - **Services**: the dispatch layer the presentation code talks to

pub mod config;
pub mod context;
pub mod env;
pub mod error;
pub mod paths;
pub mod secret;
pub mod service;
pub mod token;
pub mod types;

// Re-exports for convenience
pub use config::{Config, LogLevel};
pub use context::{CallContext, Interrupted};
pub use error::{ConfigError, KeeperError, Result, TokenError};
pub use secret::AuthToken;
pub use service::{AuthApi, AuthService, SecretApi, SecretService};
pub use token::{FileTokenStore, MemoryTokenStore, TokenStore};
pub use types::*;
