//! Error types for Strongbox core.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

use crate::context::Interrupted;

/// Core result type alias.
pub type Result<T> = std::result::Result<T, KeeperError>;

/// The error taxonomy every secret and auth operation reports.
///
/// Transport status codes are translated into these values exactly once, where
/// a response is received. Nothing above the client layer sees a raw code.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KeeperError {
    /// No credential is available, or the backend rejected it.
    #[error("Unauthenticated: {0}")]
    Unauthenticated(String),

    /// Registration or creation collided with an existing entry.
    #[error("Already exists: {0}")]
    AlreadyExists(String),

    /// The request was malformed, e.g. bad credentials on login.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Unknown user, secret, or secret version.
    #[error("Not found: {0}")]
    NotFound(String),

    /// A transfer stream broke the `[Info][Data]*` framing.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Connection, cancellation, or I/O failure.
    #[error("Transport error: {0}")]
    Transport(String),
}

impl KeeperError {
    /// Short, stable name of the error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Unauthenticated(_) => "unauthenticated",
            Self::AlreadyExists(_) => "already_exists",
            Self::InvalidArgument(_) => "invalid_argument",
            Self::NotFound(_) => "not_found",
            Self::Protocol(_) => "protocol",
            Self::Transport(_) => "transport",
        }
    }

    /// The detail message without the kind prefix.
    pub fn message(&self) -> &str {
        match self {
            Self::Unauthenticated(m)
            | Self::AlreadyExists(m)
            | Self::InvalidArgument(m)
            | Self::NotFound(m)
            | Self::Protocol(m)
            | Self::Transport(m) => m,
        }
    }
}

impl From<Interrupted> for KeeperError {
    fn from(err: Interrupted) -> Self {
        Self::Transport(err.to_string())
    }
}

impl From<TokenError> for KeeperError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::NotFound => {
                Self::Unauthenticated("no token stored, run `strongbox login` first".to_string())
            }
            other => Self::Unauthenticated(other.to_string()),
        }
    }
}

// Byte streams report through `std::io`, so taxonomy errors ride inside
// `io::Error` and are recovered on the way back out.
impl From<KeeperError> for io::Error {
    fn from(err: KeeperError) -> Self {
        let kind = match &err {
            KeeperError::Protocol(_) => io::ErrorKind::InvalidData,
            KeeperError::Unauthenticated(_) => io::ErrorKind::PermissionDenied,
            KeeperError::NotFound(_) => io::ErrorKind::NotFound,
            KeeperError::AlreadyExists(_) => io::ErrorKind::AlreadyExists,
            KeeperError::InvalidArgument(_) => io::ErrorKind::InvalidInput,
            KeeperError::Transport(_) => io::ErrorKind::Other,
        };
        io::Error::new(kind, err)
    }
}

impl From<io::Error> for KeeperError {
    fn from(err: io::Error) -> Self {
        match err.get_ref().and_then(|inner| inner.downcast_ref::<KeeperError>()) {
            Some(keeper) => keeper.clone(),
            None => Self::Transport(format!("I/O error: {err}")),
        }
    }
}

/// Configuration-related errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    NotFound(PathBuf),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON5 parse error: {0}")]
    Json5(String),
}

/// Errors from the token accessor.
#[derive(Debug, Error)]
pub enum TokenError {
    #[error("token not found in storage")]
    NotFound,

    #[error("cannot save empty token")]
    Empty,

    #[error("token storage error: {0}")]
    Io(#[from] io::Error),

    #[error("token storage path: {0}")]
    Path(#[from] ConfigError),
}
