//! Domain types for secrets.
//!
//! Buffered secrets ([`Secret`]) carry their whole content in memory. Streamed
//! secrets ([`StreamedSecret`]) expose content as a single-pass byte stream
//! that is never materialized by the client.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::num::NonZeroU32;
use tokio::io::AsyncRead;

use crate::error::{KeeperError, Result};

/// A lazy, forward-only byte sequence.
pub type ByteStream = Box<dyn AsyncRead + Send + Unpin>;

/// Maximum allowed length for a secret name.
pub const MAX_NAME_LEN: usize = 256;

/// Kind of secret. Decides whether content is buffered or streamed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecretType {
    /// Login/password pair.
    Credentials,

    /// Payment card details.
    PaymentCard,

    /// Arbitrary binary file.
    File,

    /// Free-form text.
    Text,

    /// A type this client does not recognize.
    Unknown,
}

impl SecretType {
    /// Stable lowercase name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Credentials => "credentials",
            Self::PaymentCard => "payment_card",
            Self::File => "file",
            Self::Text => "text",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for SecretType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which version of a secret to read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Version {
    /// The most recently created version.
    #[default]
    Latest,

    /// A specific backend-assigned version.
    Exact(NonZeroU32),
}

impl Version {
    /// Interpret a user-supplied number, where `0` selects the latest version.
    pub fn from_number(number: u32) -> Self {
        NonZeroU32::new(number).map_or(Self::Latest, Self::Exact)
    }

    /// The explicit version number, if any.
    pub fn number(self) -> Option<u32> {
        match self {
            Self::Latest => None,
            Self::Exact(n) => Some(n.get()),
        }
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Latest => f.write_str("latest"),
            Self::Exact(n) => write!(f, "v{n}"),
        }
    }
}

/// Client-supplied description of a secret to create.
///
/// Carries no version: versions are assigned by the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewSecret {
    /// Unique (per user) name.
    pub name: String,

    /// Secret kind.
    pub secret_type: SecretType,

    /// Opaque caller metadata, never interpreted.
    pub metadata: String,
}

impl NewSecret {
    /// Create a description with empty metadata.
    pub fn new(name: impl Into<String>, secret_type: SecretType) -> Self {
        Self {
            name: name.into(),
            secret_type,
            metadata: String::new(),
        }
    }

    /// Attach caller metadata.
    pub fn with_metadata(mut self, metadata: impl Into<String>) -> Self {
        self.metadata = metadata.into();
        self
    }

    /// Check the name before anything is sent.
    pub fn validate(&self) -> Result<()> {
        validate_name(&self.name)
    }
}

/// Validate a secret name.
pub fn validate_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(KeeperError::InvalidArgument(
            "secret name must not be empty".to_string(),
        ));
    }
    if name.len() > MAX_NAME_LEN {
        return Err(KeeperError::InvalidArgument(format!(
            "secret name exceeds maximum length of {MAX_NAME_LEN} bytes"
        )));
    }
    Ok(())
}

/// Backend-produced metadata about one secret version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretInfo {
    /// Secret name.
    pub name: String,

    /// Secret kind.
    pub secret_type: SecretType,

    /// Opaque caller metadata.
    pub metadata: String,

    /// Backend-assigned version, increasing per name.
    pub version: u32,

    /// Backend-assigned creation time.
    pub created_at: DateTime<Utc>,
}

/// A buffered secret with its content fully in memory.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret {
    pub info: SecretInfo,
    pub data: Vec<u8>,
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Secret")
            .field("info", &self.info)
            .field("data", &format_args!("[{} bytes]", self.data.len()))
            .finish()
    }
}

/// A streamed secret: metadata plus a lazy content stream.
///
/// The stream is single-pass. Reading it again requires a new download.
pub struct StreamedSecret {
    pub info: SecretInfo,
    pub content: ByteStream,
}

impl fmt::Debug for StreamedSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamedSecret")
            .field("info", &self.info)
            .finish_non_exhaustive()
    }
}

/// Content of a [`SecretType::Credentials`] secret.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub login: String,
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("login", &self.login)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

/// Content of a [`SecretType::PaymentCard`] secret.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentCard {
    pub number: String,
}

impl fmt::Debug for PaymentCard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PaymentCard { number: [REDACTED] }")
    }
}
