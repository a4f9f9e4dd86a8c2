//! Wire representation of secrets and stream chunks.
//!
//! Everything here is what travels inside JSON-RPC `params` and `result`
//! members. Conversions to and from the domain types in `strongbox-core`
//! are exhaustive, so a new secret type fails to build until both mapping
//! sites handle it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strongbox_core::{KeeperError, NewSecret, SecretInfo, SecretType, Version};

/// Method names.
pub mod methods {
    pub const AUTH_REGISTER: &str = "auth.register";
    pub const AUTH_LOGIN: &str = "auth.login";
    pub const SECRETS_CREATE: &str = "secrets.create";
    pub const SECRETS_CREATE_STREAM: &str = "secrets.create_stream";
    pub const SECRETS_LIST: &str = "secrets.list";
    pub const SECRETS_GET: &str = "secrets.get";
    pub const SECRETS_GET_STREAM: &str = "secrets.get_stream";
    pub const SECRETS_DELETE: &str = "secrets.delete";

    /// One chunk of an open stream, in either direction.
    pub const STREAM_CHUNK: &str = "stream.chunk";
    /// The client finished sending an upload.
    pub const STREAM_END: &str = "stream.end";
    /// The sender abandoned a stream. Nothing is committed.
    pub const STREAM_CANCEL: &str = "stream.cancel";
}

/// Secret type as spelled on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WireSecretType {
    Credentials,
    PaymentCard,
    Binary,
    Text,
    #[serde(other)]
    Unknown,
}

impl From<SecretType> for WireSecretType {
    fn from(value: SecretType) -> Self {
        match value {
            SecretType::Credentials => Self::Credentials,
            SecretType::PaymentCard => Self::PaymentCard,
            SecretType::File => Self::Binary,
            SecretType::Text => Self::Text,
            SecretType::Unknown => Self::Unknown,
        }
    }
}

impl From<WireSecretType> for SecretType {
    fn from(value: WireSecretType) -> Self {
        match value {
            WireSecretType::Credentials => Self::Credentials,
            WireSecretType::PaymentCard => Self::PaymentCard,
            WireSecretType::Binary => Self::File,
            WireSecretType::Text => Self::Text,
            WireSecretType::Unknown => Self::Unknown,
        }
    }
}

/// Secret metadata on the wire.
///
/// Clients never send `version` or `created_at`. The backend always fills
/// both in what it returns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireSecretInfo {
    pub name: String,

    #[serde(rename = "type")]
    pub secret_type: WireSecretType,

    #[serde(default)]
    pub metadata: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl From<&NewSecret> for WireSecretInfo {
    fn from(secret: &NewSecret) -> Self {
        Self {
            name: secret.name.clone(),
            secret_type: secret.secret_type.into(),
            metadata: secret.metadata.clone(),
            version: None,
            created_at: None,
        }
    }
}

impl From<&SecretInfo> for WireSecretInfo {
    fn from(info: &SecretInfo) -> Self {
        Self {
            name: info.name.clone(),
            secret_type: info.secret_type.into(),
            metadata: info.metadata.clone(),
            version: Some(info.version),
            created_at: Some(info.created_at),
        }
    }
}

impl TryFrom<WireSecretInfo> for SecretInfo {
    type Error = KeeperError;

    fn try_from(wire: WireSecretInfo) -> Result<Self, Self::Error> {
        let version = wire
            .version
            .filter(|v| *v > 0)
            .ok_or_else(|| KeeperError::Protocol(format!("secret '{}' has no version", wire.name)))?;
        let created_at = wire.created_at.ok_or_else(|| {
            KeeperError::Protocol(format!("secret '{}' has no creation time", wire.name))
        })?;

        Ok(Self {
            name: wire.name,
            secret_type: wire.secret_type.into(),
            metadata: wire.metadata,
            version,
            created_at,
        })
    }
}

/// One message of a streamed transfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Chunk {
    /// Leading metadata message. Exactly one per stream.
    Info(WireSecretInfo),

    /// A content fragment.
    Data {
        #[serde(with = "base64_bytes")]
        data: Vec<u8>,
    },
}

impl Chunk {
    /// Short name of the variant, for diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Info(_) => "info",
            Self::Data { .. } => "data",
        }
    }
}

/// A secret with its full content: `secrets.create` params and `secrets.get` result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretPayload {
    pub info: WireSecretInfo,

    #[serde(with = "base64_bytes")]
    pub data: Vec<u8>,
}

/// Identifies a secret, and optionally a version, in a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretRef {
    pub name: String,

    /// Absent or `0` selects the latest version.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<u32>,
}

impl SecretRef {
    pub fn new(name: impl Into<String>, version: Version) -> Self {
        Self {
            name: name.into(),
            version: version.number(),
        }
    }

    /// The requested version, treating `0` as latest.
    pub fn version(&self) -> Version {
        Version::from_number(self.version.unwrap_or(0))
    }
}

/// `secrets.list` result.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretList {
    #[serde(default)]
    pub names: Vec<String>,
}

/// `auth.register` and `auth.login` params.
#[derive(Clone, Serialize, Deserialize)]
pub struct UserCredentials {
    pub login: String,
    pub password: String,
}

impl std::fmt::Debug for UserCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserCredentials")
            .field("login", &self.login)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

/// `auth.register` and `auth.login` result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenResponse {
    pub token: String,
}

/// Params of the `stream.*` notifications.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamFrame {
    /// ID of the call that opened the stream.
    pub id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk: Option<serde_json::Value>,
}

/// Serde helper storing bytes as standard base64.
pub mod base64_bytes {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(encoded).map_err(serde::de::Error::custom)
    }
}
