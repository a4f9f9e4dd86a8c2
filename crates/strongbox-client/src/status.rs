//! Transport status and its translation into the error taxonomy.
//!
//! Transports report failures as a [`Status`]. The `From<Status>` impl for
//! [`KeeperError`] is the only place a status code is interpreted; callers
//! of the client never see one.

use std::fmt;

use strongbox_core::KeeperError;
use thiserror::Error;

use crate::rpc::{codes, JsonRpcError};

/// Transport-level outcome class of a failed call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusCode {
    Cancelled,
    Unknown,
    InvalidArgument,
    DeadlineExceeded,
    NotFound,
    AlreadyExists,
    Unauthenticated,
    Unimplemented,
    Internal,
    Unavailable,
}

impl StatusCode {
    /// Map a JSON-RPC error code.
    pub fn from_rpc_code(code: i32) -> Self {
        match code {
            codes::UNAUTHENTICATED => Self::Unauthenticated,
            codes::NOT_FOUND => Self::NotFound,
            codes::ALREADY_EXISTS => Self::AlreadyExists,
            codes::INVALID_PARAMS => Self::InvalidArgument,
            codes::METHOD_NOT_FOUND => Self::Unimplemented,
            codes::PARSE_ERROR | codes::INVALID_REQUEST | codes::INTERNAL_ERROR => Self::Internal,
            _ => Self::Unknown,
        }
    }

    /// The JSON-RPC error code for this status.
    pub fn rpc_code(self) -> i32 {
        match self {
            Self::Unauthenticated => codes::UNAUTHENTICATED,
            Self::NotFound => codes::NOT_FOUND,
            Self::AlreadyExists => codes::ALREADY_EXISTS,
            Self::InvalidArgument => codes::INVALID_PARAMS,
            Self::Unimplemented => codes::METHOD_NOT_FOUND,
            Self::Cancelled
            | Self::Unknown
            | Self::DeadlineExceeded
            | Self::Internal
            | Self::Unavailable => codes::INTERNAL_ERROR,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Cancelled => "cancelled",
            Self::Unknown => "unknown",
            Self::InvalidArgument => "invalid argument",
            Self::DeadlineExceeded => "deadline exceeded",
            Self::NotFound => "not found",
            Self::AlreadyExists => "already exists",
            Self::Unauthenticated => "unauthenticated",
            Self::Unimplemented => "unimplemented",
            Self::Internal => "internal",
            Self::Unavailable => "unavailable",
        }
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failed call as reported by the transport.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{code}: {message}")]
pub struct Status {
    pub code: StatusCode,
    pub message: String,
}

impl Status {
    pub fn new(code: StatusCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn unauthenticated(message: impl Into<String>) -> Self {
        Self::new(StatusCode::Unauthenticated, message)
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(StatusCode::Unavailable, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::Internal, message)
    }

    pub fn cancelled(message: impl Into<String>) -> Self {
        Self::new(StatusCode::Cancelled, message)
    }
}

impl From<JsonRpcError> for Status {
    fn from(err: JsonRpcError) -> Self {
        Self::new(StatusCode::from_rpc_code(err.code), err.message)
    }
}

impl From<&Status> for JsonRpcError {
    fn from(status: &Status) -> Self {
        JsonRpcError::new(status.code.rpc_code(), status.message.clone())
    }
}

impl From<Status> for KeeperError {
    fn from(status: Status) -> Self {
        match status.code {
            StatusCode::Unauthenticated => Self::Unauthenticated(status.message),
            StatusCode::AlreadyExists => Self::AlreadyExists(status.message),
            StatusCode::InvalidArgument => Self::InvalidArgument(status.message),
            StatusCode::NotFound => Self::NotFound(status.message),
            StatusCode::Cancelled
            | StatusCode::Unknown
            | StatusCode::DeadlineExceeded
            | StatusCode::Unimplemented
            | StatusCode::Internal
            | StatusCode::Unavailable => Self::Transport(status.to_string()),
        }
    }
}
