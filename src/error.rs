//! # error
//!
//! Error types returned by the client core

use std::fmt;
use std::io;

use remotefs::{RemoteError, RemoteErrorType};
use thiserror::Error;

/// Result returned by every core operation
pub type SmbResult<T> = Result<T, SmbError>;

/// Failure kinds of the client core.
///
/// Each variant carries enough context (host, share or path) to diagnose the failure
/// without running the operation again.
#[derive(Debug, Error)]
pub enum SmbError {
    #[error("could not connect to {target}: {source}")]
    Connect {
        target: String,
        #[source]
        source: io::Error,
    },
    #[error("no common protocol dialect with {target}: {reason}")]
    ProtocolMismatch { target: String, reason: String },
    #[error("authentication rejected by {target} for user '{user}'")]
    Authentication { target: String, user: String },
    #[error("transport failure during {operation}: {source}")]
    Transport {
        operation: &'static str,
        #[source]
        source: io::Error,
    },
    #[error("session is no longer valid ({operation})")]
    SessionInvalid { operation: &'static str },
    #[error("share '{share}' not found")]
    ShareNotFound { share: String },
    #[error("access denied during {operation} on '{target}'")]
    AccessDenied {
        operation: &'static str,
        target: String,
    },
    #[error("no such file or directory: '{path}'")]
    PathNotFound { path: String },
    #[error("not a directory: '{path}'")]
    NotADirectory { path: String },
    #[error("is a directory: '{path}'")]
    IsADirectory { path: String },
    #[error("I/O error during {operation} on '{path}': {reason}")]
    Io {
        operation: &'static str,
        path: String,
        reason: String,
    },
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl SmbError {
    /// Whether this error left the underlying connection unusable
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Connect { .. } | Self::Transport { .. } | Self::SessionInvalid { .. }
        )
    }
}

impl From<SmbError> for RemoteError {
    fn from(err: SmbError) -> Self {
        let kind = match &err {
            SmbError::Connect { .. } => RemoteErrorType::ConnectionError,
            SmbError::ProtocolMismatch { .. } => RemoteErrorType::ProtocolError,
            SmbError::Authentication { .. } => RemoteErrorType::AuthenticationFailed,
            SmbError::Transport { .. } => RemoteErrorType::ConnectionError,
            SmbError::SessionInvalid { .. } => RemoteErrorType::NotConnected,
            SmbError::ShareNotFound { .. } => RemoteErrorType::BadAddress,
            SmbError::AccessDenied { .. } => RemoteErrorType::CouldNotOpenFile,
            SmbError::PathNotFound { .. } => RemoteErrorType::NoSuchFileOrDirectory,
            SmbError::NotADirectory { .. } | SmbError::IsADirectory { .. } => {
                RemoteErrorType::BadFile
            }
            SmbError::Io { .. } => RemoteErrorType::IoError,
            SmbError::Config(_) => RemoteErrorType::BadAddress,
        };
        RemoteError::new_ex(kind, err)
    }
}

/// Step of an end-to-end facade run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Connect,
    Negotiate,
    Mount,
    ListDirectory,
    ReadFile,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Connect => "connect",
            Self::Negotiate => "negotiate",
            Self::Mount => "mount",
            Self::ListDirectory => "list directory",
            Self::ReadFile => "read file",
        };
        f.write_str(name)
    }
}

/// Failure of a facade run: the step which failed and why
#[derive(Debug, Error)]
#[error("{step} failed: {error}")]
pub struct RunError {
    pub step: Step,
    #[source]
    pub error: SmbError,
}

impl RunError {
    pub(crate) fn at(step: Step) -> impl FnOnce(SmbError) -> Self {
        move |error| Self { step, error }
    }
}
