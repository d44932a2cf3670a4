//! # engine
//!
//! Contract between the client core and the protocol engine.
//!
//! The engine owns wire encoding and the authentication exchange. The core never looks
//! inside a frame: it asks the engine to encode a [`Request`], ships the bytes over the
//! [`Connection`](crate::Connection) and hands the reply back to the engine to decode into a
//! [`Response`].

use std::fmt;
use std::time::SystemTime;

use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::SmbCredentials;

pub mod wire;

/// Result returned by engine calls
pub type EngineResult<T> = Result<T, EngineError>;

/// Protocol dialect, as the revision number carried on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Dialect(pub u16);

impl Dialect {
    pub const SMB_2_0_2: Self = Self(0x0202);
    pub const SMB_2_1: Self = Self(0x0210);
    pub const SMB_3_0: Self = Self(0x0300);
    pub const SMB_3_0_2: Self = Self(0x0302);
    pub const SMB_3_1_1: Self = Self(0x0311);
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let major = self.0 >> 8;
        let minor = (self.0 >> 4) & 0xF;
        let patch = self.0 & 0xF;
        if patch == 0 {
            write!(f, "{major}.{minor}")
        } else {
            write!(f, "{major}.{minor}.{patch}")
        }
    }
}

/// Authenticated session identifier handed out by the server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionToken(pub u64);

/// Identifier of a connected share tree
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TreeId(pub u32);

bitflags! {
    /// Access granted on a share to the authenticated identity
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct AccessMask: u32 {
        const READ_DATA         = 0x00000001;
        const WRITE_DATA        = 0x00000002;
        const APPEND_DATA       = 0x00000004;
        const READ_EA           = 0x00000008;
        const EXECUTE           = 0x00000020;
        const READ_ATTRIBUTES   = 0x00000080;
        const GENERIC_ALL       = 0x10000000;
        const GENERIC_READ      = 0x80000000;
    }
}

impl AccessMask {
    /// Whether the mask allows at least reading data and listing directories
    pub fn can_read(&self) -> bool {
        self.intersects(Self::READ_DATA | Self::GENERIC_READ | Self::GENERIC_ALL)
    }
}

/// Kind of a directory entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntryKind {
    File,
    Directory,
}

/// One entry produced by a directory listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryEntry {
    pub name: String,
    pub kind: EntryKind,
    pub size: u64,
    pub modified: SystemTime,
}

impl DirectoryEntry {
    pub fn is_dir(&self) -> bool {
        self.kind == EntryKind::Directory
    }
}

/// Status reported by the server when a request fails
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Status {
    NoCommonDialect,
    LogonFailure,
    BadNetworkName,
    AccessDenied,
    ObjectNameNotFound,
    NotADirectory,
    FileIsADirectory,
    UserSessionDeleted,
    Other(u32),
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoCommonDialect => f.write_str("STATUS_NOT_SUPPORTED"),
            Self::LogonFailure => f.write_str("STATUS_LOGON_FAILURE"),
            Self::BadNetworkName => f.write_str("STATUS_BAD_NETWORK_NAME"),
            Self::AccessDenied => f.write_str("STATUS_ACCESS_DENIED"),
            Self::ObjectNameNotFound => f.write_str("STATUS_OBJECT_NAME_NOT_FOUND"),
            Self::NotADirectory => f.write_str("STATUS_NOT_A_DIRECTORY"),
            Self::FileIsADirectory => f.write_str("STATUS_FILE_IS_A_DIRECTORY"),
            Self::UserSessionDeleted => f.write_str("STATUS_USER_SESSION_DELETED"),
            Self::Other(code) => write!(f, "status {code:#010x}"),
        }
    }
}

/// Engine failure
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("server returned {0}")]
    Status(Status),
    #[error("malformed message: {0}")]
    Malformed(String),
    #[error("no authenticated session")]
    NotAuthenticated,
}

/// Requests the core asks the engine to encode.
///
/// Paths are relative to the share root, `/`-separated, with the root being the empty
/// string.
#[derive(Debug, Clone, Copy)]
pub enum Request<'a> {
    Negotiate {
        dialects: &'a [Dialect],
    },
    /// One leg of the authentication exchange; `challenge` is `None` on the first leg
    SessionSetup {
        credentials: &'a SmbCredentials,
        challenge: Option<&'a [u8]>,
    },
    TreeConnect {
        share: &'a str,
    },
    QueryDirectory {
        tree: TreeId,
        path: &'a str,
    },
    Read {
        tree: TreeId,
        path: &'a str,
    },
    TreeDisconnect {
        tree: TreeId,
    },
    Logoff,
}

impl Request<'_> {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Negotiate { .. } => "negotiate",
            Self::SessionSetup { .. } => "session setup",
            Self::TreeConnect { .. } => "tree connect",
            Self::QueryDirectory { .. } => "query directory",
            Self::Read { .. } => "read",
            Self::TreeDisconnect { .. } => "tree disconnect",
            Self::Logoff => "logoff",
        }
    }
}

/// Decoded server replies
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    Negotiated { dialect: Dialect },
    Challenge { blob: Vec<u8> },
    SessionEstablished { token: SessionToken },
    TreeConnected { tree: TreeId, access: AccessMask },
    Directory { entries: Vec<DirectoryEntry> },
    Data { bytes: Vec<u8> },
    Done,
}

/// Wire-level protocol engine driven by the client core.
///
/// Implementations are opaque state machines: they may keep whatever state the exchange
/// needs (session token, signing keys) between `encode` and `decode` calls.
pub trait ProtocolEngine: Send {
    /// Dialects offered during negotiation, in order of preference
    fn dialects(&self) -> &[Dialect];

    /// Encode a request into the payload of one frame
    fn encode(&mut self, request: Request<'_>) -> EngineResult<Vec<u8>>;

    /// Decode the payload of one frame
    fn decode(&mut self, frame: &[u8]) -> EngineResult<Response>;
}

impl<E: ProtocolEngine + ?Sized> ProtocolEngine for Box<E> {
    fn dialects(&self) -> &[Dialect] {
        (**self).dialects()
    }

    fn encode(&mut self, request: Request<'_>) -> EngineResult<Vec<u8>> {
        (**self).encode(request)
    }

    fn decode(&mut self, frame: &[u8]) -> EngineResult<Response> {
        (**self).decode(frame)
    }
}
