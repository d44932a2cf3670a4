//! # wire
//!
//! Reference protocol engine.
//!
//! Messages are serde enums encoded with bincode. Authentication is a challenge-response
//! exchange: the server answers the first session setup with a random challenge and the
//! client proves knowledge of the password with `HMAC-SHA256(password, challenge || user)`.
//! The message types are public so a server (or a test harness) can speak the same protocol.

use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use super::{
    AccessMask, Dialect, DirectoryEntry, EngineError, EngineResult, ProtocolEngine, Request,
    Response, SessionToken, Status, TreeId,
};

type HmacSha256 = Hmac<Sha256>;

/// Messages sent by the client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum WireRequest {
    Negotiate {
        dialects: Vec<Dialect>,
    },
    SessionSetup {
        username: String,
        proof: Option<Vec<u8>>,
    },
    TreeConnect {
        session: u64,
        share: String,
    },
    QueryDirectory {
        session: u64,
        tree: u32,
        path: String,
    },
    Read {
        session: u64,
        tree: u32,
        path: String,
    },
    TreeDisconnect {
        session: u64,
        tree: u32,
    },
    Logoff {
        session: u64,
    },
}

/// Messages sent by the server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum WireResponse {
    Negotiated { dialect: Dialect },
    Challenge { nonce: Vec<u8> },
    SessionEstablished { session: u64 },
    TreeConnected { tree: u32, access: AccessMask },
    Directory { entries: Vec<DirectoryEntry> },
    Data { bytes: Vec<u8> },
    Done,
    Error { status: Status },
}

impl WireRequest {
    pub fn to_bytes(&self) -> EngineResult<Vec<u8>> {
        bincode::serialize(self).map_err(|e| EngineError::Malformed(e.to_string()))
    }

    pub fn from_bytes(frame: &[u8]) -> EngineResult<Self> {
        bincode::deserialize(frame).map_err(|e| EngineError::Malformed(e.to_string()))
    }
}

impl WireResponse {
    pub fn to_bytes(&self) -> EngineResult<Vec<u8>> {
        bincode::serialize(self).map_err(|e| EngineError::Malformed(e.to_string()))
    }

    pub fn from_bytes(frame: &[u8]) -> EngineResult<Self> {
        bincode::deserialize(frame).map_err(|e| EngineError::Malformed(e.to_string()))
    }
}

/// Compute the proof answering `challenge` for `username`
pub fn auth_proof(secret: &str, challenge: &[u8], username: &str) -> Vec<u8> {
    mac(secret, challenge, username).finalize().into_bytes().to_vec()
}

/// Check a proof in constant time
pub fn verify_proof(secret: &str, challenge: &[u8], username: &str, proof: &[u8]) -> bool {
    mac(secret, challenge, username).verify_slice(proof).is_ok()
}

fn mac(secret: &str, challenge: &[u8], username: &str) -> HmacSha256 {
    // HMAC takes keys of any length
    let mut mac = <HmacSha256 as Mac>::new_from_slice(secret.as_bytes())
        .unwrap_or_else(|_| unreachable!("hmac accepts keys of any size"));
    mac.update(challenge);
    mac.update(username.as_bytes());
    mac
}

/// Engine speaking [`WireRequest`] / [`WireResponse`]
#[derive(Debug, Clone)]
pub struct WireEngine {
    dialects: Vec<Dialect>,
    session: Option<u64>,
}

impl Default for WireEngine {
    fn default() -> Self {
        Self {
            dialects: vec![
                Dialect::SMB_3_1_1,
                Dialect::SMB_3_0_2,
                Dialect::SMB_3_0,
                Dialect::SMB_2_1,
                Dialect::SMB_2_0_2,
            ],
            session: None,
        }
    }
}

impl WireEngine {
    /// Construct a WireEngine offering only `dialects`
    pub fn with_dialects(mut self, dialects: &[Dialect]) -> Self {
        self.dialects = dialects.to_vec();
        self
    }

    fn session(&self) -> EngineResult<u64> {
        self.session.ok_or(EngineError::NotAuthenticated)
    }
}

impl ProtocolEngine for WireEngine {
    fn dialects(&self) -> &[Dialect] {
        &self.dialects
    }

    fn encode(&mut self, request: Request<'_>) -> EngineResult<Vec<u8>> {
        let message = match request {
            Request::Negotiate { dialects } => WireRequest::Negotiate {
                dialects: dialects.to_vec(),
            },
            Request::SessionSetup {
                credentials,
                challenge,
            } => WireRequest::SessionSetup {
                username: credentials.username().to_string(),
                proof: challenge
                    .map(|c| auth_proof(credentials.secret(), c, credentials.username())),
            },
            Request::TreeConnect { share } => WireRequest::TreeConnect {
                session: self.session()?,
                share: share.to_string(),
            },
            Request::QueryDirectory { tree, path } => WireRequest::QueryDirectory {
                session: self.session()?,
                tree: tree.0,
                path: path.to_string(),
            },
            Request::Read { tree, path } => WireRequest::Read {
                session: self.session()?,
                tree: tree.0,
                path: path.to_string(),
            },
            Request::TreeDisconnect { tree } => WireRequest::TreeDisconnect {
                session: self.session()?,
                tree: tree.0,
            },
            Request::Logoff => WireRequest::Logoff {
                session: self.session.take().ok_or(EngineError::NotAuthenticated)?,
            },
        };
        message.to_bytes()
    }

    fn decode(&mut self, frame: &[u8]) -> EngineResult<Response> {
        match WireResponse::from_bytes(frame)? {
            WireResponse::Negotiated { dialect } => Ok(Response::Negotiated { dialect }),
            WireResponse::Challenge { nonce } => Ok(Response::Challenge { blob: nonce }),
            WireResponse::SessionEstablished { session } => {
                self.session = Some(session);
                Ok(Response::SessionEstablished {
                    token: SessionToken(session),
                })
            }
            WireResponse::TreeConnected { tree, access } => Ok(Response::TreeConnected {
                tree: TreeId(tree),
                access,
            }),
            WireResponse::Directory { entries } => Ok(Response::Directory { entries }),
            WireResponse::Data { bytes } => Ok(Response::Data { bytes }),
            WireResponse::Done => Ok(Response::Done),
            WireResponse::Error { status } => Err(EngineError::Status(status)),
        }
    }
}
