#![crate_name = "smb_client_core"]
#![crate_type = "lib"]

//! # smb-client-core
//!
//! smb-client-core is a minimal client core for SMB-like file sharing protocols: it connects to a
//! server, negotiates a dialect, authenticates, mounts a share, lists directories and reads
//! whole files. It is read-only.
//!
//! Wire encoding and the authentication exchange are delegated to a [`ProtocolEngine`]; the crate
//! ships [`WireEngine`](engine::wire::WireEngine) as a reference engine.
//!
//! ## Get started
//!
//! ```toml
//! smb-client-core = "^0.1"
//! ```
//!
//! these features are supported:
//!
//! - `find`: enable `find()` method for RemoteFs. (*enabled by default*)
//! - `no-log`: disable logging. By default, this library will log via the `log` crate.
//!
//! ### One-shot run
//!
//! The [`SmbClient`] facade connects, authenticates, mounts the share, lists a directory and
//! reads a file, then releases everything in reverse order.
//!
//! ```rust,no_run
//! use smb_client_core::engine::wire::WireEngine;
//! use smb_client_core::{ClientConfig, SmbClient, SmbCredentials};
//!
//! let config = ClientConfig::with_address("127.0.0.1:4789")
//!     .unwrap()
//!     .share("public")
//!     .credentials(SmbCredentials::new("user").password("password"))
//!     .remote_path("hello.txt");
//! let output = SmbClient::new(config, WireEngine::default()).run().unwrap();
//! for entry in output.entries {
//!     println!("- {}", entry.name);
//! }
//! println!("{}", String::from_utf8_lossy(&output.content));
//! ```
//!
//! ### Layer by layer
//!
//! ```rust,no_run
//! use std::time::Duration;
//!
//! use smb_client_core::engine::wire::WireEngine;
//! use smb_client_core::{Connection, Negotiator, SmbCredentials};
//!
//! let timeout = Some(Duration::from_secs(10));
//! let connection = Connection::connect("127.0.0.1", 4789, timeout).unwrap();
//! let mut session = Negotiator::new(SmbCredentials::new("user").password("password"))
//!     .timeout(timeout)
//!     .negotiate(connection, WireEngine::default())
//!     .unwrap();
//! let mut share = session.mount("public").unwrap();
//! let content = share.read_file("hello.txt").unwrap();
//! assert_eq!(content, b"hello world");
//! // dropping the mount unmounts, dropping the session logs off and closes the connection
//! ```
//!
//! ### remotefs
//!
//! [`SmbFs`] implements `remotefs::RemoteFs` for read-only access.
//!

#![doc(html_playground_url = "https://play.rust-lang.org")]

// -- crates
#[macro_use]
extern crate log;

mod client;
mod config;
pub mod engine;
mod error;
mod transport;
pub mod utils;

pub use client::{
    Negotiator, RunOutput, Session, SessionState, ShareMount, SmbClient, SmbFs, Tree,
};
pub use config::{ClientConfig, SmbCredentials, DEFAULT_PORT, DEFAULT_TIMEOUT};
pub use engine::{DirectoryEntry, EntryKind, ProtocolEngine};
pub use error::{RunError, SmbError, SmbResult, Step};
pub use transport::{Connection, Deadline};

// -- mock
#[cfg(test)]
pub(crate) mod mock;
