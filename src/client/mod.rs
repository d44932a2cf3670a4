//! # client
//!
//! Session, share mount, facade and remotefs client

mod facade;
mod remote;
mod session;
mod share;

pub use facade::{RunOutput, SmbClient};
pub use remote::SmbFs;
pub use session::{Negotiator, Session, SessionState};
pub use share::{ShareMount, Tree};
