//! # utils
//!
//! Utilities

pub mod fmt;
pub(crate) mod path;
pub(crate) mod smb;
