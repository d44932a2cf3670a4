//! # share
//!
//! Share mount and the read-only file operations performed on it

use std::time::SystemTime;

use crate::client::session::Session;
use crate::engine::{AccessMask, DirectoryEntry, EntryKind, Request, Response, Status, TreeId};
use crate::error::{SmbError, SmbResult};
use crate::utils::path as path_utils;

/// A connected share tree, detached from any borrow of its session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tree {
    id: TreeId,
    share: String,
    access: AccessMask,
}

impl Tree {
    pub fn id(&self) -> TreeId {
        self.id
    }

    pub fn share(&self) -> &str {
        &self.share
    }

    pub fn access(&self) -> AccessMask {
        self.access
    }

    /// Connect `share` on `session`
    pub(crate) fn connect(session: &mut Session, share: &str) -> SmbResult<Self> {
        trace!("mounting share '{}'", share);
        match session.call(Request::TreeConnect { share })? {
            Ok(Response::TreeConnected { tree, access }) => {
                let tree = Self {
                    id: tree,
                    share: share.to_string(),
                    access,
                };
                if !access.can_read() {
                    error!("share '{}' grants no read access ({:?})", share, access);
                    if let Err(err) = tree.disconnect(session) {
                        warn!("failed to disconnect tree: {}", err);
                    }
                    return Err(SmbError::AccessDenied {
                        operation: "mount",
                        target: share.to_string(),
                    });
                }
                debug!("mounted share '{}' as tree {:?}", share, tree.id);
                Ok(tree)
            }
            Ok(other) => Err(session.violation("tree connect", format!("unexpected {other:?}"))),
            Err(Status::BadNetworkName) => Err(SmbError::ShareNotFound {
                share: share.to_string(),
            }),
            Err(Status::AccessDenied) => Err(SmbError::AccessDenied {
                operation: "mount",
                target: share.to_string(),
            }),
            Err(status) => Err(SmbError::Io {
                operation: "mount",
                path: share.to_string(),
                reason: status.to_string(),
            }),
        }
    }

    /// Disconnect the tree. A no-op once the session is gone
    pub(crate) fn disconnect(&self, session: &mut Session) -> SmbResult<()> {
        if !session.is_active() {
            trace!("session gone; tree {:?} is already released", self.id);
            return Ok(());
        }
        debug!("unmounting share '{}'", self.share);
        match session.call(Request::TreeDisconnect { tree: self.id })? {
            Ok(Response::Done) => Ok(()),
            Ok(other) => Err(session.violation("tree disconnect", format!("unexpected {other:?}"))),
            Err(status) => Err(SmbError::Io {
                operation: "unmount",
                path: self.share.clone(),
                reason: status.to_string(),
            }),
        }
    }

    pub(crate) fn list_dir(
        &self,
        session: &mut Session,
        path: &str,
    ) -> SmbResult<Vec<DirectoryEntry>> {
        let normalized = self.normalize(session, "list directory", path)?;
        trace!("listing directory '{}' on '{}'", normalized, self.share);
        let target = self.target(session, &normalized);
        match session.call(Request::QueryDirectory {
            tree: self.id,
            path: &normalized,
        })? {
            Ok(Response::Directory { entries }) => Ok(entries
                .into_iter()
                .filter(|e| e.name != "." && e.name != "..")
                .collect()),
            Ok(other) => Err(session.violation("query directory", format!("unexpected {other:?}"))),
            Err(Status::ObjectNameNotFound) => Err(SmbError::PathNotFound { path: target }),
            Err(Status::NotADirectory) => Err(SmbError::NotADirectory { path: target }),
            Err(Status::AccessDenied) => Err(SmbError::AccessDenied {
                operation: "list directory",
                target,
            }),
            Err(status) => Err(SmbError::Io {
                operation: "list directory",
                path: target,
                reason: status.to_string(),
            }),
        }
    }

    pub(crate) fn read_file(&self, session: &mut Session, path: &str) -> SmbResult<Vec<u8>> {
        let normalized = self.normalize(session, "read file", path)?;
        trace!("reading file '{}' on '{}'", normalized, self.share);
        let target = self.target(session, &normalized);
        match session.call(Request::Read {
            tree: self.id,
            path: &normalized,
        })? {
            Ok(Response::Data { bytes }) => {
                debug!("read {} bytes from {}", bytes.len(), target);
                Ok(bytes)
            }
            Ok(other) => Err(session.violation("read", format!("unexpected {other:?}"))),
            Err(Status::ObjectNameNotFound) => Err(SmbError::PathNotFound { path: target }),
            Err(Status::FileIsADirectory) => Err(SmbError::IsADirectory { path: target }),
            Err(Status::AccessDenied) => Err(SmbError::AccessDenied {
                operation: "read file",
                target,
            }),
            Err(status) => Err(SmbError::Io {
                operation: "read file",
                path: target,
                reason: status.to_string(),
            }),
        }
    }

    pub(crate) fn stat(&self, session: &mut Session, path: &str) -> SmbResult<DirectoryEntry> {
        let normalized = self.normalize(session, "stat", path)?;
        if normalized.is_empty() {
            return Ok(DirectoryEntry {
                name: String::new(),
                kind: EntryKind::Directory,
                size: 0,
                modified: SystemTime::UNIX_EPOCH,
            });
        }
        let (parent, name) = path_utils::split(&normalized);
        self.list_dir(session, parent)?
            .into_iter()
            .find(|e| e.name == name)
            .ok_or_else(|| SmbError::PathNotFound {
                path: self.target(session, &normalized),
            })
    }

    // -- private

    fn normalize(
        &self,
        session: &Session,
        operation: &'static str,
        path: &str,
    ) -> SmbResult<String> {
        path_utils::normalize(path).ok_or_else(|| {
            error!("'{}' escapes the root of share '{}'", path, self.share);
            SmbError::AccessDenied {
                operation,
                target: self.target(session, path),
            }
        })
    }

    /// `//host:port/share/path`, for diagnostics
    fn target(&self, session: &Session, path: &str) -> String {
        format!("//{}/{}/{}", session.peer(), self.share, path)
    }
}

/// A share mounted on a [`Session`].
///
/// The mount borrows its session mutably, so it can neither outlive the session nor race
/// another operation on it. Paths are interpreted relative to the share root and may not
/// escape it. Dropping a mount unmounts the share.
#[derive(Debug)]
pub struct ShareMount<'s> {
    session: &'s mut Session,
    tree: Tree,
    mounted: bool,
}

impl<'s> ShareMount<'s> {
    /// Mount `share` on `session`
    pub fn mount(session: &'s mut Session, share: &str) -> SmbResult<Self> {
        let tree = Tree::connect(session, share)?;
        Ok(Self {
            session,
            tree,
            mounted: true,
        })
    }

    pub fn share(&self) -> &str {
        self.tree.share()
    }

    pub fn tree(&self) -> &Tree {
        &self.tree
    }

    pub fn is_mounted(&self) -> bool {
        self.mounted && self.session.is_active()
    }

    /// List the entries of the directory at `path`, in the order the server returns them.
    /// `.` and `..` are left out
    pub fn list_dir(&mut self, path: &str) -> SmbResult<Vec<DirectoryEntry>> {
        self.check_mounted("list directory")?;
        self.tree.list_dir(self.session, path)
    }

    /// Read the whole file at `path`
    pub fn read_file(&mut self, path: &str) -> SmbResult<Vec<u8>> {
        self.check_mounted("read file")?;
        self.tree.read_file(self.session, path)
    }

    /// Look up the entry at `path`; the share root is reported as a directory
    pub fn stat(&mut self, path: &str) -> SmbResult<DirectoryEntry> {
        self.check_mounted("stat")?;
        self.tree.stat(self.session, path)
    }

    /// Unmount the share. Calling it again, or after the session is gone, is a no-op
    pub fn unmount(&mut self) -> SmbResult<()> {
        if !self.mounted {
            return Ok(());
        }
        self.mounted = false;
        self.tree.disconnect(self.session)
    }

    // -- private

    fn check_mounted(&self, operation: &'static str) -> SmbResult<()> {
        if self.mounted {
            Ok(())
        } else {
            Err(SmbError::SessionInvalid { operation })
        }
    }
}

impl Drop for ShareMount<'_> {
    fn drop(&mut self) {
        if let Err(err) = self.unmount() {
            warn!("failed to unmount share '{}': {}", self.tree.share, err);
        }
    }
}
