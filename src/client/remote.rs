//! # remote
//!
//! `remotefs::RemoteFs` implementation on top of the client core.
//! The file system is read-only: every mutating operation is reported as unsupported.

use std::io::Write;
use std::path::{Path, PathBuf};

use remotefs::fs::{File, Metadata, ReadStream, UnixPex, Welcome, WriteStream};
use remotefs::{RemoteError, RemoteErrorType, RemoteFs, RemoteResult};

use crate::client::session::{Negotiator, Session};
use crate::client::share::Tree;
use crate::config::ClientConfig;
use crate::engine::ProtocolEngine;
use crate::transport::Connection;
use crate::utils::{path as path_utils, smb as smb_utils};

type EngineFactory = Box<dyn Fn() -> Box<dyn ProtocolEngine> + Send>;

/// SMB file system client
pub struct SmbFs {
    config: ClientConfig,
    engine_factory: EngineFactory,
    session: Option<Session>,
    tree: Option<Tree>,
    wrkdir: PathBuf,
}

impl SmbFs {
    /// Create a new `SmbFs`. `engine_factory` provides a fresh engine for every `connect()`
    pub fn new<F, E>(config: ClientConfig, engine_factory: F) -> Self
    where
        F: Fn() -> E + Send + 'static,
        E: ProtocolEngine + 'static,
    {
        Self {
            config,
            engine_factory: Box::new(move || Box::new(engine_factory()) as Box<dyn ProtocolEngine>),
            session: None,
            tree: None,
            wrkdir: PathBuf::from("/"),
        }
    }

    /// Return a reference to the current session, if connected
    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    // -- private

    fn check_connection(&mut self) -> RemoteResult<(&mut Session, &Tree)> {
        trace!("checking connection...");
        match (self.session.as_mut(), self.tree.as_ref()) {
            (Some(session), Some(tree)) if session.is_active() => {
                trace!("connection OK");
                Ok((session, tree))
            }
            _ => {
                error!("connection ERROR: not connected");
                Err(RemoteError::new(RemoteErrorType::NotConnected))
            }
        }
    }

    /// Resolve `p` against the working directory into a share-relative path
    fn get_uri<P: AsRef<Path>>(&self, p: P) -> RemoteResult<String> {
        let p = path_utils::absolutize(self.wrkdir.as_path(), p.as_ref());
        path_utils::normalize(&p).ok_or_else(|| {
            RemoteError::new_ex(RemoteErrorType::BadFile, "path escapes the share root")
        })
    }

    fn unsupported<T>() -> RemoteResult<T> {
        Err(RemoteError::new(RemoteErrorType::UnsupportedFeature))
    }
}

/// Absolute path of a share-relative uri
fn absolute(uri: &str) -> PathBuf {
    PathBuf::from(format!("/{uri}"))
}

impl RemoteFs for SmbFs {
    fn connect(&mut self) -> RemoteResult<Welcome> {
        if self.is_connected() {
            return Err(RemoteError::new(RemoteErrorType::AlreadyConnected));
        }
        self.config.validate_server()?;
        let connection =
            Connection::connect(&self.config.host, self.config.port, self.config.timeout)?;
        let mut session = Negotiator::new(self.config.credentials.clone())
            .timeout(self.config.timeout)
            .negotiate(connection, (self.engine_factory)())?;
        let tree = Tree::connect(&mut session, &self.config.share)?;
        info!(
            "connected to {} and mounted '{}'",
            session.peer(),
            tree.share()
        );
        self.session = Some(session);
        self.tree = Some(tree);
        self.wrkdir = PathBuf::from("/");
        Ok(Welcome::default())
    }

    fn disconnect(&mut self) -> RemoteResult<()> {
        let (mut session, tree) = match (self.session.take(), self.tree.take()) {
            (Some(session), Some(tree)) => (session, tree),
            _ => return Err(RemoteError::new(RemoteErrorType::NotConnected)),
        };
        if let Err(err) = tree.disconnect(&mut session) {
            warn!("failed to unmount share '{}': {}", tree.share(), err);
        }
        session.close().map_err(RemoteError::from)
    }

    fn is_connected(&mut self) -> bool {
        self.session.as_ref().map(|s| s.is_active()).unwrap_or(false)
    }

    fn pwd(&mut self) -> RemoteResult<PathBuf> {
        self.check_connection()?;
        Ok(self.wrkdir.clone())
    }

    fn change_dir(&mut self, dir: &Path) -> RemoteResult<PathBuf> {
        let uri = self.get_uri(dir)?;
        trace!("changing directory to /{}", uri);
        // check if directory exists
        if self.stat(absolute(&uri).as_path())?.is_dir() {
            self.wrkdir = absolute(&uri);
            debug!("new working directory: {}", self.wrkdir.display());
            Ok(self.wrkdir.clone())
        } else {
            error!("cannot enter directory /{}. Not a directory", uri);
            Err(RemoteError::new_ex(
                RemoteErrorType::BadFile,
                "not a directory",
            ))
        }
    }

    fn list_dir(&mut self, path: &Path) -> RemoteResult<Vec<File>> {
        let uri = self.get_uri(path)?;
        let (session, tree) = self.check_connection()?;
        trace!("listing files at /{}", uri);
        let parent = absolute(&uri);
        Ok(tree
            .list_dir(session, &uri)?
            .into_iter()
            .map(|entry| smb_utils::entry_to_file(&parent, entry))
            .collect())
    }

    fn stat(&mut self, path: &Path) -> RemoteResult<File> {
        let uri = self.get_uri(path)?;
        let (session, tree) = self.check_connection()?;
        trace!("get stat for /{}", uri);
        let entry = tree.stat(session, &uri)?;
        let (parent, _) = path_utils::split(&uri);
        Ok(smb_utils::entry_to_file(&absolute(parent), entry))
    }

    fn setstat(&mut self, _path: &Path, _metadata: Metadata) -> RemoteResult<()> {
        Self::unsupported()
    }

    fn exists(&mut self, path: &Path) -> RemoteResult<bool> {
        trace!("checking if {} exists...", path.display());
        match self.stat(path) {
            Ok(_) => Ok(true),
            Err(RemoteError {
                kind: RemoteErrorType::NoSuchFileOrDirectory,
                ..
            }) => Ok(false),
            Err(err) => Err(err),
        }
    }

    fn remove_file(&mut self, _path: &Path) -> RemoteResult<()> {
        Self::unsupported()
    }

    fn remove_dir(&mut self, _path: &Path) -> RemoteResult<()> {
        Self::unsupported()
    }

    fn create_dir(&mut self, _path: &Path, _mode: UnixPex) -> RemoteResult<()> {
        Self::unsupported()
    }

    fn symlink(&mut self, _path: &Path, _target: &Path) -> RemoteResult<()> {
        Self::unsupported()
    }

    fn copy(&mut self, _src: &Path, _dest: &Path) -> RemoteResult<()> {
        Self::unsupported()
    }

    fn mov(&mut self, _src: &Path, _dest: &Path) -> RemoteResult<()> {
        Self::unsupported()
    }

    fn exec(&mut self, _cmd: &str) -> RemoteResult<(u32, String)> {
        Self::unsupported()
    }

    fn open_file(&mut self, path: &Path, mut dest: Box<dyn Write + Send>) -> RemoteResult<u64> {
        let uri = self.get_uri(path)?;
        let (session, tree) = self.check_connection()?;
        trace!("opening file at /{} for read", uri);
        let bytes = tree.read_file(session, &uri)?;
        dest.write_all(&bytes)
            .and_then(|_| dest.flush())
            .map_err(|e| RemoteError::new_ex(RemoteErrorType::IoError, e))?;
        Ok(bytes.len() as u64)
    }

    fn append(&mut self, _path: &Path, _metadata: &Metadata) -> RemoteResult<WriteStream> {
        Self::unsupported()
    }

    fn create(&mut self, _path: &Path, _metadata: &Metadata) -> RemoteResult<WriteStream> {
        Self::unsupported()
    }

    fn open(&mut self, _path: &Path) -> RemoteResult<ReadStream> {
        Self::unsupported()
    }
}
