//! # facade
//!
//! End-to-end run: connect, negotiate, mount, list and read

use crate::client::session::Negotiator;
use crate::config::ClientConfig;
use crate::engine::{DirectoryEntry, ProtocolEngine};
use crate::error::{RunError, Step};
use crate::transport::Connection;

/// What a successful run produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOutput {
    /// Entries of the listed directory
    pub entries: Vec<DirectoryEntry>,
    /// Content of the remote file
    pub content: Vec<u8>,
}

/// Client facade.
///
/// One `SmbClient` performs exactly one run. Nothing is retried: the first failing step
/// aborts the run, and everything acquired up to that point is released in reverse order
/// (unmount, logoff, close) before the error is returned.
pub struct SmbClient<E: ProtocolEngine + 'static> {
    config: ClientConfig,
    engine: E,
}

impl<E: ProtocolEngine + 'static> SmbClient<E> {
    pub fn new(config: ClientConfig, engine: E) -> Self {
        Self { config, engine }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Run connect → negotiate → mount → list → read
    pub fn run(self) -> Result<RunOutput, RunError> {
        self.run_with(|_| {})
    }

    /// Like [`SmbClient::run`], handing the listing to `on_listing` as soon as it is
    /// available, before the file is read
    pub fn run_with<F>(self, on_listing: F) -> Result<RunOutput, RunError>
    where
        F: FnOnce(&[DirectoryEntry]),
    {
        let Self { config, engine } = self;
        config.validate().map_err(RunError::at(Step::Connect))?;
        let address = config.server_address();

        info!("connecting to {}...", address);
        let connection = Connection::connect(&config.host, config.port, config.timeout)
            .map_err(RunError::at(Step::Connect))?;

        info!("authenticating as '{}'...", config.credentials.username());
        let mut session = Negotiator::new(config.credentials.clone())
            .timeout(config.timeout)
            .negotiate(connection, engine)
            .map_err(RunError::at(Step::Negotiate))?;
        info!("connected to {} (dialect {})", address, session.dialect());

        let result = (|| -> Result<RunOutput, RunError> {
            let mut mount = session
                .mount(&config.share)
                .map_err(RunError::at(Step::Mount))?;
            info!("mounted share '{}'", config.share);

            let entries = mount
                .list_dir(&config.directory)
                .map_err(RunError::at(Step::ListDirectory))?;
            debug!("{} entries in '{}'", entries.len(), config.directory);
            on_listing(&entries);

            let content = mount
                .read_file(&config.remote_path)
                .map_err(RunError::at(Step::ReadFile))?;
            debug!("read {} bytes from '{}'", content.len(), config.remote_path);

            if let Err(err) = mount.unmount() {
                warn!("failed to unmount share '{}': {}", config.share, err);
            }
            Ok(RunOutput { entries, content })
        })();

        if let Err(err) = &result {
            error!("{}", err);
        }
        if let Err(err) = session.close() {
            warn!("failed to close session: {}", err);
        }
        info!("disconnected from {}", address);
        result
    }
}
