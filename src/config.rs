//! # config
//!
//! Credentials and client configuration

use std::env;
use std::fmt;
use std::time::Duration;

use crate::error::{SmbError, SmbResult};

/// Default SMB port over direct TCP
pub const DEFAULT_PORT: u16 = 445;
/// Default bound applied to every network call
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Credentials used to authenticate the session.
///
/// The password is never printed, not even through `Debug`.
#[derive(Default, Clone, PartialEq, Eq)]
pub struct SmbCredentials {
    pub(crate) username: String,
    pub(crate) password: String,
}

impl SmbCredentials {
    pub fn new<S: AsRef<str>>(username: S) -> Self {
        Self {
            username: username.as_ref().to_string(),
            ..Default::default()
        }
    }

    /// Construct SmbCredentials with the provided password
    pub fn password<S: AsRef<str>>(mut self, password: S) -> Self {
        self.password = password.as_ref().to_string();
        self
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    /// Secret to be handed to the protocol engine
    pub fn secret(&self) -> &str {
        &self.password
    }
}

impl fmt::Debug for SmbCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SmbCredentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Configuration of an end-to-end client run
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub(crate) host: String,
    pub(crate) port: u16,
    pub(crate) share: String,
    pub(crate) credentials: SmbCredentials,
    pub(crate) directory: String,
    pub(crate) remote_path: String,
    pub(crate) timeout: Option<Duration>,
}

impl ClientConfig {
    pub fn new<S: AsRef<str>>(host: S, port: u16) -> Self {
        Self {
            host: host.as_ref().to_string(),
            port,
            share: String::new(),
            credentials: SmbCredentials::default(),
            directory: ".".to_string(),
            remote_path: String::new(),
            timeout: Some(DEFAULT_TIMEOUT),
        }
    }

    /// Parse a `host[:port]` server address
    pub fn with_address<S: AsRef<str>>(address: S) -> SmbResult<Self> {
        let address = address.as_ref();
        match address.rsplit_once(':') {
            Some((host, port)) if !host.is_empty() => Ok(Self::new(host, parse_port(port)?)),
            Some(_) => Err(SmbError::Config(format!("invalid server address '{address}'"))),
            None => Ok(Self::new(address, DEFAULT_PORT)),
        }
    }

    /// Build the configuration from `HOST`, `PORT`, `SHARE`, `USER`, `PASSWORD` and
    /// `REMOTE_PATH`
    pub fn from_env() -> SmbResult<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build the configuration from the variables `lookup` returns.
    ///
    /// Empty values count as unset. `HOST` is required and `PORT` defaults to 445; a
    /// missing share or remote path is reported by [`ClientConfig::validate`].
    pub fn from_lookup<F>(lookup: F) -> SmbResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |key: &str| lookup(key).filter(|value| !value.is_empty());
        let host = lookup("HOST")
            .ok_or_else(|| SmbError::Config("HOST is not set".to_string()))?;
        let port = match lookup("PORT") {
            Some(port) => parse_port(&port)?,
            None => DEFAULT_PORT,
        };
        let mut config = Self::new(host, port);
        if let Some(share) = lookup("SHARE") {
            config = config.share(share);
        }
        let mut credentials = SmbCredentials::new(lookup("USER").unwrap_or_default());
        if let Some(password) = lookup("PASSWORD") {
            credentials = credentials.password(password);
        }
        config = config.credentials(credentials);
        if let Some(path) = lookup("REMOTE_PATH") {
            config = config.remote_path(path);
        }
        Ok(config)
    }

    /// Construct ClientConfig with the provided share name
    pub fn share<S: AsRef<str>>(mut self, share: S) -> Self {
        self.share = share.as_ref().to_string();
        self
    }

    pub fn credentials(mut self, credentials: SmbCredentials) -> Self {
        self.credentials = credentials;
        self
    }

    /// Directory listed during a run; defaults to the share root
    pub fn directory<S: AsRef<str>>(mut self, directory: S) -> Self {
        self.directory = directory.as_ref().to_string();
        self
    }

    /// File read during a run
    pub fn remote_path<S: AsRef<str>>(mut self, path: S) -> Self {
        self.remote_path = path.as_ref().to_string();
        self
    }

    /// Bound applied to each network call. `None` blocks indefinitely
    pub fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn server_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn get_share(&self) -> &str {
        &self.share
    }

    pub fn get_credentials(&self) -> &SmbCredentials {
        &self.credentials
    }

    pub fn get_remote_path(&self) -> &str {
        &self.remote_path
    }

    pub fn get_timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Check the fields a run cannot do without
    pub fn validate(&self) -> SmbResult<()> {
        self.validate_server()?;
        if self.remote_path.is_empty() {
            return Err(SmbError::Config("remote path is empty".to_string()));
        }
        Ok(())
    }

    /// Check the fields needed to reach and mount the share
    pub fn validate_server(&self) -> SmbResult<()> {
        if self.host.is_empty() {
            return Err(SmbError::Config("server host is empty".to_string()));
        }
        if self.share.is_empty() {
            return Err(SmbError::Config("share name is empty".to_string()));
        }
        Ok(())
    }
}

fn parse_port(port: &str) -> SmbResult<u16> {
    port.parse::<u16>()
        .map_err(|_| SmbError::Config(format!("invalid port '{port}'")))
}
