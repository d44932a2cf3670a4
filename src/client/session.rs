//! # session
//!
//! Dialect negotiation, authentication and the authenticated session

use std::fmt;
use std::io;
use std::time::Duration;

use crate::client::share::ShareMount;
use crate::config::SmbCredentials;
use crate::engine::{
    Dialect, EngineError, ProtocolEngine, Request, Response, SessionToken, Status,
};
use crate::error::{SmbError, SmbResult};
use crate::transport::{Connection, Deadline};

/// Session setup legs accepted before giving up on the exchange
const MAX_AUTH_LEGS: usize = 4;

/// Lifecycle of a [`Session`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Active,
    LoggedOff,
    /// The connection was lost or the server dropped the session
    Broken,
}

/// Performs dialect negotiation and authentication over a [`Connection`].
///
/// Negotiating consumes the connection, so one connection can never carry two sessions.
#[derive(Debug, Clone)]
pub struct Negotiator {
    credentials: SmbCredentials,
    timeout: Option<Duration>,
}

impl Negotiator {
    pub fn new(credentials: SmbCredentials) -> Self {
        Self {
            credentials,
            timeout: Some(crate::config::DEFAULT_TIMEOUT),
        }
    }

    /// Bound applied to the negotiation and, later, to each session call
    pub fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Negotiate a dialect and authenticate.
    ///
    /// On failure the connection is closed and no session exists.
    pub fn negotiate<E>(&self, mut connection: Connection, engine: E) -> SmbResult<Session>
    where
        E: ProtocolEngine + 'static,
    {
        let mut engine: Box<dyn ProtocolEngine> = Box::new(engine);
        let deadline = Deadline::after(self.timeout);
        match self.handshake(&mut connection, engine.as_mut(), deadline) {
            Ok((dialect, token)) => {
                info!(
                    "session established with {} as '{}' (dialect {})",
                    connection.peer(),
                    self.credentials.username(),
                    dialect
                );
                Ok(Session {
                    connection,
                    engine,
                    dialect,
                    token,
                    user: self.credentials.username().to_string(),
                    timeout: self.timeout,
                    state: SessionState::Active,
                })
            }
            Err(err) => {
                error!("negotiation with {} failed: {}", connection.peer(), err);
                connection.close();
                Err(err)
            }
        }
    }

    // -- private

    fn handshake(
        &self,
        connection: &mut Connection,
        engine: &mut dyn ProtocolEngine,
        deadline: Deadline,
    ) -> SmbResult<(Dialect, SessionToken)> {
        let dialect = self.negotiate_dialect(connection, engine, deadline)?;
        let token = self.authenticate(connection, engine, deadline)?;
        Ok((dialect, token))
    }

    fn negotiate_dialect(
        &self,
        connection: &mut Connection,
        engine: &mut dyn ProtocolEngine,
        deadline: Deadline,
    ) -> SmbResult<Dialect> {
        let offered = engine.dialects().to_vec();
        let target = connection.peer().to_string();
        let mismatch = |reason: String| SmbError::ProtocolMismatch {
            target: target.clone(),
            reason,
        };
        if offered.is_empty() {
            return Err(mismatch("the engine offers no dialect".to_string()));
        }
        trace!(
            "offering dialects {}",
            offered
                .iter()
                .map(|d| d.to_string())
                .collect::<Vec<String>>()
                .join(", ")
        );
        match exchange(
            connection,
            engine,
            Request::Negotiate { dialects: &offered },
            deadline,
        )? {
            Ok(Response::Negotiated { dialect }) if offered.contains(&dialect) => {
                debug!("server selected dialect {}", dialect);
                Ok(dialect)
            }
            Ok(Response::Negotiated { dialect }) => Err(mismatch(format!(
                "server selected dialect {dialect}, which was not offered"
            ))),
            Err(EngineError::Status(status)) => Err(mismatch(status.to_string())),
            Ok(other) => Err(violation("negotiate", format!("unexpected {other:?}"))),
            Err(err) => Err(violation("negotiate", err.to_string())),
        }
    }

    fn authenticate(
        &self,
        connection: &mut Connection,
        engine: &mut dyn ProtocolEngine,
        deadline: Deadline,
    ) -> SmbResult<SessionToken> {
        let mut challenge: Option<Vec<u8>> = None;
        for leg in 1..=MAX_AUTH_LEGS {
            trace!("session setup leg {} for '{}'", leg, self.credentials.username());
            let request = Request::SessionSetup {
                credentials: &self.credentials,
                challenge: challenge.as_deref(),
            };
            match exchange(connection, engine, request, deadline)? {
                Ok(Response::SessionEstablished { token }) => return Ok(token),
                Ok(Response::Challenge { blob }) => challenge = Some(blob),
                Err(EngineError::Status(status)) => {
                    debug!("session setup rejected: {}", status);
                    return Err(SmbError::Authentication {
                        target: connection.peer().to_string(),
                        user: self.credentials.username().to_string(),
                    });
                }
                Ok(other) => {
                    return Err(violation("session setup", format!("unexpected {other:?}")))
                }
                Err(err) => return Err(violation("session setup", err.to_string())),
            }
        }
        Err(violation(
            "session setup",
            format!("no session after {MAX_AUTH_LEGS} legs"),
        ))
    }
}

/// An authenticated context bound to exactly one connection.
///
/// Dropping an active session logs it off and closes its connection.
pub struct Session {
    connection: Connection,
    engine: Box<dyn ProtocolEngine>,
    dialect: Dialect,
    token: SessionToken,
    user: String,
    timeout: Option<Duration>,
    state: SessionState,
}

impl Session {
    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    pub fn token(&self) -> SessionToken {
        self.token
    }

    /// Authenticated user name
    pub fn user(&self) -> &str {
        &self.user
    }

    pub fn peer(&self) -> &str {
        self.connection.peer()
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        self.state == SessionState::Active && self.connection.is_open()
    }

    /// Mount `share`, checking the user may at least read it
    pub fn mount(&mut self, share: &str) -> SmbResult<ShareMount<'_>> {
        ShareMount::mount(self, share)
    }

    /// Log off. A no-op once logged off or after the connection was lost
    pub fn logoff(&mut self) -> SmbResult<()> {
        if !self.is_active() {
            trace!("session already gone; logoff is a no-op");
            return Ok(());
        }
        debug!("logging off session on {}", self.peer());
        let result = self.call(Request::Logoff);
        if self.state == SessionState::Active {
            self.state = SessionState::LoggedOff;
        }
        match result? {
            Ok(Response::Done) => Ok(()),
            Ok(other) => Err(self.violation("logoff", format!("unexpected {other:?}"))),
            Err(status) => Err(SmbError::Io {
                operation: "logoff",
                path: self.peer().to_string(),
                reason: status.to_string(),
            }),
        }
    }

    /// Log off, then close the connection
    pub fn close(&mut self) -> SmbResult<()> {
        let result = self.logoff();
        self.connection.close();
        result
    }

    /// Send one request bounded by the session timeout.
    ///
    /// Server statuses come back as `Ok(Err(status))`; transport failures and protocol
    /// violations break the session.
    pub(crate) fn call(&mut self, request: Request<'_>) -> SmbResult<Result<Response, Status>> {
        let operation = request.name();
        if !self.is_active() {
            return Err(SmbError::SessionInvalid { operation });
        }
        let deadline = Deadline::after(self.timeout);
        let result = exchange(&mut self.connection, self.engine.as_mut(), request, deadline);
        match result {
            Err(err) => {
                self.state = SessionState::Broken;
                Err(err)
            }
            Ok(Ok(response)) => Ok(Ok(response)),
            Ok(Err(EngineError::Status(Status::UserSessionDeleted))) => {
                debug!("server dropped the session");
                self.state = SessionState::Broken;
                Err(SmbError::SessionInvalid { operation })
            }
            Ok(Err(EngineError::Status(status))) => Ok(Err(status)),
            Ok(Err(EngineError::NotAuthenticated)) => {
                self.state = SessionState::Broken;
                Err(SmbError::SessionInvalid { operation })
            }
            Ok(Err(EngineError::Malformed(reason))) => Err(self.violation(operation, reason)),
        }
    }

    /// Break the session after the server spoke out of protocol
    pub(crate) fn violation(&mut self, operation: &'static str, detail: String) -> SmbError {
        self.state = SessionState::Broken;
        self.connection.close();
        violation(operation, detail)
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("peer", &self.connection.peer())
            .field("dialect", &self.dialect)
            .field("token", &self.token)
            .field("user", &self.user)
            .field("state", &self.state)
            .finish()
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            warn!("failed to log off session: {}", err);
        }
    }
}

/// Encode `request`, ship it and decode the reply
fn exchange(
    connection: &mut Connection,
    engine: &mut dyn ProtocolEngine,
    request: Request<'_>,
    deadline: Deadline,
) -> SmbResult<Result<Response, EngineError>> {
    let operation = request.name();
    let frame = match engine.encode(request) {
        Ok(frame) => frame,
        Err(err) => return Ok(Err(err)),
    };
    let reply = connection.roundtrip(operation, &frame, deadline)?;
    Ok(engine.decode(&reply))
}

fn violation(operation: &'static str, detail: String) -> SmbError {
    error!("protocol violation during {}: {}", operation, detail);
    SmbError::Transport {
        operation,
        source: io::Error::new(io::ErrorKind::InvalidData, detail),
    }
}

#[cfg(test)]
mod test {

    use pretty_assertions::assert_eq;

    use super::*;
    use crate::engine::wire::WireEngine;
    use crate::mock::TestServer;

    fn connect(server: &TestServer) -> Connection {
        Connection::connect("127.0.0.1", server.port(), Some(Duration::from_secs(5))).unwrap()
    }

    fn negotiator(user: &str, password: &str) -> Negotiator {
        Negotiator::new(SmbCredentials::new(user).password(password))
            .timeout(Some(Duration::from_secs(5)))
    }

    #[test]
    fn should_establish_session() {
        crate::mock::logger();
        let server = TestServer::start();
        let session = negotiator("user", "password")
            .negotiate(connect(&server), WireEngine::default())
            .unwrap();
        assert!(session.is_active());
        assert_eq!(session.user(), "user");
        assert_eq!(session.dialect(), Dialect::SMB_3_1_1);
        assert_eq!(server.sessions(), 1);
    }

    #[test]
    fn should_pick_common_dialect() {
        crate::mock::logger();
        let server = TestServer::start();
        let engine = WireEngine::default().with_dialects(&[Dialect::SMB_2_1, Dialect::SMB_2_0_2]);
        let session = negotiator("user", "password")
            .negotiate(connect(&server), engine)
            .unwrap();
        assert_eq!(session.dialect(), Dialect::SMB_2_1);
    }

    #[test]
    fn should_fail_without_common_dialect() {
        crate::mock::logger();
        let server = TestServer::start();
        let engine = WireEngine::default().with_dialects(&[Dialect(0x0100)]);
        assert!(matches!(
            negotiator("user", "password").negotiate(connect(&server), engine),
            Err(SmbError::ProtocolMismatch { .. })
        ));
        assert_eq!(server.sessions(), 0);
    }

    #[test]
    fn should_reject_bad_credentials() {
        crate::mock::logger();
        let server = TestServer::start();
        for (user, password) in [("user", "wrong"), ("nobody", "password"), ("", "")] {
            let result =
                negotiator(user, password).negotiate(connect(&server), WireEngine::default());
            assert!(
                matches!(result, Err(SmbError::Authentication { .. })),
                "{user}/{password} should be rejected"
            );
        }
        assert_eq!(server.sessions(), 0);
        server.wait_idle();
    }

    #[test]
    fn should_not_put_password_in_errors() {
        crate::mock::logger();
        let server = TestServer::start();
        let err = negotiator("user", "s3cr3t")
            .negotiate(connect(&server), WireEngine::default())
            .unwrap_err();
        assert!(!err.to_string().contains("s3cr3t"));
    }

    #[test]
    fn should_logoff_twice() {
        crate::mock::logger();
        let server = TestServer::start();
        let mut session = negotiator("user", "password")
            .negotiate(connect(&server), WireEngine::default())
            .unwrap();
        assert!(session.logoff().is_ok());
        assert_eq!(session.state(), SessionState::LoggedOff);
        assert_eq!(server.sessions(), 0);
        assert!(session.logoff().is_ok());
        assert!(matches!(
            session.mount("public"),
            Err(SmbError::SessionInvalid { .. })
        ));
    }

    #[test]
    fn should_logoff_and_close_on_drop() {
        crate::mock::logger();
        let server = TestServer::start();
        let session = negotiator("user", "password")
            .negotiate(connect(&server), WireEngine::default())
            .unwrap();
        assert_eq!(server.sessions(), 1);
        drop(session);
        server.wait_idle();
        assert_eq!(server.sessions(), 0);
    }

    #[test]
    fn should_break_session_when_server_goes_away() {
        crate::mock::logger();
        let server = TestServer::start();
        let mut session = negotiator("user", "password")
            .negotiate(connect(&server), WireEngine::default())
            .unwrap();
        server.kill_connections();
        assert!(session.mount("public").is_err());
        assert_eq!(session.state(), SessionState::Broken);
        assert!(matches!(
            session.mount("public"),
            Err(SmbError::SessionInvalid { .. })
        ));
        // logoff after connection loss is a no-op
        assert!(session.logoff().is_ok());
    }

    #[test]
    fn should_time_out_negotiation_against_silent_server() {
        crate::mock::logger();
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let conn = Connection::connect("127.0.0.1", port, None).unwrap();
        let started = std::time::Instant::now();
        let result = Negotiator::new(SmbCredentials::new("user").password("password"))
            .timeout(Some(Duration::from_millis(500)))
            .negotiate(conn, WireEngine::default());
        assert!(matches!(result, Err(SmbError::Transport { .. })));
        assert!(started.elapsed() < Duration::from_secs(2));
        drop(listener);
    }
}
