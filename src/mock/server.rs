//! ## server
//!
//! In-process file server speaking the wire engine protocol.
//!
//! Users: `user` / `password`. Shares:
//!
//! - `public`: `a.txt`, `b.txt`, `hello.txt` ("hello world"), `locked.txt` (read denied),
//!   `docs/` with `docs/c.txt`
//! - `dropbox`: mountable, but grants write access only
//! - `admin$`: tree connect denied

use std::collections::{BTreeMap, HashMap, HashSet};
use std::net::{Shutdown, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant, SystemTime};

use rand::Rng;

use crate::engine::wire::{verify_proof, WireRequest, WireResponse};
use crate::engine::{AccessMask, Dialect, DirectoryEntry, EntryKind, Status};
use crate::transport::{read_frame, write_frame};
use crate::utils::path;

const SERVER_DIALECTS: [Dialect; 5] = [
    Dialect::SMB_2_0_2,
    Dialect::SMB_2_1,
    Dialect::SMB_3_0,
    Dialect::SMB_3_0_2,
    Dialect::SMB_3_1_1,
];

enum Node {
    Dir,
    File { bytes: Vec<u8>, locked: bool },
}

struct Share {
    access: AccessMask,
    denied: bool,
    nodes: BTreeMap<String, Node>,
}

#[derive(Default)]
struct State {
    users: HashMap<String, String>,
    shares: HashMap<String, Share>,
    sessions: AtomicUsize,
    connections: AtomicUsize,
    next_session: AtomicU64,
    next_tree: AtomicU32,
    streams: Mutex<Vec<TcpStream>>,
    stop: AtomicBool,
}

pub struct TestServer {
    port: u16,
    state: Arc<State>,
    acceptor: Option<JoinHandle<()>>,
}

impl TestServer {
    /// Start a server on a random local port
    pub fn start() -> Self {
        Self::start_on(0)
    }

    /// Start a server on `port`
    pub fn start_on(port: u16) -> Self {
        let listener = TcpListener::bind(("127.0.0.1", port)).unwrap();
        let port = listener.local_addr().unwrap().port();
        let state = Arc::new(fixture());
        let acceptor = {
            let state = state.clone();
            thread::spawn(move || accept(listener, state))
        };
        Self {
            port,
            state,
            acceptor: Some(acceptor),
        }
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Sessions currently established
    pub fn sessions(&self) -> usize {
        self.state.sessions.load(Ordering::SeqCst)
    }

    /// Connections currently open
    pub fn connections(&self) -> usize {
        self.state.connections.load(Ordering::SeqCst)
    }

    /// Wait until every client connection has been closed
    pub fn wait_idle(&self) {
        let started = Instant::now();
        while self.connections() > 0 {
            assert!(
                started.elapsed() < Duration::from_secs(3),
                "{} connection(s) still open",
                self.connections()
            );
            thread::sleep(Duration::from_millis(10));
        }
    }

    /// Drop every client connection from the server side
    pub fn kill_connections(&self) {
        for stream in self.state.streams.lock().unwrap().drain(..) {
            let _ = stream.shutdown(Shutdown::Both);
        }
        self.wait_idle();
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.state.stop.store(true, Ordering::SeqCst);
        // wake up the acceptor
        let _ = TcpStream::connect(("127.0.0.1", self.port));
        for stream in self.state.streams.lock().unwrap().drain(..) {
            let _ = stream.shutdown(Shutdown::Both);
        }
        if let Some(acceptor) = self.acceptor.take() {
            let _ = acceptor.join();
        }
    }
}

fn fixture() -> State {
    let file = |content: &str| Node::File {
        bytes: content.as_bytes().to_vec(),
        locked: false,
    };
    let mut public = BTreeMap::new();
    public.insert("a.txt".to_string(), file("a"));
    public.insert("b.txt".to_string(), file("bb"));
    public.insert("docs".to_string(), Node::Dir);
    public.insert("docs/c.txt".to_string(), file("ccc"));
    public.insert("hello.txt".to_string(), file("hello world"));
    public.insert(
        "locked.txt".to_string(),
        Node::File {
            bytes: b"top secret".to_vec(),
            locked: true,
        },
    );
    let mut shares = HashMap::new();
    shares.insert(
        "public".to_string(),
        Share {
            access: AccessMask::READ_DATA | AccessMask::READ_ATTRIBUTES,
            denied: false,
            nodes: public,
        },
    );
    shares.insert(
        "dropbox".to_string(),
        Share {
            access: AccessMask::WRITE_DATA | AccessMask::APPEND_DATA,
            denied: false,
            nodes: BTreeMap::new(),
        },
    );
    shares.insert(
        "admin$".to_string(),
        Share {
            access: AccessMask::GENERIC_ALL,
            denied: true,
            nodes: BTreeMap::new(),
        },
    );
    State {
        users: HashMap::from([("user".to_string(), "password".to_string())]),
        shares,
        next_session: AtomicU64::new(1),
        next_tree: AtomicU32::new(1),
        ..Default::default()
    }
}

fn accept(listener: TcpListener, state: Arc<State>) {
    for stream in listener.incoming() {
        if state.stop.load(Ordering::SeqCst) {
            break;
        }
        let Ok(stream) = stream else { continue };
        if let Ok(clone) = stream.try_clone() {
            state.streams.lock().unwrap().push(clone);
        }
        state.connections.fetch_add(1, Ordering::SeqCst);
        let state = state.clone();
        thread::spawn(move || {
            let mut conn = ServerConnection::default();
            conn.serve(stream, &state);
            // sessions die with their connection
            state.sessions.fetch_sub(conn.sessions.len(), Ordering::SeqCst);
            state.connections.fetch_sub(1, Ordering::SeqCst);
        });
    }
}

#[derive(Default)]
struct ServerConnection {
    dialect: Option<Dialect>,
    challenge: Option<Vec<u8>>,
    sessions: HashSet<u64>,
    trees: HashMap<u32, String>,
}

impl ServerConnection {
    fn serve(&mut self, mut stream: TcpStream, state: &State) {
        while let Ok(frame) = read_frame(&mut stream) {
            let Ok(request) = WireRequest::from_bytes(&frame) else {
                break;
            };
            let response = self.handle(request, state);
            let Ok(bytes) = response.to_bytes() else {
                break;
            };
            if write_frame(&mut stream, &bytes).is_err() {
                break;
            }
        }
    }

    fn handle(&mut self, request: WireRequest, state: &State) -> WireResponse {
        match request {
            WireRequest::Negotiate { dialects } => {
                match dialects
                    .into_iter()
                    .filter(|d| SERVER_DIALECTS.contains(d))
                    .max()
                {
                    Some(dialect) => {
                        self.dialect = Some(dialect);
                        WireResponse::Negotiated { dialect }
                    }
                    None => error(Status::NoCommonDialect),
                }
            }
            WireRequest::SessionSetup { .. } if self.dialect.is_none() => {
                error(Status::Other(0xC000_0022))
            }
            WireRequest::SessionSetup { proof: None, .. } => {
                let mut nonce = vec![0u8; 16];
                rand::thread_rng().fill(&mut nonce[..]);
                self.challenge = Some(nonce.clone());
                WireResponse::Challenge { nonce }
            }
            WireRequest::SessionSetup {
                username,
                proof: Some(proof),
            } => {
                let challenge = self.challenge.take();
                match (state.users.get(&username), challenge) {
                    (Some(secret), Some(challenge))
                        if verify_proof(secret, &challenge, &username, &proof) =>
                    {
                        let session = state.next_session.fetch_add(1, Ordering::SeqCst);
                        self.sessions.insert(session);
                        state.sessions.fetch_add(1, Ordering::SeqCst);
                        WireResponse::SessionEstablished { session }
                    }
                    _ => error(Status::LogonFailure),
                }
            }
            WireRequest::TreeConnect { session, .. } if !self.sessions.contains(&session) => {
                error(Status::UserSessionDeleted)
            }
            WireRequest::TreeConnect { share, .. } => match state.shares.get(&share) {
                None => error(Status::BadNetworkName),
                Some(s) if s.denied => error(Status::AccessDenied),
                Some(s) => {
                    let tree = state.next_tree.fetch_add(1, Ordering::SeqCst);
                    self.trees.insert(tree, share);
                    WireResponse::TreeConnected {
                        tree,
                        access: s.access,
                    }
                }
            },
            WireRequest::QueryDirectory {
                session,
                tree,
                path,
            } => match self.share(session, tree, state) {
                Err(status) => error(status),
                Ok(share) => list(share, &path),
            },
            WireRequest::Read {
                session,
                tree,
                path,
            } => match self.share(session, tree, state) {
                Err(status) => error(status),
                Ok(share) => read(share, &path),
            },
            WireRequest::TreeDisconnect { session, tree } => {
                if !self.sessions.contains(&session) {
                    return error(Status::UserSessionDeleted);
                }
                self.trees.remove(&tree);
                WireResponse::Done
            }
            WireRequest::Logoff { session } => {
                if self.sessions.remove(&session) {
                    state.sessions.fetch_sub(1, Ordering::SeqCst);
                    WireResponse::Done
                } else {
                    error(Status::UserSessionDeleted)
                }
            }
        }
    }

    fn share<'a>(&self, session: u64, tree: u32, state: &'a State) -> Result<&'a Share, Status> {
        if !self.sessions.contains(&session) {
            return Err(Status::UserSessionDeleted);
        }
        self.trees
            .get(&tree)
            .and_then(|name| state.shares.get(name))
            .ok_or(Status::Other(0xC000_00C9))
    }
}

fn list(share: &Share, dir: &str) -> WireResponse {
    let Some(dir) = path::normalize(dir) else {
        return error(Status::AccessDenied);
    };
    match share.nodes.get(&dir) {
        Some(Node::File { .. }) => return error(Status::NotADirectory),
        None if !dir.is_empty() => return error(Status::ObjectNameNotFound),
        _ => {}
    }
    let mut entries = vec![dot_entry("."), dot_entry("..")];
    entries.extend(
        share
            .nodes
            .iter()
            .filter(|(p, _)| path::split(p).0 == dir)
            .map(|(p, node)| DirectoryEntry {
                name: path::split(p).1.to_string(),
                kind: match node {
                    Node::Dir => EntryKind::Directory,
                    Node::File { .. } => EntryKind::File,
                },
                size: match node {
                    Node::Dir => 0,
                    Node::File { bytes, .. } => bytes.len() as u64,
                },
                modified: SystemTime::UNIX_EPOCH,
            }),
    );
    WireResponse::Directory { entries }
}

fn read(share: &Share, file: &str) -> WireResponse {
    let Some(file) = path::normalize(file) else {
        return error(Status::AccessDenied);
    };
    match share.nodes.get(&file) {
        None if file.is_empty() => error(Status::FileIsADirectory),
        None => error(Status::ObjectNameNotFound),
        Some(Node::Dir) => error(Status::FileIsADirectory),
        Some(Node::File { locked: true, .. }) => error(Status::AccessDenied),
        Some(Node::File { bytes, .. }) => WireResponse::Data {
            bytes: bytes.clone(),
        },
    }
}

fn dot_entry(name: &str) -> DirectoryEntry {
    DirectoryEntry {
        name: name.to_string(),
        kind: EntryKind::Directory,
        size: 0,
        modified: SystemTime::UNIX_EPOCH,
    }
}

fn error(status: Status) -> WireResponse {
    WireResponse::Error { status }
}
