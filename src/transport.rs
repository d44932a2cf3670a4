//! # transport
//!
//! Byte-stream connection to the file server, carrying length-prefixed frames

use std::io::{self, Read, Write};
use std::net::{IpAddr, Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

use crate::error::{SmbError, SmbResult};

/// Largest payload the 24-bit frame length can describe
pub const MAX_FRAME_SIZE: usize = 0x00FF_FFFF;

/// Point in time after which a call must give up
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    at: Option<Instant>,
}

impl Deadline {
    /// Deadline `timeout` from now; `None`, or a timeout too large to represent, never expires
    pub fn after(timeout: Option<Duration>) -> Self {
        Self {
            at: timeout.and_then(|t| Instant::now().checked_add(t)),
        }
    }

    /// Time left before the deadline. Fails with `TimedOut` once expired
    pub fn remaining(&self) -> io::Result<Option<Duration>> {
        match self.at {
            None => Ok(None),
            Some(at) => {
                let left = at.saturating_duration_since(Instant::now());
                if left.is_zero() {
                    Err(io::Error::new(io::ErrorKind::TimedOut, "deadline expired"))
                } else {
                    Ok(Some(left))
                }
            }
        }
    }
}

/// An open byte stream to `(host, port)`.
///
/// Once an I/O operation fails the socket is shut down and the connection stays closed;
/// there is no implicit reconnect.
#[derive(Debug)]
pub struct Connection {
    stream: Option<TcpStream>,
    peer: String,
}

impl Connection {
    /// Open a connection to `host:port`, giving up after `timeout`.
    ///
    /// Name resolution counts against `timeout` too.
    pub fn connect(host: &str, port: u16, timeout: Option<Duration>) -> SmbResult<Self> {
        let peer = format!("{host}:{port}");
        let connect_err = |source: io::Error| SmbError::Connect {
            target: peer.clone(),
            source,
        };
        trace!("resolving {}", peer);
        let deadline = Deadline::after(timeout);
        let addrs = resolve(host, port, deadline).map_err(connect_err)?;
        let mut last_err = io::Error::new(io::ErrorKind::NotFound, "address did not resolve");
        for addr in addrs {
            let remaining = deadline.remaining().map_err(connect_err)?;
            trace!("connecting to {}", addr);
            let attempt = match remaining {
                Some(remaining) => TcpStream::connect_timeout(&addr, remaining),
                None => TcpStream::connect(addr),
            };
            match attempt {
                Ok(stream) => {
                    let _ = stream.set_nodelay(true);
                    debug!("connected to {} ({})", peer, addr);
                    return Ok(Self {
                        stream: Some(stream),
                        peer: peer.clone(),
                    });
                }
                Err(err) => {
                    debug!("could not connect to {}: {}", addr, err);
                    last_err = err;
                }
            }
        }
        error!("failed to connect to {}: {}", peer, last_err);
        Err(connect_err(last_err))
    }

    /// `host:port` this connection was opened to
    pub fn peer(&self) -> &str {
        &self.peer
    }

    pub fn is_open(&self) -> bool {
        self.stream.is_some()
    }

    /// Write one frame
    pub fn send(
        &mut self,
        operation: &'static str,
        frame: &[u8],
        deadline: Deadline,
    ) -> SmbResult<()> {
        let result = self.stream_for(deadline).and_then(|stream| {
            stream.set_write_timeout(deadline.remaining()?)?;
            write_frame(stream, frame)
        });
        self.check(operation, result)
    }

    /// Read one frame
    pub fn receive(&mut self, operation: &'static str, deadline: Deadline) -> SmbResult<Vec<u8>> {
        let result = self.stream_for(deadline).and_then(|stream| {
            stream.set_read_timeout(deadline.remaining()?)?;
            read_frame(stream)
        });
        self.check(operation, result)
    }

    /// Send a frame and wait for the frame answering it
    pub fn roundtrip(
        &mut self,
        operation: &'static str,
        frame: &[u8],
        deadline: Deadline,
    ) -> SmbResult<Vec<u8>> {
        self.send(operation, frame, deadline)?;
        self.receive(operation, deadline)
    }

    /// Release the socket. Calling it again is a no-op
    pub fn close(&mut self) {
        if let Some(stream) = self.stream.take() {
            debug!("closing connection to {}", self.peer);
            let _ = stream.shutdown(Shutdown::Both);
        }
    }

    // -- private

    fn stream_for(&mut self, deadline: Deadline) -> io::Result<&mut TcpStream> {
        deadline.remaining()?;
        self.stream
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "connection is closed"))
    }

    fn check<T>(&mut self, operation: &'static str, result: io::Result<T>) -> SmbResult<T> {
        result.map_err(|source| {
            error!(
                "{} on {} failed: {}; dropping connection",
                operation, self.peer, source
            );
            self.close();
            SmbError::Transport { operation, source }
        })
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.close();
    }
}

/// Resolve `host`, giving up at `deadline`.
///
/// The lookup blocks in the system resolver, so a bounded lookup runs on its own thread,
/// which is left to finish on its own once the deadline passed.
fn resolve(host: &str, port: u16, deadline: Deadline) -> io::Result<Vec<SocketAddr>> {
    if let Ok(ip) = host.parse::<IpAddr>() {
        return Ok(vec![SocketAddr::new(ip, port)]);
    }
    let Some(remaining) = deadline.remaining()? else {
        return Ok((host, port).to_socket_addrs()?.collect());
    };
    let (tx, rx) = mpsc::channel();
    let name = host.to_string();
    thread::Builder::new()
        .name("smb-resolver".to_string())
        .spawn(move || {
            let result = (name.as_str(), port)
                .to_socket_addrs()
                .map(|addrs| addrs.collect::<Vec<SocketAddr>>());
            let _ = tx.send(result);
        })?;
    match rx.recv_timeout(remaining) {
        Ok(result) => result,
        Err(mpsc::RecvTimeoutError::Timeout) => Err(io::Error::new(
            io::ErrorKind::TimedOut,
            format!("resolving {host} timed out"),
        )),
        Err(mpsc::RecvTimeoutError::Disconnected) => Err(io::Error::new(
            io::ErrorKind::Other,
            format!("resolver for {host} went away"),
        )),
    }
}

/// Write `payload` preceded by a zero byte and its 24-bit big-endian length
pub fn write_frame<W: Write>(writer: &mut W, payload: &[u8]) -> io::Result<()> {
    if payload.len() > MAX_FRAME_SIZE {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("frame of {} bytes exceeds {MAX_FRAME_SIZE}", payload.len()),
        ));
    }
    let len = (payload.len() as u32).to_be_bytes();
    writer.write_all(&[0, len[1], len[2], len[3]])?;
    writer.write_all(payload)?;
    writer.flush()
}

/// Read a frame written by [`write_frame`]
pub fn read_frame<R: Read>(reader: &mut R) -> io::Result<Vec<u8>> {
    let mut header = [0u8; 4];
    reader.read_exact(&mut header)?;
    if header[0] != 0 {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("unexpected frame type {:#04x}", header[0]),
        ));
    }
    let len = u32::from_be_bytes([0, header[1], header[2], header[3]]) as usize;
    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload)?;
    Ok(payload)
}
