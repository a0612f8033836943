//! Non-blocking TCP connection.
//!
//! Wraps a `std::net::TcpStream` in non-blocking mode together with a
//! [`PduBuffer`], so that every [`read_frame`](Connection::read_frame) call
//! performs at most one socket read and yields at most one PDU.
//!
//! # Example
//!
//! ```no_run
//! use z3950_client::transport::{Connection, FrameRead, TcpConnection};
//!
//! let mut conn = TcpConnection::connect("tcp:z3950.loc.gov:7090")?;
//! match conn.read_frame()? {
//!     FrameRead::Pdu(bytes) => println!("{} byte PDU", bytes.len()),
//!     FrameRead::Incomplete => println!("not yet"),
//!     FrameRead::Closed => println!("server hung up"),
//! }
//! # Ok::<(), std::io::Error>(())
//! ```

use std::io::{self, Read, Write};
use std::net::{Shutdown, TcpStream};

use super::{Connection, FrameRead};
use crate::error::Z3950Error;
use crate::protocol::{PduBuffer, DEFAULT_MAX_PDU_SIZE};

/// Well-known Z39.50 port.
pub const DEFAULT_PORT: u16 = 210;

/// Default socket read size (64 KiB).
const DEFAULT_READ_SIZE: usize = 64 * 1024;

/// Normalise a YAZ-style address to `host:port`.
///
/// Accepts `host:port`, `tcp:host:port` and a bare `host` (port 210).
///
/// ```
/// use z3950_client::transport::host_port;
///
/// assert_eq!(host_port("tcp:localhost:9999"), "localhost:9999");
/// assert_eq!(host_port("z3950.example.org"), "z3950.example.org:210");
/// ```
pub fn host_port(addr: &str) -> String {
    let addr = addr.strip_prefix("tcp:").unwrap_or(addr);
    if addr.contains(':') {
        addr.to_string()
    } else {
        format!("{}:{}", addr, DEFAULT_PORT)
    }
}

/// TCP connection that frames BER PDUs.
#[derive(Debug)]
pub struct TcpConnection {
    stream: TcpStream,
    buffer: PduBuffer,
    read_buf: Vec<u8>,
}

impl TcpConnection {
    /// Connect to `addr` (see [`host_port`]) and switch to non-blocking mode.
    pub fn connect(addr: &str) -> io::Result<Self> {
        let stream = TcpStream::connect(host_port(addr))?;
        Self::from_stream(stream)
    }

    /// Take over an already connected stream.
    pub fn from_stream(stream: TcpStream) -> io::Result<Self> {
        Self::with_limits(stream, DEFAULT_READ_SIZE, DEFAULT_MAX_PDU_SIZE)
    }

    /// Take over a stream with a custom read size and maximum PDU size.
    pub fn with_limits(stream: TcpStream, read_size: usize, max_pdu_size: usize) -> io::Result<Self> {
        stream.set_nonblocking(true)?;
        stream.set_nodelay(true)?;
        Ok(Self {
            stream,
            buffer: PduBuffer::with_max_pdu(max_pdu_size),
            read_buf: vec![0; read_size.max(1)],
        })
    }

    /// Get a reference to the underlying stream.
    pub fn inner(&self) -> &TcpStream {
        &self.stream
    }

    fn next_buffered(&mut self) -> io::Result<Option<FrameRead>> {
        // Bad framing leaves the stream out of sync.
        self.buffer
            .next_pdu()
            .map(|pdu| pdu.map(FrameRead::Pdu))
            .map_err(|e: Z3950Error| io::Error::new(io::ErrorKind::InvalidData, e.to_string()))
    }
}

impl Connection for TcpConnection {
    fn pending_error(&self) -> io::Result<Option<io::Error>> {
        self.stream.take_error()
    }

    fn complete_connect(&mut self) -> io::Result<()> {
        if let Some(e) = self.stream.take_error()? {
            return Err(e);
        }
        self.stream.peer_addr().map(|_| ())
    }

    fn read_frame(&mut self) -> io::Result<FrameRead> {
        // A previous read may have delivered more than one PDU.
        if let Some(frame) = self.next_buffered()? {
            return Ok(frame);
        }

        let n = match self.stream.read(&mut self.read_buf) {
            Ok(0) => return Ok(FrameRead::Closed),
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(FrameRead::Incomplete),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => return Ok(FrameRead::Incomplete),
            Err(e) => return Err(e),
        };
        self.buffer.extend(&self.read_buf[..n]);

        Ok(self.next_buffered()?.unwrap_or(FrameRead::Incomplete))
    }

    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.stream.write(data)
    }

    fn close(&mut self) -> io::Result<()> {
        self.buffer.clear();
        match self.stream.shutdown(Shutdown::Both) {
            Err(e) if e.kind() != io::ErrorKind::NotConnected => Err(e),
            _ => Ok(()),
        }
    }
}

#[cfg(unix)]
impl std::os::unix::io::AsRawFd for TcpConnection {
    fn as_raw_fd(&self) -> std::os::unix::io::RawFd {
        self.stream.as_raw_fd()
    }
}
