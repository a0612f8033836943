//! Transport module - connection abstraction and readiness probe.
//!
//! The synchronous read path only ever borrows a [`Connection`] for one call:
//!
//! ```text
//! probe ──Connecting──▶ complete_connect
//!   │
//!   └─DataReady──▶ read_frame ──▶ Pdu(bytes) | Closed | Incomplete
//! ```
//!
//! A connection recognises PDU boundaries itself, so `read_frame` never
//! hands out a partial PDU.

mod tcp;

use std::io;

use bytes::Bytes;

pub use tcp::{host_port, TcpConnection, DEFAULT_PORT};

/// Result of [`probe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    /// A non-blocking connect has not finished yet.
    Connecting,
    /// The connection can be read from.
    DataReady,
}

/// Result of one [`Connection::read_frame`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameRead {
    /// One whole PDU.
    Pdu(Bytes),
    /// The peer closed the connection.
    Closed,
    /// Not enough bytes for a PDU yet; try again when readable.
    Incomplete,
}

/// A byte-stream connection to a Z39.50 server.
pub trait Connection {
    /// Take the pending socket error (`SO_ERROR`), if any.
    fn pending_error(&self) -> io::Result<Option<io::Error>>;

    /// Finish a non-blocking connect.
    fn complete_connect(&mut self) -> io::Result<()>;

    /// Read at most one whole PDU.
    fn read_frame(&mut self) -> io::Result<FrameRead>;

    fn write(&mut self, data: &[u8]) -> io::Result<usize>;

    fn close(&mut self) -> io::Result<()>;

    /// See [`probe`].
    fn probe(&self) -> io::Result<Readiness> {
        probe(self)
    }
}

/// Classify a connection from its pending socket error.
///
/// Connection refused is what the socket reports both for a refused
/// connect and for a non-blocking connect still in progress, so exactly
/// that error means [`Readiness::Connecting`]. Every other state, including
/// no error at all, is [`Readiness::DataReady`]; a real failure then
/// surfaces on the read.
///
/// # Errors
///
/// Returns the error of the status query itself.
pub fn probe<C: Connection + ?Sized>(conn: &C) -> io::Result<Readiness> {
    Ok(match conn.pending_error()? {
        Some(e) if e.kind() == io::ErrorKind::ConnectionRefused => Readiness::Connecting,
        _ => Readiness::DataReady,
    })
}
