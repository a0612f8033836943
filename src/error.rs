//! Error types for z3950-client.

use thiserror::Error;

use crate::assembler::Reason;
use crate::protocol::Oid;
use crate::query::QueryError;

/// Main error type for all Z39.50 operations.
#[derive(Debug, Error)]
pub enum Z3950Error {
    /// I/O error during socket operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// An APDU could not be BER-encoded.
    #[error("encoding APDU: {0}")]
    Encode(String),

    /// Bytes were not a valid BER encoding of the expected type.
    #[error("malformed BER: {0}")]
    Decode(String),

    /// A CHOICE arm that this crate does not handle.
    #[error("unsupported `which' in {choice}: tag {tag}")]
    UnsupportedChoice {
        /// ASN.1 type name of the CHOICE.
        choice: &'static str,
        /// Context tag number of the arm found on the wire.
        tag: u32,
    },

    /// A well-formed APDU of a kind this crate does not handle.
    #[error("unsupported APDU: {0}")]
    UnsupportedApdu(String),

    /// The caller's record syntax name could not be resolved to an OID.
    #[error("can't convert record syntax: {0}")]
    RecordSyntax(String),

    /// An octet-aligned record carried a record syntax not in the table.
    #[error("can't translate record of unknown record syntax {0}")]
    UnknownRecordSyntax(Oid),

    /// Query compilation failed.
    #[error(transparent)]
    Query(#[from] QueryError),

    /// The server closed the connection.
    #[error("connection closed")]
    ConnectionClosed,

    /// No response arrived in time.
    #[error("no response within {0:?}")]
    Timeout(std::time::Duration),

    /// The server refused the Init request.
    #[error("init rejected by server")]
    Rejected,

    /// Receiving a PDU failed.
    #[error("receive failed: {0}")]
    Receive(#[from] Reason),

    /// JSON serialization error (result tree export).
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// MsgPack serialization error (result tree export).
    #[error("MsgPack encode error: {0}")]
    MsgPackEncode(#[from] rmp_serde::encode::Error),

    /// MsgPack deserialization error.
    #[error("MsgPack decode error: {0}")]
    MsgPackDecode(#[from] rmp_serde::decode::Error),
}

/// Result type alias using Z3950Error.
pub type Result<T> = std::result::Result<T, Z3950Error>;
