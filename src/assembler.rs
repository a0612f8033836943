//! PDU assembler: one call, at most one decoded PDU.
//!
//! ```text
//! probe ─Connecting─▶ complete_connect ─ok──▶ Incomplete
//!   │                                  └err─▶ Transport(generic code)
//!   DataReady
//!   ▼
//! read_frame ─Closed──────▶ EndOfStream
//!   │        ─Incomplete──▶ Incomplete
//!   │        ─Err(e)──────▶ Transport(os code)
//!   Pdu(bytes)
//!   ▼
//! codec.decode ─err──▶ Malformed / UnsupportedMessageType
//!   ▼
//! Apdu ──translate (decode_apdu only)──▶ Value
//! ```
//!
//! `Incomplete` is the only retryable outcome: call again once the
//! connection becomes readable. Everything else ends the exchange, and a
//! malformed PDU leaves the connection unusable.

use std::io;

use thiserror::Error;
use tracing::{debug, error, warn};

use crate::codec::ApduCodec;
use crate::error::Z3950Error;
use crate::protocol::Apdu;
use crate::response::{translate, Value};
use crate::transport::{Connection, FrameRead, Readiness};

/// Stable reason codes reported to callers.
pub mod codes {
    pub const EOF: i32 = 23951;
    pub const INCOMPLETE: i32 = 23952;
    pub const MALFORMED: i32 = 23953;
    pub const BADAPDU: i32 = 23954;
    pub const ERROR: i32 = 23955;
}

/// Why [`assemble`] did not produce a PDU.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Reason {
    /// The peer closed the connection.
    #[error("end of stream")]
    EndOfStream,

    /// Not a whole PDU yet.
    #[error("incomplete PDU")]
    Incomplete,

    /// The bytes were not a valid encoding of a known APDU.
    #[error("malformed PDU")]
    Malformed,

    /// A well-formed APDU of a kind the client does not handle.
    #[error("unsupported message type")]
    UnsupportedMessageType,

    /// Transport failure, with the platform error code when there is one.
    #[error("transport error (code {})", .0.unwrap_or(codes::ERROR))]
    Transport(Option<i32>),
}

impl Reason {
    /// Integer code: one of [`codes`], or the platform code of a transport
    /// failure.
    pub fn code(self) -> i32 {
        match self {
            Reason::EndOfStream => codes::EOF,
            Reason::Incomplete => codes::INCOMPLETE,
            Reason::Malformed => codes::MALFORMED,
            Reason::UnsupportedMessageType => codes::BADAPDU,
            Reason::Transport(code) => code.unwrap_or(codes::ERROR),
        }
    }

    /// Whether calling again later can succeed.
    pub fn is_retryable(self) -> bool {
        self == Reason::Incomplete
    }
}

fn transport_failure(e: &io::Error) -> Reason {
    error!(error = %e, "transport failure");
    Reason::Transport(e.raw_os_error())
}

/// Read and decode at most one APDU from `conn`.
///
/// # Errors
///
/// Returns the [`Reason`] no APDU was produced.
pub fn assemble<C, D>(conn: &mut C, codec: &D) -> Result<Apdu, Reason>
where
    C: Connection + ?Sized,
    D: ApduCodec + ?Sized,
{
    match conn.probe() {
        Ok(Readiness::DataReady) => {}
        Ok(Readiness::Connecting) => {
            return match conn.complete_connect() {
                Ok(()) => Err(Reason::Incomplete),
                Err(e) => {
                    // Only read failures carry the platform code
                    error!(error = %e, "connect failed");
                    Err(Reason::Transport(None))
                }
            };
        }
        Err(e) => return Err(transport_failure(&e)),
    }

    let bytes = match conn.read_frame() {
        Ok(FrameRead::Pdu(bytes)) => bytes,
        Ok(FrameRead::Closed) => return Err(Reason::EndOfStream),
        Ok(FrameRead::Incomplete) => return Err(Reason::Incomplete),
        Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Err(Reason::Incomplete),
        Err(e) if e.kind() == io::ErrorKind::InvalidData => {
            warn!(error = %e, "unframeable input");
            return Err(Reason::Malformed);
        }
        Err(e) => return Err(transport_failure(&e)),
    };
    debug!(size = bytes.len(), "received PDU");

    codec.decode(&bytes).map_err(|e| match e {
        Z3950Error::UnsupportedApdu(what) => {
            warn!(apdu = %what, "unsupported APDU");
            Reason::UnsupportedMessageType
        }
        e => {
            warn!(error = %e, size = bytes.len(), "malformed PDU");
            Reason::Malformed
        }
    })
}

/// [`assemble`] followed by [`translate`].
///
/// A PDU that decodes but cannot be translated (a request APDU, an
/// unknown record syntax) is reported as [`Reason::Malformed`].
pub fn decode_apdu<C, D>(conn: &mut C, codec: &D) -> Result<Value, Reason>
where
    C: Connection + ?Sized,
    D: ApduCodec + ?Sized,
{
    let apdu = assemble(conn, codec)?;
    translate(&apdu).map_err(|e| {
        warn!(apdu = apdu.name(), error = %e, "untranslatable PDU");
        Reason::Malformed
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::collections::VecDeque;

    use bytes::Bytes;

    use crate::codec::BerCodec;
    use crate::protocol::apdu::InitResponse;
    use crate::protocol::ber::BitString;
    use crate::request::{init_request, InitParams};

    /// Connection that replays scripted reads.
    #[derive(Default)]
    struct Scripted {
        pending: Option<io::ErrorKind>,
        connect_fails: bool,
        reads: VecDeque<io::Result<FrameRead>>,
        read_calls: Cell<usize>,
    }

    impl Scripted {
        fn reading(reads: Vec<io::Result<FrameRead>>) -> Self {
            Self {
                reads: reads.into(),
                ..Default::default()
            }
        }
    }

    impl Connection for Scripted {
        fn pending_error(&self) -> io::Result<Option<io::Error>> {
            Ok(self.pending.map(io::Error::from))
        }

        fn complete_connect(&mut self) -> io::Result<()> {
            if self.connect_fails {
                return Err(io::Error::from_raw_os_error(111));
            }
            self.pending = None;
            Ok(())
        }

        fn read_frame(&mut self) -> io::Result<FrameRead> {
            self.read_calls.set(self.read_calls.get() + 1);
            self.reads.pop_front().unwrap_or(Ok(FrameRead::Incomplete))
        }

        fn write(&mut self, data: &[u8]) -> io::Result<usize> {
            Ok(data.len())
        }

        fn close(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    /// Codec that must never be reached.
    struct Untouchable;

    impl ApduCodec for Untouchable {
        fn encode(&self, _apdu: &Apdu) -> crate::Result<Bytes> {
            panic!("encode called");
        }

        fn decode(&self, _bytes: &[u8]) -> crate::Result<Apdu> {
            panic!("decode called");
        }
    }

    fn init_response_bytes() -> Bytes {
        let apdu = Apdu::InitResponse(InitResponse {
            reference_id: None,
            protocol_version: BitString::with_len(3),
            options: BitString::with_len(15),
            preferred_message_size: 1024,
            maximum_record_size: 1024,
            result: true,
            implementation_id: None,
            implementation_name: Some("test server".to_string()),
            implementation_version: None,
        });
        BerCodec.encode(&apdu).unwrap()
    }

    #[test]
    fn test_reason_codes() {
        assert_eq!(Reason::EndOfStream.code(), 23951);
        assert_eq!(Reason::Incomplete.code(), 23952);
        assert_eq!(Reason::Malformed.code(), 23953);
        assert_eq!(Reason::UnsupportedMessageType.code(), 23954);
        assert_eq!(Reason::Transport(None).code(), 23955);
        assert_eq!(Reason::Transport(Some(104)).code(), 104);
        assert!(Reason::Incomplete.is_retryable());
        assert!(!Reason::Malformed.is_retryable());
        assert!(!Reason::EndOfStream.is_retryable());
    }

    #[test]
    fn test_closed_is_end_of_stream_without_decoding() {
        let mut conn = Scripted::reading(vec![Ok(FrameRead::Closed)]);
        assert_eq!(assemble(&mut conn, &Untouchable), Err(Reason::EndOfStream));
    }

    #[test]
    fn test_incomplete_and_would_block() {
        let mut conn = Scripted::reading(vec![
            Ok(FrameRead::Incomplete),
            Err(io::Error::from(io::ErrorKind::WouldBlock)),
        ]);
        assert_eq!(assemble(&mut conn, &Untouchable), Err(Reason::Incomplete));
        assert_eq!(assemble(&mut conn, &Untouchable), Err(Reason::Incomplete));
    }

    #[test]
    fn test_read_error_keeps_os_code() {
        let mut conn = Scripted::reading(vec![Err(io::Error::from_raw_os_error(104))]);
        assert_eq!(assemble(&mut conn, &Untouchable), Err(Reason::Transport(Some(104))));

        let mut conn = Scripted::reading(vec![Err(io::Error::new(io::ErrorKind::Other, "boom"))]);
        assert_eq!(assemble(&mut conn, &Untouchable), Err(Reason::Transport(None)));
    }

    #[test]
    fn test_connecting_completes_then_retries() {
        let mut conn = Scripted {
            pending: Some(io::ErrorKind::ConnectionRefused),
            ..Scripted::reading(vec![Ok(FrameRead::Pdu(init_response_bytes()))])
        };
        assert_eq!(assemble(&mut conn, &BerCodec), Err(Reason::Incomplete));
        assert_eq!(conn.read_calls.get(), 0);

        let apdu = assemble(&mut conn, &BerCodec).unwrap();
        assert_eq!(apdu.name(), "initResponse");
    }

    #[test]
    fn test_failed_connect_is_generic_transport_error() {
        let mut conn = Scripted {
            pending: Some(io::ErrorKind::ConnectionRefused),
            connect_fails: true,
            ..Default::default()
        };
        let reason = assemble(&mut conn, &BerCodec).unwrap_err();
        assert_eq!(reason, Reason::Transport(None));
        assert_eq!(reason.code(), 23955);
        assert_eq!(conn.read_calls.get(), 0);
    }

    #[test]
    fn test_garbage_is_malformed() {
        let mut conn = Scripted::reading(vec![
            // initResponse holding a bare INTEGER where protocolVersion belongs
            Ok(FrameRead::Pdu(Bytes::from_static(&[0xB5, 0x03, 0x02, 0x01, 0x00]))),
            Err(io::Error::new(io::ErrorKind::InvalidData, "bad length")),
        ]);
        assert_eq!(assemble(&mut conn, &BerCodec), Err(Reason::Malformed));
        assert_eq!(assemble(&mut conn, &BerCodec), Err(Reason::Malformed));
    }

    #[test]
    fn test_unknown_pdu_is_unsupported_message_type() {
        // close [48], empty
        let mut conn = Scripted::reading(vec![Ok(FrameRead::Pdu(Bytes::from_static(&[0xBF, 0x30, 0x00])))]);
        assert_eq!(assemble(&mut conn, &BerCodec), Err(Reason::UnsupportedMessageType));
    }

    #[test]
    fn test_decode_apdu_translates() {
        let mut conn = Scripted::reading(vec![Ok(FrameRead::Pdu(init_response_bytes()))]);
        let value = decode_apdu(&mut conn, &BerCodec).unwrap();
        let record = value.as_record().unwrap();
        assert_eq!(record.get("result").and_then(Value::as_bool), Some(true));
        assert_eq!(
            record.get("implementationName").and_then(Value::as_str),
            Some("test server")
        );
        assert!(!record.contains("implementationId"));
    }

    #[test]
    fn test_decode_apdu_request_is_malformed() {
        let request = init_request(&BerCodec, &InitParams::default()).unwrap();
        let mut conn = Scripted::reading(vec![Ok(FrameRead::Pdu(request))]);
        assert_eq!(decode_apdu(&mut conn, &BerCodec), Err(Reason::Malformed));
    }
}
