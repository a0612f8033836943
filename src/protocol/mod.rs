//! Protocol module - BER framing, object identifiers and the APDU tree.
//!
//! This module implements the wire-level building blocks:
//! - BER tag/length/value primitives
//! - PDU buffer for accumulating partial reads into whole APDUs
//! - Typed Init/Search/Present APDU structures
//! - Record syntax, attribute set and diagnostic registries

pub mod apdu;
pub mod ber;
mod diagnostics;
mod oid;
mod pdu_buffer;

pub use apdu::Apdu;
pub use diagnostics::bib1_message;
pub use oid::{bib1_diagset, AttributeSet, Oid, RecordSyntax};
pub use pdu_buffer::{PduBuffer, DEFAULT_MAX_PDU_SIZE};
