//! Codec module - APDU encoding and result tree export.
//!
//! - [`ApduCodec`] - the byte ↔ [`Apdu`] seam used by the request builders
//!   and the PDU assembler
//! - [`BerCodec`] - BER encoding of the Init/Search/Present APDUs
//! - [`MsgPackCodec`] / [`JsonCodec`] - export of a translated
//!   [`Value`](crate::response::Value) tree for cross-language consumers
//!
//! # Example
//!
//! ```
//! use z3950_client::codec::{ApduCodec, BerCodec};
//! use z3950_client::request::{init_request, InitParams};
//!
//! let bytes = init_request(&BerCodec, &InitParams::default()).unwrap();
//! let apdu = BerCodec.decode(&bytes).unwrap();
//! assert_eq!(apdu.name(), "initRequest");
//! ```

mod decode;
mod encode;
mod json;
mod msgpack;

use bytes::Bytes;

use crate::error::Result;
use crate::protocol::ber::BerWriter;
use crate::protocol::Apdu;

pub use json::JsonCodec;
pub use msgpack::MsgPackCodec;

/// Turns a typed APDU into bytes and back.
pub trait ApduCodec {
    /// Encode one APDU into a freshly allocated buffer.
    ///
    /// # Errors
    ///
    /// Returns [`Z3950Error::Encode`](crate::Z3950Error::Encode) if a field
    /// cannot be represented on the wire.
    fn encode(&self, apdu: &Apdu) -> Result<Bytes>;

    /// Decode exactly one APDU.
    ///
    /// # Errors
    ///
    /// Returns [`Z3950Error::Decode`](crate::Z3950Error::Decode) for invalid
    /// BER, [`Z3950Error::UnsupportedChoice`](crate::Z3950Error::UnsupportedChoice)
    /// for a CHOICE arm that is not handled and
    /// [`Z3950Error::UnsupportedApdu`](crate::Z3950Error::UnsupportedApdu) for a
    /// well-formed PDU of a kind other than Init/Search/Present.
    fn decode(&self, bytes: &[u8]) -> Result<Apdu>;
}

/// Basic Encoding Rules codec for the covered APDUs.
#[derive(Debug, Clone, Copy, Default)]
pub struct BerCodec;

impl ApduCodec for BerCodec {
    fn encode(&self, apdu: &Apdu) -> Result<Bytes> {
        let mut w = BerWriter::new();
        encode::apdu(&mut w, apdu)?;
        Ok(w.into_bytes())
    }

    fn decode(&self, bytes: &[u8]) -> Result<Apdu> {
        decode::apdu(bytes)
    }
}

impl<C: ApduCodec + ?Sized> ApduCodec for &C {
    fn encode(&self, apdu: &Apdu) -> Result<Bytes> {
        (**self).encode(apdu)
    }

    fn decode(&self, bytes: &[u8]) -> Result<Apdu> {
        (**self).decode(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Z3950Error;
    use crate::protocol::apdu::*;
    use crate::protocol::ber::{BitString, Tag};
    use crate::protocol::{bib1_diagset, AttributeSet, Oid, RecordSyntax};

    fn roundtrip(apdu: Apdu) -> Apdu {
        let bytes = BerCodec.encode(&apdu).unwrap();
        BerCodec.decode(&bytes).unwrap()
    }

    fn search_response(records: Option<Records>) -> Apdu {
        Apdu::SearchResponse(SearchResponse {
            reference_id: Some(Bytes::from_static(b"ref")),
            result_count: 1234,
            number_of_records_returned: 1,
            next_result_set_position: 2,
            search_status: true,
            result_set_status: None,
            present_status: Some(0),
            records,
        })
    }

    #[test]
    fn test_init_response_roundtrip() {
        let mut options = BitString::with_len(15);
        options.set(options::SEARCH);
        options.set(options::PRESENT);
        let mut version = BitString::with_len(3);
        version.set(protocol_version::V2);
        version.set(protocol_version::V3);
        let apdu = Apdu::InitResponse(InitResponse {
            reference_id: None,
            protocol_version: version,
            options,
            preferred_message_size: 1 << 20,
            maximum_record_size: 1 << 20,
            result: true,
            implementation_id: Some("81".to_string()),
            implementation_name: Some("Test server".to_string()),
            implementation_version: None,
        });

        assert_eq!(roundtrip(apdu.clone()), apdu);
    }

    #[test]
    fn test_outer_tag_of_each_apdu() {
        let bytes = BerCodec.encode(&search_response(None)).unwrap();
        assert_eq!(bytes[0], 0xB7);
    }

    #[test]
    fn test_search_request_with_nested_rpn() {
        let leaf = |use_attr: i64, term: &str| {
            RpnStructure::Op(Operand::AttrTerm(AttributesPlusTerm {
                attributes: vec![AttributeElement {
                    attribute_set: None,
                    attribute_type: 1,
                    value: use_attr,
                }],
                term: Term::General(Bytes::copy_from_slice(term.as_bytes())),
            }))
        };
        let rpn = RpnStructure::RpnRpnOp(
            Box::new(leaf(4, "dinosaurs")),
            Box::new(RpnStructure::RpnRpnOp(
                Box::new(leaf(1003, "bakker")),
                Box::new(RpnStructure::Op(Operand::ResultSet("prior".to_string()))),
                Operator::AndNot,
            )),
            Operator::And,
        );
        let apdu = Apdu::SearchRequest(SearchRequest {
            reference_id: None,
            small_set_upper_bound: 0,
            large_set_lower_bound: 1,
            medium_set_present_number: 0,
            replace_indicator: true,
            result_set_name: "default".to_string(),
            database_names: vec!["Default".to_string()],
            small_set_element_set_names: Some(ElementSetNames::Generic("F".to_string())),
            medium_set_element_set_names: Some(ElementSetNames::Generic("B".to_string())),
            preferred_record_syntax: Some(RecordSyntax::Usmarc.oid()),
            query: Query::Type1(RpnQuery {
                attribute_set: AttributeSet::Bib1.oid(),
                rpn,
            }),
        });

        assert_eq!(roundtrip(apdu.clone()), apdu);
    }

    #[test]
    fn test_response_records_roundtrip() {
        let grs1 = vec![TaggedElement {
            tag_type: Some(2),
            tag_value: StringOrNumeric::Numeric(1),
            tag_occurrence: None,
            content: ElementData::Subtree(vec![TaggedElement {
                tag_type: None,
                tag_value: StringOrNumeric::String("title".to_string()),
                tag_occurrence: Some(0),
                content: ElementData::ElementEmpty,
            }]),
        }];
        let records = Records::ResponseRecords(vec![
            NamePlusRecord {
                database_name: Some("Default".to_string()),
                record: RecordData::RetrievalRecord(External {
                    direct_reference: Some(RecordSyntax::Sutrs.oid()),
                    indirect_reference: None,
                    descriptor: None,
                    data: ExternalData::Sutrs(Bytes::from_static(b"plain text")),
                }),
            },
            NamePlusRecord {
                database_name: None,
                record: RecordData::RetrievalRecord(External {
                    direct_reference: Some(RecordSyntax::Grs1.oid()),
                    indirect_reference: None,
                    descriptor: None,
                    data: ExternalData::Grs1(grs1),
                }),
            },
            NamePlusRecord {
                database_name: None,
                record: RecordData::SurrogateDiagnostic(DiagRec::DefaultFormat(
                    DefaultDiagFormat {
                        diagnostic_set_id: bib1_diagset(),
                        condition: 14,
                        addinfo: AddInfo::V3("no such record".to_string()),
                    },
                )),
            },
        ]);
        let apdu = search_response(Some(records));

        assert_eq!(roundtrip(apdu.clone()), apdu);
    }

    fn grs1_response(levels: usize) -> Apdu {
        let mut record = vec![TaggedElement {
            tag_type: None,
            tag_value: StringOrNumeric::String("leaf".to_string()),
            tag_occurrence: None,
            content: ElementData::Numeric(1),
        }];
        for _ in 0..levels {
            record = vec![TaggedElement {
                tag_type: Some(2),
                tag_value: StringOrNumeric::Numeric(1),
                tag_occurrence: None,
                content: ElementData::Subtree(record),
            }];
        }
        search_response(Some(Records::ResponseRecords(vec![NamePlusRecord {
            database_name: None,
            record: RecordData::RetrievalRecord(External {
                direct_reference: Some(RecordSyntax::Grs1.oid()),
                indirect_reference: None,
                descriptor: None,
                data: ExternalData::Grs1(record),
            }),
        }])))
    }

    #[test]
    fn test_grs1_subtree_depth_is_bounded() {
        let shallow = grs1_response(50);
        assert_eq!(roundtrip(shallow.clone()), shallow);

        let bytes = BerCodec.encode(&grs1_response(decode::MAX_DEPTH)).unwrap();
        let err = BerCodec.decode(&bytes).unwrap_err();
        assert!(matches!(err, Z3950Error::Decode(ref msg) if msg.contains("GRS-1")));
    }

    #[test]
    fn test_rpn_depth_is_bounded() {
        let search = |levels: usize| {
            let leaf = || RpnStructure::Op(Operand::ResultSet("s".to_string()));
            let mut rpn = leaf();
            for _ in 0..levels {
                rpn = RpnStructure::RpnRpnOp(Box::new(rpn), Box::new(leaf()), Operator::Or);
            }
            Apdu::SearchRequest(SearchRequest {
                reference_id: None,
                small_set_upper_bound: 0,
                large_set_lower_bound: 1,
                medium_set_present_number: 0,
                replace_indicator: true,
                result_set_name: "default".to_string(),
                database_names: vec!["Default".to_string()],
                small_set_element_set_names: None,
                medium_set_element_set_names: None,
                preferred_record_syntax: None,
                query: Query::Type1(RpnQuery {
                    attribute_set: AttributeSet::Bib1.oid(),
                    rpn,
                }),
            })
        };

        let wide = search(100);
        assert_eq!(roundtrip(wide.clone()), wide);

        let bytes = BerCodec.encode(&search(decode::MAX_DEPTH)).unwrap();
        let err = BerCodec.decode(&bytes).unwrap_err();
        assert!(matches!(err, Z3950Error::Decode(ref msg) if msg.contains("RPNStructure")));
    }

    #[test]
    fn test_sutrs_keeps_non_utf8_octets() {
        let apdu = search_response(Some(Records::ResponseRecords(vec![NamePlusRecord {
            database_name: None,
            record: RecordData::RetrievalRecord(External {
                direct_reference: Some(RecordSyntax::Sutrs.oid()),
                indirect_reference: None,
                descriptor: None,
                data: ExternalData::Sutrs(Bytes::from_static(b"caf\xE9!")),
            }),
        }])));

        assert_eq!(roundtrip(apdu.clone()), apdu);
    }

    #[test]
    fn test_unknown_pdu_tag_is_unsupported_apdu() {
        // close [48] with an empty body
        let bytes = [0xBF, 0x30, 0x00];
        let err = BerCodec.decode(&bytes).unwrap_err();
        assert!(matches!(err, Z3950Error::UnsupportedApdu(_)));
    }

    #[test]
    fn test_universal_outer_tag_is_malformed() {
        let bytes = [0x30, 0x00];
        let err = BerCodec.decode(&bytes).unwrap_err();
        assert!(matches!(err, Z3950Error::Decode(_)));
    }

    #[test]
    fn test_unknown_choice_arm_is_rejected() {
        // presentResponse whose NamePlusRecord.record uses arm [9]
        let mut w = BerWriter::new();
        w.constructed(Tag::context(25), |w| {
            w.integer(Tag::context(24), 1);
            w.integer(Tag::context(25), 2);
            w.integer(Tag::context(27), 0);
            w.constructed(Tag::context(28), |w| {
                w.constructed(Tag::sequence(), |w| {
                    w.constructed(Tag::context(1), |w| {
                        w.constructed(Tag::context(9), |w| {
                            w.null(Tag::universal(5));
                            Ok(())
                        })
                    })
                })
            })
        })
        .unwrap();

        let err = BerCodec.decode(&w.into_bytes()).unwrap_err();
        assert!(matches!(
            err,
            Z3950Error::UnsupportedChoice {
                choice: "NamePlusRecord.record",
                tag: 9
            }
        ));
    }

    #[test]
    fn test_octet_aligned_record_keeps_bytes() {
        let marc = Bytes::from_static(b"00714cam  2200205 a 4500");
        let apdu = Apdu::PresentResponse(PresentResponse {
            reference_id: None,
            number_of_records_returned: 1,
            next_result_set_position: 0,
            present_status: 0,
            records: Some(Records::ResponseRecords(vec![NamePlusRecord {
                database_name: None,
                record: RecordData::RetrievalRecord(External {
                    direct_reference: Some(Oid::from_slice(&[1, 2, 840, 10003, 5, 10])),
                    indirect_reference: None,
                    descriptor: None,
                    data: ExternalData::Octet(marc),
                }),
            }])),
        });

        assert_eq!(roundtrip(apdu.clone()), apdu);
    }

    #[test]
    fn test_trailing_other_info_is_skipped() {
        // searchResponse followed by an otherInfo [201] field
        let mut w = BerWriter::new();
        w.constructed(Tag::context(23), |w| {
            w.integer(Tag::context(23), 0);
            w.integer(Tag::context(24), 0);
            w.integer(Tag::context(25), 1);
            w.boolean(Tag::context(22), false);
            w.constructed(Tag::context(201), |_| Ok(()))
        })
        .unwrap();

        let Apdu::SearchResponse(resp) = BerCodec.decode(&w.into_bytes()).unwrap() else {
            panic!("expected searchResponse");
        };
        assert!(resp.records.is_none());
        assert!(!resp.search_status);
    }
}
