//! BER → APDU.
//!
//! Unknown CHOICE arms are rejected with [`Z3950Error::UnsupportedChoice`];
//! trailing OPTIONAL fields that are not modelled are skipped.

use bytes::Bytes;

use crate::error::{Result, Z3950Error};
use crate::protocol::apdu::*;
use crate::protocol::ber::{universal, BerReader, Class, Tag, Tlv};
use crate::protocol::RecordSyntax;

/// Deepest RPN tree or GRS-1 subtree accepted.
pub(super) const MAX_DEPTH: usize = 128;

fn descend(depth: usize, what: &str) -> Result<usize> {
    if depth >= MAX_DEPTH {
        return Err(Z3950Error::Decode(format!("{} nested deeper than {}", what, MAX_DEPTH)));
    }
    Ok(depth + 1)
}

pub(super) fn apdu(buf: &[u8]) -> Result<Apdu> {
    let mut r = BerReader::new(buf);
    let outer = r.read()?;
    if !r.is_empty() {
        return Err(Z3950Error::Decode("trailing bytes after APDU".to_string()));
    }
    if outer.tag.class != Class::Context || !outer.tag.constructed {
        return Err(Z3950Error::Decode(format!(
            "APDU must be a constructed context tag, found {:?} [{}]",
            outer.tag.class, outer.tag.number
        )));
    }
    let mut r = outer.reader();
    match outer.tag.number {
        20 => init_request(&mut r).map(Apdu::InitRequest),
        21 => init_response(&mut r).map(Apdu::InitResponse),
        22 => search_request(&mut r).map(Apdu::SearchRequest),
        23 => search_response(&mut r).map(Apdu::SearchResponse),
        24 => present_request(&mut r).map(Apdu::PresentRequest),
        25 => present_response(&mut r).map(Apdu::PresentResponse),
        n => Err(Z3950Error::UnsupportedApdu(format!("PDU tag [{}]", n))),
    }
}

fn reference_id(r: &mut BerReader<'_>) -> Result<Option<Bytes>> {
    r.optional(Tag::context(2))?.map(|t| t.octets()).transpose()
}

fn int(r: &mut BerReader<'_>, n: u32, what: &str) -> Result<i64> {
    r.expect(Tag::context(n), what)?.integer()
}

fn opt_int(r: &mut BerReader<'_>, n: u32) -> Result<Option<i64>> {
    r.optional(Tag::context(n))?.map(|t| t.integer()).transpose()
}

fn opt_string(r: &mut BerReader<'_>, n: u32) -> Result<Option<String>> {
    r.optional(Tag::context(n))?.map(|t| t.string()).transpose()
}

/// Contents of a `[n]` explicit wrapper: exactly one inner TLV.
fn explicit<'a>(tlv: Tlv<'a>, what: &str) -> Result<Tlv<'a>> {
    let mut r = tlv.reader();
    let inner = r.read()?;
    if !r.is_empty() {
        return Err(Z3950Error::Decode(format!("{}: extra contents", what)));
    }
    Ok(inner)
}

fn init_request(r: &mut BerReader<'_>) -> Result<InitRequest> {
    let reference_id = reference_id(r)?;
    let protocol_version = r.expect(Tag::context(3), "protocolVersion")?.bit_string()?;
    let options = r.expect(Tag::context(4), "options")?.bit_string()?;
    let preferred_message_size = int(r, 5, "preferredMessageSize")?;
    let maximum_record_size = int(r, 6, "exceptionalRecordSize")?;
    let id_authentication = r
        .optional(Tag::context(7))?
        .map(|t| id_authentication(explicit(t, "idAuthentication")?))
        .transpose()?;
    let implementation_id = opt_string(r, 110)?;
    let implementation_name = opt_string(r, 111)?;
    let implementation_version = opt_string(r, 112)?;
    r.skip_rest()?;
    Ok(InitRequest {
        reference_id,
        protocol_version,
        options,
        preferred_message_size,
        maximum_record_size,
        id_authentication,
        implementation_id,
        implementation_name,
        implementation_version,
    })
}

fn id_authentication(tlv: Tlv<'_>) -> Result<IdAuthentication> {
    match (tlv.tag.class, tlv.tag.number) {
        (Class::Universal, universal::VISIBLE_STRING) => Ok(IdAuthentication::Open(tlv.string()?)),
        (Class::Universal, universal::SEQUENCE) => {
            let mut r = tlv.reader();
            let group_id = opt_string(&mut r, 0)?;
            let user_id = opt_string(&mut r, 1)?;
            let password = opt_string(&mut r, 2)?;
            r.skip_rest()?;
            Ok(IdAuthentication::IdPass {
                group_id,
                user_id,
                password,
            })
        }
        (Class::Universal, universal::NULL) => {
            tlv.null()?;
            Ok(IdAuthentication::Anonymous)
        }
        (_, n) => Err(Z3950Error::UnsupportedChoice {
            choice: "IdAuthentication",
            tag: n,
        }),
    }
}

fn init_response(r: &mut BerReader<'_>) -> Result<InitResponse> {
    let reference_id = reference_id(r)?;
    let protocol_version = r.expect(Tag::context(3), "protocolVersion")?.bit_string()?;
    let options = r.expect(Tag::context(4), "options")?.bit_string()?;
    let preferred_message_size = int(r, 5, "preferredMessageSize")?;
    let maximum_record_size = int(r, 6, "exceptionalRecordSize")?;
    let result = r.expect(Tag::context(12), "result")?.boolean()?;
    let implementation_id = opt_string(r, 110)?;
    let implementation_name = opt_string(r, 111)?;
    let implementation_version = opt_string(r, 112)?;
    r.skip_rest()?;
    Ok(InitResponse {
        reference_id,
        protocol_version,
        options,
        preferred_message_size,
        maximum_record_size,
        result,
        implementation_id,
        implementation_name,
        implementation_version,
    })
}

fn search_request(r: &mut BerReader<'_>) -> Result<SearchRequest> {
    let reference_id = reference_id(r)?;
    let small_set_upper_bound = int(r, 13, "smallSetUpperBound")?;
    let large_set_lower_bound = int(r, 14, "largeSetLowerBound")?;
    let medium_set_present_number = int(r, 15, "mediumSetPresentNumber")?;
    let replace_indicator = r.expect(Tag::context(16), "replaceIndicator")?.boolean()?;
    let result_set_name = r.expect(Tag::context(17), "resultSetName")?.string()?;

    let mut dbs = r.expect(Tag::context(18), "databaseNames")?.reader();
    let mut database_names = Vec::new();
    while !dbs.is_empty() {
        database_names.push(dbs.expect(Tag::context(105), "DatabaseName")?.string()?);
    }

    let small_set_element_set_names = r
        .optional(Tag::context(100))?
        .map(|t| element_set_names(explicit(t, "smallSetElementSetNames")?))
        .transpose()?;
    let medium_set_element_set_names = r
        .optional(Tag::context(101))?
        .map(|t| element_set_names(explicit(t, "mediumSetElementSetNames")?))
        .transpose()?;
    let preferred_record_syntax = r.optional(Tag::context(104))?.map(|t| t.oid()).transpose()?;
    let query = query(explicit(r.expect(Tag::context(21), "query")?, "query")?)?;
    r.skip_rest()?;

    Ok(SearchRequest {
        reference_id,
        small_set_upper_bound,
        large_set_lower_bound,
        medium_set_present_number,
        replace_indicator,
        result_set_name,
        database_names,
        small_set_element_set_names,
        medium_set_element_set_names,
        preferred_record_syntax,
        query,
    })
}

fn element_set_names(tlv: Tlv<'_>) -> Result<ElementSetNames> {
    match (tlv.tag.class, tlv.tag.number) {
        (Class::Context, 0) => Ok(ElementSetNames::Generic(tlv.string()?)),
        (_, n) => Err(Z3950Error::UnsupportedChoice {
            choice: "ElementSetNames",
            tag: n,
        }),
    }
}

fn query(tlv: Tlv<'_>) -> Result<Query> {
    match (tlv.tag.class, tlv.tag.number) {
        (Class::Context, 1) => {
            let mut r = tlv.reader();
            let attribute_set = r
                .expect(Tag::universal(universal::OBJECT_IDENTIFIER), "attributeSet")?
                .oid()?;
            let rpn = rpn_structure(r.read()?, 0)?;
            Ok(Query::Type1(RpnQuery { attribute_set, rpn }))
        }
        (Class::Context, 2) => Ok(Query::Type2(explicit(tlv, "type-2")?.octets()?)),
        (_, n) => Err(Z3950Error::UnsupportedChoice {
            choice: "Query",
            tag: n,
        }),
    }
}

fn rpn_structure(tlv: Tlv<'_>, depth: usize) -> Result<RpnStructure> {
    let depth = descend(depth, "RPNStructure")?;
    match (tlv.tag.class, tlv.tag.number) {
        (Class::Context, 0) => Ok(RpnStructure::Op(operand(explicit(tlv, "op")?)?)),
        (Class::Context, 1) => {
            let mut r = tlv.reader();
            let left = rpn_structure(r.read()?, depth)?;
            let right = rpn_structure(r.read()?, depth)?;
            let op = explicit(r.expect(Tag::context(46), "Operator")?, "Operator")?;
            let op = match (op.tag.class, op.tag.number) {
                (Class::Context, 0) => Operator::And,
                (Class::Context, 1) => Operator::Or,
                (Class::Context, 2) => Operator::AndNot,
                (_, n) => {
                    return Err(Z3950Error::UnsupportedChoice {
                        choice: "Operator",
                        tag: n,
                    })
                }
            };
            Ok(RpnStructure::RpnRpnOp(Box::new(left), Box::new(right), op))
        }
        (_, n) => Err(Z3950Error::UnsupportedChoice {
            choice: "RPNStructure",
            tag: n,
        }),
    }
}

fn operand(tlv: Tlv<'_>) -> Result<Operand> {
    match (tlv.tag.class, tlv.tag.number) {
        (Class::Context, 102) => {
            let mut r = tlv.reader();
            let mut list = r.expect(Tag::context(44), "AttributeList")?.reader();
            let mut attributes = Vec::new();
            while !list.is_empty() {
                let mut e = list.expect(Tag::sequence(), "AttributeElement")?.reader();
                let attribute_set = e.optional(Tag::context(1))?.map(|t| t.oid()).transpose()?;
                let attribute_type = int(&mut e, 120, "attributeType")?;
                let value = match e.read()? {
                    t if t.tag.matches(Tag::context(121)) => t.integer()?,
                    t => {
                        return Err(Z3950Error::UnsupportedChoice {
                            choice: "attributeValue",
                            tag: t.tag.number,
                        })
                    }
                };
                attributes.push(AttributeElement {
                    attribute_set,
                    attribute_type,
                    value,
                });
            }
            let term = term(r.read()?)?;
            Ok(Operand::AttrTerm(AttributesPlusTerm { attributes, term }))
        }
        (Class::Context, 31) => Ok(Operand::ResultSet(tlv.string()?)),
        (_, n) => Err(Z3950Error::UnsupportedChoice {
            choice: "Operand",
            tag: n,
        }),
    }
}

fn term(tlv: Tlv<'_>) -> Result<Term> {
    match (tlv.tag.class, tlv.tag.number) {
        (Class::Context, 45) => Ok(Term::General(tlv.octets()?)),
        (Class::Context, 215) => Ok(Term::Numeric(tlv.integer()?)),
        (Class::Context, 216) => Ok(Term::CharacterString(tlv.string()?)),
        (_, n) => Err(Z3950Error::UnsupportedChoice {
            choice: "Term",
            tag: n,
        }),
    }
}

fn search_response(r: &mut BerReader<'_>) -> Result<SearchResponse> {
    let reference_id = reference_id(r)?;
    let result_count = int(r, 23, "resultCount")?;
    let number_of_records_returned = int(r, 24, "numberOfRecordsReturned")?;
    let next_result_set_position = int(r, 25, "nextResultSetPosition")?;
    let search_status = r.expect(Tag::context(22), "searchStatus")?.boolean()?;
    let result_set_status = opt_int(r, 26)?;
    let present_status = opt_int(r, 27)?;
    let records = records(r)?;
    r.skip_rest()?;
    Ok(SearchResponse {
        reference_id,
        result_count,
        number_of_records_returned,
        next_result_set_position,
        search_status,
        result_set_status,
        present_status,
        records,
    })
}

fn present_request(r: &mut BerReader<'_>) -> Result<PresentRequest> {
    let reference_id = reference_id(r)?;
    let result_set_id = r.expect(Tag::context(31), "resultSetId")?.string()?;
    let result_set_start_point = int(r, 30, "resultSetStartPoint")?;
    let number_of_records_requested = int(r, 29, "numberOfRecordsRequested")?;
    // additionalRanges [212] is not modelled
    r.optional(Tag::context(212))?;
    let record_composition = match r.peek_tag()? {
        Some(t) if t.matches(Tag::context(19)) => {
            let inner = explicit(r.read()?, "simple")?;
            Some(RecordComposition::Simple(element_set_names(inner)?))
        }
        Some(t) if t.matches(Tag::context(209)) => {
            return Err(Z3950Error::UnsupportedChoice {
                choice: "recordComposition",
                tag: 209,
            })
        }
        _ => None,
    };
    let preferred_record_syntax = r.optional(Tag::context(104))?.map(|t| t.oid()).transpose()?;
    r.skip_rest()?;
    Ok(PresentRequest {
        reference_id,
        result_set_id,
        result_set_start_point,
        number_of_records_requested,
        record_composition,
        preferred_record_syntax,
    })
}

fn present_response(r: &mut BerReader<'_>) -> Result<PresentResponse> {
    let reference_id = reference_id(r)?;
    let number_of_records_returned = int(r, 24, "numberOfRecordsReturned")?;
    let next_result_set_position = int(r, 25, "nextResultSetPosition")?;
    let present_status = int(r, 27, "presentStatus")?;
    let records = records(r)?;
    r.skip_rest()?;
    Ok(PresentResponse {
        reference_id,
        number_of_records_returned,
        next_result_set_position,
        present_status,
        records,
    })
}

/// The optional `Records` CHOICE at the reader's position.
fn records(r: &mut BerReader<'_>) -> Result<Option<Records>> {
    let Some(tag) = r.peek_tag()? else {
        return Ok(None);
    };
    if tag.class != Class::Context {
        return Ok(None);
    }
    let records = match tag.number {
        28 => {
            let mut list = r.read()?.reader();
            let mut out = Vec::new();
            while !list.is_empty() {
                out.push(name_plus_record(list.expect(Tag::sequence(), "NamePlusRecord")?)?);
            }
            Records::ResponseRecords(out)
        }
        130 => Records::NonSurrogateDiagnostic(default_diag_format(r.read()?)?),
        205 => {
            let mut list = r.read()?.reader();
            let mut out = Vec::new();
            while !list.is_empty() {
                out.push(diag_rec(list.read()?)?);
            }
            Records::MultipleNonSurDiagnostics(out)
        }
        // otherInfo and friends follow; no records present
        _ => return Ok(None),
    };
    Ok(Some(records))
}

fn name_plus_record(tlv: Tlv<'_>) -> Result<NamePlusRecord> {
    let mut r = tlv.reader();
    let database_name = opt_string(&mut r, 0)?;
    let outer = explicit(r.expect(Tag::context(1), "record")?, "record")?;
    if outer.tag.class != Class::Context {
        return Err(Z3950Error::UnsupportedChoice {
            choice: "NamePlusRecord.record",
            tag: outer.tag.number,
        });
    }
    let record = match outer.tag.number {
        1 => RecordData::RetrievalRecord(external(explicit(outer, "retrievalRecord")?)?),
        2 => RecordData::SurrogateDiagnostic(diag_rec(explicit(outer, "surrogateDiagnostic")?)?),
        3 => RecordData::StartingFragment(fragment(explicit(outer, "startingFragment")?)?),
        4 => RecordData::IntermediateFragment(fragment(explicit(outer, "intermediateFragment")?)?),
        5 => RecordData::FinalFragment(fragment(explicit(outer, "finalFragment")?)?),
        n => {
            return Err(Z3950Error::UnsupportedChoice {
                choice: "NamePlusRecord.record",
                tag: n,
            })
        }
    };
    r.skip_rest()?;
    Ok(NamePlusRecord {
        database_name,
        record,
    })
}

fn fragment(tlv: Tlv<'_>) -> Result<FragmentSyntax> {
    match (tlv.tag.class, tlv.tag.number) {
        (Class::Universal, universal::EXTERNAL) => {
            Ok(FragmentSyntax::ExternallyTagged(external(tlv)?))
        }
        (Class::Universal, universal::OCTET_STRING) => {
            Ok(FragmentSyntax::NotExternallyTagged(tlv.octets()?))
        }
        (_, n) => Err(Z3950Error::UnsupportedChoice {
            choice: "FragmentSyntax",
            tag: n,
        }),
    }
}

fn external(tlv: Tlv<'_>) -> Result<External> {
    if !tlv.tag.matches(Tag::universal(universal::EXTERNAL)) {
        return Err(Z3950Error::Decode(format!(
            "expected EXTERNAL, found {:?} [{}]",
            tlv.tag.class, tlv.tag.number
        )));
    }
    let mut r = tlv.reader();
    let direct_reference = r
        .optional(Tag::universal(universal::OBJECT_IDENTIFIER))?
        .map(|t| t.oid())
        .transpose()?;
    let indirect_reference = r
        .optional(Tag::universal(universal::INTEGER))?
        .map(|t| t.integer())
        .transpose()?;
    let descriptor = r
        .optional(Tag::universal(universal::OBJECT_DESCRIPTOR))?
        .map(|t| t.string())
        .transpose()?;

    let encoding = r.read()?;
    if encoding.tag.class != Class::Context {
        return Err(Z3950Error::Decode("EXTERNAL encoding must be context-tagged".to_string()));
    }
    let data = match encoding.tag.number {
        0 => {
            let inner = explicit(encoding, "single-ASN1-type")?;
            match direct_reference.as_ref().and_then(RecordSyntax::from_oid) {
                Some(RecordSyntax::Sutrs) => ExternalData::Sutrs(inner.octets()?),
                Some(RecordSyntax::Grs1) => {
                    if !inner.tag.matches(Tag::sequence()) {
                        return Err(Z3950Error::Decode("GRS-1 record must be a SEQUENCE".into()));
                    }
                    ExternalData::Grs1(generic_record(inner, 0)?)
                }
                _ => {
                    return Err(Z3950Error::UnsupportedChoice {
                        choice: "EXTERNAL single-ASN1-type",
                        tag: inner.tag.number,
                    })
                }
            }
        }
        1 => ExternalData::Octet(encoding.octets()?),
        n => {
            return Err(Z3950Error::UnsupportedChoice {
                choice: "EXTERNAL encoding",
                tag: n,
            })
        }
    };
    Ok(External {
        direct_reference,
        indirect_reference,
        descriptor,
        data,
    })
}

fn generic_record(tlv: Tlv<'_>, depth: usize) -> Result<GenericRecord> {
    let depth = descend(depth, "GRS-1 record")?;
    let mut r = tlv.reader();
    let mut out = Vec::new();
    while !r.is_empty() {
        out.push(tagged_element(r.expect(Tag::sequence(), "TaggedElement")?, depth)?);
    }
    Ok(out)
}

fn tagged_element(tlv: Tlv<'_>, depth: usize) -> Result<TaggedElement> {
    let mut r = tlv.reader();
    let tag_type = opt_int(&mut r, 1)?;
    let value = explicit(r.expect(Tag::context(2), "tagValue")?, "tagValue")?;
    let tag_value = match (value.tag.class, value.tag.number) {
        (Class::Context, 1) => StringOrNumeric::String(value.string()?),
        (Class::Context, 2) => StringOrNumeric::Numeric(value.integer()?),
        (_, n) => {
            return Err(Z3950Error::UnsupportedChoice {
                choice: "StringOrNumeric",
                tag: n,
            })
        }
    };
    let tag_occurrence = opt_int(&mut r, 3)?;
    let content = explicit(r.expect(Tag::context(4), "content")?, "content")?;
    let content = element_data(content, depth)?;
    r.skip_rest()?;
    Ok(TaggedElement {
        tag_type,
        tag_value,
        tag_occurrence,
        content,
    })
}

fn element_data(tlv: Tlv<'_>, depth: usize) -> Result<ElementData> {
    let data = match (tlv.tag.class, tlv.tag.number) {
        (Class::Universal, universal::OCTET_STRING) => ElementData::Octets(tlv.octets()?),
        (Class::Universal, universal::INTEGER) => ElementData::Numeric(tlv.integer()?),
        (Class::Universal, universal::GENERALIZED_TIME) => ElementData::Date(tlv.string()?),
        (Class::Universal, universal::GENERAL_STRING) => ElementData::String(tlv.string()?),
        (Class::Universal, universal::BOOLEAN) => ElementData::TrueOrFalse(tlv.boolean()?),
        (Class::Universal, universal::OBJECT_IDENTIFIER) => ElementData::Oid(tlv.oid()?),
        (Class::Context, 2) => ElementData::ElementNotThere,
        (Class::Context, 3) => ElementData::ElementEmpty,
        (Class::Context, 4) => ElementData::NoDataRequested,
        (Class::Context, 6) => ElementData::Subtree(generic_record(tlv, depth)?),
        (_, n) => {
            return Err(Z3950Error::UnsupportedChoice {
                choice: "ElementData",
                tag: n,
            })
        }
    };
    Ok(data)
}

fn diag_rec(tlv: Tlv<'_>) -> Result<DiagRec> {
    match (tlv.tag.class, tlv.tag.number) {
        (Class::Universal, universal::SEQUENCE) => {
            Ok(DiagRec::DefaultFormat(default_diag_format(tlv)?))
        }
        (Class::Universal, universal::EXTERNAL) => Ok(DiagRec::ExternallyDefined(external(tlv)?)),
        (_, n) => Err(Z3950Error::UnsupportedChoice {
            choice: "DiagRec",
            tag: n,
        }),
    }
}

fn default_diag_format(tlv: Tlv<'_>) -> Result<DefaultDiagFormat> {
    let mut r = tlv.reader();
    let diagnostic_set_id = r
        .expect(Tag::universal(universal::OBJECT_IDENTIFIER), "diagnosticSetId")?
        .oid()?;
    let condition = r.expect(Tag::universal(universal::INTEGER), "condition")?.integer()?;
    let info = r.read()?;
    let addinfo = match (info.tag.class, info.tag.number) {
        (Class::Universal, universal::VISIBLE_STRING) => AddInfo::V2(info.string()?),
        (Class::Universal, universal::GENERAL_STRING) => AddInfo::V3(info.string()?),
        (_, n) => {
            return Err(Z3950Error::UnsupportedChoice {
                choice: "addinfo",
                tag: n,
            })
        }
    };
    r.skip_rest()?;
    Ok(DefaultDiagFormat {
        diagnostic_set_id,
        condition,
        addinfo,
    })
}
