//! APDU → BER.

use bytes::Bytes;

use crate::error::Result;
use crate::protocol::apdu::*;
use crate::protocol::ber::{universal, BerWriter, Tag};

pub(super) fn apdu(w: &mut BerWriter, apdu: &Apdu) -> Result<()> {
    match apdu {
        Apdu::InitRequest(x) => w.constructed(Tag::context(20), |w| init_request(w, x)),
        Apdu::InitResponse(x) => w.constructed(Tag::context(21), |w| init_response(w, x)),
        Apdu::SearchRequest(x) => w.constructed(Tag::context(22), |w| search_request(w, x)),
        Apdu::SearchResponse(x) => w.constructed(Tag::context(23), |w| search_response(w, x)),
        Apdu::PresentRequest(x) => w.constructed(Tag::context(24), |w| present_request(w, x)),
        Apdu::PresentResponse(x) => {
            w.constructed(Tag::context(25), |w| present_response(w, x))
        }
    }
}

fn reference_id(w: &mut BerWriter, id: &Option<Bytes>) {
    if let Some(id) = id {
        w.octets(Tag::context(2), id);
    }
}

fn opt_string(w: &mut BerWriter, tag: Tag, value: &Option<String>) {
    if let Some(s) = value {
        w.octets(tag, s.as_bytes());
    }
}

fn init_request(w: &mut BerWriter, x: &InitRequest) -> Result<()> {
    reference_id(w, &x.reference_id);
    w.bit_string(Tag::context(3), &x.protocol_version);
    w.bit_string(Tag::context(4), &x.options);
    w.integer(Tag::context(5), x.preferred_message_size);
    w.integer(Tag::context(6), x.maximum_record_size);
    if let Some(auth) = &x.id_authentication {
        w.constructed(Tag::context(7), |w| id_authentication(w, auth))?;
    }
    opt_string(w, Tag::context(110), &x.implementation_id);
    opt_string(w, Tag::context(111), &x.implementation_name);
    opt_string(w, Tag::context(112), &x.implementation_version);
    Ok(())
}

fn id_authentication(w: &mut BerWriter, auth: &IdAuthentication) -> Result<()> {
    match auth {
        IdAuthentication::Open(token) => {
            w.octets(Tag::universal(universal::VISIBLE_STRING), token.as_bytes());
            Ok(())
        }
        IdAuthentication::IdPass {
            group_id,
            user_id,
            password,
        } => w.constructed(Tag::sequence(), |w| {
            opt_string(w, Tag::context(0), group_id);
            opt_string(w, Tag::context(1), user_id);
            opt_string(w, Tag::context(2), password);
            Ok(())
        }),
        IdAuthentication::Anonymous => {
            w.null(Tag::universal(universal::NULL));
            Ok(())
        }
    }
}

fn init_response(w: &mut BerWriter, x: &InitResponse) -> Result<()> {
    reference_id(w, &x.reference_id);
    w.bit_string(Tag::context(3), &x.protocol_version);
    w.bit_string(Tag::context(4), &x.options);
    w.integer(Tag::context(5), x.preferred_message_size);
    w.integer(Tag::context(6), x.maximum_record_size);
    w.boolean(Tag::context(12), x.result);
    opt_string(w, Tag::context(110), &x.implementation_id);
    opt_string(w, Tag::context(111), &x.implementation_name);
    opt_string(w, Tag::context(112), &x.implementation_version);
    Ok(())
}

fn search_request(w: &mut BerWriter, x: &SearchRequest) -> Result<()> {
    reference_id(w, &x.reference_id);
    w.integer(Tag::context(13), x.small_set_upper_bound);
    w.integer(Tag::context(14), x.large_set_lower_bound);
    w.integer(Tag::context(15), x.medium_set_present_number);
    w.boolean(Tag::context(16), x.replace_indicator);
    w.octets(Tag::context(17), x.result_set_name.as_bytes());
    w.constructed(Tag::context(18), |w| {
        for name in &x.database_names {
            w.octets(Tag::context(105), name.as_bytes());
        }
        Ok(())
    })?;
    if let Some(es) = &x.small_set_element_set_names {
        w.constructed(Tag::context(100), |w| element_set_names(w, es))?;
    }
    if let Some(es) = &x.medium_set_element_set_names {
        w.constructed(Tag::context(101), |w| element_set_names(w, es))?;
    }
    if let Some(oid) = &x.preferred_record_syntax {
        w.oid(Tag::context(104), oid)?;
    }
    w.constructed(Tag::context(21), |w| query(w, &x.query))
}

fn element_set_names(w: &mut BerWriter, es: &ElementSetNames) -> Result<()> {
    match es {
        ElementSetNames::Generic(name) => w.octets(Tag::context(0), name.as_bytes()),
    }
    Ok(())
}

fn query(w: &mut BerWriter, q: &Query) -> Result<()> {
    match q {
        Query::Type1(rpn) => w.constructed(Tag::context(1), |w| {
            w.oid(Tag::universal(universal::OBJECT_IDENTIFIER), &rpn.attribute_set)?;
            rpn_structure(w, &rpn.rpn)
        }),
        Query::Type2(ccl) => w.constructed(Tag::context(2), |w| {
            w.octets(Tag::universal(universal::OCTET_STRING), ccl);
            Ok(())
        }),
    }
}

fn rpn_structure(w: &mut BerWriter, rpn: &RpnStructure) -> Result<()> {
    match rpn {
        RpnStructure::Op(op) => w.constructed(Tag::context(0), |w| operand(w, op)),
        RpnStructure::RpnRpnOp(left, right, op) => w.constructed(Tag::context(1), |w| {
            rpn_structure(w, left)?;
            rpn_structure(w, right)?;
            w.constructed(Tag::context(46), |w| {
                let arm = match op {
                    Operator::And => 0,
                    Operator::Or => 1,
                    Operator::AndNot => 2,
                };
                w.null(Tag::context(arm));
                Ok(())
            })
        }),
    }
}

fn operand(w: &mut BerWriter, op: &Operand) -> Result<()> {
    match op {
        Operand::AttrTerm(apt) => w.constructed(Tag::context(102), |w| {
            w.constructed(Tag::context(44), |w| {
                for attr in &apt.attributes {
                    w.constructed(Tag::sequence(), |w| attribute_element(w, attr))?;
                }
                Ok(())
            })?;
            term(w, &apt.term);
            Ok(())
        }),
        Operand::ResultSet(name) => {
            w.octets(Tag::context(31), name.as_bytes());
            Ok(())
        }
    }
}

fn attribute_element(w: &mut BerWriter, attr: &AttributeElement) -> Result<()> {
    if let Some(set) = &attr.attribute_set {
        w.oid(Tag::context(1), set)?;
    }
    w.integer(Tag::context(120), attr.attribute_type);
    w.integer(Tag::context(121), attr.value);
    Ok(())
}

fn term(w: &mut BerWriter, t: &Term) {
    match t {
        Term::General(bytes) => w.octets(Tag::context(45), bytes),
        Term::Numeric(n) => w.integer(Tag::context(215), *n),
        Term::CharacterString(s) => w.octets(Tag::context(216), s.as_bytes()),
    }
}

fn search_response(w: &mut BerWriter, x: &SearchResponse) -> Result<()> {
    reference_id(w, &x.reference_id);
    w.integer(Tag::context(23), x.result_count);
    w.integer(Tag::context(24), x.number_of_records_returned);
    w.integer(Tag::context(25), x.next_result_set_position);
    w.boolean(Tag::context(22), x.search_status);
    if let Some(status) = x.result_set_status {
        w.integer(Tag::context(26), status);
    }
    if let Some(status) = x.present_status {
        w.integer(Tag::context(27), status);
    }
    if let Some(records) = &x.records {
        self::records(w, records)?;
    }
    Ok(())
}

fn present_request(w: &mut BerWriter, x: &PresentRequest) -> Result<()> {
    reference_id(w, &x.reference_id);
    w.octets(Tag::context(31), x.result_set_id.as_bytes());
    w.integer(Tag::context(30), x.result_set_start_point);
    w.integer(Tag::context(29), x.number_of_records_requested);
    if let Some(RecordComposition::Simple(es)) = &x.record_composition {
        w.constructed(Tag::context(19), |w| element_set_names(w, es))?;
    }
    if let Some(oid) = &x.preferred_record_syntax {
        w.oid(Tag::context(104), oid)?;
    }
    Ok(())
}

fn present_response(w: &mut BerWriter, x: &PresentResponse) -> Result<()> {
    reference_id(w, &x.reference_id);
    w.integer(Tag::context(24), x.number_of_records_returned);
    w.integer(Tag::context(25), x.next_result_set_position);
    w.integer(Tag::context(27), x.present_status);
    if let Some(records) = &x.records {
        self::records(w, records)?;
    }
    Ok(())
}

fn records(w: &mut BerWriter, records: &Records) -> Result<()> {
    match records {
        Records::ResponseRecords(list) => w.constructed(Tag::context(28), |w| {
            for npr in list {
                w.constructed(Tag::sequence(), |w| name_plus_record(w, npr))?;
            }
            Ok(())
        }),
        Records::NonSurrogateDiagnostic(diag) => {
            w.constructed(Tag::context(130), |w| default_diag_format(w, diag))
        }
        Records::MultipleNonSurDiagnostics(list) => w.constructed(Tag::context(205), |w| {
            for diag in list {
                diag_rec(w, diag)?;
            }
            Ok(())
        }),
    }
}

fn name_plus_record(w: &mut BerWriter, npr: &NamePlusRecord) -> Result<()> {
    opt_string(w, Tag::context(0), &npr.database_name);
    w.constructed(Tag::context(1), |w| match &npr.record {
        RecordData::RetrievalRecord(ext) => w.constructed(Tag::context(1), |w| external(w, ext)),
        RecordData::SurrogateDiagnostic(diag) => {
            w.constructed(Tag::context(2), |w| diag_rec(w, diag))
        }
        RecordData::StartingFragment(f) => w.constructed(Tag::context(3), |w| fragment(w, f)),
        RecordData::IntermediateFragment(f) => {
            w.constructed(Tag::context(4), |w| fragment(w, f))
        }
        RecordData::FinalFragment(f) => w.constructed(Tag::context(5), |w| fragment(w, f)),
    })
}

fn fragment(w: &mut BerWriter, f: &FragmentSyntax) -> Result<()> {
    match f {
        FragmentSyntax::ExternallyTagged(ext) => external(w, ext),
        FragmentSyntax::NotExternallyTagged(bytes) => {
            w.octets(Tag::universal(universal::OCTET_STRING), bytes);
            Ok(())
        }
    }
}

fn external(w: &mut BerWriter, ext: &External) -> Result<()> {
    w.constructed(Tag::universal(universal::EXTERNAL), |w| {
        if let Some(oid) = &ext.direct_reference {
            w.oid(Tag::universal(universal::OBJECT_IDENTIFIER), oid)?;
        }
        if let Some(n) = ext.indirect_reference {
            w.integer(Tag::universal(universal::INTEGER), n);
        }
        if let Some(d) = &ext.descriptor {
            w.octets(Tag::universal(universal::OBJECT_DESCRIPTOR), d.as_bytes());
        }
        match &ext.data {
            ExternalData::Sutrs(text) => w.constructed(Tag::context(0), |w| {
                w.octets(Tag::universal(universal::GENERAL_STRING), text);
                Ok(())
            }),
            ExternalData::Grs1(record) => w.constructed(Tag::context(0), |w| {
                w.constructed(Tag::sequence(), |w| generic_record(w, record))
            }),
            ExternalData::Octet(bytes) => {
                w.octets(Tag::context(1), bytes);
                Ok(())
            }
        }
    })
}

fn generic_record(w: &mut BerWriter, record: &GenericRecord) -> Result<()> {
    for element in record {
        w.constructed(Tag::sequence(), |w| tagged_element(w, element))?;
    }
    Ok(())
}

fn tagged_element(w: &mut BerWriter, te: &TaggedElement) -> Result<()> {
    if let Some(t) = te.tag_type {
        w.integer(Tag::context(1), t);
    }
    w.constructed(Tag::context(2), |w| {
        match &te.tag_value {
            StringOrNumeric::String(s) => w.octets(Tag::context(1), s.as_bytes()),
            StringOrNumeric::Numeric(n) => w.integer(Tag::context(2), *n),
        }
        Ok(())
    })?;
    if let Some(n) = te.tag_occurrence {
        w.integer(Tag::context(3), n);
    }
    w.constructed(Tag::context(4), |w| element_data(w, &te.content))
}

fn element_data(w: &mut BerWriter, data: &ElementData) -> Result<()> {
    match data {
        ElementData::Octets(b) => w.octets(Tag::universal(universal::OCTET_STRING), b),
        ElementData::Numeric(n) => w.integer(Tag::universal(universal::INTEGER), *n),
        ElementData::Date(d) => {
            w.octets(Tag::universal(universal::GENERALIZED_TIME), d.as_bytes())
        }
        ElementData::String(s) => w.octets(Tag::universal(universal::GENERAL_STRING), s.as_bytes()),
        ElementData::TrueOrFalse(b) => w.boolean(Tag::universal(universal::BOOLEAN), *b),
        ElementData::Oid(oid) => w.oid(Tag::universal(universal::OBJECT_IDENTIFIER), oid)?,
        ElementData::ElementNotThere => w.null(Tag::context(2)),
        ElementData::ElementEmpty => w.null(Tag::context(3)),
        ElementData::NoDataRequested => w.null(Tag::context(4)),
        ElementData::Subtree(record) => {
            w.constructed(Tag::context(6), |w| generic_record(w, record))?
        }
    }
    Ok(())
}

fn diag_rec(w: &mut BerWriter, diag: &DiagRec) -> Result<()> {
    match diag {
        DiagRec::DefaultFormat(d) => w.constructed(Tag::sequence(), |w| default_diag_format(w, d)),
        DiagRec::ExternallyDefined(ext) => external(w, ext),
    }
}

fn default_diag_format(w: &mut BerWriter, d: &DefaultDiagFormat) -> Result<()> {
    w.oid(Tag::universal(universal::OBJECT_IDENTIFIER), &d.diagnostic_set_id)?;
    w.integer(Tag::universal(universal::INTEGER), d.condition);
    match &d.addinfo {
        AddInfo::V2(s) => w.octets(Tag::universal(universal::VISIBLE_STRING), s.as_bytes()),
        AddInfo::V3(s) => w.octets(Tag::universal(universal::GENERAL_STRING), s.as_bytes()),
    }
    Ok(())
}
