//! Decoded APDU → generic result tree.

use crate::error::{Result, Z3950Error};
use crate::protocol::apdu::*;
use crate::protocol::ber::BitString;
use crate::protocol::{bib1_diagset, bib1_message, Oid, RecordSyntax};

use super::value::{Class, Payload, Record, Value};

/// Translate a response APDU into a [`Value`] tree.
///
/// Optional protocol fields that were absent on the wire are absent from
/// the resulting records.
///
/// # Errors
///
/// - [`Z3950Error::UnsupportedApdu`] for anything other than an Init,
///   Search or Present response.
/// - [`Z3950Error::UnknownRecordSyntax`] for an octet-aligned record whose
///   direct reference is missing from the record syntax table.
pub fn translate(apdu: &Apdu) -> Result<Value> {
    match apdu {
        Apdu::InitResponse(res) => Ok(init_response(res)),
        Apdu::SearchResponse(res) => search_response(res),
        Apdu::PresentResponse(res) => present_response(res),
        other => Err(Z3950Error::UnsupportedApdu(other.name().to_string())),
    }
}

fn init_response(res: &InitResponse) -> Value {
    let record = Record::new(Class::InitResponse)
        .with_opt("referenceId", res.reference_id.clone().map(Value::Bytes))
        .with(
            "protocolVersion",
            bit_names(Class::ProtocolVersion, &res.protocol_version, &protocol_version::NAMES),
        )
        .with("options", bit_names(Class::Options, &res.options, &options::NAMES))
        .with("preferredMessageSize", Value::Int(res.preferred_message_size))
        .with("maximumRecordSize", Value::Int(res.maximum_record_size))
        .with("result", Value::Bool(res.result))
        .with_opt("implementationId", string(&res.implementation_id))
        .with_opt("implementationName", string(&res.implementation_name))
        .with_opt("implementationVersion", string(&res.implementation_version));
    Value::Record(record)
}

/// Names of the set bits that have one; unnamed bits are dropped.
fn bit_names(class: Class, bits: &BitString, names: &[&str]) -> Value {
    let items = bits
        .ones()
        .filter_map(|i| names.get(i).filter(|n| !n.is_empty()))
        .map(|n| Value::Str(n.to_string()))
        .collect();
    Value::Sequence(class, items)
}

fn string(s: &Option<String>) -> Option<Value> {
    s.as_ref().map(|s| Value::Str(s.clone()))
}

fn search_response(res: &SearchResponse) -> Result<Value> {
    let record = Record::new(Class::SearchResponse)
        .with_opt("referenceId", res.reference_id.clone().map(Value::Bytes))
        .with("resultCount", Value::Int(res.result_count))
        .with("numberOfRecordsReturned", Value::Int(res.number_of_records_returned))
        .with("nextResultSetPosition", Value::Int(res.next_result_set_position))
        .with("searchStatus", Value::Bool(res.search_status))
        .with_opt("resultSetStatus", res.result_set_status.map(Value::Int))
        .with_opt("presentStatus", res.present_status.map(Value::Int))
        .with_opt("records", res.records.as_ref().map(records).transpose()?);
    Ok(Value::Record(record))
}

fn present_response(res: &PresentResponse) -> Result<Value> {
    let record = Record::new(Class::PresentResponse)
        .with_opt("referenceId", res.reference_id.clone().map(Value::Bytes))
        .with("numberOfRecordsReturned", Value::Int(res.number_of_records_returned))
        .with("nextResultSetPosition", Value::Int(res.next_result_set_position))
        .with("presentStatus", Value::Int(res.present_status))
        .with_opt("records", res.records.as_ref().map(records).transpose()?);
    Ok(Value::Record(record))
}

fn records(x: &Records) -> Result<Value> {
    let (which, payload) = match x {
        Records::ResponseRecords(list) => {
            let items = list.iter().map(name_plus_record).collect::<Result<Vec<_>>>()?;
            ("responseRecords", Value::Sequence(Class::NamePlusRecordList, items))
        }
        Records::NonSurrogateDiagnostic(diag) => {
            ("nonSurrogateDiagnostic", default_diag_format(diag))
        }
        Records::MultipleNonSurDiagnostics(list) => {
            let items = list.iter().map(diag_rec).collect::<Result<Vec<_>>>()?;
            ("multipleNonSurDiagnostics", Value::Sequence(Class::DiagRecs, items))
        }
    };
    Ok(Value::choice(Class::Records, which, payload))
}

fn name_plus_record(x: &NamePlusRecord) -> Result<Value> {
    let (which, payload) = match &x.record {
        RecordData::RetrievalRecord(ext) => ("databaseRecord", external(ext)?),
        RecordData::SurrogateDiagnostic(diag) => ("surrogateDiagnostic", diag_rec(diag)?),
        RecordData::StartingFragment(f) => ("startingFragment", fragment(f)),
        RecordData::IntermediateFragment(f) => ("intermediateFragment", fragment(f)),
        RecordData::FinalFragment(f) => ("finalFragment", fragment(f)),
    };
    let record = Record::new(Class::NamePlusRecord)
        .with_opt("databaseName", string(&x.database_name))
        .with_choice(which, payload);
    Ok(Value::Record(record))
}

/// Segmented records are not reassembled; level-2 segmentation is never
/// negotiated, so a fragment only shows up from a misbehaving server.
fn fragment(_: &FragmentSyntax) -> Value {
    Value::Unsupported("record fragments")
}

fn external(x: &External) -> Result<Value> {
    match &x.data {
        ExternalData::Sutrs(text) => Ok(Value::Tagged(
            Class::Syntax(RecordSyntax::Sutrs),
            Payload::Text(text.clone()),
        )),
        ExternalData::Grs1(record) => Ok(generic_record(
            Class::Syntax(RecordSyntax::Grs1),
            record,
        )),
        ExternalData::Octet(bytes) => octet_aligned(bytes, x.direct_reference.as_ref()),
    }
}

fn octet_aligned(bytes: &bytes::Bytes, direct_reference: Option<&Oid>) -> Result<Value> {
    let Some(oid) = direct_reference else {
        return Err(Z3950Error::Decode(
            "octet-aligned record without a direct reference".to_string(),
        ));
    };
    match RecordSyntax::from_oid(oid).filter(|rs| rs.is_opaque()) {
        Some(rs) => Ok(Value::Tagged(Class::Syntax(rs), Payload::Octets(bytes.clone()))),
        None => Err(Z3950Error::UnknownRecordSyntax(oid.clone())),
    }
}

fn generic_record(class: Class, record: &GenericRecord) -> Value {
    Value::Sequence(class, record.iter().map(tagged_element).collect())
}

fn tagged_element(x: &TaggedElement) -> Value {
    let tag_value = match &x.tag_value {
        StringOrNumeric::String(s) => Value::Str(s.clone()),
        StringOrNumeric::Numeric(n) => Value::Int(*n),
    };
    let record = Record::new(Class::TaggedElement)
        .with_opt("tagType", x.tag_type.map(Value::Int))
        .with("tagValue", tag_value)
        .with_opt("tagOccurrence", x.tag_occurrence.map(Value::Int))
        .with("content", element_data(&x.content));
    Value::Record(record)
}

fn element_data(x: &ElementData) -> Value {
    let (which, payload) = match x {
        ElementData::Octets(b) => ("octets", Value::Bytes(b.clone())),
        ElementData::Numeric(n) => ("numeric", Value::Int(*n)),
        ElementData::Date(d) => ("date", Value::Str(d.clone())),
        ElementData::String(s) => ("string", Value::Str(s.clone())),
        ElementData::TrueOrFalse(b) => ("trueOrFalse", Value::Bool(*b)),
        ElementData::Oid(oid) => ("oid", self::oid(oid)),
        ElementData::ElementNotThere => ("elementNotThere", Value::Bool(true)),
        ElementData::ElementEmpty => ("elementEmpty", Value::Bool(true)),
        ElementData::NoDataRequested => ("noDataRequested", Value::Bool(true)),
        ElementData::Subtree(record) => ("subtree", generic_record(Class::GenericRecord, record)),
    };
    Value::choice(Class::ElementData, which, payload)
}

fn diag_rec(x: &DiagRec) -> Result<Value> {
    match x {
        DiagRec::DefaultFormat(d) => Ok(default_diag_format(d)),
        DiagRec::ExternallyDefined(ext) => external(ext),
    }
}

fn default_diag_format(x: &DefaultDiagFormat) -> Value {
    let message = (x.diagnostic_set_id == bib1_diagset())
        .then(|| bib1_message(x.condition))
        .flatten()
        .map(|m| Value::Str(m.to_string()));
    let record = Record::new(Class::DefaultDiagFormat)
        .with("diagnosticSetId", oid(&x.diagnostic_set_id))
        .with("condition", Value::Int(x.condition))
        .with("addinfo", Value::Str(x.addinfo.as_str().to_string()))
        .with_opt("message", message);
    Value::Record(record)
}

fn oid(x: &Oid) -> Value {
    Value::Sequence(
        Class::Oid,
        x.arcs().iter().map(|&arc| Value::Int(i64::from(arc))).collect(),
    )
}
