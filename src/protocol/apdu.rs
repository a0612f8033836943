//! Typed Z39.50 APDU tree.
//!
//! One Rust enum per ASN.1 CHOICE and one struct per SEQUENCE, restricted to
//! the Init, Search and Present services. OPTIONAL fields are `Option`s.
//! Fields of the ASN.1 definitions that this crate does not model
//! (`otherInfo`, `userInformationField`, `additionalSearchInfo`, ...) are
//! skipped on decode and never encoded.

use bytes::Bytes;

use super::ber::BitString;
use super::Oid;

/// Bits of the Init `options` bit string.
pub mod options {
    pub const SEARCH: usize = 0;
    pub const PRESENT: usize = 1;
    pub const DEL_SET: usize = 2;
    pub const RESOURCE_REPORT: usize = 3;
    pub const TRIGGER_RESOURCE_CTRL: usize = 4;
    pub const RESOURCE_CTRL: usize = 5;
    pub const ACCESS_CTRL: usize = 6;
    pub const SCAN: usize = 7;
    pub const SORT: usize = 8;
    pub const EXTENDED_SERVICES: usize = 10;
    pub const LEVEL1_SEGMENTATION: usize = 11;
    pub const LEVEL2_SEGMENTATION: usize = 12;
    pub const CONCURRENT_OPERATIONS: usize = 13;
    pub const NAMED_RESULT_SETS: usize = 14;

    /// Names of the option bits, indexed by bit number.
    pub const NAMES: [&str; 15] = [
        "search",
        "present",
        "delSet",
        "resourceReport",
        "triggerResourceCtrl",
        "resourceCtrl",
        "accessCtrl",
        "scan",
        "sort",
        "",
        "extendedServices",
        "level-1Segmentation",
        "level-2Segmentation",
        "concurrentOperations",
        "namedResultSets",
    ];
}

/// Bits of the `protocolVersion` bit string.
pub mod protocol_version {
    pub const V1: usize = 0;
    pub const V2: usize = 1;
    pub const V3: usize = 2;

    pub const NAMES: [&str; 3] = ["version-1", "version-2", "version-3"];
}

/// A Z39.50 protocol data unit.
#[derive(Debug, Clone, PartialEq)]
pub enum Apdu {
    InitRequest(InitRequest),
    InitResponse(InitResponse),
    SearchRequest(SearchRequest),
    SearchResponse(SearchResponse),
    PresentRequest(PresentRequest),
    PresentResponse(PresentResponse),
}

impl Apdu {
    /// ASN.1 name of the PDU arm.
    pub fn name(&self) -> &'static str {
        match self {
            Apdu::InitRequest(_) => "initRequest",
            Apdu::InitResponse(_) => "initResponse",
            Apdu::SearchRequest(_) => "searchRequest",
            Apdu::SearchResponse(_) => "searchResponse",
            Apdu::PresentRequest(_) => "presentRequest",
            Apdu::PresentResponse(_) => "presentResponse",
        }
    }

    /// The reference id carried by any covered APDU.
    pub fn reference_id(&self) -> Option<&Bytes> {
        match self {
            Apdu::InitRequest(x) => x.reference_id.as_ref(),
            Apdu::InitResponse(x) => x.reference_id.as_ref(),
            Apdu::SearchRequest(x) => x.reference_id.as_ref(),
            Apdu::SearchResponse(x) => x.reference_id.as_ref(),
            Apdu::PresentRequest(x) => x.reference_id.as_ref(),
            Apdu::PresentResponse(x) => x.reference_id.as_ref(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct InitRequest {
    pub reference_id: Option<Bytes>,
    pub protocol_version: BitString,
    pub options: BitString,
    pub preferred_message_size: i64,
    /// `exceptionalRecordSize` in the 1995 ASN.1.
    pub maximum_record_size: i64,
    pub id_authentication: Option<IdAuthentication>,
    pub implementation_id: Option<String>,
    pub implementation_name: Option<String>,
    pub implementation_version: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdAuthentication {
    Open(String),
    IdPass {
        group_id: Option<String>,
        user_id: Option<String>,
        password: Option<String>,
    },
    Anonymous,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InitResponse {
    pub reference_id: Option<Bytes>,
    pub protocol_version: BitString,
    pub options: BitString,
    pub preferred_message_size: i64,
    pub maximum_record_size: i64,
    pub result: bool,
    pub implementation_id: Option<String>,
    pub implementation_name: Option<String>,
    pub implementation_version: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SearchRequest {
    pub reference_id: Option<Bytes>,
    pub small_set_upper_bound: i64,
    pub large_set_lower_bound: i64,
    pub medium_set_present_number: i64,
    pub replace_indicator: bool,
    pub result_set_name: String,
    pub database_names: Vec<String>,
    pub small_set_element_set_names: Option<ElementSetNames>,
    pub medium_set_element_set_names: Option<ElementSetNames>,
    pub preferred_record_syntax: Option<Oid>,
    pub query: Query,
}

/// Only the generic arm is modelled; `databaseSpecific` is rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ElementSetNames {
    Generic(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Query {
    /// Type-1 (RPN) query.
    Type1(RpnQuery),
    /// Type-2 (CCL) query, sent as opaque octets.
    Type2(Bytes),
}

#[derive(Debug, Clone, PartialEq)]
pub struct RpnQuery {
    pub attribute_set: Oid,
    pub rpn: RpnStructure,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RpnStructure {
    Op(Operand),
    RpnRpnOp(Box<RpnStructure>, Box<RpnStructure>, Operator),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    AttrTerm(AttributesPlusTerm),
    ResultSet(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct AttributesPlusTerm {
    pub attributes: Vec<AttributeElement>,
    pub term: Term,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeElement {
    pub attribute_set: Option<Oid>,
    pub attribute_type: i64,
    pub value: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Term {
    General(Bytes),
    Numeric(i64),
    CharacterString(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    And,
    Or,
    AndNot,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SearchResponse {
    pub reference_id: Option<Bytes>,
    pub result_count: i64,
    pub number_of_records_returned: i64,
    pub next_result_set_position: i64,
    pub search_status: bool,
    pub result_set_status: Option<i64>,
    pub present_status: Option<i64>,
    pub records: Option<Records>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PresentRequest {
    pub reference_id: Option<Bytes>,
    pub result_set_id: String,
    pub result_set_start_point: i64,
    pub number_of_records_requested: i64,
    pub record_composition: Option<RecordComposition>,
    pub preferred_record_syntax: Option<Oid>,
}

/// Only `simple` composition is modelled; `complex` (espec) is rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordComposition {
    Simple(ElementSetNames),
}

#[derive(Debug, Clone, PartialEq)]
pub struct PresentResponse {
    pub reference_id: Option<Bytes>,
    pub number_of_records_returned: i64,
    pub next_result_set_position: i64,
    pub present_status: i64,
    pub records: Option<Records>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Records {
    ResponseRecords(Vec<NamePlusRecord>),
    NonSurrogateDiagnostic(DefaultDiagFormat),
    MultipleNonSurDiagnostics(Vec<DiagRec>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct NamePlusRecord {
    pub database_name: Option<String>,
    pub record: RecordData,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RecordData {
    RetrievalRecord(External),
    SurrogateDiagnostic(DiagRec),
    StartingFragment(FragmentSyntax),
    IntermediateFragment(FragmentSyntax),
    FinalFragment(FragmentSyntax),
}

#[derive(Debug, Clone, PartialEq)]
pub enum FragmentSyntax {
    ExternallyTagged(External),
    NotExternallyTagged(Bytes),
}

/// ASN.1 EXTERNAL, resolved to the record syntaxes this crate handles.
#[derive(Debug, Clone, PartialEq)]
pub struct External {
    pub direct_reference: Option<Oid>,
    pub indirect_reference: Option<i64>,
    pub descriptor: Option<String>,
    pub data: ExternalData,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExternalData {
    /// Simple unstructured text record, as the octets received.
    Sutrs(Bytes),
    /// Generic record syntax 1.
    Grs1(GenericRecord),
    /// Any opaque octet string; the syntax is in `direct_reference`.
    Octet(Bytes),
}

pub type GenericRecord = Vec<TaggedElement>;

#[derive(Debug, Clone, PartialEq)]
pub struct TaggedElement {
    pub tag_type: Option<i64>,
    pub tag_value: StringOrNumeric,
    pub tag_occurrence: Option<i64>,
    pub content: ElementData,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StringOrNumeric {
    String(String),
    Numeric(i64),
}

#[derive(Debug, Clone, PartialEq)]
pub enum ElementData {
    Octets(Bytes),
    Numeric(i64),
    Date(String),
    String(String),
    TrueOrFalse(bool),
    Oid(Oid),
    ElementNotThere,
    ElementEmpty,
    NoDataRequested,
    Subtree(GenericRecord),
}

#[derive(Debug, Clone, PartialEq)]
pub enum DiagRec {
    DefaultFormat(DefaultDiagFormat),
    ExternallyDefined(External),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DefaultDiagFormat {
    pub diagnostic_set_id: Oid,
    pub condition: i64,
    pub addinfo: AddInfo,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddInfo {
    /// VisibleString (v2).
    V2(String),
    /// InternationalString (v3).
    V3(String),
}

impl AddInfo {
    pub fn as_str(&self) -> &str {
        match self {
            AddInfo::V2(s) | AddInfo::V3(s) => s,
        }
    }
}
