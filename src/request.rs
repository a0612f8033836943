//! Request builders.
//!
//! Each builder turns a parameter struct into one encoded APDU. Every call
//! returns its own freshly allocated [`Bytes`]; nothing is shared between
//! calls, so builders may be used from any number of sessions at once.
//!
//! ```text
//! InitParams    ──init_request────▶ initRequest    [20]
//! SearchParams  ──search_request──▶ searchRequest  [22]
//! PresentParams ──present_request─▶ presentRequest [24]
//! ```

use bytes::Bytes;
use tracing::debug;

use crate::codec::ApduCodec;
use crate::error::Result;
use crate::protocol::apdu::{
    options, protocol_version, ElementSetNames, IdAuthentication, InitRequest, PresentRequest,
    RecordComposition, SearchRequest,
};
use crate::protocol::ber::BitString;
use crate::protocol::{Apdu, RecordSyntax};
use crate::query::{build_query, QueryType};

/// Default preferred message size and maximum record size (1 MiB).
pub const DEFAULT_MESSAGE_SIZE: i64 = 1024 * 1024;

/// Parameters of an Init request.
#[derive(Debug, Clone)]
pub struct InitParams {
    pub reference_id: Option<Bytes>,
    pub preferred_message_size: i64,
    pub maximum_record_size: i64,
    pub user: Option<String>,
    pub password: Option<String>,
    pub group: Option<String>,
    pub implementation_id: String,
    pub implementation_name: String,
    pub implementation_version: String,
}

impl Default for InitParams {
    fn default() -> Self {
        Self {
            reference_id: None,
            preferred_message_size: DEFAULT_MESSAGE_SIZE,
            maximum_record_size: DEFAULT_MESSAGE_SIZE,
            user: None,
            password: None,
            group: None,
            implementation_id: String::new(),
            implementation_name: String::new(),
            implementation_version: String::new(),
        }
    }
}

impl InitParams {
    /// Authentication mode implied by which credentials are present.
    ///
    /// A password or group without a user is ignored.
    pub fn authentication(&self) -> Option<IdAuthentication> {
        let user = self.user.as_ref()?;
        match &self.password {
            None => Some(IdAuthentication::Open(user.clone())),
            Some(password) => Some(IdAuthentication::IdPass {
                group_id: self.group.clone(),
                user_id: Some(user.clone()),
                password: Some(password.clone()),
            }),
        }
    }
}

/// Parameters of a Search request against a single database.
#[derive(Debug, Clone)]
pub struct SearchParams {
    pub reference_id: Option<Bytes>,
    pub database: String,
    pub query: String,
    pub query_type: QueryType,
    pub result_set_name: String,
    pub small_set_element_set_name: String,
    pub medium_set_element_set_name: String,
    /// Record syntax name (`"USMARC"`, `"sutrs"`, ...) or dotted OID.
    pub record_syntax: String,
    pub small_set_upper_bound: i64,
    pub large_set_lower_bound: i64,
    pub medium_set_present_number: i64,
}

impl SearchParams {
    /// Search `database` with `query` using default set sizes.
    pub fn new(database: impl Into<String>, query: impl Into<String>) -> Self {
        Self {
            reference_id: None,
            database: database.into(),
            query: query.into(),
            query_type: QueryType::default(),
            result_set_name: "default".to_string(),
            small_set_element_set_name: "F".to_string(),
            medium_set_element_set_name: "F".to_string(),
            record_syntax: "USMARC".to_string(),
            small_set_upper_bound: 0,
            large_set_lower_bound: 1,
            medium_set_present_number: 0,
        }
    }
}

/// Parameters of a Present request for one contiguous range.
#[derive(Debug, Clone)]
pub struct PresentParams {
    pub reference_id: Option<Bytes>,
    pub result_set_id: String,
    /// 1-based position of the first record.
    pub start: i64,
    pub count: i64,
    pub element_set_name: String,
    pub record_syntax: String,
}

impl PresentParams {
    pub fn new(result_set_id: impl Into<String>, start: i64, count: i64) -> Self {
        Self {
            reference_id: None,
            result_set_id: result_set_id.into(),
            start,
            count,
            element_set_name: "F".to_string(),
            record_syntax: "USMARC".to_string(),
        }
    }
}

fn non_empty(s: &str) -> Option<String> {
    (!s.is_empty()).then(|| s.to_string())
}

fn generic(name: &str) -> ElementSetNames {
    ElementSetNames::Generic(name.to_string())
}

/// Build the Init APDU without encoding it.
pub fn init_apdu(params: &InitParams) -> Apdu {
    let mut opts = BitString::with_len(options::NAMED_RESULT_SETS + 1);
    for bit in [
        options::SEARCH,
        options::PRESENT,
        options::NAMED_RESULT_SETS,
        options::TRIGGER_RESOURCE_CTRL,
        options::SCAN,
        options::SORT,
        options::EXTENDED_SERVICES,
        options::DEL_SET,
    ] {
        opts.set(bit);
    }

    let mut versions = BitString::with_len(protocol_version::V3 + 1);
    for bit in [protocol_version::V1, protocol_version::V2, protocol_version::V3] {
        versions.set(bit);
    }

    Apdu::InitRequest(InitRequest {
        reference_id: params.reference_id.clone(),
        protocol_version: versions,
        options: opts,
        preferred_message_size: params.preferred_message_size,
        maximum_record_size: params.maximum_record_size,
        id_authentication: params.authentication(),
        implementation_id: non_empty(&params.implementation_id),
        implementation_name: non_empty(&params.implementation_name),
        implementation_version: non_empty(&params.implementation_version),
    })
}

/// Build the Search APDU without encoding it.
///
/// # Errors
///
/// Fails with [`Z3950Error::RecordSyntax`](crate::Z3950Error::RecordSyntax)
/// when the record syntax is unknown, or
/// [`Z3950Error::Query`](crate::Z3950Error::Query) when the query does not
/// compile.
pub fn search_apdu(params: &SearchParams) -> Result<Apdu> {
    let syntax = RecordSyntax::resolve(&params.record_syntax)?;
    let query = build_query(params.query_type, &params.query)?;

    Ok(Apdu::SearchRequest(SearchRequest {
        reference_id: params.reference_id.clone(),
        small_set_upper_bound: params.small_set_upper_bound,
        large_set_lower_bound: params.large_set_lower_bound,
        medium_set_present_number: params.medium_set_present_number,
        replace_indicator: true,
        result_set_name: params.result_set_name.clone(),
        database_names: vec![params.database.clone()],
        small_set_element_set_names: Some(generic(&params.small_set_element_set_name)),
        medium_set_element_set_names: Some(generic(&params.medium_set_element_set_name)),
        preferred_record_syntax: Some(syntax.oid()),
        query,
    }))
}

/// Build the Present APDU without encoding it.
///
/// # Errors
///
/// Fails when the record syntax is unknown.
pub fn present_apdu(params: &PresentParams) -> Result<Apdu> {
    let syntax = RecordSyntax::resolve(&params.record_syntax)?;

    Ok(Apdu::PresentRequest(PresentRequest {
        reference_id: params.reference_id.clone(),
        result_set_id: params.result_set_id.clone(),
        result_set_start_point: params.start,
        number_of_records_requested: params.count,
        record_composition: Some(RecordComposition::Simple(generic(&params.element_set_name))),
        preferred_record_syntax: Some(syntax.oid()),
    }))
}

fn encode<C: ApduCodec + ?Sized>(codec: &C, apdu: &Apdu) -> Result<Bytes> {
    let bytes = codec.encode(apdu)?;
    debug!(kind = apdu.name(), size = bytes.len(), "built request");
    Ok(bytes)
}

/// Encode an Init request.
///
/// # Errors
///
/// Returns the codec's encoding error.
pub fn init_request<C: ApduCodec + ?Sized>(codec: &C, params: &InitParams) -> Result<Bytes> {
    encode(codec, &init_apdu(params))
}

/// Encode a Search request. No bytes are produced when the request cannot
/// be built.
///
/// # Errors
///
/// See [`search_apdu`].
pub fn search_request<C: ApduCodec + ?Sized>(codec: &C, params: &SearchParams) -> Result<Bytes> {
    encode(codec, &search_apdu(params)?)
}

/// Encode a Present request.
///
/// # Errors
///
/// See [`present_apdu`].
pub fn present_request<C: ApduCodec + ?Sized>(codec: &C, params: &PresentParams) -> Result<Bytes> {
    encode(codec, &present_apdu(params)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::BerCodec;
    use crate::error::Z3950Error;
    use crate::protocol::apdu::{Query, RpnStructure};
    use crate::protocol::AttributeSet;

    fn decode(bytes: &[u8]) -> Apdu {
        BerCodec.decode(bytes).unwrap()
    }

    fn init_of(params: &InitParams) -> InitRequest {
        match decode(&init_request(&BerCodec, params).unwrap()) {
            Apdu::InitRequest(init) => init,
            other => panic!("expected initRequest, got {}", other.name()),
        }
    }

    #[test]
    fn test_init_without_user_has_no_authentication() {
        let init = init_of(&InitParams::default());
        assert_eq!(init.id_authentication, None);
        assert_eq!(init.implementation_id, None);
    }

    #[test]
    fn test_init_user_only_is_open() {
        let init = init_of(&InitParams {
            user: Some("alice".to_string()),
            ..Default::default()
        });
        assert_eq!(init.id_authentication, Some(IdAuthentication::Open("alice".to_string())));
    }

    #[test]
    fn test_init_user_password_group_is_id_pass() {
        let init = init_of(&InitParams {
            user: Some("alice".to_string()),
            password: Some("s3cr3t".to_string()),
            group: Some("g1".to_string()),
            ..Default::default()
        });
        assert_eq!(
            init.id_authentication,
            Some(IdAuthentication::IdPass {
                group_id: Some("g1".to_string()),
                user_id: Some("alice".to_string()),
                password: Some("s3cr3t".to_string()),
            })
        );
    }

    #[test]
    fn test_init_password_without_group() {
        let params = InitParams {
            user: Some("alice".to_string()),
            password: Some("pw".to_string()),
            ..Default::default()
        };
        let Some(IdAuthentication::IdPass { group_id, .. }) = params.authentication() else {
            panic!("expected idPass");
        };
        assert_eq!(group_id, None);
    }

    #[test]
    fn test_init_options_versions_and_sizes() {
        let init = init_of(&InitParams {
            reference_id: Some(Bytes::from_static(b"ref-1")),
            preferred_message_size: 4096,
            maximum_record_size: 2048,
            implementation_name: "z3950-client".to_string(),
            ..Default::default()
        });

        let set: Vec<usize> = init.options.ones().collect();
        assert_eq!(set, vec![0, 1, 2, 4, 7, 8, 10, 14]);
        assert!(init.protocol_version.is_set(protocol_version::V1));
        assert!(init.protocol_version.is_set(protocol_version::V3));
        assert_eq!(init.preferred_message_size, 4096);
        assert_eq!(init.maximum_record_size, 2048);
        assert_eq!(init.reference_id, Some(Bytes::from_static(b"ref-1")));
        assert_eq!(init.implementation_name.as_deref(), Some("z3950-client"));
        assert_eq!(init.implementation_version, None);
    }

    #[test]
    fn test_search_round_trip() {
        let mut params = SearchParams::new("Default", "@attr 1=4 dinosaurs");
        params.record_syntax = "sutrs".to_string();
        params.reference_id = Some(Bytes::from_static(b"s1"));

        let Apdu::SearchRequest(search) = decode(&search_request(&BerCodec, &params).unwrap()) else {
            panic!("expected searchRequest");
        };
        assert!(search.replace_indicator);
        assert_eq!(search.database_names, vec!["Default".to_string()]);
        assert_eq!(search.preferred_record_syntax, Some(RecordSyntax::Sutrs.oid()));
        assert_eq!(search.small_set_element_set_names, Some(generic("F")));
        assert_eq!(search.medium_set_element_set_names, Some(generic("F")));
        assert_eq!(search.reference_id, Some(Bytes::from_static(b"s1")));
        let Query::Type1(rpn) = search.query else {
            panic!("expected type-1 query");
        };
        assert_eq!(rpn.attribute_set, AttributeSet::Bib1.oid());
        assert!(matches!(rpn.rpn, RpnStructure::Op(_)));
    }

    #[test]
    fn test_search_raw_ccl() {
        let mut params = SearchParams::new("Default", "ti=dinosaurs");
        params.query_type = QueryType::Ccl;

        let Apdu::SearchRequest(search) = decode(&search_request(&BerCodec, &params).unwrap()) else {
            panic!("expected searchRequest");
        };
        assert_eq!(search.query, Query::Type2(Bytes::from_static(b"ti=dinosaurs")));
    }

    #[test]
    fn test_search_unknown_record_syntax_produces_nothing() {
        let mut params = SearchParams::new("Default", "dinosaurs");
        params.record_syntax = "NOSUCHMARC".to_string();

        let err = search_request(&BerCodec, &params).unwrap_err();
        assert!(matches!(err, Z3950Error::RecordSyntax(_)));
        assert!(err.to_string().contains("can't convert record syntax"));
    }

    #[test]
    fn test_search_bad_query() {
        let params = SearchParams::new("Default", "@and lonely");
        let err = search_request(&BerCodec, &params).unwrap_err();
        assert!(matches!(err, Z3950Error::Query(_)));
    }

    #[test]
    fn test_present_round_trip() {
        let mut params = PresentParams::new("default", 11, 10);
        params.element_set_name = "B".to_string();

        let Apdu::PresentRequest(present) = decode(&present_request(&BerCodec, &params).unwrap())
        else {
            panic!("expected presentRequest");
        };
        assert_eq!(present.result_set_id, "default");
        assert_eq!(present.result_set_start_point, 11);
        assert_eq!(present.number_of_records_requested, 10);
        assert_eq!(present.record_composition, Some(RecordComposition::Simple(generic("B"))));
        assert_eq!(present.preferred_record_syntax, Some(RecordSyntax::Usmarc.oid()));
        assert_eq!(present.reference_id, None);
    }

    #[test]
    fn test_builders_return_independent_buffers() {
        let params = InitParams::default();
        let first = init_request(&BerCodec, &params).unwrap();
        let second = init_request(&BerCodec, &InitParams {
            user: Some("bob".to_string()),
            ..Default::default()
        })
        .unwrap();
        assert_ne!(first, second);
        assert_eq!(first, init_request(&BerCodec, &params).unwrap());
    }
}
