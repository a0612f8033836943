//! Query compilation.
//!
//! A search query string is turned into the protocol's query tree according
//! to an explicit [`QueryType`]; the string itself is never sniffed.
//!
//! ```text
//! Prefix    "@attr 1=4 dinosaurs"  ──Pqf::compile──────────────▶ type-1 (RPN)
//! Ccl       "ti=dinosaurs"         ──as octets─────────────────▶ type-2
//! CclToRpn  "ti=dinosaurs"         ──Ccl::parse──▶ CclNode ──lower──▶ type-1 (Bib-1)
//! ```

pub mod ccl;
pub mod pqf;

use bytes::Bytes;
use serde::Deserialize;
use thiserror::Error;

use crate::protocol::apdu::{Query, RpnQuery, RpnStructure};
use crate::protocol::AttributeSet;

pub use ccl::{Ccl, CclBibset, CclNode};
pub use pqf::Pqf;

/// How the caller's query string is to be interpreted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryType {
    /// YAZ prefix query format, compiled locally to RPN.
    #[default]
    Prefix,
    /// CCL sent uninterpreted as a type-2 query.
    Ccl,
    /// CCL compiled locally to RPN.
    #[serde(rename = "ccl2rpn")]
    CclToRpn,
}

impl QueryType {
    /// Stable integer code of the query type.
    pub fn code(self) -> i32 {
        match self {
            QueryType::Prefix => 39501,
            QueryType::Ccl => 39502,
            QueryType::CclToRpn => 39503,
        }
    }
}

/// Query compilation failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryError {
    /// The prefix query did not parse.
    #[error("bad prefix query at position {pos}: {msg}")]
    Prefix { pos: usize, msg: String },

    /// The CCL query did not parse.
    #[error("CCL parse error at position {pos}: {msg}")]
    CclParse { pos: usize, msg: String },

    /// The CCL parse tree could not be lowered to RPN.
    #[error("can't convert CCL to RPN: {0}")]
    CclLower(String),
}

/// Compiles a prefix-notation query string into an RPN query.
pub trait PrefixCompiler {
    fn compile(&self, query: &str) -> Result<RpnQuery, QueryError>;
}

/// Parses CCL and lowers the parse tree to RPN.
pub trait CclCompiler {
    fn parse(&self, query: &str) -> Result<CclNode, QueryError>;

    fn lower(&self, tree: &CclNode) -> Result<RpnStructure, QueryError>;
}

/// Build a query with the default compilers.
///
/// # Errors
///
/// Returns the compiler's [`QueryError`]; a [`QueryType::Ccl`] query cannot
/// fail.
pub fn build_query(query_type: QueryType, query: &str) -> Result<Query, QueryError> {
    build_query_with(query_type, query, &Pqf::default(), &Ccl::default())
}

/// Build a query with caller-supplied compilers.
pub fn build_query_with(
    query_type: QueryType,
    query: &str,
    prefix: &dyn PrefixCompiler,
    ccl: &dyn CclCompiler,
) -> Result<Query, QueryError> {
    match query_type {
        QueryType::Prefix => prefix.compile(query).map(Query::Type1),
        QueryType::Ccl => Ok(Query::Type2(Bytes::copy_from_slice(query.as_bytes()))),
        QueryType::CclToRpn => {
            let tree = ccl.parse(query)?;
            let rpn = ccl.lower(&tree)?;
            Ok(Query::Type1(RpnQuery {
                attribute_set: AttributeSet::Bib1.oid(),
                rpn,
            }))
        }
    }
}
