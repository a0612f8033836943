//! Object identifiers and the registries Z39.50 needs.
//!
//! Record syntaxes live under `1.2.840.10003.5`, attribute sets under
//! `1.2.840.10003.3` and diagnostic sets under `1.2.840.10003.4`.

use std::fmt;
use std::str::FromStr;

use crate::error::{Result, Z3950Error};

/// An object identifier as an ordered list of arcs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Oid(Vec<u32>);

impl Oid {
    /// Create an OID from its arcs.
    pub fn new(arcs: Vec<u32>) -> Self {
        Self(arcs)
    }

    /// Create an OID by copying arcs.
    pub fn from_slice(arcs: &[u32]) -> Self {
        Self(arcs.to_vec())
    }

    /// The arcs, in order.
    #[inline]
    pub fn arcs(&self) -> &[u32] {
        &self.0
    }

    fn z3950(class: u32, value: &[u32]) -> Self {
        let mut arcs = vec![1, 2, 840, 10003, class];
        arcs.extend_from_slice(value);
        Self(arcs)
    }
}

impl fmt::Display for Oid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, arc) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(".")?;
            }
            write!(f, "{}", arc)?;
        }
        Ok(())
    }
}

impl FromStr for Oid {
    type Err = Z3950Error;

    fn from_str(s: &str) -> Result<Self> {
        let arcs = s
            .split('.')
            .map(|arc| arc.trim().parse::<u32>())
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|_| Z3950Error::Decode(format!("not a dotted OID: {:?}", s)))?;
        if arcs.len() < 2 {
            return Err(Z3950Error::Decode(format!("not a dotted OID: {:?}", s)));
        }
        Ok(Self(arcs))
    }
}

const CLASS_ATTSET: u32 = 3;
const CLASS_DIAGSET: u32 = 4;
const CLASS_RECSYN: u32 = 5;

/// Record syntaxes this client can request and recognise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordSyntax {
    Unimarc,
    Intermarc,
    Ccf,
    Usmarc,
    Ukmarc,
    Normarc,
    Librismarc,
    Danmarc,
    Finmarc,
    Mab,
    Canmarc,
    Picamarc,
    Ausmarc,
    Ibermarc,
    Swemarc,
    Sutrs,
    Grs1,
    Xml,
}

impl RecordSyntax {
    /// Every known syntax, in registry order.
    pub const ALL: [RecordSyntax; 18] = [
        RecordSyntax::Unimarc,
        RecordSyntax::Intermarc,
        RecordSyntax::Ccf,
        RecordSyntax::Usmarc,
        RecordSyntax::Ukmarc,
        RecordSyntax::Normarc,
        RecordSyntax::Librismarc,
        RecordSyntax::Danmarc,
        RecordSyntax::Finmarc,
        RecordSyntax::Mab,
        RecordSyntax::Canmarc,
        RecordSyntax::Picamarc,
        RecordSyntax::Ausmarc,
        RecordSyntax::Ibermarc,
        RecordSyntax::Swemarc,
        RecordSyntax::Sutrs,
        RecordSyntax::Grs1,
        RecordSyntax::Xml,
    ];

    /// Conventional name, as used by YAZ-based tools.
    pub fn name(self) -> &'static str {
        match self {
            RecordSyntax::Unimarc => "UNIMARC",
            RecordSyntax::Intermarc => "INTERMARC",
            RecordSyntax::Ccf => "CCF",
            RecordSyntax::Usmarc => "USMARC",
            RecordSyntax::Ukmarc => "UKMARC",
            RecordSyntax::Normarc => "NORMARC",
            RecordSyntax::Librismarc => "LIBRISMARC",
            RecordSyntax::Danmarc => "DANMARC",
            RecordSyntax::Finmarc => "FINMARC",
            RecordSyntax::Mab => "MAB",
            RecordSyntax::Canmarc => "CANMARC",
            RecordSyntax::Picamarc => "PICAMARC",
            RecordSyntax::Ausmarc => "AUSMARC",
            RecordSyntax::Ibermarc => "IBERMARC",
            RecordSyntax::Swemarc => "SWEMARC",
            RecordSyntax::Sutrs => "SUTRS",
            RecordSyntax::Grs1 => "GRS-1",
            RecordSyntax::Xml => "XML",
        }
    }

    fn value(self) -> &'static [u32] {
        match self {
            RecordSyntax::Unimarc => &[1],
            RecordSyntax::Intermarc => &[2],
            RecordSyntax::Ccf => &[3],
            RecordSyntax::Usmarc => &[10],
            RecordSyntax::Ukmarc => &[11],
            RecordSyntax::Normarc => &[12],
            RecordSyntax::Librismarc => &[13],
            RecordSyntax::Danmarc => &[14],
            RecordSyntax::Finmarc => &[15],
            RecordSyntax::Mab => &[16],
            RecordSyntax::Canmarc => &[17],
            RecordSyntax::Picamarc => &[19],
            RecordSyntax::Ausmarc => &[20],
            RecordSyntax::Ibermarc => &[21],
            RecordSyntax::Swemarc => &[25],
            RecordSyntax::Sutrs => &[101],
            RecordSyntax::Grs1 => &[105],
            RecordSyntax::Xml => &[109, 10],
        }
    }

    /// The registered OID.
    pub fn oid(self) -> Oid {
        Oid::z3950(CLASS_RECSYN, self.value())
    }

    /// Reverse lookup from an OID.
    pub fn from_oid(oid: &Oid) -> Option<Self> {
        Self::ALL.into_iter().find(|rs| rs.oid() == *oid)
    }

    /// Whether records of this syntax arrive as an opaque octet string.
    pub fn is_opaque(self) -> bool {
        !matches!(self, RecordSyntax::Grs1)
    }

    /// Resolve a caller-supplied record syntax: a name (case-insensitive,
    /// `-` optional) or a dotted OID that is in the registry.
    pub fn resolve(name: &str) -> Result<Self> {
        let wanted = normalise(name);
        if let Some(rs) = Self::ALL.into_iter().find(|rs| normalise(rs.name()) == wanted) {
            return Ok(rs);
        }
        name.parse::<Oid>()
            .ok()
            .and_then(|oid| Self::from_oid(&oid))
            .ok_or_else(|| Z3950Error::RecordSyntax(name.to_string()))
    }
}

fn normalise(name: &str) -> String {
    name.chars()
        .filter(|c| *c != '-' && *c != '_')
        .flat_map(char::to_lowercase)
        .collect()
}

impl fmt::Display for RecordSyntax {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Attribute sets usable in type-1 queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttributeSet {
    Bib1,
    Exp1,
    Ext1,
    Ccl1,
    Gils,
    Stas,
    Collections1,
    Cimi1,
    Geo,
    Zbig,
    Util,
    Xd1,
    Zthes,
}

impl AttributeSet {
    const ALL: [AttributeSet; 13] = [
        AttributeSet::Bib1,
        AttributeSet::Exp1,
        AttributeSet::Ext1,
        AttributeSet::Ccl1,
        AttributeSet::Gils,
        AttributeSet::Stas,
        AttributeSet::Collections1,
        AttributeSet::Cimi1,
        AttributeSet::Geo,
        AttributeSet::Zbig,
        AttributeSet::Util,
        AttributeSet::Xd1,
        AttributeSet::Zthes,
    ];

    pub fn name(self) -> &'static str {
        match self {
            AttributeSet::Bib1 => "Bib-1",
            AttributeSet::Exp1 => "Exp-1",
            AttributeSet::Ext1 => "Ext-1",
            AttributeSet::Ccl1 => "CCL-1",
            AttributeSet::Gils => "GILS",
            AttributeSet::Stas => "STAS",
            AttributeSet::Collections1 => "Collections-1",
            AttributeSet::Cimi1 => "CIMI-1",
            AttributeSet::Geo => "Geo",
            AttributeSet::Zbig => "ZBIG",
            AttributeSet::Util => "Util",
            AttributeSet::Xd1 => "XD-1",
            AttributeSet::Zthes => "Zthes",
        }
    }

    pub fn oid(self) -> Oid {
        let value = AttributeSet::ALL
            .iter()
            .position(|s| *s == self)
            .map_or(1, |i| i as u32 + 1);
        Oid::z3950(CLASS_ATTSET, &[value])
    }

    /// Resolve an attribute set by name or dotted OID. Unregistered dotted
    /// OIDs are accepted as-is.
    pub fn resolve(name: &str) -> Option<Oid> {
        let wanted = normalise(name);
        if let Some(set) = Self::ALL.into_iter().find(|s| normalise(s.name()) == wanted) {
            return Some(set.oid());
        }
        name.parse::<Oid>().ok()
    }
}

/// The Bib-1 diagnostic set.
pub fn bib1_diagset() -> Oid {
    Oid::z3950(CLASS_DIAGSET, &[1])
}
