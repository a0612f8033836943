//! Generic result tree.
//!
//! ```text
//! Value
//!  ├── Record(class, { name → Value, ... })   fields only when present
//!  ├── Sequence(class, [Value, ...])
//!  ├── Tagged(class, Text | Octets)           record syntax + raw payload
//!  ├── Int / Bool / Str / Bytes
//!  └── Unsupported(what)                      known but unimplemented
//! ```
//!
//! A CHOICE becomes a [`Record`] holding a `which` field with the arm name
//! and one payload field of the same name. Choices are only built through
//! [`Record::choice`] and [`Record::with_choice`], so the two always agree.

use std::fmt;

use bytes::Bytes;
use indexmap::IndexMap;
use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};

use crate::protocol::RecordSyntax;

/// Field name of a CHOICE discriminator.
pub const WHICH: &str = "which";

/// What a record, sequence or tagged scalar represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Class {
    InitResponse,
    SearchResponse,
    PresentResponse,
    Records,
    NamePlusRecordList,
    NamePlusRecord,
    TaggedElement,
    ElementData,
    GenericRecord,
    DiagRecs,
    DefaultDiagFormat,
    Oid,
    Options,
    ProtocolVersion,
    /// A retrieval record in the given syntax.
    Syntax(RecordSyntax),
}

impl Class {
    pub fn name(self) -> &'static str {
        match self {
            Class::InitResponse => "InitResponse",
            Class::SearchResponse => "SearchResponse",
            Class::PresentResponse => "PresentResponse",
            Class::Records => "Records",
            Class::NamePlusRecordList => "NamePlusRecordList",
            Class::NamePlusRecord => "NamePlusRecord",
            Class::TaggedElement => "TaggedElement",
            Class::ElementData => "ElementData",
            Class::GenericRecord => "GenericRecord",
            Class::DiagRecs => "DiagRecs",
            Class::DefaultDiagFormat => "DefaultDiagFormat",
            Class::Oid => "OID",
            Class::Options => "Options",
            Class::ProtocolVersion => "ProtocolVersion",
            Class::Syntax(rs) => rs.name(),
        }
    }
}

impl fmt::Display for Class {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Raw payload of a tagged scalar.
///
/// Both arms hold the octets exactly as received. `Text` marks character
/// data in an unspecified charset; it reads as `&str` only when the octets
/// happen to be UTF-8.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    Text(Bytes),
    Octets(Bytes),
}

impl Payload {
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Payload::Text(b) | Payload::Octets(b) => b,
        }
    }

    /// The text, if this is character data in UTF-8.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Payload::Text(b) => std::str::from_utf8(b).ok(),
            Payload::Octets(_) => None,
        }
    }
}

/// A node of the result tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Record(Record),
    Sequence(Class, Vec<Value>),
    Tagged(Class, Payload),
    Int(i64),
    Bool(bool),
    Str(String),
    Bytes(Bytes),
    /// Placeholder for a protocol feature that is recognised but not
    /// implemented.
    Unsupported(&'static str),
}

impl Value {
    /// A record from `(name, value)` pairs, in order.
    pub fn record<I>(class: Class, fields: I) -> Value
    where
        I: IntoIterator<Item = (&'static str, Value)>,
    {
        let mut record = Record::new(class);
        for (name, value) in fields {
            record = record.with(name, value);
        }
        Value::Record(record)
    }

    pub fn sequence(class: Class, items: Vec<Value>) -> Value {
        Value::Sequence(class, items)
    }

    /// A discriminated union with arm `which`.
    pub fn choice(class: Class, which: &'static str, payload: Value) -> Value {
        Value::Record(Record::choice(class, which, payload))
    }

    /// Class of a record, sequence or tagged scalar.
    pub fn class(&self) -> Option<Class> {
        match self {
            Value::Record(r) => Some(r.class),
            Value::Sequence(class, _) | Value::Tagged(class, _) => Some(*class),
            _ => None,
        }
    }

    pub fn as_record(&self) -> Option<&Record> {
        match self {
            Value::Record(r) => Some(r),
            _ => None,
        }
    }

    pub fn as_sequence(&self) -> Option<&[Value]> {
        match self {
            Value::Sequence(_, items) => Some(items),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            Value::Tagged(_, payload) => payload.as_str(),
            _ => None,
        }
    }

    /// Field of a record; `None` for absent fields and non-records.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.as_record().and_then(|r| r.get(name))
    }
}

/// Ordered named fields plus a class.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    class: Class,
    fields: IndexMap<&'static str, Value>,
}

impl Record {
    pub fn new(class: Class) -> Self {
        Self {
            class,
            fields: IndexMap::new(),
        }
    }

    /// A record holding only the discriminator and its payload.
    pub fn choice(class: Class, which: &'static str, payload: Value) -> Self {
        Self::new(class).with_choice(which, payload)
    }

    /// Add a field. `which` is reserved for [`Record::with_choice`] and is
    /// ignored here.
    pub fn with(mut self, name: &'static str, value: Value) -> Self {
        if name != WHICH {
            self.fields.insert(name, value);
        }
        self
    }

    /// Add a field only if `value` is present.
    pub fn with_opt(self, name: &'static str, value: Option<Value>) -> Self {
        match value {
            Some(v) => self.with(name, v),
            None => self,
        }
    }

    /// Set the discriminator and the payload field of the same name.
    /// A second call replaces the first arm.
    pub fn with_choice(mut self, which: &'static str, payload: Value) -> Self {
        if let Some(Value::Str(previous)) = self.fields.get(WHICH) {
            let previous = previous.clone();
            self.fields.shift_remove(previous.as_str());
        }
        self.fields.insert(WHICH, Value::Str(which.to_string()));
        self.fields.insert(which, payload);
        self
    }

    pub fn class(&self) -> Class {
        self.class
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    /// The discriminator, if this record is a CHOICE.
    pub fn which(&self) -> Option<&str> {
        match self.fields.get(WHICH) {
            Some(Value::Str(s)) => Some(s),
            _ => None,
        }
    }

    /// Payload of the selected arm.
    pub fn selected(&self) -> Option<&Value> {
        self.which().and_then(|w| self.fields.get(w))
    }

    pub fn fields(&self) -> impl Iterator<Item = (&'static str, &Value)> {
        self.fields.iter().map(|(k, v)| (*k, v))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

const CLASS_KEY: &str = "_class";
const ELEMENTS_KEY: &str = "elements";

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Record(r) => r.serialize(serializer),
            // A retrieval record keeps its syntax name next to the elements
            Value::Sequence(class @ Class::Syntax(_), items) => {
                let mut map = serializer.serialize_map(Some(2))?;
                map.serialize_entry(CLASS_KEY, class.name())?;
                map.serialize_entry(ELEMENTS_KEY, items)?;
                map.end()
            }
            Value::Sequence(_, items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Value::Tagged(class, payload) => {
                let mut map = serializer.serialize_map(Some(2))?;
                map.serialize_entry(CLASS_KEY, class.name())?;
                match payload.as_str() {
                    Some(s) => map.serialize_entry("data", s)?,
                    None => map.serialize_entry("data", serde_bytes::Bytes::new(payload.as_bytes()))?,
                }
                map.end()
            }
            Value::Int(n) => serializer.serialize_i64(*n),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Str(s) => serializer.serialize_str(s),
            Value::Bytes(b) => serializer.serialize_bytes(b),
            Value::Unsupported(what) => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry("_unsupported", what)?;
                map.end()
            }
        }
    }
}

impl Serialize for Record {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len() + 1))?;
        map.serialize_entry(CLASS_KEY, self.class.name())?;
        for (name, value) in &self.fields {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_choice_discriminator_matches_payload() {
        let v = Value::choice(Class::Records, "responseRecords", Value::Int(0));
        let r = v.as_record().unwrap();

        assert_eq!(r.which(), Some("responseRecords"));
        assert_eq!(r.selected(), Some(&Value::Int(0)));
        assert_eq!(r.len(), 2);
    }

    #[test]
    fn test_with_choice_replaces_previous_arm() {
        let r = Record::choice(Class::ElementData, "numeric", Value::Int(1))
            .with_choice("string", Value::Str("x".into()));

        assert_eq!(r.which(), Some("string"));
        assert!(!r.contains("numeric"));
        assert_eq!(r.len(), 2);
    }

    #[test]
    fn test_which_cannot_be_set_as_plain_field() {
        let r = Record::new(Class::TaggedElement).with(WHICH, Value::Str("bogus".into()));
        assert!(r.is_empty());
        assert_eq!(r.which(), None);
    }

    #[test]
    fn test_with_opt_skips_absent() {
        let r = Record::new(Class::SearchResponse)
            .with_opt("referenceId", None)
            .with_opt("resultCount", Some(Value::Int(3)));

        assert!(!r.contains("referenceId"));
        assert_eq!(r.get("resultCount"), Some(&Value::Int(3)));
    }

    #[test]
    fn test_field_order_is_insertion_order() {
        let v = Value::record(
            Class::InitResponse,
            [("b", Value::Int(1)), ("a", Value::Int(2)), ("c", Value::Int(3))],
        );
        let names: Vec<_> = v.as_record().unwrap().fields().map(|(k, _)| k).collect();
        assert_eq!(names, ["b", "a", "c"]);
    }

    #[test]
    fn test_text_payload_keeps_raw_octets() {
        let latin1 = Value::Tagged(
            Class::Syntax(RecordSyntax::Sutrs),
            Payload::Text(Bytes::from_static(b"caf\xE9!")),
        );
        assert_eq!(latin1.as_str(), None);
        let Value::Tagged(_, payload) = &latin1 else {
            unreachable!()
        };
        assert_eq!(payload.as_bytes(), b"caf\xE9!");

        let utf8 = Value::Tagged(
            Class::Syntax(RecordSyntax::Sutrs),
            Payload::Text(Bytes::from_static("café".as_bytes())),
        );
        assert_eq!(utf8.as_str(), Some("café"));
    }

    #[test]
    fn test_class_names() {
        assert_eq!(Class::Syntax(RecordSyntax::Usmarc).name(), "USMARC");
        assert_eq!(Class::Oid.to_string(), "OID");
    }
}
