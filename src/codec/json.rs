//! JSON export using `serde_json`.

use crate::error::Result;

/// JSON codec for translated result trees.
pub struct JsonCodec;

impl JsonCodec {
    /// Encode a value as compact JSON.
    ///
    /// Byte payloads become arrays of numbers.
    #[inline]
    pub fn encode<T: serde::Serialize>(value: &T) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(value)?)
    }

    /// Encode a value as indented JSON text.
    #[inline]
    pub fn to_string_pretty<T: serde::Serialize>(value: &T) -> Result<String> {
        Ok(serde_json::to_string_pretty(value)?)
    }

    /// Decode JSON bytes.
    #[inline]
    pub fn decode<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> Result<T> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    use crate::protocol::RecordSyntax;
    use crate::response::{Class, Payload, Value};

    #[test]
    fn test_choice_keeps_discriminator() {
        let tree = Value::choice(Class::Records, "nonSurrogateDiagnostic", Value::Int(1));

        let json: serde_json::Value = JsonCodec::decode(&JsonCodec::encode(&tree).unwrap()).unwrap();

        assert_eq!(json["_class"], "Records");
        assert_eq!(json["which"], "nonSurrogateDiagnostic");
        assert_eq!(json["nonSurrogateDiagnostic"], 1);
    }

    #[test]
    fn test_grs1_record_keeps_syntax_name() {
        let element = Value::record(Class::TaggedElement, [("tagValue", Value::Int(1))]);
        let tree = Value::sequence(Class::Syntax(RecordSyntax::Grs1), vec![element]);

        let json: serde_json::Value = JsonCodec::decode(&JsonCodec::encode(&tree).unwrap()).unwrap();

        assert_eq!(json["_class"], "GRS-1");
        assert_eq!(json["elements"][0]["_class"], "TaggedElement");
        assert_eq!(json["elements"][0]["tagValue"], 1);
    }

    #[test]
    fn test_non_utf8_text_exports_as_bytes() {
        let tree = Value::Tagged(
            Class::Syntax(RecordSyntax::Sutrs),
            Payload::Text(Bytes::from_static(b"caf\xE9")),
        );

        let json: serde_json::Value = JsonCodec::decode(&JsonCodec::encode(&tree).unwrap()).unwrap();

        assert_eq!(json["_class"], "SUTRS");
        assert_eq!(json["data"], serde_json::json!([99, 97, 102, 233]));
    }

    #[test]
    fn test_unsupported_placeholder() {
        let json = JsonCodec::to_string_pretty(&Value::Unsupported("record fragments")).unwrap();
        assert!(json.contains("record fragments"));
    }
}
