//! MsgPack export using `rmp-serde`.
//!
//! Always `to_vec_named`, never `to_vec`: the result tree is made of
//! records keyed by field name, and positional arrays would lose the names.
//!
//! # Example
//!
//! ```
//! use z3950_client::codec::MsgPackCodec;
//! use z3950_client::response::{Class, Value};
//!
//! let tree = Value::record(Class::InitResponse, [("result", Value::Bool(true))]);
//! let encoded = MsgPackCodec::encode(&tree).unwrap();
//! let decoded: serde_json::Value = MsgPackCodec::decode(&encoded).unwrap();
//! assert_eq!(decoded["result"], true);
//! ```

use crate::error::Result;

/// MessagePack codec for translated result trees.
pub struct MsgPackCodec;

impl MsgPackCodec {
    /// Encode a value to MsgPack bytes (records as maps).
    ///
    /// # Errors
    ///
    /// Returns error if the value cannot be serialized.
    #[inline]
    pub fn encode<T: serde::Serialize>(value: &T) -> Result<Vec<u8>> {
        Ok(rmp_serde::to_vec_named(value)?)
    }

    /// Decode MsgPack bytes into any deserializable type.
    ///
    /// # Errors
    ///
    /// Returns error if the bytes cannot be deserialized to type T.
    #[inline]
    pub fn decode<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> Result<T> {
        Ok(rmp_serde::from_slice(bytes)?)
    }
}
