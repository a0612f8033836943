//! Response translation.
//!
//! [`translate`] walks a decoded response APDU and builds a [`Value`] tree
//! that keeps every discriminator the protocol defines: absent fields are
//! absent, CHOICEs carry an explicit `which`, and records keep their syntax.

mod translate;
mod value;

pub use translate::translate;
pub use value::{Class, Payload, Record, Value, WHICH};
