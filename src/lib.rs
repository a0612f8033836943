//! # z3950-client
//!
//! Client-side core of the Z39.50 information retrieval protocol.
//!
//! This crate builds Init, Search and Present requests, frames and decodes
//! the server's BER-encoded responses, and translates them into a generic
//! result tree that keeps every protocol discriminator.
//!
//! ## Architecture
//!
//! - **Request path**: [`request`] builders (with [`query`] compilation)
//!   encode through an [`ApduCodec`]
//! - **Read path**: a [`transport::Connection`] yields whole PDUs, the
//!   [`assembler`] decodes at most one per call, [`response::translate`]
//!   turns it into a [`Value`]
//! - **Async session**: [`Client`] drives both paths over tokio
//!
//! ## Example
//!
//! ```
//! use z3950_client::codec::{ApduCodec, BerCodec};
//! use z3950_client::request::{search_request, SearchParams};
//! use z3950_client::QueryType;
//!
//! let mut params = SearchParams::new("Default", "ti=dinosaurs");
//! params.query_type = QueryType::CclToRpn;
//! let bytes = search_request(&BerCodec, &params).unwrap();
//! assert_eq!(BerCodec.decode(&bytes).unwrap().name(), "searchRequest");
//! ```

pub mod assembler;
pub mod client;
pub mod codec;
pub mod error;
pub mod protocol;
pub mod query;
pub mod request;
pub mod response;
pub mod transport;

pub use assembler::{assemble, decode_apdu, Reason};
pub use client::{Client, ClientBuilder, ClientConfig};
pub use codec::{ApduCodec, BerCodec};
pub use error::{Result, Z3950Error};
pub use query::QueryType;
pub use response::{translate, Value};
