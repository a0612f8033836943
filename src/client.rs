//! Async client session.
//!
//! The [`ClientBuilder`] collects a [`ClientConfig`] through a fluent API.
//! [`ClientBuilder::connect`] manages the session start:
//! 1. Connect to the server over TCP
//! 2. Send the Init request built from the configuration
//! 3. Read PDUs until the Init response is complete
//! 4. Fail with [`Z3950Error::Rejected`] if the server refused
//!
//! Afterwards [`Client::search`] and [`Client::present`] run one request at
//! a time and return the translated response tree.
//!
//! # Example
//!
//! ```no_run
//! use z3950_client::{Client, QueryType};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut client = Client::builder()
//!         .database("LCDB")
//!         .query_type(QueryType::CclToRpn)
//!         .record_syntax("USMARC")
//!         .connect("tcp:z3950.loc.gov:7090")
//!         .await?;
//!
//!     let search = client.search("ti=dinosaurs").await?;
//!     println!("{:?}", search.as_record().and_then(|r| r.get("resultCount")));
//!
//!     let records = client.present("default", 1, 10).await?;
//!     println!("{}", z3950_client::codec::JsonCodec::to_string_pretty(&records)?);
//!
//!     client.close().await?;
//!     Ok(())
//! }
//! ```

use std::time::Duration;

use bytes::Bytes;
use serde::Deserialize;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::codec::{ApduCodec, BerCodec};
use crate::error::{Result, Z3950Error};
use crate::protocol::{Apdu, PduBuffer, DEFAULT_MAX_PDU_SIZE};
use crate::query::QueryType;
use crate::request::{
    init_request, present_request, search_request, InitParams, PresentParams, SearchParams,
    DEFAULT_MESSAGE_SIZE,
};
use crate::response::{translate, Value};
use crate::transport::host_port;

/// Default timeout for one response (30 seconds).
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Session configuration.
///
/// Every field has a default, so a partial configuration file is enough:
///
/// ```
/// use z3950_client::client::ClientConfig;
///
/// let config: ClientConfig =
///     serde_json::from_str(r#"{"database": "Books", "query_type": "ccl2rpn"}"#).unwrap();
/// assert_eq!(config.database, "Books");
/// assert_eq!(config.record_syntax, "USMARC");
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub preferred_message_size: i64,
    pub maximum_record_size: i64,
    pub implementation_id: String,
    pub implementation_name: String,
    pub implementation_version: String,
    pub user: Option<String>,
    pub password: Option<String>,
    pub group: Option<String>,
    pub database: String,
    pub element_set_name: String,
    pub record_syntax: String,
    pub query_type: QueryType,
    /// Size of one socket read.
    pub read_buffer_size: usize,
    pub max_pdu_size: usize,
    /// Seconds to wait for each response.
    pub timeout_secs: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            preferred_message_size: DEFAULT_MESSAGE_SIZE,
            maximum_record_size: DEFAULT_MESSAGE_SIZE,
            implementation_id: String::new(),
            implementation_name: env!("CARGO_PKG_NAME").to_string(),
            implementation_version: env!("CARGO_PKG_VERSION").to_string(),
            user: None,
            password: None,
            group: None,
            database: "Default".to_string(),
            element_set_name: "F".to_string(),
            record_syntax: "USMARC".to_string(),
            query_type: QueryType::Prefix,
            read_buffer_size: 64 * 1024,
            max_pdu_size: DEFAULT_MAX_PDU_SIZE,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

impl ClientConfig {
    fn init_params(&self) -> InitParams {
        InitParams {
            reference_id: None,
            preferred_message_size: self.preferred_message_size,
            maximum_record_size: self.maximum_record_size,
            user: self.user.clone(),
            password: self.password.clone(),
            group: self.group.clone(),
            implementation_id: self.implementation_id.clone(),
            implementation_name: self.implementation_name.clone(),
            implementation_version: self.implementation_version.clone(),
        }
    }
}

/// Builder for configuring and connecting a Z39.50 client.
#[derive(Debug, Clone, Default)]
pub struct ClientBuilder {
    config: ClientConfig,
}

impl ClientBuilder {
    /// Create a new client builder with the default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole configuration.
    pub fn config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    /// User for authentication. With a password this is an id/password
    /// login, without one an open (token) login.
    pub fn user(mut self, user: &str) -> Self {
        self.config.user = Some(user.to_string());
        self
    }

    pub fn password(mut self, password: &str) -> Self {
        self.config.password = Some(password.to_string());
        self
    }

    pub fn group(mut self, group: &str) -> Self {
        self.config.group = Some(group.to_string());
        self
    }

    /// Database searched by [`Client::search`].
    ///
    /// Default: "Default"
    pub fn database(mut self, database: &str) -> Self {
        self.config.database = database.to_string();
        self
    }

    /// Element set name for searches and presents.
    ///
    /// Default: "F"
    pub fn element_set_name(mut self, name: &str) -> Self {
        self.config.element_set_name = name.to_string();
        self
    }

    /// Preferred record syntax, by name or dotted OID.
    ///
    /// Default: "USMARC"
    pub fn record_syntax(mut self, syntax: &str) -> Self {
        self.config.record_syntax = syntax.to_string();
        self
    }

    /// How query strings are interpreted.
    ///
    /// Default: [`QueryType::Prefix`]
    pub fn query_type(mut self, query_type: QueryType) -> Self {
        self.config.query_type = query_type;
        self
    }

    pub fn preferred_message_size(mut self, size: i64) -> Self {
        self.config.preferred_message_size = size;
        self
    }

    pub fn maximum_record_size(mut self, size: i64) -> Self {
        self.config.maximum_record_size = size;
        self
    }

    /// Implementation id, name and version announced in the Init request.
    /// Empty strings are not sent.
    pub fn implementation(mut self, id: &str, name: &str, version: &str) -> Self {
        self.config.implementation_id = id.to_string();
        self.config.implementation_name = name.to_string();
        self.config.implementation_version = version.to_string();
        self
    }

    /// Largest PDU accepted from the server.
    ///
    /// Default: 64 MiB
    pub fn max_pdu_size(mut self, size: usize) -> Self {
        self.config.max_pdu_size = size;
        self
    }

    /// Time to wait for each response.
    ///
    /// Default: 30 seconds
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout_secs = timeout.as_secs().max(1);
        self
    }

    /// Connect to `addr` and run the Init exchange.
    ///
    /// `addr` is `host:port`, `tcp:host:port` or `host` (port 210).
    ///
    /// # Errors
    ///
    /// Fails on connection errors, on a malformed or unexpected response and
    /// with [`Z3950Error::Rejected`] when the server refuses the Init.
    pub async fn connect(self, addr: &str) -> Result<Client> {
        let stream = TcpStream::connect(host_port(addr)).await?;
        stream.set_nodelay(true)?;
        Client::start(stream, self.config).await
    }
}

/// A connected, initialised Z39.50 session.
#[derive(Debug)]
pub struct Client {
    stream: TcpStream,
    buffer: PduBuffer,
    read_buf: Vec<u8>,
    config: ClientConfig,
    codec: BerCodec,
    init_response: Value,
}

impl Client {
    /// Create a new client builder.
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    async fn start(stream: TcpStream, config: ClientConfig) -> Result<Self> {
        let mut client = Client {
            stream,
            buffer: PduBuffer::with_max_pdu(config.max_pdu_size),
            read_buf: vec![0; config.read_buffer_size.max(1)],
            codec: BerCodec,
            init_response: Value::Bool(false),
            config,
        };

        let request = init_request(&client.codec, &client.config.init_params())?;
        let response = client.exchange(&request, "initResponse").await?;

        let accepted = response
            .as_record()
            .and_then(|r| r.get("result"))
            .and_then(Value::as_bool)
            .unwrap_or(false);
        if !accepted {
            tracing::warn!("Init rejected by server");
            return Err(Z3950Error::Rejected);
        }
        tracing::debug!("Init accepted");

        client.init_response = response;
        Ok(client)
    }

    /// The translated Init response.
    pub fn init_response(&self) -> &Value {
        &self.init_response
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Search the configured database into the result set "default".
    pub async fn search(&mut self, query: &str) -> Result<Value> {
        let params = SearchParams {
            query_type: self.config.query_type,
            small_set_element_set_name: self.config.element_set_name.clone(),
            medium_set_element_set_name: self.config.element_set_name.clone(),
            record_syntax: self.config.record_syntax.clone(),
            ..SearchParams::new(self.config.database.clone(), query)
        };
        self.search_with(&params).await
    }

    /// Run a fully specified Search request.
    pub async fn search_with(&mut self, params: &SearchParams) -> Result<Value> {
        let request = search_request(&self.codec, params)?;
        self.exchange(&request, "searchResponse").await
    }

    /// Retrieve `count` records starting at `start` (1-based).
    pub async fn present(&mut self, result_set: &str, start: i64, count: i64) -> Result<Value> {
        let params = PresentParams {
            element_set_name: self.config.element_set_name.clone(),
            record_syntax: self.config.record_syntax.clone(),
            ..PresentParams::new(result_set, start, count)
        };
        self.present_with(&params).await
    }

    /// Run a fully specified Present request.
    pub async fn present_with(&mut self, params: &PresentParams) -> Result<Value> {
        let request = present_request(&self.codec, params)?;
        self.exchange(&request, "presentResponse").await
    }

    /// Shut the connection down.
    pub async fn close(mut self) -> Result<()> {
        self.stream.shutdown().await?;
        Ok(())
    }

    async fn exchange(&mut self, request: &Bytes, expected: &str) -> Result<Value> {
        self.stream.write_all(request).await?;

        let timeout = Duration::from_secs(self.config.timeout_secs);
        let apdu = tokio::time::timeout(timeout, self.receive())
            .await
            .map_err(|_| Z3950Error::Timeout(timeout))??;

        if apdu.name() != expected {
            tracing::warn!("Expected {}, received {}", expected, apdu.name());
            return Err(Z3950Error::UnsupportedApdu(format!(
                "expected {}, got {}",
                expected,
                apdu.name()
            )));
        }
        translate(&apdu)
    }

    /// Read until one whole PDU is buffered and decode it.
    async fn receive(&mut self) -> Result<Apdu> {
        loop {
            if let Some(pdu) = self.buffer.next_pdu()? {
                tracing::debug!(size = pdu.len(), "received PDU");
                return self.codec.decode(&pdu).map_err(|e| {
                    tracing::warn!("Malformed PDU: {}", e);
                    e
                });
            }

            let n = self.stream.read(&mut self.read_buf).await?;
            if n == 0 {
                return Err(Z3950Error::ConnectionClosed);
            }
            self.buffer.extend(&self.read_buf[..n]);
        }
    }
}
