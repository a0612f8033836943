//! BER (X.690) tag-length-value primitives.
//!
//! Every Z39.50 APDU is a single BER TLV:
//! ```text
//! ┌─────────────────┬──────────────────────┬──────────────┐
//! │ Identifier      │ Length               │ Contents     │
//! │ class|P/C|number│ short, long or       │ N bytes, or  │
//! │ (1+ bytes)      │ indefinite (0x80)    │ TLVs + 00 00 │
//! └─────────────────┴──────────────────────┴──────────────┘
//! ```
//!
//! [`BerWriter`] produces definite-length encodings only. [`BerReader`]
//! and [`frame_length`] accept both definite and indefinite lengths.

use bytes::{BufMut, Bytes, BytesMut};

use super::Oid;
use crate::error::{Result, Z3950Error};

/// Maximum nesting of indefinite-length encodings, and of constructed
/// string segments, accepted by the reader.
pub const MAX_NESTING: usize = 64;

/// Universal tag numbers used by Z39.50.
pub mod universal {
    pub const BOOLEAN: u32 = 1;
    pub const INTEGER: u32 = 2;
    pub const BIT_STRING: u32 = 3;
    pub const OCTET_STRING: u32 = 4;
    pub const NULL: u32 = 5;
    pub const OBJECT_IDENTIFIER: u32 = 6;
    pub const OBJECT_DESCRIPTOR: u32 = 7;
    pub const EXTERNAL: u32 = 8;
    pub const SEQUENCE: u32 = 16;
    pub const GENERALIZED_TIME: u32 = 24;
    pub const VISIBLE_STRING: u32 = 26;
    pub const GENERAL_STRING: u32 = 27;
}

/// Tag class (bits 8-7 of the identifier octet).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Class {
    Universal,
    Application,
    Context,
    Private,
}

impl Class {
    fn bits(self) -> u8 {
        match self {
            Class::Universal => 0x00,
            Class::Application => 0x40,
            Class::Context => 0x80,
            Class::Private => 0xC0,
        }
    }

    fn from_bits(octet: u8) -> Self {
        match octet & 0xC0 {
            0x00 => Class::Universal,
            0x40 => Class::Application,
            0x80 => Class::Context,
            _ => Class::Private,
        }
    }
}

/// A decoded BER identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tag {
    pub class: Class,
    pub constructed: bool,
    pub number: u32,
}

impl Tag {
    /// Primitive universal tag.
    pub const fn universal(number: u32) -> Self {
        Self {
            class: Class::Universal,
            constructed: false,
            number,
        }
    }

    /// Primitive context-specific tag (`[n] IMPLICIT ...`).
    pub const fn context(number: u32) -> Self {
        Self {
            class: Class::Context,
            constructed: false,
            number,
        }
    }

    /// The universal SEQUENCE tag (always constructed).
    pub const fn sequence() -> Self {
        Self {
            class: Class::Universal,
            constructed: true,
            number: universal::SEQUENCE,
        }
    }

    /// Same class and number, constructed form.
    pub const fn constructed(self) -> Self {
        Self {
            class: self.class,
            constructed: true,
            number: self.number,
        }
    }

    /// Class and number agree (the P/C bit is not compared).
    #[inline]
    pub fn matches(&self, other: Tag) -> bool {
        self.class == other.class && self.number == other.number
    }

    /// Encode the identifier octets.
    pub fn encode_into(&self, out: &mut BytesMut) {
        let first = self.class.bits() | if self.constructed { 0x20 } else { 0 };
        if self.number < 31 {
            out.put_u8(first | self.number as u8);
            return;
        }
        out.put_u8(first | 0x1F);
        let mut groups = [0u8; 5];
        let mut n = self.number;
        let mut i = groups.len();
        loop {
            i -= 1;
            groups[i] = (n & 0x7F) as u8;
            n >>= 7;
            if n == 0 {
                break;
            }
        }
        let last = groups.len() - 1;
        for (j, g) in groups.iter().enumerate().skip(i) {
            out.put_u8(if j == last { *g } else { *g | 0x80 });
        }
    }

    /// Decode identifier octets.
    ///
    /// Returns `Ok(None)` if `buf` ends inside the identifier.
    pub fn decode(buf: &[u8]) -> Result<Option<(Tag, usize)>> {
        let Some(&first) = buf.first() else {
            return Ok(None);
        };
        let class = Class::from_bits(first);
        let constructed = first & 0x20 != 0;
        if first & 0x1F != 0x1F {
            let tag = Tag {
                class,
                constructed,
                number: (first & 0x1F) as u32,
            };
            return Ok(Some((tag, 1)));
        }

        let mut number: u32 = 0;
        for (i, &octet) in buf.iter().enumerate().skip(1) {
            if number > (u32::MAX >> 7) {
                return Err(Z3950Error::Decode("tag number overflow".to_string()));
            }
            number = (number << 7) | (octet & 0x7F) as u32;
            if octet & 0x80 == 0 {
                let tag = Tag {
                    class,
                    constructed,
                    number,
                };
                return Ok(Some((tag, i + 1)));
            }
        }
        Ok(None)
    }
}

/// Length octets of a TLV.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Length {
    Definite(usize),
    Indefinite,
}

/// Decoded identifier and length octets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub tag: Tag,
    pub length: Length,
    /// Number of identifier + length octets.
    pub header_len: usize,
}

impl Header {
    /// Decode a TLV header.
    ///
    /// Returns `Ok(None)` if more bytes are needed.
    pub fn decode(buf: &[u8]) -> Result<Option<Header>> {
        let Some((tag, tag_len)) = Tag::decode(buf)? else {
            return Ok(None);
        };
        let Some(&first) = buf.get(tag_len) else {
            return Ok(None);
        };

        if first < 0x80 {
            return Ok(Some(Header {
                tag,
                length: Length::Definite(first as usize),
                header_len: tag_len + 1,
            }));
        }
        if first == 0x80 {
            if !tag.constructed {
                return Err(Z3950Error::Decode(
                    "indefinite length on primitive encoding".to_string(),
                ));
            }
            return Ok(Some(Header {
                tag,
                length: Length::Indefinite,
                header_len: tag_len + 1,
            }));
        }

        let count = (first & 0x7F) as usize;
        if count > std::mem::size_of::<usize>() || first == 0xFF {
            return Err(Z3950Error::Decode(format!(
                "length of {} octets is not supported",
                count
            )));
        }
        let start = tag_len + 1;
        let Some(octets) = buf.get(start..start + count) else {
            return Ok(None);
        };
        let len = octets.iter().fold(0usize, |acc, &b| (acc << 8) | b as usize);
        Ok(Some(Header {
            tag,
            length: Length::Definite(len),
            header_len: start + count,
        }))
    }
}

fn encode_length(out: &mut BytesMut, len: usize) {
    if len < 0x80 {
        out.put_u8(len as u8);
        return;
    }
    let bytes = len.to_be_bytes();
    let skip = bytes.iter().take_while(|&&b| b == 0).count();
    out.put_u8(0x80 | (bytes.len() - skip) as u8);
    out.put_slice(&bytes[skip..]);
}

/// Total size of the first complete TLV in `buf`.
///
/// Returns `Ok(None)` while the TLV is still incomplete, which makes this
/// the boundary detector for a byte stream of concatenated APDUs.
pub fn frame_length(buf: &[u8]) -> Result<Option<usize>> {
    frame_length_nested(buf, 0)
}

fn frame_length_nested(buf: &[u8], depth: usize) -> Result<Option<usize>> {
    let Some(header) = Header::decode(buf)? else {
        return Ok(None);
    };
    match header.length {
        Length::Definite(len) => {
            let total = header.header_len.checked_add(len).ok_or_else(|| {
                Z3950Error::Decode("length overflow".to_string())
            })?;
            Ok((buf.len() >= total).then_some(total))
        }
        Length::Indefinite => {
            if depth >= MAX_NESTING {
                return Err(Z3950Error::Decode(
                    "indefinite-length nesting too deep".to_string(),
                ));
            }
            let mut pos = header.header_len;
            loop {
                let rest = &buf[pos..];
                if rest.len() < 2 {
                    return Ok(None);
                }
                if rest[0] == 0 && rest[1] == 0 {
                    return Ok(Some(pos + 2));
                }
                match frame_length_nested(rest, depth + 1)? {
                    Some(n) => pos += n,
                    None => return Ok(None),
                }
            }
        }
    }
}

/// Bit string with explicit length (e.g. Init options).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BitString {
    bits: Vec<bool>,
}

impl BitString {
    /// Create an all-zero bit string of `len` bits.
    pub fn with_len(len: usize) -> Self {
        Self {
            bits: vec![false; len],
        }
    }

    /// Set bit `i`, growing the string if needed.
    pub fn set(&mut self, i: usize) {
        if i >= self.bits.len() {
            self.bits.resize(i + 1, false);
        }
        self.bits[i] = true;
    }

    /// Whether bit `i` is set (bits past the end are clear).
    pub fn is_set(&self, i: usize) -> bool {
        self.bits.get(i).copied().unwrap_or(false)
    }

    /// Number of bits.
    pub fn len(&self) -> usize {
        self.bits.len()
    }

    /// Whether the bit string has no bits.
    pub fn is_empty(&self) -> bool {
        self.bits.is_empty()
    }

    /// Indices of set bits, ascending.
    pub fn ones(&self) -> impl Iterator<Item = usize> + '_ {
        self.bits
            .iter()
            .enumerate()
            .filter_map(|(i, &b)| b.then_some(i))
    }
}

/// Definite-length BER encoder.
#[derive(Debug, Default)]
pub struct BerWriter {
    buf: BytesMut,
}

impl BerWriter {
    /// Create an empty writer.
    pub fn new() -> Self {
        Self {
            buf: BytesMut::with_capacity(256),
        }
    }

    /// Finish and return the encoded bytes.
    pub fn into_bytes(self) -> Bytes {
        self.buf.freeze()
    }

    /// Write a primitive TLV.
    pub fn primitive(&mut self, tag: Tag, content: &[u8]) {
        tag.encode_into(&mut self.buf);
        encode_length(&mut self.buf, content.len());
        self.buf.put_slice(content);
    }

    /// Write a constructed TLV whose contents are produced by `f`.
    pub fn constructed<F>(&mut self, tag: Tag, f: F) -> Result<()>
    where
        F: FnOnce(&mut BerWriter) -> Result<()>,
    {
        let mut inner = BerWriter::new();
        f(&mut inner)?;
        tag.constructed().encode_into(&mut self.buf);
        encode_length(&mut self.buf, inner.buf.len());
        self.buf.put_slice(&inner.buf);
        Ok(())
    }

    /// Write an INTEGER in minimal two's complement form.
    pub fn integer(&mut self, tag: Tag, value: i64) {
        let bytes = value.to_be_bytes();
        let mut start = 0;
        while start < bytes.len() - 1 {
            let redundant = (bytes[start] == 0x00 && bytes[start + 1] & 0x80 == 0)
                || (bytes[start] == 0xFF && bytes[start + 1] & 0x80 != 0);
            if !redundant {
                break;
            }
            start += 1;
        }
        self.primitive(tag, &bytes[start..]);
    }

    /// Write a BOOLEAN.
    pub fn boolean(&mut self, tag: Tag, value: bool) {
        self.primitive(tag, &[if value { 0xFF } else { 0x00 }]);
    }

    /// Write a NULL.
    pub fn null(&mut self, tag: Tag) {
        self.primitive(tag, &[]);
    }

    /// Write an OCTET STRING (or any string type).
    pub fn octets(&mut self, tag: Tag, value: &[u8]) {
        self.primitive(tag, value);
    }

    /// Write an OBJECT IDENTIFIER.
    pub fn oid(&mut self, tag: Tag, oid: &Oid) -> Result<()> {
        let arcs = oid.arcs();
        if arcs.len() < 2 || arcs[0] > 2 || (arcs[0] < 2 && arcs[1] > 39) {
            return Err(Z3950Error::Encode(format!("invalid OID {}", oid)));
        }
        let mut content = BytesMut::new();
        let first = arcs[0] as u64 * 40 + arcs[1] as u64;
        push_base128(&mut content, first);
        for &arc in &arcs[2..] {
            push_base128(&mut content, arc as u64);
        }
        self.primitive(tag, &content);
        Ok(())
    }

    /// Write a BIT STRING.
    pub fn bit_string(&mut self, tag: Tag, bits: &BitString) {
        let octets = (bits.len() + 7) / 8;
        let mut content = vec![0u8; octets + 1];
        content[0] = ((8 - bits.len() % 8) % 8) as u8;
        for i in bits.ones() {
            content[1 + i / 8] |= 0x80 >> (i % 8);
        }
        self.primitive(tag, &content);
    }
}

fn push_base128(out: &mut BytesMut, mut value: u64) {
    let mut groups = [0u8; 10];
    let mut i = groups.len();
    loop {
        i -= 1;
        groups[i] = (value & 0x7F) as u8;
        value >>= 7;
        if value == 0 {
            break;
        }
    }
    let last = groups.len() - 1;
    for (j, g) in groups.iter().enumerate().skip(i) {
        out.put_u8(if j == last { *g } else { *g | 0x80 });
    }
}

/// One decoded TLV borrowed from the input.
#[derive(Debug, Clone, Copy)]
pub struct Tlv<'a> {
    pub tag: Tag,
    pub content: &'a [u8],
}

/// Sequential reader over the contents of a constructed encoding.
#[derive(Debug, Clone)]
pub struct BerReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> BerReader<'a> {
    /// Read TLVs from `buf`.
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// No more TLVs remain.
    pub fn is_empty(&self) -> bool {
        self.pos >= self.buf.len()
    }

    /// Tag of the next TLV without consuming it.
    pub fn peek_tag(&self) -> Result<Option<Tag>> {
        if self.is_empty() {
            return Ok(None);
        }
        match Tag::decode(&self.buf[self.pos..])? {
            Some((tag, _)) => Ok(Some(tag)),
            None => Err(truncated()),
        }
    }

    /// Consume the next TLV.
    pub fn read(&mut self) -> Result<Tlv<'a>> {
        let rest = &self.buf[self.pos..];
        let header = Header::decode(rest)?.ok_or_else(truncated)?;
        let (content, consumed) = match header.length {
            Length::Definite(len) => {
                let end = header
                    .header_len
                    .checked_add(len)
                    .filter(|&end| end <= rest.len())
                    .ok_or_else(truncated)?;
                (&rest[header.header_len..end], end)
            }
            Length::Indefinite => {
                let total = frame_length(rest)?.ok_or_else(truncated)?;
                (&rest[header.header_len..total - 2], total)
            }
        };
        self.pos += consumed;
        Ok(Tlv {
            tag: header.tag,
            content,
        })
    }

    /// Consume the next TLV, which must carry `tag`.
    pub fn expect(&mut self, tag: Tag, what: &str) -> Result<Tlv<'a>> {
        match self.peek_tag()? {
            Some(found) if found.matches(tag) => self.read(),
            Some(found) => Err(Z3950Error::Decode(format!(
                "{}: expected tag {:?} [{}], found {:?} [{}]",
                what, tag.class, tag.number, found.class, found.number
            ))),
            None => Err(Z3950Error::Decode(format!("{}: missing", what))),
        }
    }

    /// Consume the next TLV only if it carries `tag`.
    pub fn optional(&mut self, tag: Tag) -> Result<Option<Tlv<'a>>> {
        match self.peek_tag()? {
            Some(found) if found.matches(tag) => self.read().map(Some),
            _ => Ok(None),
        }
    }

    /// Skip any remaining TLVs (trailing OPTIONAL fields not modelled here).
    pub fn skip_rest(&mut self) -> Result<()> {
        while !self.is_empty() {
            self.read()?;
        }
        Ok(())
    }
}

fn truncated() -> Z3950Error {
    Z3950Error::Decode("truncated TLV".to_string())
}

impl<'a> Tlv<'a> {
    /// Reader over the contents of a constructed TLV.
    pub fn reader(&self) -> BerReader<'a> {
        BerReader::new(self.content)
    }

    /// Decode INTEGER contents.
    pub fn integer(&self) -> Result<i64> {
        let c = self.content;
        if c.is_empty() || c.len() > 8 {
            return Err(Z3950Error::Decode(format!(
                "INTEGER of {} octets",
                c.len()
            )));
        }
        let init: i64 = if c[0] & 0x80 != 0 { -1 } else { 0 };
        Ok(c.iter().fold(init, |acc, &b| (acc << 8) | b as i64))
    }

    /// Decode BOOLEAN contents.
    pub fn boolean(&self) -> Result<bool> {
        match self.content {
            [b] => Ok(*b != 0),
            _ => Err(Z3950Error::Decode("BOOLEAN must be one octet".to_string())),
        }
    }

    /// Decode NULL contents.
    pub fn null(&self) -> Result<()> {
        if self.content.is_empty() {
            Ok(())
        } else {
            Err(Z3950Error::Decode("NULL with contents".to_string()))
        }
    }

    /// Decode OCTET STRING contents, joining constructed segments.
    pub fn octets(&self) -> Result<Bytes> {
        if !self.tag.constructed {
            return Ok(Bytes::copy_from_slice(self.content));
        }
        let mut out = BytesMut::new();
        self.join_segments(&mut out, 0)?;
        Ok(out.freeze())
    }

    fn join_segments(&self, out: &mut BytesMut, depth: usize) -> Result<()> {
        if !self.tag.constructed {
            out.put_slice(self.content);
            return Ok(());
        }
        if depth >= MAX_NESTING {
            return Err(Z3950Error::Decode("string segments nested too deep".to_string()));
        }
        let mut r = self.reader();
        while !r.is_empty() {
            r.read()?.join_segments(out, depth + 1)?;
        }
        Ok(())
    }

    /// Decode a character string (InternationalString, VisibleString ...).
    pub fn string(&self) -> Result<String> {
        let raw = self.octets()?;
        Ok(String::from_utf8_lossy(&raw).into_owned())
    }

    /// Decode OBJECT IDENTIFIER contents.
    pub fn oid(&self) -> Result<Oid> {
        let mut arcs = Vec::new();
        let mut value: u64 = 0;
        for (i, &b) in self.content.iter().enumerate() {
            if value > (u64::MAX >> 7) {
                return Err(Z3950Error::Decode("OID arc overflow".to_string()));
            }
            value = (value << 7) | (b & 0x7F) as u64;
            if b & 0x80 != 0 {
                if i + 1 == self.content.len() {
                    return Err(Z3950Error::Decode("truncated OID arc".to_string()));
                }
                continue;
            }
            if arcs.is_empty() {
                let first = (value / 40).min(2);
                arcs.push(first as u32);
                arcs.push(narrow_arc(value - first * 40)?);
            } else {
                arcs.push(narrow_arc(value)?);
            }
            value = 0;
        }
        if arcs.is_empty() {
            return Err(Z3950Error::Decode("empty OID".to_string()));
        }
        Ok(Oid::new(arcs))
    }

    /// Decode BIT STRING contents.
    pub fn bit_string(&self) -> Result<BitString> {
        let Some((&unused, data)) = self.content.split_first() else {
            return Err(Z3950Error::Decode("empty BIT STRING".to_string()));
        };
        if unused > 7 || (data.is_empty() && unused != 0) {
            return Err(Z3950Error::Decode("bad BIT STRING padding".to_string()));
        }
        let len = data.len() * 8 - unused as usize;
        let mut bits = BitString::with_len(len);
        for i in 0..len {
            if data[i / 8] & (0x80 >> (i % 8)) != 0 {
                bits.set(i);
            }
        }
        Ok(bits)
    }
}

fn narrow_arc(value: u64) -> Result<u32> {
    u32::try_from(value).map_err(|_| Z3950Error::Decode("OID arc overflow".to_string()))
}
