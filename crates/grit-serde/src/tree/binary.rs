//! Binary encoding.
//!
//! Layout:
//!
//! ```text
//! MAGIC_NUMBER
//! string   root version
//! varint   extension count, then (string name, string version) pairs
//! node     0x01 name  attribute*  (node | content | group marker)*  0x00
//! ```
//!
//! Names are interned: a name index equal to the current dictionary length
//! introduces a new entry and is followed by the string itself. Integers are
//! zigzag LEB128 varints, doubles are little-endian f64, strings are
//! length-prefixed UTF-8.

use std::collections::{BTreeMap, HashMap};
use std::io::{self, BufRead, Write};

use grit_core::{GritError, GritResult};
use thiserror::Error;

use super::{AttrValue, TreeDataHeader, TreeDataReader, TreeDataWriter};

/// Preamble identifying a binary document.
pub const MAGIC_NUMBER: &[u8] = b"Binary GRIT";

const MAX_VARINT_BYTES: usize = 10;
const MAX_STRING_LEN: usize = 64 * 1024 * 1024;
const MAX_LIST_LEN: usize = 16 * 1024 * 1024;

mod tag {
    pub const END: u8 = 0x00;
    pub const START: u8 = 0x01;
    pub const ATTRIBUTE: u8 = 0x02;
    pub const CONTENT: u8 = 0x03;
    pub const GROUP_START: u8 = 0x04;
    pub const GROUP_END: u8 = 0x05;
}

mod value_type {
    pub const STRING: u8 = 1;
    pub const BOOLEAN: u8 = 2;
    pub const INTEGER: u8 = 3;
    pub const DOUBLE: u8 = 4;
    pub const INTEGER_LIST: u8 = 5;
    pub const STRING_LIST: u8 = 6;
}

/// Error during binary decoding.
#[derive(Debug, Error)]
pub enum BinaryDecodeError {
    #[error("invalid magic bytes: not a binary GRIT document")]
    InvalidMagic,

    #[error("unexpected end of input while reading {context}")]
    UnexpectedEof { context: &'static str },

    #[error("varint exceeds maximum length (10 bytes)")]
    VarintTooLong,

    #[error("varint overflow (value exceeds u64)")]
    VarintOverflow,

    #[error("{field} length {len} exceeds maximum {max}")]
    LengthExceedsLimit {
        field: &'static str,
        len: u64,
        max: usize,
    },

    #[error("invalid UTF-8 in {field}")]
    InvalidUtf8 { field: &'static str },

    #[error("unexpected tag 0x{tag:02x} while reading {context}")]
    UnexpectedTag { tag: u8, context: &'static str },

    #[error("invalid value type: {value_type}")]
    InvalidValueType { value_type: u8 },

    #[error("name index {index} out of bounds (size: {size})")]
    NameOutOfBounds { index: u64, size: usize },

    #[error(transparent)]
    Io(io::Error),
}

impl From<BinaryDecodeError> for GritError {
    fn from(err: BinaryDecodeError) -> Self {
        match err {
            BinaryDecodeError::Io(e) => GritError::Io(e),
            e @ (BinaryDecodeError::InvalidMagic
            | BinaryDecodeError::UnexpectedTag { .. }
            | BinaryDecodeError::NameOutOfBounds { .. }) => GritError::Structural(e.to_string()),
            e => GritError::Parse(e.to_string()),
        }
    }
}

// =============================================================================
// PRIMITIVES
// =============================================================================

/// Zigzag-encodes a signed integer so small magnitudes stay small.
#[inline]
pub fn zigzag_encode(n: i64) -> u64 {
    ((n << 1) ^ (n >> 63)) as u64
}

#[inline]
pub fn zigzag_decode(n: u64) -> i64 {
    ((n >> 1) as i64) ^ -((n & 1) as i64)
}

/// Writes an unsigned varint (LEB128).
pub fn write_varint<W: Write + ?Sized>(out: &mut W, mut value: u64) -> io::Result<()> {
    let mut buf = [0u8; MAX_VARINT_BYTES];
    let mut len = 0;
    loop {
        let byte = (value & 0x7F) as u8;
        value >>= 7;
        if value == 0 {
            buf[len] = byte;
            len += 1;
            break;
        }
        buf[len] = byte | 0x80;
        len += 1;
    }
    out.write_all(&buf[..len])
}

fn write_string<W: Write + ?Sized>(out: &mut W, value: &str) -> io::Result<()> {
    write_varint(out, value.len() as u64)?;
    out.write_all(value.as_bytes())
}

/// Reads primitives from a buffered byte stream.
#[derive(Debug)]
pub struct Decoder<R> {
    source: R,
}

impl<R: BufRead> Decoder<R> {
    pub fn new(source: R) -> Self {
        Self { source }
    }

    fn fill(&mut self, buf: &mut [u8], context: &'static str) -> Result<(), BinaryDecodeError> {
        self.source.read_exact(buf).map_err(|e| {
            if e.kind() == io::ErrorKind::UnexpectedEof {
                BinaryDecodeError::UnexpectedEof { context }
            } else {
                BinaryDecodeError::Io(e)
            }
        })
    }

    #[inline]
    pub fn read_byte(&mut self, context: &'static str) -> Result<u8, BinaryDecodeError> {
        let mut byte = [0u8; 1];
        self.fill(&mut byte, context)?;
        Ok(byte[0])
    }

    /// Reads an unsigned varint (LEB128).
    pub fn read_varint(&mut self, context: &'static str) -> Result<u64, BinaryDecodeError> {
        let mut result: u64 = 0;
        let mut shift = 0;

        for _ in 0..MAX_VARINT_BYTES {
            let byte = self.read_byte(context)?;
            let value = (byte & 0x7F) as u64;

            if shift == 63 && value > 1 {
                return Err(BinaryDecodeError::VarintOverflow);
            }

            result |= value << shift;

            if byte & 0x80 == 0 {
                return Ok(result);
            }
            shift += 7;
        }

        Err(BinaryDecodeError::VarintTooLong)
    }

    pub fn read_signed_varint(&mut self, context: &'static str) -> Result<i64, BinaryDecodeError> {
        Ok(zigzag_decode(self.read_varint(context)?))
    }

    fn read_len(&mut self, max: usize, field: &'static str) -> Result<usize, BinaryDecodeError> {
        let len = self.read_varint(field)?;
        if len > max as u64 {
            return Err(BinaryDecodeError::LengthExceedsLimit { field, len, max });
        }
        Ok(len as usize)
    }

    /// Reads a length-prefixed UTF-8 string.
    pub fn read_string(&mut self, field: &'static str) -> Result<String, BinaryDecodeError> {
        let len = self.read_len(MAX_STRING_LEN, field)?;
        let mut bytes = vec![0u8; len];
        self.fill(&mut bytes, field)?;
        String::from_utf8(bytes).map_err(|_| BinaryDecodeError::InvalidUtf8 { field })
    }

    /// Reads a little-endian f64.
    pub fn read_f64(&mut self, context: &'static str) -> Result<f64, BinaryDecodeError> {
        let mut bytes = [0u8; 8];
        self.fill(&mut bytes, context)?;
        Ok(f64::from_le_bytes(bytes))
    }
}

// =============================================================================
// WRITER
// =============================================================================

pub struct BinWriter<W: Write> {
    sink: W,
    names: HashMap<String, u64>,
    root_version: String,
    extension_versions: BTreeMap<String, String>,
    open: usize,
    started: bool,
}

impl<W: Write> BinWriter<W> {
    pub fn new(sink: W) -> Self {
        Self {
            sink,
            names: HashMap::new(),
            root_version: String::new(),
            extension_versions: BTreeMap::new(),
            open: 0,
            started: false,
        }
    }

    fn write_header(&mut self) -> io::Result<()> {
        self.sink.write_all(MAGIC_NUMBER)?;
        write_string(&mut self.sink, &self.root_version)?;
        write_varint(&mut self.sink, self.extension_versions.len() as u64)?;
        for (name, version) in &self.extension_versions {
            write_string(&mut self.sink, name)?;
            write_string(&mut self.sink, version)?;
        }
        Ok(())
    }

    fn write_name(&mut self, name: &str) -> io::Result<()> {
        if let Some(&index) = self.names.get(name) {
            return write_varint(&mut self.sink, index);
        }
        let index = self.names.len() as u64;
        write_varint(&mut self.sink, index)?;
        write_string(&mut self.sink, name)?;
        self.names.insert(name.to_string(), index);
        Ok(())
    }

    fn require_open(&self, what: &str) -> GritResult<()> {
        if self.open == 0 {
            return Err(GritError::Structural(format!("{} outside of any node", what)));
        }
        Ok(())
    }
}

impl<W: Write> TreeDataWriter for BinWriter<W> {
    fn set_namespace_prefix(&mut self, _uri: &str, _prefix: &str) {}

    fn set_versions(&mut self, root_version: &str, extension_versions: &BTreeMap<String, String>) {
        self.root_version = root_version.to_string();
        self.extension_versions = extension_versions.clone();
    }

    fn write_start_node(&mut self, _namespace: &str, name: &str) -> GritResult<()> {
        if self.open == 0 {
            if self.started {
                return Err(GritError::Structural("Document already has a root".into()));
            }
            self.started = true;
            self.write_header()?;
        }
        self.sink.write_all(&[tag::START])?;
        self.write_name(name)?;
        self.open += 1;
        Ok(())
    }

    fn write_end_node(&mut self) -> GritResult<()> {
        self.require_open("Node end")?;
        self.sink.write_all(&[tag::END])?;
        self.open -= 1;
        Ok(())
    }

    fn write_start_nodes(&mut self) -> GritResult<()> {
        self.require_open("Repeating group")?;
        self.sink.write_all(&[tag::GROUP_START])?;
        Ok(())
    }

    fn write_end_nodes(&mut self) -> GritResult<()> {
        self.require_open("Repeating group")?;
        self.sink.write_all(&[tag::GROUP_END])?;
        Ok(())
    }

    fn write_node_content(&mut self, content: &str) -> GritResult<()> {
        self.require_open("Content")?;
        self.sink.write_all(&[tag::CONTENT])?;
        write_string(&mut self.sink, content)?;
        Ok(())
    }

    fn write_attribute(&mut self, name: &str, value: AttrValue) -> GritResult<()> {
        self.require_open("Attribute")?;
        self.sink.write_all(&[tag::ATTRIBUTE])?;
        self.write_name(name)?;
        let out = &mut self.sink;
        match value {
            AttrValue::Str(s) => {
                out.write_all(&[value_type::STRING])?;
                write_string(out, &s)?;
            }
            AttrValue::Bool(b) => out.write_all(&[value_type::BOOLEAN, b as u8])?,
            AttrValue::Int(i) => {
                out.write_all(&[value_type::INTEGER])?;
                write_varint(out, zigzag_encode(i))?;
            }
            AttrValue::Double(d) => {
                out.write_all(&[value_type::DOUBLE])?;
                out.write_all(&d.to_le_bytes())?;
            }
            AttrValue::IntList(values) => {
                out.write_all(&[value_type::INTEGER_LIST])?;
                write_varint(out, values.len() as u64)?;
                for v in values {
                    write_varint(out, zigzag_encode(v))?;
                }
            }
            AttrValue::StrList(values) => {
                out.write_all(&[value_type::STRING_LIST])?;
                write_varint(out, values.len() as u64)?;
                for v in &values {
                    write_string(out, v)?;
                }
            }
        }
        Ok(())
    }

    fn close(&mut self) -> GritResult<()> {
        if !self.started {
            return Err(GritError::Structural("Empty document".into()));
        }
        if self.open > 0 {
            return Err(GritError::Structural(format!(
                "Document closed with {} open node(s)",
                self.open
            )));
        }
        self.sink.flush()?;
        Ok(())
    }
}

// =============================================================================
// READER
// =============================================================================

pub struct BinReader<R: BufRead> {
    decoder: Decoder<R>,
    names: Vec<String>,
    stack: Vec<HashMap<String, AttrValue>>,
    /// Tag read past the attributes of the node just entered.
    pending: Option<u8>,
}

impl<R: BufRead> BinReader<R> {
    pub fn new(source: R) -> Self {
        Self {
            decoder: Decoder::new(source),
            names: Vec::new(),
            stack: Vec::new(),
            pending: None,
        }
    }

    fn next_tag(&mut self) -> Result<u8, BinaryDecodeError> {
        match self.pending.take() {
            Some(tag) => Ok(tag),
            None => self.decoder.read_byte("tag"),
        }
    }

    fn read_name(&mut self) -> Result<String, BinaryDecodeError> {
        let index = self.decoder.read_varint("name index")?;
        if index == self.names.len() as u64 {
            let name = self.decoder.read_string("name")?;
            self.names.push(name.clone());
            return Ok(name);
        }
        self.names
            .get(index as usize)
            .cloned()
            .ok_or(BinaryDecodeError::NameOutOfBounds {
                index,
                size: self.names.len(),
            })
    }

    fn read_value(&mut self) -> Result<AttrValue, BinaryDecodeError> {
        let d = &mut self.decoder;
        let value = match d.read_byte("value type")? {
            value_type::STRING => AttrValue::Str(d.read_string("string value")?),
            value_type::BOOLEAN => AttrValue::Bool(d.read_byte("boolean value")? != 0),
            value_type::INTEGER => AttrValue::Int(d.read_signed_varint("integer value")?),
            value_type::DOUBLE => AttrValue::Double(d.read_f64("double value")?),
            value_type::INTEGER_LIST => {
                let len = d.read_len(MAX_LIST_LEN, "integer list")?;
                let mut values = Vec::with_capacity(len.min(1024));
                for _ in 0..len {
                    values.push(d.read_signed_varint("integer list")?);
                }
                AttrValue::IntList(values)
            }
            value_type::STRING_LIST => {
                let len = d.read_len(MAX_LIST_LEN, "string list")?;
                let mut values = Vec::with_capacity(len.min(1024));
                for _ in 0..len {
                    values.push(d.read_string("string list")?);
                }
                AttrValue::StrList(values)
            }
            other => return Err(BinaryDecodeError::InvalidValueType { value_type: other }),
        };
        Ok(value)
    }

    /// Enters the node whose start tag and name were just read.
    fn enter(&mut self) -> Result<(), BinaryDecodeError> {
        let mut attributes = HashMap::new();
        loop {
            let tag = self.decoder.read_byte("tag")?;
            if tag != tag::ATTRIBUTE {
                self.pending = Some(tag);
                break;
            }
            let name = self.read_name()?;
            let value = self.read_value()?;
            attributes.insert(name, value);
        }
        self.stack.push(attributes);
        Ok(())
    }

    fn leave(&mut self) -> GritResult<()> {
        self.stack
            .pop()
            .map(|_| ())
            .ok_or_else(|| GritError::Structural("No open node".into()))
    }
}

impl<R: BufRead> TreeDataReader for BinReader<R> {
    fn read_header(&mut self) -> GritResult<TreeDataHeader> {
        let mut magic = vec![0u8; MAGIC_NUMBER.len()];
        self.decoder
            .fill(&mut magic, "magic number")
            .map_err(|_| BinaryDecodeError::InvalidMagic)?;
        if magic != MAGIC_NUMBER {
            return Err(BinaryDecodeError::InvalidMagic.into());
        }
        let version = self.decoder.read_string("version")?;
        let count = self
            .decoder
            .read_len(MAX_LIST_LEN, "extension versions")?;
        let mut extension_versions = BTreeMap::new();
        for _ in 0..count {
            let name = self.decoder.read_string("extension name")?;
            let ext_version = self.decoder.read_string("extension version")?;
            extension_versions.insert(name, ext_version);
        }
        match self.decoder.read_byte("root node")? {
            tag::START => {
                self.read_name()?;
                self.enter()?;
            }
            tag => {
                return Err(BinaryDecodeError::UnexpectedTag {
                    tag,
                    context: "root node",
                }
                .into())
            }
        }
        Ok(TreeDataHeader {
            version,
            valid: true,
            extension_versions,
        })
    }

    fn depth(&self) -> usize {
        self.stack.len()
    }

    fn next_child_node(&mut self) -> GritResult<Option<String>> {
        if self.stack.is_empty() {
            return Err(GritError::Structural("No open node".into()));
        }
        loop {
            match self.next_tag()? {
                tag::START => {
                    let name = self.read_name()?;
                    self.enter()?;
                    return Ok(Some(name));
                }
                tag::GROUP_START | tag::GROUP_END => continue,
                tag::END => {
                    self.leave()?;
                    return Ok(None);
                }
                tag => {
                    return Err(BinaryDecodeError::UnexpectedTag {
                        tag,
                        context: "child node",
                    }
                    .into())
                }
            }
        }
    }

    fn skip_node(&mut self) -> GritResult<()> {
        let mut nested = 0usize;
        loop {
            match self.next_tag()? {
                tag::START => {
                    self.read_name()?;
                    nested += 1;
                }
                tag::ATTRIBUTE => {
                    self.read_name()?;
                    self.read_value()?;
                }
                tag::CONTENT => {
                    self.decoder.read_string("content")?;
                }
                tag::GROUP_START | tag::GROUP_END => {}
                tag::END if nested == 0 => return self.leave(),
                tag::END => nested -= 1,
                tag => {
                    return Err(BinaryDecodeError::UnexpectedTag {
                        tag,
                        context: "skipped node",
                    }
                    .into())
                }
            }
        }
    }

    fn read_content(&mut self) -> GritResult<String> {
        let content = match self.next_tag()? {
            tag::CONTENT => {
                let content = self.decoder.read_string("content")?;
                match self.next_tag()? {
                    tag::END => content,
                    tag => {
                        return Err(BinaryDecodeError::UnexpectedTag {
                            tag,
                            context: "end of content node",
                        }
                        .into())
                    }
                }
            }
            tag::END => String::new(),
            tag => {
                return Err(BinaryDecodeError::UnexpectedTag {
                    tag,
                    context: "content",
                }
                .into())
            }
        };
        self.leave()?;
        Ok(content)
    }

    fn attribute(&self, name: &str) -> Option<&AttrValue> {
        self.stack.last()?.get(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn sample() -> GritResult<Vec<u8>> {
        let mut out = Vec::new();
        let mut writer = BinWriter::new(&mut out);
        let mut ext = BTreeMap::new();
        ext.insert("marker".to_string(), "1.1".to_string());
        writer.set_versions("1.12", &ext);
        writer.write_start_node("", "network")?;
        writer.write_string_attribute("id", Some("N"))?;
        writer.write_int_array_attribute("nodes", &[-1, 300])?;
        writer.write_start_nodes()?;
        for (id, v) in [("B1", 400.0), ("B2", f64::INFINITY)] {
            writer.write_start_node("", "bus")?;
            writer.write_string_attribute("id", Some(id))?;
            writer.write_double_attribute("v", v)?;
            writer.write_end_node()?;
        }
        writer.write_end_nodes()?;
        writer.write_start_node("", "alias")?;
        writer.write_node_content("A1")?;
        writer.write_end_node()?;
        writer.write_end_node()?;
        writer.close()?;
        Ok(out)
    }

    #[test]
    fn test_header_and_walk() {
        let bytes = sample().unwrap();
        assert!(bytes.starts_with(MAGIC_NUMBER));

        let mut reader = BinReader::new(bytes.as_slice());
        let header = reader.read_header().unwrap();
        assert_eq!(header.version, "1.12");
        assert_eq!(header.extension_versions["marker"], "1.1");
        assert_eq!(reader.read_int_array_attribute("nodes").unwrap(), vec![-1, 300]);

        assert_eq!(reader.next_child_node().unwrap().as_deref(), Some("bus"));
        assert_eq!(reader.read_string_attribute("id").as_deref(), Some("B1"));
        assert_eq!(reader.next_child_node().unwrap(), None);
        assert_eq!(reader.next_child_node().unwrap().as_deref(), Some("bus"));
        assert_eq!(reader.read_double_attribute("v").unwrap(), f64::INFINITY);
        reader.skip_node().unwrap();
        assert_eq!(reader.next_child_node().unwrap().as_deref(), Some("alias"));
        assert_eq!(reader.read_content().unwrap(), "A1");
        assert_eq!(reader.next_child_node().unwrap(), None);
        assert_eq!(reader.depth(), 0);
    }

    #[test]
    fn test_names_are_interned() {
        let bytes = sample().unwrap();
        let occurrences = bytes.windows(3).filter(|w| w == b"bus").count();
        assert_eq!(occurrences, 1);
    }

    #[test]
    fn test_bad_magic_is_structural() {
        let mut reader = BinReader::new(&b"Binary GRID\x04"[..]);
        assert!(matches!(
            reader.read_header().unwrap_err(),
            GritError::Structural(_)
        ));
        let mut reader = BinReader::new(&b"Bin"[..]);
        assert!(matches!(
            reader.read_header().unwrap_err(),
            GritError::Structural(_)
        ));
    }

    #[test]
    fn test_bad_tag_is_structural() {
        let mut bytes = sample().unwrap();
        let len = bytes.len();
        // replace the final node end
        bytes[len - 1] = 0x7F;
        let mut reader = BinReader::new(bytes.as_slice());
        reader.read_header().unwrap();
        let err = reader.skip_node().unwrap_err();
        assert!(matches!(err, GritError::Structural(_)));
    }

    #[test]
    fn test_truncated_stream_is_parse_error() {
        let bytes = sample().unwrap();
        let mut reader = BinReader::new(&bytes[..bytes.len() - 4]);
        reader.read_header().unwrap();
        assert!(matches!(reader.skip_node().unwrap_err(), GritError::Parse(_)));
    }

    #[test]
    fn test_varint_too_long() {
        let bytes = [0xFFu8; 11];
        let mut decoder = Decoder::new(&bytes[..]);
        assert!(matches!(
            decoder.read_varint("test"),
            Err(BinaryDecodeError::VarintTooLong)
        ));
    }

    #[test]
    fn test_varint_overflow() {
        let mut bytes = vec![0xFFu8; 9];
        bytes.push(0x7F);
        let mut decoder = Decoder::new(bytes.as_slice());
        assert!(matches!(
            decoder.read_varint("test"),
            Err(BinaryDecodeError::VarintOverflow)
        ));
    }

    #[test]
    fn test_length_limit_and_eof_context() {
        let mut buf = Vec::new();
        write_varint(&mut buf, 101).unwrap();
        let mut decoder = Decoder::new(buf.as_slice());
        assert!(matches!(
            decoder.read_len(100, "name"),
            Err(BinaryDecodeError::LengthExceedsLimit { field: "name", len: 101, max: 100 })
        ));

        let mut decoder = Decoder::new(&[0x80u8][..]);
        assert!(matches!(
            decoder.read_varint("count"),
            Err(BinaryDecodeError::UnexpectedEof { context: "count" })
        ));
    }

    proptest! {
        #[test]
        fn varint_roundtrip(value in any::<u64>()) {
            let mut buf = Vec::new();
            write_varint(&mut buf, value).unwrap();
            prop_assert!(buf.len() <= MAX_VARINT_BYTES);
            let mut decoder = Decoder::new(buf.as_slice());
            prop_assert_eq!(decoder.read_varint("test").unwrap(), value);
        }

        #[test]
        fn zigzag_roundtrip(value in any::<i64>()) {
            prop_assert_eq!(zigzag_decode(zigzag_encode(value)), value);
        }

        #[test]
        fn zigzag_keeps_small_values_small(value in -63i64..64) {
            prop_assert!(zigzag_encode(value) < 128);
        }
    }
}
