//! Format-agnostic tree writer/reader.
//!
//! A document is a tree of named nodes carrying typed attributes and, for
//! leaf nodes, text content. The same logical tree is carried by three
//! physical encodings:
//!
//! - [`xml`]: namespaced markup, streamed with quick-xml
//! - [`json`]: a JSON object tree where repeated siblings become arrays
//! - [`binary`]: a compact tagged stream behind a magic preamble
//!
//! Writers and readers are trait objects so the serialization templates are
//! written once against [`TreeDataWriter`] / [`TreeDataReader`].

pub mod binary;
pub mod json;
pub mod xml;

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use grit_core::{GritError, GritResult};
use serde::{Deserialize, Serialize};

/// Physical encoding of a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TreeDataFormat {
    #[default]
    Xml,
    Json,
    Bin,
}

impl TreeDataFormat {
    pub const ALL: &'static [TreeDataFormat] =
        &[TreeDataFormat::Xml, TreeDataFormat::Json, TreeDataFormat::Bin];

    /// File extension used when writing to a directory.
    pub fn extension(&self) -> &'static str {
        match self {
            TreeDataFormat::Xml => "xml",
            TreeDataFormat::Json => "json",
            TreeDataFormat::Bin => "bin",
        }
    }

    /// Detect the encoding from the first bytes of a document.
    pub fn sniff(head: &[u8]) -> Option<TreeDataFormat> {
        if head.starts_with(binary::MAGIC_NUMBER) {
            return Some(TreeDataFormat::Bin);
        }
        // leading whitespace and a UTF-8 byte order mark are allowed
        let first = head
            .iter()
            .copied()
            .find(|b| !b.is_ascii_whitespace() && ![0xEF, 0xBB, 0xBF].contains(b))?;
        match first {
            b'<' => Some(TreeDataFormat::Xml),
            b'{' => Some(TreeDataFormat::Json),
            _ => None,
        }
    }

    /// Detect the encoding from a file extension.
    pub fn from_path(path: &Path) -> Option<TreeDataFormat> {
        let ext = path.extension()?.to_str()?;
        Self::ALL
            .iter()
            .copied()
            .find(|f| f.extension().eq_ignore_ascii_case(ext))
    }
}

impl fmt::Display for TreeDataFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TreeDataFormat::Xml => "XML",
            TreeDataFormat::Json => "JSON",
            TreeDataFormat::Bin => "BIN",
        })
    }
}

impl FromStr for TreeDataFormat {
    type Err = GritError;

    fn from_str(s: &str) -> GritResult<Self> {
        match s.to_ascii_lowercase().as_str() {
            "xml" => Ok(TreeDataFormat::Xml),
            "json" => Ok(TreeDataFormat::Json),
            "bin" | "binary" => Ok(TreeDataFormat::Bin),
            other => Err(GritError::Config(format!("Unknown format '{}'", other))),
        }
    }
}

/// A typed attribute value.
#[derive(Debug, Clone, PartialEq)]
pub enum AttrValue {
    Str(String),
    Bool(bool),
    Int(i64),
    Double(f64),
    IntList(Vec<i64>),
    StrList(Vec<String>),
}

impl AttrValue {
    /// Textual form, as carried by the markup encoding.
    pub fn to_text(&self) -> String {
        match self {
            AttrValue::Str(s) => s.clone(),
            AttrValue::Bool(b) => b.to_string(),
            AttrValue::Int(i) => i.to_string(),
            AttrValue::Double(d) => d.to_string(),
            AttrValue::IntList(values) => values
                .iter()
                .map(i64::to_string)
                .collect::<Vec<_>>()
                .join(","),
            AttrValue::StrList(values) => values.join(","),
        }
    }

    fn invalid(&self, name: &str, expected: &str) -> GritError {
        GritError::Parse(format!(
            "Attribute '{}' is not a valid {}: {:?}",
            name, expected, self
        ))
    }

    pub fn to_f64(&self, name: &str) -> GritResult<f64> {
        match self {
            AttrValue::Double(d) => Ok(*d),
            AttrValue::Int(i) => Ok(*i as f64),
            AttrValue::Str(s) => s.trim().parse().map_err(|_| self.invalid(name, "double")),
            _ => Err(self.invalid(name, "double")),
        }
    }

    pub fn to_i64(&self, name: &str) -> GritResult<i64> {
        match self {
            AttrValue::Int(i) => Ok(*i),
            AttrValue::Double(d) if d.fract() == 0.0 => Ok(*d as i64),
            AttrValue::Str(s) => s.trim().parse().map_err(|_| self.invalid(name, "integer")),
            _ => Err(self.invalid(name, "integer")),
        }
    }

    pub fn to_bool(&self, name: &str) -> GritResult<bool> {
        match self {
            AttrValue::Bool(b) => Ok(*b),
            AttrValue::Str(s) => s.trim().parse().map_err(|_| self.invalid(name, "boolean")),
            _ => Err(self.invalid(name, "boolean")),
        }
    }

    pub fn to_int_list(&self, name: &str) -> GritResult<Vec<i64>> {
        match self {
            AttrValue::IntList(values) => Ok(values.clone()),
            AttrValue::Int(i) => Ok(vec![*i]),
            AttrValue::Str(s) if s.is_empty() => Ok(Vec::new()),
            AttrValue::Str(s) => s
                .split(',')
                .map(|part| part.trim().parse().map_err(|_| self.invalid(name, "integer list")))
                .collect(),
            _ => Err(self.invalid(name, "integer list")),
        }
    }

    pub fn to_str_list(&self) -> Vec<String> {
        match self {
            AttrValue::StrList(values) => values.clone(),
            AttrValue::Str(s) if s.is_empty() => Vec::new(),
            AttrValue::Str(s) => s.split(',').map(str::to_string).collect(),
            other => vec![other.to_text()],
        }
    }
}

/// Equality used for default elision: NaN equals NaN.
pub fn same_double(a: f64, b: f64) -> bool {
    a == b || (a.is_nan() && b.is_nan())
}

/// Start-of-document metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TreeDataHeader {
    /// Schema version of the root document, e.g. `1.12`.
    pub version: String,
    /// Whether the root namespace is the validated one (markup only).
    pub valid: bool,
    /// Version of each extension present, by extension name.
    pub extension_versions: BTreeMap<String, String>,
}

/// Bijection between a repeated node name and the wrapper name of its
/// group, e.g. `substation` <-> `substations`.
#[derive(Debug, Clone, Default)]
pub struct ArrayNames {
    single_to_array: HashMap<String, String>,
    array_to_single: HashMap<String, String>,
}

impl ArrayNames {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a pair. Re-registering the same pair is a no-op; mapping a
    /// name to a second partner is an error.
    pub fn insert(&mut self, single: &str, array: &str) -> GritResult<()> {
        let conflict = self
            .single_to_array
            .get(single)
            .is_some_and(|a| a != array)
            || self.array_to_single.get(array).is_some_and(|s| s != single);
        if conflict {
            return Err(GritError::Config(format!(
                "Array name mapping '{}' <-> '{}' conflicts with an existing mapping",
                single, array
            )));
        }
        self.single_to_array
            .insert(single.to_string(), array.to_string());
        self.array_to_single
            .insert(array.to_string(), single.to_string());
        Ok(())
    }

    pub fn array_name(&self, single: &str) -> Option<&str> {
        self.single_to_array.get(single).map(String::as_str)
    }

    pub fn single_name(&self, array: &str) -> Option<&str> {
        self.array_to_single.get(array).map(String::as_str)
    }
}

/// Streaming writer for one document.
///
/// Nodes are bracketed by `write_start_node` / `write_end_node`. Attributes
/// must be written before the node's first child or content. Sequences of
/// same-named siblings are bracketed by `write_start_nodes` /
/// `write_end_nodes`.
pub trait TreeDataWriter {
    /// Binds a namespace URI to a prefix. Must be called before the root node.
    fn set_namespace_prefix(&mut self, uri: &str, prefix: &str);

    /// Header metadata. Must be called before the root node.
    fn set_versions(&mut self, root_version: &str, extension_versions: &BTreeMap<String, String>);

    fn write_start_node(&mut self, namespace: &str, name: &str) -> GritResult<()>;

    fn write_end_node(&mut self) -> GritResult<()>;

    fn write_start_nodes(&mut self) -> GritResult<()>;

    fn write_end_nodes(&mut self) -> GritResult<()>;

    fn write_node_content(&mut self, content: &str) -> GritResult<()>;

    fn write_attribute(&mut self, name: &str, value: AttrValue) -> GritResult<()>;

    /// Flushes everything to the underlying sink.
    fn close(&mut self) -> GritResult<()>;

    // =========================================================================
    // Typed attributes
    // =========================================================================

    /// Omitted when `None`.
    fn write_string_attribute(&mut self, name: &str, value: Option<&str>) -> GritResult<()> {
        match value {
            Some(v) => self.write_attribute(name, AttrValue::Str(v.to_string())),
            None => Ok(()),
        }
    }

    /// Omitted when NaN.
    fn write_double_attribute(&mut self, name: &str, value: f64) -> GritResult<()> {
        if value.is_nan() {
            return Ok(());
        }
        self.write_attribute(name, AttrValue::Double(value))
    }

    /// Omitted when equal to `default`.
    fn write_double_attribute_with_default(
        &mut self,
        name: &str,
        value: f64,
        default: f64,
    ) -> GritResult<()> {
        if same_double(value, default) {
            return Ok(());
        }
        self.write_double_attribute(name, value)
    }

    fn write_int_attribute(&mut self, name: &str, value: i32) -> GritResult<()> {
        self.write_attribute(name, AttrValue::Int(value as i64))
    }

    fn write_optional_int_attribute(&mut self, name: &str, value: Option<i32>) -> GritResult<()> {
        match value {
            Some(v) => self.write_int_attribute(name, v),
            None => Ok(()),
        }
    }

    fn write_int_attribute_with_default(
        &mut self,
        name: &str,
        value: i32,
        default: i32,
    ) -> GritResult<()> {
        if value == default {
            return Ok(());
        }
        self.write_int_attribute(name, value)
    }

    fn write_boolean_attribute(&mut self, name: &str, value: bool) -> GritResult<()> {
        self.write_attribute(name, AttrValue::Bool(value))
    }

    /// Omitted when equal to `default`.
    fn write_boolean_attribute_with_default(
        &mut self,
        name: &str,
        value: bool,
        default: bool,
    ) -> GritResult<()> {
        if value == default {
            return Ok(());
        }
        self.write_boolean_attribute(name, value)
    }

    fn write_enum_attribute(&mut self, name: &str, value: &str) -> GritResult<()> {
        self.write_attribute(name, AttrValue::Str(value.to_string()))
    }

    /// Omitted when empty.
    fn write_int_array_attribute(&mut self, name: &str, values: &[i64]) -> GritResult<()> {
        if values.is_empty() {
            return Ok(());
        }
        self.write_attribute(name, AttrValue::IntList(values.to_vec()))
    }

    /// Omitted when empty.
    fn write_string_array_attribute(&mut self, name: &str, values: &[String]) -> GritResult<()> {
        if values.is_empty() {
            return Ok(());
        }
        self.write_attribute(name, AttrValue::StrList(values.to_vec()))
    }
}

/// Streaming reader for one document.
///
/// The reader is positioned on a node; [`next_child_node`] enters the next
/// child and returns its name, or consumes the end of the current node and
/// returns `None`. Attributes of the node just entered are available until
/// its first child is entered.
///
/// [`next_child_node`]: TreeDataReader::next_child_node
pub trait TreeDataReader {
    /// Reads the start-of-document header and enters the root node.
    fn read_header(&mut self) -> GritResult<TreeDataHeader>;

    /// Number of nodes currently open. The root node is depth 1.
    fn depth(&self) -> usize;

    fn next_child_node(&mut self) -> GritResult<Option<String>>;

    /// Skips the rest of the current node, children included.
    fn skip_node(&mut self) -> GritResult<()>;

    /// Reads the text content of the current node and consumes its end.
    fn read_content(&mut self) -> GritResult<String>;

    /// Raw attribute of the current node.
    fn attribute(&self, name: &str) -> Option<&AttrValue>;

    /// Closes open nodes until only `depth - 1` remain.
    fn close_to(&mut self, depth: usize) -> GritResult<()> {
        while self.depth() >= depth {
            self.skip_node()?;
        }
        Ok(())
    }

    // =========================================================================
    // Typed attributes
    // =========================================================================

    fn read_string_attribute(&self, name: &str) -> Option<String> {
        self.attribute(name).map(AttrValue::to_text)
    }

    fn read_required_string_attribute(&self, name: &str) -> GritResult<String> {
        self.read_string_attribute(name).ok_or_else(|| {
            GritError::Structural(format!("Required attribute '{}' is missing", name))
        })
    }

    /// NaN when absent.
    fn read_double_attribute(&self, name: &str) -> GritResult<f64> {
        self.read_double_attribute_or(name, f64::NAN)
    }

    fn read_double_attribute_or(&self, name: &str, default: f64) -> GritResult<f64> {
        match self.attribute(name) {
            Some(value) => value.to_f64(name),
            None => Ok(default),
        }
    }

    fn read_int_attribute(&self, name: &str) -> GritResult<Option<i32>> {
        self.attribute(name)
            .map(|value| {
                let v = value.to_i64(name)?;
                i32::try_from(v).map_err(|_| {
                    GritError::Parse(format!("Attribute '{}' out of range: {}", name, v))
                })
            })
            .transpose()
    }

    fn read_int_attribute_or(&self, name: &str, default: i32) -> GritResult<i32> {
        Ok(self.read_int_attribute(name)?.unwrap_or(default))
    }

    fn read_boolean_attribute(&self, name: &str) -> GritResult<Option<bool>> {
        self.attribute(name).map(|v| v.to_bool(name)).transpose()
    }

    fn read_boolean_attribute_or(&self, name: &str, default: bool) -> GritResult<bool> {
        Ok(self.read_boolean_attribute(name)?.unwrap_or(default))
    }

    fn read_int_array_attribute(&self, name: &str) -> GritResult<Vec<i64>> {
        match self.attribute(name) {
            Some(value) => value.to_int_list(name),
            None => Ok(Vec::new()),
        }
    }

    fn read_string_array_attribute(&self, name: &str) -> Vec<String> {
        self.attribute(name)
            .map(AttrValue::to_str_list)
            .unwrap_or_default()
    }
}

impl dyn TreeDataReader + '_ {
    /// Reads an enum attribute through its textual form.
    pub fn read_enum_attribute<E>(&self, name: &str) -> GritResult<Option<E>>
    where
        E: FromStr<Err = GritError>,
    {
        self.read_string_attribute(name)
            .map(|s| s.parse::<E>())
            .transpose()
    }

    pub fn read_enum_attribute_or<E>(&self, name: &str, default: E) -> GritResult<E>
    where
        E: FromStr<Err = GritError>,
    {
        Ok(self.read_enum_attribute(name)?.unwrap_or(default))
    }
}
