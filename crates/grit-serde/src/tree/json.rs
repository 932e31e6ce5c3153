//! JSON encoding.
//!
//! A node is an object: scalar fields are attributes, object fields are
//! single children and arrays of objects are repeating groups, named through
//! [`ArrayNames`]. The root object also carries `version` and
//! `extensionVersions`. Node content goes in the `content` field.
//!
//! Neither side streams. [`JsonWriter`] builds the whole document as a
//! [`Value`] and serializes it on `close`, and [`JsonReader`] parses the
//! whole input before the first node is visited. Memory is therefore
//! proportional to the document for JSON, unlike the XML and binary codecs.

use std::collections::{BTreeMap, VecDeque};
use std::io::{Read, Write};

use grit_core::{GritError, GritResult};
use serde_json::{Map, Number, Value};

use super::{ArrayNames, AttrValue, TreeDataHeader, TreeDataReader, TreeDataWriter};

pub const VERSION: &str = "version";
pub const EXTENSION_VERSIONS: &str = "extensionVersions";
const CONTENT: &str = "content";

fn to_json(value: AttrValue) -> Value {
    match value {
        AttrValue::Str(s) => Value::String(s),
        AttrValue::Bool(b) => Value::Bool(b),
        AttrValue::Int(i) => Value::from(i),
        // non-finite doubles have no JSON number form
        AttrValue::Double(d) => Number::from_f64(d)
            .map(Value::Number)
            .unwrap_or_else(|| Value::String(d.to_string())),
        AttrValue::IntList(values) => Value::Array(values.into_iter().map(Value::from).collect()),
        AttrValue::StrList(values) => {
            Value::Array(values.into_iter().map(Value::String).collect())
        }
    }
}

struct WriterFrame {
    name: String,
    object: Map<String, Value>,
    group_depth: usize,
}

pub struct JsonWriter<W: Write> {
    sink: W,
    indent: bool,
    names: ArrayNames,
    root_version: String,
    extension_versions: BTreeMap<String, String>,
    stack: Vec<WriterFrame>,
    document: Option<Value>,
}

impl<W: Write> JsonWriter<W> {
    pub fn new(sink: W, indent: bool, names: ArrayNames) -> Self {
        Self {
            sink,
            indent,
            names,
            root_version: String::new(),
            extension_versions: BTreeMap::new(),
            stack: Vec::new(),
            document: None,
        }
    }

    fn top(&mut self) -> GritResult<&mut WriterFrame> {
        self.stack
            .last_mut()
            .ok_or_else(|| GritError::Structural("No open node".into()))
    }
}

impl<W: Write> TreeDataWriter for JsonWriter<W> {
    fn set_namespace_prefix(&mut self, _uri: &str, _prefix: &str) {}

    fn set_versions(&mut self, root_version: &str, extension_versions: &BTreeMap<String, String>) {
        self.root_version = root_version.to_string();
        self.extension_versions = extension_versions.clone();
    }

    fn write_start_node(&mut self, _namespace: &str, name: &str) -> GritResult<()> {
        let mut object = Map::new();
        if self.stack.is_empty() {
            if self.document.is_some() {
                return Err(GritError::Structural("Document already has a root".into()));
            }
            object.insert(VERSION.into(), Value::String(self.root_version.clone()));
            if !self.extension_versions.is_empty() {
                let versions = self
                    .extension_versions
                    .iter()
                    .map(|(k, v)| (k.clone(), Value::String(v.clone())))
                    .collect();
                object.insert(EXTENSION_VERSIONS.into(), Value::Object(versions));
            }
        }
        self.stack.push(WriterFrame {
            name: name.to_string(),
            object,
            group_depth: 0,
        });
        Ok(())
    }

    fn write_end_node(&mut self) -> GritResult<()> {
        let frame = self
            .stack
            .pop()
            .ok_or_else(|| GritError::Structural("No open node to close".into()))?;
        let value = Value::Object(frame.object);
        let Some(parent) = self.stack.last_mut() else {
            self.document = Some(value);
            return Ok(());
        };
        if parent.group_depth > 0 {
            let array_name = self.names.array_name(&frame.name).ok_or_else(|| {
                GritError::Structural(format!("No array name registered for '{}'", frame.name))
            })?;
            match parent
                .object
                .entry(array_name)
                .or_insert_with(|| Value::Array(Vec::new()))
            {
                Value::Array(items) => items.push(value),
                _ => {
                    return Err(GritError::Structural(format!(
                        "Field '{}' is not an array",
                        array_name
                    )))
                }
            }
        } else if parent.object.insert(frame.name.clone(), value).is_some() {
            return Err(GritError::Structural(format!(
                "Node '{}' repeated outside of a repeating group",
                frame.name
            )));
        }
        Ok(())
    }

    fn write_start_nodes(&mut self) -> GritResult<()> {
        self.top()?.group_depth += 1;
        Ok(())
    }

    fn write_end_nodes(&mut self) -> GritResult<()> {
        let top = self.top()?;
        top.group_depth = top
            .group_depth
            .checked_sub(1)
            .ok_or_else(|| GritError::Structural("Unbalanced repeating group".into()))?;
        Ok(())
    }

    fn write_node_content(&mut self, content: &str) -> GritResult<()> {
        self.top()?
            .object
            .insert(CONTENT.into(), Value::String(content.to_string()));
        Ok(())
    }

    fn write_attribute(&mut self, name: &str, value: AttrValue) -> GritResult<()> {
        self.top()?.object.insert(name.to_string(), to_json(value));
        Ok(())
    }

    fn close(&mut self) -> GritResult<()> {
        if !self.stack.is_empty() {
            return Err(GritError::Structural(format!(
                "Document closed with {} open node(s)",
                self.stack.len()
            )));
        }
        let document = self
            .document
            .take()
            .ok_or_else(|| GritError::Structural("Empty document".into()))?;
        if self.indent {
            serde_json::to_writer_pretty(&mut self.sink, &document)?;
        } else {
            serde_json::to_writer(&mut self.sink, &document)?;
        }
        self.sink.flush()?;
        Ok(())
    }
}

struct ReaderFrame {
    attributes: Map<String, Value>,
    children: VecDeque<(String, Map<String, Value>)>,
}

impl ReaderFrame {
    fn new(object: Map<String, Value>, names: &ArrayNames) -> GritResult<ReaderFrame> {
        let mut attributes = Map::new();
        let mut children = VecDeque::new();
        for (key, value) in object {
            match value {
                Value::Object(child) => children.push_back((key, child)),
                Value::Array(items) if items.iter().any(Value::is_object) => {
                    let single = names.single_name(&key).ok_or_else(|| {
                        GritError::Structural(format!("Unknown array name '{}'", key))
                    })?;
                    for item in items {
                        match item {
                            Value::Object(child) => children.push_back((single.to_string(), child)),
                            _ => {
                                return Err(GritError::Structural(format!(
                                    "Array '{}' mixes nodes and values",
                                    key
                                )))
                            }
                        }
                    }
                }
                Value::Null => {}
                scalar => {
                    attributes.insert(key, scalar);
                }
            }
        }
        Ok(ReaderFrame {
            attributes,
            children,
        })
    }
}

fn from_json(value: &Value) -> Option<AttrValue> {
    match value {
        Value::String(s) => Some(AttrValue::Str(s.clone())),
        Value::Bool(b) => Some(AttrValue::Bool(*b)),
        Value::Number(n) => match n.as_i64() {
            Some(i) => Some(AttrValue::Int(i)),
            None => n.as_f64().map(AttrValue::Double),
        },
        Value::Array(items) => {
            let ints: Option<Vec<i64>> = items.iter().map(Value::as_i64).collect();
            match ints {
                Some(ints) if !items.is_empty() => Some(AttrValue::IntList(ints)),
                _ => Some(AttrValue::StrList(
                    items
                        .iter()
                        .map(|v| match v {
                            Value::String(s) => s.clone(),
                            other => other.to_string(),
                        })
                        .collect(),
                )),
            }
        }
        Value::Null | Value::Object(_) => None,
    }
}

pub struct JsonReader<R: Read> {
    source: Option<R>,
    names: ArrayNames,
    stack: Vec<ReaderFrame>,
    /// Typed view of the current node's attributes.
    current: Map<String, Value>,
    cache: std::collections::HashMap<String, AttrValue>,
}

impl<R: Read> JsonReader<R> {
    pub fn new(source: R, names: ArrayNames) -> Self {
        Self {
            source: Some(source),
            names,
            stack: Vec::new(),
            current: Map::new(),
            cache: Default::default(),
        }
    }

    fn push(&mut self, object: Map<String, Value>) -> GritResult<()> {
        let frame = ReaderFrame::new(object, &self.names)?;
        self.refresh(&frame);
        self.stack.push(frame);
        Ok(())
    }

    fn pop(&mut self) -> Option<ReaderFrame> {
        let frame = self.stack.pop();
        if let Some(top) = self.stack.pop() {
            self.refresh(&top);
            self.stack.push(top);
        } else {
            self.current.clear();
            self.cache.clear();
        }
        frame
    }

    fn refresh(&mut self, frame: &ReaderFrame) {
        self.current = frame.attributes.clone();
        self.cache = self
            .current
            .iter()
            .filter_map(|(k, v)| from_json(v).map(|a| (k.clone(), a)))
            .collect();
    }
}

impl<R: Read> TreeDataReader for JsonReader<R> {
    fn read_header(&mut self) -> GritResult<TreeDataHeader> {
        let source = self
            .source
            .take()
            .ok_or_else(|| GritError::Structural("Header already read".into()))?;
        let mut root = match serde_json::from_reader(source)? {
            Value::Object(root) => root,
            _ => return Err(GritError::Structural("JSON document is not an object".into())),
        };
        let version = match root.remove(VERSION) {
            Some(Value::String(v)) => v,
            _ => {
                return Err(GritError::Structural(
                    "JSON document has no version header".into(),
                ))
            }
        };
        let mut extension_versions = BTreeMap::new();
        match root.remove(EXTENSION_VERSIONS) {
            Some(Value::Object(versions)) => {
                for (name, v) in versions {
                    let v = v.as_str().ok_or_else(|| {
                        GritError::Structural(format!("Invalid version for extension '{}'", name))
                    })?;
                    extension_versions.insert(name, v.to_string());
                }
            }
            Some(_) => {
                return Err(GritError::Structural(
                    "Invalid extension versions header".into(),
                ))
            }
            None => {}
        }
        self.push(root)?;
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
        let top = self
            .stack
            .last_mut()
            .ok_or_else(|| GritError::Structural("No open node".into()))?;
        match top.children.pop_front() {
            Some((name, object)) => {
                self.push(object)?;
                Ok(Some(name))
            }
            None => {
                self.pop();
                Ok(None)
            }
        }
    }

    fn skip_node(&mut self) -> GritResult<()> {
        self.pop()
            .map(|_| ())
            .ok_or_else(|| GritError::Structural("No open node".into()))
    }

    fn read_content(&mut self) -> GritResult<String> {
        let content = self.read_string_attribute(CONTENT).unwrap_or_default();
        self.skip_node()?;
        Ok(content)
    }

    fn attribute(&self, name: &str) -> Option<&AttrValue> {
        self.cache.get(name)
    }
}
