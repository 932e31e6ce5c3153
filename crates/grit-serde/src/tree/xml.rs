//! Markup encoding, streamed with quick-xml.
//!
//! Every element carries a namespace prefix. The root element declares all
//! namespaces used in the document; the schema version is recovered from the
//! root namespace and extension versions from the extension namespaces.

use std::collections::{BTreeMap, HashMap};
use std::io::{BufRead, Write};

use grit_core::{GritError, GritResult};
use quick_xml::{
    events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event},
    Reader, Writer,
};

use super::{AttrValue, TreeDataHeader, TreeDataReader, TreeDataWriter};

fn xml_error(err: impl std::fmt::Display) -> GritError {
    GritError::Parse(format!("XML: {}", err))
}

fn utf8(bytes: &[u8]) -> GritResult<&str> {
    std::str::from_utf8(bytes).map_err(xml_error)
}

pub struct XmlWriter<W: Write> {
    writer: Writer<W>,
    /// Namespace URI to prefix, in declaration order.
    namespaces: Vec<(String, String)>,
    pending: Option<BytesStart<'static>>,
    open: Vec<String>,
    started: bool,
}

impl<W: Write> XmlWriter<W> {
    pub fn new(sink: W, indent: bool) -> Self {
        let writer = if indent {
            Writer::new_with_indent(sink, b' ', 4)
        } else {
            Writer::new(sink)
        };
        Self {
            writer,
            namespaces: Vec::new(),
            pending: None,
            open: Vec::new(),
            started: false,
        }
    }

    fn prefix(&self, uri: &str) -> GritResult<&str> {
        self.namespaces
            .iter()
            .find(|(u, _)| u == uri)
            .map(|(_, p)| p.as_str())
            .ok_or_else(|| GritError::Structural(format!("Undeclared namespace '{}'", uri)))
    }

    fn flush_pending(&mut self) -> GritResult<()> {
        if let Some(start) = self.pending.take() {
            self.writer
                .write_event(Event::Start(start))
                .map_err(xml_error)?;
        }
        Ok(())
    }
}

impl<W: Write> TreeDataWriter for XmlWriter<W> {
    fn set_namespace_prefix(&mut self, uri: &str, prefix: &str) {
        self.namespaces.push((uri.to_string(), prefix.to_string()));
    }

    fn set_versions(&mut self, _root_version: &str, _extension_versions: &BTreeMap<String, String>) {
        // carried by the namespace URIs
    }

    fn write_start_node(&mut self, namespace: &str, name: &str) -> GritResult<()> {
        self.flush_pending()?;
        let qualified = format!("{}:{}", self.prefix(namespace)?, name);
        let mut start = BytesStart::new(qualified.clone());
        if !self.started {
            self.writer
                .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
                .map_err(xml_error)?;
            for (uri, prefix) in &self.namespaces {
                start.push_attribute((format!("xmlns:{}", prefix).as_str(), uri.as_str()));
            }
            self.started = true;
        }
        self.pending = Some(start);
        self.open.push(qualified);
        Ok(())
    }

    fn write_end_node(&mut self) -> GritResult<()> {
        let qualified = self
            .open
            .pop()
            .ok_or_else(|| GritError::Structural("No open node to close".into()))?;
        match self.pending.take() {
            Some(start) => self.writer.write_event(Event::Empty(start)),
            None => self.writer.write_event(Event::End(BytesEnd::new(qualified))),
        }
        .map_err(xml_error)
    }

    fn write_start_nodes(&mut self) -> GritResult<()> {
        Ok(())
    }

    fn write_end_nodes(&mut self) -> GritResult<()> {
        Ok(())
    }

    fn write_node_content(&mut self, content: &str) -> GritResult<()> {
        self.flush_pending()?;
        self.writer
            .write_event(Event::Text(BytesText::new(content)))
            .map_err(xml_error)
    }

    fn write_attribute(&mut self, name: &str, value: AttrValue) -> GritResult<()> {
        let start = self.pending.as_mut().ok_or_else(|| {
            GritError::Structural(format!(
                "Attribute '{}' written after the content of its node",
                name
            ))
        })?;
        start.push_attribute((name, value.to_text().as_str()));
        Ok(())
    }

    fn close(&mut self) -> GritResult<()> {
        if !self.open.is_empty() {
            return Err(GritError::Structural(format!(
                "Document closed with {} open node(s)",
                self.open.len()
            )));
        }
        self.writer.get_mut().flush()?;
        Ok(())
    }
}

/// Namespace knowledge the reader needs to decode the header.
#[derive(Debug, Clone, Default)]
pub struct XmlNamespaces {
    /// Root namespace URI to (schema version, validated namespace).
    pub roots: HashMap<String, (String, bool)>,
    /// Extension namespace URI to (extension name, extension version).
    pub extensions: HashMap<String, (String, String)>,
}

struct Frame {
    name: String,
    attributes: HashMap<String, AttrValue>,
    empty: bool,
}

impl Frame {
    fn from_start(start: &BytesStart, empty: bool) -> GritResult<Frame> {
        let name = utf8(start.local_name().as_ref())?.to_string();
        let mut attributes = HashMap::new();
        for attr in start.attributes() {
            let attr = attr.map_err(xml_error)?;
            let key = attr.key.as_ref();
            if key == b"xmlns" || key.starts_with(b"xmlns:") {
                continue;
            }
            let local = utf8(attr.key.local_name().as_ref())?.to_string();
            let value = attr.unescape_value().map_err(xml_error)?.into_owned();
            attributes.insert(local, AttrValue::Str(value));
        }
        Ok(Frame {
            name,
            attributes,
            empty,
        })
    }
}

pub struct XmlReader<R: BufRead> {
    reader: Reader<R>,
    buf: Vec<u8>,
    namespaces: XmlNamespaces,
    stack: Vec<Frame>,
}

impl<R: BufRead> XmlReader<R> {
    pub fn new(source: R, namespaces: XmlNamespaces) -> Self {
        // text is kept verbatim; whitespace between elements is skipped by
        // the node walk
        Self {
            reader: Reader::from_reader(source),
            buf: Vec::new(),
            namespaces,
            stack: Vec::new(),
        }
    }

    fn unexpected_eof() -> GritError {
        GritError::Structural("Unexpected end of XML document".into())
    }

    fn read_root(&mut self, start: &BytesStart, empty: bool) -> GritResult<TreeDataHeader> {
        let mut declared = HashMap::new();
        for attr in start.attributes() {
            let attr = attr.map_err(xml_error)?;
            let key = utf8(attr.key.as_ref())?;
            let prefix = match key.strip_prefix("xmlns") {
                Some("") => String::new(),
                Some(rest) if rest.starts_with(':') => rest[1..].to_string(),
                _ => continue,
            };
            let uri = attr.unescape_value().map_err(xml_error)?.into_owned();
            declared.insert(prefix, uri);
        }

        let root_prefix = start
            .name()
            .prefix()
            .map(|p| utf8(p.as_ref()).map(str::to_string))
            .transpose()?
            .unwrap_or_default();
        let root_uri = declared.get(&root_prefix).ok_or_else(|| {
            GritError::Structural(format!("Root namespace prefix '{}' is not declared", root_prefix))
        })?;
        let (version, valid) = self
            .namespaces
            .roots
            .get(root_uri)
            .cloned()
            .ok_or_else(|| GritError::Structural(format!("Unknown root namespace '{}'", root_uri)))?;

        let mut extension_versions = BTreeMap::new();
        for uri in declared.values() {
            if let Some((name, ext_version)) = self.namespaces.extensions.get(uri) {
                extension_versions.insert(name.clone(), ext_version.clone());
            }
        }

        self.stack.push(Frame::from_start(start, empty)?);
        Ok(TreeDataHeader {
            version,
            valid,
            extension_versions,
        })
    }
}

impl<R: BufRead> TreeDataReader for XmlReader<R> {
    fn read_header(&mut self) -> GritResult<TreeDataHeader> {
        loop {
            self.buf.clear();
            let event = self.reader.read_event_into(&mut self.buf).map_err(xml_error)?;
            match event {
                Event::Start(e) => {
                    let start = e.into_owned();
                    return self.read_root(&start, false);
                }
                Event::Empty(e) => {
                    let start = e.into_owned();
                    return self.read_root(&start, true);
                }
                Event::Eof => return Err(Self::unexpected_eof()),
                _ => {}
            }
        }
    }

    fn depth(&self) -> usize {
        self.stack.len()
    }

    fn next_child_node(&mut self) -> GritResult<Option<String>> {
        let top = self
            .stack
            .last()
            .ok_or_else(|| GritError::Structural("No open node".into()))?;
        if top.empty {
            self.stack.pop();
            return Ok(None);
        }
        loop {
            self.buf.clear();
            match self.reader.read_event_into(&mut self.buf).map_err(xml_error)? {
                Event::Start(e) => {
                    let frame = Frame::from_start(&e, false)?;
                    let name = frame.name.clone();
                    self.stack.push(frame);
                    return Ok(Some(name));
                }
                Event::Empty(e) => {
                    let frame = Frame::from_start(&e, true)?;
                    let name = frame.name.clone();
                    self.stack.push(frame);
                    return Ok(Some(name));
                }
                Event::End(_) => {
                    self.stack.pop();
                    return Ok(None);
                }
                Event::Eof => return Err(Self::unexpected_eof()),
                _ => {}
            }
        }
    }

    fn skip_node(&mut self) -> GritResult<()> {
        let frame = self
            .stack
            .pop()
            .ok_or_else(|| GritError::Structural("No open node".into()))?;
        if frame.empty {
            return Ok(());
        }
        let mut depth = 0usize;
        loop {
            self.buf.clear();
            match self.reader.read_event_into(&mut self.buf).map_err(xml_error)? {
                Event::Start(_) => depth += 1,
                Event::End(_) if depth == 0 => return Ok(()),
                Event::End(_) => depth -= 1,
                Event::Eof => return Err(Self::unexpected_eof()),
                _ => {}
            }
        }
    }

    fn read_content(&mut self) -> GritResult<String> {
        let frame = self
            .stack
            .pop()
            .ok_or_else(|| GritError::Structural("No open node".into()))?;
        let mut content = String::new();
        if frame.empty {
            return Ok(content);
        }
        loop {
            self.buf.clear();
            match self.reader.read_event_into(&mut self.buf).map_err(xml_error)? {
                Event::Text(e) => content.push_str(&e.unescape().map_err(xml_error)?),
                Event::CData(e) => content.push_str(utf8(&e)?),
                Event::End(_) => return Ok(content),
                Event::Start(_) | Event::Empty(_) => {
                    return Err(GritError::Structural(format!(
                        "Unexpected child element in '{}'",
                        frame.name
                    )))
                }
                Event::Eof => return Err(Self::unexpected_eof()),
                _ => {}
            }
        }
    }

    fn attribute(&self, name: &str) -> Option<&AttrValue> {
        self.stack.last()?.attributes.get(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NS: &str = "urn:test:root";
    const EXT_NS: &str = "urn:test:ext/1_0";

    fn namespaces() -> XmlNamespaces {
        let mut ns = XmlNamespaces::default();
        ns.roots.insert(NS.into(), ("1.12".into(), true));
        ns.extensions
            .insert(EXT_NS.into(), ("marker".into(), "1.0".into()));
        ns
    }

    fn sample(indent: bool) -> GritResult<String> {
        let mut out = Vec::new();
        let mut writer = XmlWriter::new(&mut out, indent);
        writer.set_namespace_prefix(NS, "t");
        writer.set_namespace_prefix(EXT_NS, "m");
        writer.write_start_node(NS, "network")?;
        writer.write_string_attribute("id", Some("N & co"))?;
        writer.write_start_node(NS, "alias")?;
        writer.write_node_content("A<1>")?;
        writer.write_end_node()?;
        writer.write_start_node(NS, "bus")?;
        writer.write_double_attribute("v", 400.5)?;
        writer.write_end_node()?;
        writer.write_start_node(EXT_NS, "marker")?;
        writer.write_end_node()?;
        writer.write_end_node()?;
        writer.close()?;
        Ok(String::from_utf8(out).unwrap())
    }

    #[test]
    fn test_writer_escapes_and_declares_namespaces() {
        let xml = sample(false).unwrap();
        assert!(xml.starts_with("<?xml version=\"1.0\" encoding=\"UTF-8\"?>"));
        assert!(xml.contains("xmlns:t=\"urn:test:root\""));
        assert!(xml.contains("id=\"N &amp; co\""));
        assert!(xml.contains("<t:alias>A&lt;1&gt;</t:alias>"));
        assert!(xml.contains("<t:bus v=\"400.5\"/>"));
        assert!(xml.contains("<m:marker/>"));
    }

    #[test]
    fn test_attribute_after_content_rejected() {
        let mut out = Vec::new();
        let mut writer = XmlWriter::new(&mut out, false);
        writer.set_namespace_prefix(NS, "t");
        writer.write_start_node(NS, "alias").unwrap();
        writer.write_node_content("x").unwrap();
        assert!(writer.write_string_attribute("type", Some("y")).is_err());
    }

    #[test]
    fn test_reader_walks_tree() {
        for indent in [false, true] {
            let xml = sample(indent).unwrap();
            let mut reader = XmlReader::new(xml.as_bytes(), namespaces());
            let header = reader.read_header().unwrap();
            assert_eq!(header.version, "1.12");
            assert!(header.valid);
            assert_eq!(header.extension_versions.get("marker").map(String::as_str), Some("1.0"));
            assert_eq!(reader.read_string_attribute("id").as_deref(), Some("N & co"));

            assert_eq!(reader.next_child_node().unwrap().as_deref(), Some("alias"));
            assert_eq!(reader.read_content().unwrap(), "A<1>");
            assert_eq!(reader.next_child_node().unwrap().as_deref(), Some("bus"));
            assert_eq!(reader.read_double_attribute("v").unwrap(), 400.5);
            assert_eq!(reader.next_child_node().unwrap(), None);
            assert_eq!(reader.next_child_node().unwrap().as_deref(), Some("marker"));
            reader.skip_node().unwrap();
            assert_eq!(reader.next_child_node().unwrap(), None);
            assert_eq!(reader.depth(), 0);
        }
    }

    #[test]
    fn test_content_whitespace_is_preserved() {
        let xml = "<?xml version=\"1.0\"?>\n<t:network xmlns:t=\"urn:test:root\">\n    <t:alias> A1 </t:alias>\n    <t:alias>\tB 2\n</t:alias>\n</t:network>\n";
        let mut reader = XmlReader::new(xml.as_bytes(), namespaces());
        reader.read_header().unwrap();
        assert_eq!(reader.next_child_node().unwrap().as_deref(), Some("alias"));
        assert_eq!(reader.read_content().unwrap(), " A1 ");
        assert_eq!(reader.next_child_node().unwrap().as_deref(), Some("alias"));
        assert_eq!(reader.read_content().unwrap(), "\tB 2\n");
        assert_eq!(reader.next_child_node().unwrap(), None);
    }

    #[test]
    fn test_unknown_root_namespace() {
        let xml = "<?xml version=\"1.0\"?><x:network xmlns:x=\"urn:other\"/>";
        let mut reader = XmlReader::new(xml.as_bytes(), namespaces());
        let err = reader.read_header().unwrap_err();
        assert!(matches!(err, GritError::Structural(_)));
    }
}
