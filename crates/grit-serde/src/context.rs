//! Per-operation state threaded through every read and write.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use grit_core::{bus_branch_view, BusBranchView, Diagnostics, GritError, GritResult, Identifiable};
use grit_core::VoltageLevel;

use crate::anonymizer::Anonymizer;
use crate::end_tasks::EndTaskQueue;
use crate::extensions::{ExtensionPlan, ExtensionProviders};
use crate::options::{ExportOptions, ImportOptions};
use crate::tree::{TreeDataReader, TreeDataWriter};
use crate::version::SchemaVersion;

/// Write-side context: the tree writer, the anonymizer, the negotiated
/// extension plan and the ids exported so far in the current network
/// element.
pub struct SerializerContext<'a> {
    writer: Box<dyn TreeDataWriter + 'a>,
    anonymizer: Box<dyn Anonymizer>,
    options: &'a ExportOptions,
    pub(crate) version: SchemaVersion,
    namespace: String,
    plan: ExtensionPlan<'a>,
    exported: Vec<String>,
    bus_views: HashMap<String, BusBranchView>,
    pub diagnostics: Diagnostics,
}

impl<'a> SerializerContext<'a> {
    pub fn new(
        writer: Box<dyn TreeDataWriter + 'a>,
        anonymizer: Box<dyn Anonymizer>,
        options: &'a ExportOptions,
        namespace: String,
        plan: ExtensionPlan<'a>,
    ) -> Self {
        Self {
            writer,
            anonymizer,
            options,
            version: options.version,
            namespace,
            plan,
            exported: Vec::new(),
            bus_views: HashMap::new(),
            diagnostics: Diagnostics::new(),
        }
    }

    pub fn options(&self) -> &'a ExportOptions {
        self.options
    }

    pub fn plan(&self) -> &ExtensionPlan<'a> {
        &self.plan
    }

    pub fn writer(&mut self) -> &mut (dyn TreeDataWriter + 'a) {
        self.writer.as_mut()
    }

    /// Opens a node in the network namespace.
    pub fn start_node(&mut self, name: &str) -> GritResult<()> {
        self.writer.write_start_node(&self.namespace, name)
    }

    pub fn end_node(&mut self) -> GritResult<()> {
        self.writer.write_end_node()
    }

    /// Brackets a run of same-shaped siblings.
    pub fn group<F>(&mut self, body: F) -> GritResult<()>
    where
        F: FnOnce(&mut Self) -> GritResult<()>,
    {
        self.writer.write_start_nodes()?;
        body(self)?;
        self.writer.write_end_nodes()
    }

    pub fn anonymize(&mut self, value: &str) -> String {
        self.anonymizer.anonymize(value)
    }

    /// Writes an anonymized string attribute.
    pub fn write_id_attribute(&mut self, name: &str, value: &str) -> GritResult<()> {
        let token = self.anonymizer.anonymize(value);
        self.writer.write_string_attribute(name, Some(&token))
    }

    pub fn write_optional_id_attribute(&mut self, name: &str, value: Option<&str>) -> GritResult<()> {
        match value {
            Some(value) => self.write_id_attribute(name, value),
            None => Ok(()),
        }
    }

    /// Marks an identifiable as written, making its extensions eligible for
    /// the extension block of the current network element.
    pub fn add_exported(&mut self, id: &str) {
        self.exported.push(id.to_string());
    }

    /// Takes the ids exported since the last call, starting a new scope.
    pub fn take_exported(&mut self) -> Vec<String> {
        std::mem::take(&mut self.exported)
    }

    /// Restores an exported scope saved by [`take_exported`](Self::take_exported).
    pub fn restore_exported(&mut self, exported: Vec<String>) {
        self.exported = exported;
    }

    /// Items in write order: as stored, or by id when sorting is on.
    pub fn ordered<'e, T, I>(&self, items: I) -> Vec<&'e T>
    where
        T: Identifiable + 'e,
        I: IntoIterator<Item = &'e T>,
    {
        let mut items: Vec<&T> = items.into_iter().collect();
        if self.options.sorted {
            items.sort_by(|a, b| a.id().cmp(b.id()));
        }
        items
    }

    /// Merged bus a bus-breaker bus belongs to, for bus-branch export.
    pub fn merged_bus_id(&mut self, vl: &VoltageLevel, bus: &str) -> GritResult<String> {
        self.bus_views
            .entry(vl.data.id.clone())
            .or_insert_with(|| bus_branch_view(vl))
            .merged_bus_id(bus)
            .map(str::to_string)
            .ok_or_else(|| {
                GritError::Validation(format!(
                    "Bus '{}' not found in voltage level '{}'",
                    bus, vl.data.id
                ))
            })
    }

    pub fn bus_branch_view(&mut self, vl: &VoltageLevel) -> &BusBranchView {
        self.bus_views
            .entry(vl.data.id.clone())
            .or_insert_with(|| bus_branch_view(vl))
    }

    /// Releases the writer, the anonymizer and the diagnostics.
    pub fn finish(self) -> (Box<dyn TreeDataWriter + 'a>, Box<dyn Anonymizer>, Diagnostics) {
        (self.writer, self.anonymizer, self.diagnostics)
    }
}

/// Read-side context: the tree reader, the de-anonymizer, the document
/// versions and the end-task queue.
pub struct DeserializerContext<'a> {
    reader: Box<dyn TreeDataReader + 'a>,
    anonymizer: &'a dyn Anonymizer,
    options: &'a ImportOptions,
    providers: &'a ExtensionProviders,
    pub(crate) version: SchemaVersion,
    extension_versions: BTreeMap<String, String>,
    pub end_tasks: EndTaskQueue,
    pub diagnostics: Diagnostics,
    ignored: HashSet<String>,
    pub(crate) imported_extensions: BTreeSet<String>,
    pub(crate) not_found_extensions: BTreeSet<String>,
}

impl<'a> DeserializerContext<'a> {
    pub fn new(
        reader: Box<dyn TreeDataReader + 'a>,
        anonymizer: &'a dyn Anonymizer,
        options: &'a ImportOptions,
        providers: &'a ExtensionProviders,
        version: SchemaVersion,
        extension_versions: BTreeMap<String, String>,
    ) -> Self {
        Self {
            reader,
            anonymizer,
            options,
            providers,
            version,
            extension_versions,
            end_tasks: EndTaskQueue::new(),
            diagnostics: Diagnostics::new(),
            ignored: HashSet::new(),
            imported_extensions: BTreeSet::new(),
            not_found_extensions: BTreeSet::new(),
        }
    }

    pub fn options(&self) -> &'a ImportOptions {
        self.options
    }

    pub fn providers(&self) -> &'a ExtensionProviders {
        self.providers
    }

    pub fn reader(&mut self) -> &mut (dyn TreeDataReader + 'a) {
        self.reader.as_mut()
    }

    /// Extension version declared by the document header.
    pub fn extension_version(&self, name: &str) -> Option<&str> {
        self.extension_versions.get(name).map(String::as_str)
    }

    pub fn deanonymize(&self, token: &str) -> String {
        self.anonymizer.deanonymize(token)
    }

    /// Reads a mandatory anonymized attribute.
    pub fn read_id(&mut self, name: &str) -> GritResult<String> {
        let token = self.reader.read_required_string_attribute(name)?;
        Ok(self.anonymizer.deanonymize(&token))
    }

    pub fn read_optional_id(&self, name: &str) -> Option<String> {
        self.reader
            .read_string_attribute(name)
            .map(|token| self.anonymizer.deanonymize(&token))
    }

    /// Records an identifiable that was dropped while reading.
    pub fn ignore(&mut self, id: &str) {
        self.ignored.insert(id.to_string());
    }

    pub fn is_ignored(&self, id: &str) -> bool {
        self.ignored.contains(id)
    }

    /// Dispatches every child of the current node to `handler` by name. The
    /// child is closed after the handler returns, whatever it consumed.
    pub fn read_child_nodes<F>(&mut self, mut handler: F) -> GritResult<()>
    where
        F: FnMut(&mut Self, &str) -> GritResult<()>,
    {
        let depth = self.reader.depth();
        while let Some(name) = self.reader.next_child_node()? {
            handler(self, &name)?;
            self.reader.close_to(depth + 1)?;
        }
        Ok(())
    }
}

/// Error for a child node no handler recognizes.
pub fn unknown_element(name: &str, parent: &str) -> GritError {
    GritError::Structural(format!("Unknown element name '{}' in '{}'", name, parent))
}
