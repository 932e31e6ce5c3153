//! Entry points: write a network to a document and read it back.
//!
//! An export runs in two stages. Extension negotiation comes first and may
//! fail on its own (unknown serializer, namespace collision) before a byte
//! reaches the sink; only then is the tree written. An import reads the
//! header, streams the network element, then drains the end-task queue in
//! phase order.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use grit_core::{Diagnostics, GritError, GritResult, Network, ValidationLevel};
use tracing::{info, warn};

use crate::anonymizer::{Anonymizer, IdentityAnonymizer, SimpleAnonymizer};
use crate::context::{DeserializerContext, SerializerContext};
use crate::end_tasks::Phase;
use crate::extensions::{negotiate, ExtensionPlan, ExtensionProviders, DEFAULT_EXTENSIONS};
use crate::mappings::network::{read_network, write_network};
use crate::mappings::NETWORK_PREFIX;
use crate::options::{ExportOptions, ImportOptions};
use crate::tree::binary::{BinReader, BinWriter};
use crate::tree::json::{JsonReader, JsonWriter};
use crate::tree::xml::{XmlReader, XmlWriter};
use crate::tree::{TreeDataFormat, TreeDataReader, TreeDataWriter};
use crate::version::SchemaVersion;

/// What an export produced besides the document.
pub struct ExportReport {
    pub version: SchemaVersion,
    pub format: TreeDataFormat,
    /// Negotiated version of every extension written.
    pub extension_versions: BTreeMap<String, String>,
    pub diagnostics: Diagnostics,
    /// Mapping used for the document; the identity when not anonymized.
    pub anonymizer: Box<dyn Anonymizer>,
}

impl fmt::Debug for ExportReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExportReport")
            .field("version", &self.version)
            .field("format", &self.format)
            .field("extension_versions", &self.extension_versions)
            .field("diagnostics", &self.diagnostics)
            .field("anonymized", &!self.anonymizer.is_identity())
            .finish()
    }
}

/// Result of an import: the network plus what was learned along the way.
#[derive(Debug)]
pub struct ImportResult {
    pub network: Network,
    /// Schema version of the document.
    pub version: SchemaVersion,
    pub diagnostics: Diagnostics,
    pub imported_extensions: BTreeSet<String>,
    /// Extensions present in the document with no registered serializer.
    pub not_found_extensions: BTreeSet<String>,
}

// =============================================================================
// Export
// =============================================================================

/// Writes `network` with the built-in extension serializers.
pub fn write<W: Write>(network: &Network, options: &ExportOptions, sink: W) -> GritResult<ExportReport> {
    write_with(network, options, &DEFAULT_EXTENSIONS, sink)
}

pub fn write_with<W: Write>(
    network: &Network,
    options: &ExportOptions,
    providers: &ExtensionProviders,
    sink: W,
) -> GritResult<ExportReport> {
    let mut diagnostics = Diagnostics::new();
    let plan = negotiate(network, options, providers, &mut diagnostics)?;
    write_prepared(network, options, providers, plan, diagnostics, sink)
}

fn write_prepared<W: Write>(
    network: &Network,
    options: &ExportOptions,
    providers: &ExtensionProviders,
    plan: ExtensionPlan<'_>,
    mut diagnostics: Diagnostics,
    sink: W,
) -> GritResult<ExportReport> {
    let mut writer: Box<dyn TreeDataWriter + '_> = match options.format {
        TreeDataFormat::Xml => Box::new(XmlWriter::new(sink, options.indent)),
        TreeDataFormat::Json => Box::new(JsonWriter::new(sink, options.indent, providers.array_names()?)),
        TreeDataFormat::Bin => Box::new(BinWriter::new(sink)),
    };
    let namespace = options
        .version
        .namespace_uri(network.validation_level != ValidationLevel::Equipment);
    writer.set_namespace_prefix(&namespace, NETWORK_PREFIX);
    for (uri, prefix) in plan.namespaces() {
        writer.set_namespace_prefix(uri, prefix);
    }
    let extension_versions = plan.versions();
    writer.set_versions(options.version.as_str(), &extension_versions);

    let anonymizer: Box<dyn Anonymizer> = if options.anonymized {
        Box::new(SimpleAnonymizer::new())
    } else {
        Box::new(IdentityAnonymizer)
    };

    let mut ctx = SerializerContext::new(writer, anonymizer, options, namespace, plan);
    write_network(network, &mut ctx)?;
    let (mut writer, anonymizer, written) = ctx.finish();
    writer.close()?;
    diagnostics.merge(written);

    info!(
        network = %network.data.id,
        version = %options.version,
        format = %options.format,
        extensions = extension_versions.len(),
        "network exported"
    );
    Ok(ExportReport {
        version: options.version,
        format: options.format,
        extension_versions,
        diagnostics,
        anonymizer,
    })
}

/// Side-table file written next to an anonymized document:
/// `grid.xml` -> `grid_mapping.csv`.
pub fn mapping_path(path: &Path) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!("{}_mapping.csv", stem))
}

pub fn write_to_path(
    network: &Network,
    options: &ExportOptions,
    path: impl AsRef<Path>,
) -> GritResult<ExportReport> {
    write_to_path_with(network, options, &DEFAULT_EXTENSIONS, path)
}

/// Writes to a file, plus the mapping side-table when anonymizing. Nothing
/// is created when negotiation fails, and a partially written file is
/// removed.
pub fn write_to_path_with(
    network: &Network,
    options: &ExportOptions,
    providers: &ExtensionProviders,
    path: impl AsRef<Path>,
) -> GritResult<ExportReport> {
    let path = path.as_ref();
    let mut diagnostics = Diagnostics::new();
    let plan = negotiate(network, options, providers, &mut diagnostics)?;

    let file = File::create(path)?;
    let report = match write_prepared(network, options, providers, plan, diagnostics, BufWriter::new(file)) {
        Ok(report) => report,
        Err(e) => {
            if let Err(remove) = fs::remove_file(path) {
                warn!(path = %path.display(), error = %remove, "could not remove partial document");
            }
            return Err(e);
        }
    };

    if options.anonymized {
        let mapping = mapping_path(path);
        let mut sink = BufWriter::new(File::create(&mapping)?);
        report.anonymizer.write(&mut sink)?;
        sink.flush()?;
        info!(path = %mapping.display(), "anonymization mapping written");
    }
    Ok(report)
}

// =============================================================================
// Import
// =============================================================================

/// Reads a network with the built-in extension serializers and no
/// anonymization mapping.
pub fn read<R: BufRead>(source: R, options: &ImportOptions) -> GritResult<ImportResult> {
    read_with(source, options, &DEFAULT_EXTENSIONS, &IdentityAnonymizer)
}

/// Reads a network, de-anonymizing every id through `anonymizer`.
pub fn read_with<R: BufRead>(
    mut source: R,
    options: &ImportOptions,
    providers: &ExtensionProviders,
    anonymizer: &dyn Anonymizer,
) -> GritResult<ImportResult> {
    let format = match options.format {
        Some(format) => format,
        None => TreeDataFormat::sniff(source.fill_buf()?)
            .ok_or_else(|| GritError::Parse("Unable to detect the document format".into()))?,
    };
    let mut reader: Box<dyn TreeDataReader + '_> = match format {
        TreeDataFormat::Xml => Box::new(XmlReader::new(source, providers.xml_namespaces())),
        TreeDataFormat::Json => Box::new(JsonReader::new(source, providers.array_names()?)),
        TreeDataFormat::Bin => Box::new(BinReader::new(source)),
    };
    let header = reader.read_header()?;
    let version: SchemaVersion = header.version.parse()?;

    let mut ctx = DeserializerContext::new(
        reader,
        anonymizer,
        options,
        providers,
        version,
        header.extension_versions,
    );
    let mut network = read_network(header.valid, &mut ctx)?;
    ctx.end_tasks.execute(&mut network, Phase::BeforeExtensions)?;
    ctx.end_tasks.execute(&mut network, Phase::AfterExtensions)?;

    let DeserializerContext {
        mut diagnostics,
        imported_extensions,
        not_found_extensions,
        ..
    } = ctx;
    if !not_found_extensions.is_empty() {
        let names: Vec<&str> = not_found_extensions.iter().map(String::as_str).collect();
        let message = format!("Extensions [{}] not found!", names.join(", "));
        if options.throw_exception_if_extension_not_found {
            return Err(GritError::ExtensionResolution(message));
        }
        warn!("{}", message);
        diagnostics.add_warning("extension", &message);
    }

    info!(
        network = %network.data.id,
        %version,
        %format,
        identifiables = network.identifiable_count(),
        "network imported"
    );
    Ok(ImportResult {
        network,
        version,
        diagnostics,
        imported_extensions,
        not_found_extensions,
    })
}

pub fn read_from_path(path: impl AsRef<Path>, options: &ImportOptions) -> GritResult<ImportResult> {
    read_from_path_with(path, options, &DEFAULT_EXTENSIONS)
}

/// Reads a file. A mapping side-table next to it is loaded when present.
/// The format is sniffed, then guessed from the file extension.
pub fn read_from_path_with(
    path: impl AsRef<Path>,
    options: &ImportOptions,
    providers: &ExtensionProviders,
) -> GritResult<ImportResult> {
    let path = path.as_ref();
    let mut source = BufReader::new(File::open(path)?);
    let mut options = options.clone();
    if options.format.is_none() {
        options.format = TreeDataFormat::sniff(source.fill_buf()?).or_else(|| TreeDataFormat::from_path(path));
    }

    let mapping = mapping_path(path);
    if mapping.exists() {
        info!(path = %mapping.display(), "loading anonymization mapping");
        let anonymizer = SimpleAnonymizer::read(File::open(&mapping)?)?;
        read_with(source, &options, providers, &anonymizer)
    } else {
        read_with(source, &options, providers, &IdentityAnonymizer)
    }
}
