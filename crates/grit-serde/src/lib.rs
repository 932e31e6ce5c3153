//! # grit-serde: versioned network interchange
//!
//! Writes a [`grit_core::Network`] to a self-describing document and reads it
//! back. One logical tree is carried by three encodings (XML, JSON and a
//! compact binary stream) and by every schema version from 1.0 to the
//! current one.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use grit_serde::{read_from_path, write_to_path, ExportOptions, ImportOptions, SchemaVersion};
//!
//! fn main() -> anyhow::Result<()> {
//!     let imported = read_from_path("grid.xml", &ImportOptions::default())?;
//!     println!("{}", imported.diagnostics.summary());
//!
//!     let options = ExportOptions::default().with_version(SchemaVersion::V1_10);
//!     write_to_path(&imported.network, &options, "grid_1_10.xml")?;
//!     Ok(())
//! }
//! ```
//!
//! ## Module Overview
//!
//! - [`tree`]: format-agnostic writer/reader traits and the three encodings
//! - [`version`]: schema versions and their namespaces
//! - [`gate`]: version-conditional writes and the incompatibility policy
//! - [`template`]: shared write/read skeleton of every identifiable kind
//! - [`mappings`]: one mapping per identifiable kind, plus the network element
//! - [`extensions`]: extension serializers, registry and negotiation
//! - [`end_tasks`]: deferred work run once the structure has been read
//! - [`anonymizer`]: id obfuscation and its side-table
//! - [`network_serde`]: entry points
//! - [`copy`]: deep copy through an in-memory pipe
//!
//! ## Error Handling
//!
//! Every fallible operation returns [`grit_core::GritResult`]. Version
//! incompatibilities fail or are logged and skipped according to
//! [`IncompatibilityBehavior`]; recoverable issues are collected in the
//! [`grit_core::Diagnostics`] of the export report or import result.

pub mod anonymizer;
pub mod context;
pub mod copy;
pub mod end_tasks;
pub mod extensions;
pub mod gate;
pub mod mappings;
pub mod network_serde;
pub mod options;
pub mod template;
pub mod tree;
pub mod version;

pub use anonymizer::{Anonymizer, IdentityAnonymizer, SimpleAnonymizer};
pub use context::{DeserializerContext, SerializerContext};
pub use copy::{copy, copy_with};
pub use end_tasks::{EndTaskQueue, Phase};
pub use extensions::{
    negotiate, ExtensionPlan, ExtensionProviders, ExtensionSerDe, ExtensionVersion,
    DEFAULT_EXTENSIONS,
};
pub use gate::{ErrorMessage, VersionGate};
pub use network_serde::{
    mapping_path, read, read_from_path, read_from_path_with, read_with, write, write_to_path,
    write_to_path_with, write_with, ExportReport, ImportResult,
};
pub use options::{ExportOptions, ImportOptions, IncompatibilityBehavior, TopologyLevel};
pub use tree::{TreeDataFormat, TreeDataReader, TreeDataWriter};
pub use version::SchemaVersion;
