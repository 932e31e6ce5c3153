//! End-to-end behaviour of the orchestrator on small hand-built networks.

mod common;

use std::io::Cursor;

use anyhow::Result;
use common::{marked_network, sample_network, single_generator_network, MarkerSerDe};
use grit_core::{Generator, GritError, Identifiable, TerminalRef};
use grit_serde::{
    read, read_from_path, write, write_to_path, write_to_path_with, write_with, ExportOptions,
    ExtensionProviders, ImportOptions, IncompatibilityBehavior, SchemaVersion, TreeDataFormat,
};
use tempfile::tempdir;

#[test]
fn default_attributes_are_elided_and_restored() -> Result<()> {
    let network = single_generator_network()?;
    let options = ExportOptions::default().with_version(SchemaVersion::V1_12);
    let mut out = Vec::new();
    write(&network, &options, &mut out)?;

    let document = String::from_utf8(out.clone())?;
    assert!(document.contains("id=\"G1\""));
    assert!(!document.contains("minP"));
    assert!(!document.contains("maxP"));

    let result = read(Cursor::new(out), &ImportOptions::default())?;
    assert_eq!(result.version, SchemaVersion::V1_12);
    let generator = result.network.generator("G1").unwrap();
    assert_eq!(generator.min_p, Generator::DEFAULT_MIN_P);
    assert_eq!(generator.max_p, Generator::DEFAULT_MAX_P);
    assert_eq!(generator.target_p, 50.0);
    assert!(generator.rated_s.is_nan());
    assert!(result.network.bus("B1").is_some());
    Ok(())
}

#[test]
fn forward_references_resolve_after_structure() -> Result<()> {
    let network = sample_network()?;
    for format in TreeDataFormat::ALL {
        let mut out = Vec::new();
        write(&network, &ExportOptions::default().with_format(*format), &mut out)?;
        let result = read(Cursor::new(out), &ImportOptions::default())?;

        // G1 comes before LD1, the system comes before the line it watches
        let generator = result.network.generator("G1").unwrap();
        assert_eq!(generator.regulating_terminal, Some(TerminalRef::new("LD1")));
        let terminal = result
            .network
            .resolve_terminal(generator.regulating_terminal.as_ref().unwrap())?;
        assert_eq!(terminal.connectable_bus, "B3");
        assert!(result.network.overload_management_system("OMS1").is_some());
    }
    Ok(())
}

#[test]
fn too_new_feature_follows_the_incompatibility_policy() -> Result<()> {
    common::init_tracing();
    let mut network = single_generator_network()?;
    network
        .generator_mut("G1")
        .ok_or_else(|| anyhow::anyhow!("G1 missing"))?
        .rated_s = 200.0;

    let strict = ExportOptions::default().with_version(SchemaVersion::V1_1);
    let err = write(&network, &strict, Vec::new()).unwrap_err();
    assert!(matches!(err, GritError::VersionIncompatibility(_)), "{}", err);

    let lenient = strict.with_version_incompatibility_behavior(IncompatibilityBehavior::LogError);
    let mut out = Vec::new();
    let report = write(&network, &lenient, &mut out)?;
    assert!(!String::from_utf8(out.clone())?.contains("ratedS"));
    assert_eq!(report.diagnostics.warning_count(), 1);

    let result = read(Cursor::new(out), &ImportOptions::default())?;
    assert_eq!(result.version, SchemaVersion::V1_1);
    assert!(result.network.generator("G1").unwrap().rated_s.is_nan());
    Ok(())
}

#[test]
fn anonymized_export_round_trips_through_side_table() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("grid.xml");
    let network = single_generator_network()?;

    write_to_path(&network, &ExportOptions::default().with_anonymized(true), &path)?;
    let document = std::fs::read_to_string(&path)?;
    for id in ["single", "S1", "VL1", "B1", "G1"] {
        assert!(!document.contains(&format!("\"{}\"", id)), "{} leaked", id);
    }
    let mapping = std::fs::read_to_string(dir.path().join("grid_mapping.csv"))?;
    assert!(mapping.lines().any(|line| line.starts_with("G1;")));

    let result = read_from_path(&path, &ImportOptions::default())?;
    assert_eq!(result.network.data.id, "single");
    assert_eq!(common::ids(&result.network), common::ids(&network));
    let generator = result.network.generator("G1").unwrap();
    common::assert_terminal(&generator.terminal, "VL1", "B1");
    Ok(())
}

const SELF_LOOP_SWITCH: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<grit:network xmlns:grit="http://www.grit-project.org/schema/grit/VERSION" id="N" caseDate="2024-01-01T00:00:00+00:00" forecastDistance="0" sourceFormat="test">
    <grit:substation id="S1">
        <grit:voltageLevel id="VL1" nominalV="400.0" topologyKind="BUS_BREAKER">
            <grit:busBreakerTopology>
                <grit:bus id="B1"/>
                <grit:switch id="SW1" kind="BREAKER" open="false" bus1="B1" bus2="B1"/>
            </grit:busBreakerTopology>
        </grit:voltageLevel>
    </grit:substation>
</grit:network>
"#;

#[test]
fn self_loop_switch_is_dropped_before_1_8() -> Result<()> {
    common::init_tracing();
    let old = SELF_LOOP_SWITCH.replace("VERSION", "1_7");
    let result = read(Cursor::new(old), &ImportOptions::default())?;
    assert_eq!(result.version, SchemaVersion::V1_7);
    assert!(result.network.switch("SW1").is_none());
    assert!(result.network.bus("B1").is_some());
    assert_eq!(result.diagnostics.warning_count(), 1);

    let new = SELF_LOOP_SWITCH.replace("VERSION", "1_8");
    let err = read(Cursor::new(new), &ImportOptions::default()).unwrap_err();
    assert!(matches!(err, GritError::Validation(_)), "{}", err);
    Ok(())
}

#[test]
fn namespace_prefix_collision_fails_before_writing() -> Result<()> {
    let mut network = marked_network()?;
    network
        .identifiable_mut("G1")
        .ok_or_else(|| anyhow::anyhow!("G1 missing"))?
        .data_mut()
        .add_extension(Box::new(grit_serde::extensions::ActivePowerControl::new(true, 1.0)));
    let providers = ExtensionProviders::with_builtins().register(MarkerSerDe::with_prefix("apc"));

    let mut out = Vec::new();
    let err = write_with(&network, &ExportOptions::default(), &providers, &mut out).unwrap_err();
    assert!(matches!(err, GritError::NamespaceCollision(_)), "{}", err);
    assert!(out.is_empty());

    let dir = tempdir()?;
    let path = dir.path().join("grid.xml");
    let err = write_to_path_with(&network, &ExportOptions::default(), &providers, &path).unwrap_err();
    assert!(matches!(err, GritError::NamespaceCollision(_)));
    assert!(!path.exists());
    Ok(())
}

#[test]
fn reserved_prefix_is_rejected() -> Result<()> {
    let network = marked_network()?;
    let providers = ExtensionProviders::with_builtins().register(MarkerSerDe::with_prefix("grit"));
    let err = write_with(&network, &ExportOptions::default(), &providers, Vec::new()).unwrap_err();
    assert!(matches!(err, GritError::NamespaceCollision(_)));
    Ok(())
}
