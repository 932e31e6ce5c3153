mod common;

use std::io::Cursor;

use anyhow::Result;
use common::{assert_sample, sample_network, single_generator_network};
use grit_core::{
    Bus, Container, Generator, GritError, Identifiable, Line, Network, OverloadManagementSystem,
    Side, Substation, Subnetwork, Terminal, TerminalRef, Tripping, TrippingTarget, VoltageLevel,
};
use grit_serde::extensions::ActivePowerControl;
use grit_serde::{
    read, write, ExportOptions, ImportOptions, IncompatibilityBehavior, SchemaVersion,
    TreeDataFormat,
};
use proptest::prelude::*;

fn round_trip(network: &Network, options: &ExportOptions) -> Result<grit_serde::ImportResult> {
    let mut out = Vec::new();
    write(network, options, &mut out)?;
    Ok(read(Cursor::new(out), &ImportOptions::default())?)
}

#[test]
fn sample_survives_every_format() -> Result<()> {
    let network = sample_network()?;
    for version in [SchemaVersion::CURRENT, SchemaVersion::V1_12] {
        for format in TreeDataFormat::ALL {
            let options = ExportOptions::default().with_version(version).with_format(*format);
            let result = round_trip(&network, &options)?;
            assert_eq!(result.version, version, "{:?}", format);
            assert_eq!(result.diagnostics.warning_count(), 0, "{:?}", format);
            assert!(result.not_found_extensions.is_empty());
            assert_sample(&result.network);
        }
    }
    Ok(())
}

#[test]
fn sorted_export_is_stable() -> Result<()> {
    let network = sample_network()?;
    let options = ExportOptions::default().with_sorted(true);
    let mut first = Vec::new();
    write(&network, &options, &mut first)?;
    let result = read(Cursor::new(first.clone()), &ImportOptions::default())?;
    let mut second = Vec::new();
    write(&result.network, &options, &mut second)?;
    assert_eq!(String::from_utf8(first)?, String::from_utf8(second)?);
    Ok(())
}

#[test]
fn older_version_drops_unsupported_content_when_lenient() -> Result<()> {
    common::init_tracing();
    let network = sample_network()?;
    let strict = ExportOptions::default().with_version(SchemaVersion::V1_10);
    let err = write(&network, &strict, Vec::new()).unwrap_err();
    assert!(matches!(err, GritError::VersionIncompatibility(_)), "{}", err);

    let lenient = strict.with_version_incompatibility_behavior(IncompatibilityBehavior::LogError);
    let mut out = Vec::new();
    let report = write(&network, &lenient, &mut out)?;
    assert_eq!(report.diagnostics.warning_count(), 2);

    let result = read(Cursor::new(out), &ImportOptions::default())?;
    assert!(result.network.overload_management_system("OMS1").is_none());
    assert!(result.network.voltage_angle_limits().is_empty());
    assert!(result.network.line("L1").is_some());
    assert!(result.network.generator("G1").unwrap().data.extension::<ActivePowerControl>().is_some());
    Ok(())
}

#[test]
fn rated_s_is_accepted_from_1_5_on() -> Result<()> {
    let mut network = single_generator_network()?;
    network
        .generator_mut("G1")
        .ok_or_else(|| anyhow::anyhow!("G1 missing"))?
        .rated_s = 200.0;

    for version in SchemaVersion::ALL {
        let options = ExportOptions::default()
            .with_version(version)
            .with_format(TreeDataFormat::Json);
        let mut out = Vec::new();
        match write(&network, &options, &mut out) {
            Ok(_) => {
                assert!(version >= SchemaVersion::V1_5, "{:?}", version);
                let result = read(Cursor::new(out), &ImportOptions::default())?;
                assert_eq!(result.network.generator("G1").unwrap().rated_s, 200.0);
            }
            Err(err) => {
                assert!(version < SchemaVersion::V1_5, "{:?}: {}", version, err);
                assert!(matches!(err, GritError::VersionIncompatibility(_)));
            }
        }
    }
    Ok(())
}

#[test]
fn padded_alias_survives_every_format() -> Result<()> {
    let mut network = single_generator_network()?;
    let added = network
        .identifiable_mut("G1")
        .ok_or_else(|| anyhow::anyhow!("G1 missing"))?
        .data_mut()
        .add_alias(" A1 ", Some("padded".into()));
    assert!(added);
    for format in TreeDataFormat::ALL {
        for indent in [true, false] {
            let options = ExportOptions::default().with_format(*format).with_indent(indent);
            let result = round_trip(&network, &options)?;
            let generator = result.network.generator("G1").unwrap();
            assert_eq!(generator.data.alias_from_type("padded"), Some(" A1 "), "{:?}", format);
        }
    }
    Ok(())
}

fn network_with_subnetwork() -> Result<Network> {
    let mut network = single_generator_network()?;
    network.add_subnetwork(Subnetwork::new("SUB", "test"))?;
    network.add(Container::subnetwork("SUB"), Substation::new("S3"))?;
    network.add(Container::substation("S3"), VoltageLevel::new("VL4", 225.0))?;
    network.add(Container::voltage_level("VL4"), Bus::new("B5"))?;
    let mut g3 = Generator::new("G3", Terminal::new("VL4", "B5")).with_target_p(20.0);
    g3.data.add_extension(Box::new(ActivePowerControl::new(false, 2.0)));
    network.add(Container::voltage_level("VL4"), g3)?;
    Ok(network)
}

#[test]
fn subnetwork_boundaries_round_trip() -> Result<()> {
    let network = network_with_subnetwork()?;
    for format in TreeDataFormat::ALL {
        let result = round_trip(&network, &ExportOptions::default().with_format(*format))?;
        let imported = &result.network;
        assert!(imported.subnetwork("SUB").is_some());
        assert_eq!(imported.substation("S3").unwrap().subnetwork.as_deref(), Some("SUB"));
        assert_eq!(imported.substation("S1").unwrap().subnetwork, None);
        let apc = imported.generator("G3").unwrap().data.extension::<ActivePowerControl>();
        assert_eq!(apc.map(|e| e.droop), Some(2.0));
    }
    Ok(())
}

#[test]
fn subnetworks_are_flattened_before_1_11() -> Result<()> {
    let network = network_with_subnetwork()?;
    let options = ExportOptions::default()
        .with_version(SchemaVersion::V1_10)
        .with_version_incompatibility_behavior(IncompatibilityBehavior::LogError);
    let mut out = Vec::new();
    let report = write(&network, &options, &mut out)?;
    assert_eq!(report.diagnostics.warning_count(), 1);

    let result = read(Cursor::new(out), &ImportOptions::default())?;
    assert!(result.network.subnetworks().is_empty());
    assert_eq!(result.network.substation("S3").unwrap().subnetwork, None);
    assert!(result.network.generator("G3").is_some());
    Ok(())
}

/// [`network_with_subnetwork`] plus references crossing the boundary: a
/// root line into `SUB`, a system in `SUB` watching that line and a
/// generator in `SUB` regulating a root terminal.
fn cross_scope_network() -> Result<Network> {
    let mut network = network_with_subnetwork()?;
    network.add(
        Container::root(),
        Line::new("L2", Terminal::new("VL1", "B1"), Terminal::new("VL4", "B5")).with_impedance(0.5, 8.0),
    )?;
    let mut oms = OverloadManagementSystem::new("OMS3", "L2", Side::Two);
    oms.trippings = vec![Tripping {
        key: "trip-l2".into(),
        name: None,
        current_limit: 900.0,
        open_action: true,
        target: TrippingTarget::Branch {
            branch_id: "L2".into(),
            side: Side::One,
        },
    }];
    network.add(Container::substation("S3"), oms)?;
    network.set_regulating_terminal("G3", Some(TerminalRef::new("G1")))?;
    Ok(network)
}

fn sorted_xml(network: &Network) -> Result<String> {
    let mut out = Vec::new();
    write(network, &ExportOptions::default().with_sorted(true), &mut out)?;
    Ok(String::from_utf8(out)?)
}

#[test]
fn subnetwork_branch_cannot_reach_outside_its_scope() -> Result<()> {
    let mut network = network_with_subnetwork()?;
    let across = Line::new("L2", Terminal::new("VL1", "B1"), Terminal::new("VL4", "B5"));
    let err = network.add(Container::subnetwork("SUB"), across).unwrap_err();
    assert!(matches!(err, GritError::Validation(_)), "{}", err);

    // the same line owned by the root is written after the sub-network
    let network = cross_scope_network()?;
    for format in TreeDataFormat::ALL {
        let copied = grit_serde::copy(&network, *format)?;
        let line = copied.line("L2").unwrap();
        assert_eq!(line.subnetwork, None, "{:?}", format);
        common::assert_terminal(&line.terminal2, "VL4", "B5");
    }
    Ok(())
}

#[test]
fn formats_agree_on_cross_scope_content() -> Result<()> {
    let network = cross_scope_network()?;
    let expected = sorted_xml(&network)?;
    for format in TreeDataFormat::ALL {
        let result = round_trip(&network, &ExportOptions::default().with_format(*format))?;
        let imported = &result.network;
        assert_eq!(result.diagnostics.warning_count(), 0, "{:?}", format);
        assert_eq!(common::ids(imported), common::ids(&network));
        assert_eq!(
            imported.generator("G3").unwrap().regulating_terminal,
            Some(TerminalRef::new("G1"))
        );
        assert_eq!(imported.overload_management_system("OMS3").unwrap().substation, "S3");
        assert_eq!(sorted_xml(imported)?, expected, "{:?}", format);
    }
    Ok(())
}

fn format_strategy() -> impl Strategy<Value = TreeDataFormat> {
    prop_oneof![
        Just(TreeDataFormat::Xml),
        Just(TreeDataFormat::Json),
        Just(TreeDataFormat::Bin),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn generator_values_survive(
        min_p in -1.0e4f64..0.0,
        span in 0.0f64..1.0e4,
        target_p in -1.0e4f64..1.0e4,
        name in "[a-zA-Z][a-zA-Z0-9 _-]{0,15}",
        format in format_strategy(),
    ) {
        let mut network = Network::new("prop", "test");
        network.add(Container::root(), Substation::new("S1")).unwrap();
        network.add(Container::substation("S1"), VoltageLevel::new("VL1", 400.0)).unwrap();
        network.add(Container::voltage_level("VL1"), Bus::new("B1")).unwrap();
        let mut generator = Generator::new("G1", Terminal::new("VL1", "B1"))
            .with_p_limits(min_p, min_p + span)
            .with_target_p(target_p);
        generator.data.name = Some(name.clone());
        network.add(Container::voltage_level("VL1"), generator).unwrap();

        let options = ExportOptions::default().with_format(format);
        let result = round_trip(&network, &options).unwrap();
        let generator = result.network.generator("G1").unwrap();
        prop_assert_eq!(generator.min_p, min_p);
        prop_assert_eq!(generator.max_p, min_p + span);
        prop_assert_eq!(generator.target_p, target_p);
        prop_assert_eq!(generator.data.name.as_deref(), Some(name.as_str()));
    }
}
