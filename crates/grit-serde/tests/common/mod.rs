//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use std::any::Any;
use std::collections::BTreeSet;

use chrono::DateTime;
use grit_core::{
    Bus, Container, Extension, Generator, GritResult, Identifiable, Line, Load, Network,
    OverloadManagementSystem, Side, Substation, Switch, Terminal, TerminalRef, Tripping,
    TrippingTarget, TwoWindingsTransformer, VoltageAngleLimit, VoltageLevel,
};
use grit_serde::extensions::{downcast, ActivePowerControl, EntsoeArea};
use grit_serde::{DeserializerContext, ExtensionSerDe, ExtensionVersion, SerializerContext};

/// Routes library logs to the test output; `RUST_LOG` selects the level.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Two substations, a transformer, a line, an overload management system
/// watching the line and a voltage angle limit. `G1` regulates `LD1`,
/// which comes later in document order.
pub fn sample_network() -> anyhow::Result<Network> {
    let case_date = DateTime::parse_from_rfc3339("2024-05-01T10:00:00+02:00")?;
    let mut network = Network::new("sample", "test").with_case_date(case_date);
    network.forecast_distance = 60;

    let mut s1 = Substation::new("S1");
    s1.country = Some("FR".into());
    s1.tso = Some("RTE".into());
    s1.geographical_tags = vec!["north".into(), "coast".into()];
    s1.data.add_extension(Box::new(EntsoeArea::new("FR")));
    network.add(Container::root(), s1)?;
    network.add(Container::substation("S1"), VoltageLevel::new("VL1", 400.0))?;
    network.add(Container::substation("S1"), VoltageLevel::new("VL2", 225.0))?;
    for bus in ["B1", "B2"] {
        network.add(Container::voltage_level("VL1"), Bus::new(bus))?;
    }
    network.add(Container::voltage_level("VL1"), Switch::new("SW1", "B1", "B2"))?;
    network.add(Container::voltage_level("VL2"), Bus::new("B3"))?;

    let mut g1 = Generator::new("G1", Terminal::new("VL1", "B1"))
        .with_p_limits(0.0, 500.0)
        .with_target_p(300.0)
        .with_voltage_regulation(400.0);
    g1.data.set_property("owner", "plant-a");
    g1.data.add_alias("G1-code", Some("code".into()));
    g1.data.add_extension(Box::new(
        ActivePowerControl::new(true, 4.0).with_participation_factor(0.5),
    ));
    network.add(Container::voltage_level("VL1"), g1)?;
    network.add(
        Container::voltage_level("VL2"),
        Load::new("LD1", Terminal::new("VL2", "B3"), 100.0, 20.0),
    )?;
    network.set_regulating_terminal("G1", Some(TerminalRef::new("LD1")))?;

    let mut t1 = TwoWindingsTransformer::new("T1", Terminal::new("VL1", "B2"), Terminal::new("VL2", "B3"));
    t1.x = 12.0;
    t1.rated_u1 = 400.0;
    t1.rated_u2 = 225.0;
    network.add(Container::substation("S1"), t1)?;

    network.add(Container::root(), Substation::new("S2"))?;
    network.add(Container::substation("S2"), VoltageLevel::new("VL3", 400.0))?;
    network.add(Container::voltage_level("VL3"), Bus::new("B4"))?;
    network.add(
        Container::root(),
        Line::new("L1", Terminal::new("VL1", "B2"), Terminal::new("VL3", "B4")).with_impedance(1.5, 15.0),
    )?;

    let mut oms = OverloadManagementSystem::new("OMS1", "L1", Side::One);
    oms.trippings = sample_trippings();
    network.add(Container::substation("S1"), oms)?;

    let mut limit = VoltageAngleLimit::new(
        "VAL1",
        TerminalRef::new("L1").with_side(Side::One),
        TerminalRef::new("LD1"),
    );
    limit.low_limit = -10.0;
    limit.high_limit = 10.0;
    network.add_voltage_angle_limit(limit)?;
    Ok(network)
}

pub fn sample_trippings() -> Vec<Tripping> {
    vec![
        Tripping {
            key: "trip-line".into(),
            name: None,
            current_limit: 1000.0,
            open_action: true,
            target: TrippingTarget::Branch {
                branch_id: "L1".into(),
                side: Side::Two,
            },
        },
        Tripping {
            key: "trip-switch".into(),
            name: Some("breaker".into()),
            current_limit: 1200.0,
            open_action: false,
            target: TrippingTarget::Switch {
                switch_id: "SW1".into(),
            },
        },
    ]
}

/// One substation, one bus and one generator at default active power limits.
pub fn single_generator_network() -> anyhow::Result<Network> {
    let mut network = Network::new("single", "test");
    network.add(Container::root(), Substation::new("S1"))?;
    network.add(Container::substation("S1"), VoltageLevel::new("VL1", 400.0))?;
    network.add(Container::voltage_level("VL1"), Bus::new("B1"))?;
    network.add(
        Container::voltage_level("VL1"),
        Generator::new("G1", Terminal::new("VL1", "B1")).with_target_p(50.0),
    )?;
    Ok(network)
}

pub fn ids(network: &Network) -> BTreeSet<String> {
    network.identifiables().map(|i| i.id().to_string()).collect()
}

/// Connected terminal on `bus` of `voltage_level`.
pub fn assert_terminal(terminal: &Terminal, voltage_level: &str, bus: &str) {
    assert_eq!(terminal.voltage_level, voltage_level);
    assert_eq!(terminal.connectable_bus, bus);
    assert!(terminal.connected);
}

/// Checks that `actual` carries everything [`sample_network`] puts in.
pub fn assert_sample(actual: &Network) {
    let expected = sample_network().unwrap();
    assert_eq!(ids(actual), ids(&expected));
    assert_eq!(actual.case_date, expected.case_date);
    assert_eq!(actual.forecast_distance, 60);

    let s1 = actual.substation("S1").unwrap();
    assert_eq!(s1.country.as_deref(), Some("FR"));
    assert_eq!(s1.tso.as_deref(), Some("RTE"));
    assert_eq!(s1.geographical_tags, vec!["north", "coast"]);
    assert_eq!(s1.data.extension::<EntsoeArea>().map(|e| e.code.as_str()), Some("FR"));

    let g1 = actual.generator("G1").unwrap();
    assert_eq!(g1.min_p, 0.0);
    assert_eq!(g1.max_p, 500.0);
    assert_eq!(g1.target_p, 300.0);
    assert!(g1.voltage_regulator_on);
    assert_eq!(g1.target_v, 400.0);
    assert_terminal(&g1.terminal, "VL1", "B1");
    assert_eq!(g1.regulating_terminal, Some(TerminalRef::new("LD1")));
    assert_eq!(g1.data.property("owner"), Some("plant-a"));
    assert_eq!(g1.data.alias_from_type("code"), Some("G1-code"));
    let apc = g1.data.extension::<ActivePowerControl>().unwrap();
    assert!(apc.participate);
    assert_eq!(apc.droop, 4.0);
    assert_eq!(apc.participation_factor, 0.5);

    let line = actual.line("L1").unwrap();
    assert_eq!((line.r, line.x), (1.5, 15.0));
    assert_terminal(&line.terminal2, "VL3", "B4");

    let t1 = actual.two_windings_transformer("T1").unwrap();
    assert_eq!((t1.x, t1.rated_u1, t1.rated_u2), (12.0, 400.0, 225.0));

    let load = actual.load("LD1").unwrap();
    assert_eq!((load.p0, load.q0), (100.0, 20.0));

    let oms = actual.overload_management_system("OMS1").unwrap();
    assert_eq!(oms.monitored_element_id, "L1");
    assert_eq!(oms.substation, "S1");
    assert_eq!(oms.trippings, sample_trippings());

    let limits = actual.voltage_angle_limits();
    assert_eq!(limits.len(), 1);
    assert_eq!(limits[0].from, TerminalRef::new("L1").with_side(Side::One));
    assert_eq!((limits[0].low_limit, limits[0].high_limit), (-10.0, 10.0));
}

// =============================================================================
// A third-party extension
// =============================================================================

pub const MARKER: &str = "marker";

#[derive(Debug, Clone, PartialEq)]
pub struct Marker {
    pub label: String,
}

impl Extension for Marker {
    fn name(&self) -> &'static str {
        MARKER
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn clone_box(&self) -> Box<dyn Extension> {
        Box::new(self.clone())
    }
}

pub struct MarkerSerDe {
    versions: Vec<ExtensionVersion>,
}

impl MarkerSerDe {
    pub fn with_prefix(prefix: &'static str) -> Self {
        Self {
            versions: vec![ExtensionVersion::new(
                "1.0",
                "http://example.org/schema/marker/1_0",
                prefix,
            )],
        }
    }
}

impl ExtensionSerDe for MarkerSerDe {
    fn extension_name(&self) -> &'static str {
        MARKER
    }

    fn versions(&self) -> &[ExtensionVersion] {
        &self.versions
    }

    fn write(
        &self,
        extension: &dyn Extension,
        _version: &ExtensionVersion,
        ctx: &mut SerializerContext<'_>,
    ) -> GritResult<()> {
        let marker = downcast::<Marker>(extension)?;
        ctx.writer().write_string_attribute("label", Some(&marker.label))
    }

    fn read(
        &self,
        _owner_id: &str,
        _version: &ExtensionVersion,
        ctx: &mut DeserializerContext<'_>,
    ) -> GritResult<Box<dyn Extension>> {
        let label = ctx.reader().read_required_string_attribute("label")?;
        Ok(Box::new(Marker { label }))
    }
}

/// [`single_generator_network`] with a marker on `G1`.
pub fn marked_network() -> anyhow::Result<Network> {
    let mut network = single_generator_network()?;
    network
        .identifiable_mut("G1")
        .ok_or_else(|| anyhow::anyhow!("G1 missing"))?
        .data_mut()
        .add_extension(Box::new(Marker { label: "checked".into() }));
    Ok(network)
}
