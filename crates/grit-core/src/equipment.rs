//! Equipment held by a [`Network`](crate::Network).
//!
//! Everything here is plain data. Invariants that involve other objects
//! (referenced buses, voltage levels, dangling lines) are enforced when the
//! object is added, see [`crate::adder`].

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, FixedOffset, Utc};

use crate::error::{GritError, GritResult};
use crate::identifiable::{impl_identifiable, IdentifiableData, IdentifiableKind};

/// Declares a fieldless enum with a fixed textual form used in documents.
macro_rules! named_enum {
    ($(#[$meta:meta])* pub enum $name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub fn as_str(self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = GritError;

            fn from_str(s: &str) -> GritResult<Self> {
                match s {
                    $($text => Ok($name::$variant),)+
                    _ => Err(GritError::Parse(format!(
                        "Unknown {} value '{}'",
                        stringify!($name),
                        s
                    ))),
                }
            }
        }
    };
}

named_enum! {
    /// Side of a two-terminal object.
    pub enum Side {
        One => "ONE",
        Two => "TWO",
    }
}

named_enum! {
    pub enum SwitchKind {
        Breaker => "BREAKER",
        Disconnector => "DISCONNECTOR",
        LoadBreakSwitch => "LOAD_BREAK_SWITCH",
    }
}

named_enum! {
    pub enum EnergySource {
        Hydro => "HYDRO",
        Nuclear => "NUCLEAR",
        Wind => "WIND",
        Thermal => "THERMAL",
        Solar => "SOLAR",
        Other => "OTHER",
    }
}

named_enum! {
    pub enum LoadType {
        Undefined => "UNDEFINED",
        Auxiliary => "AUXILIARY",
        Fictitious => "FICTITIOUS",
    }
}

named_enum! {
    pub enum ConvertersMode {
        SideOneRectifierSideTwoInverter => "SIDE_1_RECTIFIER_SIDE_2_INVERTER",
        SideOneInverterSideTwoRectifier => "SIDE_1_INVERTER_SIDE_2_RECTIFIER",
    }
}

named_enum! {
    /// How far a network has been validated. Equipment-level networks may
    /// lack steady-state setpoints.
    pub enum ValidationLevel {
        Equipment => "EQUIPMENT",
        SteadyStateHypothesis => "STEADY_STATE_HYPOTHESIS",
    }
}

impl Default for EnergySource {
    fn default() -> Self {
        EnergySource::Other
    }
}

impl Default for LoadType {
    fn default() -> Self {
        LoadType::Undefined
    }
}

impl Default for SwitchKind {
    fn default() -> Self {
        SwitchKind::Breaker
    }
}

impl Default for ConvertersMode {
    fn default() -> Self {
        ConvertersMode::SideOneRectifierSideTwoInverter
    }
}

impl Default for ValidationLevel {
    fn default() -> Self {
        ValidationLevel::SteadyStateHypothesis
    }
}

/// Connection point of an equipment in a bus-breaker voltage level.
#[derive(Debug, Clone, PartialEq)]
pub struct Terminal {
    pub voltage_level: String,
    pub connectable_bus: String,
    pub connected: bool,
    pub p: f64,
    pub q: f64,
}

impl Terminal {
    pub fn new(voltage_level: impl Into<String>, bus: impl Into<String>) -> Self {
        Self {
            voltage_level: voltage_level.into(),
            connectable_bus: bus.into(),
            connected: true,
            p: f64::NAN,
            q: f64::NAN,
        }
    }

    pub fn disconnected(mut self) -> Self {
        self.connected = false;
        self
    }

    /// Bus the terminal is connected to, if any.
    pub fn bus(&self) -> Option<&str> {
        self.connected.then_some(self.connectable_bus.as_str())
    }
}

impl Default for Terminal {
    fn default() -> Self {
        Terminal::new("", "")
    }
}

/// Textual pointer to a terminal: an equipment id plus a side for branches.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TerminalRef {
    pub id: String,
    pub side: Option<Side>,
}

impl TerminalRef {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            side: None,
        }
    }

    pub fn with_side(mut self, side: Side) -> Self {
        self.side = Some(side);
        self
    }
}

impl fmt::Display for TerminalRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.side {
            Some(side) => write!(f, "{} (side {})", self.id, side),
            None => f.write_str(&self.id),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Subnetwork {
    pub data: IdentifiableData,
    pub case_date: DateTime<FixedOffset>,
    pub forecast_distance: i32,
    pub source_format: String,
}

impl Subnetwork {
    pub fn new(id: impl Into<String>, source_format: impl Into<String>) -> Self {
        Self {
            data: IdentifiableData::new(id),
            case_date: Utc::now().fixed_offset(),
            forecast_distance: 0,
            source_format: source_format.into(),
        }
    }
}

impl_identifiable!(Subnetwork, IdentifiableKind::Subnetwork);

#[derive(Debug, Clone, Default)]
pub struct Substation {
    pub data: IdentifiableData,
    /// Owning sub-network, `None` for the root network.
    pub subnetwork: Option<String>,
    pub country: Option<String>,
    pub tso: Option<String>,
    pub geographical_tags: Vec<String>,
    pub(crate) two_windings_transformers: Vec<TwoWindingsTransformer>,
    pub(crate) overload_management_systems: Vec<OverloadManagementSystem>,
}

impl Substation {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            data: IdentifiableData::new(id),
            ..Self::default()
        }
    }

    pub fn two_windings_transformers(&self) -> &[TwoWindingsTransformer] {
        &self.two_windings_transformers
    }

    pub fn overload_management_systems(&self) -> &[OverloadManagementSystem] {
        &self.overload_management_systems
    }
}

impl_identifiable!(Substation, IdentifiableKind::Substation);

#[derive(Debug, Clone)]
pub struct VoltageLevel {
    pub data: IdentifiableData,
    pub substation: Option<String>,
    /// Owning sub-network, inherited from the substation when there is one.
    pub subnetwork: Option<String>,
    pub nominal_v: f64,
    pub low_voltage_limit: f64,
    pub high_voltage_limit: f64,
    pub(crate) buses: Vec<Bus>,
    pub(crate) switches: Vec<Switch>,
    pub(crate) generators: Vec<Generator>,
    pub(crate) loads: Vec<Load>,
    pub(crate) dangling_lines: Vec<DanglingLine>,
    pub(crate) vsc_converter_stations: Vec<VscConverterStation>,
}

impl VoltageLevel {
    pub fn new(id: impl Into<String>, nominal_v: f64) -> Self {
        Self {
            data: IdentifiableData::new(id),
            substation: None,
            subnetwork: None,
            nominal_v,
            low_voltage_limit: f64::NAN,
            high_voltage_limit: f64::NAN,
            buses: Vec::new(),
            switches: Vec::new(),
            generators: Vec::new(),
            loads: Vec::new(),
            dangling_lines: Vec::new(),
            vsc_converter_stations: Vec::new(),
        }
    }

    pub fn buses(&self) -> &[Bus] {
        &self.buses
    }

    pub fn bus(&self, id: &str) -> Option<&Bus> {
        self.buses.iter().find(|b| b.data.id == id)
    }

    pub fn switches(&self) -> &[Switch] {
        &self.switches
    }

    pub fn generators(&self) -> &[Generator] {
        &self.generators
    }

    pub fn loads(&self) -> &[Load] {
        &self.loads
    }

    pub fn dangling_lines(&self) -> &[DanglingLine] {
        &self.dangling_lines
    }

    pub fn vsc_converter_stations(&self) -> &[VscConverterStation] {
        &self.vsc_converter_stations
    }
}

impl Default for VoltageLevel {
    fn default() -> Self {
        VoltageLevel::new("", f64::NAN)
    }
}

impl_identifiable!(VoltageLevel, IdentifiableKind::VoltageLevel);

#[derive(Debug, Clone)]
pub struct Bus {
    pub data: IdentifiableData,
    pub v: f64,
    pub angle: f64,
}

impl Bus {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            data: IdentifiableData::new(id),
            v: f64::NAN,
            angle: f64::NAN,
        }
    }
}

impl Default for Bus {
    fn default() -> Self {
        Bus::new("")
    }
}

impl_identifiable!(Bus, IdentifiableKind::Bus);

#[derive(Debug, Clone, Default)]
pub struct Switch {
    pub data: IdentifiableData,
    pub kind: SwitchKind,
    pub open: bool,
    pub bus1: String,
    pub bus2: String,
}

impl Switch {
    pub fn new(id: impl Into<String>, bus1: impl Into<String>, bus2: impl Into<String>) -> Self {
        Self {
            data: IdentifiableData::new(id),
            bus1: bus1.into(),
            bus2: bus2.into(),
            ..Self::default()
        }
    }

    /// A switch whose two ends are the same bus.
    pub fn is_self_loop(&self) -> bool {
        self.bus1 == self.bus2
    }
}

impl_identifiable!(Switch, IdentifiableKind::Switch);

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReactiveCapabilityPoint {
    pub p: f64,
    pub min_q: f64,
    pub max_q: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ReactiveLimits {
    MinMax { min_q: f64, max_q: f64 },
    Curve(Vec<ReactiveCapabilityPoint>),
}

impl Default for ReactiveLimits {
    fn default() -> Self {
        ReactiveLimits::MinMax {
            min_q: -f64::MAX,
            max_q: f64::MAX,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Generator {
    pub data: IdentifiableData,
    pub terminal: Terminal,
    pub energy_source: EnergySource,
    pub min_p: f64,
    pub max_p: f64,
    pub rated_s: f64,
    pub voltage_regulator_on: bool,
    pub target_p: f64,
    pub target_v: f64,
    pub target_q: f64,
    pub condenser: bool,
    pub regulating_terminal: Option<TerminalRef>,
    pub reactive_limits: ReactiveLimits,
}

impl Generator {
    pub const DEFAULT_MIN_P: f64 = -f64::MAX;
    pub const DEFAULT_MAX_P: f64 = f64::MAX;

    pub fn new(id: impl Into<String>, terminal: Terminal) -> Self {
        Self {
            data: IdentifiableData::new(id),
            terminal,
            energy_source: EnergySource::default(),
            min_p: Self::DEFAULT_MIN_P,
            max_p: Self::DEFAULT_MAX_P,
            rated_s: f64::NAN,
            voltage_regulator_on: false,
            target_p: f64::NAN,
            target_v: f64::NAN,
            target_q: f64::NAN,
            condenser: false,
            regulating_terminal: None,
            reactive_limits: ReactiveLimits::default(),
        }
    }

    pub fn with_p_limits(mut self, min_p: f64, max_p: f64) -> Self {
        self.min_p = min_p;
        self.max_p = max_p;
        self
    }

    pub fn with_target_p(mut self, target_p: f64) -> Self {
        self.target_p = target_p;
        self
    }

    pub fn with_voltage_regulation(mut self, target_v: f64) -> Self {
        self.voltage_regulator_on = true;
        self.target_v = target_v;
        self
    }
}

impl Default for Generator {
    fn default() -> Self {
        Generator::new("", Terminal::default())
    }
}

impl_identifiable!(Generator, IdentifiableKind::Generator);

#[derive(Debug, Clone)]
pub struct Load {
    pub data: IdentifiableData,
    pub terminal: Terminal,
    pub load_type: LoadType,
    pub p0: f64,
    pub q0: f64,
}

impl Load {
    pub fn new(id: impl Into<String>, terminal: Terminal, p0: f64, q0: f64) -> Self {
        Self {
            data: IdentifiableData::new(id),
            terminal,
            load_type: LoadType::default(),
            p0,
            q0,
        }
    }
}

impl Default for Load {
    fn default() -> Self {
        Load::new("", Terminal::default(), f64::NAN, f64::NAN)
    }
}

impl_identifiable!(Load, IdentifiableKind::Load);

#[derive(Debug, Clone)]
pub struct DanglingLine {
    pub data: IdentifiableData,
    pub terminal: Terminal,
    pub p0: f64,
    pub q0: f64,
    pub r: f64,
    pub x: f64,
    pub g: f64,
    pub b: f64,
    pub pairing_key: Option<String>,
    /// Tie line this dangling line is half of, set when the tie line is added.
    pub tie_line: Option<String>,
}

impl DanglingLine {
    pub fn new(id: impl Into<String>, terminal: Terminal) -> Self {
        Self {
            data: IdentifiableData::new(id),
            terminal,
            p0: 0.0,
            q0: 0.0,
            r: 0.0,
            x: 0.0,
            g: 0.0,
            b: 0.0,
            pairing_key: None,
            tie_line: None,
        }
    }
}

impl Default for DanglingLine {
    fn default() -> Self {
        DanglingLine::new("", Terminal::default())
    }
}

impl_identifiable!(DanglingLine, IdentifiableKind::DanglingLine);

#[derive(Debug, Clone)]
pub struct VscConverterStation {
    pub data: IdentifiableData,
    pub terminal: Terminal,
    pub loss_factor: f64,
    pub voltage_regulator_on: bool,
    pub voltage_setpoint: f64,
    pub reactive_power_setpoint: f64,
}

impl VscConverterStation {
    pub fn new(id: impl Into<String>, terminal: Terminal) -> Self {
        Self {
            data: IdentifiableData::new(id),
            terminal,
            loss_factor: 0.0,
            voltage_regulator_on: false,
            voltage_setpoint: f64::NAN,
            reactive_power_setpoint: f64::NAN,
        }
    }
}

impl Default for VscConverterStation {
    fn default() -> Self {
        VscConverterStation::new("", Terminal::default())
    }
}

impl_identifiable!(VscConverterStation, IdentifiableKind::VscConverterStation);

#[derive(Debug, Clone, Default)]
pub struct Line {
    pub data: IdentifiableData,
    pub subnetwork: Option<String>,
    pub terminal1: Terminal,
    pub terminal2: Terminal,
    pub r: f64,
    pub x: f64,
    pub g1: f64,
    pub b1: f64,
    pub g2: f64,
    pub b2: f64,
}

impl Line {
    pub fn new(id: impl Into<String>, terminal1: Terminal, terminal2: Terminal) -> Self {
        Self {
            data: IdentifiableData::new(id),
            terminal1,
            terminal2,
            ..Self::default()
        }
    }

    pub fn with_impedance(mut self, r: f64, x: f64) -> Self {
        self.r = r;
        self.x = x;
        self
    }
}

impl_identifiable!(Line, IdentifiableKind::Line);

#[derive(Debug, Clone)]
pub struct TwoWindingsTransformer {
    pub data: IdentifiableData,
    pub terminal1: Terminal,
    pub terminal2: Terminal,
    pub r: f64,
    pub x: f64,
    pub g: f64,
    pub b: f64,
    pub rated_u1: f64,
    pub rated_u2: f64,
    pub rated_s: f64,
}

impl TwoWindingsTransformer {
    pub fn new(id: impl Into<String>, terminal1: Terminal, terminal2: Terminal) -> Self {
        Self {
            data: IdentifiableData::new(id),
            terminal1,
            terminal2,
            r: 0.0,
            x: 0.0,
            g: 0.0,
            b: 0.0,
            rated_u1: f64::NAN,
            rated_u2: f64::NAN,
            rated_s: f64::NAN,
        }
    }
}

impl Default for TwoWindingsTransformer {
    fn default() -> Self {
        TwoWindingsTransformer::new("", Terminal::default(), Terminal::default())
    }
}

impl_identifiable!(TwoWindingsTransformer, IdentifiableKind::TwoWindingsTransformer);

/// A line made of two paired dangling lines, possibly in different sub-networks.
#[derive(Debug, Clone, Default)]
pub struct TieLine {
    pub data: IdentifiableData,
    pub subnetwork: Option<String>,
    pub dangling_line1: String,
    pub dangling_line2: String,
}

impl TieLine {
    pub fn new(
        id: impl Into<String>,
        dangling_line1: impl Into<String>,
        dangling_line2: impl Into<String>,
    ) -> Self {
        Self {
            data: IdentifiableData::new(id),
            subnetwork: None,
            dangling_line1: dangling_line1.into(),
            dangling_line2: dangling_line2.into(),
        }
    }
}

impl_identifiable!(TieLine, IdentifiableKind::TieLine);

#[derive(Debug, Clone)]
pub struct HvdcLine {
    pub data: IdentifiableData,
    pub subnetwork: Option<String>,
    pub r: f64,
    pub nominal_v: f64,
    pub active_power_setpoint: f64,
    pub max_p: f64,
    pub converters_mode: ConvertersMode,
    pub converter_station1: String,
    pub converter_station2: String,
}

impl HvdcLine {
    pub fn new(
        id: impl Into<String>,
        converter_station1: impl Into<String>,
        converter_station2: impl Into<String>,
    ) -> Self {
        Self {
            data: IdentifiableData::new(id),
            subnetwork: None,
            r: 0.0,
            nominal_v: f64::NAN,
            active_power_setpoint: 0.0,
            max_p: f64::NAN,
            converters_mode: ConvertersMode::default(),
            converter_station1: converter_station1.into(),
            converter_station2: converter_station2.into(),
        }
    }
}

impl Default for HvdcLine {
    fn default() -> Self {
        HvdcLine::new("", "", "")
    }
}

impl_identifiable!(HvdcLine, IdentifiableKind::HvdcLine);

#[derive(Debug, Clone, PartialEq)]
pub enum TrippingTarget {
    Switch { switch_id: String },
    Branch { branch_id: String, side: Side },
}

/// Action an overload management system takes when its limit is crossed.
#[derive(Debug, Clone, PartialEq)]
pub struct Tripping {
    pub key: String,
    pub name: Option<String>,
    pub current_limit: f64,
    pub open_action: bool,
    pub target: TrippingTarget,
}

#[derive(Debug, Clone)]
pub struct OverloadManagementSystem {
    pub data: IdentifiableData,
    pub substation: String,
    pub enabled: bool,
    pub monitored_element_id: String,
    pub monitored_side: Side,
    pub trippings: Vec<Tripping>,
}

impl OverloadManagementSystem {
    pub fn new(id: impl Into<String>, monitored_element_id: impl Into<String>, side: Side) -> Self {
        Self {
            data: IdentifiableData::new(id),
            substation: String::new(),
            enabled: true,
            monitored_element_id: monitored_element_id.into(),
            monitored_side: side,
            trippings: Vec::new(),
        }
    }
}

impl Default for OverloadManagementSystem {
    fn default() -> Self {
        OverloadManagementSystem::new("", "", Side::One)
    }
}

impl_identifiable!(OverloadManagementSystem, IdentifiableKind::OverloadManagementSystem);

/// Bounds on the voltage angle difference between two terminals. Not an
/// identifiable: it has an id but no aliases, properties or extensions.
#[derive(Debug, Clone, PartialEq)]
pub struct VoltageAngleLimit {
    pub id: String,
    pub from: TerminalRef,
    pub to: TerminalRef,
    pub low_limit: f64,
    pub high_limit: f64,
}

impl VoltageAngleLimit {
    pub fn new(id: impl Into<String>, from: TerminalRef, to: TerminalRef) -> Self {
        Self {
            id: id.into(),
            from,
            to,
            low_limit: f64::NAN,
            high_limit: f64::NAN,
        }
    }
}
