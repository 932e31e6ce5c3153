//! # grit-core: network model for the GRIT interchange engine
//!
//! An in-memory bus-breaker network model: substations, voltage levels,
//! buses, switches, injections, branches, tie lines, HVDC lines and
//! overload management systems, with at most one level of sub-networks.
//!
//! Every object is [`Identifiable`]: a unique id, an optional name, a
//! fictitious flag, aliases, properties and extensions. Objects enter a
//! [`Network`] through [`Network::add`], which validates the references the
//! object makes before committing it.
//!
//! ```
//! use grit_core::*;
//!
//! let mut network = Network::new("sample", "test");
//! network.add(Container::root(), Substation::new("S1"))?;
//! network.add(Container::substation("S1"), VoltageLevel::new("VL1", 400.0))?;
//! network.add(Container::voltage_level("VL1"), Bus::new("B1"))?;
//! network.add(
//!     Container::voltage_level("VL1"),
//!     Generator::new("G1", Terminal::new("VL1", "B1")).with_target_p(100.0),
//! )?;
//!
//! assert_eq!(network.kind_of("G1"), Some(IdentifiableKind::Generator));
//! # Ok::<(), GritError>(())
//! ```

pub mod adder;
pub mod diagnostics;
pub mod equipment;
pub mod error;
pub mod identifiable;
pub mod network;
pub mod topology;

pub use adder::{Adder, Container, NetworkElement};
pub use diagnostics::{DiagnosticIssue, Diagnostics, Severity};
pub use equipment::*;
pub use error::{GritError, GritResult};
pub use identifiable::{Alias, Extension, Identifiable, IdentifiableData, IdentifiableKind};
pub use network::Network;
pub use topology::{bus_branch_view, BusBranchView, MergedBus};
