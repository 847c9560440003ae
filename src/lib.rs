//! Hierarchical digital-logic simulation.
//!
//! A [`Project`] holds named gate definitions. Each definition is a dataflow
//! graph of gates between a Source (its inputs) and a Sink (its outputs);
//! gates are NAND, a handful of builtins, or instances of other definitions.
//! Ticking a definition evaluates every gate once in a cycle-aware order,
//! reading feedback from the previous tick.

pub mod clock;
pub mod config;
pub mod definition;
pub mod edit;
pub mod engine;
pub mod error;
pub mod gate;
pub mod graph;
#[doc(hidden)]
pub mod harness;
#[doc(hidden)]
pub mod invariant_ppt;
pub mod persist;
pub mod plan;
pub mod project;
pub mod state;
pub mod value;

pub use clock::{Clock, FixedClock, SystemClock};
pub use config::EngineConfig;
pub use definition::{FromPin, GateDefinition, ToPin};
pub use edit::EditEvent;
pub use error::{Error, Result};
pub use gate::{Gate, GateId, GateKind};
pub use persist::ProjectRecord;
pub use project::Project;
pub use state::{DefinitionState, InternalState, StateEntry};
pub use value::Signal;
