//! Per-gate state carried across ticks.

use std::collections::BTreeMap;

use crate::gate::GateId;
use crate::value::Signal;

/// State entries keyed by gate uid. A gate without an entry is stateless and
/// its outputs are recomputed every tick.
pub type GateStates = BTreeMap<GateId, StateEntry>;

/// A gate's own persistent state.
#[derive(Debug, Clone, PartialEq)]
pub enum InternalState {
    /// Values held by a `Constant`.
    Held(Vec<Signal>),
    /// The inner state of a compound instance.
    Nested(GateStates),
}

impl InternalState {
    /// Nested states with no entries carry nothing.
    pub fn is_empty(&self) -> bool {
        match self {
            InternalState::Held(_) => false,
            InternalState::Nested(states) => states.is_empty(),
        }
    }

    pub fn as_nested_mut(&mut self) -> Option<&mut GateStates> {
        match self {
            InternalState::Nested(states) => Some(states),
            InternalState::Held(_) => None,
        }
    }
}

/// What a definition remembers about one gate.
#[derive(Debug, Clone, PartialEq)]
pub enum StateEntry {
    /// Stateful gate whose outputs need not be cached.
    Internal(InternalState),
    /// Outputs cached for consumers that run before the gate.
    CutOutput(Vec<Signal>),
    Both {
        internal: InternalState,
        outputs: Vec<Signal>,
    },
}

impl StateEntry {
    /// Build an entry, or `None` when there is nothing to keep.
    pub fn from_parts(internal: Option<InternalState>, outputs: Option<Vec<Signal>>) -> Option<Self> {
        let internal = internal.filter(|state| !state.is_empty());
        match (internal, outputs) {
            (None, None) => None,
            (Some(internal), None) => Some(StateEntry::Internal(internal)),
            (None, Some(outputs)) => Some(StateEntry::CutOutput(outputs)),
            (Some(internal), Some(outputs)) => Some(StateEntry::Both { internal, outputs }),
        }
    }

    pub fn into_parts(self) -> (Option<InternalState>, Option<Vec<Signal>>) {
        match self {
            StateEntry::Internal(internal) => (Some(internal), None),
            StateEntry::CutOutput(outputs) => (None, Some(outputs)),
            StateEntry::Both { internal, outputs } => (Some(internal), Some(outputs)),
        }
    }

    pub fn internal(&self) -> Option<&InternalState> {
        match self {
            StateEntry::Internal(internal) | StateEntry::Both { internal, .. } => Some(internal),
            StateEntry::CutOutput(_) => None,
        }
    }

    pub fn outputs(&self) -> Option<&[Signal]> {
        match self {
            StateEntry::CutOutput(outputs) | StateEntry::Both { outputs, .. } => Some(outputs),
            StateEntry::Internal(_) => None,
        }
    }

    /// Rebuild the entry through its parts; `None` means it should be dropped.
    pub fn rebuild(
        self,
        f: impl FnOnce(Option<InternalState>, Option<Vec<Signal>>) -> (Option<InternalState>, Option<Vec<Signal>>),
    ) -> Option<Self> {
        let (internal, outputs) = self.into_parts();
        let (internal, outputs) = f(internal, outputs);
        Self::from_parts(internal, outputs)
    }
}

/// Boundary values and gate entries of one definition.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DefinitionState {
    /// The Source's outputs: the definition's external inputs.
    pub inputs: Vec<Signal>,
    /// The Sink's last collected inputs: the definition's external outputs.
    pub outputs: Vec<Signal>,
    pub gates: GateStates,
}
