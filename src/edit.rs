//! Structural edit events.
//!
//! A structural edit to a definition produces an [`EditEvent`]. The project
//! dispatches it to every definition that depends on the edited one:
//!
//! - direct dependents re-index connections on their instances and update
//!   the instances' pin shape ([`GateDefinition::apply_instance_edit`]);
//! - every transitive dependent fixes the cached state of each instance,
//!   however deeply nested ([`EditEvent::retarget_states`]).

use std::collections::BTreeSet;

use crate::definition::GateDefinition;
use crate::engine::EvalContext;
use crate::error::Result;
use crate::gate::{Gate, GateId};
use crate::state::{GateStates, InternalState, StateEntry};
use crate::value::{self, Signal};

/// A structural edit to one definition, as seen by its dependents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditEvent {
    InputInserted {
        definition: String,
        index: usize,
        width: usize,
        label: String,
    },
    OutputInserted {
        definition: String,
        index: usize,
        width: usize,
        label: String,
    },
    InputRemoved {
        definition: String,
        index: usize,
    },
    OutputRemoved {
        definition: String,
        index: usize,
    },
    InputsSwapped {
        definition: String,
        a: usize,
        b: usize,
    },
    OutputsSwapped {
        definition: String,
        a: usize,
        b: usize,
    },
    InputReshaped {
        definition: String,
        index: usize,
        width: usize,
    },
    OutputReshaped {
        definition: String,
        index: usize,
        width: usize,
    },
    InputRenamed {
        definition: String,
        index: usize,
        label: String,
    },
    OutputRenamed {
        definition: String,
        index: usize,
        label: String,
    },
    /// A gate left the definition; nested states must forget it.
    GateRemoved { definition: String, uid: GateId },
    /// Every instance's state is rebuilt from scratch.
    StateRepaired { definition: String },
}

impl EditEvent {
    /// The edited definition.
    pub fn definition(&self) -> &str {
        match self {
            EditEvent::InputInserted { definition, .. }
            | EditEvent::OutputInserted { definition, .. }
            | EditEvent::InputRemoved { definition, .. }
            | EditEvent::OutputRemoved { definition, .. }
            | EditEvent::InputsSwapped { definition, .. }
            | EditEvent::OutputsSwapped { definition, .. }
            | EditEvent::InputReshaped { definition, .. }
            | EditEvent::OutputReshaped { definition, .. }
            | EditEvent::InputRenamed { definition, .. }
            | EditEvent::OutputRenamed { definition, .. }
            | EditEvent::GateRemoved { definition, .. }
            | EditEvent::StateRepaired { definition } => definition,
        }
    }

    /// Returns a human-readable description (for logging).
    pub fn description(&self) -> &'static str {
        match self {
            EditEvent::InputInserted { .. } => "InputInserted",
            EditEvent::OutputInserted { .. } => "OutputInserted",
            EditEvent::InputRemoved { .. } => "InputRemoved",
            EditEvent::OutputRemoved { .. } => "OutputRemoved",
            EditEvent::InputsSwapped { .. } => "InputsSwapped",
            EditEvent::OutputsSwapped { .. } => "OutputsSwapped",
            EditEvent::InputReshaped { .. } => "InputReshaped",
            EditEvent::OutputReshaped { .. } => "OutputReshaped",
            EditEvent::InputRenamed { .. } => "InputRenamed",
            EditEvent::OutputRenamed { .. } => "OutputRenamed",
            EditEvent::GateRemoved { .. } => "GateRemoved",
            EditEvent::StateRepaired { .. } => "StateRepaired",
        }
    }

    /// Whether instance state anywhere below a dependent must change.
    pub fn touches_state(&self) -> bool {
        matches!(
            self,
            EditEvent::OutputInserted { .. }
                | EditEvent::OutputRemoved { .. }
                | EditEvent::OutputsSwapped { .. }
                | EditEvent::OutputReshaped { .. }
                | EditEvent::GateRemoved { .. }
                | EditEvent::StateRepaired { .. }
        )
    }

    /// Fix every instance entry of the edited definition inside `states`,
    /// which belong to `owner`. Entries of other compounds are descended
    /// into when their definition is in `affected` (the definitions that
    /// depend on the edited one). Unrelated entries are left untouched.
    pub(crate) fn retarget_states(
        &self,
        ctx: &EvalContext<'_>,
        owner: &GateDefinition,
        states: &mut GateStates,
        affected: &BTreeSet<String>,
    ) -> Result<()> {
        let uids: Vec<GateId> = states.keys().copied().collect();
        for uid in uids {
            let Some(gate) = owner.gates.get(&uid) else {
                continue;
            };
            let Some(name) = gate.definition_name() else {
                continue;
            };
            if name == self.definition() {
                if let Some(entry) = states.remove(&uid) {
                    if let Some(entry) = self.fix_instance_entry(ctx, gate, entry)? {
                        states.insert(uid, entry);
                    }
                }
            } else if affected.contains(name) {
                let inner = ctx.definition(name)?;
                let Some(entry) = states.remove(&uid) else {
                    continue;
                };
                let (mut internal, outputs) = entry.into_parts();
                if let Some(nested) = internal.as_mut().and_then(InternalState::as_nested_mut) {
                    self.retarget_states(ctx, inner, nested, affected)?;
                }
                if let Some(entry) = StateEntry::from_parts(internal, outputs) {
                    states.insert(uid, entry);
                }
            }
        }
        Ok(())
    }

    fn fix_instance_entry(
        &self,
        ctx: &EvalContext<'_>,
        gate: &Gate,
        entry: StateEntry,
    ) -> Result<Option<StateEntry>> {
        let (mut internal, mut outputs) = entry.into_parts();
        match self {
            EditEvent::OutputInserted { index, width, .. } => {
                if let Some(outputs) = outputs.as_mut().filter(|o| *index <= o.len()) {
                    outputs.insert(*index, Signal::zero(*width));
                }
            }
            EditEvent::OutputRemoved { index, .. } => {
                if let Some(outputs) = outputs.as_mut().filter(|o| *index < o.len()) {
                    outputs.remove(*index);
                }
            }
            EditEvent::OutputsSwapped { a, b, .. } => {
                if let Some(outputs) = outputs.as_mut().filter(|o| *a < o.len() && *b < o.len()) {
                    outputs.swap(*a, *b);
                }
            }
            EditEvent::OutputReshaped { index, width, .. } => {
                if let Some(slot) = outputs.as_mut().and_then(|o| o.get_mut(*index)) {
                    *slot = Signal::zero(*width);
                }
            }
            EditEvent::GateRemoved { uid, .. } => {
                if let Some(nested) = internal.as_mut().and_then(InternalState::as_nested_mut) {
                    nested.remove(uid);
                }
            }
            EditEvent::StateRepaired { definition } => {
                let definition = ctx.definition(definition)?;
                let mut nested = definition.init_instance_state(ctx)?;
                if outputs.is_some() {
                    let inputs = value::zeros(definition.input_widths());
                    outputs = Some(definition.process_state(ctx, &inputs, &mut nested, false)?);
                }
                internal = Some(InternalState::Nested(nested));
            }
            _ => {}
        }
        tracing::trace!(uid = %gate.uid(), event = self.description(), "retargeted instance state");
        Ok(StateEntry::from_parts(internal, outputs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn description_and_target() {
        let event = EditEvent::OutputsSwapped {
            definition: "Latch".to_string(),
            a: 0,
            b: 1,
        };
        assert_eq!(event.definition(), "Latch");
        assert_eq!(event.description(), "OutputsSwapped");
        assert!(event.touches_state());
    }

    #[test]
    fn input_edits_leave_state_alone() {
        let event = EditEvent::InputInserted {
            definition: "Latch".to_string(),
            index: 0,
            width: 1,
            label: String::new(),
        };
        assert!(!event.touches_state());
    }
}
