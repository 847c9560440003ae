//! Engine module: one discrete evaluation step of a definition.
//!
//! Evaluation never mutates definitions, only the state handed to it, so a
//! whole project can be borrowed immutably through an [`EvalContext`] while
//! one definition's state is being advanced.

use std::collections::BTreeMap;

use crate::clock::Clock;
use crate::config::EngineConfig;
use crate::definition::GateDefinition;
use crate::error::{Error, Result};
use crate::gate::{Gate, GateId};
use crate::state::{GateStates, InternalState, StateEntry};
use crate::value::Signal;

/// Everything evaluation may read: the definitions compounds resolve
/// against, the time source and the engine configuration.
#[derive(Debug, Clone, Copy)]
pub struct EvalContext<'a> {
    definitions: &'a BTreeMap<String, GateDefinition>,
    clock: &'a dyn Clock,
    config: &'a EngineConfig,
}

impl<'a> EvalContext<'a> {
    pub fn new(
        definitions: &'a BTreeMap<String, GateDefinition>,
        clock: &'a dyn Clock,
        config: &'a EngineConfig,
    ) -> Self {
        Self {
            definitions,
            clock,
            config,
        }
    }

    pub fn definition(&self, name: &str) -> Result<&'a GateDefinition> {
        self.definitions
            .get(name)
            .ok_or_else(|| Error::UnknownDefinition(name.to_string()))
    }

    pub fn clock(&self) -> &'a dyn Clock {
        self.clock
    }

    pub fn config(&self) -> &'a EngineConfig {
        self.config
    }
}

impl GateDefinition {
    /// Run one tick of this definition over `states`.
    ///
    /// Gates are visited in plan order. Each input is read from the
    /// predecessor's output computed this tick, else from its cached output,
    /// else it is [`Signal::Unknown`]. Unconnected pins read zero. Unrooted
    /// gates are skipped unless `all` is set. Returns the values collected at
    /// the sink.
    pub fn process_state(
        &self,
        ctx: &EvalContext<'_>,
        inputs: &[Signal],
        states: &mut GateStates,
        all: bool,
    ) -> Result<Vec<Signal>> {
        let plan = self.plan();
        let evaluated = |uid: &GateId| all || plan.is_rooted(uid);

        // Cut gates must have something to feed back on the first tick.
        for uid in plan.cut_gates.iter().filter(|uid| evaluated(uid)) {
            if states.get(uid).and_then(StateEntry::outputs).is_some() {
                continue;
            }
            let gate = self.resolve(uid)?;
            if gate.is_boundary() {
                continue;
            }
            let (internal, outputs) = self.initial_entry(ctx, gate)?;
            let healed = match states.remove(uid) {
                Some(entry) => entry.rebuild(|kept, _| (kept.or(internal), Some(outputs))),
                None => StateEntry::from_parts(internal, Some(outputs)),
            };
            if let Some(entry) = healed {
                states.insert(*uid, entry);
            }
        }

        let mut fresh: BTreeMap<GateId, Vec<Signal>> = BTreeMap::new();
        fresh.insert(self.source, inputs.to_vec());
        let mut collected = None;

        for uid in &plan.order {
            if *uid == self.source || !evaluated(uid) {
                continue;
            }
            let gate = self.resolve(uid)?;
            let gate_inputs = self.gather_inputs(gate, &fresh, states)?;

            if *uid == self.sink {
                collected = Some(gate_inputs);
                continue;
            }

            // A stateful gate without an entry gets one now. At the top
            // level a new entry also caches outputs for the editor.
            let (mut internal, cached, created) = match states.remove(uid) {
                Some(entry) => {
                    let (internal, cached) = entry.into_parts();
                    (internal, cached, false)
                }
                None => (gate.init_state(ctx)?, None, true),
            };
            let result = gate.advance(ctx, &gate_inputs, &mut internal);
            let cached = match &result {
                Ok(outputs) if cached.is_some() || (created && all) => Some(outputs.clone()),
                _ => cached,
            };
            if let Some(entry) = StateEntry::from_parts(internal, cached) {
                states.insert(*uid, entry);
            }
            fresh.insert(*uid, result?);
        }

        Ok(collected.unwrap_or_else(|| self.sink_gate().map(Gate::init_inputs).unwrap_or_default()))
    }

    /// Fresh state for an instance of this definition: an entry for every
    /// rooted gate that is stateful or cut, and nothing else.
    pub fn init_instance_state(&self, ctx: &EvalContext<'_>) -> Result<GateStates> {
        let plan = self.plan();
        let mut states = GateStates::new();
        for (uid, gate) in &self.gates {
            if gate.is_boundary() || !plan.is_rooted(uid) {
                continue;
            }
            let mut internal = gate.init_state(ctx)?;
            let outputs = if plan.is_cut(uid) {
                Some(gate.call(ctx, &gate.init_inputs(), internal.as_mut())?)
            } else {
                None
            };
            if let Some(entry) = StateEntry::from_parts(internal, outputs) {
                states.insert(*uid, entry);
            }
        }
        Ok(states)
    }

    /// Initial internal state and outputs of `gate` fed with zero inputs.
    pub(crate) fn initial_entry(
        &self,
        ctx: &EvalContext<'_>,
        gate: &Gate,
    ) -> Result<(Option<InternalState>, Vec<Signal>)> {
        let mut internal = gate.init_state(ctx)?;
        let outputs = gate.call(ctx, &gate.init_inputs(), internal.as_mut())?;
        Ok((internal, outputs))
    }

    fn gather_inputs(
        &self,
        gate: &Gate,
        fresh: &BTreeMap<GateId, Vec<Signal>>,
        states: &GateStates,
    ) -> Result<Vec<Signal>> {
        let uid = gate.uid();
        let mut values = gate.init_inputs();
        for predecessor in self.graph.direct_predecessors(&uid) {
            self.resolve(predecessor)?;
            let pairs = self
                .connections
                .get(&(*predecessor, uid))
                .ok_or_else(|| self.invalid_state(format!("edge {predecessor} -> {uid} has no pins")))?;
            let outputs = fresh
                .get(predecessor)
                .map(Vec::as_slice)
                .or_else(|| states.get(predecessor).and_then(StateEntry::outputs));
            for &(output, input) in pairs {
                let Some(width) = gate.input_widths().get(input).copied() else {
                    return Err(self.invalid_state(format!("gate {uid} has no input {input}")));
                };
                let value = outputs
                    .and_then(|outputs| outputs.get(output))
                    .filter(|value| value.fits(width))
                    .cloned()
                    .unwrap_or(Signal::Unknown);
                values[input] = value;
            }
        }
        Ok(values)
    }

    fn resolve(&self, uid: &GateId) -> Result<&Gate> {
        self.gates
            .get(uid)
            .ok_or_else(|| self.invalid_state(format!("could not find gate {uid}")))
    }

    pub(crate) fn invalid_state(&self, message: String) -> Error {
        Error::InvalidState {
            definition: self.name.clone(),
            message,
        }
    }
}
