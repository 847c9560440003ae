//! Gate definitions: the dataflow graph of one reusable component.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::OnceLock;

use crate::edit::EditEvent;
use crate::error::{Error, PinSide, Result};
use crate::gate::{Gate, GateId, GateKind};
use crate::graph::DirectedGraph;
use crate::invariant_ppt::{assert_invariant, CONNECTION_WIDTHS, SINGLE_DRIVER};
use crate::plan::EvalPlan;
use crate::state::{DefinitionState, InternalState, StateEntry};
use crate::value::{self, Signal};

/// Pin pairs `(output index, input index)` keyed by `(from uid, to uid)`.
pub type Connections = BTreeMap<(GateId, GateId), BTreeSet<(usize, usize)>>;

/// A gate output: `(uid, output index)`.
pub type FromPin = (GateId, usize);
/// A gate input: `(uid, input index)`.
pub type ToPin = (GateId, usize);

/// A named definition: gates, their connections and the definition's own
/// state. Its boundary is a Source gate (external inputs) and a Sink gate
/// (external outputs).
///
/// Edits that change the boundary or the gate table go through
/// [`Project`](crate::project::Project) so dependents stay in sync. Wiring
/// and state access are local and available here.
#[derive(Debug, Clone)]
pub struct GateDefinition {
    pub(crate) name: String,
    pub(crate) graph: DirectedGraph<GateId>,
    pub(crate) gates: BTreeMap<GateId, Gate>,
    pub(crate) connections: Connections,
    pub(crate) gate_types: BTreeMap<String, BTreeSet<GateId>>,
    pub(crate) state: DefinitionState,
    pub(crate) source: GateId,
    pub(crate) sink: GateId,
    plan: OnceLock<EvalPlan>,
}

impl GateDefinition {
    pub(crate) fn new(name: String, source: Gate, sink: Gate) -> Self {
        let mut definition = Self {
            name,
            graph: DirectedGraph::new(),
            gates: BTreeMap::new(),
            connections: Connections::new(),
            gate_types: BTreeMap::new(),
            state: DefinitionState {
                inputs: value::zeros(source.output_widths()),
                outputs: sink.init_inputs(),
                gates: BTreeMap::new(),
            },
            source: source.uid(),
            sink: sink.uid(),
            plan: OnceLock::new(),
        };
        definition.register(sink);
        definition.register(source);
        definition
    }

    fn register(&mut self, gate: Gate) {
        let uid = gate.uid();
        self.graph.add_vertex(uid);
        self.gate_types
            .entry(gate.type_name().to_string())
            .or_default()
            .insert(uid);
        self.gates.insert(uid, gate);
        self.invalidate_plan();
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn source(&self) -> GateId {
        self.source
    }

    pub fn sink(&self) -> GateId {
        self.sink
    }

    pub(crate) fn source_gate(&self) -> Option<&Gate> {
        self.gates.get(&self.source)
    }

    pub(crate) fn sink_gate(&self) -> Option<&Gate> {
        self.gates.get(&self.sink)
    }

    pub fn input_widths(&self) -> &[usize] {
        self.source_gate().map(Gate::output_widths).unwrap_or_default()
    }

    pub fn output_widths(&self) -> &[usize] {
        self.sink_gate().map(Gate::input_widths).unwrap_or_default()
    }

    pub fn input_labels(&self) -> &[String] {
        self.source_gate().map(Gate::output_labels).unwrap_or_default()
    }

    pub fn output_labels(&self) -> &[String] {
        self.sink_gate().map(Gate::input_labels).unwrap_or_default()
    }

    pub fn gates(&self) -> impl Iterator<Item = &Gate> {
        self.gates.values()
    }

    pub fn gate(&self, uid: GateId) -> Result<&Gate> {
        self.gates.get(&uid).ok_or_else(|| Error::UnknownGate {
            definition: self.name.clone(),
            uid,
        })
    }

    fn gate_mut(&mut self, uid: GateId) -> Result<&mut Gate> {
        let definition = &self.name;
        self.gates.get_mut(&uid).ok_or_else(|| Error::UnknownGate {
            definition: definition.clone(),
            uid,
        })
    }

    pub fn contains_gate(&self, uid: GateId) -> bool {
        self.gates.contains_key(&uid)
    }

    pub fn gate_types(&self) -> &BTreeMap<String, BTreeSet<GateId>> {
        &self.gate_types
    }

    /// Uids of every gate of the given type.
    pub fn instances_of(&self, type_name: &str) -> Vec<GateId> {
        self.gate_types
            .get(type_name)
            .map(|uids| uids.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn connections(&self) -> &Connections {
        &self.connections
    }

    pub fn graph(&self) -> &DirectedGraph<GateId> {
        &self.graph
    }

    pub fn predecessors(&self, uid: GateId) -> Vec<GateId> {
        self.graph.direct_predecessors(&uid).copied().collect()
    }

    pub fn successors(&self, uid: GateId) -> Vec<GateId> {
        self.graph.direct_successors(&uid).copied().collect()
    }

    pub fn state(&self) -> &DefinitionState {
        &self.state
    }

    /// The evaluation plan, compiled on first use after a topology change.
    pub fn plan(&self) -> &EvalPlan {
        self.plan
            .get_or_init(|| EvalPlan::compile(&self.graph, self.source, self.sink))
    }

    fn invalidate_plan(&mut self) {
        self.plan.take();
    }

    // Gate table. The project checks type dependencies before calling these.

    pub(crate) fn insert_gate(&mut self, gate: Gate, entry: Option<StateEntry>) -> Result<()> {
        let uid = gate.uid();
        if self.gates.contains_key(&uid) {
            return Err(Error::DuplicateGate {
                definition: self.name.clone(),
                uid,
            });
        }
        if gate.is_boundary() {
            return Err(Error::BoundaryGate {
                action: "add",
                gate_type: if matches!(gate.kind(), GateKind::Source) { "Source" } else { "Sink" },
            });
        }
        self.register(gate);
        if let Some(entry) = entry {
            self.state.gates.insert(uid, entry);
        }
        Ok(())
    }

    /// Remove a gate and every connection touching it.
    pub(crate) fn take_gate(&mut self, uid: GateId) -> Result<Gate> {
        self.check_not_boundary(uid, "remove")?;
        let gate = self.gate(uid)?;
        let type_name = gate.type_name().to_string();

        self.connections.retain(|(from, to), _| *from != uid && *to != uid);
        self.graph.remove_vertex(&uid);
        if let Some(uids) = self.gate_types.get_mut(&type_name) {
            uids.remove(&uid);
            if uids.is_empty() {
                self.gate_types.remove(&type_name);
            }
        }
        self.state.gates.remove(&uid);
        self.invalidate_plan();
        self.gates
            .remove(&uid)
            .ok_or_else(|| self.invalid_state(format!("gate {uid} vanished during removal")))
    }

    pub(crate) fn check_not_boundary(&self, uid: GateId, action: &'static str) -> Result<()> {
        if uid == self.source {
            return Err(Error::BoundaryGate {
                action,
                gate_type: "Source",
            });
        }
        if uid == self.sink {
            return Err(Error::BoundaryGate {
                action,
                gate_type: "Sink",
            });
        }
        Ok(())
    }

    // Connections.

    fn output_width(&self, (uid, index): FromPin) -> Result<usize> {
        self.gate(uid)?
            .output_widths()
            .get(index)
            .copied()
            .ok_or(Error::PinOutOfRange {
                uid,
                side: PinSide::Output,
                index,
            })
    }

    fn input_width(&self, (uid, index): ToPin) -> Result<usize> {
        self.gate(uid)?
            .input_widths()
            .get(index)
            .copied()
            .ok_or(Error::PinOutOfRange {
                uid,
                side: PinSide::Input,
                index,
            })
    }

    /// Connect an output to an input of equal width. Whatever drove the input
    /// before is disconnected first.
    pub fn add_connection(&mut self, from: FromPin, to: ToPin) -> Result<()> {
        let from_width = self.output_width(from)?;
        let to_width = self.input_width(to)?;
        if from_width != to_width {
            return Err(Error::WidthMismatch {
                from,
                to,
                from_width,
                to_width,
            });
        }

        match self.get_from_pair(to)? {
            Some(driver) if driver == from => return Ok(()),
            Some(driver) => self.unlink(driver, to),
            None => {}
        }

        let key = (from.0, to.0);
        if !self.connections.contains_key(&key) {
            self.graph.add_edge(from.0, to.0)?;
            self.invalidate_plan();
        }
        self.connections.entry(key).or_default().insert((from.1, to.1));

        assert_invariant(
            CONNECTION_WIDTHS,
            self.output_width(from).ok() == self.input_width(to).ok(),
            "Connected pins have equal widths",
            Some("add_connection"),
        );
        assert_invariant(
            SINGLE_DRIVER,
            self.drivers_of(to) == 1,
            "An input pin has exactly one driver",
            Some("add_connection"),
        );
        tracing::debug!(definition = %self.name, from = ?from, to = ?to, "connected");
        Ok(())
    }

    pub fn remove_connection(&mut self, from: FromPin, to: ToPin) -> Result<()> {
        self.output_width(from)?;
        self.input_width(to)?;
        let exists = self
            .connections
            .get(&(from.0, to.0))
            .is_some_and(|pairs| pairs.contains(&(from.1, to.1)));
        if !exists {
            return Err(Error::UnknownConnection { from, to });
        }
        self.unlink(from, to);
        Ok(())
    }

    // Both pins are known to exist.
    fn unlink(&mut self, from: FromPin, to: ToPin) {
        let key = (from.0, to.0);
        let Some(pairs) = self.connections.get_mut(&key) else {
            return;
        };
        pairs.remove(&(from.1, to.1));
        if pairs.is_empty() {
            self.connections.remove(&key);
            self.graph.remove_edge(&key.0, &key.1);
            self.invalidate_plan();
        }
    }

    fn drivers_of(&self, (uid, index): ToPin) -> usize {
        self.graph
            .direct_predecessors(&uid)
            .filter_map(|from| self.connections.get(&(*from, uid)))
            .flatten()
            .filter(|(_, input)| *input == index)
            .count()
    }

    /// Disconnect whatever drives an input.
    pub fn clear_gate_input(&mut self, to: ToPin) -> Result<()> {
        if let Some(from) = self.get_from_pair(to)? {
            self.unlink(from, to);
        }
        Ok(())
    }

    /// Disconnect every input an output drives.
    pub fn clear_gate_output(&mut self, from: FromPin) -> Result<()> {
        for to in self.get_to_pairs(from)? {
            self.unlink(from, to);
        }
        Ok(())
    }

    /// Drive a gate input from one of the definition's inputs.
    pub fn tie_input_to(&mut self, source_index: usize, to: ToPin) -> Result<()> {
        self.add_connection((self.source, source_index), to)
    }

    pub fn remove_input_to(&mut self, source_index: usize, to: ToPin) -> Result<()> {
        self.remove_connection((self.source, source_index), to)
    }

    /// Drive one of the definition's outputs from a gate output.
    pub fn tie_output_to(&mut self, from: FromPin, sink_index: usize) -> Result<()> {
        self.add_connection(from, (self.sink, sink_index))
    }

    pub fn remove_output_to(&mut self, from: FromPin, sink_index: usize) -> Result<()> {
        self.remove_connection(from, (self.sink, sink_index))
    }

    /// Feed one of the definition's inputs straight through to an output.
    pub fn tie_input_to_output(&mut self, source_index: usize, sink_index: usize) -> Result<()> {
        self.add_connection((self.source, source_index), (self.sink, sink_index))
    }

    pub fn remove_input_to_output(&mut self, source_index: usize, sink_index: usize) -> Result<()> {
        self.remove_connection((self.source, source_index), (self.sink, sink_index))
    }

    /// Disconnect everything fed by one of the definition's inputs.
    pub fn clear_input(&mut self, source_index: usize) -> Result<()> {
        self.clear_gate_output((self.source, source_index))
    }

    /// Disconnect whatever drives one of the definition's outputs.
    pub fn clear_output(&mut self, sink_index: usize) -> Result<()> {
        self.clear_gate_input((self.sink, sink_index))
    }

    /// Every input driven by `from`.
    pub fn get_to_pairs(&self, from: FromPin) -> Result<Vec<ToPin>> {
        self.output_width(from)?;
        let (uid, index) = from;
        let mut pins = Vec::new();
        for successor in self.graph.direct_successors(&uid) {
            if let Some(pairs) = self.connections.get(&(uid, *successor)) {
                pins.extend(
                    pairs
                        .iter()
                        .filter(|(output, _)| *output == index)
                        .map(|(_, input)| (*successor, *input)),
                );
            }
        }
        Ok(pins)
    }

    /// The output driving `to`, if any.
    pub fn get_from_pair(&self, to: ToPin) -> Result<Option<FromPin>> {
        self.input_width(to)?;
        let (uid, index) = to;
        for predecessor in self.graph.direct_predecessors(&uid) {
            let Some(pairs) = self.connections.get(&(*predecessor, uid)) else {
                continue;
            };
            if let Some((output, _)) = pairs.iter().find(|(_, input)| *input == index) {
                return Ok(Some((*predecessor, *output)));
            }
        }
        Ok(None)
    }

    // Pin index bookkeeping for boundary and instance edits. `remap` maps
    // an old pin index to its new one, or drops the connection with `None`.

    fn remap_incoming(&mut self, uid: GateId, remap: impl Fn(usize) -> Option<usize>) {
        let predecessors: Vec<GateId> = self.graph.direct_predecessors(&uid).copied().collect();
        for predecessor in predecessors {
            self.remap_pairs((predecessor, uid), |(output, input)| {
                remap(input).map(|input| (output, input))
            });
        }
    }

    fn remap_outgoing(&mut self, uid: GateId, remap: impl Fn(usize) -> Option<usize>) {
        let successors: Vec<GateId> = self.graph.direct_successors(&uid).copied().collect();
        for successor in successors {
            self.remap_pairs((uid, successor), |(output, input)| {
                remap(output).map(|output| (output, input))
            });
        }
    }

    fn remap_pairs(
        &mut self,
        key: (GateId, GateId),
        remap: impl Fn((usize, usize)) -> Option<(usize, usize)>,
    ) {
        let Some(pairs) = self.connections.get_mut(&key) else {
            return;
        };
        *pairs = pairs.iter().filter_map(|&pair| remap(pair)).collect();
        if pairs.is_empty() {
            self.connections.remove(&key);
            self.graph.remove_edge(&key.0, &key.1);
            self.invalidate_plan();
        }
    }

    fn source_gate_mut(&mut self) -> Result<&mut Gate> {
        let source = self.source;
        self.gate_mut(source)
    }

    fn sink_gate_mut(&mut self) -> Result<&mut Gate> {
        let sink = self.sink;
        self.gate_mut(sink)
    }

    fn check_index(what: &'static str, index: usize, len: usize) -> Result<()> {
        if index >= len {
            return Err(Error::IndexOutOfRange { what, index });
        }
        Ok(())
    }

    // Boundary edits. Each returns the event its dependents must apply.

    pub(crate) fn insert_input(&mut self, index: usize, width: usize, label: String) -> Result<EditEvent> {
        if index > self.input_widths().len() {
            return Err(Error::IndexOutOfRange { what: "input", index });
        }
        if width == 0 {
            return Err(Error::InvalidWidth(width));
        }
        let source = self.source;
        self.remap_outgoing(source, shift_right(index));
        self.source_gate_mut()?.insert_output(index, width, label.clone());
        self.state.inputs.insert(index, Signal::zero(width));
        Ok(EditEvent::InputInserted {
            definition: self.name.clone(),
            index,
            width,
            label,
        })
    }

    pub(crate) fn insert_output(&mut self, index: usize, width: usize, label: String) -> Result<EditEvent> {
        if index > self.output_widths().len() {
            return Err(Error::IndexOutOfRange { what: "output", index });
        }
        if width == 0 {
            return Err(Error::InvalidWidth(width));
        }
        let sink = self.sink;
        self.remap_incoming(sink, shift_right(index));
        self.sink_gate_mut()?.insert_input(index, width, label.clone());
        self.state.outputs.insert(index, Signal::zero(width));
        Ok(EditEvent::OutputInserted {
            definition: self.name.clone(),
            index,
            width,
            label,
        })
    }

    pub(crate) fn remove_input(&mut self, index: usize) -> Result<EditEvent> {
        Self::check_index("input", index, self.input_widths().len())?;
        let source = self.source;
        self.remap_outgoing(source, shift_left(index));
        self.source_gate_mut()?.remove_output(index);
        if index < self.state.inputs.len() {
            self.state.inputs.remove(index);
        }
        Ok(EditEvent::InputRemoved {
            definition: self.name.clone(),
            index,
        })
    }

    pub(crate) fn remove_output(&mut self, index: usize) -> Result<EditEvent> {
        Self::check_index("output", index, self.output_widths().len())?;
        let sink = self.sink;
        self.remap_incoming(sink, shift_left(index));
        self.sink_gate_mut()?.remove_input(index);
        if index < self.state.outputs.len() {
            self.state.outputs.remove(index);
        }
        Ok(EditEvent::OutputRemoved {
            definition: self.name.clone(),
            index,
        })
    }

    pub(crate) fn swap_inputs(&mut self, a: usize, b: usize) -> Result<EditEvent> {
        let len = self.input_widths().len();
        Self::check_index("input", a, len)?;
        Self::check_index("input", b, len)?;
        let source = self.source;
        self.remap_outgoing(source, swap(a, b));
        self.source_gate_mut()?.swap_outputs(a, b);
        if a < self.state.inputs.len() && b < self.state.inputs.len() {
            self.state.inputs.swap(a, b);
        }
        Ok(EditEvent::InputsSwapped {
            definition: self.name.clone(),
            a,
            b,
        })
    }

    pub(crate) fn swap_outputs(&mut self, a: usize, b: usize) -> Result<EditEvent> {
        let len = self.output_widths().len();
        Self::check_index("output", a, len)?;
        Self::check_index("output", b, len)?;
        let sink = self.sink;
        self.remap_incoming(sink, swap(a, b));
        self.sink_gate_mut()?.swap_inputs(a, b);
        if a < self.state.outputs.len() && b < self.state.outputs.len() {
            self.state.outputs.swap(a, b);
        }
        Ok(EditEvent::OutputsSwapped {
            definition: self.name.clone(),
            a,
            b,
        })
    }

    pub(crate) fn reshape_input(&mut self, index: usize, width: usize) -> Result<EditEvent> {
        Self::check_index("input", index, self.input_widths().len())?;
        if width == 0 {
            return Err(Error::InvalidWidth(width));
        }
        if self.input_widths()[index] != width {
            let source = self.source;
            self.remap_outgoing(source, drop_pin(index));
            self.source_gate_mut()?.set_output_width(index, width);
            if let Some(slot) = self.state.inputs.get_mut(index) {
                *slot = Signal::zero(width);
            }
        }
        Ok(EditEvent::InputReshaped {
            definition: self.name.clone(),
            index,
            width,
        })
    }

    pub(crate) fn reshape_output(&mut self, index: usize, width: usize) -> Result<EditEvent> {
        Self::check_index("output", index, self.output_widths().len())?;
        if width == 0 {
            return Err(Error::InvalidWidth(width));
        }
        if self.output_widths()[index] != width {
            let sink = self.sink;
            self.remap_incoming(sink, drop_pin(index));
            self.sink_gate_mut()?.set_input_width(index, width);
            if let Some(slot) = self.state.outputs.get_mut(index) {
                *slot = Signal::zero(width);
            }
        }
        Ok(EditEvent::OutputReshaped {
            definition: self.name.clone(),
            index,
            width,
        })
    }

    pub(crate) fn rename_input(&mut self, index: usize, label: String) -> Result<EditEvent> {
        Self::check_index("input", index, self.input_widths().len())?;
        self.source_gate_mut()?.set_output_label(index, label.clone());
        Ok(EditEvent::InputRenamed {
            definition: self.name.clone(),
            index,
            label,
        })
    }

    pub(crate) fn rename_output(&mut self, index: usize, label: String) -> Result<EditEvent> {
        Self::check_index("output", index, self.output_widths().len())?;
        self.sink_gate_mut()?.set_input_label(index, label.clone());
        Ok(EditEvent::OutputRenamed {
            definition: self.name.clone(),
            index,
            label,
        })
    }

    /// Bring every instance of the edited definition in line with `event`:
    /// re-index their connections and update their pin shape.
    pub(crate) fn apply_instance_edit(&mut self, event: &EditEvent) -> Result<()> {
        for uid in self.instances_of(event.definition()) {
            let gate = self.gate(uid)?;
            let (inputs, outputs) = (gate.input_widths().len(), gate.output_widths().len());
            match event {
                EditEvent::InputInserted { index, width, label, .. } => {
                    if *index > inputs {
                        return Err(self.invalid_state(format!("instance {uid} has {inputs} inputs")));
                    }
                    self.remap_incoming(uid, shift_right(*index));
                    self.gate_mut(uid)?.insert_input(*index, *width, label.clone());
                }
                EditEvent::OutputInserted { index, width, label, .. } => {
                    if *index > outputs {
                        return Err(self.invalid_state(format!("instance {uid} has {outputs} outputs")));
                    }
                    self.remap_outgoing(uid, shift_right(*index));
                    self.gate_mut(uid)?.insert_output(*index, *width, label.clone());
                }
                EditEvent::InputRemoved { index, .. } => {
                    Self::check_index("input", *index, inputs)?;
                    self.remap_incoming(uid, shift_left(*index));
                    self.gate_mut(uid)?.remove_input(*index);
                }
                EditEvent::OutputRemoved { index, .. } => {
                    Self::check_index("output", *index, outputs)?;
                    self.remap_outgoing(uid, shift_left(*index));
                    self.gate_mut(uid)?.remove_output(*index);
                }
                EditEvent::InputsSwapped { a, b, .. } => {
                    Self::check_index("input", (*a).max(*b), inputs)?;
                    self.remap_incoming(uid, swap(*a, *b));
                    self.gate_mut(uid)?.swap_inputs(*a, *b);
                }
                EditEvent::OutputsSwapped { a, b, .. } => {
                    Self::check_index("output", (*a).max(*b), outputs)?;
                    self.remap_outgoing(uid, swap(*a, *b));
                    self.gate_mut(uid)?.swap_outputs(*a, *b);
                }
                EditEvent::InputReshaped { index, width, .. } => {
                    Self::check_index("input", *index, inputs)?;
                    if self.gate(uid)?.input_widths()[*index] != *width {
                        self.remap_incoming(uid, drop_pin(*index));
                        self.gate_mut(uid)?.set_input_width(*index, *width);
                    }
                }
                EditEvent::OutputReshaped { index, width, .. } => {
                    Self::check_index("output", *index, outputs)?;
                    if self.gate(uid)?.output_widths()[*index] != *width {
                        self.remap_outgoing(uid, drop_pin(*index));
                        self.gate_mut(uid)?.set_output_width(*index, *width);
                    }
                }
                EditEvent::InputRenamed { index, label, .. } => {
                    Self::check_index("input", *index, inputs)?;
                    self.gate_mut(uid)?.set_input_label(*index, label.clone());
                }
                EditEvent::OutputRenamed { index, label, .. } => {
                    Self::check_index("output", *index, outputs)?;
                    self.gate_mut(uid)?.set_output_label(*index, label.clone());
                }
                EditEvent::GateRemoved { .. } | EditEvent::StateRepaired { .. } => {}
            }
        }
        Ok(())
    }

    /// Point every instance of `old` at `new`.
    pub(crate) fn rename_type(&mut self, old: &str, new: &str) {
        let Some(uids) = self.gate_types.remove(old) else {
            return;
        };
        for uid in &uids {
            if let Some(gate) = self.gates.get_mut(uid) {
                gate.rename_type(new);
            }
        }
        self.gate_types.insert(new.to_string(), uids);
    }

    // State access for the editor.

    /// The definition's external input values.
    pub fn inputs(&self) -> &[Signal] {
        &self.state.inputs
    }

    /// The definition's external output values as of the last tick.
    pub fn outputs(&self) -> &[Signal] {
        &self.state.outputs
    }

    /// Set the external inputs read by the next tick.
    pub fn set_inputs(&mut self, values: Vec<Signal>) -> Result<()> {
        check_values(&values, self.input_widths())?;
        self.state.inputs = values;
        Ok(())
    }

    /// A gate's inputs as of the last tick, read from its drivers.
    pub fn get_gate_inputs(&self, uid: GateId) -> Result<Vec<Signal>> {
        let gate = self.gate(uid)?;
        if uid == self.sink {
            return Ok(self.state.outputs.clone());
        }
        let mut values = gate.init_inputs();
        for predecessor in self.graph.direct_predecessors(&uid) {
            let outputs = self.get_gate_outputs(*predecessor)?;
            for &(output, input) in self.connections.get(&(*predecessor, uid)).into_iter().flatten() {
                if let (Some(slot), Some(value)) = (values.get_mut(input), outputs.get(output)) {
                    *slot = value.clone();
                }
            }
        }
        Ok(values)
    }

    /// A gate's outputs as of the last tick.
    pub fn get_gate_outputs(&self, uid: GateId) -> Result<Vec<Signal>> {
        self.gate(uid)?;
        if uid == self.source {
            return Ok(self.state.inputs.clone());
        }
        if uid == self.sink {
            return Ok(Vec::new());
        }
        self.state
            .gates
            .get(&uid)
            .and_then(StateEntry::outputs)
            .map(<[Signal]>::to_vec)
            .ok_or_else(|| self.invalid_state(format!("no cached outputs for gate {uid}")))
    }

    /// A gate's internal state. The Source and Sink report the definition's
    /// input and output values.
    pub fn get_gate_state(&self, uid: GateId) -> Result<Option<InternalState>> {
        self.gate(uid)?;
        if uid == self.source {
            return Ok(Some(InternalState::Held(self.state.inputs.clone())));
        }
        if uid == self.sink {
            return Ok(Some(InternalState::Held(self.state.outputs.clone())));
        }
        Ok(self.state.gates.get(&uid).and_then(StateEntry::internal).cloned())
    }

    /// Overwrite a gate's internal state. Only boundary gates, constants and
    /// compounds carry state; held values must fit the gate's pins.
    pub fn set_gate_state(&mut self, uid: GateId, state: InternalState) -> Result<()> {
        let gate = self.gate(uid)?;
        let kind = gate.kind().clone();
        let widths = gate.output_widths().to_vec();
        match (kind, state) {
            (GateKind::Source, InternalState::Held(values)) => self.set_inputs(values),
            (GateKind::Sink, InternalState::Held(values)) => {
                check_values(&values, self.output_widths())?;
                self.state.outputs = values;
                Ok(())
            }
            (GateKind::Constant, InternalState::Held(values)) => {
                check_values(&values, &widths)?;
                self.replace_internal(uid, InternalState::Held(values));
                Ok(())
            }
            (GateKind::Compound { .. }, nested @ InternalState::Nested(_)) => {
                self.replace_internal(uid, nested);
                Ok(())
            }
            (kind, _) => Err(Error::StateKind {
                uid,
                gate_type: kind.type_name().to_string(),
            }),
        }
    }

    pub(crate) fn replace_internal(&mut self, uid: GateId, internal: InternalState) {
        let entry = match self.state.gates.remove(&uid) {
            Some(entry) => entry.rebuild(|_, outputs| (Some(internal), outputs)),
            None => StateEntry::from_parts(Some(internal), None),
        };
        if let Some(entry) = entry {
            self.state.gates.insert(uid, entry);
        }
    }
}

fn check_values(values: &[Signal], widths: &[usize]) -> Result<()> {
    if values.len() != widths.len() {
        return Err(Error::ValueCount {
            expected: widths.len(),
            got: values.len(),
        });
    }
    match values.iter().zip(widths).position(|(value, &width)| !value.fits(width)) {
        Some(index) => Err(Error::ValueShape {
            index,
            width: widths[index],
        }),
        None => Ok(()),
    }
}

fn shift_right(index: usize) -> impl Fn(usize) -> Option<usize> {
    move |pin| Some(if pin >= index { pin + 1 } else { pin })
}

fn shift_left(index: usize) -> impl Fn(usize) -> Option<usize> {
    move |pin| match pin.cmp(&index) {
        std::cmp::Ordering::Less => Some(pin),
        std::cmp::Ordering::Equal => None,
        std::cmp::Ordering::Greater => Some(pin - 1),
    }
}

fn swap(a: usize, b: usize) -> impl Fn(usize) -> Option<usize> {
    move |pin| {
        Some(if pin == a {
            b
        } else if pin == b {
            a
        } else {
            pin
        })
    }
}

fn drop_pin(index: usize) -> impl Fn(usize) -> Option<usize> {
    move |pin| (pin != index).then_some(pin)
}
