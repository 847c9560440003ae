//! Projects: a namespace of definitions and the cascades between them.
//!
//! The project owns every definition, the type-dependency graph (an edge
//! `D -> T` means `D` contains a gate of type `T`; builtins are vertices
//! too), the uid allocator, the clock and the engine configuration.
//! Anything that must stay consistent across definitions goes through here.

use std::collections::BTreeMap;
use std::mem;
use std::sync::Arc;

use tracing::{debug, trace};

use crate::clock::{Clock, SystemClock};
use crate::config::EngineConfig;
use crate::definition::GateDefinition;
use crate::edit::EditEvent;
use crate::engine::EvalContext;
use crate::error::{Error, Result};
use crate::gate::{self, is_builtin, Gate, GateId, UidAllocator, BUILTIN_TYPES};
use crate::graph::DirectedGraph;
use crate::invariant_ppt::{assert_invariant, EDIT_CASCADE, STATE_SHAPE, TYPE_GRAPH_ACYCLIC};
use crate::state::{DefinitionState, GateStates, StateEntry};
use crate::value::{self, Signal};

#[derive(Debug, Clone)]
pub struct Project {
    name: String,
    pub(crate) definitions: BTreeMap<String, GateDefinition>,
    pub(crate) type_graph: DirectedGraph<String>,
    pub(crate) uids: UidAllocator,
    clock: Arc<dyn Clock>,
    config: EngineConfig,
}

impl Project {
    pub fn new(name: impl Into<String>) -> Self {
        let mut type_graph = DirectedGraph::new();
        for builtin in BUILTIN_TYPES {
            type_graph.add_vertex(builtin.to_string());
        }
        Self {
            name: name.into(),
            definitions: BTreeMap::new(),
            type_graph,
            uids: UidAllocator::default(),
            clock: Arc::new(SystemClock),
            config: EngineConfig::default(),
        }
    }

    /// Replace the time source read by `Datetime` gates.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_config(mut self, config: EngineConfig) -> Result<Self> {
        config.validate()?;
        self.config = config;
        Ok(self)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn type_graph(&self) -> &DirectedGraph<String> {
        &self.type_graph
    }

    /// Builtin type names followed by every definition name.
    pub fn gate_names(&self) -> Vec<String> {
        BUILTIN_TYPES
            .iter()
            .map(|name| name.to_string())
            .chain(self.definitions.keys().cloned())
            .collect()
    }

    pub fn definitions(&self) -> impl Iterator<Item = &GateDefinition> {
        self.definitions.values()
    }

    pub fn definition(&self, name: &str) -> Result<&GateDefinition> {
        self.definitions
            .get(name)
            .ok_or_else(|| Error::UnknownDefinition(name.to_string()))
    }

    /// Mutable access for wiring and state writes. Boundary and gate-table
    /// edits are on [`Project`] so that dependents follow.
    pub fn definition_mut(&mut self, name: &str) -> Result<&mut GateDefinition> {
        self.definitions
            .get_mut(name)
            .ok_or_else(|| Error::UnknownDefinition(name.to_string()))
    }

    pub(crate) fn context(&self) -> EvalContext<'_> {
        EvalContext::new(&self.definitions, self.clock.as_ref(), &self.config)
    }

    // Definitions.

    pub fn define(&mut self, name: &str, input_widths: Vec<usize>, output_widths: Vec<usize>) -> Result<()> {
        self.define_labeled(name, input_widths, output_widths, Vec::new(), Vec::new())
    }

    /// Define with pin labels; missing labels are blank.
    pub fn define_labeled(
        &mut self,
        name: &str,
        input_widths: Vec<usize>,
        output_widths: Vec<usize>,
        input_labels: Vec<String>,
        output_labels: Vec<String>,
    ) -> Result<()> {
        if is_builtin(name) || self.definitions.contains_key(name) {
            return Err(Error::DuplicateDefinition(name.to_string()));
        }
        let source = Gate::source(self.uids.allocate(), input_widths, Some(input_labels))?;
        let sink = Gate::sink(self.uids.allocate(), output_widths, Some(output_labels))?;
        self.insert_definition(GateDefinition::new(name.to_string(), source, sink));
        debug!(definition = name, "defined");
        Ok(())
    }

    pub(crate) fn insert_definition(&mut self, definition: GateDefinition) {
        self.type_graph.add_vertex(definition.name().to_string());
        self.definitions.insert(definition.name().to_string(), definition);
    }

    /// Delete a definition. If other definitions contain instances of it,
    /// `force` removes those instances; without it this fails with
    /// [`Error::HasDependents`] and nothing changes.
    pub fn delete_definition(&mut self, name: &str, force: bool) -> Result<()> {
        if is_builtin(name) {
            return Err(Error::BuiltinGate(name.to_string()));
        }
        self.definition(name)?;
        let dependents = self.dependents_of(name);
        if !dependents.is_empty() && !force {
            return Err(Error::HasDependents {
                name: name.to_string(),
                dependents,
            });
        }
        for dependent in &dependents {
            self.remove_gate_type(dependent, name)?;
        }
        self.definitions.remove(name);
        self.type_graph.remove_vertex(&name.to_string());
        debug!(definition = name, forced = force, "deleted");
        Ok(())
    }

    pub fn rename_definition(&mut self, name: &str, new_name: &str) -> Result<()> {
        if is_builtin(name) {
            return Err(Error::BuiltinGate(name.to_string()));
        }
        self.definition(name)?;
        if is_builtin(new_name) || self.definitions.contains_key(new_name) {
            return Err(Error::DuplicateDefinition(new_name.to_string()));
        }
        for dependent in self.dependents_of(name) {
            if let Some(definition) = self.definitions.get_mut(&dependent) {
                definition.rename_type(name, new_name);
            }
        }
        if let Some(mut definition) = self.definitions.remove(name) {
            definition.name = new_name.to_string();
            self.definitions.insert(new_name.to_string(), definition);
        }
        self.type_graph
            .relabel_vertex(&name.to_string(), new_name.to_string())?;
        debug!(from = name, to = new_name, "renamed definition");
        Ok(())
    }

    /// Whether `from` containing a gate of type `to` would make a type
    /// contain itself.
    pub fn check_dependency(&self, from: &str, to: &str) -> bool {
        self.type_graph.check_edge(&from.to_string(), &to.to_string())
    }

    /// Definitions that directly contain instances of `name`.
    pub fn dependents_of(&self, name: &str) -> Vec<String> {
        self.type_graph
            .direct_predecessors(&name.to_string())
            .cloned()
            .collect()
    }

    // Gate factories. Each allocates a fresh uid.

    pub fn nand(&mut self) -> Gate {
        Gate::nand(self.uids.allocate())
    }

    pub fn constant(&mut self, width: usize) -> Result<Gate> {
        Gate::constant(self.uids.allocate(), width)
    }

    pub fn reshaper(&mut self, input_widths: Vec<usize>, output_widths: Vec<usize>) -> Result<Gate> {
        Gate::reshaper(self.uids.allocate(), input_widths, output_widths)
    }

    pub fn datetime(&mut self) -> Result<Gate> {
        Gate::datetime(self.uids.allocate(), self.config.datetime_width)
    }

    /// An instance of a definition.
    pub fn instance(&mut self, name: &str) -> Result<Gate> {
        let definition = self
            .definitions
            .get(name)
            .ok_or_else(|| Error::UnknownDefinition(name.to_string()))?;
        Ok(Gate::instance_of(self.uids.allocate(), definition))
    }

    /// A gate of any type by name, with default shape for builtins that
    /// take one: a 1-bit Constant and a 1-to-1 Reshaper.
    pub fn instantiate(&mut self, type_name: &str) -> Result<Gate> {
        match type_name {
            gate::NAND => Ok(self.nand()),
            gate::CONSTANT => self.constant(1),
            gate::RESHAPER => self.reshaper(vec![1], vec![1]),
            gate::DATETIME => self.datetime(),
            gate::SOURCE => Err(Error::BoundaryGate {
                action: "instantiate",
                gate_type: "Source",
            }),
            gate::SINK => Err(Error::BoundaryGate {
                action: "instantiate",
                gate_type: "Sink",
            }),
            name => self.instance(name),
        }
    }

    // Gate table.

    /// Add a gate to a definition, rejecting any gate type that would make
    /// the definition contain itself. The uid must come from this project
    /// and be unused, and an instance must match its definition's pins.
    pub fn add_gate(&mut self, definition: &str, gate: Gate) -> Result<GateId> {
        let uid = gate.uid();
        let type_name = gate.type_name().to_string();
        let target = self.definition(definition)?;
        if gate.is_boundary() {
            return Err(Error::BoundaryGate {
                action: "add",
                gate_type: if type_name == gate::SOURCE { "Source" } else { "Sink" },
            });
        }
        if !is_builtin(&type_name) && !self.definitions.contains_key(&type_name) {
            return Err(Error::UnknownDefinition(type_name));
        }
        if target.contains_gate(uid) {
            return Err(Error::DuplicateGate {
                definition: definition.to_string(),
                uid,
            });
        }
        if !self.uids.is_allocated(uid) {
            return Err(Error::ForeignUid(uid));
        }
        if let Some(owner) = self.definitions.values().find(|d| d.contains_gate(uid)) {
            return Err(Error::DuplicateGate {
                definition: owner.name().to_string(),
                uid,
            });
        }
        if let Some(inner) = gate.definition_name().and_then(|name| self.definitions.get(name)) {
            if !mirrors(&gate, inner) {
                return Err(Error::StaleInstance { uid, gate_type: type_name });
            }
        }
        let new_type = !target.gate_types().contains_key(&type_name);
        if new_type && self.check_dependency(definition, &type_name) {
            return Err(Error::RecursiveDefinition {
                definition: definition.to_string(),
                gate_type: type_name,
            });
        }

        let ctx = self.context();
        let (internal, outputs) = ctx.definition(definition)?.initial_entry(&ctx, &gate)?;
        let entry = StateEntry::from_parts(internal, Some(outputs));
        self.definition_mut(definition)?.insert_gate(gate, entry)?;

        if new_type {
            self.type_graph
                .add_edge(definition.to_string(), type_name.clone())?;
            assert_invariant(
                TYPE_GRAPH_ACYCLIC,
                !self.type_graph.reaches(&type_name, &definition.to_string()),
                "Type dependencies stay acyclic",
                Some("add_gate"),
            );
        }
        debug!(definition, uid = %uid, gate_type = %type_name, "added gate");
        Ok(uid)
    }

    /// Remove a gate, its connections and its state everywhere it is nested.
    pub fn remove_gate(&mut self, definition: &str, uid: GateId) -> Result<()> {
        let target = self.definition_mut(definition)?;
        let gate = target.take_gate(uid)?;
        let type_name = gate.type_name().to_string();
        if !target.gate_types().contains_key(&type_name) {
            self.type_graph
                .remove_edge(&definition.to_string(), &type_name);
        }
        debug!(definition, uid = %uid, "removed gate");
        self.propagate(EditEvent::GateRemoved {
            definition: definition.to_string(),
            uid,
        })
    }

    /// Remove every gate of one type from a definition.
    pub fn remove_gate_type(&mut self, definition: &str, type_name: &str) -> Result<()> {
        if type_name == gate::SOURCE || type_name == gate::SINK {
            return Err(Error::BoundaryGate {
                action: "remove",
                gate_type: if type_name == gate::SOURCE { "Source" } else { "Sink" },
            });
        }
        for uid in self.definition(definition)?.instances_of(type_name) {
            self.remove_gate(definition, uid)?;
        }
        Ok(())
    }

    /// Copy a gate and its current state under a fresh uid.
    pub fn duplicate_gate(&mut self, definition: &str, uid: GateId) -> Result<GateId> {
        let source = self.definition(definition)?;
        source.check_not_boundary(uid, "duplicate")?;
        let original = source.gate(uid)?.clone();
        let entry = source.state.gates.get(&uid).cloned();

        let copy = original.duplicate(self.uids.allocate());
        let copy_uid = copy.uid();
        self.definition_mut(definition)?.insert_gate(copy, entry)?;
        debug!(definition, original = %uid, copy = %copy_uid, "duplicated gate");
        Ok(copy_uid)
    }

    // Boundary edits. Each edits the definition, then its dependents.

    fn edit(
        &mut self,
        definition: &str,
        f: impl FnOnce(&mut GateDefinition) -> Result<EditEvent>,
    ) -> Result<()> {
        if is_builtin(definition) {
            return Err(Error::BuiltinGate(definition.to_string()));
        }
        let target = self.definition(definition)?;
        for dependent in self.dependents_of(definition) {
            let owner = self.definition(&dependent)?;
            for uid in owner.instances_of(definition) {
                let instance = owner.gate(uid)?;
                if !mirrors(instance, target) {
                    return Err(Error::StaleInstance {
                        uid,
                        gate_type: definition.to_string(),
                    });
                }
            }
        }
        let event = f(self.definition_mut(definition)?)?;
        debug!(definition, event = event.description(), "edited boundary");
        self.propagate(event)
    }

    pub fn insert_input(&mut self, definition: &str, index: usize, width: usize, label: &str) -> Result<()> {
        self.edit(definition, |d| d.insert_input(index, width, label.to_string()))
    }

    pub fn insert_output(&mut self, definition: &str, index: usize, width: usize, label: &str) -> Result<()> {
        self.edit(definition, |d| d.insert_output(index, width, label.to_string()))
    }

    pub fn append_input(&mut self, definition: &str, width: usize) -> Result<()> {
        let index = self.definition(definition)?.input_widths().len();
        self.insert_input(definition, index, width, "")
    }

    pub fn append_output(&mut self, definition: &str, width: usize) -> Result<()> {
        let index = self.definition(definition)?.output_widths().len();
        self.insert_output(definition, index, width, "")
    }

    pub fn remove_input(&mut self, definition: &str, index: usize) -> Result<()> {
        self.edit(definition, |d| d.remove_input(index))
    }

    pub fn remove_output(&mut self, definition: &str, index: usize) -> Result<()> {
        self.edit(definition, |d| d.remove_output(index))
    }

    /// Remove the last input.
    pub fn pop_input(&mut self, definition: &str) -> Result<()> {
        match self.definition(definition)?.input_widths().len().checked_sub(1) {
            Some(index) => self.remove_input(definition, index),
            None => Err(Error::IndexOutOfRange { what: "input", index: 0 }),
        }
    }

    /// Remove the last output.
    pub fn pop_output(&mut self, definition: &str) -> Result<()> {
        match self.definition(definition)?.output_widths().len().checked_sub(1) {
            Some(index) => self.remove_output(definition, index),
            None => Err(Error::IndexOutOfRange { what: "output", index: 0 }),
        }
    }

    pub fn swap_inputs(&mut self, definition: &str, a: usize, b: usize) -> Result<()> {
        self.edit(definition, |d| d.swap_inputs(a, b))
    }

    pub fn swap_outputs(&mut self, definition: &str, a: usize, b: usize) -> Result<()> {
        self.edit(definition, |d| d.swap_outputs(a, b))
    }

    /// Change an input's width; connections on it are dropped.
    pub fn reshape_input(&mut self, definition: &str, index: usize, width: usize) -> Result<()> {
        self.edit(definition, |d| d.reshape_input(index, width))
    }

    /// Change an output's width; connections on it are dropped.
    pub fn reshape_output(&mut self, definition: &str, index: usize, width: usize) -> Result<()> {
        self.edit(definition, |d| d.reshape_output(index, width))
    }

    pub fn rename_input(&mut self, definition: &str, index: usize, label: &str) -> Result<()> {
        self.edit(definition, |d| d.rename_input(index, label.to_string()))
    }

    pub fn rename_output(&mut self, definition: &str, index: usize, label: &str) -> Result<()> {
        self.edit(definition, |d| d.rename_output(index, label.to_string()))
    }

    /// Dispatch an edit of one definition to everything depending on it.
    fn propagate(&mut self, event: EditEvent) -> Result<()> {
        let name = event.definition().to_string();
        let direct = self.dependents_of(&name);
        for dependent in &direct {
            self.definition_mut(dependent)?.apply_instance_edit(&event)?;
        }

        if let Ok(edited) = self.definition(&name) {
            let (inputs, outputs) = (edited.input_widths(), edited.output_widths());
            assert_invariant(
                EDIT_CASCADE,
                direct.iter().filter_map(|d| self.definitions.get(d)).all(|d| {
                    d.instances_of(&name).iter().all(|uid| {
                        d.gate(*uid).is_ok_and(|g| g.input_widths() == inputs && g.output_widths() == outputs)
                    })
                }),
                "Instances mirror their definition's boundary",
                Some("propagate"),
            );
        }

        if event.touches_state() {
            let affected = self.type_graph.all_predecessors(&name);
            for dependent in &affected {
                let mut states = mem::take(&mut self.definition_mut(dependent)?.state.gates);
                let ctx = self.context();
                let result = ctx
                    .definition(dependent)
                    .and_then(|owner| event.retarget_states(&ctx, owner, &mut states, &affected));
                self.definition_mut(dependent)?.state.gates = states;
                result?;
            }
        }
        trace!(definition = %name, event = event.description(), "propagated edit");
        Ok(())
    }

    // Evaluation and state.

    /// Advance a definition by one tick and return its new outputs.
    pub fn tick(&mut self, name: &str) -> Result<Vec<Signal>> {
        let all = self.config.tick_unrooted;
        let mut state = mem::take(&mut self.definition_mut(name)?.state);
        trace!(definition = name, "tick start");

        let ctx = self.context();
        let result = ctx
            .definition(name)
            .and_then(|definition| definition.process_state(&ctx, &state.inputs, &mut state.gates, all));
        if let Ok(outputs) = &result {
            state.outputs = outputs.clone();
        }

        let definition = self.definition_mut(name)?;
        definition.state = state;
        assert_invariant(
            STATE_SHAPE,
            value::matches_widths(&definition.state.outputs, definition.output_widths()),
            "Outputs fit the sink's pins",
            Some("tick"),
        );
        trace!(definition = name, ok = result.is_ok(), "tick complete");
        result
    }

    pub fn set_inputs(&mut self, name: &str, values: Vec<Signal>) -> Result<()> {
        self.definition_mut(name)?.set_inputs(values)
    }

    /// Put one gate back into its initial state.
    pub fn reset_gate_state(&mut self, definition: &str, uid: GateId) -> Result<()> {
        let ctx = self.context();
        let target = ctx.definition(definition)?;
        let gate = target.gate(uid)?;
        if uid == target.source() || uid == target.sink() {
            let is_source = uid == target.source();
            let inputs = value::zeros(target.input_widths());
            let outputs = value::zeros(target.output_widths());
            let state = &mut self.definition_mut(definition)?.state;
            if is_source {
                state.inputs = inputs;
            } else {
                state.outputs = outputs;
            }
            return Ok(());
        }
        let (internal, outputs) = target.initial_entry(&ctx, gate)?;
        let entry = StateEntry::from_parts(internal, Some(outputs));
        let states = &mut self.definition_mut(definition)?.state.gates;
        match entry {
            Some(entry) => states.insert(uid, entry),
            None => states.remove(&uid),
        };
        Ok(())
    }

    /// Put every gate of a definition, and its boundary, back into the
    /// initial state.
    pub fn reset_state(&mut self, definition: &str) -> Result<()> {
        let ctx = self.context();
        let target = ctx.definition(definition)?;
        let mut gates = GateStates::new();
        for gate in target.gates().filter(|gate| !gate.is_boundary()) {
            let (internal, outputs) = target.initial_entry(&ctx, gate)?;
            if let Some(entry) = StateEntry::from_parts(internal, Some(outputs)) {
                gates.insert(gate.uid(), entry);
            }
        }
        let state = DefinitionState {
            inputs: value::zeros(target.input_widths()),
            outputs: value::zeros(target.output_widths()),
            gates,
        };
        self.definition_mut(definition)?.state = state;
        debug!(definition, "reset state");
        Ok(())
    }

    /// Rebuild the state of every instance of a definition, at any depth.
    pub fn repair_instances(&mut self, definition: &str) -> Result<()> {
        self.definition(definition)?;
        self.propagate(EditEvent::StateRepaired {
            definition: definition.to_string(),
        })
    }
}

/// Whether an instance's pins still match its definition's boundary.
fn mirrors(instance: &Gate, definition: &GateDefinition) -> bool {
    instance.input_widths() == definition.input_widths() && instance.output_widths() == definition.output_widths()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtins_are_type_vertices() {
        let project = Project::new("p");
        for builtin in BUILTIN_TYPES {
            assert!(project.type_graph().contains_vertex(&builtin.to_string()));
        }
        assert_eq!(project.gate_names().len(), BUILTIN_TYPES.len());
    }

    #[test]
    fn define_rejects_duplicates_and_builtins() {
        let mut project = Project::new("p");
        project.define("Half", vec![1, 1], vec![1]).unwrap();
        assert_eq!(
            project.define("Half", vec![1], vec![1]),
            Err(Error::DuplicateDefinition("Half".to_string()))
        );
        assert_eq!(
            project.define("NAND", vec![1], vec![1]),
            Err(Error::DuplicateDefinition("NAND".to_string()))
        );
        assert_eq!(project.define("Bad", vec![0], vec![1]), Err(Error::InvalidWidth(0)));
    }

    #[test]
    fn every_gate_has_cached_outputs_at_top_level() {
        let mut project = Project::new("p");
        project.define("D", vec![1], vec![1]).unwrap();
        let nand = project.nand();
        let uid = project.add_gate("D", nand).unwrap();
        let outputs = project.definition("D").unwrap().get_gate_outputs(uid).unwrap();
        assert_eq!(outputs, vec![Signal::Bit(true)]);
    }

    #[test]
    fn boundary_gates_cannot_be_removed_or_duplicated() {
        let mut project = Project::new("p");
        project.define("D", vec![1], vec![1]).unwrap();
        let source = project.definition("D").unwrap().source();
        assert_eq!(
            project.remove_gate("D", source),
            Err(Error::BoundaryGate {
                action: "remove",
                gate_type: "Source"
            })
        );
        assert!(project.duplicate_gate("D", source).is_err());
        assert!(project.instantiate("Sink").is_err());
    }

    #[test]
    fn pop_on_empty_boundary_fails() {
        let mut project = Project::new("p");
        project.define("D", vec![], vec![]).unwrap();
        assert_eq!(
            project.pop_input("D"),
            Err(Error::IndexOutOfRange { what: "input", index: 0 })
        );
    }

    #[test]
    fn builtins_cannot_be_edited() {
        let mut project = Project::new("p");
        assert_eq!(
            project.rename_definition("NAND", "Nand2"),
            Err(Error::BuiltinGate("NAND".to_string()))
        );
        assert_eq!(
            project.delete_definition("Source", true),
            Err(Error::BuiltinGate("Source".to_string()))
        );
        assert_eq!(
            project.append_input("NAND", 1),
            Err(Error::UnknownDefinition("NAND".to_string()))
        );
    }

    #[test]
    fn edits_refuse_to_cascade_into_stale_instances() {
        let mut project = Project::new("p");
        project.define("Inv", vec![1], vec![1]).unwrap();
        project.define("Top", vec![1], vec![1]).unwrap();
        let stale = project.instance("Inv").unwrap();
        let uid = stale.uid();
        project.append_input("Inv", 1).unwrap();
        project.definition_mut("Top").unwrap().insert_gate(stale, None).unwrap();
        project.type_graph.add_edge("Top".to_string(), "Inv".to_string()).unwrap();

        assert_eq!(
            project.remove_input("Inv", 0),
            Err(Error::StaleInstance {
                uid,
                gate_type: "Inv".to_string(),
            })
        );
        assert_eq!(project.definition("Inv").unwrap().input_widths(), &[1, 1]);
        assert_eq!(project.definition("Top").unwrap().gate(uid).unwrap().input_widths(), &[1]);

        project.remove_gate("Top", uid).unwrap();
        project.remove_input("Inv", 0).unwrap();
        assert_eq!(project.definition("Inv").unwrap().input_widths(), &[1]);
    }
}
