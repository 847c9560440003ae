//! JSON persistence for projects and single definitions.
//!
//! Uids are only meaningful inside one project, so loading allocates fresh
//! ones and translates every reference (gate table, connections, nested
//! instance states) through one table. State that no longer matches the
//! shape of its gate is conformed to zero values rather than rejected.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::definition::GateDefinition;
use crate::engine::EvalContext;
use crate::error::Result;
use crate::gate::{self, is_builtin, Gate, GateId, GateKind};
use crate::graph::DirectedGraph;
use crate::invariant_ppt::{assert_invariant, UID_REMAP};
use crate::project::Project;
use crate::state::{GateStates, InternalState, StateEntry};
use crate::value::{self, Signal};

/// Old uid to the uid allocated for it on load.
type UidMap = BTreeMap<u64, GateId>;

/// A whole project on disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectRecord {
    pub name: String,
    pub definitions: BTreeMap<String, DefinitionRecord>,
    /// Forward adjacency of the type graph, builtins included.
    #[serde(default)]
    pub dependency_graph: BTreeMap<String, Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DefinitionRecord {
    pub name: String,
    pub input_dims: Vec<usize>,
    pub output_dims: Vec<usize>,
    #[serde(default)]
    pub input_labels: Vec<String>,
    #[serde(default)]
    pub output_labels: Vec<String>,
    pub source_uid: u64,
    pub sink_uid: u64,
    /// Every gate except the Source and Sink.
    pub gates: BTreeMap<u64, GateRecord>,
    #[serde(default)]
    pub gate_types: BTreeMap<String, Vec<u64>>,
    /// `from uid -> to uid -> [(output, input)]`.
    #[serde(default)]
    pub connections: BTreeMap<u64, BTreeMap<u64, Vec<(usize, usize)>>>,
    #[serde(default)]
    pub state: StateRecord,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GateRecord {
    #[serde(flatten)]
    pub kind: KindRecord,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub input_labels: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub output_labels: Vec<String>,
}

/// The per-kind payload. Compound pins are taken from their definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum KindRecord {
    #[serde(rename = "NAND")]
    Nand,
    Constant {
        width: usize,
    },
    Reshaper {
        input_widths: Vec<usize>,
        output_widths: Vec<usize>,
    },
    Datetime {
        width: usize,
    },
    Compound {
        definition: String,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StateRecord {
    #[serde(default)]
    pub inputs: Vec<Signal>,
    #[serde(default)]
    pub outputs: Vec<Signal>,
    #[serde(default)]
    pub gates: BTreeMap<u64, EntryRecord>,
}

/// `[internal, outputs]` for one gate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryRecord(pub Option<InternalRecord>, pub Option<Vec<Signal>>);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum InternalRecord {
    Held(Vec<Signal>),
    /// Keys are decimal uids: untagged content cannot carry integer keys.
    Nested(BTreeMap<String, EntryRecord>),
}

impl KindRecord {
    fn definition(&self) -> Option<&str> {
        match self {
            KindRecord::Compound { definition } => Some(definition),
            _ => None,
        }
    }
}

impl GateRecord {
    fn from_gate(gate: &Gate) -> Option<Self> {
        let kind = match gate.kind() {
            GateKind::Nand => KindRecord::Nand,
            GateKind::Constant => KindRecord::Constant {
                width: gate.output_widths().first().copied().unwrap_or(1),
            },
            GateKind::Reshaper => KindRecord::Reshaper {
                input_widths: gate.input_widths().to_vec(),
                output_widths: gate.output_widths().to_vec(),
            },
            GateKind::Datetime => KindRecord::Datetime {
                width: gate.output_widths().first().copied().unwrap_or(1),
            },
            GateKind::Compound { definition } => KindRecord::Compound {
                definition: definition.clone(),
            },
            GateKind::Source | GateKind::Sink => return None,
        };
        let labelled = |labels: &[String]| {
            if labels.iter().all(String::is_empty) || gate.definition_name().is_some() {
                Vec::new()
            } else {
                labels.to_vec()
            }
        };
        Some(Self {
            kind,
            input_labels: labelled(gate.input_labels()),
            output_labels: labelled(gate.output_labels()),
        })
    }
}

impl EntryRecord {
    fn from_entry(entry: &StateEntry) -> Self {
        EntryRecord(
            entry.internal().map(InternalRecord::from_internal),
            entry.outputs().map(<[Signal]>::to_vec),
        )
    }
}

impl InternalRecord {
    fn from_internal(internal: &InternalState) -> Self {
        match internal {
            InternalState::Held(values) => InternalRecord::Held(values.clone()),
            InternalState::Nested(states) => InternalRecord::Nested(
                states
                    .iter()
                    .map(|(uid, entry)| (uid.0.to_string(), EntryRecord::from_entry(entry)))
                    .collect(),
            ),
        }
    }
}

impl DefinitionRecord {
    pub fn from_definition(definition: &GateDefinition) -> Self {
        let gates = definition
            .gates()
            .filter_map(|gate| GateRecord::from_gate(gate).map(|record| (gate.uid().0, record)))
            .collect();
        let gate_types = definition
            .gate_types()
            .iter()
            .map(|(name, uids)| (name.clone(), uids.iter().map(|uid| uid.0).collect()))
            .collect();

        let mut connections: BTreeMap<u64, BTreeMap<u64, Vec<(usize, usize)>>> = BTreeMap::new();
        for ((from, to), pairs) in definition.connections() {
            connections
                .entry(from.0)
                .or_default()
                .insert(to.0, pairs.iter().copied().collect());
        }

        let state = definition.state();
        Self {
            name: definition.name().to_string(),
            input_dims: definition.input_widths().to_vec(),
            output_dims: definition.output_widths().to_vec(),
            input_labels: definition.input_labels().to_vec(),
            output_labels: definition.output_labels().to_vec(),
            source_uid: definition.source().0,
            sink_uid: definition.sink().0,
            gates,
            gate_types,
            connections,
            state: StateRecord {
                inputs: state.inputs.clone(),
                outputs: state.outputs.clone(),
                gates: state
                    .gates
                    .iter()
                    .map(|(uid, entry)| (uid.0, EntryRecord::from_entry(entry)))
                    .collect(),
            },
        }
    }
}

impl Project {
    pub fn to_record(&self) -> ProjectRecord {
        ProjectRecord {
            name: self.name().to_string(),
            definitions: self
                .definitions()
                .map(|definition| (definition.name().to_string(), DefinitionRecord::from_definition(definition)))
                .collect(),
            dependency_graph: self.type_graph.adjacency(),
        }
    }

    /// Rebuild a project from its record with fresh uids.
    pub fn from_record(record: &ProjectRecord) -> Result<Self> {
        let mut project = Project::new(record.name.clone());
        project.load_records(record)?;
        Ok(project)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let text = serde_json::to_string_pretty(&self.to_record())?;
        fs::write(path.as_ref(), text)?;
        debug!(project = %self.name(), path = %path.as_ref().display(), "saved");
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = fs::read_to_string(path.as_ref())?;
        let record: ProjectRecord = serde_json::from_str(&text)?;
        let project = Self::from_record(&record)?;
        debug!(project = %project.name(), path = %path.as_ref().display(), "loaded");
        Ok(project)
    }

    /// A record holding `name` and every definition it depends on.
    pub fn export_definition(&self, name: &str) -> Result<ProjectRecord> {
        self.definition(name)?;
        let mut names = self.type_graph.all_successors(&name.to_string());
        names.insert(name.to_string());
        let definitions: BTreeMap<String, DefinitionRecord> = names
            .iter()
            .filter_map(|name| self.definitions.get(name))
            .map(|definition| (definition.name().to_string(), DefinitionRecord::from_definition(definition)))
            .collect();
        let dependency_graph = self
            .type_graph
            .adjacency()
            .into_iter()
            .filter(|(vertex, _)| names.contains(vertex) || is_builtin(vertex))
            .collect();
        Ok(ProjectRecord {
            name: name.to_string(),
            definitions,
            dependency_graph,
        })
    }

    /// Add the definitions of `record` to this project. Definitions whose
    /// name is already taken are kept as they are and reused by the imported
    /// ones. Returns the names actually added.
    pub fn import_definition(&mut self, record: &ProjectRecord) -> Result<Vec<String>> {
        self.load_records(record)
    }

    fn load_records(&mut self, record: &ProjectRecord) -> Result<Vec<String>> {
        let mut remap = UidMap::new();
        let mut loaded = Vec::new();
        for name in load_order(record)? {
            if self.definitions.contains_key(&name) {
                debug!(definition = %name, "kept existing definition");
                continue;
            }
            let Some(definition) = record.definitions.get(&name) else {
                continue;
            };
            if definition.name != name {
                warn!(key = %name, name = %definition.name, "definition record stored under another name");
            }
            self.load_definition(&name, definition, &mut remap)?;
            loaded.push(name);
        }
        Ok(loaded)
    }

    fn load_definition(&mut self, name: &str, record: &DefinitionRecord, remap: &mut UidMap) -> Result<()> {
        self.define_labeled(
            name,
            record.input_dims.clone(),
            record.output_dims.clone(),
            record.input_labels.clone(),
            record.output_labels.clone(),
        )?;
        let (source, sink) = {
            let definition = self.definition(name)?;
            (definition.source(), definition.sink())
        };
        remap.insert(record.source_uid, source);
        remap.insert(record.sink_uid, sink);

        for (old, gate_record) in &record.gates {
            let gate = self.restore_gate(gate_record)?;
            let uid = self.add_gate(name, gate)?;
            remap.insert(*old, uid);
        }
        check_gate_types(name, record);
        self.restore_connections(name, record, remap)?;
        self.restore_state(name, record, remap)?;

        let definition = self.definition(name)?;
        assert_invariant(
            UID_REMAP,
            record
                .gates
                .keys()
                .chain([&record.source_uid, &record.sink_uid])
                .all(|old| remap.get(old).is_some_and(|uid| definition.contains_gate(*uid))),
            "Every stored gate maps to a live gate",
            Some("load_definition"),
        );
        debug!(definition = name, gates = record.gates.len(), "loaded definition");
        Ok(())
    }

    fn restore_gate(&mut self, record: &GateRecord) -> Result<Gate> {
        let gate = match &record.kind {
            KindRecord::Nand => self.nand(),
            KindRecord::Constant { width } => self.constant(*width)?,
            KindRecord::Reshaper {
                input_widths,
                output_widths,
            } => self.reshaper(input_widths.clone(), output_widths.clone())?,
            KindRecord::Datetime { width } => Gate::datetime(self.uids.allocate(), *width)?,
            KindRecord::Compound { definition } => return self.instance(definition),
        };
        if record.input_labels.is_empty() && record.output_labels.is_empty() {
            return Ok(gate);
        }
        Ok(gate.with_labels(record.input_labels.clone(), record.output_labels.clone()))
    }

    fn restore_connections(&mut self, name: &str, record: &DefinitionRecord, remap: &UidMap) -> Result<()> {
        let definition = self.definition_mut(name)?;
        for (from, targets) in &record.connections {
            for (to, pairs) in targets {
                let (Some(&new_from), Some(&new_to)) = (remap.get(from), remap.get(to)) else {
                    warn!(definition = name, from, to, "dropping connection to an unknown gate");
                    continue;
                };
                for &(output, input) in pairs {
                    if let Err(err) = definition.add_connection((new_from, output), (new_to, input)) {
                        warn!(definition = name, from, to, output, input, error = %err, "dropping connection");
                    }
                }
            }
        }
        Ok(())
    }

    fn restore_state(&mut self, name: &str, record: &DefinitionRecord, remap: &UidMap) -> Result<()> {
        let ctx = self.context();
        let definition = ctx.definition(name)?;
        let inputs = value::conform(&record.state.inputs, definition.input_widths());
        let outputs = value::conform(&record.state.outputs, definition.output_widths());

        let mut restored = Vec::new();
        for (old, entry) in &record.state.gates {
            let Some(gate) = remap.get(old).and_then(|uid| definition.gates.get(uid)) else {
                warn!(definition = name, uid = old, "dropping state of an unknown gate");
                continue;
            };
            if gate.is_boundary() {
                continue;
            }
            let fallback = definition
                .state
                .gates
                .get(&gate.uid())
                .and_then(StateEntry::outputs)
                .map(<[Signal]>::to_vec);
            let entry = restore_entry(&ctx, gate, entry, remap)?
                .map(|entry| entry.rebuild(|internal, outputs| (internal, outputs.or(fallback.clone()))))
                .unwrap_or_else(|| StateEntry::from_parts(None, fallback));
            restored.push((gate.uid(), entry));
        }

        let state = &mut self.definition_mut(name)?.state;
        state.inputs = inputs;
        state.outputs = outputs;
        for (uid, entry) in restored {
            match entry {
                Some(entry) => state.gates.insert(uid, entry),
                None => state.gates.remove(&uid),
            };
        }
        Ok(())
    }
}

/// Definitions of `record`, each after the definitions it contains.
fn load_order(record: &ProjectRecord) -> Result<Vec<String>> {
    let mut graph = DirectedGraph::new();
    for name in record.definitions.keys() {
        graph.add_vertex(name.clone());
    }
    for (name, definition) in &record.definitions {
        for gate_type in definition.gates.values().filter_map(|gate| gate.kind.definition()) {
            if record.definitions.contains_key(gate_type) {
                graph.add_edge(name.clone(), gate_type.to_string())?;
            }
        }
    }

    let stored: BTreeMap<String, Vec<String>> = record
        .dependency_graph
        .iter()
        .filter(|(vertex, _)| record.definitions.contains_key(*vertex))
        .map(|(vertex, targets)| {
            let targets = targets
                .iter()
                .filter(|target| record.definitions.contains_key(*target))
                .cloned()
                .collect();
            (vertex.clone(), targets)
        })
        .collect();
    if !record.dependency_graph.is_empty() && stored != graph.adjacency() {
        warn!(project = %record.name, "stored dependency graph disagrees with the gate tables; using the gate tables");
    }

    let mut order = graph.topological_order()?;
    order.reverse();
    Ok(order)
}

fn check_gate_types(name: &str, record: &DefinitionRecord) {
    for (type_name, uids) in &record.gate_types {
        if type_name == gate::SOURCE || type_name == gate::SINK {
            continue;
        }
        for uid in uids {
            let stored = record.gates.get(uid).map(|gate| match &gate.kind {
                KindRecord::Nand => gate::NAND,
                KindRecord::Constant { .. } => gate::CONSTANT,
                KindRecord::Reshaper { .. } => gate::RESHAPER,
                KindRecord::Datetime { .. } => gate::DATETIME,
                KindRecord::Compound { definition } => definition.as_str(),
            });
            if stored != Some(type_name.as_str()) {
                warn!(definition = name, uid, gate_type = %type_name, "type index disagrees with the gate table");
            }
        }
    }
}

/// Rebuild one entry against the current shape of `gate`.
fn restore_entry(
    ctx: &EvalContext<'_>,
    gate: &Gate,
    record: &EntryRecord,
    remap: &UidMap,
) -> Result<Option<StateEntry>> {
    let outputs = record
        .1
        .as_ref()
        .map(|outputs| value::conform(outputs, gate.output_widths()));
    let internal = match (gate.kind(), &record.0) {
        (_, None) => gate.init_state(ctx)?,
        (GateKind::Constant, Some(InternalRecord::Held(values))) => {
            Some(InternalState::Held(value::conform(values, gate.output_widths())))
        }
        (GateKind::Compound { definition }, Some(InternalRecord::Nested(records))) => {
            let inner = ctx.definition(definition)?;
            Some(InternalState::Nested(restore_states(ctx, inner, records, remap)?))
        }
        (_, Some(_)) => {
            warn!(uid = %gate.uid(), gate_type = %gate.type_name(), "stored state has the wrong kind; reinitializing");
            gate.init_state(ctx)?
        }
    };
    Ok(StateEntry::from_parts(internal, outputs))
}

fn restore_states(
    ctx: &EvalContext<'_>,
    owner: &GateDefinition,
    records: &BTreeMap<String, EntryRecord>,
    remap: &UidMap,
) -> Result<GateStates> {
    let mut states = GateStates::new();
    for (key, record) in records {
        let gate = key
            .parse::<u64>()
            .ok()
            .and_then(|old| remap.get(&old))
            .and_then(|uid| owner.gates.get(uid));
        let Some(gate) = gate.filter(|gate| !gate.is_boundary()) else {
            warn!(definition = %owner.name(), key = %key, "dropping nested state of an unknown gate");
            continue;
        };
        if let Some(entry) = restore_entry(ctx, gate, record, remap)? {
            states.insert(gate.uid(), entry);
        }
    }
    Ok(states)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gate_records_are_tagged_by_kind() {
        let record = GateRecord {
            kind: KindRecord::Constant { width: 4 },
            input_labels: Vec::new(),
            output_labels: Vec::new(),
        };
        let text = serde_json::to_string(&record).unwrap();
        assert_eq!(text, r#"{"kind":"Constant","width":4}"#);
        assert_eq!(serde_json::from_str::<GateRecord>(&text).unwrap(), record);
    }

    #[test]
    fn nested_entries_keep_their_shape() {
        let text = r#"[{"7": [null, [1, null]], "9": [[[0, 1]], null]}, [0]]"#;
        let entry: EntryRecord = serde_json::from_str(text).unwrap();
        let EntryRecord(Some(InternalRecord::Nested(nested)), Some(outputs)) = entry else {
            panic!("expected a nested entry");
        };
        assert_eq!(outputs, vec![Signal::Bit(false)]);
        assert_eq!(nested["7"], EntryRecord(None, Some(vec![Signal::Bit(true), Signal::Unknown])));
        assert_eq!(
            nested["9"],
            EntryRecord(Some(InternalRecord::Held(vec![Signal::Bits(vec![false, true])])), None)
        );
    }

    #[test]
    fn load_order_puts_dependencies_first() {
        let mut project = Project::new("p");
        project.define("Inner", vec![1], vec![1]).unwrap();
        project.define("Outer", vec![1], vec![1]).unwrap();
        let inner = project.instance("Inner").unwrap();
        project.add_gate("Outer", inner).unwrap();
        let order = load_order(&project.to_record()).unwrap();
        assert_eq!(order, vec!["Inner".to_string(), "Outer".to_string()]);
    }
}
