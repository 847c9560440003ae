mod common;

use common::{bit, bits, define_inverter, define_inverter_ring, define_latch, define_wrapper};
use gatework::persist::{EntryRecord, KindRecord};
use gatework::{GateId, Project, ProjectRecord, Signal};

fn latch_project() -> Project {
    let mut project = Project::new("latches");
    define_latch(&mut project, "Latch");
    define_wrapper(&mut project, "Wrap", "Latch");
    project.set_inputs("Wrap", vec![bit(0), bit(1)]).unwrap();
    project.tick("Wrap").unwrap();
    project.set_inputs("Wrap", vec![bit(1), bit(1)]).unwrap();
    project
}

fn run(project: &mut Project, name: &str, inputs: &[[u8; 2]]) -> Vec<Vec<Signal>> {
    inputs
        .iter()
        .map(|&[a, b]| {
            project.set_inputs(name, vec![bit(a), bit(b)]).unwrap();
            project.tick(name).unwrap()
        })
        .collect()
}

#[test]
fn saved_project_behaves_the_same_after_loading() {
    let mut original = latch_project();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("latches.json");
    original.save(&path).unwrap();

    let mut loaded = Project::load(&path).unwrap();
    assert_eq!(loaded.name(), "latches");
    assert_eq!(loaded.gate_names(), original.gate_names());
    let latch = loaded.definition("Latch").unwrap();
    assert_eq!(latch.input_labels().to_vec(), vec!["set".to_string(), "reset".to_string()]);
    assert_eq!(latch.instances_of("NAND").len(), 2);
    assert_eq!(loaded.definition("Wrap").unwrap().inputs(), &[bit(1), bit(1)]);

    let script = [[1, 1], [1, 0], [1, 1], [0, 1], [1, 1]];
    assert_eq!(run(&mut loaded, "Wrap", &script), run(&mut original, "Wrap", &script));
}

#[test]
fn record_survives_json() {
    let project = latch_project();
    let record = project.to_record();
    let text = serde_json::to_string(&record).unwrap();
    assert!(text.contains(r#""kind":"NAND""#));
    let parsed: ProjectRecord = serde_json::from_str(&text).unwrap();
    assert_eq!(parsed, record);
    assert_eq!(record.dependency_graph["Wrap"], vec!["Latch".to_string()]);
}

#[test]
fn loading_allocates_fresh_uids() {
    let project = latch_project();
    let mut loaded = Project::from_record(&project.to_record()).unwrap();
    let fresh = loaded.nand().uid();
    assert!(loaded.definitions().all(|definition| !definition.contains_gate(fresh)));
}

#[test]
fn stale_state_is_conformed_on_load() {
    let project = latch_project();
    let mut record = project.to_record();
    let latch = record.definitions.get_mut("Latch").unwrap();
    latch.state.inputs = vec![bits(&[1, 1]), bit(1)];
    let q = *latch.gates.keys().next().unwrap();
    let nq = *latch.gates.keys().nth(1).unwrap();
    latch.state.gates.insert(q, EntryRecord(None, Some(vec![bits(&[1, 1, 1])])));
    latch.state.gates.remove(&nq);

    let loaded = Project::from_record(&record).unwrap();
    let latch = loaded.definition("Latch").unwrap();
    assert_eq!(latch.inputs(), &[bit(0), bit(1)]);
    let uids: Vec<GateId> = latch.instances_of("NAND");
    assert_eq!(latch.get_gate_outputs(uids[0]).unwrap(), vec![bit(0)]);
    assert_eq!(latch.get_gate_outputs(uids[1]).unwrap(), vec![bit(1)]);
}

#[test]
fn dangling_references_are_dropped_on_load() {
    let project = latch_project();
    let mut record = project.to_record();
    let latch = record.definitions.get_mut("Latch").unwrap();
    let q = *latch.gates.keys().next().unwrap();
    latch.connections.entry(9_999).or_default().insert(q, vec![(0, 0)]);
    latch.state.gates.insert(9_999, EntryRecord(None, Some(vec![bit(1)])));

    let loaded = Project::from_record(&record).unwrap();
    let latch = loaded.definition("Latch").unwrap();
    assert_eq!(latch.connections().len(), project.definition("Latch").unwrap().connections().len());
}

#[test]
fn nested_state_is_remapped() {
    let mut project = Project::new("rings");
    define_inverter(&mut project, "Inv");
    define_inverter_ring(&mut project, "Mid", "Inv");
    define_wrapper(&mut project, "Top", "Mid");
    project.tick("Top").unwrap();

    let mut loaded = Project::from_record(&project.to_record()).unwrap();
    let m = loaded.definition("Top").unwrap().instances_of("Mid")[0];
    let original_m = project.definition("Top").unwrap().instances_of("Mid")[0];
    assert_eq!(
        loaded.definition("Top").unwrap().get_gate_outputs(m).unwrap(),
        project.definition("Top").unwrap().get_gate_outputs(original_m).unwrap()
    );
    for _ in 0..3 {
        assert_eq!(loaded.tick("Top").unwrap(), project.tick("Top").unwrap());
    }
}

#[test]
fn builtin_payloads_keep_their_shape() {
    let mut project = Project::new("builtins");
    project.define("Mix", vec![4], vec![2, 2]).unwrap();
    let split = project.reshaper(vec![4], vec![2, 2]).unwrap();
    let split = project.add_gate("Mix", split).unwrap();
    let constant = project.constant(3).unwrap();
    project.add_gate("Mix", constant).unwrap();
    let mix = project.definition_mut("Mix").unwrap();
    mix.tie_input_to(0, (split, 0)).unwrap();
    mix.tie_output_to((split, 0), 0).unwrap();
    mix.tie_output_to((split, 1), 1).unwrap();

    let record = project.to_record();
    let kinds: Vec<KindRecord> = record.definitions["Mix"]
        .gates
        .values()
        .map(|gate| gate.kind.clone())
        .collect();
    assert_eq!(
        kinds,
        vec![
            KindRecord::Reshaper {
                input_widths: vec![4],
                output_widths: vec![2, 2],
            },
            KindRecord::Constant { width: 3 },
        ]
    );

    let mut loaded = Project::from_record(&record).unwrap();
    loaded.set_inputs("Mix", vec![bits(&[1, 0, 0, 1])]).unwrap();
    assert_eq!(loaded.tick("Mix").unwrap(), vec![bits(&[1, 0]), bits(&[0, 1])]);
}

#[test]
fn exported_definition_imports_with_its_dependencies() {
    let source = latch_project();
    let record = source.export_definition("Wrap").unwrap();
    assert_eq!(record.definitions.len(), 2);

    let mut target = Project::new("target");
    let imported = target.import_definition(&record).unwrap();
    assert_eq!(imported, vec!["Latch".to_string(), "Wrap".to_string()]);
    target.set_inputs("Wrap", vec![bit(1), bit(0)]).unwrap();
    target.tick("Wrap").unwrap();
    assert_eq!(target.tick("Wrap").unwrap(), vec![bit(0), bit(1)]);

    assert!(target.import_definition(&record).unwrap().is_empty());
    assert!(target.export_definition("Missing").is_err());
}
