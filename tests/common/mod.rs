//! Circuits shared by the integration tests.
#![allow(dead_code)]

use gatework::{GateId, Project, Signal};

pub fn bit(value: u8) -> Signal {
    Signal::Bit(value == 1)
}

pub fn bits(values: &[u8]) -> Signal {
    Signal::Bits(values.iter().map(|&v| v == 1).collect())
}

/// `Inv`: one NAND with both inputs on the single input. Returns the NAND.
pub fn define_inverter(project: &mut Project, name: &str) -> GateId {
    project.define(name, vec![1], vec![1]).unwrap();
    let nand = project.nand();
    let uid = project.add_gate(name, nand).unwrap();
    let inv = project.definition_mut(name).unwrap();
    inv.tie_input_to(0, (uid, 0)).unwrap();
    inv.tie_input_to(0, (uid, 1)).unwrap();
    inv.tie_output_to((uid, 0), 0).unwrap();
    uid
}

/// `And`: NAND followed by an inverting NAND.
pub fn define_and(project: &mut Project, name: &str) {
    project.define(name, vec![1, 1], vec![1]).unwrap();
    let first = project.nand();
    let first = project.add_gate(name, first).unwrap();
    let second = project.nand();
    let second = project.add_gate(name, second).unwrap();
    let and = project.definition_mut(name).unwrap();
    and.tie_input_to(0, (first, 0)).unwrap();
    and.tie_input_to(1, (first, 1)).unwrap();
    and.add_connection((first, 0), (second, 0)).unwrap();
    and.add_connection((first, 0), (second, 1)).unwrap();
    and.tie_output_to((second, 0), 0).unwrap();
}

/// Active-low SR latch: inputs `(set, reset)`, outputs `(q, not q)`.
/// Returns the uids of the `q` and `not q` NANDs.
pub fn define_latch(project: &mut Project, name: &str) -> (GateId, GateId) {
    project
        .define_labeled(
            name,
            vec![1, 1],
            vec![1, 1],
            vec!["set".into(), "reset".into()],
            vec!["q".into(), "nq".into()],
        )
        .unwrap();
    let q = project.nand();
    let q = project.add_gate(name, q).unwrap();
    let nq = project.nand();
    let nq = project.add_gate(name, nq).unwrap();
    let latch = project.definition_mut(name).unwrap();
    latch.tie_input_to(0, (q, 0)).unwrap();
    latch.add_connection((nq, 0), (q, 1)).unwrap();
    latch.tie_input_to(1, (nq, 0)).unwrap();
    latch.add_connection((q, 0), (nq, 1)).unwrap();
    latch.tie_output_to((q, 0), 0).unwrap();
    latch.tie_output_to((nq, 0), 1).unwrap();
    (q, nq)
}

/// A definition that passes every pin of one instance of `inner` through.
/// Returns the instance.
pub fn define_wrapper(project: &mut Project, name: &str, inner: &str) -> GateId {
    let (inputs, outputs) = {
        let inner = project.definition(inner).unwrap();
        (inner.input_widths().to_vec(), inner.output_widths().to_vec())
    };
    project.define(name, inputs.clone(), outputs.clone()).unwrap();
    let instance = project.instance(inner).unwrap();
    let uid = project.add_gate(name, instance).unwrap();
    let wrapper = project.definition_mut(name).unwrap();
    for i in 0..inputs.len() {
        wrapper.tie_input_to(i, (uid, i)).unwrap();
    }
    for i in 0..outputs.len() {
        wrapper.tie_output_to((uid, i), i).unwrap();
    }
    uid
}

/// `Mid`: no inputs, one output; an instance of `inverter` feeding itself.
/// Returns the instance.
pub fn define_inverter_ring(project: &mut Project, name: &str, inverter: &str) -> GateId {
    project.define(name, vec![], vec![1]).unwrap();
    let instance = project.instance(inverter).unwrap();
    let uid = project.add_gate(name, instance).unwrap();
    let ring = project.definition_mut(name).unwrap();
    ring.add_connection((uid, 0), (uid, 0)).unwrap();
    ring.tie_output_to((uid, 0), 0).unwrap();
    uid
}
