use criterion::{black_box, criterion_group, criterion_main, Criterion};
use gatework::{Project, Signal};

fn and_gate(project: &mut Project) {
    project.define("And", vec![1, 1], vec![1]).unwrap();
    let first = project.nand();
    let first = project.add_gate("And", first).unwrap();
    let second = project.nand();
    let second = project.add_gate("And", second).unwrap();
    let and = project.definition_mut("And").unwrap();
    and.tie_input_to(0, (first, 0)).unwrap();
    and.tie_input_to(1, (first, 1)).unwrap();
    and.add_connection((first, 0), (second, 0)).unwrap();
    and.add_connection((first, 0), (second, 1)).unwrap();
    and.tie_output_to((second, 0), 0).unwrap();
}

fn bench_and8(c: &mut Criterion) {
    let mut project = Project::new("bench");
    and_gate(&mut project);
    project.define("And8", vec![8, 8], vec![8]).unwrap();
    let split_a = project.reshaper(vec![8], vec![1; 8]).unwrap();
    let split_a = project.add_gate("And8", split_a).unwrap();
    let split_b = project.reshaper(vec![8], vec![1; 8]).unwrap();
    let split_b = project.add_gate("And8", split_b).unwrap();
    let join = project.reshaper(vec![1; 8], vec![8]).unwrap();
    let join = project.add_gate("And8", join).unwrap();
    let mut ands = Vec::new();
    for _ in 0..8 {
        let and = project.instance("And").unwrap();
        ands.push(project.add_gate("And8", and).unwrap());
    }
    let and8 = project.definition_mut("And8").unwrap();
    and8.tie_input_to(0, (split_a, 0)).unwrap();
    and8.tie_input_to(1, (split_b, 0)).unwrap();
    for (i, &and) in ands.iter().enumerate() {
        and8.add_connection((split_a, i), (and, 0)).unwrap();
        and8.add_connection((split_b, i), (and, 1)).unwrap();
        and8.add_connection((and, 0), (join, i)).unwrap();
    }
    and8.tie_output_to((join, 0), 0).unwrap();
    project
        .set_inputs(
            "And8",
            vec![
                Signal::from_bits(vec![true, false, true, true, false, true, false, true]),
                Signal::from_bits(vec![true; 8]),
            ],
        )
        .unwrap();

    c.bench_function("tick_and8", |b| {
        b.iter(|| black_box(project.tick(black_box("And8")).unwrap()))
    });
}

fn bench_latch_chain(c: &mut Criterion) {
    // A chain of 16 cross-coupled NAND pairs: every pair is a cut.
    let mut project = Project::new("bench");
    project.define("Chain", vec![1], vec![1]).unwrap();
    let mut prev = None;
    for _ in 0..16 {
        let q = project.nand();
        let q = project.add_gate("Chain", q).unwrap();
        let nq = project.nand();
        let nq = project.add_gate("Chain", nq).unwrap();
        let chain = project.definition_mut("Chain").unwrap();
        match prev {
            Some(from) => chain.add_connection((from, 0), (q, 0)).unwrap(),
            None => chain.tie_input_to(0, (q, 0)).unwrap(),
        }
        chain.add_connection((nq, 0), (q, 1)).unwrap();
        chain.add_connection((q, 0), (nq, 0)).unwrap();
        chain.add_connection((q, 0), (nq, 1)).unwrap();
        prev = Some(q);
    }
    if let Some(last) = prev {
        project.definition_mut("Chain").unwrap().tie_output_to((last, 0), 0).unwrap();
    }
    project.set_inputs("Chain", vec![Signal::Bit(true)]).unwrap();

    c.bench_function("tick_latch_chain_16", |b| {
        b.iter(|| black_box(project.tick(black_box("Chain")).unwrap()))
    });
}

criterion_group!(benches, bench_and8, bench_latch_chain);
criterion_main!(benches);
