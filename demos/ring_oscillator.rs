//! Three inverters in a loop.
//!
//! Each tick reads the feedback wire from the previous tick, so the ring
//! settles into a repeating pattern instead of diverging.

use gatework::harness::TickHarness;
use gatework::Project;

fn main() -> gatework::Result<()> {
    let mut project = Project::new("ring");

    // Inv(x) = NAND(x, x)
    project.define("Inv", vec![1], vec![1])?;
    let nand = project.nand();
    let nand = project.add_gate("Inv", nand)?;
    let inv = project.definition_mut("Inv")?;
    inv.tie_input_to(0, (nand, 0))?;
    inv.tie_input_to(0, (nand, 1))?;
    inv.tie_output_to((nand, 0), 0)?;

    project.define("Ring", vec![], vec![1])?;
    let mut stages = Vec::new();
    for _ in 0..3 {
        let stage = project.instance("Inv")?;
        stages.push(project.add_gate("Ring", stage)?);
    }
    let ring = project.definition_mut("Ring")?;
    for (i, &stage) in stages.iter().enumerate() {
        let next = stages[(i + 1) % stages.len()];
        ring.add_connection((stage, 0), (next, 0))?;
    }
    ring.tie_output_to((stages[0], 0), 0)?;
    println!("cut gates: {:?}", project.definition("Ring")?.plan().cut_gates);

    let mut harness = TickHarness::new(project, "Ring")?;
    for (tick, outputs) in harness.run(12)?.iter().enumerate() {
        let levels: Vec<String> = stages
            .iter()
            .map(|&uid| {
                harness
                    .probe(uid)
                    .map(|values| values[0].to_string())
                    .unwrap_or_default()
            })
            .collect();
        println!("tick {tick:2}: out={} stages={}", outputs[0], levels.join(""));
    }
    Ok(())
}
