//! An active-low SR latch built from two NAND gates, saved and reloaded.

use gatework::{Project, Signal};

fn show(project: &mut Project, set: bool, reset: bool) -> gatework::Result<()> {
    project.set_inputs("Latch", vec![Signal::Bit(set), Signal::Bit(reset)])?;
    let outputs = project.tick("Latch")?;
    println!(
        "set={} reset={} -> q={} nq={}",
        u8::from(set),
        u8::from(reset),
        outputs[0],
        outputs[1]
    );
    Ok(())
}

fn main() -> gatework::Result<()> {
    let mut project = Project::new("latch");
    project.define_labeled(
        "Latch",
        vec![1, 1],
        vec![1, 1],
        vec!["set".into(), "reset".into()],
        vec!["q".into(), "nq".into()],
    )?;
    let q = project.nand();
    let q = project.add_gate("Latch", q)?;
    let nq = project.nand();
    let nq = project.add_gate("Latch", nq)?;
    let latch = project.definition_mut("Latch")?;
    latch.tie_input_to(0, (q, 0))?;
    latch.tie_input_to(1, (nq, 0))?;
    latch.add_connection((nq, 0), (q, 1))?;
    latch.add_connection((q, 0), (nq, 1))?;
    latch.tie_output_to((q, 0), 0)?;
    latch.tie_output_to((nq, 0), 1)?;

    show(&mut project, false, true)?;
    show(&mut project, true, true)?;
    show(&mut project, true, false)?;
    show(&mut project, true, false)?;
    show(&mut project, true, true)?;

    let path = std::env::temp_dir().join("gatework_latch.json");
    project.save(&path)?;
    let mut reloaded = Project::load(&path)?;
    println!("reloaded from {}", path.display());
    show(&mut reloaded, true, true)?;
    Ok(())
}
