//! Tick harness: drive one definition for a number of ticks and record what
//! it produced.

use crate::error::Result;
use crate::gate::GateId;
use crate::project::Project;
use crate::value::Signal;

/// Owns a project and repeatedly ticks one of its definitions.
pub struct TickHarness {
    project: Project,
    definition: String,
    trace: Vec<Vec<Signal>>,
}

impl TickHarness {
    /// Create a harness; fails if the definition does not exist.
    pub fn new(project: Project, definition: &str) -> Result<Self> {
        project.definition(definition)?;
        Ok(Self {
            project,
            definition: definition.to_string(),
            trace: Vec::new(),
        })
    }

    pub fn project(&self) -> &Project {
        &self.project
    }

    pub fn project_mut(&mut self) -> &mut Project {
        &mut self.project
    }

    pub fn set_inputs(&mut self, values: Vec<Signal>) -> Result<()> {
        self.project.set_inputs(&self.definition, values)
    }

    /// Tick `ticks` times, returning the outputs after each tick.
    pub fn run(&mut self, ticks: usize) -> Result<Vec<Vec<Signal>>> {
        let mut outputs = Vec::with_capacity(ticks);
        for _ in 0..ticks {
            let produced = self.project.tick(&self.definition)?;
            self.trace.push(produced.clone());
            outputs.push(produced);
        }
        Ok(outputs)
    }

    /// Tick until the outputs stop changing, at most `limit` times. Returns
    /// the settled outputs, or `None` if they never settled.
    pub fn settle(&mut self, limit: usize) -> Result<Option<Vec<Signal>>> {
        let mut previous = self.project.definition(&self.definition)?.outputs().to_vec();
        for _ in 0..limit {
            let produced = self.run(1)?.remove(0);
            if produced == previous {
                return Ok(Some(produced));
            }
            previous = produced;
        }
        Ok(None)
    }

    /// A gate's outputs as of the last tick.
    pub fn probe(&self, uid: GateId) -> Result<Vec<Signal>> {
        self.project.definition(&self.definition)?.get_gate_outputs(uid)
    }

    /// Every output recorded since the harness was created.
    pub fn trace(&self) -> &[Vec<Signal>] {
        &self.trace
    }

    pub fn into_project(self) -> Project {
        self.project
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn harness_records_each_tick() {
        let mut project = Project::new("p");
        project.define("Not", vec![1], vec![1]).unwrap();
        let nand = project.nand();
        let uid = project.add_gate("Not", nand).unwrap();
        let not = project.definition_mut("Not").unwrap();
        not.tie_input_to(0, (uid, 0)).unwrap();
        not.tie_input_to(0, (uid, 1)).unwrap();
        not.tie_output_to((uid, 0), 0).unwrap();

        let mut harness = TickHarness::new(project, "Not").unwrap();
        harness.set_inputs(vec![Signal::Bit(true)]).unwrap();
        let outputs = harness.run(2).unwrap();
        assert_eq!(outputs, vec![vec![Signal::Bit(false)]; 2]);
        assert_eq!(harness.trace().len(), 2);
        assert_eq!(harness.probe(uid).unwrap(), vec![Signal::Bit(false)]);
    }

    #[test]
    fn harness_requires_a_definition() {
        assert!(TickHarness::new(Project::new("p"), "Missing").is_err());
    }
}
