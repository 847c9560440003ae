//! Gate instances and the closed set of gate kinds.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::definition::GateDefinition;
use crate::engine::EvalContext;
use crate::error::{Error, Result};
use crate::state::{GateStates, InternalState};
use crate::value::{self, Signal};

pub const NAND: &str = "NAND";
pub const SOURCE: &str = "Source";
pub const SINK: &str = "Sink";
pub const CONSTANT: &str = "Constant";
pub const RESHAPER: &str = "Reshaper";
pub const DATETIME: &str = "Datetime";

/// Type names that no definition may take.
pub const BUILTIN_TYPES: [&str; 6] = [NAND, SOURCE, SINK, CONSTANT, RESHAPER, DATETIME];

pub fn is_builtin(name: &str) -> bool {
    BUILTIN_TYPES.contains(&name)
}

/// Project-unique gate identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GateId(pub u64);

impl fmt::Display for GateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Hands out gate uids in increasing order; uids are never reused.
#[derive(Debug, Clone, Default)]
pub struct UidAllocator {
    next: u64,
}

impl UidAllocator {
    pub fn allocate(&mut self) -> GateId {
        let uid = GateId(self.next);
        self.next += 1;
        uid
    }

    /// Whether `uid` has been handed out by this allocator.
    pub fn is_allocated(&self, uid: GateId) -> bool {
        uid.0 < self.next
    }
}

/// What a gate computes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateKind {
    Nand,
    /// A definition's external inputs.
    Source,
    /// A definition's external outputs.
    Sink,
    /// Emits its held state.
    Constant,
    /// Re-slices input bits into the output widths.
    Reshaper,
    /// Emits the injected clock's time.
    Datetime,
    /// An instance of the named definition.
    Compound { definition: String },
}

impl GateKind {
    pub fn type_name(&self) -> &str {
        match self {
            GateKind::Nand => NAND,
            GateKind::Source => SOURCE,
            GateKind::Sink => SINK,
            GateKind::Constant => CONSTANT,
            GateKind::Reshaper => RESHAPER,
            GateKind::Datetime => DATETIME,
            GateKind::Compound { definition } => definition,
        }
    }
}

/// A gate instance: kind, pin shape, labels and uid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Gate {
    uid: GateId,
    kind: GateKind,
    input_widths: Vec<usize>,
    output_widths: Vec<usize>,
    input_labels: Vec<String>,
    output_labels: Vec<String>,
}

fn check_widths(widths: &[usize]) -> Result<()> {
    match widths.iter().find(|&&width| width == 0) {
        Some(&width) => Err(Error::InvalidWidth(width)),
        None => Ok(()),
    }
}

fn labels_or_blank(labels: Option<Vec<String>>, count: usize) -> Vec<String> {
    let mut labels = labels.unwrap_or_default();
    labels.resize(count, String::new());
    labels
}

impl Gate {
    fn build(uid: GateId, kind: GateKind, input_widths: Vec<usize>, output_widths: Vec<usize>) -> Self {
        let input_labels = vec![String::new(); input_widths.len()];
        let output_labels = vec![String::new(); output_widths.len()];
        Self {
            uid,
            kind,
            input_widths,
            output_widths,
            input_labels,
            output_labels,
        }
    }

    pub fn nand(uid: GateId) -> Self {
        Self::build(uid, GateKind::Nand, vec![1, 1], vec![1])
    }

    pub fn source(uid: GateId, widths: Vec<usize>, labels: Option<Vec<String>>) -> Result<Self> {
        check_widths(&widths)?;
        let mut gate = Self::build(uid, GateKind::Source, Vec::new(), widths);
        gate.output_labels = labels_or_blank(labels, gate.output_widths.len());
        Ok(gate)
    }

    pub fn sink(uid: GateId, widths: Vec<usize>, labels: Option<Vec<String>>) -> Result<Self> {
        check_widths(&widths)?;
        let mut gate = Self::build(uid, GateKind::Sink, widths, Vec::new());
        gate.input_labels = labels_or_blank(labels, gate.input_widths.len());
        Ok(gate)
    }

    pub fn constant(uid: GateId, width: usize) -> Result<Self> {
        check_widths(&[width])?;
        Ok(Self::build(uid, GateKind::Constant, Vec::new(), vec![width]))
    }

    /// Fails unless both sides carry the same total number of bits.
    pub fn reshaper(uid: GateId, input_widths: Vec<usize>, output_widths: Vec<usize>) -> Result<Self> {
        check_widths(&input_widths)?;
        check_widths(&output_widths)?;
        let inputs: usize = input_widths.iter().sum();
        let outputs: usize = output_widths.iter().sum();
        if inputs != outputs {
            return Err(Error::ReshapeMismatch { inputs, outputs });
        }
        Ok(Self::build(uid, GateKind::Reshaper, input_widths, output_widths))
    }

    pub fn datetime(uid: GateId, width: usize) -> Result<Self> {
        check_widths(&[width])?;
        Ok(Self::build(uid, GateKind::Datetime, Vec::new(), vec![width]))
    }

    /// An instance whose pins mirror `definition`'s boundary.
    pub fn instance_of(uid: GateId, definition: &GateDefinition) -> Self {
        Self {
            uid,
            kind: GateKind::Compound {
                definition: definition.name().to_string(),
            },
            input_widths: definition.input_widths().to_vec(),
            output_widths: definition.output_widths().to_vec(),
            input_labels: definition.input_labels().to_vec(),
            output_labels: definition.output_labels().to_vec(),
        }
    }

    pub fn with_labels(mut self, input_labels: Vec<String>, output_labels: Vec<String>) -> Self {
        self.input_labels = labels_or_blank(Some(input_labels), self.input_widths.len());
        self.output_labels = labels_or_blank(Some(output_labels), self.output_widths.len());
        self
    }

    pub fn uid(&self) -> GateId {
        self.uid
    }

    pub fn kind(&self) -> &GateKind {
        &self.kind
    }

    pub fn type_name(&self) -> &str {
        self.kind.type_name()
    }

    pub fn input_widths(&self) -> &[usize] {
        &self.input_widths
    }

    pub fn output_widths(&self) -> &[usize] {
        &self.output_widths
    }

    pub fn input_labels(&self) -> &[String] {
        &self.input_labels
    }

    pub fn output_labels(&self) -> &[String] {
        &self.output_labels
    }

    pub fn is_boundary(&self) -> bool {
        matches!(self.kind, GateKind::Source | GateKind::Sink)
    }

    /// The definition this gate instantiates, if it is a compound.
    pub fn definition_name(&self) -> Option<&str> {
        match &self.kind {
            GateKind::Compound { definition } => Some(definition),
            _ => None,
        }
    }

    /// Zero values for every input pin.
    pub fn init_inputs(&self) -> Vec<Signal> {
        value::zeros(&self.input_widths)
    }

    /// Same kind, shape and labels under a fresh uid.
    pub fn duplicate(&self, uid: GateId) -> Self {
        Self {
            uid,
            ..self.clone()
        }
    }

    // Pin shape edits, driven by definition edits and their cascades.

    pub(crate) fn rename_type(&mut self, name: &str) {
        if let GateKind::Compound { definition } = &mut self.kind {
            *definition = name.to_string();
        }
    }

    pub(crate) fn insert_input(&mut self, index: usize, width: usize, label: String) {
        self.input_widths.insert(index, width);
        self.input_labels.insert(index, label);
    }

    pub(crate) fn insert_output(&mut self, index: usize, width: usize, label: String) {
        self.output_widths.insert(index, width);
        self.output_labels.insert(index, label);
    }

    pub(crate) fn remove_input(&mut self, index: usize) {
        self.input_widths.remove(index);
        self.input_labels.remove(index);
    }

    pub(crate) fn remove_output(&mut self, index: usize) {
        self.output_widths.remove(index);
        self.output_labels.remove(index);
    }

    pub(crate) fn swap_inputs(&mut self, a: usize, b: usize) {
        self.input_widths.swap(a, b);
        self.input_labels.swap(a, b);
    }

    pub(crate) fn swap_outputs(&mut self, a: usize, b: usize) {
        self.output_widths.swap(a, b);
        self.output_labels.swap(a, b);
    }

    pub(crate) fn set_input_width(&mut self, index: usize, width: usize) {
        self.input_widths[index] = width;
    }

    pub(crate) fn set_output_width(&mut self, index: usize, width: usize) {
        self.output_widths[index] = width;
    }

    pub(crate) fn set_input_label(&mut self, index: usize, label: String) {
        self.input_labels[index] = label;
    }

    pub(crate) fn set_output_label(&mut self, index: usize, label: String) {
        self.output_labels[index] = label;
    }

    /// The internal state a fresh gate starts with. Stateless gates, and
    /// compounds whose definition keeps nothing, return `None`.
    pub fn init_state(&self, ctx: &EvalContext<'_>) -> Result<Option<InternalState>> {
        match &self.kind {
            GateKind::Constant => Ok(Some(InternalState::Held(value::zeros(&self.output_widths)))),
            GateKind::Compound { definition } => {
                let states = ctx.definition(definition)?.init_instance_state(ctx)?;
                Ok(Some(InternalState::Nested(states)).filter(|state| !state.is_empty()))
            }
            _ => Ok(None),
        }
    }

    /// Compute outputs from `inputs`, updating `state` in place.
    ///
    /// Boundary gates return nothing: the evaluation walk feeds the Source
    /// and collects the Sink itself.
    pub fn call(
        &self,
        ctx: &EvalContext<'_>,
        inputs: &[Signal],
        state: Option<&mut InternalState>,
    ) -> Result<Vec<Signal>> {
        match &self.kind {
            GateKind::Nand => {
                let bit = |i: usize| inputs.get(i).and_then(Signal::as_bit);
                let out = match (bit(0), bit(1)) {
                    (Some(a), Some(b)) => Signal::Bit(!(a && b)),
                    _ => Signal::Unknown,
                };
                Ok(vec![out])
            }
            GateKind::Source | GateKind::Sink => Ok(Vec::new()),
            GateKind::Constant => match state {
                Some(InternalState::Held(values)) => Ok(values.clone()),
                Some(InternalState::Nested(_)) => Err(self.state_kind_error()),
                None => Ok(value::zeros(&self.output_widths)),
            },
            GateKind::Reshaper => Ok(self.reshape(inputs)),
            GateKind::Datetime => {
                let width = self.output_widths.first().copied().unwrap_or(0);
                Ok(vec![time_bits(ctx.clock().now_secs(), width)])
            }
            GateKind::Compound { definition } => {
                let definition = ctx.definition(definition)?;
                match state {
                    Some(InternalState::Nested(states)) => {
                        definition.process_state(ctx, inputs, states, false)
                    }
                    Some(InternalState::Held(_)) => Err(self.state_kind_error()),
                    None => definition.process_state(ctx, inputs, &mut GateStates::new(), false),
                }
            }
        }
    }

    /// [`Gate::call`] for the evaluation walk. A compound that has no state
    /// yet gets an empty nested state, kept only if evaluation filled it, so
    /// an instance whose definition became stateful after it was created
    /// still advances.
    pub fn advance(
        &self,
        ctx: &EvalContext<'_>,
        inputs: &[Signal],
        state: &mut Option<InternalState>,
    ) -> Result<Vec<Signal>> {
        if state.is_none() && matches!(self.kind, GateKind::Compound { .. }) {
            *state = Some(InternalState::Nested(GateStates::new()));
        }
        let outputs = self.call(ctx, inputs, state.as_mut());
        if state.as_ref().is_some_and(InternalState::is_empty) {
            *state = None;
        }
        outputs
    }

    fn reshape(&self, inputs: &[Signal]) -> Vec<Signal> {
        // `None` marks a bit whose pin was unknown.
        let mut bits: Vec<Option<bool>> = Vec::with_capacity(self.input_widths.iter().sum());
        for (i, &width) in self.input_widths.iter().enumerate() {
            let mut known = Vec::with_capacity(width);
            match inputs.get(i) {
                Some(input) if input.fits(width) && input.flatten_into(&mut known) => {
                    bits.extend(known.into_iter().map(Some));
                }
                _ => bits.extend(std::iter::repeat(None).take(width)),
            }
        }

        let mut offset = 0;
        self.output_widths
            .iter()
            .map(|&width| {
                let slice = &bits[offset..offset + width];
                offset += width;
                match slice.iter().copied().collect::<Option<Vec<bool>>>() {
                    Some(known) if width == 1 => Signal::Bit(known[0]),
                    Some(known) => Signal::Bits(known),
                    None => Signal::Unknown,
                }
            })
            .collect()
    }

    fn state_kind_error(&self) -> Error {
        Error::StateKind {
            uid: self.uid,
            gate_type: self.type_name().to_string(),
        }
    }
}

/// `secs` as a big-endian bit vector of `width` bits, truncated to the low bits.
fn time_bits(secs: u64, width: usize) -> Signal {
    let bits = (0..width)
        .map(|i| {
            let shift = width - 1 - i;
            shift < 64 && (secs >> shift) & 1 == 1
        })
        .collect();
    Signal::from_bits(bits)
}
