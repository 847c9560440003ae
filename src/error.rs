//! Engine errors.

use thiserror::Error;

use crate::gate::GateId;
use crate::graph::GraphError;

/// Engine result type
pub type Result<T> = std::result::Result<T, Error>;

/// Which side of a gate a pin sits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinSide {
    Input,
    Output,
}

impl std::fmt::Display for PinSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PinSide::Input => write!(f, "input"),
            PinSide::Output => write!(f, "output"),
        }
    }
}

/// Errors raised by structural operations, evaluation and persistence.
///
/// Everything except [`Error::HasDependents`] and [`Error::InvalidState`] is a
/// validation failure: the operation was rejected before anything changed.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    #[error("definition `{0}` already exists")]
    DuplicateDefinition(String),

    #[error("definition `{0}` does not exist")]
    UnknownDefinition(String),

    #[error("`{0}` is a builtin gate and cannot be changed")]
    BuiltinGate(String),

    #[error("gate {uid} is not in definition `{definition}`")]
    UnknownGate { definition: String, uid: GateId },

    #[error("gate {uid} is already in definition `{definition}`")]
    DuplicateGate { definition: String, uid: GateId },

    #[error("gate uid {0} was not handed out by this project")]
    ForeignUid(GateId),

    #[error("instance {uid} of `{gate_type}` does not match its definition's pins")]
    StaleInstance { uid: GateId, gate_type: String },

    #[error("invalid {side} pin {index} for gate {uid}")]
    PinOutOfRange {
        uid: GateId,
        side: PinSide,
        index: usize,
    },

    #[error("mismatched widths: output {from:?} has width {from_width}, input {to:?} has width {to_width}")]
    WidthMismatch {
        from: (GateId, usize),
        to: (GateId, usize),
        from_width: usize,
        to_width: usize,
    },

    #[error("invalid pin width {0}")]
    InvalidWidth(usize),

    #[error("reshaper takes {inputs} bits but produces {outputs}")]
    ReshapeMismatch { inputs: usize, outputs: usize },

    #[error("recursive definition: `{gate_type}` depends on `{definition}`")]
    RecursiveDefinition { definition: String, gate_type: String },

    #[error("invalid {what} index {index}")]
    IndexOutOfRange { what: &'static str, index: usize },

    #[error("no connection from {from:?} to {to:?}")]
    UnknownConnection {
        from: (GateId, usize),
        to: (GateId, usize),
    },

    #[error("cannot {action} the {gate_type} gate")]
    BoundaryGate {
        action: &'static str,
        gate_type: &'static str,
    },

    #[error("expected {expected} values, got {got}")]
    ValueCount { expected: usize, got: usize },

    #[error("value for pin {index} does not fit width {width}")]
    ValueShape { index: usize, width: usize },

    #[error("gate {uid} ({gate_type}) does not accept this state")]
    StateKind { uid: GateId, gate_type: String },

    /// Recoverable: the caller must confirm with `force`.
    #[error("other definitions depend on `{name}`: {dependents:?}")]
    HasDependents {
        name: String,
        dependents: Vec<String>,
    },

    /// Bookkeeping went wrong somewhere in an edit cascade.
    #[error("invalid state in `{definition}`: {message}")]
    InvalidState { definition: String, message: String },

    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error("serialization error: {0}")]
    Serde(String),

    #[error("io error: {0}")]
    Io(String),
}

impl Error {
    /// True for the "has dependents" condition that `force` overrides.
    pub fn is_dependency_warning(&self) -> bool {
        matches!(self, Error::HasDependents { .. })
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serde(err.to_string())
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err.to_string())
    }
}
