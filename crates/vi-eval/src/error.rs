//! Runtime fault, diagnostic and session error types.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use vi_types::LoadError;

/// A fault raised while evaluating an expression or executing a statement.
///
/// Recoverable faults are turned into a [`Diagnostic`] at the outermost
/// expression or statement boundary. Budget faults ([`Fault::is_abort`])
/// unwind the whole event.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Fault {
    /// Incompatible operand kinds, non-list iteration, bad built-in arguments.
    #[error("type mismatch: {0}")]
    TypeMismatch(String),

    /// List index outside `0..len` or not integral.
    #[error("index {index} out of range for list of length {len}")]
    IndexOutOfRange { index: f64, len: usize },

    /// The event consumed more steps than its gas limit.
    #[error("gas exhausted after {0} steps")]
    GasExhausted(u64),

    /// Nested user-function calls went deeper than the configured limit.
    #[error("call depth exceeded (limit {0})")]
    CallDepthExceeded(usize),
}

impl Fault {
    /// Budget faults abort the current event instead of degrading to null.
    pub fn is_abort(&self) -> bool {
        matches!(self, Self::GasExhausted(_) | Self::CallDepthExceeded(_))
    }

    pub fn kind(&self) -> DiagnosticKind {
        match self {
            Self::TypeMismatch(_) => DiagnosticKind::TypeMismatch,
            Self::IndexOutOfRange { .. } => DiagnosticKind::IndexOutOfRange,
            Self::GasExhausted(_) | Self::CallDepthExceeded(_) => DiagnosticKind::BudgetExhausted,
        }
    }

    pub(crate) fn mismatch(message: impl Into<String>) -> Self {
        Self::TypeMismatch(message.into())
    }
}

/// Result alias for evaluator operations.
pub type EvalResult<T> = Result<T, Fault>;

// ══════════════════════════════════════════════════════════════════════════════
// Diagnostics
// ══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticKind {
    TypeMismatch,
    IndexOutOfRange,
    UnresolvedName,
    ConstraintMissing,
    AmbiguousName,
    BudgetExhausted,
}

impl DiagnosticKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::TypeMismatch => "type_mismatch",
            Self::IndexOutOfRange => "index_out_of_range",
            Self::UnresolvedName => "unresolved_name",
            Self::ConstraintMissing => "constraint_missing",
            Self::AmbiguousName => "ambiguous_name",
            Self::BudgetExhausted => "budget_exhausted",
        }
    }
}

/// A non-fatal problem recorded during evaluation or resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub message: String,
}

impl Diagnostic {
    pub fn new(kind: DiagnosticKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl From<&Fault> for Diagnostic {
    fn from(fault: &Fault) -> Self {
        Self::new(fault.kind(), fault.to_string())
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind.as_str(), self.message)
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Fatal errors
// ══════════════════════════════════════════════════════════════════════════════

/// Resolution could not produce a root descriptor.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ResolveError {
    /// The root widget uses a percentage or `max` extent but the host gave
    /// no available size on that axis.
    #[error("root widget `{widget}` needs an available {axis} for its size")]
    ConstraintMissing { widget: String, axis: &'static str },
}

/// Errors that stop a session from being created or rendered.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Load(#[from] LoadError),

    #[error(transparent)]
    Resolve(#[from] ResolveError),

    /// Evaluating initial state exhausted the step budget.
    #[error("state initialization failed: {0}")]
    Init(Fault),
}

pub type SessionResult<T> = Result<T, SessionError>;
