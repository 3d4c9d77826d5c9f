//! Compilation failure kinds
//!
//! Two categories with very different meanings. `Unsupported` is a known
//! limitation: the routine fails, the batch continues. `InvalidState` is
//! a compiler defect: a stage reached a state the design declares
//! unreachable, and it must be surfaced distinctly from a missing
//! feature.

use thiserror::Error;

/// Per-routine compilation failure
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CompileError {
    /// A construct this tier has no lowering for
    #[error("{routine}: unsupported construct: {construct}")]
    Unsupported { routine: String, construct: String },

    /// An internal invariant was violated; this is a bug, not a limitation
    #[error("{routine}: compiler defect: {detail}")]
    InvalidState { routine: String, detail: String },
}

impl CompileError {
    pub fn unsupported(routine: impl Into<String>, construct: impl Into<String>) -> Self {
        CompileError::Unsupported {
            routine: routine.into(),
            construct: construct.into(),
        }
    }

    pub fn invalid_state(routine: impl Into<String>, detail: impl Into<String>) -> Self {
        CompileError::InvalidState {
            routine: routine.into(),
            detail: detail.into(),
        }
    }

    /// Whether this failure indicates a compiler defect
    pub fn is_defect(&self) -> bool {
        matches!(self, CompileError::InvalidState { .. })
    }

    /// The identity of the routine that failed
    pub fn routine(&self) -> &str {
        match self {
            CompileError::Unsupported { routine, .. } => routine,
            CompileError::InvalidState { routine, .. } => routine,
        }
    }
}
