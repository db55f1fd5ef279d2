//! Error types shared across the sidforge pipeline.

use crate::registers::RegisterWrite;

/// Error type for all compiler stages.
///
/// Every hard failure aborts the build without writing outputs; only the
/// speculative per-pattern rewrites recover locally (and they do so by
/// reverting the pattern, not by surfacing an error).
#[derive(thiserror::Error, Debug)]
pub enum ForgeError {
    /// Malformed or missing source blob.
    #[error("input error in {path}: {reason}")]
    Input {
        /// Offending file path (or a description of the input).
        path: String,
        /// What was wrong with it.
        reason: String,
    },

    /// A song exceeds one of the hard format caps.
    #[error("budget exceeded: {what} is {actual}, limit {limit}")]
    BudgetExceeded {
        /// The exceeded metric.
        what: &'static str,
        /// The cap the format imposes.
        limit: usize,
        /// The observed value.
        actual: usize,
    },

    /// A stage verifier rejected a rewrite as not semantics-preserving.
    #[error("transform mismatch in {stage}: {detail}")]
    TransformMismatch {
        /// The stage whose verifier fired.
        stage: &'static str,
        /// First observed divergence.
        detail: String,
    },

    /// The virtual player's register-write stream diverged from the reference.
    #[error(
        "trace mismatch at write {index} (frame {frame}): \
         expected {expected}, got {actual}"
    )]
    TraceMismatch {
        /// Index into the flat write stream.
        index: usize,
        /// Frame the diverging write belongs to.
        frame: u32,
        /// Reference write.
        expected: RegisterWrite,
        /// Virtual player write.
        actual: RegisterWrite,
    },

    /// The table solver produced a window that misses a required element.
    #[error("solver failure: song {song} element {element:#04x} not in window")]
    SolverFailure {
        /// Song index (0-based).
        song: usize,
        /// Missing element (as unsigned byte).
        element: u8,
    },

    /// IO error from the filesystem boundary.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error.
    #[error("{0}")]
    Other(String),
}

impl From<String> for ForgeError {
    fn from(s: String) -> Self {
        ForgeError::Other(s)
    }
}

impl From<&str> for ForgeError {
    fn from(s: &str) -> Self {
        ForgeError::Other(s.to_string())
    }
}

/// Result type for compiler operations.
pub type Result<T> = std::result::Result<T, ForgeError>;
