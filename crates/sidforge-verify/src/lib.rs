//! Stage verifiers and trace comparison.
//!
//! Every optimization in the pipeline is paired with a property-checking
//! pass from this crate: a pure function over the before and after states
//! that re-simulates the observable the optimization claims to preserve.
//! The end-to-end check compares the virtual player's register-write trace
//! against the reference trace elementwise.
//!
//! Verifiers never mutate anything; a failure carries enough context to
//! pinpoint the first divergence.

pub mod dedup;
pub mod persist;
pub mod trace;

pub use dedup::verify_dedup;
pub use persist::{
    legacy_effective, player_effective, verify_persistent, PersistKind,
};
pub use trace::{compare_traces, TraceDivergence};

/// A rejected rewrite: the first observable divergence a stage verifier
/// found between the before and after states.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("{what} diverges at position {position}: before {before:#04x}, after {after:#04x}")]
pub struct Mismatch {
    /// Which observable diverged.
    pub what: &'static str,
    /// Flattened position of the divergence (stage-specific meaning).
    pub position: usize,
    /// Observable value under the before state.
    pub before: u8,
    /// Observable value under the after state.
    pub after: u8,
}
