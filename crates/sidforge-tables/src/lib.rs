//! Shared delta/transpose table solver.
//!
//! Every song draws its trackptr deltas from a 32-byte window of one
//! global table, and its transposes from a 16-byte window of another. The
//! solver finds a short table containing a valid window for every song:
//! a sliding-window set-cover over an expanding byte array.
//!
//! The search fixes each song as the first of a permutation (one worker
//! per song), exhausts the permutations of the rest with Heap's algorithm,
//! and grows the array song by song: slide a window over every base, pick
//! the leftmost base needing the fewest appended bytes, fill with the
//! song's uncovered elements in sorted order. A shared best-so-far length
//! (relaxed atomic load, compare-and-swap update) prunes permutations
//! early; it never influences the choice among equal results, which is
//! resolved by a stable tie-break on the permutation.
//!
//! For deltas the whole search repeats per `START_CONST` candidate, since
//! that constant decides every channel's initial delta. All 256 values are
//! ranked by a cheap union-size proxy and the best few run the full
//! solver in parallel.

mod window;

pub use window::{solve_windows, SolvedWindows};

use std::collections::BTreeSet;

use rayon::prelude::*;
use sidforge_model::{ForgeError, Result, DELTA_WINDOW, TRANSPOSE_WINDOW};

/// How many START_CONST candidates run the full solver.
const CONST_CANDIDATES: usize = 10;

/// Per-song input to the delta solver.
#[derive(Debug, Clone)]
pub struct SongDeltaInput {
    /// Deltas between consecutive trackptrs, independent of the start
    /// constant.
    pub interior: BTreeSet<u8>,
    /// Each channel's first trackptr; the initial delta is relative to
    /// `START_CONST`.
    pub firsts: [u8; 3],
}

impl SongDeltaInput {
    /// The full element set under one start constant.
    pub fn set_for(&self, start_const: u8) -> BTreeSet<u8> {
        let mut set = self.interior.clone();
        for &first in &self.firsts {
            set.insert(first.wrapping_sub(start_const));
        }
        set
    }
}

/// Solved delta table: the shared bytes, per-song window bases and the
/// chosen start constant.
#[derive(Debug, Clone)]
pub struct SolvedDeltas {
    /// Shared table, padded so every window lies inside it.
    pub table: Vec<u8>,
    /// Per-song window base indices.
    pub bases: Vec<usize>,
    /// The winning start constant.
    pub start_const: u8,
}

/// Solve the shared delta table over all songs and start constants.
pub fn solve_deltas(inputs: &[SongDeltaInput]) -> Result<SolvedDeltas> {
    // Rank all 256 constants by the union-size proxy; the union bounds how
    // much distinct content the table must hold.
    let mut ranked: Vec<(usize, u8)> = (0..=255u8)
        .map(|c| {
            let mut union = BTreeSet::new();
            for input in inputs {
                union.extend(input.set_for(c));
            }
            (union.len(), c)
        })
        .collect();
    ranked.sort_unstable();
    ranked.truncate(CONST_CANDIDATES);

    let solved: Vec<(usize, u8, SolvedWindows)> = ranked
        .par_iter()
        .filter_map(|&(_, c)| {
            let sets: Vec<BTreeSet<u8>> = inputs.iter().map(|i| i.set_for(c)).collect();
            solve_windows(&sets, DELTA_WINDOW).ok().map(|w| (w.table.len(), c, w))
        })
        .collect();

    let (_, start_const, windows) = solved
        .into_iter()
        .min_by_key(|&(len, c, _)| (len, c))
        .ok_or_else(|| ForgeError::Other("no start constant admits a delta table".to_string()))?;

    Ok(SolvedDeltas {
        table: windows.table,
        bases: windows.bases,
        start_const,
    })
}

/// Solve the shared transpose table.
pub fn solve_transposes(sets: &[BTreeSet<u8>]) -> Result<SolvedWindows> {
    solve_windows(sets, TRANSPOSE_WINDOW)
}
