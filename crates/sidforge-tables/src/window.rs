//! The expanding-array sliding-window set cover.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;
use rayon::prelude::*;
use sidforge_model::{ForgeError, Result};

/// A solved shared table with one window base per song.
#[derive(Debug, Clone)]
pub struct SolvedWindows {
    /// Shared table bytes, padded so every window lies inside it.
    pub table: Vec<u8>,
    /// Per-song window base indices.
    pub bases: Vec<usize>,
}

/// A finished permutation's result.
#[derive(Debug, Clone)]
struct Candidate {
    len: usize,
    /// Song processing order; the stable tie-break key.
    order: Vec<usize>,
    table: Vec<u8>,
    bases: Vec<usize>,
}

/// Grow the table to cover one song's set; returns the chosen window base.
///
/// Every base `0..=len` is scanned; the leftmost base needing the fewest
/// appended bytes wins, and the uncovered elements are appended in sorted
/// order.
///
/// Precondition: `set.len() <= window` ([`solve_windows`] rejects larger
/// sets up front). Without it no base is feasible and the selection below
/// would panic.
fn extend(table: &mut Vec<u8>, set: &BTreeSet<u8>, window: usize) -> usize {
    debug_assert!(set.len() <= window);
    let len = table.len();
    let mut best: Option<(usize, usize)> = None;
    for base in 0..=len {
        let end = (base + window).min(len);
        let covered = set.iter().filter(|v| table[base..end].contains(v)).count();
        let needed = set.len() - covered;
        // Appended bytes land at the tail; they must still fall inside the
        // window.
        if needed > 0 && base + window < len + needed {
            continue;
        }
        let new_len = len + needed;
        if best.map(|(b, _)| new_len < b).unwrap_or(true) {
            best = Some((new_len, base));
        }
    }
    // With the set no larger than the window, base = len always fits: the
    // whole set can be appended inside a fresh window.
    let (_, base) = best.expect("set fits one window");
    let end = (base + window).min(table.len());
    let uncovered: Vec<u8> = set
        .iter()
        .filter(|v| !table[base..end].contains(v))
        .copied()
        .collect();
    table.extend(uncovered);
    base
}

/// Heap's algorithm over `items[..k]`.
fn permutations(items: &mut [usize], k: usize, visit: &mut impl FnMut(&[usize])) {
    if k <= 1 {
        visit(items);
        return;
    }
    for i in 0..k {
        permutations(items, k - 1, visit);
        if k % 2 == 0 {
            items.swap(i, k - 1);
        } else {
            items.swap(0, k - 1);
        }
    }
}

/// Solve the shared table for one window size.
pub fn solve_windows(sets: &[BTreeSet<u8>], window: usize) -> Result<SolvedWindows> {
    if sets.is_empty() {
        return Ok(SolvedWindows {
            table: Vec::new(),
            bases: Vec::new(),
        });
    }
    for set in sets {
        if set.len() > window {
            return Err(ForgeError::BudgetExceeded {
                what: if window >= 32 {
                    "delta window elements"
                } else {
                    "transpose window elements"
                },
                limit: window,
                actual: set.len(),
            });
        }
    }

    let n = sets.len();
    let bound = AtomicUsize::new(usize::MAX);
    let best: Mutex<Option<Candidate>> = Mutex::new(None);

    (0..n).into_par_iter().for_each(|first| {
        let mut rest: Vec<usize> = (0..n).filter(|&s| s != first).collect();
        let rest_len = rest.len();
        permutations(&mut rest, rest_len.max(1), &mut |perm: &[usize]| {
            let order: Vec<usize> = std::iter::once(first).chain(perm.iter().copied()).collect();
            let mut table = Vec::new();
            let mut bases = vec![0usize; n];
            for &song in &order {
                // Branch and bound: a longer prefix can never win. Strictly
                // longer only - equal lengths must survive so the stable
                // tie-break decides.
                if table.len() > bound.load(Ordering::Relaxed) {
                    return;
                }
                bases[song] = extend(&mut table, &sets[song], window);
            }
            let len = table.len();
            if len > bound.load(Ordering::Relaxed) {
                return;
            }
            // CAS the shared bound down.
            let mut current = bound.load(Ordering::Relaxed);
            while len < current {
                match bound.compare_exchange_weak(
                    current,
                    len,
                    Ordering::Relaxed,
                    Ordering::Relaxed,
                ) {
                    Ok(_) => break,
                    Err(actual) => current = actual,
                }
            }
            let mut guard = best.lock();
            let replace = match guard.as_ref() {
                None => true,
                Some(c) => len < c.len || (len == c.len && order < c.order),
            };
            if replace {
                *guard = Some(Candidate {
                    len,
                    order,
                    table,
                    bases,
                });
            }
        });
    });

    let candidate = best
        .into_inner()
        .ok_or_else(|| ForgeError::Other("window solver found no candidate".to_string()))?;

    // Pad so every window lies inside the table, then re-check containment.
    let mut table = candidate.table;
    let needed = candidate.bases.iter().map(|b| b + window).max().unwrap_or(window);
    if table.len() < needed {
        table.resize(needed, 0);
    }
    for (song, set) in sets.iter().enumerate() {
        let base = candidate.bases[song];
        let slice = &table[base..base + window];
        for &element in set {
            if !slice.contains(&element) {
                return Err(ForgeError::SolverFailure { song, element });
            }
        }
    }

    Ok(SolvedWindows {
        table,
        bases: candidate.bases,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(values: &[u8]) -> BTreeSet<u8> {
        values.iter().copied().collect()
    }

    #[test]
    fn single_set_fills_one_window() {
        let solved = solve_windows(&[set(&[5, 9, 1])], 8).unwrap();
        assert_eq!(solved.bases, vec![0]);
        assert_eq!(solved.table.len(), 8);
        assert_eq!(&solved.table[..3], &[1, 5, 9]);
    }

    #[test]
    fn disjoint_sets_share_overlapping_windows() {
        // Two sets of 3 with one common element: the table holds 5 bytes of
        // content, both windows of 4 fit over it.
        let a = set(&[1, 2, 3]);
        let b = set(&[3, 4, 5]);
        let solved = solve_windows(&[a.clone(), b.clone()], 4).unwrap();
        assert!(solved.table.len() <= 8);
        for (song, s) in [a, b].iter().enumerate() {
            let base = solved.bases[song];
            let slice = &solved.table[base..base + 4];
            for e in s {
                assert!(slice.contains(e), "song {song} element {e}");
            }
        }
    }

    #[test]
    fn oversized_set_is_rejected() {
        let big = set(&[0, 1, 2, 3, 4]);
        assert!(solve_windows(&[big], 4).is_err());
    }

    #[test]
    fn permutation_search_is_deterministic() {
        let sets = vec![set(&[1, 2]), set(&[2, 3]), set(&[3, 4]), set(&[9])];
        let a = solve_windows(&sets, 3).unwrap();
        let b = solve_windows(&sets, 3).unwrap();
        assert_eq!(a.table, b.table);
        assert_eq!(a.bases, b.bases);
    }

    #[test]
    fn windows_reuse_shared_content() {
        // Identical sets collapse onto one window.
        let sets = vec![set(&[7, 8]); 5];
        let solved = solve_windows(&sets, 16).unwrap();
        assert!(solved.bases.iter().all(|&b| b == 0));
        assert_eq!(solved.table.len(), 16);
    }
}
