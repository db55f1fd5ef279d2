//! Pattern-index renumbering for delta bandwidth.
//!
//! The order bitstream stores trackptr *deltas* through the shared delta
//! table, so the number of distinct deltas a song uses decides how much of
//! its 32-byte window the solver must cover. Relabeling pattern indices so
//! that patterns adjacent in playback get nearby numbers shrinks that set.
//!
//! Cuthill-McKee over the adjacency graph gives the seed labelings (one per
//! low-degree start node, evaluated in parallel); pairwise and triple swap
//! hill climbing then polishes each, and the best full score wins with a
//! stable tie-break on the start node.

use std::collections::BTreeSet;

use parking_lot::Mutex;
use rayon::prelude::*;
use sidforge_model::{OrderEntry, Result, CHANNELS};

use crate::transform::TransformedSong;

/// How many Cuthill-McKee start nodes are explored.
const MAX_STARTS: usize = 24;

/// A labeling is good enough once its delta set fits half the window.
const SCORE_TARGET: usize = 32;

/// Outcome of the renumbering pass.
#[derive(Debug, Clone, Copy)]
pub struct RenumberStats {
    /// Distinct deltas (including the start-constant delta) before.
    pub score_before: usize,
    /// Distinct deltas after relabeling.
    pub score_after: usize,
}

/// The distinct signed deltas a labeled order list produces, including each
/// channel's initial delta from the start constant.
pub fn delta_set(orders: &[Vec<OrderEntry>; CHANNELS], start_const: u8) -> BTreeSet<i8> {
    let mut set = BTreeSet::new();
    for list in orders {
        let mut prev = start_const;
        for entry in list {
            set.insert(entry.pattern.wrapping_sub(prev) as i8);
            prev = entry.pattern;
        }
    }
    set
}

/// The distinct transposes a song's order lists use.
pub fn transpose_set(orders: &[Vec<OrderEntry>; CHANNELS]) -> BTreeSet<i8> {
    orders
        .iter()
        .flat_map(|list| list.iter().map(|e| e.transpose))
        .collect()
}

/// Distinct-delta count under a relabeling (`label[old] = new`).
fn score(orders: &[Vec<OrderEntry>; CHANNELS], label: &[u8], start_const: u8) -> usize {
    let mut set = BTreeSet::new();
    for list in orders {
        let mut prev = start_const;
        for entry in list {
            let new = label[entry.pattern as usize];
            set.insert(new.wrapping_sub(prev) as i8);
            prev = new;
        }
    }
    set.len()
}

/// Undirected adjacency between patterns consecutive in any channel order.
fn adjacency(orders: &[Vec<OrderEntry>; CHANNELS], n: usize) -> Vec<BTreeSet<usize>> {
    let mut adj = vec![BTreeSet::new(); n];
    for list in orders {
        for pair in list.windows(2) {
            let a = pair[0].pattern as usize;
            let b = pair[1].pattern as usize;
            if a != b {
                adj[a].insert(b);
                adj[b].insert(a);
            }
        }
    }
    adj
}

/// Cuthill-McKee labeling from one start node; disconnected nodes keep
/// their relative index order at the tail.
fn cuthill_mckee(adj: &[BTreeSet<usize>], start: usize) -> Vec<u8> {
    let n = adj.len();
    let mut visited = vec![false; n];
    let mut sequence = Vec::with_capacity(n);
    let mut queue = std::collections::VecDeque::new();
    queue.push_back(start);
    visited[start] = true;
    while let Some(node) = queue.pop_front() {
        sequence.push(node);
        let mut neighbors: Vec<usize> = adj[node].iter().copied().filter(|&m| !visited[m]).collect();
        neighbors.sort_by_key(|&m| (adj[m].len(), m));
        for m in neighbors {
            visited[m] = true;
            queue.push_back(m);
        }
    }
    for node in 0..n {
        if !visited[node] {
            sequence.push(node);
        }
    }
    let mut label = vec![0u8; n];
    for (new, &old) in sequence.iter().enumerate() {
        label[old] = new as u8;
    }
    label
}

/// Pairwise and triple swap hill climbing; the score never increases.
fn hill_climb(
    orders: &[Vec<OrderEntry>; CHANNELS],
    label: &mut [u8],
    start_const: u8,
) -> usize {
    let n = label.len();
    let mut best = score(orders, label, start_const);
    loop {
        if best <= SCORE_TARGET {
            return best;
        }
        let mut improved = false;
        // Pair swaps to a local minimum.
        for i in 0..n {
            for j in i + 1..n {
                label.swap(i, j);
                let s = score(orders, label, start_const);
                if s < best {
                    best = s;
                    improved = true;
                } else {
                    label.swap(i, j);
                }
            }
        }
        if improved {
            continue;
        }
        // Triple rotations once pairs are exhausted. A rotation applied
        // three times is the identity.
        let rotate = |label: &mut [u8], i: usize, j: usize, k: usize| {
            let tmp = label[i];
            label[i] = label[j];
            label[j] = label[k];
            label[k] = tmp;
        };
        'triples: for i in 0..n {
            for j in i + 1..n {
                for k in j + 1..n {
                    for _ in 0..2 {
                        rotate(label, i, j, k);
                        let s = score(orders, label, start_const);
                        if s < best {
                            best = s;
                            improved = true;
                            break 'triples;
                        }
                    }
                    rotate(label, i, j, k);
                }
            }
        }
        if !improved {
            return best;
        }
    }
}

/// Relabel the song's pattern indices to minimize its distinct-delta count.
pub fn renumber_patterns(song: &mut TransformedSong, start_const: u8) -> Result<RenumberStats> {
    let n = song.patterns.len();
    let score_before = delta_set(&song.orders, start_const).len();
    if n <= 1 {
        return Ok(RenumberStats {
            score_before,
            score_after: score_before,
        });
    }

    let adj = adjacency(&song.orders, n);
    let mut starts: Vec<usize> = (0..n).collect();
    starts.sort_by_key(|&v| (adj[v].len(), v));
    starts.truncate(MAX_STARTS);

    let best: Mutex<Option<(usize, usize, Vec<u8>)>> = Mutex::new(None);
    starts.par_iter().for_each(|&start| {
        let mut label = cuthill_mckee(&adj, start);
        let s = hill_climb(&song.orders, &mut label, start_const);
        let mut guard = best.lock();
        let better = match guard.as_ref() {
            None => true,
            // Stable tie-break on the start node.
            Some(&(bs, bstart, _)) => s < bs || (s == bs && start < bstart),
        };
        if better {
            *guard = Some((s, start, label));
        }
    });

    let (score_after, _, label) = best.into_inner().expect("at least one start");

    // Apply the winning relabeling.
    let mut reordered = vec![song.patterns[0].clone(); n];
    for (old, pattern) in song.patterns.iter().enumerate() {
        reordered[label[old] as usize] = pattern.clone();
    }
    song.patterns = reordered;
    for list in &mut song.orders {
        for entry in list.iter_mut() {
            entry.pattern = label[entry.pattern as usize];
        }
    }

    Ok(RenumberStats {
        score_before,
        score_after,
    })
}
