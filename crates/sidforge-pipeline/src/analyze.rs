//! Song analysis: playback graph, truncation limits, histograms.
//!
//! Everything downstream keys off this pass: the reachable-order walk
//! decides which orders survive flattening, the truncation limits bound
//! what is observable (and therefore what the encoder must preserve), and
//! the histograms drive the global effect renumbering and the instrument
//! repacking.

use std::collections::BTreeSet;

use sidforge_model::instrument::INSTRUMENT_SLOTS;
use sidforge_model::{
    EffectKind, ForgeError, Result, RowEffect, Song, CHANNELS, PATTERN_ROWS,
};

/// Flow facts for one order position.
#[derive(Debug, Clone, Copy)]
pub struct OrderFlow {
    /// Minimum break row across the three channels (63 when nothing breaks).
    pub min_break_row: u8,
    /// Order played next.
    pub next: usize,
}

/// Everything the analyze pass derives from a parsed song.
#[derive(Debug, Clone)]
pub struct Analysis {
    /// Orders in playback sequence from the start order, ending before the
    /// first revisit.
    pub reachable: Vec<usize>,
    /// Per-order flow facts (indexed by original order position).
    pub flow: Vec<OrderFlow>,
    /// Per-pattern first unobservable row (`1..=64`).
    pub truncate_at: Vec<u8>,
    /// Occurrences per numbered effect kind over observable rows.
    pub effect_counts: [u64; EffectKind::ALL.len()],
    /// Occurrences per instrument slot over observable rows.
    pub inst_counts: [u64; INSTRUMENT_SLOTS],
    /// Instrument slots referenced by filter-trigger effects.
    pub filter_triggers: BTreeSet<u8>,
}

/// The earliest break or jump inside one pattern.
fn first_break(song: &Song, pattern: usize) -> Option<(u8, Option<u8>)> {
    song.patterns[pattern]
        .rows
        .iter()
        .enumerate()
        .find_map(|(row, r)| match r.effect {
            RowEffect::PatternBreak => Some((row as u8, None)),
            RowEffect::PosJump(target) => Some((row as u8, Some(target))),
            _ => None,
        })
}

/// Analyze one parsed song.
pub fn analyze(song: &Song) -> Result<Analysis> {
    let order_count = song.order_count();
    let pattern_count = song.patterns.len();

    // Per-order flow: minimum break row and the next order.
    let mut flow = Vec::with_capacity(order_count);
    for order in 0..order_count {
        let mut breaks: [Option<(u8, Option<u8>)>; CHANNELS] = [None; CHANNELS];
        for ch in 0..CHANNELS {
            let pattern = song.orders[ch][order].pattern as usize;
            if pattern >= pattern_count {
                return Err(ForgeError::Input {
                    path: format!("song {}", song.index + 1),
                    reason: format!("order {order} channel {ch} references pattern {pattern}"),
                });
            }
            breaks[ch] = first_break(song, pattern);
        }
        let min_break_row = breaks
            .iter()
            .flatten()
            .map(|&(row, _)| row)
            .min()
            .unwrap_or((PATTERN_ROWS - 1) as u8);
        // The first channel attaining the minimum decides the next order:
        // its jump target, or the sequential successor for a plain break.
        let mut next = (order + 1) % order_count;
        for b in breaks.iter().flatten() {
            if b.0 == min_break_row {
                if let Some(target) = b.1 {
                    next = target as usize % order_count;
                }
                break;
            }
        }
        flow.push(OrderFlow {
            min_break_row,
            next,
        });
    }

    // Reachable walk, terminated on revisit.
    let mut reachable = Vec::new();
    let mut visited = vec![false; order_count];
    let mut order = song.start_order;
    while !visited[order] {
        visited[order] = true;
        reachable.push(order);
        order = flow[order].next;
    }

    // Truncation limits over reachable orders only.
    let mut truncate_at = vec![0u8; pattern_count];
    for &order in &reachable {
        let limit = (flow[order].min_break_row as usize + 1).min(PATTERN_ROWS) as u8;
        for ch in 0..CHANNELS {
            let pattern = song.orders[ch][order].pattern as usize;
            truncate_at[pattern] = truncate_at[pattern].max(limit);
        }
    }

    // Histograms over observable rows of reachable patterns.
    let mut effect_counts = [0u64; EffectKind::ALL.len()];
    let mut inst_counts = [0u64; INSTRUMENT_SLOTS];
    let mut filter_triggers = BTreeSet::new();
    let mut counted = vec![false; pattern_count];
    for &order in &reachable {
        for ch in 0..CHANNELS {
            let pattern = song.orders[ch][order].pattern as usize;
            if counted[pattern] {
                continue;
            }
            counted[pattern] = true;
            for row in song.patterns[pattern]
                .rows
                .iter()
                .take(truncate_at[pattern] as usize)
            {
                if let Some(kind) = row.effect.kind() {
                    effect_counts[kind.index()] += 1;
                }
                if let RowEffect::FilterTrigger(slot) = row.effect {
                    filter_triggers.insert(slot);
                    inst_counts[slot as usize & 0x1F] += 1;
                }
                inst_counts[row.inst as usize] += 1;
            }
        }
    }

    Ok(Analysis {
        reachable,
        flow,
        truncate_at,
        effect_counts,
        inst_counts,
        filter_triggers,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use sidforge_model::{OrderEntry, Pattern, Row};

    fn pattern_with(effects: &[(usize, RowEffect)]) -> Pattern {
        let mut rows = vec![Row::ZERO; PATTERN_ROWS];
        for &(at, effect) in effects {
            rows[at].effect = effect;
        }
        Pattern::new(rows)
    }

    fn song_with(patterns: Vec<Pattern>, orders: [Vec<OrderEntry>; CHANNELS]) -> Song {
        let mut song = Song::empty(0);
        song.patterns = patterns;
        song.orders = orders;
        song
    }

    #[test]
    fn sequential_walk_without_breaks() {
        let song = song_with(
            vec![pattern_with(&[])],
            [
                vec![OrderEntry::new(0, 0); 3],
                vec![OrderEntry::new(0, 0); 3],
                vec![OrderEntry::new(0, 0); 3],
            ],
        );
        let a = analyze(&song).unwrap();
        assert_eq!(a.reachable, vec![0, 1, 2]);
        assert_eq!(a.truncate_at[0], 64);
    }

    #[test]
    fn min_break_channel_decides_the_jump() {
        // Channel 0 breaks at row 8 (plain), channel 1 jumps at row 4.
        let p_break = pattern_with(&[(8, RowEffect::PatternBreak)]);
        let p_jump = pattern_with(&[(4, RowEffect::PosJump(0))]);
        let p_plain = pattern_with(&[]);
        let song = song_with(
            vec![p_break, p_jump, p_plain],
            [
                vec![OrderEntry::new(0, 0), OrderEntry::new(2, 0)],
                vec![OrderEntry::new(1, 0), OrderEntry::new(2, 0)],
                vec![OrderEntry::new(2, 0), OrderEntry::new(2, 0)],
            ],
        );
        let a = analyze(&song).unwrap();
        // Order 0 jumps straight back to itself: only one reachable order.
        assert_eq!(a.flow[0].min_break_row, 4);
        assert_eq!(a.flow[0].next, 0);
        assert_eq!(a.reachable, vec![0]);
        // Truncation covers the break row itself.
        assert_eq!(a.truncate_at[0], 5);
        assert_eq!(a.truncate_at[1], 5);
        assert_eq!(a.truncate_at[2], 5);
    }

    #[test]
    fn histograms_count_observable_rows_once() {
        let p = pattern_with(&[
            (0, RowEffect::Arp(0x30)),
            (1, RowEffect::Arp(0x30)),
            (2, RowEffect::FilterTrigger(3)),
            (60, RowEffect::Wave(0x41)),
        ]);
        let p_cut = pattern_with(&[(7, RowEffect::PatternBreak)]);
        let song = song_with(
            vec![p, p_cut],
            [
                vec![OrderEntry::new(0, 0)],
                vec![OrderEntry::new(1, 0)],
                vec![OrderEntry::new(1, 0)],
            ],
        );
        let a = analyze(&song).unwrap();
        // Break at row 7 truncates everything to 8 rows: the Wave at row 60
        // is unobservable.
        assert_eq!(a.effect_counts[EffectKind::Arp.index()], 2);
        assert_eq!(a.effect_counts[EffectKind::Wave.index()], 0);
        assert_eq!(a.effect_counts[EffectKind::FilterTrigger.index()], 1);
        assert!(a.filter_triggers.contains(&3));
    }
}
