//! The transform stage: order flattening, instrument repacking,
//! transpose-equivalent dedup and the persistent-effect rewrites.
//!
//! The output is still in decoded form; [`freeze_song`] bakes the effect
//! renumbering into 3-byte wire rows for the encode stages.

mod dedup;
mod persist;

pub use dedup::dedup_patterns;
pub use persist::rewrite_persistent;

use sidforge_model::layout::{MAX_ORDERS, MAX_PATTERNS};
use sidforge_model::pattern::FrozenPattern;
use sidforge_model::{
    EffectRemap, ForgeError, Instrument, OrderEntry, Pattern, Result, RowEffect, Song, CHANNELS,
    PATTERN_ROWS,
};

use crate::analyze::Analysis;
use crate::remap::InstrumentRemap;

/// A song after the transform stage: flattened reachable orders, repacked
/// instruments, canonical patterns, rewritten persistent effects.
#[derive(Debug, Clone)]
pub struct TransformedSong {
    /// Source index (0-based).
    pub index: usize,
    /// Instruments in their new slots.
    pub instruments: Vec<Instrument>,
    /// Flattened per-channel order lists (playback sequence).
    pub orders: [Vec<OrderEntry>; CHANNELS],
    /// Canonical patterns.
    pub patterns: Vec<Pattern>,
    /// Wavetable bytes (reindexed into the global table later).
    pub wave_table: Vec<u8>,
    /// Per-song arp table.
    pub arp_table: Vec<u8>,
    /// Per-song filter table.
    pub filter_table: Vec<u8>,
    /// Initial speed.
    pub speed: u8,
}

/// A song with the renumbering baked into wire rows; input to the encode
/// stages.
#[derive(Debug, Clone)]
pub struct FrozenSong {
    /// Source index (0-based).
    pub index: usize,
    /// Instruments in their new slots.
    pub instruments: Vec<Instrument>,
    /// Flattened per-channel order lists.
    pub orders: [Vec<OrderEntry>; CHANNELS],
    /// Wire-form patterns.
    pub patterns: Vec<FrozenPattern>,
    /// Wavetable bytes.
    pub wave_table: Vec<u8>,
    /// Per-song arp table.
    pub arp_table: Vec<u8>,
    /// Per-song filter table.
    pub filter_table: Vec<u8>,
    /// Initial speed.
    pub speed: u8,
}

/// Observable row count of each flattened order: one past the minimum
/// break row across the three channels.
pub fn order_row_limits(patterns: &[Pattern], orders: &[Vec<OrderEntry>; CHANNELS]) -> Vec<usize> {
    (0..orders[0].len())
        .map(|position| {
            (0..CHANNELS)
                .filter_map(|ch| {
                    let pattern = &patterns[orders[ch][position].pattern as usize];
                    pattern.rows.iter().position(|r| {
                        matches!(
                            r.effect,
                            RowEffect::PatternBreak | RowEffect::PosJump(_)
                        )
                    })
                })
                .min()
                .map(|row| (row + 1).min(PATTERN_ROWS))
                .unwrap_or(PATTERN_ROWS)
        })
        .collect()
}

/// One channel's observable rows, order by order.
pub fn channel_rows(
    patterns: &[Pattern],
    orders: &[Vec<OrderEntry>; CHANNELS],
    channel: usize,
) -> Vec<Vec<sidforge_model::Row>> {
    let limits = order_row_limits(patterns, orders);
    orders[channel]
        .iter()
        .zip(limits.iter())
        .map(|(entry, &limit)| {
            let pattern = &patterns[entry.pattern as usize];
            (0..limit).map(|r| pattern.row(r)).collect()
        })
        .collect()
}

/// Run the whole transform stage on one parsed song.
pub fn transform(
    song: &Song,
    analysis: &Analysis,
    inst_remap: &InstrumentRemap,
) -> Result<TransformedSong> {
    // Flatten the reachable orders into the new playback sequence.
    let mut orders: [Vec<OrderEntry>; CHANNELS] = Default::default();
    for (ch, list) in orders.iter_mut().enumerate() {
        for &order in &analysis.reachable {
            list.push(song.orders[ch][order]);
        }
    }
    if orders[0].len() > MAX_ORDERS {
        return Err(ForgeError::BudgetExceeded {
            what: "orders",
            limit: MAX_ORDERS,
            actual: orders[0].len(),
        });
    }

    // Compact the pattern table to the referenced set, in address order.
    let mut referenced = vec![false; song.patterns.len()];
    for list in &orders {
        for entry in list {
            referenced[entry.pattern as usize] = true;
        }
    }
    let mut new_index = vec![0u8; song.patterns.len()];
    let mut patterns = Vec::new();
    for (old, &keep) in referenced.iter().enumerate() {
        if !keep {
            continue;
        }
        new_index[old] = patterns.len() as u8;
        let mut pattern = song.patterns[old].clone();
        pattern.truncate_at = analysis.truncate_at[old].max(1);
        for row in &mut pattern.rows {
            row.inst = inst_remap.map(row.inst);
            row.effect = match row.effect {
                // Jumps become plain breaks: the flattened sequence already
                // encodes where playback goes next.
                RowEffect::PosJump(_) => RowEffect::PatternBreak,
                RowEffect::FilterTrigger(slot) => {
                    RowEffect::FilterTrigger(inst_remap.map(slot))
                }
                other => other,
            };
        }
        patterns.push(pattern);
    }
    for list in &mut orders {
        for entry in list.iter_mut() {
            entry.pattern = new_index[entry.pattern as usize];
        }
    }

    // Repack instrument slots.
    let mut instruments = vec![Instrument::default(); song.instruments.len()];
    for (old, instrument) in song.instruments.iter().enumerate() {
        instruments[inst_remap.map(old as u8) as usize] = *instrument;
    }

    let mut transformed = TransformedSong {
        index: song.index,
        instruments,
        orders,
        patterns,
        wave_table: song.wave_table.clone(),
        arp_table: song.arp_table.clone(),
        filter_table: song.filter_table.clone(),
        speed: song.speed,
    };

    dedup_patterns(&mut transformed)?;
    rewrite_persistent(&mut transformed)?;

    if transformed.patterns.len() > MAX_PATTERNS {
        return Err(ForgeError::BudgetExceeded {
            what: "patterns",
            limit: MAX_PATTERNS,
            actual: transformed.patterns.len(),
        });
    }

    Ok(transformed)
}

/// Bake the effect renumbering into wire rows.
pub fn freeze_song(song: &TransformedSong, remap: &EffectRemap) -> Result<FrozenSong> {
    let mut patterns = Vec::with_capacity(song.patterns.len());
    for pattern in &song.patterns {
        let rows = pattern
            .rows
            .iter()
            .map(|row| row.pack(remap))
            .collect::<Result<Vec<_>>>()?;
        patterns.push(FrozenPattern {
            rows,
            truncate_at: pattern.truncate_at,
        });
    }
    Ok(FrozenSong {
        index: song.index,
        instruments: song.instruments.clone(),
        orders: song.orders.clone(),
        patterns,
        wave_table: song.wave_table.clone(),
        arp_table: song.arp_table.clone(),
        filter_table: song.filter_table.clone(),
        speed: song.speed,
    })
}
