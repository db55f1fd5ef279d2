//! Global effect renumbering and per-song instrument repacking.

use sidforge_model::instrument::INSTRUMENT_SLOTS;
use sidforge_model::layout::MAX_FILTER_INSTRUMENTS;
use sidforge_model::{EffectKind, EffectRemap, ForgeError, Result};

use crate::analyze::Analysis;

/// Build the 14-slot effect renumbering from all songs' histograms.
///
/// Kinds are ranked by descending aggregate count; ties break in the
/// deterministic code order of [`EffectKind::ALL`]. Kinds that never occur
/// receive no slot.
pub fn build_effect_remap(analyses: &[Analysis]) -> Result<EffectRemap> {
    let mut totals = [0u64; EffectKind::ALL.len()];
    for analysis in analyses {
        for (i, count) in analysis.effect_counts.iter().enumerate() {
            totals[i] += count;
        }
    }
    let mut ranked: Vec<EffectKind> = EffectKind::ALL
        .into_iter()
        .filter(|k| totals[k.index()] > 0)
        .collect();
    ranked.sort_by_key(|k| (std::cmp::Reverse(totals[k.index()]), k.index()));
    EffectRemap::from_ranking(ranked)
}

/// A permutation of instrument slots for one song.
///
/// Slot 0 (the "no change" sentinel) is fixed. Filter-trigger instruments
/// land in slots 1..=15 because the trigger sub-effect addresses them with
/// a 4-bit field; remaining used instruments follow by descending usage,
/// then the unused slots.
#[derive(Debug, Clone)]
pub struct InstrumentRemap {
    /// `new_slot[old] = new`.
    new_slot: [u8; INSTRUMENT_SLOTS],
}

impl InstrumentRemap {
    /// New slot of an old instrument index.
    pub fn map(&self, old: u8) -> u8 {
        self.new_slot[old as usize & 0x1F]
    }

    /// The full permutation, old-indexed.
    pub fn table(&self) -> &[u8; INSTRUMENT_SLOTS] {
        &self.new_slot
    }
}

/// Build the slot permutation for one song.
pub fn build_instrument_remap(analysis: &Analysis) -> Result<InstrumentRemap> {
    if analysis.filter_triggers.len() > MAX_FILTER_INSTRUMENTS {
        return Err(ForgeError::BudgetExceeded {
            what: "filter-trigger instruments",
            limit: MAX_FILTER_INSTRUMENTS,
            actual: analysis.filter_triggers.len(),
        });
    }

    let used = |slot: usize| analysis.inst_counts[slot] > 0;

    // Filter triggers first, by descending usage then slot order.
    let mut triggers: Vec<u8> = analysis.filter_triggers.iter().copied().collect();
    triggers.sort_by_key(|&s| (std::cmp::Reverse(analysis.inst_counts[s as usize]), s));

    let mut order: Vec<u8> = triggers.clone();
    let mut others: Vec<u8> = (1..INSTRUMENT_SLOTS as u8)
        .filter(|&s| used(s as usize) && !analysis.filter_triggers.contains(&s))
        .collect();
    others.sort_by_key(|&s| (std::cmp::Reverse(analysis.inst_counts[s as usize]), s));
    order.extend(others);
    order.extend((1..INSTRUMENT_SLOTS as u8).filter(|&s| !used(s as usize) && !analysis.filter_triggers.contains(&s)));

    let mut new_slot = [0u8; INSTRUMENT_SLOTS];
    for (position, &old) in order.iter().enumerate() {
        new_slot[old as usize] = (position + 1) as u8;
    }
    Ok(InstrumentRemap { new_slot })
}
