//! Row-equivalence cache.
//!
//! An offline exhaustive search (the `-equivtest` mode) finds row-byte
//! substitutions that leave the reference trace bit-identical - rows whose
//! difference the player provably cannot hear in context. The verified
//! pairs are cached on disk, keyed by song, in the legacy byte space so the
//! cache survives renumbering changes between builds.
//!
//! At build time the current song's cached pairs are translated through the
//! effect and instrument remaps and applied greedily: substitutions whose
//! target row is already in use shrink the dictionary outright, the rest
//! may unlock further merges, so application iterates to a fixpoint.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use sidforge_model::pattern::FrozenPattern;
use sidforge_model::{EffectRemap, PackedRow, Row, RowEffect};

use crate::remap::InstrumentRemap;

/// One verified substitution in legacy byte space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Substitution {
    /// Source row bytes.
    pub from: [u8; 3],
    /// Replacement row bytes.
    pub to: [u8; 3],
}

/// Cached equivalences for one song.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SongEquivs {
    /// Verified substitutions, in discovery order.
    pub substitutions: Vec<Substitution>,
    /// Indices into `substitutions` disabled by `-equivvalidate`.
    pub exclusions: Vec<usize>,
}

impl SongEquivs {
    /// The substitutions that are not excluded.
    pub fn active(&self) -> Vec<Substitution> {
        self.substitutions
            .iter()
            .enumerate()
            .filter(|(i, _)| !self.exclusions.contains(i))
            .map(|(_, s)| *s)
            .collect()
    }
}

/// The on-disk cache: one entry per song. Exclusions are strictly
/// per-song; disabling a pair for one song never affects another.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EquivCache {
    /// Per-song equivalences.
    pub songs: Vec<SongEquivs>,
}

impl EquivCache {
    /// Parse from its JSON form.
    pub fn from_json(text: &str) -> serde_json::Result<EquivCache> {
        serde_json::from_str(text)
    }

    /// Serialize to the JSON form written to disk.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// The entry for a song, growing the table on demand.
    pub fn song_mut(&mut self, index: usize) -> &mut SongEquivs {
        if self.songs.len() <= index {
            self.songs.resize_with(index + 1, SongEquivs::default);
        }
        &mut self.songs[index]
    }

    /// The entry for a song, if present.
    pub fn song(&self, index: usize) -> Option<&SongEquivs> {
        self.songs.get(index)
    }
}

/// Translate legacy-space substitutions into the current build's wire rows.
///
/// Pairs whose effects did not survive this build's renumbering are
/// dropped.
pub fn translate_substitutions(
    subs: &[Substitution],
    inst_remap: &InstrumentRemap,
    effect_remap: &EffectRemap,
) -> Vec<(PackedRow, PackedRow)> {
    let translate_row = |bytes: [u8; 3]| -> Option<PackedRow> {
        let legacy = PackedRow(bytes);
        let effect = RowEffect::from_legacy(legacy.effect(), legacy.param()).ok()?;
        let effect = match effect {
            RowEffect::FilterTrigger(slot) => RowEffect::FilterTrigger(inst_remap.map(slot)),
            other => other,
        };
        let row = Row {
            note: legacy.note(),
            inst: inst_remap.map(legacy.inst()),
            effect,
        };
        row.pack(effect_remap).ok()
    };
    subs.iter()
        .filter_map(|s| Some((translate_row(s.from)?, translate_row(s.to)?)))
        .collect()
}

/// Greedily apply substitutions to the frozen patterns; returns the number
/// of rows rewritten.
///
/// Substitutions whose target is already in use are preferred (each one
/// retires a dictionary row); the rest are applied at most once each, and
/// the whole process iterates until nothing changes.
pub fn apply_equivalences(
    patterns: &mut [FrozenPattern],
    subs: &[(PackedRow, PackedRow)],
) -> usize {
    let mut rewritten = 0;
    let mut spent = vec![false; subs.len()];
    loop {
        let used: BTreeSet<PackedRow> = patterns
            .iter()
            .flat_map(|p| p.rows.iter().copied())
            .collect();

        // Shrinking substitutions first, then one speculative widening.
        let usable = |i: usize| {
            !spent[i] && used.contains(&subs[i].0) && subs[i].0 != subs[i].1
        };
        let next = (0..subs.len())
            .find(|&i| usable(i) && used.contains(&subs[i].1))
            .or_else(|| (0..subs.len()).find(|&i| usable(i)));
        let Some(index) = next else {
            break;
        };
        spent[index] = true;
        let (from, to) = subs[index];
        for pattern in patterns.iter_mut() {
            for row in &mut pattern.rows {
                if *row == from {
                    *row = to;
                    rewritten += 1;
                }
            }
        }
    }
    rewritten
}

/// Binary-search a failing substitution set down to the culprits.
///
/// `trace_ok` replays the song with the given substitutions applied and
/// reports whether the trace still matches. Returns indices (into `subs`)
/// to exclude.
pub fn find_exclusions<F>(subs: &[(PackedRow, PackedRow)], trace_ok: &mut F) -> Vec<usize>
where
    F: FnMut(&[(PackedRow, PackedRow)]) -> bool,
{
    fn search<F>(
        subs: &[(PackedRow, PackedRow)],
        indices: &[usize],
        trace_ok: &mut F,
        out: &mut Vec<usize>,
    ) where
        F: FnMut(&[(PackedRow, PackedRow)]) -> bool,
    {
        let selection: Vec<(PackedRow, PackedRow)> =
            indices.iter().map(|&i| subs[i]).collect();
        if trace_ok(&selection) {
            return;
        }
        if indices.len() == 1 {
            out.push(indices[0]);
            return;
        }
        let mid = indices.len() / 2;
        let before = out.len();
        search(subs, &indices[..mid], trace_ok, out);
        search(subs, &indices[mid..], trace_ok, out);
        if out.len() == before {
            // Neither half fails alone: the halves interact, exclude all.
            out.extend_from_slice(indices);
        }
    }

    let indices: Vec<usize> = (0..subs.len()).collect();
    let mut out = Vec::new();
    if !indices.is_empty() {
        search(subs, &indices, trace_ok, &mut out);
    }
    out.sort_unstable();
    out.dedup();
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frozen(rows: Vec<PackedRow>) -> FrozenPattern {
        let truncate_at = rows.len() as u8;
        FrozenPattern { rows, truncate_at }
    }

    fn row(note: u8) -> PackedRow {
        PackedRow::from_parts(note, 1, 0, 0)
    }

    #[test]
    fn translation_follows_both_remaps() {
        use crate::analyze::Analysis;
        use crate::remap::build_instrument_remap;
        use sidforge_model::instrument::INSTRUMENT_SLOTS;
        use sidforge_model::EffectKind;

        // Instrument 7 is the only used one: it repacks to slot 1.
        let mut analysis = Analysis {
            reachable: vec![0],
            flow: Vec::new(),
            truncate_at: Vec::new(),
            effect_counts: [0; EffectKind::ALL.len()],
            inst_counts: [0; INSTRUMENT_SLOTS],
            filter_triggers: Default::default(),
        };
        analysis.inst_counts[7] = 3;
        let inst_remap = build_instrument_remap(&analysis).unwrap();
        let effect_remap =
            sidforge_model::EffectRemap::from_ranking(vec![EffectKind::Wave, EffectKind::Arp])
                .unwrap();

        // Legacy bytes: note 0x20, inst 7, legacy arp (0x9) param 0x47.
        let from = PackedRow::from_parts(0x20, 7, 0x9, 0x47);
        // Legacy wave (0x7) param 0x41 on the same row shape.
        let to = PackedRow::from_parts(0x20, 7, 0x7, 0x41);
        let subs = vec![Substitution {
            from: from.0,
            to: to.0,
        }];
        let translated = translate_substitutions(&subs, &inst_remap, &effect_remap);
        assert_eq!(translated.len(), 1);
        let (tf, tt) = translated[0];
        // Instrument 7 -> 1; arp -> effect number 2, wave -> number 1.
        assert_eq!(tf, PackedRow::from_parts(0x20, 1, 2, 0x47));
        assert_eq!(tt, PackedRow::from_parts(0x20, 1, 1, 0x41));

        // A pair whose effect did not survive the ranking is dropped.
        let porta = PackedRow::from_parts(0, 0, 0x1, 0x10);
        let dropped = vec![Substitution {
            from: porta.0,
            to: to.0,
        }];
        assert!(translate_substitutions(&dropped, &inst_remap, &effect_remap).is_empty());
    }

    #[test]
    fn cache_round_trips_through_json() {
        let mut cache = EquivCache::default();
        cache.song_mut(2).substitutions.push(Substitution {
            from: [1, 2, 3],
            to: [4, 5, 6],
        });
        cache.song_mut(2).exclusions.push(0);
        let text = cache.to_json().unwrap();
        let back = EquivCache::from_json(&text).unwrap();
        assert_eq!(back.songs.len(), 3);
        assert_eq!(back.songs[2].substitutions.len(), 1);
        assert!(back.songs[2].active().is_empty());
    }

    #[test]
    fn shrinking_substitutions_apply_first() {
        let mut patterns = vec![frozen(vec![row(1), row(2), row(3)])];
        // row(3) -> row(9) widens; row(1) -> row(2) shrinks.
        let subs = vec![(row(3), row(9)), (row(1), row(2))];
        let rewritten = apply_equivalences(&mut patterns, &subs);
        assert_eq!(rewritten, 2);
        assert_eq!(patterns[0].rows, vec![row(2), row(2), row(9)]);
    }

    #[test]
    fn chained_substitutions_reach_fixpoint() {
        let mut patterns = vec![frozen(vec![row(1), row(5)])];
        // 1 -> 4 enables 4 -> 5 (shrinking once 4 exists).
        let subs = vec![(row(4), row(5)), (row(1), row(4))];
        let rewritten = apply_equivalences(&mut patterns, &subs);
        assert_eq!(rewritten, 2);
        assert_eq!(patterns[0].rows, vec![row(5), row(5)]);
    }

    #[test]
    fn exclusion_search_isolates_culprits() {
        let subs: Vec<(PackedRow, PackedRow)> =
            (0..8).map(|i| (row(i), row(i + 10))).collect();
        // Substitution 5 breaks the trace whenever applied.
        let mut trace_ok =
            |applied: &[(PackedRow, PackedRow)]| !applied.iter().any(|&(f, _)| f == row(5));
        let exclusions = find_exclusions(&subs, &mut trace_ok);
        assert_eq!(exclusions, vec![5]);
    }

    #[test]
    fn clean_set_yields_no_exclusions() {
        let subs = vec![(row(1), row(2))];
        let mut trace_ok = |_: &[(PackedRow, PackedRow)]| true;
        assert!(find_exclusions(&subs, &mut trace_ok).is_empty());
    }
}
