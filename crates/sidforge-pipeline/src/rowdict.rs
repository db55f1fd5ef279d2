//! Row dictionary construction.
//!
//! The packed pattern stream names rows by dictionary index. Entry 0 is
//! implicitly the zero row; entries 1..=223 cost one stream byte, higher
//! entries two. Indices are handed out by descending transition count so
//! the cheap range covers the common rows.
//!
//! A previous song's dictionary can seed construction: rows shared between
//! songs keep their old index when that slot is still free, which maximizes
//! byte-identical dictionary regions across the nine blobs.

use std::collections::HashMap;

use sidforge_model::layout::{DICT_ARRAY_LEN, MAX_DICT_ENTRIES};
use sidforge_model::pattern::FrozenPattern;
use sidforge_model::{ForgeError, PackedRow, Result};

/// One song's row dictionary.
#[derive(Debug, Clone, Default)]
pub struct RowDict {
    /// `slots[i]` is entry `i + 1`; `None` is an unoccupied slot.
    slots: Vec<Option<PackedRow>>,
    /// Reverse lookup.
    index_of: HashMap<PackedRow, usize>,
}

impl RowDict {
    /// Count row transitions over the observable rows of every pattern:
    /// a run of equal rows counts once.
    fn transition_counts(patterns: &[FrozenPattern]) -> HashMap<PackedRow, u64> {
        let mut counts = HashMap::new();
        for pattern in patterns {
            let mut prev: Option<PackedRow> = None;
            for row in pattern.observable() {
                if prev != Some(row) && !row.is_zero() {
                    *counts.entry(row).or_insert(0) += 1;
                }
                prev = Some(row);
            }
        }
        counts
    }

    /// Build the dictionary for one song, optionally seeded by the previous
    /// song's dictionary.
    pub fn build(patterns: &[FrozenPattern], previous: Option<&RowDict>) -> Result<RowDict> {
        let counts = Self::transition_counts(patterns);

        let mut ranked: Vec<(PackedRow, u64)> = counts.into_iter().collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));

        if ranked.len() >= MAX_DICT_ENTRIES {
            return Err(ForgeError::BudgetExceeded {
                what: "dictionary entries",
                limit: MAX_DICT_ENTRIES,
                actual: ranked.len() + 1,
            });
        }

        let mut dict = RowDict {
            slots: vec![None; DICT_ARRAY_LEN],
            index_of: HashMap::new(),
        };

        // Keep previous-song indices for shared rows where the slot is free.
        if let Some(previous) = previous {
            let mut shared: Vec<(usize, PackedRow)> = ranked
                .iter()
                .filter_map(|&(row, _)| previous.index(row).map(|i| (i, row)))
                .collect();
            shared.sort_unstable();
            for (index, row) in shared {
                let slot = index - 1;
                if dict.slots[slot].is_none() {
                    dict.slots[slot] = Some(row);
                    dict.index_of.insert(row, index);
                }
            }
        }

        // Remaining rows fill the free slots in descending-frequency order.
        let mut free = (0..DICT_ARRAY_LEN)
            .filter(|&s| dict.slots[s].is_none())
            .collect::<Vec<_>>()
            .into_iter();
        for (row, _) in ranked {
            if dict.index_of.contains_key(&row) {
                continue;
            }
            let slot = free.next().ok_or(ForgeError::BudgetExceeded {
                what: "dictionary entries",
                limit: MAX_DICT_ENTRIES,
                actual: MAX_DICT_ENTRIES + 1,
            })?;
            dict.slots[slot] = Some(row);
            dict.index_of.insert(row, slot + 1);
        }

        Ok(dict)
    }

    /// Dictionary index of a row (0 for the zero row).
    pub fn index(&self, row: PackedRow) -> Option<usize> {
        if row.is_zero() {
            return Some(0);
        }
        self.index_of.get(&row).copied()
    }

    /// Row stored at an index.
    pub fn row(&self, index: usize) -> Option<PackedRow> {
        if index == 0 {
            return Some(PackedRow::ZERO);
        }
        self.slots.get(index - 1).copied().flatten()
    }

    /// Number of occupied entries, including the implicit zero entry.
    pub fn len(&self) -> usize {
        self.index_of.len() + 1
    }

    /// Whether only the zero entry exists.
    pub fn is_empty(&self) -> bool {
        self.index_of.is_empty()
    }

    /// Index one past the highest occupied slot; the trailing slots of the
    /// three arrays are gap space for pattern data.
    pub fn occupied_len(&self) -> usize {
        self.slots
            .iter()
            .rposition(|s| s.is_some())
            .map(|p| p + 1)
            .unwrap_or(0)
    }

    /// The three parallel byte arrays (notes, inst|effect, params).
    pub fn arrays(&self) -> ([u8; DICT_ARRAY_LEN], [u8; DICT_ARRAY_LEN], [u8; DICT_ARRAY_LEN]) {
        let mut notes = [0u8; DICT_ARRAY_LEN];
        let mut insts = [0u8; DICT_ARRAY_LEN];
        let mut params = [0u8; DICT_ARRAY_LEN];
        for (slot, row) in self.slots.iter().enumerate() {
            if let Some(row) = row {
                notes[slot] = row.0[0];
                insts[slot] = row.0[1];
                params[slot] = row.0[2];
            }
        }
        (notes, insts, params)
    }
}
