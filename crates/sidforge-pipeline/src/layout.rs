//! Blob layout: gap pooling and pattern placement.
//!
//! The per-song blob is a fixed region map; whatever each region does not
//! use (unused instrument slots, short filter/arp tables, trailing
//! dictionary slots) is pooled as gaps. Patterns with little overlap
//! potential go to the gaps, everything else joins the main pool behind
//! the pointer array, and both sides are overlaid with the greedy
//! superstring before pointers are assigned.

use sidforge_model::instrument::INSTRUMENT_BYTES;
use sidforge_model::layout::{
    make_pointer, ARP_OFFSET, ARP_REGION_LEN, BLOB_LIMIT, DICT_ARRAY_LEN, DICT_INST_OFFSET,
    DICT_NOTES_OFFSET, DICT_PARAM_OFFSET, FILTER_OFFSET, FILTER_REGION_LEN, INSTRUMENTS_OFFSET,
    POINTERS_OFFSET,
};
use sidforge_model::{ForgeError, Result};

use crate::pack::{best_gap_code, encode_pattern, verify_pattern_packing};
use crate::rowdict::RowDict;
use crate::transform::FrozenSong;

/// A song with every pattern placed and pointed to.
#[derive(Debug, Clone)]
pub struct LaidOutSong {
    /// One pointer per pattern: 13-bit offset | gap code.
    pub pointers: Vec<u16>,
    /// Pattern data chunks: `(absolute offset, bytes)`.
    pub chunks: Vec<(usize, Vec<u8>)>,
    /// Total packed pattern bytes before overlay.
    pub packed_bytes: usize,
    /// One past the last byte the blob uses.
    pub blob_end: usize,
}

/// A free region available for pattern data.
struct Gap {
    offset: usize,
    len: usize,
    patterns: Vec<usize>,
    used: usize,
}

/// Longest overlap this pattern's stream has with any other stream, in
/// either direction.
fn overlap_potential(streams: &[Vec<u8>], index: usize) -> usize {
    let mine = &streams[index];
    let mut best = 0;
    for (other_index, other) in streams.iter().enumerate() {
        if other_index == index {
            continue;
        }
        let max = mine.len().min(other.len());
        for k in (best + 1..=max).rev() {
            if mine[mine.len() - k..] == other[..k] || other[other.len() - k..] == mine[..k] {
                best = k;
                break;
            }
        }
    }
    best
}

/// Encode, place and point every pattern of one song.
pub fn lay_out(song: &FrozenSong, dict: &RowDict) -> Result<LaidOutSong> {
    // Encode all patterns and prove each stream round-trips.
    let mut streams = Vec::with_capacity(song.patterns.len());
    let mut gap_codes = Vec::with_capacity(song.patterns.len());
    for pattern in &song.patterns {
        let code = best_gap_code(pattern);
        let stream = encode_pattern(pattern, dict, code)?;
        verify_pattern_packing(pattern, dict, code, &stream)?;
        streams.push(stream);
        gap_codes.push(code);
    }
    let packed_bytes: usize = streams.iter().map(|s| s.len()).sum();

    // Pool the gaps the fixed regions leave behind.
    let used_instruments = song
        .instruments
        .iter()
        .enumerate()
        .skip(1)
        .filter(|(_, i)| !i.is_empty())
        .map(|(slot, _)| slot)
        .max()
        .unwrap_or(0);
    if song.filter_table.len() > FILTER_REGION_LEN {
        return Err(ForgeError::BudgetExceeded {
            what: "filter table bytes",
            limit: FILTER_REGION_LEN,
            actual: song.filter_table.len(),
        });
    }
    if song.arp_table.len() > ARP_REGION_LEN {
        return Err(ForgeError::BudgetExceeded {
            what: "arp table bytes",
            limit: ARP_REGION_LEN,
            actual: song.arp_table.len(),
        });
    }
    let dict_used = dict.occupied_len();
    let instruments_end = INSTRUMENTS_OFFSET + used_instruments * INSTRUMENT_BYTES;
    let mut gaps = Vec::new();
    let mut push_gap = |offset: usize, len: usize| {
        if len > 0 {
            gaps.push(Gap {
                offset,
                len,
                patterns: Vec::new(),
                used: 0,
            });
        }
    };
    push_gap(instruments_end, FILTER_OFFSET - instruments_end);
    push_gap(
        FILTER_OFFSET + song.filter_table.len(),
        FILTER_REGION_LEN - song.filter_table.len(),
    );
    push_gap(
        ARP_OFFSET + song.arp_table.len(),
        ARP_REGION_LEN - song.arp_table.len(),
    );
    push_gap(DICT_NOTES_OFFSET + dict_used, DICT_ARRAY_LEN - dict_used);
    push_gap(DICT_INST_OFFSET + dict_used, DICT_ARRAY_LEN - dict_used);
    push_gap(DICT_PARAM_OFFSET + dict_used, DICT_ARRAY_LEN - dict_used);
    gaps.sort_by_key(|g| (g.len, g.offset));

    // Low-potential patterns fill the gaps, smallest fitting gap first.
    let mut by_potential: Vec<usize> = (0..streams.len()).collect();
    by_potential.sort_by_key(|&i| (overlap_potential(&streams, i), i));
    let mut in_main: Vec<usize> = Vec::new();
    for index in by_potential {
        let len = streams[index].len();
        match gaps
            .iter_mut()
            .find(|g| g.len - g.used >= len) {
            Some(gap) => {
                gap.patterns.push(index);
                gap.used += len;
            }
            None => in_main.push(index),
        }
    }
    in_main.sort_unstable();

    let mut pointers = vec![0u16; streams.len()];
    let mut chunks = Vec::new();

    // Overlay each gap's group; a group that ends up too large for its gap
    // spills back to the main pool.
    for gap in &mut gaps {
        if gap.patterns.is_empty() {
            continue;
        }
        let inputs: Vec<Vec<u8>> = gap.patterns.iter().map(|&i| streams[i].clone()).collect();
        let (merged, offsets) = crate::superstring::greedy_superstring(&inputs);
        if merged.len() > gap.len {
            in_main.extend(gap.patterns.drain(..));
            in_main.sort_unstable();
            continue;
        }
        for (&pattern, &at) in gap.patterns.iter().zip(offsets.iter()) {
            pointers[pattern] = make_pointer(gap.offset + at, gap_codes[pattern]);
        }
        chunks.push((gap.offset, merged));
    }

    // Main pool behind the pointer array.
    let main_offset = POINTERS_OFFSET + 2 * streams.len();
    let inputs: Vec<Vec<u8>> = in_main.iter().map(|&i| streams[i].clone()).collect();
    let (merged, offsets) = crate::superstring::greedy_superstring(&inputs);
    let blob_end = main_offset + merged.len();
    if blob_end > BLOB_LIMIT {
        return Err(ForgeError::BudgetExceeded {
            what: "pattern data bytes",
            limit: BLOB_LIMIT,
            actual: blob_end,
        });
    }
    for (&pattern, &at) in in_main.iter().zip(offsets.iter()) {
        pointers[pattern] = make_pointer(main_offset + at, gap_codes[pattern]);
    }
    if !merged.is_empty() {
        chunks.push((main_offset, merged));
    }

    Ok(LaidOutSong {
        pointers,
        chunks,
        packed_bytes,
        blob_end: blob_end.max(POINTERS_OFFSET + 2 * streams.len()),
    })
}
