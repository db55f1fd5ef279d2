//! Final blob assembly and the shared include files.
//!
//! The blob is the fixed region map of the new player: order bitstream,
//! instrument records, filter and arp tables, window base bytes, the three
//! dictionary arrays, the pattern pointer array and the placed pattern
//! data. The delta and transpose tables themselves are global; each song
//! stores only its window base and per-order indices into its window.

use sidforge_model::instrument::{INSTRUMENT_BYTES, INSTRUMENT_SLOTS};
use sidforge_model::layout::{
    ARP_OFFSET, DELTA_BASE_OFFSET, DICT_INST_OFFSET, DICT_NOTES_OFFSET, DICT_PARAM_OFFSET,
    FILTER_OFFSET, INSTRUMENTS_OFFSET, ORDERS_OFFSET, POINTERS_OFFSET, TRANSPOSE_BASE_OFFSET,
};
use sidforge_model::{ForgeError, Result, CHANNELS, DELTA_WINDOW, TRANSPOSE_WINDOW};

use crate::layout::LaidOutSong;
use crate::rowdict::RowDict;
use crate::transform::FrozenSong;

/// One song's view into the shared tables.
#[derive(Debug, Clone, Copy)]
pub struct SongWindows<'a> {
    /// The song's 32-byte slice of the shared delta table.
    pub delta_window: &'a [u8],
    /// The song's 16-byte slice of the shared transpose table.
    pub transpose_window: &'a [u8],
    /// Base index of the delta window inside the shared table.
    pub delta_base: u8,
    /// Base index of the transpose window inside the shared table.
    pub transpose_base: u8,
    /// Global trackptr seed: every channel's first delta is relative to it.
    pub start_const: u8,
}

/// Encode one order's four bitstream bytes.
///
/// Layout: byte 0 holds the channel 0 and 1 transpose indices (low/high
/// nibble); byte 1 the low four bits of channel 0's delta index and channel
/// 2's transpose index; byte 2 packs channel 2's delta low bits, channel
/// 1's delta index and channel 0's delta high bit; byte 3 carries channel
/// 2's delta high bits with the spare bits written zero.
fn pack_order(transposes: [u8; CHANNELS], deltas: [u8; CHANNELS]) -> [u8; 4] {
    [
        (transposes[0] & 0x0F) | (transposes[1] << 4),
        (deltas[0] & 0x0F) | (transposes[2] << 4),
        (deltas[2] & 0x03) | ((deltas[1] & 0x1F) << 2) | ((deltas[0] & 0x10) << 3),
        (deltas[2] >> 2) & 0x07,
    ]
}

/// Assemble the final per-song blob.
pub fn serialize_blob(
    song: &FrozenSong,
    dict: &RowDict,
    laid: &LaidOutSong,
    windows: &SongWindows<'_>,
) -> Result<Vec<u8>> {
    debug_assert_eq!(windows.delta_window.len(), DELTA_WINDOW);
    debug_assert_eq!(windows.transpose_window.len(), TRANSPOSE_WINDOW);
    let mut blob = vec![0u8; laid.blob_end];

    // Order bitstream.
    let mut prev = [windows.start_const; CHANNELS];
    for position in 0..song.orders[0].len() {
        let mut transposes = [0u8; CHANNELS];
        let mut deltas = [0u8; CHANNELS];
        for ch in 0..CHANNELS {
            let entry = song.orders[ch][position];
            let t = entry.transpose as u8;
            transposes[ch] = windows
                .transpose_window
                .iter()
                .position(|&v| v == t)
                .ok_or(ForgeError::SolverFailure {
                    song: song.index,
                    element: t,
                })? as u8;
            let d = entry.pattern.wrapping_sub(prev[ch]);
            deltas[ch] = windows
                .delta_window
                .iter()
                .position(|&v| v == d)
                .ok_or(ForgeError::SolverFailure {
                    song: song.index,
                    element: d,
                })? as u8;
            prev[ch] = entry.pattern;
        }
        let bytes = pack_order(transposes, deltas);
        blob[ORDERS_OFFSET + position * 4..ORDERS_OFFSET + position * 4 + 4]
            .copy_from_slice(&bytes);
    }

    // Instrument records for slots 1..=31.
    for slot in 1..INSTRUMENT_SLOTS {
        let at = INSTRUMENTS_OFFSET + (slot - 1) * INSTRUMENT_BYTES;
        blob[at..at + INSTRUMENT_BYTES].copy_from_slice(&song.instruments[slot].to_bytes());
    }

    blob[FILTER_OFFSET..FILTER_OFFSET + song.filter_table.len()]
        .copy_from_slice(&song.filter_table);
    blob[ARP_OFFSET..ARP_OFFSET + song.arp_table.len()].copy_from_slice(&song.arp_table);
    blob[TRANSPOSE_BASE_OFFSET] = windows.transpose_base;
    blob[DELTA_BASE_OFFSET] = windows.delta_base;

    let (notes, insts, params) = dict.arrays();
    blob[DICT_NOTES_OFFSET..DICT_NOTES_OFFSET + notes.len()].copy_from_slice(&notes);
    blob[DICT_INST_OFFSET..DICT_INST_OFFSET + insts.len()].copy_from_slice(&insts);
    blob[DICT_PARAM_OFFSET..DICT_PARAM_OFFSET + params.len()].copy_from_slice(&params);

    for (index, pointer) in laid.pointers.iter().enumerate() {
        let at = POINTERS_OFFSET + index * 2;
        blob[at] = (pointer & 0xFF) as u8;
        blob[at + 1] = (pointer >> 8) as u8;
    }

    for (offset, bytes) in &laid.chunks {
        blob[*offset..*offset + bytes.len()].copy_from_slice(bytes);
    }

    Ok(blob)
}

/// Format one byte table as an assembly include.
fn byte_lines(out: &mut String, bytes: &[u8]) {
    for chunk in bytes.chunks(16) {
        out.push_str("        .byte ");
        for (i, b) in chunk.iter().enumerate() {
            if i > 0 {
                out.push_str(", ");
            }
            out.push_str(&format!("${b:02x}"));
        }
        out.push('\n');
    }
}

/// The shared wavetable include.
pub fn wavetable_include(wavetable: &[u8]) -> String {
    let mut out = String::from("; sidforge generated - do not edit\nwavetable:\n");
    byte_lines(&mut out, wavetable);
    out
}

/// The shared delta/transpose table include.
pub fn tables_include(delta_table: &[u8], start_const: u8, transpose_table: &[u8]) -> String {
    let mut out = String::from("; sidforge generated - do not edit\n");
    out.push_str(&format!("TRACKPTR_START = ${start_const:02x}\n"));
    out.push_str("trackptr_deltas:\n");
    byte_lines(&mut out, delta_table);
    out.push_str("trackptr_transposes:\n");
    byte_lines(&mut out, transpose_table);
    out
}
