//! Wavetable globalization.
//!
//! Every song carries its own wavetable in the legacy image; the new player
//! keeps a single shared table. Each instrument's wave program (its
//! start..end slice) becomes one input to the greedy superstring, and the
//! instrument triples are reindexed into the merged table.

use sidforge_model::{ForgeError, Result};

use crate::superstring::greedy_superstring;
use crate::transform::TransformedSong;

/// Upper bound on the shared table: instrument triples are single bytes
/// and the end index is exclusive.
const WAVETABLE_LIMIT: usize = 255;

/// Merge all songs' wave programs into one shared table and reindex every
/// instrument's wave triple into it. Returns the shared table.
pub fn globalize_wavetables(songs: &mut [TransformedSong]) -> Result<Vec<u8>> {
    // Collect one segment per instrument wave program.
    let mut segments: Vec<Vec<u8>> = Vec::new();
    let mut owners: Vec<(usize, usize)> = Vec::new();
    for (song_index, song) in songs.iter().enumerate() {
        for (slot, instrument) in song.instruments.iter().enumerate() {
            let (start, end) = (instrument.wave_start as usize, instrument.wave_end as usize);
            if end <= start {
                continue;
            }
            if end > song.wave_table.len() {
                return Err(ForgeError::Input {
                    path: format!("song {}", song.index + 1),
                    reason: format!(
                        "instrument {slot} wave program {start}..{end} exceeds table of {}",
                        song.wave_table.len()
                    ),
                });
            }
            segments.push(song.wave_table[start..end].to_vec());
            owners.push((song_index, slot));
        }
    }

    let (global, offsets) = greedy_superstring(&segments);
    if global.len() > WAVETABLE_LIMIT {
        return Err(ForgeError::BudgetExceeded {
            what: "global wavetable bytes",
            limit: WAVETABLE_LIMIT,
            actual: global.len(),
        });
    }

    for (&(song_index, slot), &offset) in owners.iter().zip(offsets.iter()) {
        let instrument = &mut songs[song_index].instruments[slot];
        let len = instrument.wave_end - instrument.wave_start;
        let looped = instrument.wave_loop.saturating_sub(instrument.wave_start);
        instrument.wave_start = offset as u8;
        instrument.wave_end = offset as u8 + len;
        instrument.wave_loop = offset as u8 + looped.min(len.saturating_sub(1));
    }
    for song in songs.iter_mut() {
        song.wave_table = global.clone();
    }
    Ok(global)
}
