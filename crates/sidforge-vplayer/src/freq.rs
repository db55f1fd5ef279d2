//! Frequency and vibrato tables.

use sidforge_model::{NOTE_FIRST, NOTE_LAST};

/// PAL C64 clock, Hz.
const PAL_CLOCK: f64 = 985_248.0;

/// Note number of A-4 inside the 1..=0x60 note range.
const A4_NOTE: i32 = 58;

/// A-4 reference pitch, Hz.
const A4_HZ: f64 = 440.0;

/// The arp-table absolute value the legacy engine aliases to note 103.
const NOTE_REMAP_FROM: i32 = 127;

/// Its replacement.
const NOTE_REMAP_TO: i32 = 103;

/// Clamp an arithmetic note into the frequency-table range.
///
/// Note 127 remaps to 103 first; this matches the legacy arp-table
/// absolute mode and applies nowhere else.
pub fn clamp_note(note: i32) -> u8 {
    let note = if note == NOTE_REMAP_FROM {
        NOTE_REMAP_TO
    } else {
        note
    };
    note.clamp(NOTE_FIRST as i32, NOTE_LAST as i32) as u8
}

/// Note-to-oscillator-value table for the 95 pitched notes.
///
/// Built at player construction the same way the reference tables were
/// generated: equal temperament around A-4, scaled to the PAL oscillator
/// constant.
#[derive(Debug, Clone)]
pub struct FreqTable {
    values: Vec<u16>,
}

impl FreqTable {
    /// The PAL table.
    pub fn pal() -> FreqTable {
        let values = (NOTE_FIRST..=NOTE_LAST)
            .map(|note| {
                let hz = A4_HZ * 2f64.powf((note as i32 - A4_NOTE) as f64 / 12.0);
                let value = (hz * 16_777_216.0 / PAL_CLOCK).round();
                value.clamp(0.0, 65_535.0) as u16
            })
            .collect();
        FreqTable { values }
    }

    /// Oscillator value for a pitched note (`1..=0x60`).
    pub fn lookup(&self, note: u8) -> u16 {
        let index = (note.clamp(NOTE_FIRST, NOTE_LAST) - NOTE_FIRST) as usize;
        self.values[index]
    }
}

/// Vibrato offsets: 9 depth rows of 16 columns (a quarter wave).
///
/// Positions 16..=31 mirror the columns, phase bit 5 flips the sign; the
/// final offset is added to the frequency with 16-bit wrap.
pub const VIBRATO_TABLE: [[u8; 16]; 9] = [
    [0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0],
    [1, 2, 2, 3, 4, 4, 5, 6, 6, 7, 7, 7, 8, 8, 8, 8],
    [2, 3, 5, 6, 8, 9, 10, 11, 12, 13, 14, 15, 15, 16, 16, 16],
    [2, 5, 7, 9, 11, 13, 15, 17, 19, 20, 21, 22, 23, 24, 24, 24],
    [3, 6, 9, 12, 15, 18, 20, 23, 25, 27, 28, 30, 31, 31, 32, 32],
    [4, 8, 12, 15, 19, 22, 25, 28, 31, 33, 35, 37, 38, 39, 40, 40],
    [5, 9, 14, 18, 23, 27, 30, 34, 37, 40, 42, 44, 46, 47, 48, 48],
    [5, 11, 16, 21, 26, 31, 36, 40, 43, 47, 49, 52, 54, 55, 56, 56],
    [6, 12, 19, 24, 30, 36, 41, 45, 49, 53, 56, 59, 61, 63, 64, 64],
];

/// Vibrato offset for a depth and 6-bit phase position.
pub fn vibrato_offset(depth: u8, position: u8) -> i32 {
    let depth = depth.min(8) as usize;
    let position = position & 0x3F;
    let column = if position & 0x10 != 0 {
        15 - (position & 0x0F)
    } else {
        position & 0x0F
    } as usize;
    let value = VIBRATO_TABLE[depth][column] as i32;
    if position & 0x20 != 0 {
        -value
    } else {
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn a4_lands_on_the_reference_value() {
        let table = FreqTable::pal();
        // 440 Hz * 2^24 / 985248 = 7493.
        assert_eq!(table.lookup(A4_NOTE as u8), 7493);
        // One octave up doubles the oscillator value (within rounding).
        let up = table.lookup(A4_NOTE as u8 + 12) as i32;
        assert!((up - 2 * 7493).abs() <= 1);
    }

    #[test]
    fn table_is_monotonic() {
        let table = FreqTable::pal();
        for note in NOTE_FIRST..NOTE_LAST {
            assert!(table.lookup(note) < table.lookup(note + 1));
        }
    }

    #[test]
    fn note_remap_and_clamp() {
        assert_eq!(clamp_note(127), 0x60); // remapped to 103, then clamped
        assert_eq!(clamp_note(40), 40);
        assert_eq!(clamp_note(-5), NOTE_FIRST);
        assert_eq!(clamp_note(200), NOTE_LAST);
    }

    #[test]
    fn vibrato_mirrors_and_flips() {
        assert_eq!(vibrato_offset(4, 0), 3);
        assert_eq!(vibrato_offset(4, 15), 32);
        // Position 16 mirrors column 15, position 31 mirrors column 0.
        assert_eq!(vibrato_offset(4, 16), 32);
        assert_eq!(vibrato_offset(4, 31), 3);
        // Phase bit 5 negates.
        assert_eq!(vibrato_offset(4, 32), -3);
        assert_eq!(vibrato_offset(4, 47), -32);
    }
}
