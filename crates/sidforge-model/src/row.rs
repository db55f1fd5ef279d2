//! Rows and their 3-byte packed form.
//!
//! A row is logically `(note, inst, effect, param)`. The packed form spreads
//! the 4-bit effect number across the spare high bits of the note and
//! instrument bytes:
//!
//! - byte 0: note (7 bits) | effect bit 3 in bit 7
//! - byte 1: instrument (5 bits) | effect bits 0..2 in bits 5..7
//! - byte 2: parameter
//!
//! The hard-restart look-ahead of the runtime player keys on "effect bit 3
//! set", which is why that particular bit rides on the note byte.

use crate::effect::{EffectRemap, RowEffect};
use crate::error::Result;

/// One decoded row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Row {
    /// Note field: 0 none, `1..=0x60` pitched, `0x61` key-off.
    pub note: u8,
    /// Instrument slot, 0 = no change.
    pub inst: u8,
    /// Decoded effect (parameter embedded).
    pub effect: RowEffect,
}

impl Row {
    /// The all-zero row (dictionary entry 0).
    pub const ZERO: Row = Row {
        note: 0,
        inst: 0,
        effect: RowEffect::None,
    };

    /// Whether this row is the implicit zero row.
    pub fn is_zero(&self) -> bool {
        *self == Row::ZERO
    }

    /// Pack through the effect renumbering into the 3-byte wire form.
    pub fn pack(&self, remap: &EffectRemap) -> Result<PackedRow> {
        let (effect, param) = remap.encode(self.effect)?;
        Ok(PackedRow::from_parts(self.note, self.inst, effect, param))
    }
}

/// The 3-byte wire form of a row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct PackedRow(pub [u8; 3]);

impl PackedRow {
    /// The packed zero row.
    pub const ZERO: PackedRow = PackedRow([0, 0, 0]);

    /// Assemble from the four logical fields.
    pub fn from_parts(note: u8, inst: u8, effect: u8, param: u8) -> PackedRow {
        let b0 = (note & 0x7F) | ((effect & 0x08) << 4);
        let b1 = (inst & 0x1F) | ((effect & 0x07) << 5);
        PackedRow([b0, b1, param])
    }

    /// Note field.
    pub fn note(&self) -> u8 {
        self.0[0] & 0x7F
    }

    /// Instrument field.
    pub fn inst(&self) -> u8 {
        self.0[1] & 0x1F
    }

    /// Effect number (0..=15).
    pub fn effect(&self) -> u8 {
        ((self.0[0] >> 4) & 0x08) | (self.0[1] >> 5)
    }

    /// Parameter byte.
    pub fn param(&self) -> u8 {
        self.0[2]
    }

    /// Whether the effect number has bit 3 set (hard-restart look-ahead key).
    pub fn effect_bit3(&self) -> bool {
        self.0[0] & 0x80 != 0
    }

    /// Whether this is the packed zero row.
    pub fn is_zero(&self) -> bool {
        self.0 == [0, 0, 0]
    }

    /// Replace only the note bits, keeping instrument/effect/param.
    pub fn with_note(&self, note: u8) -> PackedRow {
        PackedRow([(self.0[0] & 0x80) | (note & 0x7F), self.0[1], self.0[2]])
    }

    /// Decode back into a [`Row`] through the renumbering.
    pub fn unpack(&self, remap: &EffectRemap) -> Row {
        Row {
            note: self.note(),
            inst: self.inst(),
            effect: remap.decode(self.effect(), self.param()),
        }
    }
}
