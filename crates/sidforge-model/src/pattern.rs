//! Patterns: 64-row fragments shared across orders.

use crate::row::{PackedRow, Row};
use crate::PATTERN_ROWS;

/// A pattern in decoded form, as the transform passes see it.
///
/// `truncate_at` is the earliest row at which any channel breaks or jumps
/// when this pattern is played at some order; rows at and after it are
/// unobservable and carry no semantic weight.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pattern {
    /// Row data, at most [`PATTERN_ROWS`] entries.
    pub rows: Vec<Row>,
    /// First unobservable row index (`1..=64`).
    pub truncate_at: u8,
}

impl Pattern {
    /// A pattern from rows, observable in full.
    pub fn new(rows: Vec<Row>) -> Pattern {
        debug_assert!(rows.len() <= PATTERN_ROWS);
        Pattern {
            rows,
            truncate_at: PATTERN_ROWS as u8,
        }
    }

    /// Row at `index`, the zero row past the stored data.
    pub fn row(&self, index: usize) -> Row {
        self.rows.get(index).copied().unwrap_or(Row::ZERO)
    }
}

/// A pattern after the effect/instrument renumbering has been baked into
/// the 3-byte wire rows. The encode stages operate on this form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrozenPattern {
    /// Wire rows, at most [`PATTERN_ROWS`] entries.
    pub rows: Vec<PackedRow>,
    /// First unobservable row index, carried over from the source pattern.
    pub truncate_at: u8,
}

impl FrozenPattern {
    /// Row at `index`, the zero row past the stored data.
    pub fn row(&self, index: usize) -> PackedRow {
        self.rows.get(index).copied().unwrap_or(PackedRow::ZERO)
    }

    /// Observable rows only.
    pub fn observable(&self) -> impl Iterator<Item = PackedRow> + '_ {
        (0..self.truncate_at as usize).map(|i| self.row(i))
    }
}
