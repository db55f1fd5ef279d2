//! Pattern packing: gap codes plus the byte-stream encoding.
//!
//! A pattern first picks its gap code: the largest implicit-zero spacing
//! whose gap positions are all zero rows inside the observable region. Only
//! the non-gap slots are then encoded with the stream alphabet (zero runs,
//! dictionary indices, RLE of the previous row, note-only updates, extended
//! indices).
//!
//! The decoder lives next to the encoder and is the round-trip oracle for
//! every packed pattern; the runtime player implements the same alphabet
//! incrementally.

use sidforge_model::layout::{
    DICT_EXTENDED_BASE, DICT_PRIMARY_MAX, GAP_COUNTS, OP_DICT_BASE, OP_EXTENDED, OP_NOTE,
    OP_RLE_BASE, OP_ZERO_MAX, RLE_MAX_RUN,
};
use sidforge_model::pattern::FrozenPattern;
use sidforge_model::{ForgeError, PackedRow, Result, PATTERN_ROWS};

use crate::rowdict::RowDict;

/// Pick the best gap code for a pattern: the largest gap count whose
/// implicit positions are all zero inside the observable region.
pub fn best_gap_code(pattern: &FrozenPattern) -> u8 {
    let observable = pattern.truncate_at as usize;
    let mut best = 0u8;
    for (code, &gap) in GAP_COUNTS.iter().enumerate().skip(1) {
        let spacing = gap + 1;
        let mut ok = true;
        'slots: for slot_start in (0..PATTERN_ROWS).step_by(spacing) {
            for k in 1..=gap {
                let position = slot_start + k;
                if position >= observable {
                    break 'slots;
                }
                if !pattern.row(position).is_zero() {
                    ok = false;
                    break 'slots;
                }
            }
        }
        if ok {
            best = code as u8;
        }
    }
    best
}

/// Encode one pattern's non-gap slots into the stream alphabet.
pub fn encode_pattern(
    pattern: &FrozenPattern,
    dict: &RowDict,
    gap_code: u8,
) -> Result<Vec<u8>> {
    let spacing = GAP_COUNTS[gap_code as usize] + 1;
    let observable = pattern.truncate_at as usize;
    let slots: Vec<PackedRow> = (0..observable)
        .step_by(spacing)
        .map(|p| pattern.row(p))
        .collect();

    let mut out = Vec::new();
    let mut prev: Option<PackedRow> = None;
    let mut i = 0usize;
    while i < slots.len() {
        let row = slots[i];
        if row.is_zero() {
            // Zero run: one byte covers up to 16 rows.
            let mut run = 1usize;
            while i + run < slots.len() && slots[i + run].is_zero() && run < 16 {
                run += 1;
            }
            out.push((run - 1) as u8);
            debug_assert!(out[out.len() - 1] <= OP_ZERO_MAX);
            i += run;
            prev = Some(PackedRow::ZERO);
            continue;
        }
        if prev == Some(row) {
            // RLE of the previous row.
            let mut run = 1usize;
            while i + run < slots.len() && slots[i + run] == row && run < RLE_MAX_RUN {
                run += 1;
            }
            out.push(OP_RLE_BASE + (run - 1) as u8);
            i += run;
            continue;
        }
        let index = dict.index(row).ok_or_else(|| ForgeError::TransformMismatch {
            stage: "pattern packing",
            detail: format!("row {:02x?} missing from dictionary", row.0),
        })?;
        if index <= DICT_PRIMARY_MAX {
            out.push(OP_DICT_BASE + (index - 1) as u8);
        } else if prev.map(|p| !p.is_zero() && p.with_note(row.note()) == row) == Some(true) {
            // Same price as an extended index, but independent of the
            // dictionary slot.
            out.push(OP_NOTE);
            out.push(row.note());
        } else {
            let extended = index - DICT_EXTENDED_BASE;
            if extended > u8::MAX as usize {
                return Err(ForgeError::BudgetExceeded {
                    what: "dictionary index",
                    limit: DICT_EXTENDED_BASE + u8::MAX as usize,
                    actual: index,
                });
            }
            out.push(OP_EXTENDED);
            out.push(extended as u8);
        }
        prev = Some(row);
        i += 1;
    }
    Ok(out)
}

/// Decode `rows` rows of a packed stream (the round-trip oracle).
pub fn decode_pattern(
    stream: &[u8],
    dict: &RowDict,
    gap_code: u8,
    rows: usize,
) -> Result<Vec<PackedRow>> {
    let gap = GAP_COUNTS[gap_code as usize];
    let mut out = Vec::with_capacity(rows);
    let mut prev = PackedRow::ZERO;
    let mut cursor = 0usize;
    let mut next = || -> Result<u8> {
        let b = stream
            .get(cursor)
            .copied()
            .ok_or_else(|| ForgeError::Other("packed stream underrun".to_string()))?;
        cursor += 1;
        Ok(b)
    };
    while out.len() < rows {
        let op = next()?;
        let emitted: Vec<PackedRow> = match op {
            0..=OP_ZERO_MAX => {
                prev = PackedRow::ZERO;
                vec![PackedRow::ZERO; op as usize + 1]
            }
            OP_DICT_BASE..=0xEE => {
                let index = (op - OP_DICT_BASE) as usize + 1;
                prev = dict.row(index).ok_or_else(|| {
                    ForgeError::Other(format!("dictionary index {index} unoccupied"))
                })?;
                vec![prev]
            }
            OP_RLE_BASE..=0xFD => {
                let run = (op - OP_RLE_BASE) as usize + 1;
                vec![prev; run]
            }
            OP_NOTE => {
                let note = next()?;
                prev = prev.with_note(note);
                vec![prev]
            }
            OP_EXTENDED => {
                let index = DICT_EXTENDED_BASE + next()? as usize;
                prev = dict.row(index).ok_or_else(|| {
                    ForgeError::Other(format!("dictionary index {index} unoccupied"))
                })?;
                vec![prev]
            }
        };
        for row in emitted {
            out.push(row);
            if out.len() >= rows {
                break;
            }
            for _ in 0..gap {
                if out.len() >= rows {
                    break;
                }
                out.push(PackedRow::ZERO);
            }
        }
    }
    Ok(out)
}

/// Round-trip check: decoding the encoded stream reproduces the pattern's
/// observable rows.
pub fn verify_pattern_packing(
    pattern: &FrozenPattern,
    dict: &RowDict,
    gap_code: u8,
    stream: &[u8],
) -> Result<()> {
    let observable = pattern.truncate_at as usize;
    let decoded = decode_pattern(stream, dict, gap_code, observable)?;
    for (position, row) in decoded.iter().enumerate() {
        let expected = pattern.row(position);
        if *row != expected {
            return Err(ForgeError::TransformMismatch {
                stage: "pattern packing",
                detail: format!(
                    "row {position} decodes to {:02x?}, expected {:02x?}",
                    row.0, expected.0
                ),
            });
        }
    }
    Ok(())
}
