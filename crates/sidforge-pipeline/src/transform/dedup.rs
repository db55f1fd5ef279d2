//! Transpose-equivalent pattern dedup.
//!
//! Two patterns are transpose-equivalent when every non-note byte matches
//! and all pitched note pairs differ by one constant. Aliasing a pattern to
//! its canonical shifts every referencing order's transpose by that
//! constant, so the sounded pitch is untouched.

use sidforge_model::{
    ForgeError, Pattern, Result, NOTE_NONE, NOTE_OFF, PATTERN_ROWS,
};
use sidforge_verify::verify_dedup;

use super::TransformedSong;

/// The shift that makes `candidate` an alias of `canonical`, if one exists.
///
/// Unpitched notes (none / key-off) must match exactly: a transpose moves
/// only pitched notes, so key-offs cannot alias across a shift.
fn transpose_delta(canonical: &Pattern, candidate: &Pattern) -> Option<i8> {
    let mut delta: Option<i16> = None;
    for row in 0..PATTERN_ROWS {
        let a = canonical.row(row);
        let b = candidate.row(row);
        if a.inst != b.inst || a.effect != b.effect {
            return None;
        }
        let a_pitched = a.note != NOTE_NONE && a.note != NOTE_OFF;
        let b_pitched = b.note != NOTE_NONE && b.note != NOTE_OFF;
        match (a_pitched, b_pitched) {
            (false, false) => {
                if a.note != b.note {
                    return None;
                }
            }
            (true, true) => {
                let d = b.note as i16 - a.note as i16;
                match delta {
                    None => delta = Some(d),
                    Some(prev) if prev != d => return None,
                    _ => {}
                }
            }
            _ => return None,
        }
    }
    let d = delta.unwrap_or(0);
    i8::try_from(d).ok()
}

/// Dedup the pattern table in place; returns the number of aliased
/// patterns.
pub fn dedup_patterns(song: &mut TransformedSong) -> Result<usize> {
    let before_patterns = song.patterns.clone();
    let before_orders = song.orders.clone();

    // In address order: either alias to an earlier canonical or become one.
    let mut canonicals: Vec<usize> = Vec::new();
    let mut alias: Vec<(usize, i8)> = Vec::with_capacity(song.patterns.len());
    for index in 0..song.patterns.len() {
        let found = canonicals.iter().enumerate().find_map(|(canon_pos, &canon_index)| {
            transpose_delta(&song.patterns[canon_index], &song.patterns[index])
                .map(|delta| (canon_pos, delta))
        });
        alias.push(found.unwrap_or_else(|| {
            canonicals.push(index);
            (canonicals.len() - 1, 0)
        }));
    }

    let aliased = song.patterns.len() - canonicals.len();

    // Rebuild the table from the canonicals; a canonical's truncation must
    // cover every member of its group.
    let mut new_patterns: Vec<Pattern> =
        canonicals.iter().map(|&i| song.patterns[i].clone()).collect();
    for (index, &(canon_pos, _)) in alias.iter().enumerate() {
        let t = song.patterns[index].truncate_at;
        new_patterns[canon_pos].truncate_at = new_patterns[canon_pos].truncate_at.max(t);
    }

    for list in &mut song.orders {
        for entry in list.iter_mut() {
            let (canon_pos, delta) = alias[entry.pattern as usize];
            entry.pattern = canon_pos as u8;
            entry.transpose = entry
                .transpose
                .checked_add(delta)
                .ok_or_else(|| ForgeError::TransformMismatch {
                    stage: "transpose dedup",
                    detail: format!(
                        "transpose overflow aliasing pattern {} (delta {delta})",
                        entry.pattern
                    ),
                })?;
        }
    }
    song.patterns = new_patterns;

    verify_dedup(&before_patterns, &before_orders, &song.patterns, &song.orders).map_err(
        |m| ForgeError::TransformMismatch {
            stage: "transpose dedup",
            detail: m.to_string(),
        },
    )?;

    Ok(aliased)
}
