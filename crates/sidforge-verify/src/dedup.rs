//! Transpose-dedup soundness: aliased orders must sound the same pitches.

use sidforge_model::{OrderEntry, Pattern, CHANNELS, NOTE_OFF, NOTE_NONE, PATTERN_ROWS};

use crate::Mismatch;

/// Check that every order entry sounds identically before and after the
/// transpose-equivalent pattern dedup.
///
/// Non-note row content must be untouched; for pitched notes the sum of
/// note and order transpose must be preserved.
pub fn verify_dedup(
    before_patterns: &[Pattern],
    before_orders: &[Vec<OrderEntry>; CHANNELS],
    after_patterns: &[Pattern],
    after_orders: &[Vec<OrderEntry>; CHANNELS],
) -> Result<(), Mismatch> {
    for ch in 0..CHANNELS {
        for (position, (b, a)) in before_orders[ch]
            .iter()
            .zip(after_orders[ch].iter())
            .enumerate()
        {
            let bp = &before_patterns[b.pattern as usize];
            let ap = &after_patterns[a.pattern as usize];
            for row in 0..PATTERN_ROWS {
                let br = bp.row(row);
                let ar = ap.row(row);
                if br.inst != ar.inst || br.effect != ar.effect {
                    return Err(Mismatch {
                        what: "dedup non-note content",
                        position: position * PATTERN_ROWS + row,
                        before: br.inst,
                        after: ar.inst,
                    });
                }
                let pitched =
                    |n: u8| n != NOTE_NONE && n != NOTE_OFF;
                if pitched(br.note) {
                    let before_pitch = br.note as i32 + b.transpose as i32;
                    let after_pitch = ar.note as i32 + a.transpose as i32;
                    if before_pitch != after_pitch {
                        return Err(Mismatch {
                            what: "dedup sounded pitch",
                            position: position * PATTERN_ROWS + row,
                            before: br.note,
                            after: ar.note,
                        });
                    }
                } else if br.note != ar.note {
                    return Err(Mismatch {
                        what: "dedup unpitched note",
                        position: position * PATTERN_ROWS + row,
                        before: br.note,
                        after: ar.note,
                    });
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sidforge_model::Row;

    fn pattern_with_notes(notes: &[u8]) -> Pattern {
        let rows = notes
            .iter()
            .map(|&note| Row {
                note,
                inst: 0,
                effect: Default::default(),
            })
            .collect();
        Pattern::new(rows)
    }

    #[test]
    fn shifted_alias_with_adjusted_transpose_passes() {
        let before_patterns = vec![
            pattern_with_notes(&[36, 40, 43]),
            pattern_with_notes(&[38, 42, 45]),
        ];
        let after_patterns = vec![pattern_with_notes(&[36, 40, 43])];
        let before_orders = [
            vec![OrderEntry::new(0, 0), OrderEntry::new(1, 0)],
            vec![OrderEntry::new(1, 5)],
            vec![OrderEntry::new(0, 0)],
        ];
        let after_orders = [
            vec![OrderEntry::new(0, 0), OrderEntry::new(0, 2)],
            vec![OrderEntry::new(0, 7)],
            vec![OrderEntry::new(0, 0)],
        ];
        verify_dedup(&before_patterns, &before_orders, &after_patterns, &after_orders).unwrap();
    }

    #[test]
    fn missing_transpose_adjustment_fails() {
        let before_patterns = vec![
            pattern_with_notes(&[36]),
            pattern_with_notes(&[38]),
        ];
        let after_patterns = vec![pattern_with_notes(&[36])];
        let before_orders = [
            vec![OrderEntry::new(1, 0)],
            vec![OrderEntry::new(0, 0)],
            vec![OrderEntry::new(0, 0)],
        ];
        let after_orders = [
            vec![OrderEntry::new(0, 0)],
            vec![OrderEntry::new(0, 0)],
            vec![OrderEntry::new(0, 0)],
        ];
        let err =
            verify_dedup(&before_patterns, &before_orders, &after_patterns, &after_orders)
                .unwrap_err();
        assert_eq!(err.what, "dedup sounded pitch");
    }
}
