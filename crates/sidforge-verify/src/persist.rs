//! Persistent-effect re-simulation.
//!
//! The legacy player and the new player disagree about how long an effect
//! parameter stays live:
//!
//! - **Legacy arp / tone-porta**: the pattern latch is applied for the
//!   effect's own row and for one further row when that row is a NOP (the
//!   legacy row fetch clears the latch only after applying it, so the clear
//!   lands one row late). The latch dies at every pattern boundary and under
//!   any other effect.
//! - **New-player arp / tone-porta**: the parameter persists through NOP
//!   rows indefinitely, across pattern boundaries, until a NOP-HARD or any
//!   other effect.
//! - **Porta up / down**: persist through NOP rows across boundaries in
//!   both players; any other effect clears.
//!
//! The rewrites in the pipeline exist exactly to bridge these models; the
//! verifier here replays both sides and compares the effective parameter
//! row by row.

use sidforge_model::{Row, RowEffect};

use crate::Mismatch;

/// Which persistent effect family a simulation tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersistKind {
    /// Arpeggio.
    Arp,
    /// Tone portamento.
    TonePorta,
    /// Portamento up.
    PortaUp,
    /// Portamento down.
    PortaDown,
}

impl PersistKind {
    /// The tracked parameter carried by a row, if its effect is this kind.
    fn param(self, effect: RowEffect) -> Option<u8> {
        match (self, effect) {
            (PersistKind::Arp, RowEffect::Arp(p)) => Some(p),
            (PersistKind::TonePorta, RowEffect::TonePorta(p)) => Some(p),
            (PersistKind::PortaUp, RowEffect::PortaUp(p)) => Some(p),
            (PersistKind::PortaDown, RowEffect::PortaDown(p)) => Some(p),
            _ => None,
        }
    }

    /// Whether the legacy latch survives pattern boundaries.
    fn crosses_boundaries_in_legacy(self) -> bool {
        matches!(self, PersistKind::PortaUp | PersistKind::PortaDown)
    }
}

/// Effective parameter per row under the legacy player.
///
/// `orders_rows` holds the observable rows of each order in playback
/// sequence for one channel.
pub fn legacy_effective(orders_rows: &[Vec<Row>], kind: PersistKind) -> Vec<u8> {
    let mut stream = Vec::new();
    let mut latch = 0u8;
    // Rows the latch is still valid for; legacy arp/tone-porta clear one
    // row late, porta persists until another effect.
    let mut late_rows = 0u32;
    for rows in orders_rows {
        if !kind.crosses_boundaries_in_legacy() {
            latch = 0;
            late_rows = 0;
        }
        for row in rows {
            if let Some(p) = kind.param(row.effect) {
                latch = p;
                late_rows = 1;
            } else if row.effect.is_nop() {
                match kind {
                    PersistKind::PortaUp | PersistKind::PortaDown => {}
                    _ => {
                        if late_rows > 0 {
                            late_rows -= 1;
                        } else {
                            latch = 0;
                        }
                    }
                }
            } else {
                latch = 0;
                late_rows = 0;
            }
            stream.push(latch);
        }
    }
    stream
}

/// Effective parameter per row under the new player.
pub fn player_effective(orders_rows: &[Vec<Row>], kind: PersistKind) -> Vec<u8> {
    let mut stream = Vec::new();
    let mut latch = 0u8;
    for rows in orders_rows {
        for row in rows {
            if let Some(p) = kind.param(row.effect) {
                latch = p;
            } else if !row.effect.is_nop() {
                // NOP-HARD and every other effect terminate persistence.
                latch = 0;
            }
            stream.push(latch);
        }
    }
    stream
}

/// Compare the legacy stream of the before state against the new-player
/// stream of the after state.
pub fn verify_persistent(
    before: &[Vec<Row>],
    after: &[Vec<Row>],
    kind: PersistKind,
) -> Result<(), Mismatch> {
    let legacy = legacy_effective(before, kind);
    let player = player_effective(after, kind);
    debug_assert_eq!(legacy.len(), player.len());
    for (position, (l, p)) in legacy.iter().zip(player.iter()).enumerate() {
        if l != p {
            return Err(Mismatch {
                what: match kind {
                    PersistKind::Arp => "effective arp",
                    PersistKind::TonePorta => "effective tone-porta",
                    PersistKind::PortaUp => "effective porta-up",
                    PersistKind::PortaDown => "effective porta-down",
                },
                position,
                before: *l,
                after: *p,
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rows(effects: &[RowEffect]) -> Vec<Row> {
        effects
            .iter()
            .map(|&effect| Row {
                note: 0,
                inst: 0,
                effect,
            })
            .collect()
    }

    #[test]
    fn legacy_arp_clears_one_row_late() {
        let seq = vec![rows(&[
            RowEffect::Arp(3),
            RowEffect::Arp(3),
            RowEffect::None,
            RowEffect::None,
        ])];
        assert_eq!(legacy_effective(&seq, PersistKind::Arp), vec![3, 3, 3, 0]);
    }

    #[test]
    fn legacy_arp_dies_at_pattern_boundary() {
        let seq = vec![rows(&[RowEffect::Arp(5)]), rows(&[RowEffect::None])];
        assert_eq!(legacy_effective(&seq, PersistKind::Arp), vec![5, 0]);
    }

    #[test]
    fn legacy_porta_persists_across_boundaries() {
        let seq = vec![
            rows(&[RowEffect::PortaUp(2), RowEffect::None]),
            rows(&[RowEffect::None, RowEffect::Wave(0x41)]),
        ];
        assert_eq!(
            legacy_effective(&seq, PersistKind::PortaUp),
            vec![2, 2, 2, 0]
        );
    }

    #[test]
    fn player_persists_until_nop_hard() {
        let seq = vec![rows(&[
            RowEffect::Arp(3),
            RowEffect::None,
            RowEffect::None,
            RowEffect::NopHard,
            RowEffect::None,
        ])];
        assert_eq!(
            player_effective(&seq, PersistKind::Arp),
            vec![3, 3, 3, 0, 0]
        );
    }

    #[test]
    fn canonical_rewrite_verifies() {
        // ARP $03 ARP $03 NOP NOP  ->  ARP $03 NOP NOP NOP-HARD
        let before = vec![rows(&[
            RowEffect::Arp(3),
            RowEffect::Arp(3),
            RowEffect::None,
            RowEffect::None,
        ])];
        let after = vec![rows(&[
            RowEffect::Arp(3),
            RowEffect::None,
            RowEffect::None,
            RowEffect::NopHard,
        ])];
        verify_persistent(&before, &after, PersistKind::Arp).unwrap();
    }

    #[test]
    fn single_row_flip_is_rejected() {
        let before = vec![rows(&[RowEffect::Arp(3), RowEffect::None])];
        let after = vec![rows(&[RowEffect::Arp(3), RowEffect::NopHard])];
        let err = verify_persistent(&before, &after, PersistKind::Arp).unwrap_err();
        assert_eq!(err.position, 1);
        assert_eq!(err.before, 3);
        assert_eq!(err.after, 0);
    }
}
