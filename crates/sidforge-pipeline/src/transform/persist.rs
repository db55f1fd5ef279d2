//! Persistent-effect rewrites: permanent arp, tone portamento, porta runs.
//!
//! The new player persists arp and tone-porta parameters through NOP rows
//! until a NOP-HARD, and porta up/down parameters through NOP rows as the
//! legacy player already does. The rewrites here exploit that: runs of a
//! repeated effect collapse to a single effect row followed by NOPs, and
//! NOP-HARD terminators land wherever the legacy player's latch died while
//! the new player's would live on.
//!
//! Run collapsing is speculative per pattern: a pattern whose collapse does
//! not re-simulate identically is reverted. Terminator insertion and the
//! whole-song re-simulation are mandatory; a divergence there fails the
//! build.

use sidforge_model::{ForgeError, Result, Row, RowEffect, CHANNELS};
use sidforge_verify::{legacy_effective, player_effective, verify_persistent, PersistKind};

use super::{channel_rows, order_row_limits, TransformedSong};

/// The parameter a row carries for a kind.
fn kind_param(kind: PersistKind, effect: RowEffect) -> Option<u8> {
    match (kind, effect) {
        (PersistKind::Arp, RowEffect::Arp(p)) => Some(p),
        (PersistKind::TonePorta, RowEffect::TonePorta(p)) => Some(p),
        (PersistKind::PortaUp, RowEffect::PortaUp(p)) => Some(p),
        (PersistKind::PortaDown, RowEffect::PortaDown(p)) => Some(p),
        _ => None,
    }
}

/// Collapse runs of one kind inside every pattern; returns the number of
/// rows rewritten to NOP.
fn collapse_runs(song: &mut TransformedSong, kind: PersistKind) -> usize {
    let mut rewritten = 0;
    for pattern in &mut song.patterns {
        let saved = pattern.rows.clone();
        let limit = (pattern.truncate_at as usize).min(pattern.rows.len());
        let mut changed = 0;
        let mut run_param: Option<u8> = None;
        for row in pattern.rows[..limit].iter_mut() {
            match kind_param(kind, row.effect) {
                Some(p) if run_param == Some(p) => {
                    row.effect = RowEffect::None;
                    changed += 1;
                }
                Some(p) => run_param = Some(p),
                None => {
                    if !row.effect.is_nop() {
                        run_param = None;
                    } else if !matches!(kind, PersistKind::PortaUp | PersistKind::PortaDown) {
                        // Arp and tone-porta runs only span strictly
                        // consecutive effect rows.
                        run_param = None;
                    }
                }
            }
        }
        if changed == 0 {
            continue;
        }
        // Speculative: the collapse must be invisible to the new player.
        let before = player_effective(&[saved.clone()], kind);
        let after = player_effective(&[pattern.rows.clone()], kind);
        if before == after {
            rewritten += changed;
        } else {
            pattern.rows = saved;
        }
    }
    rewritten
}

/// Map a flat stream position back to `(order, row)` using the per-order
/// observable limits.
fn locate(limits: &[usize], mut position: usize) -> Option<(usize, usize)> {
    for (order, &limit) in limits.iter().enumerate() {
        if position < limit {
            return Some((order, position));
        }
        position -= limit;
    }
    None
}

/// Insert NOP-HARD terminators until the legacy and new-player streams of
/// both always-persistent kinds agree on every channel.
fn insert_terminators(
    song: &mut TransformedSong,
    before: &[Vec<Vec<Row>>; CHANNELS],
) -> Result<usize> {
    let mut inserted = 0;
    loop {
        let limits = order_row_limits(&song.patterns, &song.orders);
        let mut divergence: Option<(usize, usize, usize)> = None;
        'kinds: for kind in [PersistKind::Arp, PersistKind::TonePorta] {
            for ch in 0..CHANNELS {
                let after = channel_rows(&song.patterns, &song.orders, ch);
                let legacy = legacy_effective(&before[ch], kind);
                let player = player_effective(&after, kind);
                if let Some(position) = legacy
                    .iter()
                    .zip(player.iter())
                    .position(|(l, p)| l != p)
                {
                    let (order, row) = locate(&limits, position).ok_or_else(|| {
                        ForgeError::TransformMismatch {
                            stage: "persistent effects",
                            detail: format!("stream position {position} outside song"),
                        }
                    })?;
                    divergence = Some((ch, order, row));
                    break 'kinds;
                }
            }
        }
        let Some((ch, order, row)) = divergence else {
            break;
        };
        let pattern = song.orders[ch][order].pattern as usize;
        let rows = &mut song.patterns[pattern].rows;
        if rows.len() <= row {
            rows.resize(row + 1, Row::ZERO);
        }
        if !rows[row].effect.is_nop() {
            return Err(ForgeError::TransformMismatch {
                stage: "persistent effects",
                detail: format!(
                    "pattern {pattern} row {row} needs a terminator but carries {:?}",
                    rows[row].effect
                ),
            });
        }
        rows[row].effect = RowEffect::NopHard;
        inserted += 1;
    }

    // Loop seam: a persisted value live at the end of the sequence would
    // leak into the wrapped-around first order, where the legacy player
    // starts clean.
    for kind in [PersistKind::Arp, PersistKind::TonePorta] {
        for ch in 0..CHANNELS {
            let after = channel_rows(&song.patterns, &song.orders, ch);
            let player = player_effective(&after, kind);
            if player.last().copied().unwrap_or(0) != 0 {
                let pattern = song.orders[ch][0].pattern as usize;
                let rows = &mut song.patterns[pattern].rows;
                if rows.is_empty() {
                    rows.push(Row::ZERO);
                }
                if rows[0].effect.is_nop() {
                    rows[0].effect = RowEffect::NopHard;
                    inserted += 1;
                }
            }
        }
    }

    Ok(inserted)
}

/// Run all persistent-effect rewrites on one song.
pub fn rewrite_persistent(song: &mut TransformedSong) -> Result<()> {
    let before: [Vec<Vec<Row>>; CHANNELS] = [
        channel_rows(&song.patterns, &song.orders, 0),
        channel_rows(&song.patterns, &song.orders, 1),
        channel_rows(&song.patterns, &song.orders, 2),
    ];

    collapse_runs(song, PersistKind::Arp);
    collapse_runs(song, PersistKind::TonePorta);
    collapse_runs(song, PersistKind::PortaUp);
    collapse_runs(song, PersistKind::PortaDown);

    insert_terminators(song, &before)?;

    // Whole-song re-simulation over every kind and channel.
    for kind in [
        PersistKind::Arp,
        PersistKind::TonePorta,
        PersistKind::PortaUp,
        PersistKind::PortaDown,
    ] {
        for ch in 0..CHANNELS {
            let after = channel_rows(&song.patterns, &song.orders, ch);
            verify_persistent(&before[ch], &after, kind).map_err(|m| {
                ForgeError::TransformMismatch {
                    stage: "persistent effects",
                    detail: format!("channel {ch}: {m}"),
                }
            })?;
        }
    }
    Ok(())
}
