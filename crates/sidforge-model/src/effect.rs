//! Tagged effect representation and the global effect renumbering.
//!
//! Internal passes never look at raw effect bytes. The parse boundary decodes
//! the legacy dialect into [`RowEffect`]; the serialize boundary (and the
//! virtual player, which consumes serialized data) goes through
//! [`EffectRemap`], the frequency-ranked old-to-new renumbering that is part
//! of the packed-data contract.
//!
//! Effect number 0 is the "no effect" opcode of the new player. Its parameter
//! byte doubles as a secondary opcode space for the rare effects that were
//! collapsed out of the 14 numbered slots:
//!
//! | param | meaning |
//! |---|---|
//! | 1 | vibrato off |
//! | 2 | pattern break |
//! | 3 | fine slide (one-shot `freq += 0x20`) |
//! | 4 | NOP-HARD (terminates a persisted arp / tone-porta value) |
//!
//! Position jumps rewrite to pattern breaks during transform: the new order
//! list is the flattened reachable sequence, so a jump is just "advance".

use crate::error::{ForgeError, Result};

/// Direction of the persistent slide accumulator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SlideDir {
    /// `freq += 0x20` every frame.
    Up,
    /// `freq -= 0x20` every frame.
    Down,
}

/// One row's effect, decoded.
///
/// `Arp` and `TonePorta` are always persistent in the new player: their
/// parameter survives subsequent NOP rows until a NOP-HARD or a different
/// effect. `PortaUp`/`PortaDown` persist through NOP as well.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum RowEffect {
    /// No effect.
    #[default]
    None,
    /// Arpeggio; param nibbles are the two chord offsets.
    Arp(u8),
    /// Tone portamento toward the row's note at the given speed.
    TonePorta(u8),
    /// Portamento up at the given speed.
    PortaUp(u8),
    /// Portamento down at the given speed.
    PortaDown(u8),
    /// Stop the pattern and advance to the next order.
    PatternBreak,
    /// Legacy position jump to an absolute order (rewritten to
    /// `PatternBreak` during transform).
    PosJump(u8),
    /// Disable vibrato on this channel.
    VibratoOff,
    /// One-shot upward frequency nudge.
    FineSlide,
    /// Terminator for persisted arp / tone-porta values.
    NopHard,
    /// Override the waveform register this row.
    Wave(u8),
    /// Override the pulse width this row.
    Pulse(u8),
    /// Set attack/decay.
    Ad(u8),
    /// Set sustain/release.
    Sr(u8),
    /// Enable the per-frame slide accumulator.
    Slide(SlideDir),
    /// Set the song speed (frames per row).
    Speed(u8),
    /// Set the channel's hard-restart timer (0 disables).
    HardRestart(u8),
    /// Start the filter program of the given instrument (4-bit slot).
    FilterTrigger(u8),
    /// Set filter resonance.
    Reso(u8),
    /// Set the global volume.
    GlobalVol(u8),
    /// Set the filter routing/mode nibble.
    FilterMode(u8),
}

/// Discriminant for the effects that compete for the 14 numbered slots.
///
/// The collapsed effects (vibrato off, breaks, fine slide, NOP-HARD) live in
/// the effect-0 parameter space and never appear here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EffectKind {
    /// Arpeggio.
    Arp,
    /// Tone portamento.
    TonePorta,
    /// Portamento up.
    PortaUp,
    /// Portamento down.
    PortaDown,
    /// Waveform override.
    Wave,
    /// Pulse-width override.
    Pulse,
    /// Attack/decay.
    Ad,
    /// Sustain/release.
    Sr,
    /// Persistent slide.
    Slide,
    /// Song speed.
    Speed,
    /// Hard-restart timer.
    HardRestart,
    /// Filter trigger.
    FilterTrigger,
    /// Filter resonance.
    Reso,
    /// Global volume.
    GlobalVol,
    /// Filter mode.
    FilterMode,
}

impl EffectKind {
    /// All kinds in the deterministic code order used for tie-breaks.
    pub const ALL: [EffectKind; 15] = [
        EffectKind::Arp,
        EffectKind::TonePorta,
        EffectKind::PortaUp,
        EffectKind::PortaDown,
        EffectKind::Wave,
        EffectKind::Pulse,
        EffectKind::Ad,
        EffectKind::Sr,
        EffectKind::Slide,
        EffectKind::Speed,
        EffectKind::HardRestart,
        EffectKind::FilterTrigger,
        EffectKind::Reso,
        EffectKind::GlobalVol,
        EffectKind::FilterMode,
    ];

    /// Stable index into [`EffectKind::ALL`].
    pub fn index(self) -> usize {
        Self::ALL.iter().position(|k| *k == self).unwrap_or(0)
    }
}

impl RowEffect {
    /// Decode the legacy dialect: effect nibble plus parameter byte.
    pub fn from_legacy(effect: u8, param: u8) -> Result<RowEffect> {
        Ok(match effect & 0x0F {
            0x0 => RowEffect::None,
            0x1 => RowEffect::PortaUp(param),
            0x2 => RowEffect::PortaDown(param),
            0x3 => RowEffect::TonePorta(param),
            0x4 => RowEffect::VibratoOff,
            0x5 => RowEffect::Ad(param),
            0x6 => RowEffect::Sr(param),
            0x7 => RowEffect::Wave(param),
            0x8 => RowEffect::Pulse(param),
            0x9 => RowEffect::Arp(param),
            0xA => RowEffect::FineSlide,
            0xB => RowEffect::PosJump(param),
            0xC => {
                if param & 0x80 != 0 {
                    RowEffect::Slide(SlideDir::Down)
                } else {
                    RowEffect::Slide(SlideDir::Up)
                }
            }
            0xD => RowEffect::PatternBreak,
            0xE => {
                return Err(ForgeError::Input {
                    path: "pattern data".to_string(),
                    reason: format!("legacy effect 0xE is unused (param {param:#04x})"),
                })
            }
            _ => match param >> 4 {
                0x0 => RowEffect::Speed(param & 0x0F),
                0xB => RowEffect::GlobalVol(param & 0x0F),
                0xC => RowEffect::Reso(param & 0x0F),
                0xD => RowEffect::FilterMode(param & 0x0F),
                0xE => RowEffect::FilterTrigger(param & 0x0F),
                0xF => RowEffect::HardRestart(param & 0x0F),
                sub => {
                    return Err(ForgeError::Input {
                        path: "pattern data".to_string(),
                        reason: format!("unknown F sub-effect {sub:#03x}"),
                    })
                }
            },
        })
    }

    /// Encode back into the legacy dialect, when the effect exists there.
    ///
    /// `NopHard` has no legacy form; the row-equivalence cache (which lives
    /// in legacy byte space) never needs it.
    pub fn to_legacy(&self) -> Option<(u8, u8)> {
        Some(match *self {
            RowEffect::None => (0x0, 0),
            RowEffect::PortaUp(p) => (0x1, p),
            RowEffect::PortaDown(p) => (0x2, p),
            RowEffect::TonePorta(p) => (0x3, p),
            RowEffect::VibratoOff => (0x4, 0),
            RowEffect::Ad(p) => (0x5, p),
            RowEffect::Sr(p) => (0x6, p),
            RowEffect::Wave(p) => (0x7, p),
            RowEffect::Pulse(p) => (0x8, p),
            RowEffect::Arp(p) => (0x9, p),
            RowEffect::FineSlide => (0xA, 0),
            RowEffect::PosJump(t) => (0xB, t),
            RowEffect::Slide(SlideDir::Up) => (0xC, 0x00),
            RowEffect::Slide(SlideDir::Down) => (0xC, 0x80),
            RowEffect::PatternBreak => (0xD, 0),
            RowEffect::Speed(v) => (0xF, v & 0x0F),
            RowEffect::GlobalVol(v) => (0xF, 0xB0 | (v & 0x0F)),
            RowEffect::Reso(v) => (0xF, 0xC0 | (v & 0x0F)),
            RowEffect::FilterMode(v) => (0xF, 0xD0 | (v & 0x0F)),
            RowEffect::FilterTrigger(v) => (0xF, 0xE0 | (v & 0x0F)),
            RowEffect::HardRestart(v) => (0xF, 0xF0 | (v & 0x0F)),
            RowEffect::NopHard => return None,
        })
    }

    /// The numbered-slot kind of this effect, if it competes for one.
    pub fn kind(&self) -> Option<EffectKind> {
        Some(match self {
            RowEffect::Arp(_) => EffectKind::Arp,
            RowEffect::TonePorta(_) => EffectKind::TonePorta,
            RowEffect::PortaUp(_) => EffectKind::PortaUp,
            RowEffect::PortaDown(_) => EffectKind::PortaDown,
            RowEffect::Wave(_) => EffectKind::Wave,
            RowEffect::Pulse(_) => EffectKind::Pulse,
            RowEffect::Ad(_) => EffectKind::Ad,
            RowEffect::Sr(_) => EffectKind::Sr,
            RowEffect::Slide(_) => EffectKind::Slide,
            RowEffect::Speed(_) => EffectKind::Speed,
            RowEffect::HardRestart(_) => EffectKind::HardRestart,
            RowEffect::FilterTrigger(_) => EffectKind::FilterTrigger,
            RowEffect::Reso(_) => EffectKind::Reso,
            RowEffect::GlobalVol(_) => EffectKind::GlobalVol,
            RowEffect::FilterMode(_) => EffectKind::FilterMode,
            _ => return None,
        })
    }

    /// Whether this is the bare NOP (effect 0, param 0).
    pub fn is_nop(&self) -> bool {
        matches!(self, RowEffect::None)
    }
}

// Effect-0 parameter opcodes.

/// Effect 0 param: nothing.
pub const P_NONE: u8 = 0;
/// Effect 0 param: vibrato off.
pub const P_VIBRATO_OFF: u8 = 1;
/// Effect 0 param: pattern break.
pub const P_BREAK: u8 = 2;
/// Effect 0 param: fine slide.
pub const P_FINE_SLIDE: u8 = 3;
/// Effect 0 param: NOP-HARD.
pub const P_NOP_HARD: u8 = 4;

/// Number of numbered effect slots.
pub const EFFECT_SLOTS: usize = 14;

/// The frequency-ranked old-to-new effect renumbering.
///
/// Built once from the aggregate histograms of all songs; consumed by the
/// serialize boundary and by the virtual player. Slots 1..=14 hold the
/// surviving effect kinds in descending global frequency.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EffectRemap {
    /// `slots[n - 1]` is the kind assigned effect number `n`.
    slots: Vec<EffectKind>,
}

impl EffectRemap {
    /// Build from a ranking (most frequent first).
    ///
    /// # Errors
    ///
    /// `BudgetExceeded` when more kinds survive than numbered slots exist.
    pub fn from_ranking(ranking: Vec<EffectKind>) -> Result<Self> {
        if ranking.len() > EFFECT_SLOTS {
            return Err(ForgeError::BudgetExceeded {
                what: "distinct effect kinds",
                limit: EFFECT_SLOTS,
                actual: ranking.len(),
            });
        }
        Ok(EffectRemap { slots: ranking })
    }

    /// The new effect number of a kind, if the kind survived ranking.
    pub fn number_of(&self, kind: EffectKind) -> Option<u8> {
        self.slots
            .iter()
            .position(|k| *k == kind)
            .map(|i| (i + 1) as u8)
    }

    /// The kind occupying a new effect number.
    pub fn kind_of(&self, number: u8) -> Option<EffectKind> {
        if number == 0 {
            return None;
        }
        self.slots.get(number as usize - 1).copied()
    }

    /// Ranked slots, most frequent first.
    pub fn slots(&self) -> &[EffectKind] {
        &self.slots
    }

    /// Encode an effect into the packed `(effect, param)` byte pair.
    ///
    /// # Errors
    ///
    /// `TransformMismatch` when the effect's kind never received a slot
    /// (the histograms said it does not occur, yet a row carries it).
    pub fn encode(&self, effect: RowEffect) -> Result<(u8, u8)> {
        let numbered = |kind: EffectKind, param: u8| -> Result<(u8, u8)> {
            match self.number_of(kind) {
                Some(n) => Ok((n, param)),
                None => Err(ForgeError::TransformMismatch {
                    stage: "effect remap",
                    detail: format!("kind {kind:?} has no slot but occurs in a row"),
                }),
            }
        };
        match effect {
            RowEffect::None => Ok((0, P_NONE)),
            RowEffect::VibratoOff => Ok((0, P_VIBRATO_OFF)),
            RowEffect::PatternBreak | RowEffect::PosJump(_) => Ok((0, P_BREAK)),
            RowEffect::FineSlide => Ok((0, P_FINE_SLIDE)),
            RowEffect::NopHard => Ok((0, P_NOP_HARD)),
            RowEffect::Arp(p) => numbered(EffectKind::Arp, p),
            RowEffect::TonePorta(p) => numbered(EffectKind::TonePorta, p),
            RowEffect::PortaUp(p) => numbered(EffectKind::PortaUp, p),
            RowEffect::PortaDown(p) => numbered(EffectKind::PortaDown, p),
            RowEffect::Wave(p) => numbered(EffectKind::Wave, p),
            RowEffect::Pulse(p) => numbered(EffectKind::Pulse, p),
            RowEffect::Ad(p) => numbered(EffectKind::Ad, p),
            RowEffect::Sr(p) => numbered(EffectKind::Sr, p),
            RowEffect::Slide(SlideDir::Up) => numbered(EffectKind::Slide, 0x00),
            RowEffect::Slide(SlideDir::Down) => numbered(EffectKind::Slide, 0x80),
            RowEffect::Speed(p) => numbered(EffectKind::Speed, p),
            RowEffect::HardRestart(p) => numbered(EffectKind::HardRestart, p),
            RowEffect::FilterTrigger(p) => numbered(EffectKind::FilterTrigger, p),
            RowEffect::Reso(p) => numbered(EffectKind::Reso, p),
            RowEffect::GlobalVol(p) => numbered(EffectKind::GlobalVol, p),
            RowEffect::FilterMode(p) => numbered(EffectKind::FilterMode, p),
        }
    }

    /// Decode a packed `(effect, param)` pair (the player side).
    pub fn decode(&self, effect: u8, param: u8) -> RowEffect {
        if effect == 0 {
            return match param {
                P_VIBRATO_OFF => RowEffect::VibratoOff,
                P_BREAK => RowEffect::PatternBreak,
                P_FINE_SLIDE => RowEffect::FineSlide,
                P_NOP_HARD => RowEffect::NopHard,
                _ => RowEffect::None,
            };
        }
        match self.kind_of(effect) {
            Some(EffectKind::Arp) => RowEffect::Arp(param),
            Some(EffectKind::TonePorta) => RowEffect::TonePorta(param),
            Some(EffectKind::PortaUp) => RowEffect::PortaUp(param),
            Some(EffectKind::PortaDown) => RowEffect::PortaDown(param),
            Some(EffectKind::Wave) => RowEffect::Wave(param),
            Some(EffectKind::Pulse) => RowEffect::Pulse(param),
            Some(EffectKind::Ad) => RowEffect::Ad(param),
            Some(EffectKind::Sr) => RowEffect::Sr(param),
            Some(EffectKind::Slide) => {
                if param & 0x80 != 0 {
                    RowEffect::Slide(SlideDir::Down)
                } else {
                    RowEffect::Slide(SlideDir::Up)
                }
            }
            Some(EffectKind::Speed) => RowEffect::Speed(param),
            Some(EffectKind::HardRestart) => RowEffect::HardRestart(param),
            Some(EffectKind::FilterTrigger) => RowEffect::FilterTrigger(param & 0x0F),
            Some(EffectKind::Reso) => RowEffect::Reso(param),
            Some(EffectKind::GlobalVol) => RowEffect::GlobalVol(param),
            Some(EffectKind::FilterMode) => RowEffect::FilterMode(param),
            None => RowEffect::None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn remap_all() -> EffectRemap {
        EffectRemap::from_ranking(EffectKind::ALL[..14].to_vec()).unwrap()
    }

    #[test]
    fn legacy_decode_covers_dialect() {
        assert_eq!(
            RowEffect::from_legacy(0x9, 0x37).unwrap(),
            RowEffect::Arp(0x37)
        );
        assert_eq!(RowEffect::from_legacy(0x4, 0x00).unwrap(), RowEffect::VibratoOff);
        assert_eq!(
            RowEffect::from_legacy(0xC, 0x80).unwrap(),
            RowEffect::Slide(SlideDir::Down)
        );
        assert_eq!(
            RowEffect::from_legacy(0xF, 0xE5).unwrap(),
            RowEffect::FilterTrigger(5)
        );
        assert!(RowEffect::from_legacy(0xE, 0x00).is_err());
    }

    #[test]
    fn collapsed_effects_use_effect_zero_params() {
        let remap = remap_all();
        assert_eq!(remap.encode(RowEffect::VibratoOff).unwrap(), (0, 1));
        assert_eq!(remap.encode(RowEffect::PatternBreak).unwrap(), (0, 2));
        assert_eq!(remap.encode(RowEffect::PosJump(7)).unwrap(), (0, 2));
        assert_eq!(remap.encode(RowEffect::FineSlide).unwrap(), (0, 3));
        assert_eq!(remap.encode(RowEffect::NopHard).unwrap(), (0, 4));
    }

    #[test]
    fn encode_decode_round_trip() {
        let remap = remap_all();
        for effect in [
            RowEffect::Arp(0x47),
            RowEffect::TonePorta(0x21),
            RowEffect::PortaUp(0x08),
            RowEffect::Slide(SlideDir::Down),
            RowEffect::Speed(6),
            RowEffect::FilterTrigger(0xD),
            RowEffect::None,
            RowEffect::NopHard,
        ] {
            let (e, p) = remap.encode(effect).unwrap();
            assert_eq!(remap.decode(e, p), effect, "{effect:?}");
        }
    }

    #[test]
    fn unranked_kind_is_an_error() {
        let remap = EffectRemap::from_ranking(vec![EffectKind::Arp]).unwrap();
        assert!(remap.encode(RowEffect::Wave(0x41)).is_err());
        assert_eq!(remap.number_of(EffectKind::Arp), Some(1));
        assert_eq!(remap.number_of(EffectKind::Wave), None);
    }

    #[test]
    fn slot_capacity_is_enforced() {
        assert!(EffectRemap::from_ranking(EffectKind::ALL.to_vec()).is_err());
    }
}
