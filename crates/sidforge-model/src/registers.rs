//! SID register map and the register-write trace.
//!
//! The observable output of both the legacy engine and the virtual player is
//! an ordered list of `(address, value, frame)` register writes. Equality of
//! those lists is the correctness criterion for the whole build.

use bitflags::bitflags;
use std::fmt;

/// SID register addresses.
pub mod sid {
    /// Chip base address.
    pub const BASE: u16 = 0xD400;
    /// Register stride between voices.
    pub const VOICE_STRIDE: u16 = 7;
    /// Voice register: frequency low byte.
    pub const FREQ_LO: u16 = 0;
    /// Voice register: frequency high byte.
    pub const FREQ_HI: u16 = 1;
    /// Voice register: pulse width low byte.
    pub const PULSE_LO: u16 = 2;
    /// Voice register: pulse width high byte (4 bits).
    pub const PULSE_HI: u16 = 3;
    /// Voice register: control (waveform | gate).
    pub const CONTROL: u16 = 4;
    /// Voice register: attack/decay.
    pub const AD: u16 = 5;
    /// Voice register: sustain/release.
    pub const SR: u16 = 6;
    /// Filter cutoff high byte.
    pub const FILTER_CUTOFF: u16 = 0xD416;
    /// Filter resonance / routing.
    pub const FILTER_RESO: u16 = 0xD417;
    /// Filter mode (high nibble) / global volume (low nibble).
    pub const MODE_VOL: u16 = 0xD418;

    /// Address of a voice register.
    pub fn voice_reg(voice: usize, reg: u16) -> u16 {
        BASE + VOICE_STRIDE * voice as u16 + reg
    }
}

/// Register writes emitted per frame: 7 per voice plus 3 filter writes.
pub const WRITES_PER_FRAME: usize = 7 * crate::CHANNELS + 3;

bitflags! {
    /// Voice control register bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ControlFlags: u8 {
        /// Gate bit; cleared by key-off and hard restart.
        const GATE = 0x01;
        /// Oscillator hard sync with the previous voice.
        const SYNC = 0x02;
        /// Ring modulation with the previous voice.
        const RING = 0x04;
        /// Test bit; resets the oscillator.
        const TEST = 0x08;
        /// Triangle waveform.
        const TRIANGLE = 0x10;
        /// Sawtooth waveform.
        const SAW = 0x20;
        /// Pulse waveform.
        const PULSE = 0x40;
        /// Noise waveform.
        const NOISE = 0x80;
    }
}

bitflags! {
    /// Filter mode nibble (the high nibble of `$D418`).
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct FilterModeFlags: u8 {
        /// Low-pass output.
        const LOWPASS = 0x1;
        /// Band-pass output.
        const BANDPASS = 0x2;
        /// High-pass output.
        const HIGHPASS = 0x4;
        /// Mute voice 3.
        const VOICE3_OFF = 0x8;
    }
}

/// One register write in the observable trace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RegisterWrite {
    /// Register address.
    pub addr: u16,
    /// Written value.
    pub value: u8,
    /// Frame the write belongs to.
    pub frame: u32,
}

impl RegisterWrite {
    /// Construct a write record.
    pub fn new(addr: u16, value: u8, frame: u32) -> RegisterWrite {
        RegisterWrite { addr, value, frame }
    }
}

impl fmt::Display for RegisterWrite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:#06x} <- {:#04x} @ {})", self.addr, self.value, self.frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn voice_register_addresses() {
        assert_eq!(sid::voice_reg(0, sid::FREQ_LO), 0xD400);
        assert_eq!(sid::voice_reg(1, sid::CONTROL), 0xD40B);
        assert_eq!(sid::voice_reg(2, sid::SR), 0xD414);
    }

    #[test]
    fn writes_per_frame_matches_emission_order() {
        assert_eq!(WRITES_PER_FRAME, 24);
    }

    #[test]
    fn register_bit_layouts() {
        let ctrl = ControlFlags::PULSE | ControlFlags::GATE;
        assert_eq!(ctrl.bits(), 0x41);
        let mode = FilterModeFlags::LOWPASS | FilterModeFlags::VOICE3_OFF;
        assert_eq!(mode.bits(), 0x9);
    }
}
