//! Player state: global sequencing, per-channel playback and instrument
//! progress, filter program.

use sidforge_model::RowEffect;

use crate::decoder::ChannelDecoder;

/// Global filter program state (the filter is shared by the three voices).
#[derive(Debug, Clone, Default)]
pub struct FilterState {
    /// Whether a filter program is running.
    pub active: bool,
    /// Current cutoff (high byte).
    pub cutoff: u8,
    /// Resonance nibble.
    pub reso: u8,
    /// Mode nibble (the high nibble of `$D418`).
    pub mode: u8,
    /// Current filter-table index.
    pub idx: u8,
    /// One past the last program entry.
    pub end: u8,
    /// Index the program loops back to.
    pub loop_at: u8,
}

/// Global sequencing state.
#[derive(Debug, Clone)]
pub struct GlobalState {
    /// Frames per row.
    pub speed: u8,
    /// Frame counter within the current row.
    pub speed_counter: u8,
    /// Arpeggio phase counter, cycling 2 -> 1 -> 0 -> 2.
    pub mod3: u8,
    /// Current order position.
    pub order: usize,
    /// Order the next pattern break advances to.
    pub next_order: usize,
    /// Current row within the pattern.
    pub row: usize,
    /// Set by a pattern break; the next row processing changes order.
    pub force_new_pattern: bool,
    /// Filter program.
    pub filter: FilterState,
    /// Global volume nibble.
    pub volume: u8,
    /// Current frame number.
    pub frame: u32,
}

/// Everything one channel carries.
#[derive(Debug, Clone, Default)]
pub struct ChannelState {
    /// Packed-stream decoder.
    pub decoder: ChannelDecoder,

    // Playback state.
    /// Note of the current row (tone-porta target).
    pub note: u8,
    /// Note the oscillator is sounding.
    pub sounding_note: u8,
    /// Current instrument slot.
    pub inst: u8,
    /// Decoded effect of the current row.
    pub row_effect: RowEffect,
    /// Transpose from the order bitstream.
    pub transpose: i8,
    /// Current trackptr (pattern index).
    pub trackptr: u8,
    /// Arp parameter persisted across NOP rows.
    pub perm_arp: Option<u8>,
    /// Tone-porta speed persisted across NOP rows.
    pub tone_porta: Option<u8>,
    /// Porta speed persisted across NOP rows; `true` = down.
    pub porta: Option<(bool, u8)>,

    // Instrument progress.
    /// Wavetable index.
    pub wave_idx: u8,
    /// Wavetable end (exclusive).
    pub wave_end: u8,
    /// Wavetable loop index.
    pub wave_loop: u8,
    /// Arp-table index.
    pub arp_idx: u8,
    /// Arp-table end (exclusive).
    pub arp_end: u8,
    /// Arp-table loop index.
    pub arp_loop: u8,
    /// Pulse accumulator (12 bits used).
    pub pulse_acc: u16,
    /// Pulse accumulator step per frame.
    pub pulse_speed: u8,
    /// Pulse up limit nibble.
    pub pulse_lim_up: u8,
    /// Pulse down limit nibble.
    pub pulse_lim_down: u8,
    /// Pulse direction.
    pub pulse_up: bool,
    /// Frames left before vibrato starts.
    pub vib_delay: u8,
    /// Vibrato depth nibble.
    pub vib_depth: u8,
    /// Vibrato speed nibble.
    pub vib_speed: u8,
    /// Vibrato phase position (6 bits).
    pub vib_pos: u8,
    /// Vibrato disabled until the next trigger.
    pub vib_off: bool,
    /// Slide accumulator enabled.
    pub slide_on: bool,
    /// Slide direction; `true` = down.
    pub slide_down: bool,
    /// Accumulated slide offset, applied on top of the base frequency.
    pub slide_acc: i16,

    // Outputs.
    /// Oscillator value before the vibrato offset.
    pub freq: u16,
    /// Oscillator value written this frame (after vibrato).
    pub final_freq: u16,
    /// Waveform register value.
    pub wave: u8,
    /// Gate bit.
    pub gate: bool,
    /// Attack/decay output.
    pub ad: u8,
    /// Sustain/release output.
    pub sr: u8,
    /// Hard-restart timer in frames (0 disables).
    pub hr_timer: u8,
    /// Hard restart engaged: envelope and waveform forced to zero.
    pub hr_active: bool,
}
