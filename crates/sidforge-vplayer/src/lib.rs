//! Frame-accurate virtual player for the packed song format.
//!
//! The virtual player consumes exactly what the runtime player consumes: a
//! serialized song blob plus the shared delta/transpose tables, the global
//! wavetable and the effect renumbering. Each frame it advances the full
//! engine state (row sequencing, instrument tables, vibrato, pulse
//! modulation, slides, portamento, filter program, hard-restart
//! look-ahead) and emits the ordered register writes for the three voices
//! and the filter.
//!
//! The write stream is the correctness oracle of the whole build: it is
//! compared byte-for-byte against the reference trace of the legacy
//! engine.

mod decoder;
mod freq;
mod player;
mod state;

pub use decoder::ChannelDecoder;
pub use freq::{clamp_note, FreqTable, VIBRATO_TABLE};
pub use player::{PlayerConfig, SharedTables, VirtualPlayer};
