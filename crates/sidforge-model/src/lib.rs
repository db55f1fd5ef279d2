//! Core data model for the sidforge music data compiler.
//!
//! This crate defines the types shared by every pipeline stage:
//!
//! - [`Row`], [`Pattern`], [`OrderEntry`], [`Instrument`], [`Song`] - the
//!   in-memory representation of a tracker song
//! - [`RowEffect`] - the tagged effect representation used by all internal
//!   passes (raw effect bytes exist only at the parse and serialize
//!   boundaries)
//! - [`EffectRemap`] - the global old-to-new effect renumbering that is part
//!   of the packed-data contract between compiler and player
//! - [`layout`] - the packed blob layout, stream opcodes and hard caps
//! - [`RegisterWrite`] and the SID register map - the observable output of
//!   the virtual player
//! - [`ForgeError`] - the shared failure taxonomy
//!
//! No I/O happens here; the crate is pure data plus conversions.

pub mod effect;
pub mod error;
pub mod instrument;
pub mod layout;
pub mod order;
pub mod pattern;
pub mod registers;
pub mod row;
pub mod song;

pub use effect::{EffectKind, EffectRemap, RowEffect, SlideDir};
pub use error::{ForgeError, Result};
pub use instrument::Instrument;
pub use order::OrderEntry;
pub use pattern::Pattern;
pub use registers::{sid, ControlFlags, FilterModeFlags, RegisterWrite};
pub use row::{PackedRow, Row};
pub use song::Song;

// ============================================================================
// Common Constants
// ============================================================================

/// Number of voices on the target chip.
pub const CHANNELS: usize = 3;

/// Rows per pattern.
pub const PATTERN_ROWS: usize = 64;

/// Note field value meaning "no note on this row".
pub const NOTE_NONE: u8 = 0;

/// First pitched note value.
pub const NOTE_FIRST: u8 = 0x01;

/// Last pitched note value (95 distinct pitched notes).
pub const NOTE_LAST: u8 = 0x60;

/// Note field value releasing the gate.
pub const NOTE_OFF: u8 = 0x61;

/// Number of songs a full build compiles.
pub const SONG_COUNT: usize = 9;

/// Delta window length per song inside the shared delta table.
pub const DELTA_WINDOW: usize = 32;

/// Transpose window length per song inside the shared transpose table.
pub const TRANSPOSE_WINDOW: usize = 16;
