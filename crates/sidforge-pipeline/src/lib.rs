//! Transform and encode pipeline.
//!
//! Stages, leaves first: analyze a parsed song (reachable orders, truncation
//! limits, histograms), build the global effect renumbering and per-song
//! instrument repacking, transform patterns (order flattening, transpose-
//! equivalent dedup, persistent-effect rewrites - each paired with a
//! re-simulation verifier), freeze rows through the renumbering, build the
//! row dictionary, apply cached row equivalences, pack patterns (gap codes,
//! RLE, dictionary tokens), renumber pattern indices for delta bandwidth,
//! lay the blob out with gap packing and greedy-superstring overlay, and
//! serialize the final per-song image plus the shared include files.
//!
//! Data flows strictly forward; every stage takes the previous stage's
//! value and returns a new one.

pub mod analyze;
pub mod equiv;
pub mod layout;
pub mod pack;
pub mod remap;
pub mod renumber;
pub mod rowdict;
pub mod serialize;
pub mod superstring;
pub mod transform;
pub mod wavetable;

pub use analyze::{analyze, Analysis, OrderFlow};
pub use equiv::{
    apply_equivalences, find_exclusions, translate_substitutions, EquivCache, SongEquivs,
    Substitution,
};
pub use layout::{lay_out, LaidOutSong};
pub use pack::{best_gap_code, decode_pattern, encode_pattern, verify_pattern_packing};
pub use remap::{build_effect_remap, build_instrument_remap, InstrumentRemap};
pub use renumber::{delta_set, renumber_patterns, transpose_set, RenumberStats};
pub use rowdict::RowDict;
pub use serialize::{serialize_blob, tables_include, wavetable_include, SongWindows};
pub use superstring::greedy_superstring;
pub use transform::{channel_rows, freeze_song, transform, FrozenSong, TransformedSong};
pub use wavetable::globalize_wavetables;
