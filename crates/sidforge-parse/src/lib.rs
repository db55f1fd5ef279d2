//! Legacy song blob reader.
//!
//! Each source song is a self-contained ~16 KB memory image embedding the
//! legacy player code plus its data tables. The image begins with a 3-byte
//! jump opcode whose operand high byte is the load base; fixed code offsets
//! inside the player hold the absolute addresses of every embedded table
//! (the tables themselves move from song to song, the code referencing them
//! does not).
//!
//! Parsing never interprets player code. It follows the address
//! indirections, extracts the tables, derives pattern indices from the
//! address-ordered set of referenced pattern locations and decodes rows into
//! the tagged effect representation.

mod blob;
mod offsets;

pub use blob::parse_song;
pub use offsets::CodeOffsets;
