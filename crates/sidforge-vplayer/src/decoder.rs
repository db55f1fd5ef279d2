//! Incremental packed-stream decoder, one per channel.

use sidforge_model::layout::{
    pointer_gap_code, pointer_offset, DICT_INST_OFFSET, DICT_NOTES_OFFSET, DICT_PARAM_OFFSET,
    GAP_COUNTS, OP_DICT_BASE, OP_EXTENDED, OP_NOTE, OP_RLE_BASE, OP_ZERO_MAX, POINTERS_OFFSET,
};
use sidforge_model::{ForgeError, PackedRow, Result};

/// Decoder state for one channel's current pattern.
///
/// Cloneable so the hard-restart look-ahead can run a transient decode
/// without disturbing playback state.
#[derive(Debug, Clone, Default)]
pub struct ChannelDecoder {
    /// Source offset of the next stream byte.
    src: usize,
    /// Remaining repeats of `last_row` from an RLE or zero-run token.
    rle_count: u8,
    /// Implicit zero rows still owed before the next token.
    gap_remaining: u8,
    /// Zero rows owed after every decoded row (from the gap code).
    gap_count: u8,
    /// Most recently decoded explicit row.
    last_row: PackedRow,
    /// The explicit row before that.
    prev_row: PackedRow,
    /// Whether the last emitted row was an implicit gap zero.
    last_was_gap: bool,
}

impl ChannelDecoder {
    /// Reset onto a pattern through its pointer.
    pub fn init(&mut self, blob: &[u8], trackptr: u8) -> Result<()> {
        let at = POINTERS_OFFSET + trackptr as usize * 2;
        let pointer = u16::from(*blob.get(at).ok_or_else(|| pointer_oob(trackptr))?)
            | (u16::from(*blob.get(at + 1).ok_or_else(|| pointer_oob(trackptr))?) << 8);
        self.src = pointer_offset(pointer);
        self.gap_count = GAP_COUNTS[pointer_gap_code(pointer) as usize] as u8;
        self.rle_count = 0;
        self.gap_remaining = 0;
        self.last_row = PackedRow::ZERO;
        self.prev_row = PackedRow::ZERO;
        self.last_was_gap = false;
        Ok(())
    }

    /// Decode the next row.
    pub fn next_row(&mut self, blob: &[u8]) -> Result<PackedRow> {
        if self.gap_remaining > 0 {
            self.gap_remaining -= 1;
            self.last_was_gap = true;
            return Ok(PackedRow::ZERO);
        }
        if self.rle_count > 0 {
            self.rle_count -= 1;
            self.gap_remaining = self.gap_count;
            self.last_was_gap = false;
            return Ok(self.last_row);
        }
        let op = self.fetch(blob)?;
        match op {
            0..=OP_ZERO_MAX => {
                self.prev_row = self.last_row;
                self.last_row = PackedRow::ZERO;
                self.rle_count = op;
            }
            OP_DICT_BASE..=0xEE => {
                let index = (op - OP_DICT_BASE) as usize + 1;
                self.prev_row = self.last_row;
                self.last_row = dict_row(blob, index)?;
            }
            OP_RLE_BASE..=0xFD => {
                self.rle_count = op - OP_RLE_BASE;
            }
            OP_NOTE => {
                let note = self.fetch(blob)?;
                self.prev_row = self.last_row;
                self.last_row = self.last_row.with_note(note);
            }
            OP_EXTENDED => {
                let index = 224 + self.fetch(blob)? as usize;
                self.prev_row = self.last_row;
                self.last_row = dict_row(blob, index)?;
            }
        }
        self.gap_remaining = self.gap_count;
        self.last_was_gap = false;
        Ok(self.last_row)
    }

    /// Peek the next row without disturbing this decoder.
    pub fn peek_row(&self, blob: &[u8]) -> Result<PackedRow> {
        let mut transient = self.clone();
        transient.next_row(blob)
    }

    /// Most recently decoded explicit row.
    pub fn last_row(&self) -> PackedRow {
        self.last_row
    }

    /// The explicit row decoded before the current one.
    pub fn previous_row(&self) -> PackedRow {
        self.prev_row
    }

    /// Whether the last emitted row was an implicit gap zero.
    pub fn last_was_gap(&self) -> bool {
        self.last_was_gap
    }

    fn fetch(&mut self, blob: &[u8]) -> Result<u8> {
        let byte = blob
            .get(self.src)
            .copied()
            .ok_or_else(|| ForgeError::Other(format!("stream read past blob at {:#06x}", self.src)))?;
        self.src += 1;
        Ok(byte)
    }
}

fn pointer_oob(trackptr: u8) -> ForgeError {
    ForgeError::Other(format!("pattern pointer {trackptr} outside blob"))
}

/// Read a dictionary row out of the blob's three arrays.
pub fn dict_row(blob: &[u8], index: usize) -> Result<PackedRow> {
    if index == 0 {
        return Ok(PackedRow::ZERO);
    }
    let slot = index - 1;
    let read = |base: usize| -> Result<u8> {
        blob.get(base + slot)
            .copied()
            .ok_or_else(|| ForgeError::Other(format!("dictionary index {index} outside blob")))
    };
    Ok(PackedRow([
        read(DICT_NOTES_OFFSET)?,
        read(DICT_INST_OFFSET)?,
        read(DICT_PARAM_OFFSET)?,
    ]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use sidforge_model::layout::{make_pointer, BLOB_LIMIT};

    /// A blob with one dictionary entry, one pointer and a hand-packed
    /// stream.
    fn blob_with_stream(stream: &[u8], gap_code: u8) -> Vec<u8> {
        let mut blob = vec![0u8; BLOB_LIMIT];
        // Dictionary entry 1: note 0x30, inst 2, param 0x11.
        blob[DICT_NOTES_OFFSET] = 0x30;
        blob[DICT_INST_OFFSET] = 0x02;
        blob[DICT_PARAM_OFFSET] = 0x11;
        let at = 0x1000;
        blob[at..at + stream.len()].copy_from_slice(stream);
        let pointer = make_pointer(at, gap_code);
        blob[POINTERS_OFFSET] = (pointer & 0xFF) as u8;
        blob[POINTERS_OFFSET + 1] = (pointer >> 8) as u8;
        blob
    }

    #[test]
    fn tokens_expand_in_sequence() {
        // dict 1, RLE x2, note-only, zero run x2.
        let blob = blob_with_stream(&[OP_DICT_BASE, OP_RLE_BASE + 1, OP_NOTE, 0x40, 0x01], 0);
        let mut decoder = ChannelDecoder::default();
        decoder.init(&blob, 0).unwrap();
        let entry = PackedRow([0x30, 0x02, 0x11]);
        assert_eq!(decoder.next_row(&blob).unwrap(), entry);
        assert_eq!(decoder.next_row(&blob).unwrap(), entry);
        assert_eq!(decoder.next_row(&blob).unwrap(), entry);
        let with_note = decoder.next_row(&blob).unwrap();
        assert_eq!(with_note, PackedRow([0x40, 0x02, 0x11]));
        assert_eq!(decoder.next_row(&blob).unwrap(), PackedRow::ZERO);
        assert_eq!(decoder.next_row(&blob).unwrap(), PackedRow::ZERO);
        assert_eq!(decoder.previous_row(), with_note);
        assert_eq!(decoder.last_row(), PackedRow::ZERO);
    }

    #[test]
    fn gap_code_interleaves_zero_rows() {
        let blob = blob_with_stream(&[OP_DICT_BASE, OP_DICT_BASE], 1);
        let mut decoder = ChannelDecoder::default();
        decoder.init(&blob, 0).unwrap();
        let entry = PackedRow([0x30, 0x02, 0x11]);
        assert_eq!(decoder.next_row(&blob).unwrap(), entry);
        assert!(!decoder.last_was_gap());
        assert_eq!(decoder.next_row(&blob).unwrap(), PackedRow::ZERO);
        assert!(decoder.last_was_gap());
        assert_eq!(decoder.next_row(&blob).unwrap(), entry);
        assert!(!decoder.last_was_gap());
    }

    #[test]
    fn peek_does_not_disturb_state() {
        let blob = blob_with_stream(&[OP_DICT_BASE, 0x00], 0);
        let mut decoder = ChannelDecoder::default();
        decoder.init(&blob, 0).unwrap();
        let entry = PackedRow([0x30, 0x02, 0x11]);
        assert_eq!(decoder.peek_row(&blob).unwrap(), entry);
        assert_eq!(decoder.peek_row(&blob).unwrap(), entry);
        assert_eq!(decoder.next_row(&blob).unwrap(), entry);
        assert_eq!(decoder.peek_row(&blob).unwrap(), PackedRow::ZERO);
    }
}
