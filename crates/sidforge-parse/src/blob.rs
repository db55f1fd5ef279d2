//! The blob reader proper.

use sidforge_model::instrument::{Instrument, INSTRUMENT_BYTES, INSTRUMENT_SLOTS};
use sidforge_model::{
    ForgeError, OrderEntry, Pattern, Result, Row, RowEffect, Song, CHANNELS, PATTERN_ROWS,
};

use crate::offsets::CodeOffsets;

/// 6502 absolute-jump opcode; every image starts with one.
const JMP_ABS: u8 = 0x4C;

/// Bytes per packed legacy row.
const ROW_BYTES: usize = 3;

/// A positioned view over one song image.
struct Image<'a> {
    data: &'a [u8],
    base: u16,
    path: &'a str,
}

impl<'a> Image<'a> {
    fn err(&self, reason: String) -> ForgeError {
        ForgeError::Input {
            path: self.path.to_string(),
            reason,
        }
    }

    fn byte(&self, offset: usize) -> Result<u8> {
        self.data
            .get(offset)
            .copied()
            .ok_or_else(|| self.err(format!("offset {offset:#06x} past end of image")))
    }

    fn le16(&self, offset: usize) -> Result<u16> {
        let lo = self.byte(offset)?;
        let hi = self.byte(offset + 1)?;
        Ok(u16::from(lo) | (u16::from(hi) << 8))
    }

    /// Follow a code offset: the operand at `offset + 1` is an absolute
    /// address; translate it into a file offset.
    fn table_offset(&self, code_offset: usize) -> Result<usize> {
        let addr = self.le16(code_offset + 1)?;
        let rel = addr
            .checked_sub(self.base)
            .ok_or_else(|| self.err(format!("table address {addr:#06x} below base {:#06x}", self.base)))?;
        let rel = rel as usize;
        if rel >= self.data.len() {
            return Err(self.err(format!("table address {addr:#06x} past end of image")));
        }
        Ok(rel)
    }

    fn slice(&self, offset: usize, len: usize) -> Result<&'a [u8]> {
        if offset + len > self.data.len() {
            return Err(self.err(format!(
                "table at {offset:#06x} len {len} past end of image"
            )));
        }
        Ok(&self.data[offset..offset + len])
    }
}

/// Parse one legacy song image into a [`Song`].
///
/// `index` is the 0-based song index, `path` names the source for
/// diagnostics.
pub fn parse_song(data: &[u8], index: usize, path: &str) -> Result<Song> {
    let input_err = |reason: String| ForgeError::Input {
        path: path.to_string(),
        reason,
    };

    if data.len() < 3 {
        return Err(input_err("image shorter than the entry jump".to_string()));
    }
    if data[0] != JMP_ABS {
        return Err(input_err(format!(
            "image does not start with a jump opcode (found {:#04x})",
            data[0]
        )));
    }
    // The operand's high byte is the load base page.
    let base = u16::from(data[2]) << 8;
    let image = Image { data, base, path };
    let offsets = CodeOffsets::LEGACY;

    let mut song = Song::empty(index);

    // Song-start record: start order, initial speed.
    let start_rec = image.table_offset(offsets.song_start)?;
    song.start_order = image.byte(start_rec)? as usize;
    let speed = image.byte(start_rec + 1)?;
    if speed == 0 {
        return Err(input_err("initial speed of zero".to_string()));
    }
    song.speed = speed;

    // Track and transpose tables. An order list ends where the track high
    // byte is zero; pattern data can never live in page zero.
    let mut pattern_addrs: Vec<u16> = Vec::new();
    let mut raw_tracks: [Vec<u16>; CHANNELS] = Default::default();
    let mut raw_transposes: [Vec<i8>; CHANNELS] = Default::default();
    for ch in 0..CHANNELS {
        let trans_off = image.table_offset(offsets.transpose[ch])?;
        let lo_off = image.table_offset(offsets.track_lo[ch])?;
        let hi_off = image.table_offset(offsets.track_hi[ch])?;
        let mut i = 0usize;
        loop {
            let hi = image.byte(hi_off + i)?;
            if hi == 0 {
                break;
            }
            let lo = image.byte(lo_off + i)?;
            let addr = u16::from(lo) | (u16::from(hi) << 8);
            raw_tracks[ch].push(addr);
            raw_transposes[ch].push(image.byte(trans_off + i)? as i8);
            if !pattern_addrs.contains(&addr) {
                pattern_addrs.push(addr);
            }
            i += 1;
        }
    }
    let order_len = raw_tracks[0].len();
    if order_len == 0 {
        return Err(input_err("empty order list".to_string()));
    }
    for ch in 1..CHANNELS {
        if raw_tracks[ch].len() != order_len {
            return Err(input_err(format!(
                "channel {ch} order list length {} differs from channel 0 ({order_len})",
                raw_tracks[ch].len()
            )));
        }
    }
    if song.start_order >= order_len {
        return Err(input_err(format!(
            "start order {} past order list of length {order_len}",
            song.start_order
        )));
    }

    // Patterns are indexed by ascending address.
    pattern_addrs.sort_unstable();
    for ch in 0..CHANNELS {
        for i in 0..order_len {
            let pattern = pattern_addrs
                .binary_search(&raw_tracks[ch][i])
                .expect("address collected above") as u8;
            song.orders[ch].push(OrderEntry::new(pattern, raw_transposes[ch][i]));
        }
    }

    for &addr in &pattern_addrs {
        let off = (addr - base) as usize;
        let bytes = image.slice(off, PATTERN_ROWS * ROW_BYTES)?;
        song.patterns.push(parse_pattern(bytes, path)?);
    }

    // Instruments: 16 parallel arrays of 32 bytes. The AD base names array
    // 0, the SR base array 1; the rest follow SR at 32-byte strides.
    let ad_off = image.table_offset(offsets.instrument_ad)?;
    let sr_off = image.table_offset(offsets.instrument_sr)?;
    for slot in 0..INSTRUMENT_SLOTS {
        let mut record = [0u8; INSTRUMENT_BYTES];
        record[0] = image.byte(ad_off + slot)?;
        for field in 1..INSTRUMENT_BYTES {
            record[field] = image.byte(sr_off + (field - 1) * INSTRUMENT_SLOTS + slot)?;
        }
        song.instruments[slot] = Instrument::from_bytes(&record);
        // The legacy arrays store the pulse width unswapped.
    }
    if !song.instruments[0].is_empty() {
        return Err(input_err("instrument slot 0 is not the empty sentinel".to_string()));
    }

    // Byte tables. Their lengths are whatever the instruments reach.
    let wave_off = image.table_offset(offsets.wave_table)?;
    let arp_off = image.table_offset(offsets.arp_table)?;
    let filter_off = image.table_offset(offsets.filter_table)?;
    let wave_len = song.instruments.iter().map(|i| i.wave_end as usize).max().unwrap_or(0);
    let arp_len = song.instruments.iter().map(|i| i.arp_end as usize).max().unwrap_or(0);
    let filter_len = song.instruments.iter().map(|i| i.filter_end as usize).max().unwrap_or(0);
    song.wave_table = image.slice(wave_off, wave_len)?.to_vec();
    song.arp_table = image.slice(arp_off, arp_len)?.to_vec();
    song.filter_table = image.slice(filter_off, filter_len)?.to_vec();

    Ok(song)
}

/// Decode 64 packed legacy rows.
fn parse_pattern(bytes: &[u8], path: &str) -> Result<Pattern> {
    let mut rows = Vec::with_capacity(PATTERN_ROWS);
    for r in 0..PATTERN_ROWS {
        let b = &bytes[r * ROW_BYTES..(r + 1) * ROW_BYTES];
        let note = b[0] & 0x7F;
        let inst = b[1] & 0x1F;
        let effect_num = ((b[0] >> 4) & 0x08) | (b[1] >> 5);
        let effect = RowEffect::from_legacy(effect_num, b[2]).map_err(|e| ForgeError::Input {
            path: path.to_string(),
            reason: format!("row {r}: {e}"),
        })?;
        rows.push(Row { note, inst, effect });
    }
    Ok(Pattern::new(rows))
}
