//! The frame engine.

use sidforge_model::instrument::{Instrument, INSTRUMENT_BYTES};
use sidforge_model::layout::{ARP_OFFSET, ARP_REGION_LEN, DELTA_BASE_OFFSET, FILTER_OFFSET, FILTER_REGION_LEN, INSTRUMENTS_OFFSET, ORDERS_OFFSET, TRANSPOSE_BASE_OFFSET};
use sidforge_model::{
    sid, ControlFlags, EffectKind, EffectRemap, ForgeError, PackedRow, RegisterWrite, Result,
    RowEffect, SlideDir, CHANNELS, DELTA_WINDOW, NOTE_OFF, PATTERN_ROWS, TRANSPOSE_WINDOW,
};

use crate::freq::{clamp_note, vibrato_offset, FreqTable};
use crate::state::{ChannelState, FilterState, GlobalState};

/// The global data every song shares.
#[derive(Debug, Clone, Copy)]
pub struct SharedTables<'a> {
    /// Shared delta table.
    pub delta_table: &'a [u8],
    /// Shared transpose table.
    pub transpose_table: &'a [u8],
    /// Globalized wavetable.
    pub wave_table: &'a [u8],
    /// Trackptr seed for each song's first order.
    pub start_const: u8,
}

/// Per-song constants assembled into the runtime player.
#[derive(Debug, Clone, Copy)]
pub struct PlayerConfig {
    /// Initial speed (frames per row).
    pub speed: u8,
    /// Number of orders in the song.
    pub order_count: usize,
    /// Default hard-restart timer per channel (0 disables).
    pub hard_restart: u8,
}

/// Per-frame slide accumulator step.
const SLIDE_STEP: u16 = 0x20;

/// The virtual player over one serialized song.
pub struct VirtualPlayer<'a> {
    blob: &'a [u8],
    tables: SharedTables<'a>,
    remap: &'a EffectRemap,
    order_count: usize,
    delta_base: usize,
    transpose_base: usize,
    freq_table: FreqTable,
    global: GlobalState,
    channels: [ChannelState; CHANNELS],
    writes: Vec<RegisterWrite>,
}

impl<'a> VirtualPlayer<'a> {
    /// Build a player over a serialized blob.
    pub fn new(
        blob: &'a [u8],
        tables: SharedTables<'a>,
        remap: &'a EffectRemap,
        config: PlayerConfig,
    ) -> Result<VirtualPlayer<'a>> {
        if config.order_count == 0 {
            return Err(ForgeError::Other("player needs at least one order".to_string()));
        }
        if config.speed == 0 {
            return Err(ForgeError::Other("player speed of zero".to_string()));
        }
        let byte_at = |at: usize| -> Result<u8> {
            blob.get(at)
                .copied()
                .ok_or_else(|| ForgeError::Other(format!("blob shorter than offset {at:#06x}")))
        };
        let delta_base = byte_at(DELTA_BASE_OFFSET)? as usize;
        let transpose_base = byte_at(TRANSPOSE_BASE_OFFSET)? as usize;
        if delta_base + DELTA_WINDOW > tables.delta_table.len() {
            return Err(ForgeError::SolverFailure {
                song: 0,
                element: delta_base as u8,
            });
        }
        if transpose_base + TRANSPOSE_WINDOW > tables.transpose_table.len() {
            return Err(ForgeError::SolverFailure {
                song: 0,
                element: transpose_base as u8,
            });
        }

        let mut channels: [ChannelState; CHANNELS] = Default::default();
        for ch in &mut channels {
            ch.hr_timer = config.hard_restart;
        }
        Ok(VirtualPlayer {
            blob,
            tables,
            remap,
            order_count: config.order_count,
            delta_base,
            transpose_base,
            freq_table: FreqTable::pal(),
            global: GlobalState {
                speed: config.speed,
                // The first frame's increment lands on `speed` and
                // processes row 0 immediately.
                speed_counter: config.speed - 1,
                mod3: 0,
                order: 0,
                next_order: 0,
                row: 0,
                force_new_pattern: true,
                filter: FilterState::default(),
                volume: 0x0F,
                frame: 0,
            },
            channels,
            writes: Vec::new(),
        })
    }

    /// Run for `frames` frames and return the accumulated write trace.
    pub fn run(mut self, frames: u32) -> Result<Vec<RegisterWrite>> {
        self.writes.reserve(frames as usize * sid::VOICE_STRIDE as usize * CHANNELS);
        for _ in 0..frames {
            self.step_frame()?;
        }
        Ok(self.writes)
    }

    /// Advance one frame, appending this frame's register writes.
    pub fn step_frame(&mut self) -> Result<()> {
        // 1. Arp phase counter.
        self.global.mod3 = match self.global.mod3 {
            0 => 2,
            m => m - 1,
        };

        // 2. Row sequencing.
        self.global.speed_counter = self.global.speed_counter.wrapping_add(1);
        if self.global.speed_counter >= self.global.speed {
            self.global.speed_counter = 0;
            self.process_row()?;
        }

        // 3. Instrument frame step per channel.
        for ch in 0..CHANNELS {
            self.channel_frame(ch)?;
        }

        // 4. Filter program.
        self.filter_frame()?;

        // 5. Hard-restart look-ahead.
        for ch in 0..CHANNELS {
            self.hard_restart_lookahead(ch)?;
        }

        // 6. Register emission.
        self.emit();
        self.global.frame += 1;
        Ok(())
    }

    /// The write trace accumulated so far.
    pub fn trace(&self) -> &[RegisterWrite] {
        &self.writes
    }

    // ------------------------------------------------------------------
    // Row sequencing
    // ------------------------------------------------------------------

    fn process_row(&mut self) -> Result<()> {
        if self.global.force_new_pattern {
            self.global.force_new_pattern = false;
            self.global.row = 0;
            self.advance_order()?;
        } else {
            self.global.row += 1;
            if self.global.row >= PATTERN_ROWS {
                self.global.row = 0;
                self.advance_order()?;
            }
        }
        for ch in 0..CHANNELS {
            let packed = self.channels[ch].decoder.next_row(self.blob)?;
            self.dispatch_row(ch, packed)?;
        }
        Ok(())
    }

    fn advance_order(&mut self) -> Result<()> {
        let mut target = self.global.next_order;
        if target >= self.order_count {
            target = 0;
        }
        self.global.order = target;
        self.global.next_order = target + 1;
        for ch in 0..CHANNELS {
            let (transpose, delta) = self.order_entry(target, ch)?;
            let prev = if target == 0 {
                self.tables.start_const
            } else {
                self.channels[ch].trackptr
            };
            let trackptr = prev.wrapping_add(delta);
            let state = &mut self.channels[ch];
            state.transpose = transpose;
            state.trackptr = trackptr;
            state.decoder.init(self.blob, trackptr)?;
        }
        Ok(())
    }

    /// Decode one channel's `(transpose, delta)` from the order bitstream.
    fn order_entry(&self, order: usize, ch: usize) -> Result<(i8, u8)> {
        let at = ORDERS_OFFSET + order * 4;
        let b: Vec<u8> = (0..4)
            .map(|i| {
                self.blob.get(at + i).copied().ok_or_else(|| {
                    ForgeError::Other(format!("order {order} outside blob"))
                })
            })
            .collect::<Result<_>>()?;
        let (t_idx, d_idx) = match ch {
            0 => (b[0] & 0x0F, (b[1] & 0x0F) | ((b[2] >> 3) & 0x10)),
            1 => (b[0] >> 4, (b[2] >> 2) & 0x1F),
            _ => (b[1] >> 4, (b[2] & 0x03) | ((b[3] & 0x07) << 2)),
        };
        let transpose =
            self.tables.transpose_table[self.transpose_base + t_idx as usize] as i8;
        let delta = self.tables.delta_table[self.delta_base + d_idx as usize];
        Ok((transpose, delta))
    }

    fn dispatch_row(&mut self, ch: usize, packed: PackedRow) -> Result<()> {
        let effect = self.remap.decode(packed.effect(), packed.param());
        let state = &mut self.channels[ch];
        state.row_effect = effect;

        // Persisted registers: NOP keeps them, the owning effect sets its
        // own, anything else clears all three.
        match effect {
            RowEffect::None => {}
            RowEffect::Arp(p) => {
                state.perm_arp = Some(p);
                state.tone_porta = None;
                state.porta = None;
            }
            RowEffect::TonePorta(p) => {
                state.tone_porta = Some(p);
                state.perm_arp = None;
                state.porta = None;
                // The portamento family owns the frequency register; a
                // running slide would double-step it.
                state.slide_on = false;
                state.slide_acc = 0;
            }
            RowEffect::PortaUp(p) => {
                state.porta = Some((false, p));
                state.perm_arp = None;
                state.tone_porta = None;
                state.slide_on = false;
                state.slide_acc = 0;
            }
            RowEffect::PortaDown(p) => {
                state.porta = Some((true, p));
                state.perm_arp = None;
                state.tone_porta = None;
                state.slide_on = false;
                state.slide_acc = 0;
            }
            _ => {
                state.perm_arp = None;
                state.tone_porta = None;
                state.porta = None;
            }
        }

        if packed.inst() != 0 {
            state.inst = packed.inst();
        }
        let note = packed.note();
        if note == NOTE_OFF {
            state.gate = false;
        } else if note != 0 {
            state.note = note;
            if !matches!(effect, RowEffect::TonePorta(_)) {
                self.trigger_note(ch, note)?;
            }
        }

        match effect {
            RowEffect::VibratoOff => self.channels[ch].vib_off = true,
            RowEffect::FineSlide => {
                // One-shot nudge that survives the per-frame base
                // recompute.
                let state = &mut self.channels[ch];
                state.slide_acc = state.slide_acc.wrapping_add(SLIDE_STEP as i16);
            }
            RowEffect::PatternBreak => self.global.force_new_pattern = true,
            RowEffect::Ad(p) => self.channels[ch].ad = p,
            RowEffect::Sr(p) => self.channels[ch].sr = p,
            RowEffect::Speed(p) => {
                if p > 0 {
                    self.global.speed = p;
                }
            }
            RowEffect::HardRestart(p) => self.channels[ch].hr_timer = p,
            RowEffect::Slide(dir) => {
                let state = &mut self.channels[ch];
                state.slide_on = true;
                state.slide_down = dir == SlideDir::Down;
            }
            RowEffect::Reso(p) => self.global.filter.reso = p & 0x0F,
            RowEffect::FilterMode(p) => self.global.filter.mode = p & 0x0F,
            RowEffect::GlobalVol(p) => self.global.volume = p & 0x0F,
            RowEffect::FilterTrigger(slot) => self.filter_trigger(slot)?,
            _ => {}
        }
        Ok(())
    }

    fn trigger_note(&mut self, ch: usize, note: u8) -> Result<()> {
        let inst = self.channels[ch].inst;
        let record = if inst != 0 {
            Some(self.instrument(inst)?)
        } else {
            None
        };
        let state = &mut self.channels[ch];
        state.sounding_note = note;
        state.gate = true;
        state.hr_active = false;
        state.slide_on = false;
        state.slide_acc = 0;
        state.vib_off = false;
        state.vib_pos = 0;
        if let Some(rec) = record {
            state.ad = rec.ad;
            state.sr = rec.sr;
            state.wave_idx = rec.wave_start;
            state.wave_end = rec.wave_end;
            state.wave_loop = rec.wave_loop;
            state.arp_idx = rec.arp_start;
            state.arp_end = rec.arp_end;
            state.arp_loop = rec.arp_loop;
            state.vib_delay = rec.vib_delay;
            state.vib_depth = rec.vib_depth();
            state.vib_speed = rec.vib_speed();
            // The record's pulse byte arrives nibble-swapped from the
            // serializer: high nibble is the pulse-hi register, low nibble
            // the top of pulse-lo.
            state.pulse_acc =
                ((rec.pulse_width as u16 & 0x0F) << 8) | ((rec.pulse_width as u16 >> 4) << 4);
            state.pulse_speed = rec.pulse_speed;
            state.pulse_lim_up = rec.pulse_limit_up();
            state.pulse_lim_down = rec.pulse_limit_down();
            state.pulse_up = true;
        }
        Ok(())
    }

    fn instrument(&self, slot: u8) -> Result<Instrument> {
        let at = INSTRUMENTS_OFFSET + (slot as usize - 1) * INSTRUMENT_BYTES;
        let bytes = self
            .blob
            .get(at..at + INSTRUMENT_BYTES)
            .ok_or_else(|| ForgeError::Other(format!("instrument {slot} outside blob")))?;
        let mut record = [0u8; INSTRUMENT_BYTES];
        record.copy_from_slice(bytes);
        Ok(Instrument::from_bytes(&record))
    }

    fn filter_trigger(&mut self, slot: u8) -> Result<()> {
        if slot == 0 {
            return Ok(());
        }
        let record = self.instrument(slot)?;
        let filter = &mut self.global.filter;
        filter.active = true;
        filter.idx = record.filter_start;
        filter.end = record.filter_end;
        filter.loop_at = record.filter_loop;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Instrument frame step
    // ------------------------------------------------------------------

    fn channel_frame(&mut self, ch: usize) -> Result<()> {
        // Wavetable advance.
        let state = &self.channels[ch];
        let mut wave = state.wave;
        let mut wave_idx = state.wave_idx;
        if state.inst != 0 && wave_idx < state.wave_end {
            wave = *self
                .tables
                .wave_table
                .get(wave_idx as usize)
                .ok_or_else(|| ForgeError::Other(format!("wavetable index {wave_idx} out of range")))?;
            wave_idx += 1;
            if wave_idx >= state.wave_end {
                wave_idx = state.wave_loop;
            }
        }
        // Effect-wave override leaves the advance untouched.
        if let RowEffect::Wave(p) = state.row_effect {
            wave = p;
        }

        // Base frequency, unless a portamento owns the frequency register.
        let tone_porta_active = matches!(state.row_effect, RowEffect::TonePorta(_))
            || (state.row_effect.is_nop() && state.tone_porta.is_some());
        let porta_active = state.porta.is_some();
        let mut freq = state.freq;
        let mut arp_idx = state.arp_idx;
        if !tone_porta_active && !porta_active && state.sounding_note != 0 {
            let mut note = state.sounding_note as i32 + state.transpose as i32;
            if state.inst != 0 && arp_idx < state.arp_end {
                let entry = self.arp_entry(arp_idx)?;
                if entry & 0x80 != 0 {
                    note = (entry & 0x7F) as i32;
                } else {
                    note += entry as i8 as i32;
                }
                arp_idx += 1;
                if arp_idx >= state.arp_end {
                    arp_idx = state.arp_loop;
                }
            }
            freq = self.freq_table.lookup(clamp_note(note));
        }

        // Effect arp (regular, permanent, or NOP riding a permanent arp).
        let arp_param = match state.row_effect {
            RowEffect::Arp(_) | RowEffect::None => state.perm_arp,
            _ => None,
        };
        if let Some(p) = arp_param {
            if state.sounding_note != 0 {
                let base = state.sounding_note as i32 + state.transpose as i32;
                let note = match self.global.mod3 {
                    0 => base,
                    1 => base + (p >> 4) as i32,
                    _ => base + (p & 0x0F) as i32,
                };
                freq = self.freq_table.lookup(clamp_note(note));
            }
        }

        // Vibrato delay and depth.
        let state = &mut self.channels[ch];
        state.wave = wave;
        state.wave_idx = wave_idx;
        state.arp_idx = arp_idx;
        if state.vib_delay > 0 {
            state.vib_delay -= 1;
        }
        let vib_depth = if state.vib_delay == 0 && !state.vib_off {
            state.vib_depth
        } else {
            0
        };

        // Pulse modulation, paused while an effect drives the pulse.
        let pulse_effect = matches!(state.row_effect, RowEffect::Pulse(_));
        if !pulse_effect && state.inst != 0 && state.pulse_speed != 0 {
            if state.pulse_up {
                state.pulse_acc = (state.pulse_acc + state.pulse_speed as u16) & 0x0FFF;
                if (state.pulse_acc >> 8) as u8 >= state.pulse_lim_up {
                    state.pulse_up = false;
                }
            } else {
                state.pulse_acc = state.pulse_acc.wrapping_sub(state.pulse_speed as u16) & 0x0FFF;
                if (state.pulse_acc >> 8) as u8 <= state.pulse_lim_down {
                    state.pulse_up = true;
                }
            }
        }
        if let RowEffect::Pulse(p) = state.row_effect {
            state.pulse_acc = (p as u16) << 4;
        }

        // Tone portamento toward the row note, with overshoot snap.
        if tone_porta_active {
            let speed = match state.row_effect {
                RowEffect::TonePorta(p) => p,
                _ => state.tone_porta.unwrap_or(0),
            };
            let step = porta_step(speed);
            let target = self
                .freq_table
                .lookup(clamp_note(state.note as i32 + state.transpose as i32));
            if freq < target {
                freq = freq.saturating_add(step).min(target);
            } else if freq > target {
                freq = freq.saturating_sub(step).max(target);
            }
            if freq == target {
                state.sounding_note = state.note;
            }
        }

        // Porta up / down.
        if let Some((down, speed)) = state.porta {
            let step = porta_step(speed);
            freq = if down {
                freq.wrapping_sub(step)
            } else {
                freq.wrapping_add(step)
            };
        }

        // Slide accumulator; it rides on top of the base value so the
        // per-frame base recompute cannot swallow it.
        if state.slide_on {
            state.slide_acc = if state.slide_down {
                state.slide_acc.wrapping_sub(SLIDE_STEP as i16)
            } else {
                state.slide_acc.wrapping_add(SLIDE_STEP as i16)
            };
        }
        state.freq = freq;
        let slid = freq.wrapping_add(state.slide_acc as u16);

        // Vibrato offset, added with 16-bit wrap.
        let offset = vibrato_offset(vib_depth, state.vib_pos);
        state.vib_pos = (state.vib_pos + state.vib_speed) & 0x3F;
        state.final_freq = (slid as i32).wrapping_add(offset) as u16;
        Ok(())
    }

    fn arp_entry(&self, idx: u8) -> Result<u8> {
        if idx as usize >= ARP_REGION_LEN {
            return Err(ForgeError::Other(format!("arp index {idx} out of range")));
        }
        self.blob
            .get(ARP_OFFSET + idx as usize)
            .copied()
            .ok_or_else(|| ForgeError::Other(format!("arp index {idx} outside blob")))
    }

    fn filter_frame(&mut self) -> Result<()> {
        let filter = &mut self.global.filter;
        if !filter.active || filter.idx >= filter.end {
            return Ok(());
        }
        if filter.idx as usize >= FILTER_REGION_LEN {
            return Err(ForgeError::Other(format!(
                "filter index {} out of range",
                filter.idx
            )));
        }
        let entry = self
            .blob
            .get(FILTER_OFFSET + filter.idx as usize)
            .copied()
            .ok_or_else(|| ForgeError::Other("filter table outside blob".to_string()))?;
        if entry & 0x80 != 0 {
            filter.cutoff = (entry & 0x7F) << 1;
        } else {
            filter.cutoff = filter.cutoff.wrapping_add(entry);
        }
        filter.idx += 1;
        if filter.idx >= filter.end {
            filter.idx = filter.loop_at;
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Hard restart
    // ------------------------------------------------------------------

    fn hard_restart_lookahead(&mut self, ch: usize) -> Result<()> {
        let timer = self.channels[ch].hr_timer;
        if timer == 0 {
            return Ok(());
        }
        if (self.global.speed_counter as u16 + timer as u16) < self.global.speed as u16 {
            return Ok(());
        }
        let next = self.peek_next_row(ch)?;
        let tone_porta = self
            .remap
            .number_of(EffectKind::TonePorta)
            .map(|n| n == next.effect())
            .unwrap_or(false);
        if next.note() != NOTE_OFF
            && !tone_porta
            && (next.note() != 0 || next.effect_bit3())
        {
            self.channels[ch].hr_active = true;
        }
        Ok(())
    }

    /// The row the channel will decode next: a transient decode inside the
    /// current pattern, or a stateless re-decode of the next order's first
    /// row.
    fn peek_next_row(&self, ch: usize) -> Result<PackedRow> {
        if !self.global.force_new_pattern && self.global.row + 1 < PATTERN_ROWS {
            return self.channels[ch].decoder.peek_row(self.blob);
        }
        let mut target = self.global.next_order;
        if target >= self.order_count {
            target = 0;
        }
        let (_, delta) = self.order_entry(target, ch)?;
        let prev = if target == 0 {
            self.tables.start_const
        } else {
            self.channels[ch].trackptr
        };
        let trackptr = prev.wrapping_add(delta);
        let mut decoder = crate::decoder::ChannelDecoder::default();
        decoder.init(self.blob, trackptr)?;
        decoder.next_row(self.blob)
    }

    // ------------------------------------------------------------------
    // Emission
    // ------------------------------------------------------------------

    fn emit(&mut self) {
        let frame = self.global.frame;
        for (voice, state) in self.channels.iter().enumerate() {
            let (control, ad, sr) = if state.hr_active {
                (0, 0, 0)
            } else {
                let control = if state.gate {
                    state.wave | ControlFlags::GATE.bits()
                } else {
                    state.wave & !ControlFlags::GATE.bits()
                };
                (control, state.ad, state.sr)
            };
            let mut push = |reg: u16, value: u8| {
                self.writes
                    .push(RegisterWrite::new(sid::voice_reg(voice, reg), value, frame));
            };
            push(sid::PULSE_LO, (state.pulse_acc & 0xFF) as u8);
            push(sid::PULSE_HI, ((state.pulse_acc >> 8) & 0x0F) as u8);
            push(sid::FREQ_LO, (state.final_freq & 0xFF) as u8);
            push(sid::FREQ_HI, (state.final_freq >> 8) as u8);
            push(sid::CONTROL, control);
            push(sid::AD, ad);
            push(sid::SR, sr);
        }
        let filter = &self.global.filter;
        self.writes.push(RegisterWrite::new(sid::FILTER_CUTOFF, filter.cutoff, frame));
        self.writes.push(RegisterWrite::new(
            sid::FILTER_RESO,
            (filter.reso << 4) | 0x07,
            frame,
        ));
        self.writes.push(RegisterWrite::new(
            sid::MODE_VOL,
            (filter.mode << 4) | self.global.volume,
            frame,
        ));
    }
}

/// Portamento step from the swapped-nibble speed byte.
fn porta_step(speed: u8) -> u16 {
    (speed.rotate_left(4) as u16) << 1
}
