//! Frame-step semantics: portamento, vibrato, pulse modulation, filter
//! program, slides, speed changes and the hard-restart look-ahead.
//!
//! Every test serializes a real blob through the pipeline and reads the
//! behavior back out of the register-write trace.

use sidforge_model::instrument::INSTRUMENT_SLOTS;
use sidforge_model::layout::BLOB_LIMIT;
use sidforge_model::{
    sid, EffectKind, EffectRemap, Instrument, OrderEntry, Pattern, RegisterWrite, Row, RowEffect,
    SlideDir, DELTA_WINDOW, PATTERN_ROWS, TRANSPOSE_WINDOW,
};
use sidforge_pipeline::{
    delta_set, freeze_song, lay_out, serialize_blob, transpose_set, RowDict, SongWindows,
    TransformedSong,
};
use sidforge_vplayer::{FreqTable, PlayerConfig, SharedTables, VirtualPlayer};

/// Effect numbering used by every test in this file (the Ad effect is the
/// one kind left out; instruments carry AD directly).
fn remap() -> EffectRemap {
    EffectRemap::from_ranking(vec![
        EffectKind::TonePorta,
        EffectKind::PortaUp,
        EffectKind::PortaDown,
        EffectKind::Pulse,
        EffectKind::Slide,
        EffectKind::Speed,
        EffectKind::HardRestart,
        EffectKind::FilterTrigger,
        EffectKind::Reso,
        EffectKind::GlobalVol,
        EffectKind::FilterMode,
        EffectKind::Arp,
        EffectKind::Wave,
        EffectKind::Sr,
    ])
    .unwrap()
}

fn song_with(instrument: Instrument, rows: Vec<(usize, Row)>, speed: u8) -> TransformedSong {
    let mut instruments = vec![Instrument::default(); INSTRUMENT_SLOTS];
    instruments[1] = instrument;
    let mut pattern = vec![Row::ZERO; PATTERN_ROWS];
    for (at, row) in rows {
        pattern[at] = row;
    }
    TransformedSong {
        index: 0,
        instruments,
        orders: [
            vec![OrderEntry::new(0, 0)],
            vec![OrderEntry::new(1, 0)],
            vec![OrderEntry::new(1, 0)],
        ],
        patterns: vec![
            Pattern::new(pattern),
            Pattern::new(vec![Row::ZERO; PATTERN_ROWS]),
        ],
        wave_table: vec![0x40],
        arp_table: Vec::new(),
        filter_table: Vec::new(),
        speed,
    }
}

fn note(n: u8, inst: u8) -> Row {
    Row {
        note: n,
        inst,
        effect: RowEffect::None,
    }
}

fn fx(effect: RowEffect) -> Row {
    Row {
        note: 0,
        inst: 0,
        effect,
    }
}

fn run(song: &TransformedSong, frames: u32, hard_restart: u8) -> Vec<RegisterWrite> {
    let remap = remap();
    let frozen = freeze_song(song, &remap).unwrap();
    let dict = RowDict::build(&frozen.patterns, None).unwrap();
    let laid = lay_out(&frozen, &dict).unwrap();

    let mut delta_table: Vec<u8> = delta_set(&song.orders, 0).into_iter().map(|d| d as u8).collect();
    delta_table.resize(DELTA_WINDOW, 0xEE);
    let mut transpose_table: Vec<u8> =
        transpose_set(&song.orders).into_iter().map(|t| t as u8).collect();
    transpose_table.resize(TRANSPOSE_WINDOW, 0x7E);

    let windows = SongWindows {
        delta_window: &delta_table,
        transpose_window: &transpose_table,
        delta_base: 0,
        transpose_base: 0,
        start_const: 0,
    };
    let mut blob = serialize_blob(&frozen, &dict, &laid, &windows).unwrap();
    blob.resize(BLOB_LIMIT, 0);

    let tables = SharedTables {
        delta_table: &delta_table,
        transpose_table: &transpose_table,
        wave_table: &song.wave_table,
        start_const: 0,
    };
    let config = PlayerConfig {
        speed: song.speed,
        order_count: song.orders[0].len(),
        hard_restart,
    };
    VirtualPlayer::new(&blob, tables, &remap, config)
        .unwrap()
        .run(frames)
        .unwrap()
}

/// Voice-0 frequency per frame.
fn freqs(trace: &[RegisterWrite]) -> Vec<u16> {
    let lo: Vec<u8> = trace
        .iter()
        .filter(|w| w.addr == sid::voice_reg(0, sid::FREQ_LO))
        .map(|w| w.value)
        .collect();
    let hi: Vec<u8> = trace
        .iter()
        .filter(|w| w.addr == sid::voice_reg(0, sid::FREQ_HI))
        .map(|w| w.value)
        .collect();
    lo.iter()
        .zip(hi.iter())
        .map(|(&l, &h)| u16::from(l) | (u16::from(h) << 8))
        .collect()
}

fn values(trace: &[RegisterWrite], addr: u16) -> Vec<u8> {
    trace.iter().filter(|w| w.addr == addr).map(|w| w.value).collect()
}

fn plain_instrument() -> Instrument {
    Instrument {
        ad: 0x19,
        sr: 0xA0,
        wave_end: 1,
        ..Instrument::default()
    }
}

#[test]
fn tone_porta_slides_with_overshoot_snap() {
    let song = song_with(
        plain_instrument(),
        vec![
            (0, note(0x30, 1)),
            (2, Row {
                note: 0x3C,
                inst: 0,
                effect: RowEffect::TonePorta(0x08),
            }),
        ],
        4,
    );
    let trace = run(&song, 40, 0);
    let f = freqs(&trace);
    let table = FreqTable::pal();
    let start = table.lookup(0x30);
    let target = table.lookup(0x3C);
    // Step = swapped-nibble speed widened: 0x08 -> 0x80 -> 0x100.
    let step = 0x100u16;

    assert_eq!(f[7], start);
    // The slide starts on row 2's first frame and persists through the
    // following NOP rows.
    assert_eq!(f[8], start + step);
    assert_eq!(f[9], start + 2 * step);
    // Eventually the snap lands exactly on the target and stays.
    let reach = f.iter().position(|&v| v == target).expect("target reached");
    assert!(reach > 9);
    assert!(f[reach..].iter().all(|&v| v == target));
    // No overshoot anywhere.
    assert!(f.iter().all(|&v| v <= target));
}

#[test]
fn porta_up_accumulates_each_frame() {
    let song = song_with(
        plain_instrument(),
        vec![
            (0, note(0x30, 1)),
            (1, fx(RowEffect::PortaUp(0x08))),
        ],
        4,
    );
    let trace = run(&song, 12, 0);
    let f = freqs(&trace);
    let base = FreqTable::pal().lookup(0x30);
    assert_eq!(f[3], base);
    // From row 1 on, +0x100 per frame, through the NOP rows as well.
    for k in 0..8 {
        assert_eq!(f[4 + k], base + 0x100 * (k as u16 + 1), "frame {}", 4 + k);
    }
}

#[test]
fn vibrato_waits_for_delay_and_oscillates() {
    let instrument = Instrument {
        vib_delay: 2,
        vib_depth_speed: 0x42,
        ..plain_instrument()
    };
    let song = song_with(instrument, vec![(0, note(0x30, 1))], 64);
    let trace = run(&song, 20, 0);
    let f = freqs(&trace);
    let base = FreqTable::pal().lookup(0x30);
    // Delay still running: no offset.
    assert_eq!(f[0], base);
    // Position advances by the speed every frame; depth row 4 of the
    // vibrato table, mirrored and sign-flipped over the phase.
    assert_eq!(f[1], base + 9); // position 2
    assert_eq!(f[2], base + 15); // position 4
    assert_eq!(f[16], base.wrapping_sub(3)); // position 32, negated
}

#[test]
fn vibrato_off_effect_freezes_the_offset() {
    let instrument = Instrument {
        vib_depth_speed: 0x42,
        ..plain_instrument()
    };
    let song = song_with(
        instrument,
        vec![(0, note(0x30, 1)), (1, fx(RowEffect::VibratoOff))],
        4,
    );
    let trace = run(&song, 12, 0);
    let f = freqs(&trace);
    let base = FreqTable::pal().lookup(0x30);
    // Rows 1+ have vibrato switched off.
    assert!(f[4..].iter().all(|&v| v == base));
}

#[test]
fn pulse_accumulator_runs_between_limits() {
    let instrument = Instrument {
        pulse_width: 0x8F,
        pulse_speed: 0x10,
        pulse_limits: 0xA4,
        ..plain_instrument()
    };
    let song = song_with(instrument, vec![(0, note(0x30, 1))], 64);
    let trace = run(&song, 20, 0);
    let lo = values(&trace, sid::voice_reg(0, sid::PULSE_LO));
    let hi = values(&trace, sid::voice_reg(0, sid::PULSE_HI));
    // Trigger loads $8F0 (the nibble-swapped instrument byte), then the
    // accumulator steps upward by $10 per frame.
    assert_eq!((lo[0], hi[0]), (0x00, 0x09));
    assert_eq!((lo[1], hi[1]), (0x10, 0x09));
    // The high nibble reaches the up limit $A and the direction flips.
    assert_eq!((lo[16], hi[16]), (0x00, 0x0A));
    assert_eq!((lo[17], hi[17]), (0xF0, 0x09));
}

#[test]
fn pulse_effect_overrides_and_pauses_modulation() {
    let instrument = Instrument {
        pulse_width: 0x80,
        pulse_speed: 0x10,
        pulse_limits: 0xF0,
        ..plain_instrument()
    };
    let song = song_with(
        instrument,
        vec![(0, note(0x30, 1)), (1, fx(RowEffect::Pulse(0x23)))],
        4,
    );
    let trace = run(&song, 8, 0);
    let lo = values(&trace, sid::voice_reg(0, sid::PULSE_LO));
    let hi = values(&trace, sid::voice_reg(0, sid::PULSE_HI));
    // Row 1: the effect drives the pulse to $230 and the accumulator
    // holds.
    for frame in 4..8 {
        assert_eq!((lo[frame], hi[frame]), (0x30, 0x02), "frame {frame}");
    }
}

#[test]
fn filter_program_and_filter_effects() {
    let mut instrument = plain_instrument();
    instrument.filter_start = 0;
    instrument.filter_end = 2;
    instrument.filter_loop = 1;
    let mut song = song_with(
        instrument,
        vec![
            (0, Row {
                note: 0x30,
                inst: 1,
                effect: RowEffect::FilterTrigger(1),
            }),
            (1, fx(RowEffect::GlobalVol(0x5))),
            (2, fx(RowEffect::Reso(0x9))),
            (3, fx(RowEffect::FilterMode(0x1))),
        ],
        1,
    );
    song.filter_table = vec![0xA0, 0x05];
    let trace = run(&song, 6, 0);
    let cutoff = values(&trace, sid::FILTER_CUTOFF);
    // Entry $A0 loads cutoff $40 absolutely; entry $05 adds; the program
    // loops back to the delta entry.
    assert_eq!(&cutoff[..4], &[0x40, 0x45, 0x4A, 0x4F]);
    let mode_vol = values(&trace, sid::MODE_VOL);
    assert_eq!(mode_vol[0], 0x0F);
    assert_eq!(mode_vol[1], 0x05);
    assert_eq!(mode_vol[3], 0x15);
    let reso = values(&trace, sid::FILTER_RESO);
    assert_eq!(reso[1], 0x07);
    assert_eq!(reso[2], 0x97);
}

#[test]
fn slide_accumulator_steps_and_fine_slide_nudges() {
    let song = song_with(
        plain_instrument(),
        vec![(0, note(0x30, 1)), (2, fx(RowEffect::Slide(SlideDir::Up)))],
        4,
    );
    let trace = run(&song, 16, 0);
    let f = freqs(&trace);
    let base = FreqTable::pal().lookup(0x30);
    assert_eq!(f[7], base);
    for k in 0..8 {
        assert_eq!(f[8 + k], base + 0x20 * (k as u16 + 1), "frame {}", 8 + k);
    }

    let song = song_with(
        plain_instrument(),
        vec![(0, note(0x30, 1)), (2, fx(RowEffect::FineSlide))],
        4,
    );
    let trace = run(&song, 16, 0);
    let f = freqs(&trace);
    assert_eq!(f[7], base);
    // One-shot: a constant +0x20 from row 2 on.
    assert!(f[8..].iter().all(|&v| v == base + 0x20));
}

#[test]
fn speed_effect_changes_row_pacing() {
    let song = song_with(
        plain_instrument(),
        vec![
            (0, note(0x30, 1)),
            (1, fx(RowEffect::Speed(2))),
            (2, note(0x40, 1)),
        ],
        6,
    );
    let trace = run(&song, 12, 0);
    let f = freqs(&trace);
    let table = FreqTable::pal();
    // Row 0 runs six frames, row 1 switches the speed, row 2 lands two
    // frames later.
    assert_eq!(f[7], table.lookup(0x30));
    assert_eq!(f[8], table.lookup(0x40));
}

#[test]
fn hard_restart_zeroes_envelope_before_the_trigger() {
    let song = song_with(
        plain_instrument(),
        vec![(0, note(0x30, 1)), (1, note(0x40, 1))],
        4,
    );
    let trace = run(&song, 8, 2);
    let ctrl = values(&trace, sid::voice_reg(0, sid::CONTROL));
    let ad = values(&trace, sid::voice_reg(0, sid::AD));
    // Two frames before row 1 the look-ahead sees the coming note.
    assert_eq!(ctrl[0], 0x41);
    assert_eq!(ctrl[1], 0x41);
    assert_eq!(ctrl[2], 0x00);
    assert_eq!(ctrl[3], 0x00);
    assert_eq!(ad[2], 0x00);
    // The trigger clears the restart state.
    assert_eq!(ctrl[4], 0x41);
    assert_eq!(ad[4], 0x19);
}

#[test]
fn instrument_arp_table_offsets_and_absolutes() {
    let instrument = Instrument {
        arp_start: 0,
        arp_end: 3,
        arp_loop: 2,
        ..plain_instrument()
    };
    let mut song = song_with(instrument, vec![(0, note(0x30, 1))], 64);
    // +4 semitones, absolute note 7, +0, then loop on the +0 entry.
    song.arp_table = vec![0x04, 0x87, 0x00];
    let trace = run(&song, 6, 0);
    let f = freqs(&trace);
    let table = FreqTable::pal();
    assert_eq!(f[0], table.lookup(0x34));
    assert_eq!(f[1], table.lookup(0x07));
    assert_eq!(f[2], table.lookup(0x30));
    assert_eq!(f[3], table.lookup(0x30));
    assert_eq!(f[4], table.lookup(0x30));
}

#[test]
fn wavetable_program_advances_and_loops() {
    let instrument = Instrument {
        wave_start: 0,
        wave_end: 3,
        wave_loop: 1,
        ..plain_instrument()
    };
    let mut song = song_with(instrument, vec![(0, note(0x30, 1))], 64);
    song.wave_table = vec![0x10, 0x20, 0x40];
    let trace = run(&song, 6, 0);
    let ctrl = values(&trace, sid::voice_reg(0, sid::CONTROL));
    // Gate rides on every waveform; the program loops back to entry 1.
    assert_eq!(&ctrl[..6], &[0x11, 0x21, 0x41, 0x21, 0x41, 0x21]);
}

#[test]
fn hard_restart_skips_tone_porta_rows() {
    let song = song_with(
        plain_instrument(),
        vec![
            (0, note(0x30, 1)),
            (1, Row {
                note: 0x3C,
                inst: 0,
                effect: RowEffect::TonePorta(0x04),
            }),
        ],
        4,
    );
    let trace = run(&song, 8, 2);
    let ctrl = values(&trace, sid::voice_reg(0, sid::CONTROL));
    // A tone-porta row must not hard-restart: the slide continues the old
    // note.
    assert!(ctrl[..8].iter().all(|&v| v == 0x41));
}
