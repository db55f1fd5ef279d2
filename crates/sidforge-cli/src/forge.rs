//! The pipeline driver: parsed songs in, verified blobs out.

use std::collections::BTreeSet;

use rayon::prelude::*;
use sidforge_model::{
    EffectRemap, ForgeError, RegisterWrite, Result, Song, CHANNELS, DELTA_WINDOW,
    TRANSPOSE_WINDOW,
};
use sidforge_pipeline::{
    analyze, apply_equivalences, build_effect_remap, build_instrument_remap, freeze_song, lay_out,
    renumber_patterns, serialize_blob, transform, translate_substitutions, transpose_set,
    EquivCache, RowDict, SongWindows,
};
use sidforge_tables::{solve_deltas, solve_transposes, SongDeltaInput};
use sidforge_vplayer::{PlayerConfig, SharedTables, VirtualPlayer};

use crate::collab::ReferenceTracer;
use crate::report::SongReport;

/// Playback length per song, in frames; trace comparison runs over
/// exactly this window.
pub const PART_TIMES: [u32; 9] = [
    21_000, 30_500, 26_250, 18_400, 49_316, 24_700, 33_100, 27_850, 15_600,
];

/// Default hard-restart timer the runtime player ships with.
pub const DEFAULT_HARD_RESTART: u8 = 2;

/// One compiled song.
#[derive(Debug, Clone)]
pub struct BuiltSong {
    /// The serialized blob.
    pub blob: Vec<u8>,
    /// Initial speed assembled into the player.
    pub speed: u8,
    /// Order count assembled into the player.
    pub order_count: usize,
    /// Build statistics.
    pub report: SongReport,
}

/// A complete, not yet verified build.
#[derive(Debug, Clone)]
pub struct Build {
    /// Compiled songs, in input order.
    pub songs: Vec<BuiltSong>,
    /// Effect renumbering baked into the blobs.
    pub remap: EffectRemap,
    /// Globalized wavetable.
    pub wave_table: Vec<u8>,
    /// Shared delta table.
    pub delta_table: Vec<u8>,
    /// Shared transpose table.
    pub transpose_table: Vec<u8>,
    /// The trackptr seed constant.
    pub start_const: u8,
}

/// Run the whole compile pipeline over the parsed songs.
pub fn build(songs: &[Song], cache: &EquivCache) -> Result<Build> {
    // Analyze everything first: the effect renumbering is global.
    let analyses = songs.iter().map(analyze).collect::<Result<Vec<_>>>()?;
    let remap = build_effect_remap(&analyses)?;

    // Transform and renumber each song.
    let mut transformed = Vec::with_capacity(songs.len());
    let mut aliased_counts = Vec::with_capacity(songs.len());
    for (song, analysis) in songs.iter().zip(&analyses) {
        let inst_remap = build_instrument_remap(analysis)?;
        let mut t = transform(song, analysis, &inst_remap)?;
        renumber_patterns(&mut t, 0)?;
        aliased_counts.push(count_aliased(song, &t, analysis));
        transformed.push(t);
    }

    // Shared tables.
    let wave_table = sidforge_pipeline::globalize_wavetables(&mut transformed)?;
    let delta_inputs: Vec<SongDeltaInput> = transformed
        .iter()
        .map(|t| SongDeltaInput {
            interior: interior_deltas(t),
            firsts: [
                t.orders[0][0].pattern,
                t.orders[1][0].pattern,
                t.orders[2][0].pattern,
            ],
        })
        .collect();
    let deltas = solve_deltas(&delta_inputs)?;
    let transpose_sets: Vec<BTreeSet<u8>> = transformed
        .iter()
        .map(|t| transpose_set(&t.orders).into_iter().map(|v| v as u8).collect())
        .collect();
    let transposes = solve_transposes(&transpose_sets)?;

    // Freeze, apply cached equivalences, build dictionaries (chained for
    // cross-song slot reuse), lay out and serialize.
    let mut built = Vec::with_capacity(songs.len());
    let mut previous_dict: Option<RowDict> = None;
    for (index, t) in transformed.iter().enumerate() {
        let inst_remap = build_instrument_remap(&analyses[index])?;
        let mut frozen = freeze_song(t, &remap)?;
        if let Some(equivs) = cache.song(index) {
            let subs = translate_substitutions(&equivs.active(), &inst_remap, &remap);
            apply_equivalences(&mut frozen.patterns, &subs);
        }
        let dict = RowDict::build(&frozen.patterns, previous_dict.as_ref())?;
        let laid = lay_out(&frozen, &dict)?;

        let delta_base = window_base(deltas.bases[index], "delta window base")?;
        let transpose_base = window_base(transposes.bases[index], "transpose window base")?;
        let windows = SongWindows {
            delta_window: &deltas.table[deltas.bases[index]..deltas.bases[index] + DELTA_WINDOW],
            transpose_window: &transposes.table
                [transposes.bases[index]..transposes.bases[index] + TRANSPOSE_WINDOW],
            delta_base,
            transpose_base,
            start_const: deltas.start_const,
        };
        let blob = serialize_blob(&frozen, &dict, &laid, &windows)?;

        let report = SongReport {
            song: index + 1,
            orders: t.orders[0].len(),
            patterns: t.patterns.len(),
            aliased: aliased_counts[index],
            dict_entries: dict.len(),
            packed_bytes: laid.packed_bytes,
            blob_bytes: blob.len(),
        };
        built.push(BuiltSong {
            blob,
            speed: t.speed,
            order_count: t.orders[0].len(),
            report,
        });
        previous_dict = Some(dict);
    }

    Ok(Build {
        songs: built,
        remap,
        wave_table,
        delta_table: deltas.table,
        transpose_table: transposes.table,
        start_const: deltas.start_const,
    })
}

/// Replay every built song and compare against the reference traces.
///
/// One worker per song; results are collected and reported in song order,
/// and the first failure aborts the build.
pub fn verify_build(
    build: &Build,
    tracer: &dyn ReferenceTracer,
    part_times: &[u32],
) -> Result<()> {
    let mut results: Vec<(usize, Result<()>)> = build
        .songs
        .par_iter()
        .enumerate()
        .map(|(index, song)| {
            let frames = part_times.get(index).copied().unwrap_or(0);
            (index, verify_song(build, song, tracer, index, frames))
        })
        .collect();
    results.sort_by_key(|&(index, _)| index);
    for (_, result) in results {
        result?;
    }
    Ok(())
}

fn verify_song(
    build: &Build,
    song: &BuiltSong,
    tracer: &dyn ReferenceTracer,
    index: usize,
    frames: u32,
) -> Result<()> {
    let produced = play_song(build, song, frames)?;
    let reference = tracer.reference_trace(index, frames)?;
    sidforge_verify::compare_traces(&produced, &reference)
}

/// Replay one built song on the virtual player.
pub fn play_song(build: &Build, song: &BuiltSong, frames: u32) -> Result<Vec<RegisterWrite>> {
    let tables = SharedTables {
        delta_table: &build.delta_table,
        transpose_table: &build.transpose_table,
        wave_table: &build.wave_table,
        start_const: build.start_const,
    };
    let config = PlayerConfig {
        speed: song.speed,
        order_count: song.order_count,
        hard_restart: DEFAULT_HARD_RESTART,
    };
    VirtualPlayer::new(&song.blob, tables, &build.remap, config)?.run(frames)
}

/// Trackptr deltas between consecutive orders, per channel, excluding the
/// start-constant-dependent first delta.
fn interior_deltas(t: &sidforge_pipeline::TransformedSong) -> BTreeSet<u8> {
    let mut set = BTreeSet::new();
    for ch in 0..CHANNELS {
        for pair in t.orders[ch].windows(2) {
            set.insert(pair[1].pattern.wrapping_sub(pair[0].pattern));
        }
    }
    set
}

fn window_base(base: usize, what: &'static str) -> Result<u8> {
    u8::try_from(base).map_err(|_| ForgeError::BudgetExceeded {
        what,
        limit: u8::MAX as usize,
        actual: base,
    })
}

/// Patterns the dedup aliased away: referenced in the source song's
/// reachable orders but absent from the transformed table.
fn count_aliased(
    song: &Song,
    transformed: &sidforge_pipeline::TransformedSong,
    analysis: &sidforge_pipeline::Analysis,
) -> usize {
    let mut referenced = BTreeSet::new();
    for &order in &analysis.reachable {
        for ch in 0..CHANNELS {
            referenced.insert(song.orders[ch][order].pattern);
        }
    }
    referenced.len().saturating_sub(transformed.patterns.len())
}
