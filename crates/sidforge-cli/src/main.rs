//! sidforge - offline music data compiler for the 3-voice engine.
//!
//! Reads the legacy song images, re-encodes them into packed blobs for
//! the new runtime player, solves the shared lookup tables, proves the
//! result bit-exact against the captured reference traces, and writes
//! the generated files.

mod args;
mod collab;
mod equivmode;
mod forge;
mod io;
mod report;

use std::env;
use std::path::Path;

use anyhow::Context;

use args::{print_help, CliArgs, Mode};
use collab::{NoToolchain, PlayerToolchain, ShellToolchain, TraceFileTracer};
use forge::PART_TIMES;

fn main() {
    let args = match CliArgs::parse(env::args().skip(1)) {
        Ok(args) => args,
        Err(e) => {
            eprintln!("sidforge: {e}");
            eprintln!("try: sidforge --help");
            std::process::exit(2);
        }
    };
    if let Err(e) = run(&args) {
        eprintln!("sidforge: {e:#}");
        std::process::exit(1);
    }
}

fn run(args: &CliArgs) -> anyhow::Result<()> {
    match args.mode {
        Mode::Help => {
            print_help();
            Ok(())
        }
        Mode::Build => run_build(args),
        Mode::EquivTest(only) => {
            let songs = io::load_songs(&args.input_dir)?;
            let mut cache = io::load_cache(&args.cache_path)?;
            equivmode::equiv_test(&songs, &mut cache, only)?;
            io::save_cache(&cache, &args.cache_path)
                .context("writing the equivalence cache")?;
            Ok(())
        }
        Mode::EquivValidate(song) => {
            let songs = io::load_songs(&args.input_dir)?;
            let mut cache = io::load_cache(&args.cache_path)?;
            equivmode::equiv_validate(&songs, &mut cache, song)?;
            io::save_cache(&cache, &args.cache_path)
                .context("writing the equivalence cache")?;
            Ok(())
        }
    }
}

fn run_build(args: &CliArgs) -> anyhow::Result<()> {
    let songs = io::load_songs(&args.input_dir).context("loading song images")?;
    println!("loaded {} songs from {}", songs.len(), args.input_dir);
    let cache = io::load_cache(&args.cache_path).context("loading the equivalence cache")?;

    let build = forge::build(&songs, &cache).context("compiling")?;

    let tracer = TraceFileTracer::new(&args.trace_dir);
    forge::verify_build(&build, &tracer, &PART_TIMES).context("verifying against reference traces")?;
    println!("all {} songs verified against their reference traces", build.songs.len());

    io::write_outputs(&build, &args.output_dir).context("writing generated files")?;

    match &args.asm_command {
        Some(command) => {
            let mut parts = command.split_whitespace();
            let program = parts.next().unwrap_or_default();
            let toolchain =
                ShellToolchain::new(program, parts.map(str::to_string).collect());
            toolchain
                .rebuild_player(Path::new(&args.output_dir))
                .context("rebuilding the runtime player")?;
            println!("runtime player rebuilt");
        }
        None => {
            NoToolchain.rebuild_player(Path::new(&args.output_dir))?;
        }
    }

    let shared = build.delta_table.len() + build.transpose_table.len();
    let reports: Vec<_> = build.songs.iter().map(|s| s.report.clone()).collect();
    report::print_summary(&reports, shared, build.wave_table.len());
    Ok(())
}
