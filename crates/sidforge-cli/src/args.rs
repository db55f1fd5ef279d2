//! Command-line argument parsing.
//!
//! The flag dialect is the legacy tool's single-dash style, so parsing is
//! an explicit loop over `env::args` rather than a derive:
//!
//! - default mode: run the full pipeline
//! - `-equivtest [N]`: rebuild the row-equivalence cache (song N, or all)
//! - `-equivvalidate N`: narrow a song's cached equivalences
//! - `-in/-out/-traces/-cache DIR|FILE`: path overrides
//! - `-h`/`--help`

use std::fmt;

/// What the invocation asks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mode {
    /// Full pipeline run.
    Build,
    /// Exhaustive equivalence search; `None` means every song.
    EquivTest(Option<usize>),
    /// Binary-search a song's cached equivalences.
    EquivValidate(usize),
    /// Print usage.
    Help,
}

/// Parsed command-line arguments.
#[derive(Debug, Clone)]
pub struct CliArgs {
    /// Selected mode.
    pub mode: Mode,
    /// Directory holding the legacy song images.
    pub input_dir: String,
    /// Directory the generated files land in.
    pub output_dir: String,
    /// Directory holding the captured reference traces.
    pub trace_dir: String,
    /// Row-equivalence cache file.
    pub cache_path: String,
    /// Assembler command rebuilding the runtime player, if configured.
    pub asm_command: Option<String>,
}

impl Default for CliArgs {
    fn default() -> Self {
        CliArgs {
            mode: Mode::Build,
            input_dir: "uncompressed".to_string(),
            output_dir: "generated".to_string(),
            trace_dir: "traces".to_string(),
            cache_path: "equiv-cache.json".to_string(),
            asm_command: None,
        }
    }
}

/// A bad invocation, with the message to print.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArgError(pub String);

impl fmt::Display for ArgError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for ArgError {}

impl CliArgs {
    /// Parse from an argument list (without the program name).
    pub fn parse<I: IntoIterator<Item = String>>(args: I) -> Result<CliArgs, ArgError> {
        let mut parsed = CliArgs::default();
        let mut iter = args.into_iter().peekable();
        while let Some(arg) = iter.next() {
            match arg.as_str() {
                "-h" | "--help" => parsed.mode = Mode::Help,
                "-equivtest" => {
                    // Optional song number; 0 or absent means all songs.
                    let song = match iter.peek() {
                        Some(v) if !v.starts_with('-') => {
                            let v = iter.next().unwrap();
                            Some(parse_song_number(&v)?)
                        }
                        _ => None,
                    };
                    parsed.mode = Mode::EquivTest(song.filter(|&n| n > 0));
                }
                "-equivvalidate" => {
                    let v = iter
                        .next()
                        .ok_or_else(|| ArgError("-equivvalidate needs a song number".to_string()))?;
                    let song = parse_song_number(&v)?;
                    if song == 0 {
                        return Err(ArgError("-equivvalidate needs a song number 1..=9".to_string()));
                    }
                    parsed.mode = Mode::EquivValidate(song);
                }
                "-in" => parsed.input_dir = take_value(&mut iter, "-in")?,
                "-out" => parsed.output_dir = take_value(&mut iter, "-out")?,
                "-traces" => parsed.trace_dir = take_value(&mut iter, "-traces")?,
                "-cache" => parsed.cache_path = take_value(&mut iter, "-cache")?,
                "-asm" => parsed.asm_command = Some(take_value(&mut iter, "-asm")?),
                other => {
                    return Err(ArgError(format!("unknown argument: {other}")));
                }
            }
        }
        Ok(parsed)
    }
}

fn take_value(
    iter: &mut std::iter::Peekable<impl Iterator<Item = String>>,
    flag: &str,
) -> Result<String, ArgError> {
    iter.next()
        .ok_or_else(|| ArgError(format!("{flag} needs a value")))
}

fn parse_song_number(value: &str) -> Result<usize, ArgError> {
    let n: usize = value
        .parse()
        .map_err(|_| ArgError(format!("not a song number: {value}")))?;
    if n > 9 {
        return Err(ArgError(format!("song number out of range: {n}")));
    }
    Ok(n)
}

/// Print usage to stdout.
pub fn print_help() {
    println!("sidforge - music data compiler for the 3-voice engine");
    println!();
    println!("USAGE:");
    println!("  sidforge [OPTIONS]                 run the full pipeline");
    println!("  sidforge -equivtest [N]            rebuild the row-equivalence cache");
    println!("                                     (song N, or all songs when omitted)");
    println!("  sidforge -equivvalidate N          narrow song N's cached equivalences");
    println!();
    println!("OPTIONS:");
    println!("  -in DIR        legacy song images (default: uncompressed)");
    println!("  -out DIR       generated output (default: generated)");
    println!("  -traces DIR    captured reference traces (default: traces)");
    println!("  -cache FILE    equivalence cache (default: equiv-cache.json)");
    println!("  -asm CMD       rebuild the runtime player with this assembler");
    println!("  -h, --help     this help");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<CliArgs, ArgError> {
        CliArgs::parse(args.iter().map(|s| s.to_string()))
    }

    #[test]
    fn default_mode_is_build() {
        let args = parse(&[]).unwrap();
        assert_eq!(args.mode, Mode::Build);
        assert_eq!(args.input_dir, "uncompressed");
    }

    #[test]
    fn equivtest_song_is_optional() {
        assert_eq!(parse(&["-equivtest"]).unwrap().mode, Mode::EquivTest(None));
        assert_eq!(
            parse(&["-equivtest", "3"]).unwrap().mode,
            Mode::EquivTest(Some(3))
        );
        // 0 means all songs, same as omitting it.
        assert_eq!(parse(&["-equivtest", "0"]).unwrap().mode, Mode::EquivTest(None));
    }

    #[test]
    fn equivvalidate_requires_a_song() {
        assert!(parse(&["-equivvalidate"]).is_err());
        assert!(parse(&["-equivvalidate", "0"]).is_err());
        assert_eq!(
            parse(&["-equivvalidate", "7"]).unwrap().mode,
            Mode::EquivValidate(7)
        );
    }

    #[test]
    fn path_overrides() {
        let args = parse(&["-in", "songs", "-cache", "c.json"]).unwrap();
        assert_eq!(args.input_dir, "songs");
        assert_eq!(args.cache_path, "c.json");
    }

    #[test]
    fn unknown_arguments_are_rejected() {
        assert!(parse(&["--frobnicate"]).is_err());
        assert!(parse(&["-equivtest", "11"]).is_err());
    }
}
