//! External collaborators behind trait seams.
//!
//! The build needs two things it cannot produce itself: the reference
//! register-write trace of the legacy engine (captured from a CPU
//! emulator) and a rebuilt runtime player binary (an assembler/linker
//! run). Both stay behind traits; the shipped implementations read
//! captured trace files and shell out to a configured toolchain command.

use std::path::{Path, PathBuf};
use std::process::Command;

use sidforge_model::{ForgeError, RegisterWrite, Result};

/// Source of reference register-write traces.
pub trait ReferenceTracer: Sync {
    /// The reference trace for one song over the given frame count.
    fn reference_trace(&self, song: usize, frames: u32) -> Result<Vec<RegisterWrite>>;
}

/// Reads traces captured from the external CPU emulator.
///
/// One file per song, `part{N}.trace`: little-endian records of
/// `(addr: u16, value: u8, frame: u32)`, 7 bytes each, in write order.
pub struct TraceFileTracer {
    dir: PathBuf,
}

impl TraceFileTracer {
    /// Tracer over a capture directory.
    pub fn new(dir: impl Into<PathBuf>) -> TraceFileTracer {
        TraceFileTracer { dir: dir.into() }
    }

    /// Serialize a trace into the capture format (used by tooling that
    /// produces the files this tracer reads).
    pub fn encode(trace: &[RegisterWrite]) -> Vec<u8> {
        let mut out = Vec::with_capacity(trace.len() * 7);
        for w in trace {
            out.extend_from_slice(&w.addr.to_le_bytes());
            out.push(w.value);
            out.extend_from_slice(&w.frame.to_le_bytes());
        }
        out
    }

    /// Parse the capture format.
    pub fn decode(bytes: &[u8], path: &Path) -> Result<Vec<RegisterWrite>> {
        if bytes.len() % 7 != 0 {
            return Err(ForgeError::Input {
                path: path.display().to_string(),
                reason: format!("trace length {} is not a record multiple", bytes.len()),
            });
        }
        Ok(bytes
            .chunks_exact(7)
            .map(|r| RegisterWrite {
                addr: u16::from_le_bytes([r[0], r[1]]),
                value: r[2],
                frame: u32::from_le_bytes([r[3], r[4], r[5], r[6]]),
            })
            .collect())
    }
}

impl ReferenceTracer for TraceFileTracer {
    fn reference_trace(&self, song: usize, frames: u32) -> Result<Vec<RegisterWrite>> {
        let path = self.dir.join(format!("part{}.trace", song + 1));
        let bytes = std::fs::read(&path).map_err(|e| ForgeError::Input {
            path: path.display().to_string(),
            reason: format!("cannot read reference trace: {e}"),
        })?;
        let mut trace = Self::decode(&bytes, &path)?;
        let limit = frames;
        trace.retain(|w| w.frame < limit);
        Ok(trace)
    }
}

/// Rebuilds the runtime player after the shared tables are written.
pub trait PlayerToolchain {
    /// Assemble and link the player against the freshly generated
    /// includes.
    fn rebuild_player(&self, output_dir: &Path) -> Result<()>;
}

/// Shells out to a configured assembler command.
///
/// The command runs with the output directory as working directory, so
/// `wavetable.inc` and `tables.inc` resolve as plain includes.
pub struct ShellToolchain {
    command: String,
    args: Vec<String>,
}

impl ShellToolchain {
    /// Toolchain from a command line.
    pub fn new(command: impl Into<String>, args: Vec<String>) -> ShellToolchain {
        ShellToolchain {
            command: command.into(),
            args,
        }
    }
}

impl PlayerToolchain for ShellToolchain {
    fn rebuild_player(&self, output_dir: &Path) -> Result<()> {
        let status = Command::new(&self.command)
            .args(&self.args)
            .current_dir(output_dir)
            .status()
            .map_err(|e| ForgeError::Input {
                path: self.command.clone(),
                reason: format!("cannot run toolchain: {e}"),
            })?;
        if !status.success() {
            return Err(ForgeError::Other(format!(
                "toolchain {} exited with {status}",
                self.command
            )));
        }
        Ok(())
    }
}

/// No toolchain configured: the includes are left on disk for a manual
/// assembler run.
pub struct NoToolchain;

impl PlayerToolchain for NoToolchain {
    fn rebuild_player(&self, _output_dir: &Path) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trace_format_round_trips() {
        let trace = vec![
            RegisterWrite::new(0xD400, 0x12, 0),
            RegisterWrite::new(0xD418, 0x0F, 3),
        ];
        let bytes = TraceFileTracer::encode(&trace);
        assert_eq!(bytes.len(), 14);
        let back = TraceFileTracer::decode(&bytes, Path::new("t")).unwrap();
        assert_eq!(back, trace);
    }

    #[test]
    fn truncated_trace_is_rejected() {
        let err = TraceFileTracer::decode(&[1, 2, 3], Path::new("t"));
        assert!(err.is_err());
    }

    #[test]
    fn tracer_limits_to_requested_frames() {
        let dir = tempfile::tempdir().unwrap();
        let trace = vec![
            RegisterWrite::new(0xD400, 1, 0),
            RegisterWrite::new(0xD400, 2, 1),
            RegisterWrite::new(0xD400, 3, 2),
        ];
        std::fs::write(dir.path().join("part3.trace"), TraceFileTracer::encode(&trace)).unwrap();
        let tracer = TraceFileTracer::new(dir.path());
        let got = tracer.reference_trace(2, 2).unwrap();
        assert_eq!(got.len(), 2);
    }
}
