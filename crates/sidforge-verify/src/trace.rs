//! End-to-end register-write trace comparison.

use std::fmt;

use sidforge_model::{ForgeError, RegisterWrite, Result};

/// How many surrounding writes a divergence report carries on each side.
const CONTEXT_WRITES: usize = 4;

/// The first divergence between two traces, with surrounding writes.
#[derive(Debug, Clone)]
pub struct TraceDivergence {
    /// Index into the flat write stream.
    pub index: usize,
    /// Frame of the diverging write.
    pub frame: u32,
    /// Reference write (absent when the produced trace is longer).
    pub expected: Option<RegisterWrite>,
    /// Produced write (absent when the produced trace is shorter).
    pub actual: Option<RegisterWrite>,
    /// Writes surrounding the divergence, paired (reference, produced).
    pub context: Vec<(Option<RegisterWrite>, Option<RegisterWrite>)>,
}

impl fmt::Display for TraceDivergence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "trace diverges at write {} (frame {}):",
            self.index, self.frame
        )?;
        let fmt_write = |w: &Option<RegisterWrite>| match w {
            Some(w) => w.to_string(),
            None => "<missing>".to_string(),
        };
        writeln!(
            f,
            "  expected {}  got {}",
            fmt_write(&self.expected),
            fmt_write(&self.actual)
        )?;
        let start = self.index.saturating_sub(CONTEXT_WRITES);
        for (i, (e, a)) in self.context.iter().enumerate() {
            writeln!(f, "  [{:>6}] {}  |  {}", start + i, fmt_write(e), fmt_write(a))?;
        }
        Ok(())
    }
}

/// Find the first divergence between a produced trace and the reference.
pub fn first_divergence(
    actual: &[RegisterWrite],
    expected: &[RegisterWrite],
) -> Option<TraceDivergence> {
    let len = actual.len().max(expected.len());
    for index in 0..len {
        let a = actual.get(index).copied();
        let e = expected.get(index).copied();
        if a != e {
            let lo = index.saturating_sub(CONTEXT_WRITES);
            let hi = (index + CONTEXT_WRITES + 1).min(len);
            let context = (lo..hi)
                .map(|i| (expected.get(i).copied(), actual.get(i).copied()))
                .collect();
            let frame = e.or(a).map(|w| w.frame).unwrap_or(0);
            return Some(TraceDivergence {
                index,
                frame,
                expected: e,
                actual: a,
                context,
            });
        }
    }
    None
}

/// Compare a produced trace against the reference trace elementwise.
///
/// # Errors
///
/// `TraceMismatch` carrying the first diverging write.
pub fn compare_traces(actual: &[RegisterWrite], expected: &[RegisterWrite]) -> Result<()> {
    match first_divergence(actual, expected) {
        None => Ok(()),
        Some(d) => Err(ForgeError::TraceMismatch {
            index: d.index,
            frame: d.frame,
            expected: d.expected.unwrap_or(RegisterWrite::new(0, 0, d.frame)),
            actual: d.actual.unwrap_or(RegisterWrite::new(0, 0, d.frame)),
        }),
    }
}
