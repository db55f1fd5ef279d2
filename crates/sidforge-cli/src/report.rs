//! Per-song build statistics and the summary table.

/// Legacy image size each song started from.
const LEGACY_IMAGE_BYTES: usize = 16 * 1024;

/// What one song's build produced.
#[derive(Debug, Clone)]
pub struct SongReport {
    /// Song number (1-based).
    pub song: usize,
    /// Orders in the flattened playback sequence.
    pub orders: usize,
    /// Canonical patterns after dedup.
    pub patterns: usize,
    /// Patterns aliased away by the transpose dedup.
    pub aliased: usize,
    /// Dictionary entries (including the implicit zero entry).
    pub dict_entries: usize,
    /// Packed pattern bytes before overlay.
    pub packed_bytes: usize,
    /// Final blob bytes.
    pub blob_bytes: usize,
}

impl SongReport {
    /// Percentage of the legacy image the blob still occupies.
    pub fn ratio(&self) -> f64 {
        self.blob_bytes as f64 * 100.0 / LEGACY_IMAGE_BYTES as f64
    }
}

/// Print the summary table for a finished build.
pub fn print_summary(reports: &[SongReport], shared_table_bytes: usize, wavetable_bytes: usize) {
    println!();
    println!("song  orders  patterns  aliased  dict  packed  blob   of legacy");
    println!("----  ------  --------  -------  ----  ------  -----  ---------");
    for r in reports {
        println!(
            "{:>4}  {:>6}  {:>8}  {:>7}  {:>4}  {:>6}  {:>5}  {:>8.1}%",
            r.song, r.orders, r.patterns, r.aliased, r.dict_entries, r.packed_bytes, r.blob_bytes,
            r.ratio()
        );
    }
    let total: usize = reports.iter().map(|r| r.blob_bytes).sum();
    println!(
        "total {total} bytes, shared tables {shared_table_bytes} bytes, wavetable {wavetable_bytes} bytes"
    );
}
