//! Filesystem boundary: song images, generated outputs, cache file.

use std::fs;
use std::path::Path;

use sidforge_model::{ForgeError, Result, Song};
use sidforge_parse::parse_song;
use sidforge_pipeline::{tables_include, wavetable_include, EquivCache};

use crate::forge::Build;

/// Load the legacy song images `d{1..9}p.raw`, stopping at the first
/// missing file. At least one song must exist.
pub fn load_songs(input_dir: &str) -> Result<Vec<Song>> {
    let mut songs = Vec::new();
    for number in 1..=9 {
        let path = Path::new(input_dir).join(format!("d{number}p.raw"));
        if !path.exists() {
            break;
        }
        let data = fs::read(&path).map_err(|e| ForgeError::Input {
            path: path.display().to_string(),
            reason: format!("cannot read image: {e}"),
        })?;
        songs.push(parse_song(&data, number - 1, &path.display().to_string())?);
    }
    if songs.is_empty() {
        return Err(ForgeError::Input {
            path: input_dir.to_string(),
            reason: "no song images (expected d1p.raw ..)".to_string(),
        });
    }
    Ok(songs)
}

/// Write the per-song blobs and the shared include files.
pub fn write_outputs(build: &Build, output_dir: &str) -> Result<()> {
    let parts = Path::new(output_dir).join("parts");
    fs::create_dir_all(&parts)?;
    for (index, song) in build.songs.iter().enumerate() {
        fs::write(parts.join(format!("part{}.bin", index + 1)), &song.blob)?;
    }
    fs::write(
        Path::new(output_dir).join("wavetable.inc"),
        wavetable_include(&build.wave_table),
    )?;
    fs::write(
        Path::new(output_dir).join("tables.inc"),
        tables_include(&build.delta_table, build.start_const, &build.transpose_table),
    )?;
    Ok(())
}

/// Load the equivalence cache; a missing file is an empty cache.
pub fn load_cache(path: &str) -> Result<EquivCache> {
    match fs::read_to_string(path) {
        Ok(text) => EquivCache::from_json(&text).map_err(|e| ForgeError::Input {
            path: path.to_string(),
            reason: format!("malformed cache: {e}"),
        }),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(EquivCache::default()),
        Err(e) => Err(ForgeError::Input {
            path: path.to_string(),
            reason: format!("cannot read cache: {e}"),
        }),
    }
}

/// Write the cache atomically: a temp file in the same directory, then a
/// rename over the target.
pub fn save_cache(cache: &EquivCache, path: &str) -> Result<()> {
    let text = cache
        .to_json()
        .map_err(|e| ForgeError::Other(format!("cannot serialize cache: {e}")))?;
    let target = Path::new(path);
    let dir = target.parent().filter(|p| !p.as_os_str().is_empty());
    let mut file = tempfile::NamedTempFile::new_in(dir.unwrap_or(Path::new(".")))?;
    use std::io::Write;
    file.write_all(text.as_bytes())?;
    file.persist(target)
        .map_err(|e| ForgeError::Other(format!("cannot persist cache: {e}")))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_round_trip_and_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.json");
        let path = path.to_str().unwrap();

        assert!(load_cache(path).unwrap().songs.is_empty());

        let mut cache = EquivCache::default();
        cache.song_mut(1).exclusions.push(3);
        save_cache(&cache, path).unwrap();
        let back = load_cache(path).unwrap();
        assert_eq!(back.songs[1].exclusions, vec![3]);
    }

    #[test]
    fn malformed_cache_is_an_input_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.json");
        fs::write(&path, "{").unwrap();
        assert!(load_cache(path.to_str().unwrap()).is_err());
    }
}
