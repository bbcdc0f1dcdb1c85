//! Deterministic zip archive of a bundle directory.

use crate::error::PublishError;
use std::fs;
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use zip::write::FileOptions;
use zip::{CompressionMethod, DateTime, ZipWriter};

/// Regular, non-hidden files directly under `dir`, sorted by name.
pub fn archive_entries(dir: &Path) -> Result<Vec<(String, PathBuf)>, PublishError> {
    let io_err = |source| PublishError::Io {
        path: dir.to_path_buf(),
        source,
    };

    let mut entries = Vec::new();
    for entry in fs::read_dir(dir).map_err(io_err)? {
        let entry = entry.map_err(io_err)?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.starts_with('.') || !entry.file_type().map_err(io_err)?.is_file() {
            continue;
        }
        entries.push((name, entry.path()));
    }
    entries.sort();
    Ok(entries)
}

/// Zip every entry with deflate, relative names and a fixed timestamp, so
/// identical directory contents give identical archive bytes.
pub fn build_archive(dir: &Path) -> Result<(Vec<u8>, usize), PublishError> {
    let entries = archive_entries(dir)?;
    let options = FileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .last_modified_time(DateTime::default())
        .unix_permissions(0o644);

    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    for (name, path) in &entries {
        let bytes = fs::read(path).map_err(|source| PublishError::Io {
            path: path.clone(),
            source,
        })?;
        writer.start_file(name.as_str(), options)?;
        writer.write_all(&bytes).map_err(|source| PublishError::Io {
            path: path.clone(),
            source,
        })?;
    }
    let cursor = writer.finish()?;
    Ok((cursor.into_inner(), entries.len()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use tempfile::TempDir;

    fn populate(dir: &Path) {
        fs::write(dir.join("report.txt"), "report body").unwrap();
        fs::write(dir.join("audio_record.wav"), vec![7u8; 512]).unwrap();
        fs::write(dir.join(".report.txt.partial"), "staging").unwrap();
        fs::create_dir(dir.join("nested")).unwrap();
    }

    #[test]
    fn test_entries_sorted_and_filtered() {
        let dir = TempDir::new().unwrap();
        populate(dir.path());
        let names: Vec<_> = archive_entries(dir.path())
            .unwrap()
            .into_iter()
            .map(|(name, _)| name)
            .collect();
        assert_eq!(names, vec!["audio_record.wav", "report.txt"]);
    }

    #[test]
    fn test_archive_is_reproducible() {
        let first = TempDir::new().unwrap();
        let second = TempDir::new().unwrap();
        populate(first.path());
        populate(second.path());

        let (a, count) = build_archive(first.path()).unwrap();
        let (b, _) = build_archive(second.path()).unwrap();
        assert_eq!(count, 2);
        assert_eq!(a, b);

        let mut archive = zip::ZipArchive::new(Cursor::new(a)).unwrap();
        let mut body = String::new();
        archive
            .by_name("report.txt")
            .unwrap()
            .read_to_string(&mut body)
            .unwrap();
        assert_eq!(body, "report body");
    }
}
