//! Small JSON files on disk: tolerant reads, atomic writes.

use std::fs;
use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tempfile::NamedTempFile;
use tracing::warn;

/// `None` when the file is missing. A corrupt file is logged and also `None`.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Option<T> {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
        Err(e) => {
            warn!("Could not read {}: {e}", path.display());
            return None;
        }
    };
    match serde_json::from_str(&raw) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!("Ignoring corrupt JSON in {}: {e}", path.display());
            None
        }
    }
}

/// Writes to a sibling temp file, then renames over `path`, so readers never
/// observe a half-written file.
pub fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;

    let mut tmp = NamedTempFile::new_in(dir)
        .with_context(|| format!("creating temp file in {}", dir.display()))?;
    serde_json::to_writer_pretty(&mut tmp, value).context("serializing JSON")?;
    tmp.flush()?;
    tmp.persist(path)
        .with_context(|| format!("replacing {}", path.display()))?;
    Ok(())
}

/// Deletes `path` if present.
pub fn remove(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e).with_context(|| format!("removing {}", path.display())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn test_write_then_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("data.json");
        let mut map = BTreeMap::new();
        map.insert("a".to_string(), 1);

        write_json(&path, &map).unwrap();
        let read: BTreeMap<String, i32> = read_json(&path).unwrap();
        assert_eq!(read, map);
    }

    #[test]
    fn test_missing_and_corrupt_read_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.json");
        assert!(read_json::<Vec<i32>>(&path).is_none());

        fs::write(&path, "{not json").unwrap();
        assert!(read_json::<Vec<i32>>(&path).is_none());
    }

    #[test]
    fn test_remove_missing_is_ok() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gone.json");
        remove(&path).unwrap();
        fs::write(&path, "[]").unwrap();
        remove(&path).unwrap();
        assert!(!path.exists());
    }
}
