//! Atomic JSON persistence helpers shared by the stores.
//!
//! Writes go to a `.tmp` sibling first and are renamed over the final
//! path, so a crash mid-write never corrupts previously stored state.
//! Loads are corruption-tolerant: malformed files are skipped with a
//! warning and never rewritten as a side effect of loading.

use serde::de::DeserializeOwned;
use serde::Serialize;
use skein_core::error::SkeinError;
use std::path::Path;
use tracing::warn;

/// Serialize `value` and atomically replace `path`, creating parent
/// directories as needed.
pub fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<(), SkeinError> {
    let json = serde_json::to_string_pretty(value)
        .map_err(|e| SkeinError::PersistenceError(format!("serialize {}: {e}", path.display())))?;

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| {
            SkeinError::PersistenceError(format!("create dir {}: {e}", parent.display()))
        })?;
    }

    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, &json)
        .map_err(|e| SkeinError::PersistenceError(format!("write {}: {e}", tmp.display())))?;
    std::fs::rename(&tmp, path).map_err(|e| {
        SkeinError::PersistenceError(format!(
            "rename {} -> {}: {e}",
            tmp.display(),
            path.display()
        ))
    })?;
    Ok(())
}

/// Read and parse `path`. Returns `None` (with a warning) when the file
/// is absent, unreadable, or malformed.
pub fn read_json_tolerant<T: DeserializeOwned>(path: &Path) -> Option<T> {
    if !path.exists() {
        return None;
    }
    let data = match std::fs::read_to_string(path) {
        Ok(s) => s,
        Err(e) => {
            warn!(error = %e, path = %path.display(), "persist: failed to read file, skipping");
            return None;
        }
    };
    match serde_json::from_str(&data) {
        Ok(v) => Some(v),
        Err(e) => {
            warn!(error = %e, path = %path.display(), "persist: malformed JSON, skipping");
            None
        }
    }
}

/// Delete `path` if it exists; a failed delete surfaces as a
/// persistence error so callers do not silently diverge from disk.
pub fn remove_file_if_exists(path: &Path) -> Result<(), SkeinError> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(SkeinError::PersistenceError(format!(
            "remove {}: {e}",
            path.display()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::tempdir;

    #[test]
    fn test_write_then_read_roundtrip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("map.json");
        let mut map = HashMap::new();
        map.insert("a".to_string(), 1u32);
        write_json_atomic(&path, &map).unwrap();
        let back: HashMap<String, u32> = read_json_tolerant(&path).unwrap();
        assert_eq!(back, map);
        // No stray tmp file left behind.
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[test]
    fn test_read_missing_is_none() {
        let dir = tempdir().unwrap();
        let got: Option<HashMap<String, u32>> =
            read_json_tolerant(&dir.path().join("absent.json"));
        assert!(got.is_none());
    }

    #[test]
    fn test_read_malformed_is_none() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, "{ not json").unwrap();
        let got: Option<HashMap<String, u32>> = read_json_tolerant(&path);
        assert!(got.is_none());
        // The malformed file is left untouched.
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "{ not json");
    }

    #[test]
    fn test_remove_missing_is_ok() {
        let dir = tempdir().unwrap();
        remove_file_if_exists(&dir.path().join("nope.json")).unwrap();
    }
}
