//! Whole-file JSON persistence
//!
//! Reads are corruption tolerant: a file that is missing, unreadable or not
//! valid JSON for the expected shape is reported and replaced by the type's
//! default (an empty set), never propagated as a failure.
//!
//! Writes rewrite the entire file. There is no append log and no guard
//! against a torn write if the process dies mid-write.

use crate::Result;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::Path;
use tracing::{debug, warn};

/// Load a JSON document, falling back to `T::default()` on any problem
pub fn load_json_or_default<T>(path: &Path) -> T
where
    T: DeserializeOwned + Default,
{
    match load_json(path) {
        Ok(Some(value)) => value,
        Ok(None) => {
            debug!(path = %path.display(), "No file on disk, starting empty");
            T::default()
        }
        Err(e) => {
            warn!(
                path = %path.display(),
                error = %e,
                "Malformed persisted state, treating as empty"
            );
            T::default()
        }
    }
}

/// Load a JSON document; `Ok(None)` when the file does not exist
pub fn load_json<T>(path: &Path) -> Result<Option<T>>
where
    T: DeserializeOwned,
{
    if !path.exists() {
        return Ok(None);
    }
    let content = std::fs::read_to_string(path)?;
    let value = serde_json::from_str(&content)?;
    Ok(Some(value))
}

/// Serialize `value` as pretty JSON and rewrite `path`, creating parent directories
pub fn save_json<T>(path: &Path, value: &T) -> Result<()>
where
    T: Serialize + ?Sized,
{
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut content = serde_json::to_string_pretty(value)?;
    content.push('\n');
    std::fs::write(path, content)?;
    Ok(())
}

/// Rewrite `path` only when the serialized content differs from what is on disk
///
/// Returns `true` when the file was written.
pub fn save_json_if_changed<T>(path: &Path, value: &T) -> Result<bool>
where
    T: Serialize + ?Sized,
{
    let mut content = serde_json::to_string_pretty(value)?;
    content.push('\n');
    if let Ok(existing) = std::fs::read_to_string(path) {
        if existing == content {
            return Ok(false);
        }
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, content)?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::FactFile;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_is_default() {
        let dir = TempDir::new().unwrap();
        let file: FactFile = load_json_or_default(&dir.path().join("nope.json"));
        assert!(file.dubbed.is_empty());
    }

    #[test]
    fn test_corrupt_file_is_default() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("broken.json");
        std::fs::write(&path, "{ \"dubbed\": [1, 2,").unwrap();
        let file: FactFile = load_json_or_default(&path);
        assert!(file.dubbed.is_empty());
        assert!(load_json::<FactFile>(&path).is_err());
    }

    #[test]
    fn test_save_creates_parents_and_round_trips() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a/b/c.json");
        save_json(&path, &vec![1, 2, 3]).unwrap();
        let loaded: Option<Vec<i64>> = load_json(&path).unwrap();
        assert_eq!(loaded, Some(vec![1, 2, 3]));
        assert!(std::fs::read_to_string(&path).unwrap().ends_with('\n'));
    }

    #[test]
    fn test_save_if_changed_skips_identical_content() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("x.json");
        assert!(save_json_if_changed(&path, &vec![1]).unwrap());
        assert!(!save_json_if_changed(&path, &vec![1]).unwrap());
        assert!(save_json_if_changed(&path, &vec![1, 2]).unwrap());
    }
}
