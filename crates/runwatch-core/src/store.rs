//! Run-reference store: remembers the most recently triggered run.
//!
//! One pending reference per project checkout. Every trigger overwrites it;
//! monitor and collect-logs read it when no run id is given. There is no
//! locking, so two processes triggering at once race (last writer wins).

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::debug;

use crate::error::{Result, RunwatchError};

/// Single-value store for the pending run id.
pub trait RunRefStore: Send + Sync {
    /// The stored run id, or `None` if nothing has been stored.
    fn get(&self) -> Result<Option<u64>>;

    /// Replace the stored run id.
    fn set(&self, run_id: u64) -> Result<()>;
}

/// Pick the explicit run id if given, else the stored one.
///
/// Fails with [`RunwatchError::MissingRunId`] when neither exists.
pub fn resolve_run_id(explicit: Option<u64>, store: &dyn RunRefStore) -> Result<u64> {
    if let Some(id) = explicit {
        return Ok(id);
    }
    store.get()?.ok_or(RunwatchError::MissingRunId)
}

/// Plain-text file holding one integer.
pub struct FileRunRefStore {
    path: PathBuf,
}

impl FileRunRefStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl RunRefStore for FileRunRefStore {
    fn get(&self) -> Result<Option<u64>> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(RunwatchError::InvalidRunReference {
                    path: self.path.clone(),
                    detail: e.to_string(),
                })
            }
        };

        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Ok(None);
        }
        trimmed
            .parse::<u64>()
            .map(Some)
            .map_err(|e| RunwatchError::InvalidRunReference {
                path: self.path.clone(),
                detail: format!("{trimmed:?}: {e}"),
            })
    }

    fn set(&self, run_id: u64) -> Result<()> {
        let dir = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir)?;

        // Write to a temp file in the same directory, then rename over the target.
        let mut tmp = NamedTempFile::new_in(&dir)?;
        tmp.write_all(run_id.to_string().as_bytes())?;
        tmp.persist(&self.path).map_err(|e| e.error)?;

        debug!(path = %self.path.display(), run_id, "stored run reference");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::MemoryRunRefStore;

    fn make_store() -> (tempfile::TempDir, FileRunRefStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = FileRunRefStore::new(dir.path().join(".github_run_id.txt"));
        (dir, store)
    }

    #[test]
    fn missing_file_is_empty() {
        let (_dir, store) = make_store();
        assert_eq!(store.get().unwrap(), None);
    }

    #[test]
    fn set_then_get_returns_same_id() {
        let (_dir, store) = make_store();
        store.set(9_876_543_210).unwrap();
        assert_eq!(store.get().unwrap(), Some(9_876_543_210));
    }

    #[test]
    fn set_overwrites_previous_value() {
        let (_dir, store) = make_store();
        store.set(1).unwrap();
        store.set(2).unwrap();
        assert_eq!(store.get().unwrap(), Some(2));
        assert_eq!(std::fs::read_to_string(store.path()).unwrap(), "2");
    }

    #[test]
    fn tolerates_trailing_newline() {
        let (_dir, store) = make_store();
        std::fs::write(store.path(), "42\n").unwrap();
        assert_eq!(store.get().unwrap(), Some(42));
    }

    #[test]
    fn garbage_is_invalid_reference() {
        let (_dir, store) = make_store();
        std::fs::write(store.path(), "not-a-number").unwrap();
        let err = store.get().unwrap_err();
        assert!(matches!(err, RunwatchError::InvalidRunReference { .. }));
    }

    #[test]
    fn set_creates_parent_directory() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileRunRefStore::new(dir.path().join("state").join("run_id"));
        store.set(7).unwrap();
        assert_eq!(store.get().unwrap(), Some(7));
    }

    #[test]
    fn resolve_prefers_explicit_id() {
        let store = MemoryRunRefStore::with_run_id(1);
        assert_eq!(resolve_run_id(Some(5), &store).unwrap(), 5);
        assert_eq!(resolve_run_id(None, &store).unwrap(), 1);
    }

    #[test]
    fn resolve_without_any_id_fails() {
        let store = MemoryRunRefStore::new();
        let err = resolve_run_id(None, &store).unwrap_err();
        assert!(matches!(err, RunwatchError::MissingRunId));
    }
}
