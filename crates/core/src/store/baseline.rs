use std::fs;
use std::io;
use std::path::PathBuf;

use tracing::debug;

use super::json::{remove_if_exists, write_atomic};
use super::paths::StatePaths;
use crate::errors::StoreError;

const BASELINE_SUBDIR: &str = "baselines";
const BASELINE_EXT: &str = "baseline";

/// Standalone baseline snapshot files under `<state>/baselines/`.
///
/// Snapshot paths handed out by this store are relative to the state
/// directory so persisted evolutions stay valid if the project moves.
#[derive(Debug, Clone)]
pub struct BaselineStore {
    paths: StatePaths,
}

impl BaselineStore {
    pub fn new(paths: StatePaths) -> Self {
        Self { paths }
    }

    /// Relative snapshot path for a tracked file.
    ///
    /// The path is flattened to one file name by percent-escaping `%`, `/`
    /// and backslash, so two distinct tracked paths never share a snapshot.
    pub fn relative_path(file_path: &str) -> String {
        let mut flattened = String::with_capacity(file_path.len());
        for ch in file_path.trim_start_matches('/').chars() {
            match ch {
                '%' => flattened.push_str("%25"),
                '/' => flattened.push_str("%2F"),
                '\\' => flattened.push_str("%5C"),
                other => flattened.push(other),
            }
        }
        format!("{}/{}.{}", BASELINE_SUBDIR, flattened, BASELINE_EXT)
    }

    fn absolute(&self, relative: &str) -> PathBuf {
        self.paths.resolve(relative)
    }

    /// Write the baseline for `file_path` atomically and return its
    /// relative snapshot path.
    pub fn write(&self, file_path: &str, content: &str) -> Result<String, StoreError> {
        let relative = Self::relative_path(file_path);
        write_atomic(&self.absolute(&relative), content.as_bytes())?;
        debug!(file = %file_path, snapshot = %relative, "wrote baseline snapshot");
        Ok(relative)
    }

    /// Read a baseline snapshot. `Ok(None)` when it does not exist.
    pub fn read(&self, relative: &str) -> Result<Option<String>, StoreError> {
        let path = self.absolute(relative);
        match fs::read_to_string(&path) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(StoreError::Io { path, source }),
        }
    }

    /// Delete a baseline snapshot. Missing files are not an error.
    pub fn remove(&self, relative: &str) -> Result<bool, StoreError> {
        remove_if_exists(&self.absolute(relative))
    }

    /// Delete every baseline snapshot.
    pub fn clear(&self) -> Result<(), StoreError> {
        match fs::remove_dir_all(&self.paths.baselines_dir) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(StoreError::Io {
                path: self.paths.baselines_dir.clone(),
                source,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> (tempfile::TempDir, BaselineStore) {
        let tmp = tempfile::tempdir().unwrap();
        let paths = StatePaths::discover(tmp.path(), ".taskweave");
        (tmp, BaselineStore::new(paths))
    }

    #[test]
    fn test_relative_path_flattens_separators() {
        assert_eq!(
            BaselineStore::relative_path("src/app/main.ts"),
            "baselines/src%2Fapp%2Fmain.ts.baseline"
        );
        assert_eq!(BaselineStore::relative_path("README.md"), "baselines/README.md.baseline");
        assert_eq!(
            BaselineStore::relative_path("docs/100%.md"),
            "baselines/docs%2F100%25.md.baseline"
        );
    }

    #[test]
    fn test_relative_path_is_collision_free() {
        let paths = ["a/b.ts", "a__b.ts", "a%2Fb.ts", "a\\b.ts", "a_b.ts"];
        let flattened: std::collections::BTreeSet<String> =
            paths.iter().map(|p| BaselineStore::relative_path(p)).collect();
        assert_eq!(flattened.len(), paths.len());
    }

    #[test]
    fn test_similar_paths_keep_separate_baselines() {
        let (_tmp, store) = store();
        let nested = store.write("a/b.ts", "nested").unwrap();
        let flat = store.write("a__b.ts", "flat").unwrap();
        assert_ne!(nested, flat);
        assert_eq!(store.read(&nested).unwrap().as_deref(), Some("nested"));

        store.remove(&flat).unwrap();
        assert_eq!(store.read(&nested).unwrap().as_deref(), Some("nested"));
    }

    #[test]
    fn test_write_read_remove() {
        let (_tmp, store) = store();
        let rel = store.write("src/lib.rs", "pub fn a() {}\n").unwrap();
        assert_eq!(store.read(&rel).unwrap().as_deref(), Some("pub fn a() {}\n"));
        assert!(store.remove(&rel).unwrap());
        assert_eq!(store.read(&rel).unwrap(), None);
        assert!(!store.remove(&rel).unwrap());
    }

    #[test]
    fn test_clear_is_idempotent() {
        let (_tmp, store) = store();
        store.write("a.txt", "a").unwrap();
        store.clear().unwrap();
        store.clear().unwrap();
        assert_eq!(store.read("baselines/a.txt.baseline").unwrap(), None);
    }
}
