use std::fs::{self, File, OpenOptions};

use fs2::FileExt;
use tracing::debug;

use super::paths::StatePaths;
use crate::errors::StoreError;

/// Exclusive lock backed by `<state>/LOCK`, serializing mutating callers.
/// Released when dropped.
pub struct StoreLock {
    _file: File,
}

impl StoreLock {
    /// Try to acquire the lock without blocking.
    pub fn acquire(paths: &StatePaths) -> Result<Self, StoreError> {
        fs::create_dir_all(&paths.state_dir).map_err(|source| StoreError::Io {
            path: paths.state_dir.clone(),
            source,
        })?;

        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(&paths.lock_file)
            .map_err(|source| StoreError::Io {
                path: paths.lock_file.clone(),
                source,
            })?;

        file.try_lock_exclusive()
            .map_err(|_| StoreError::Locked(paths.lock_file.clone()))?;

        debug!(lock = %paths.lock_file.display(), "acquired state lock");
        Ok(Self { _file: file })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_acquire_and_drop() {
        let tmp = tempfile::tempdir().unwrap();
        let paths = StatePaths::discover(tmp.path(), ".taskweave");

        let lock = StoreLock::acquire(&paths).unwrap();
        assert!(paths.lock_file.exists());
        assert!(matches!(
            StoreLock::acquire(&paths),
            Err(StoreError::Locked(_))
        ));
        drop(lock);
        let _again = StoreLock::acquire(&paths).unwrap();
    }
}
