use std::fs;
use std::path::{Path, PathBuf};

use crate::errors::StoreError;

/// Default name of the state directory under the project root.
pub const DEFAULT_STATE_DIR: &str = ".taskweave";

/// Every on-disk location taskweave uses for one project.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatePaths {
    pub root: PathBuf,
    pub state_dir: PathBuf,
    pub config_toml: PathBuf,
    pub evolutions_json: PathBuf,
    pub timelines_json: PathBuf,
    pub baselines_dir: PathBuf,
    pub lock_file: PathBuf,
}

impl StatePaths {
    /// Derive all paths from a project root. Pure computation, no I/O.
    pub fn discover(project_dir: impl Into<PathBuf>, state_dir_name: &str) -> Self {
        let root = project_dir.into();
        let state_dir = root.join(state_dir_name);
        Self {
            config_toml: state_dir.join("config.toml"),
            evolutions_json: state_dir.join("evolutions.json"),
            timelines_json: state_dir.join("timelines.json"),
            baselines_dir: state_dir.join("baselines"),
            lock_file: state_dir.join("LOCK"),
            state_dir,
            root,
        }
    }

    /// Create the state and baseline directories if missing.
    pub fn ensure_layout(&self) -> Result<(), StoreError> {
        for dir in [&self.state_dir, &self.baselines_dir] {
            fs::create_dir_all(dir).map_err(|source| StoreError::Io {
                path: dir.clone(),
                source,
            })?;
        }
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.state_dir.is_dir()
    }

    /// Resolve a path stored relative to the state directory.
    pub fn resolve(&self, relative: &str) -> PathBuf {
        let rel = Path::new(relative);
        if rel.is_absolute() {
            rel.to_path_buf()
        } else {
            self.state_dir.join(rel)
        }
    }
}
