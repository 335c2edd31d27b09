//! On-disk state: layout, JSON documents, baseline snapshots and the lock.
//!
//! Everything lives under `<project>/.taskweave/` (configurable). Every
//! write goes through [`json::write_atomic`].

pub mod baseline;
pub mod json;
pub mod lock;
pub mod paths;

pub use baseline::BaselineStore;
pub use json::{load_json, save_json, write_atomic};
pub use lock::StoreLock;
pub use paths::{StatePaths, DEFAULT_STATE_DIR};
