//! taskweave core library.
//!
//! Coordinates code changes produced by concurrently running tasks, each in
//! its own git worktree, against a single advancing main line: per-file
//! evolution tracking, a compatibility rule engine, conflict detection and
//! explanation, main-line timelines, and the git interop they rely on.

pub mod config;
pub mod conflict;
pub mod coordinator;
pub mod errors;
pub mod evolution;
pub mod git;
pub mod hash;
pub mod rules;
pub mod store;
pub mod timeline;
pub mod types;

// Re-exports for convenience.
pub use config::CoordinatorConfig;
pub use coordinator::MergeCoordinator;
pub use errors::{ConfigError, CoreError, GitError, StoreError, TrackingError};
pub use evolution::{EvolutionTracker, Modification};
pub use git::{GitCli, GitInterop, MainLineHistory};
pub use timeline::TimelineTracker;
pub use types::{
    ChangeType, CompatibilityRule, ConflictRegion, ConflictSeverity, FileEvolution, MergeStrategy,
    SemanticChange, TaskSnapshot,
};
