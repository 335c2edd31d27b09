//! Per-file evolution tracking.
//!
//! Each tracked file keeps its baseline (content at the first task's branch
//! point, stored as a standalone snapshot) and one [`TaskSnapshot`] per task
//! that touched it. "Potential conflict" here is purely syntactic: a file
//! modified by two or more tasks, judged by content-hash divergence. Semantic
//! classification only happens once a candidate reaches [`crate::conflict`].
//!
//! [`TaskSnapshot`]: crate::types::TaskSnapshot

pub mod query;
pub mod tracker;

pub use query::{
    cleanup_task, export_for_merge, get_active_tasks, get_baseline_content,
    get_conflicting_files, get_evolution_summary, get_file_evolution,
    get_files_modified_by_tasks, get_task_modifications, EvolutionMap, EvolutionSummary,
    MergeExport,
};
pub use tracker::{EvolutionTracker, Modification};
