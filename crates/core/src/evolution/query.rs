//! Read-only queries over an [`EvolutionMap`], plus the value-semantics
//! cleanup used when a task is discarded.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::errors::StoreError;
use crate::store::BaselineStore;
use crate::types::{FileEvolution, TaskSnapshot};

/// Per-file evolutions keyed by file path.
pub type EvolutionMap = BTreeMap<String, FileEvolution>;

/// Aggregate counters for dashboards.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct EvolutionSummary {
    pub total_files_tracked: usize,
    pub total_tasks: usize,
    pub files_with_potential_conflicts: usize,
    pub active_tasks: usize,
}

/// Everything a downstream merge step needs for one file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MergeExport {
    pub file_path: String,
    pub baseline_commit: String,
    pub baseline_captured_at: DateTime<Utc>,
    pub baseline_content_hash: String,
    pub baseline_snapshot_path: String,
    /// `None` when the baseline snapshot could not be read.
    pub baseline_content: Option<String>,
    pub tasks: Vec<TaskSnapshot>,
}

impl FileEvolution {
    /// Rebuild an evolution from an export.
    pub fn from_export(export: &MergeExport) -> Self {
        Self {
            file_path: export.file_path.clone(),
            baseline_commit: export.baseline_commit.clone(),
            baseline_captured_at: export.baseline_captured_at,
            baseline_content_hash: export.baseline_content_hash.clone(),
            baseline_snapshot_path: export.baseline_snapshot_path.clone(),
            task_snapshots: export.tasks.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Queries
// ---------------------------------------------------------------------------

pub fn get_file_evolution<'a>(path: &str, evolutions: &'a EvolutionMap) -> Option<&'a FileEvolution> {
    evolutions.get(path)
}

/// Read the baseline snapshot for `path`. `Ok(None)` when the file is not
/// tracked or its snapshot is missing.
pub fn get_baseline_content(
    path: &str,
    evolutions: &EvolutionMap,
    baselines: &BaselineStore,
) -> Result<Option<String>, StoreError> {
    match evolutions.get(path) {
        Some(evolution) => baselines.read(&evolution.baseline_snapshot_path),
        None => Ok(None),
    }
}

/// Files the task actually changed, with its snapshot on each.
pub fn get_task_modifications(task_id: &str, evolutions: &EvolutionMap) -> Vec<(String, TaskSnapshot)> {
    evolutions
        .iter()
        .filter_map(|(path, evolution)| {
            evolution
                .snapshot(task_id)
                .filter(|s| s.has_modifications())
                .map(|s| (path.clone(), s.clone()))
        })
        .collect()
}

/// Modifying snapshots of the given tasks, grouped by file.
pub fn get_files_modified_by_tasks(
    task_ids: &[String],
    evolutions: &EvolutionMap,
) -> BTreeMap<String, Vec<TaskSnapshot>> {
    let wanted: BTreeSet<&str> = task_ids.iter().map(String::as_str).collect();
    let mut out = BTreeMap::new();
    for (path, evolution) in evolutions {
        let snapshots: Vec<TaskSnapshot> = evolution
            .modifying_snapshots()
            .filter(|s| wanted.contains(s.task_id.as_str()))
            .cloned()
            .collect();
        if !snapshots.is_empty() {
            out.insert(path.clone(), snapshots);
        }
    }
    out
}

/// Files modified by at least two distinct tasks from `task_ids`.
pub fn get_conflicting_files(task_ids: &[String], evolutions: &EvolutionMap) -> Vec<String> {
    let wanted: BTreeSet<&str> = task_ids.iter().map(String::as_str).collect();
    evolutions
        .iter()
        .filter(|(_, evolution)| {
            let modifiers: BTreeSet<&str> = evolution
                .modifying_snapshots()
                .map(|s| s.task_id.as_str())
                .filter(|id| wanted.contains(id))
                .collect();
            modifiers.len() >= 2
        })
        .map(|(path, _)| path.clone())
        .collect()
}

/// Tasks with at least one snapshot that is not yet completed.
pub fn get_active_tasks(evolutions: &EvolutionMap) -> BTreeSet<String> {
    evolutions
        .values()
        .flat_map(|e| e.task_snapshots.iter())
        .filter(|s| s.is_active())
        .map(|s| s.task_id.clone())
        .collect()
}

pub fn get_evolution_summary(evolutions: &EvolutionMap) -> EvolutionSummary {
    let all_tasks: BTreeSet<&str> = evolutions
        .values()
        .flat_map(|e| e.task_snapshots.iter())
        .map(|s| s.task_id.as_str())
        .collect();
    let potential_conflicts = evolutions
        .values()
        .filter(|e| e.modifying_snapshots().count() >= 2)
        .count();

    EvolutionSummary {
        total_files_tracked: evolutions.len(),
        total_tasks: all_tasks.len(),
        files_with_potential_conflicts: potential_conflicts,
        active_tasks: get_active_tasks(evolutions).len(),
    }
}

/// Assemble the merge payload for `path`. An unreadable baseline yields
/// `baseline_content: None` rather than an error.
pub fn export_for_merge(
    path: &str,
    evolutions: &EvolutionMap,
    baselines: &BaselineStore,
) -> Option<MergeExport> {
    let evolution = evolutions.get(path)?;
    let baseline_content = match baselines.read(&evolution.baseline_snapshot_path) {
        Ok(Some(content)) => Some(content),
        Ok(None) => {
            warn!(file = %path, snapshot = %evolution.baseline_snapshot_path, "baseline snapshot missing");
            None
        }
        Err(e) => {
            warn!(file = %path, error = %e, "failed to read baseline snapshot");
            None
        }
    };

    Some(MergeExport {
        file_path: evolution.file_path.clone(),
        baseline_commit: evolution.baseline_commit.clone(),
        baseline_captured_at: evolution.baseline_captured_at,
        baseline_content_hash: evolution.baseline_content_hash.clone(),
        baseline_snapshot_path: evolution.baseline_snapshot_path.clone(),
        baseline_content,
        tasks: evolution.task_snapshots.clone(),
    })
}

// ---------------------------------------------------------------------------
// Cleanup
// ---------------------------------------------------------------------------

/// Remove every snapshot of `task_id` and return the updated map.
///
/// Evolutions left with no snapshots are dropped; with `remove_baselines`
/// their snapshot files are deleted as well. Running it again on the result
/// is a no-op.
pub fn cleanup_task(
    task_id: &str,
    evolutions: EvolutionMap,
    remove_baselines: bool,
    baselines: &BaselineStore,
) -> EvolutionMap {
    let mut out = EvolutionMap::new();
    let mut removed = 0usize;

    for (path, mut evolution) in evolutions {
        if evolution.remove_snapshot(task_id) {
            removed += 1;
            if evolution.task_snapshots.is_empty() {
                if remove_baselines {
                    if let Err(e) = baselines.remove(&evolution.baseline_snapshot_path) {
                        warn!(file = %path, error = %e, "failed to remove baseline snapshot");
                    }
                }
                debug!(file = %path, task = %task_id, "dropped empty evolution");
                continue;
            }
        }
        out.insert(path, evolution);
    }

    debug!(task = %task_id, snapshots_removed = removed, "cleaned up task");
    out
}
