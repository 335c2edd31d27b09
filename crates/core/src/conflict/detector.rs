//! Conflict region detection.
//!
//! Given every task's classified changes for one file, the detector groups
//! them by location and runs each cross-task pair of change types through
//! the rule engine. A location touched by a single task is never a region.

use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, info};

use crate::rules::{analyze_compatibility, RuleIndex};
use crate::types::{
    ChangeType, ConflictRegion, ConflictSeverity, MergeStrategy, SemanticChange, TaskSnapshot,
};

/// Build the detector input from task snapshots.
///
/// Only snapshots that actually modified the file are included. A modifying
/// snapshot with no classified changes maps to an empty list, which the
/// detector treats as an `unknown` change over the whole file, overlapping
/// every location other tasks touched.
pub fn changes_by_task(snapshots: &[TaskSnapshot]) -> BTreeMap<String, Vec<SemanticChange>> {
    snapshots
        .iter()
        .filter(|s| s.has_modifications())
        .map(|s| (s.task_id.clone(), s.semantic_changes.clone()))
        .collect()
}

/// Find the conflict regions in `file_path`.
///
/// Regions are returned in location order; within a region tasks are sorted
/// and change types deduplicated.
pub fn detect_regions(
    file_path: &str,
    changes_by_task: &BTreeMap<String, Vec<SemanticChange>>,
    index: &RuleIndex,
) -> Vec<ConflictRegion> {
    // location -> task -> changes
    let mut by_location: BTreeMap<String, BTreeMap<&str, Vec<SemanticChange>>> = BTreeMap::new();
    let mut unclassified: Vec<&str> = Vec::new();

    for (task_id, changes) in changes_by_task {
        if changes.is_empty() {
            unclassified.push(task_id.as_str());
            continue;
        }
        for change in changes {
            by_location
                .entry(change.location.clone())
                .or_default()
                .entry(task_id.as_str())
                .or_default()
                .push(change.clone());
        }
    }

    // An unclassified edit may overlap anything in the file: it joins the
    // whole-file location and every location another task touched, so the
    // gap policy applies wherever it meets other work.
    if !unclassified.is_empty() {
        by_location.entry(file_path.to_string()).or_default();
        for tasks in by_location.values_mut() {
            for task_id in &unclassified {
                tasks.entry(*task_id).or_default().push(SemanticChange::new(
                    ChangeType::Unknown,
                    file_path,
                    file_path,
                    0,
                    u32::MAX,
                ));
            }
        }
    }

    let mut regions = Vec::new();
    for (location, tasks) in by_location {
        if tasks.len() < 2 {
            continue;
        }
        let region = build_region(file_path, &location, &tasks, index);
        debug!(
            file = %file_path,
            location = %region.location,
            severity = %region.severity,
            can_auto_merge = region.can_auto_merge,
            "conflict region"
        );
        regions.push(region);
    }

    info!(file = %file_path, regions = regions.len(), "detected conflict regions");
    regions
}

fn build_region(
    file_path: &str,
    location: &str,
    tasks: &BTreeMap<&str, Vec<SemanticChange>>,
    index: &RuleIndex,
) -> ConflictRegion {
    let task_list: Vec<(&str, &Vec<SemanticChange>)> =
        tasks.iter().map(|(id, changes)| (*id, changes)).collect();

    let mut first_compatible: Option<(Option<MergeStrategy>, String)> = None;
    let mut first_incompatible: Option<(Option<MergeStrategy>, String)> = None;
    let mut needs_human = false;

    for (i, (_, left)) in task_list.iter().enumerate() {
        for (_, right) in task_list.iter().skip(i + 1) {
            for a in left.iter() {
                for b in right.iter() {
                    let result = analyze_compatibility(index, a.change_type, b.change_type);
                    if result.compatible {
                        if first_compatible.is_none() {
                            first_compatible = Some((result.strategy, result.reason));
                        }
                    } else {
                        if result.strategy == Some(MergeStrategy::HumanRequired) {
                            needs_human = true;
                        }
                        if first_incompatible.is_none() {
                            first_incompatible = Some((result.strategy, result.reason));
                        }
                    }
                }
            }
        }
    }

    let all_changes: Vec<SemanticChange> = tasks.values().flatten().cloned().collect();
    let change_types: Vec<ChangeType> = all_changes
        .iter()
        .map(|c| c.change_type)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();

    let (can_auto_merge, merge_strategy, reason) = match (first_incompatible, first_compatible) {
        (Some((strategy, reason)), _) => {
            let strategy = if needs_human {
                Some(MergeStrategy::HumanRequired)
            } else {
                strategy
            };
            (false, strategy, reason)
        }
        (None, Some((strategy, reason))) => (true, strategy, reason),
        // Unreachable with two tasks that each hold at least one change.
        (None, None) => (
            false,
            Some(MergeStrategy::AiRequired),
            "no change pairs to compare".to_string(),
        ),
    };

    let severity = assess_severity(&change_types, &all_changes, can_auto_merge);

    ConflictRegion {
        file_path: file_path.to_string(),
        location: location.to_string(),
        tasks_involved: task_list.iter().map(|(id, _)| id.to_string()).collect(),
        change_types,
        severity,
        can_auto_merge,
        merge_strategy,
        reason,
    }
}

/// Grade a region.
///
/// Compatible regions are `none`. Otherwise two or more modifications with
/// overlapping line ranges are `critical` (non-overlapping ones `high`), any
/// removal or structural change is `high`, a single modification is
/// `medium`, and anything else is `low`.
pub fn assess_severity(
    change_types: &[ChangeType],
    changes: &[SemanticChange],
    compatible: bool,
) -> ConflictSeverity {
    if compatible {
        return ConflictSeverity::None;
    }

    let modifications: Vec<&SemanticChange> = changes
        .iter()
        .filter(|c| c.change_type.is_modification())
        .collect();
    if modifications.len() >= 2 {
        let overlapping = modifications.iter().enumerate().any(|(i, a)| {
            modifications
                .iter()
                .skip(i + 1)
                .any(|b| a.overlaps(b))
        });
        return if overlapping {
            ConflictSeverity::Critical
        } else {
            ConflictSeverity::High
        };
    }

    if change_types
        .iter()
        .any(|ct| ct.is_removal() || ct.is_structural())
    {
        return ConflictSeverity::High;
    }

    if change_types.iter().any(|ct| ct.is_modification()) {
        return ConflictSeverity::Medium;
    }

    ConflictSeverity::Low
}
