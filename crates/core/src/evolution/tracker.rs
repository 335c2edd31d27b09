use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use super::query::{self, EvolutionMap, EvolutionSummary, MergeExport};
use crate::errors::{StoreError, TrackingError};
use crate::hash::content_hash;
use crate::store::BaselineStore;
use crate::types::{FileEvolution, SemanticChange, TaskSnapshot};

/// A classified modification reported by the task orchestrator.
#[derive(Debug, Clone, Default)]
pub struct Modification {
    pub new_content: String,
    pub semantic_changes: Vec<SemanticChange>,
    pub raw_diff: Option<String>,
    /// Used only when the task had not begun on the file.
    pub task_intent: Option<String>,
}

/// Owner of the evolution map. All mutation goes through these methods.
#[derive(Debug)]
pub struct EvolutionTracker {
    evolutions: EvolutionMap,
    baselines: BaselineStore,
}

impl EvolutionTracker {
    pub fn new(baselines: BaselineStore) -> Self {
        Self::with_evolutions(EvolutionMap::new(), baselines)
    }

    pub fn with_evolutions(evolutions: EvolutionMap, baselines: BaselineStore) -> Self {
        Self {
            evolutions,
            baselines,
        }
    }

    pub fn evolutions(&self) -> &EvolutionMap {
        &self.evolutions
    }

    pub fn baselines(&self) -> &BaselineStore {
        &self.baselines
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// Start tracking `task_id` on `file_path`.
    ///
    /// `content` is the file as of the task's branch point (empty when the
    /// file did not exist there). The first task to touch a file captures
    /// the baseline snapshot. If the task already has a snapshot on the
    /// file it is left untouched.
    pub fn begin_file(
        &mut self,
        task_id: &str,
        task_intent: &str,
        file_path: &str,
        content: &str,
        branch_commit: &str,
        started_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let hash = content_hash(content);

        if !self.evolutions.contains_key(file_path) {
            let snapshot_path = self.baselines.write(file_path, content)?;
            info!(file = %file_path, commit = %branch_commit, hash = %hash, "captured baseline");
            self.evolutions.insert(
                file_path.to_string(),
                FileEvolution::new(file_path, branch_commit, hash.clone(), snapshot_path, started_at),
            );
        }

        let Some(evolution) = self.evolutions.get_mut(file_path) else {
            return Ok(());
        };
        if evolution.snapshot(task_id).is_some() {
            debug!(task = %task_id, file = %file_path, "task already tracked on file");
            return Ok(());
        }
        evolution.upsert_snapshot(TaskSnapshot::new(task_id, task_intent, hash, started_at));
        debug!(task = %task_id, file = %file_path, "began tracking task on file");
        Ok(())
    }

    /// Record the task's new content and classified changes for a file.
    pub fn record_modification(
        &mut self,
        task_id: &str,
        file_path: &str,
        modification: Modification,
    ) -> Result<(), TrackingError> {
        let evolution = self
            .evolutions
            .get_mut(file_path)
            .ok_or_else(|| TrackingError::FileNotTracked(file_path.to_string()))?;

        if evolution.snapshot(task_id).is_none() {
            let intent = modification.task_intent.clone().unwrap_or_default();
            let baseline_hash = evolution.baseline_content_hash.clone();
            evolution.upsert_snapshot(TaskSnapshot::new(task_id, intent, baseline_hash, Utc::now()));
        }

        let after = content_hash(&modification.new_content);
        if let Some(snapshot) = evolution.snapshot_mut(task_id) {
            snapshot.content_hash_after = Some(after);
            snapshot.semantic_changes = modification.semantic_changes;
            snapshot.raw_diff = modification.raw_diff;
            info!(
                task = %task_id,
                file = %file_path,
                modified = snapshot.has_modifications(),
                changes = snapshot.semantic_changes.len(),
                "recorded modification"
            );
        }
        Ok(())
    }

    /// Stamp `completed_at` on every open snapshot of the task. Returns the
    /// number of snapshots closed.
    pub fn mark_task_completed(&mut self, task_id: &str) -> usize {
        let now = Utc::now();
        let mut closed = 0;
        for evolution in self.evolutions.values_mut() {
            if let Some(snapshot) = evolution.snapshot_mut(task_id) {
                if snapshot.is_active() {
                    snapshot.completed_at = Some(now);
                    closed += 1;
                }
            }
        }
        info!(task = %task_id, closed, "marked task completed");
        closed
    }

    /// Drop the task's snapshots everywhere. Idempotent.
    pub fn cleanup_task(&mut self, task_id: &str, remove_baselines: bool) {
        let current = std::mem::take(&mut self.evolutions);
        self.evolutions = query::cleanup_task(task_id, current, remove_baselines, &self.baselines);
    }

    /// Forget all in-memory state. Baseline files are left alone.
    pub fn reset(&mut self) {
        self.evolutions.clear();
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    pub fn get_file_evolution(&self, path: &str) -> Option<&FileEvolution> {
        query::get_file_evolution(path, &self.evolutions)
    }

    pub fn get_baseline_content(&self, path: &str) -> Result<Option<String>, StoreError> {
        query::get_baseline_content(path, &self.evolutions, &self.baselines)
    }

    pub fn get_task_modifications(&self, task_id: &str) -> Vec<(String, TaskSnapshot)> {
        query::get_task_modifications(task_id, &self.evolutions)
    }

    pub fn get_files_modified_by_tasks(&self, task_ids: &[String]) -> BTreeMap<String, Vec<TaskSnapshot>> {
        query::get_files_modified_by_tasks(task_ids, &self.evolutions)
    }

    pub fn get_conflicting_files(&self, task_ids: &[String]) -> Vec<String> {
        query::get_conflicting_files(task_ids, &self.evolutions)
    }

    pub fn get_active_tasks(&self) -> BTreeSet<String> {
        query::get_active_tasks(&self.evolutions)
    }

    pub fn get_evolution_summary(&self) -> EvolutionSummary {
        query::get_evolution_summary(&self.evolutions)
    }

    pub fn export_for_merge(&self, path: &str) -> Option<MergeExport> {
        query::export_for_merge(path, &self.evolutions, &self.baselines)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::StatePaths;
    use crate::types::ChangeType;

    fn tracker() -> (tempfile::TempDir, EvolutionTracker) {
        let tmp = tempfile::tempdir().unwrap();
        let baselines = BaselineStore::new(StatePaths::discover(tmp.path(), ".taskweave"));
        (tmp, EvolutionTracker::new(baselines))
    }

    fn modification(content: &str, changes: Vec<SemanticChange>) -> Modification {
        Modification {
            new_content: content.to_string(),
            semantic_changes: changes,
            ..Default::default()
        }
    }

    #[test]
    fn test_begin_captures_baseline_once() {
        let (_tmp, mut t) = tracker();
        t.begin_file("a", "add login", "src/app.ts", "v1", "c1", Utc::now()).unwrap();
        t.begin_file("b", "add logout", "src/app.ts", "v1", "c1", Utc::now()).unwrap();

        let evo = t.get_file_evolution("src/app.ts").unwrap();
        assert_eq!(evo.baseline_commit, "c1");
        assert_eq!(evo.baseline_content_hash, content_hash("v1"));
        assert_eq!(evo.task_snapshots.len(), 2);
        assert_eq!(t.get_baseline_content("src/app.ts").unwrap().as_deref(), Some("v1"));
    }

    #[test]
    fn test_hash_before_follows_branch_point_content() {
        let (_tmp, mut t) = tracker();
        t.begin_file("a", "", "f.ts", "v1", "c1", Utc::now()).unwrap();
        // Task b branched after a was merged and sees a's result.
        t.begin_file("b", "", "f.ts", "v2", "c2", Utc::now()).unwrap();

        let evo = t.get_file_evolution("f.ts").unwrap();
        assert_eq!(evo.baseline_content_hash, content_hash("v1"));
        assert_eq!(evo.snapshot("b").unwrap().content_hash_before, content_hash("v2"));
    }

    #[test]
    fn test_begin_twice_keeps_recorded_work() {
        let (_tmp, mut t) = tracker();
        t.begin_file("a", "", "f.ts", "v1", "c1", Utc::now()).unwrap();
        t.record_modification("a", "f.ts", modification("v2", vec![])).unwrap();
        t.begin_file("a", "", "f.ts", "v1", "c1", Utc::now()).unwrap();
        let snap = t.get_file_evolution("f.ts").unwrap().snapshot("a").unwrap();
        assert_eq!(snap.content_hash_after, Some(content_hash("v2")));
    }

    #[test]
    fn test_lookalike_paths_keep_their_own_baselines() {
        let (_tmp, mut t) = tracker();
        t.begin_file("a", "", "a/b.ts", "nested original", "c1", Utc::now()).unwrap();
        t.begin_file("b", "", "a__b.ts", "flat original", "c1", Utc::now()).unwrap();

        assert_eq!(t.get_baseline_content("a/b.ts").unwrap().as_deref(), Some("nested original"));
        assert_eq!(t.get_baseline_content("a__b.ts").unwrap().as_deref(), Some("flat original"));

        t.cleanup_task("b", true);
        assert!(t.get_file_evolution("a__b.ts").is_none());
        assert_eq!(t.get_baseline_content("a/b.ts").unwrap().as_deref(), Some("nested original"));
    }

    #[test]
    fn test_record_modification_on_untracked_file_fails() {
        let (_tmp, mut t) = tracker();
        let err = t
            .record_modification("a", "nope.ts", modification("x", vec![]))
            .unwrap_err();
        assert!(matches!(err, TrackingError::FileNotTracked(p) if p == "nope.ts"));
    }

    #[test]
    fn test_record_creates_snapshot_for_late_task() {
        let (_tmp, mut t) = tracker();
        t.begin_file("a", "", "f.ts", "v1", "c1", Utc::now()).unwrap();
        let mut m = modification(
            "v3",
            vec![SemanticChange::new(ChangeType::AddFunction, "g", "function:g", 5, 9)],
        );
        m.task_intent = Some("add g".into());
        t.record_modification("late", "f.ts", m).unwrap();

        let snap = t.get_file_evolution("f.ts").unwrap().snapshot("late").unwrap().clone();
        assert_eq!(snap.content_hash_before, content_hash("v1"));
        assert_eq!(snap.task_intent, "add g");
        assert!(snap.has_modifications());
        assert_eq!(t.get_task_modifications("late").len(), 1);
    }

    #[test]
    fn test_completion_and_active_tasks() {
        let (_tmp, mut t) = tracker();
        t.begin_file("a", "", "x.ts", "", "c1", Utc::now()).unwrap();
        t.begin_file("a", "", "y.ts", "", "c1", Utc::now()).unwrap();
        t.begin_file("b", "", "y.ts", "", "c1", Utc::now()).unwrap();

        assert_eq!(t.mark_task_completed("a"), 2);
        assert_eq!(t.mark_task_completed("a"), 0);
        let active = t.get_active_tasks();
        assert!(!active.contains("a"));
        assert!(active.contains("b"));
    }

    #[test]
    fn test_cleanup_and_reset() {
        let (_tmp, mut t) = tracker();
        t.begin_file("a", "", "x.ts", "x", "c1", Utc::now()).unwrap();
        t.cleanup_task("a", true);
        t.cleanup_task("a", true);
        assert!(t.evolutions().is_empty());

        t.begin_file("b", "", "y.ts", "y", "c1", Utc::now()).unwrap();
        t.reset();
        assert!(t.get_file_evolution("y.ts").is_none());
    }
}
