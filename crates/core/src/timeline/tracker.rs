use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::model::{
    BranchPoint, EventSource, FileTimeline, FileTrackingState, MainBranchEvent, MainLineCommit,
    MergeContext, PendingTask, TaskFileView, TaskStatus,
};

/// Per-file main-line histories and the task views hanging off them.
///
/// Pure state: git lookups happen in the coordinator, which feeds resolved
/// commits in here. Serialized as-is to `timelines.json`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TimelineTracker {
    #[serde(default)]
    timelines: BTreeMap<String, FileTimeline>,
    /// Newest main-line commit seen so far.
    #[serde(default)]
    current_main: Option<BranchPoint>,
    #[serde(default)]
    next_sequence: u64,
}

impl TimelineTracker {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_sequence(&mut self) -> u64 {
        self.next_sequence += 1;
        self.next_sequence
    }

    fn observe_main(&mut self, commit_hash: &str, timestamp: DateTime<Utc>) {
        let newer = match &self.current_main {
            Some(current) => timestamp >= current.timestamp,
            None => true,
        };
        if newer {
            self.current_main = Some(BranchPoint::new(commit_hash, timestamp));
        }
    }

    // -----------------------------------------------------------------------
    // Transitions
    // -----------------------------------------------------------------------

    /// Record a main-line commit against every tracked file it touches.
    ///
    /// Returns the files that received a new event. Re-applying a commit is
    /// a no-op.
    pub fn apply_main_commit(&mut self, commit: &MainLineCommit) -> Vec<String> {
        self.observe_main(&commit.hash, commit.timestamp);

        let mut touched = Vec::new();
        for file in &commit.files {
            let already = match self.timelines.get(file) {
                Some(timeline) => timeline.has_commit(&commit.hash),
                None => continue,
            };
            if already {
                debug!(file = %file, commit = %commit.hash, "commit already recorded");
                continue;
            }
            let sequence = self.next_sequence();
            if let Some(timeline) = self.timelines.get_mut(file) {
                timeline.insert_event(MainBranchEvent {
                    commit_hash: commit.hash.clone(),
                    timestamp: commit.timestamp,
                    summary: commit.summary.clone(),
                    author: commit.author.clone(),
                    source: EventSource::Human,
                    merged_from_task: None,
                    sequence,
                });
                touched.push(file.clone());
            }
        }

        info!(
            commit = %commit.hash,
            files = commit.files.len(),
            tracked = touched.len(),
            "applied main-line commit"
        );
        touched
    }

    /// Create or refresh the task's view on each file.
    pub fn register_task(
        &mut self,
        task_id: &str,
        files: &[String],
        branch_point: &BranchPoint,
        task_intent: &str,
        task_title: &str,
    ) -> usize {
        let now = Utc::now();
        for file in files {
            let timeline = self
                .timelines
                .entry(file.clone())
                .or_insert_with(|| FileTimeline::new(file.clone(), now));
            timeline.task_views.insert(
                task_id.to_string(),
                TaskFileView {
                    task_id: task_id.to_string(),
                    branch_point: branch_point.clone(),
                    task_intent: task_intent.to_string(),
                    task_title: task_title.to_string(),
                    status: TaskStatus::Active,
                    merged_at: None,
                },
            );
            timeline.last_updated = now;
        }
        info!(
            task = %task_id,
            files = files.len(),
            branch_point = %branch_point.commit_hash,
            "registered task on timelines"
        );
        files.len()
    }

    /// Mark the task merged on every file it viewed and record the merge
    /// commit on each of those files. Idempotent.
    pub fn on_task_merged(
        &mut self,
        task_id: &str,
        merge_commit: &str,
        timestamp: DateTime<Utc>,
    ) -> Vec<String> {
        self.observe_main(merge_commit, timestamp);

        let files = self.get_files_for_task(task_id);
        for file in &files {
            let needs_event = match self.timelines.get(file) {
                Some(timeline) => !timeline.has_commit(merge_commit),
                None => continue,
            };
            let sequence = if needs_event { self.next_sequence() } else { 0 };
            let Some(timeline) = self.timelines.get_mut(file) else {
                continue;
            };
            if let Some(view) = timeline.task_views.get_mut(task_id) {
                if view.status != TaskStatus::Merged {
                    view.status = TaskStatus::Merged;
                    view.merged_at = Some(timestamp);
                }
            }
            if needs_event {
                timeline.insert_event(MainBranchEvent {
                    commit_hash: merge_commit.to_string(),
                    timestamp,
                    summary: format!("Merged task {}", task_id),
                    author: None,
                    source: EventSource::MergedTask,
                    merged_from_task: Some(task_id.to_string()),
                    sequence,
                });
            } else if let Some(existing) = timeline
                .main_branch_history
                .iter_mut()
                .find(|e| e.commit_hash == merge_commit)
            {
                existing.source = EventSource::MergedTask;
                existing.merged_from_task = Some(task_id.to_string());
            }
        }

        info!(task = %task_id, commit = %merge_commit, files = files.len(), "task merged");
        files
    }

    /// Mark the task's views abandoned. Returns how many changed.
    pub fn on_task_abandoned(&mut self, task_id: &str) -> usize {
        let mut changed = 0;
        for timeline in self.timelines.values_mut() {
            if let Some(view) = timeline.task_views.get_mut(task_id) {
                if view.status == TaskStatus::Active {
                    view.status = TaskStatus::Abandoned;
                    changed += 1;
                }
            }
        }
        info!(task = %task_id, views = changed, "task abandoned");
        changed
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    pub fn get_timeline(&self, file_path: &str) -> Option<&FileTimeline> {
        self.timelines.get(file_path)
    }

    pub fn tracked_files(&self) -> Vec<String> {
        self.timelines.keys().cloned().collect()
    }

    pub fn timelines(&self) -> &BTreeMap<String, FileTimeline> {
        &self.timelines
    }

    pub fn current_main_commit(&self) -> Option<&BranchPoint> {
        self.current_main.as_ref()
    }

    pub fn tracking_state(&self, file_path: &str) -> FileTrackingState {
        match self.timelines.get(file_path) {
            None => FileTrackingState::Untracked,
            Some(timeline) => match timeline.pending_views().count() {
                0 => FileTrackingState::Tracked,
                n => FileTrackingState::Pending(n),
            },
        }
    }

    pub fn get_files_for_task(&self, task_id: &str) -> Vec<String> {
        self.timelines
            .iter()
            .filter(|(_, t)| t.task_views.contains_key(task_id))
            .map(|(path, _)| path.clone())
            .collect()
    }

    pub fn get_pending_tasks_for_file(&self, file_path: &str) -> Vec<&TaskFileView> {
        self.timelines
            .get(file_path)
            .map(|t| t.pending_views().collect())
            .unwrap_or_default()
    }

    /// Main-line commits each of the task's files has received since its
    /// branch point. Files the task has no view on are absent.
    pub fn get_task_drift(&self, task_id: &str) -> BTreeMap<String, usize> {
        self.timelines
            .iter()
            .filter_map(|(path, timeline)| {
                timeline
                    .task_views
                    .get(task_id)
                    .map(|view| (path.clone(), timeline.events_after(&view.branch_point).len()))
            })
            .collect()
    }

    pub fn get_merge_context(&self, task_id: &str, file_path: &str) -> Option<MergeContext> {
        let timeline = self.timelines.get(file_path)?;
        let view = timeline.task_views.get(task_id)?;
        let main_evolution = timeline.events_after(&view.branch_point).to_vec();

        let other_pending_tasks: Vec<PendingTask> = timeline
            .pending_views()
            .filter(|v| v.task_id != task_id)
            .map(|v| PendingTask {
                task_id: v.task_id.clone(),
                task_intent: v.task_intent.clone(),
                branch_point: v.branch_point.clone(),
                commits_behind: timeline.events_after(&v.branch_point).len(),
            })
            .collect();

        let current_main_commit = self
            .current_main
            .as_ref()
            .map(|bp| bp.commit_hash.clone())
            .or_else(|| timeline.main_branch_history.last().map(|e| e.commit_hash.clone()))
            .unwrap_or_else(|| view.branch_point.commit_hash.clone());

        Some(MergeContext {
            file_path: file_path.to_string(),
            task_id: task_id.to_string(),
            task_intent: view.task_intent.clone(),
            task_branch_point: view.branch_point.clone(),
            current_main_commit,
            total_commits_behind: main_evolution.len(),
            total_pending_tasks: other_pending_tasks.len(),
            main_evolution,
            other_pending_tasks,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn commit(hash: &str, secs: i64, files: &[&str]) -> MainLineCommit {
        MainLineCommit {
            hash: hash.into(),
            timestamp: at(secs),
            summary: format!("commit {}", hash),
            author: Some("dev".into()),
            files: files.iter().map(|f| f.to_string()).collect(),
        }
    }

    fn files(names: &[&str]) -> Vec<String> {
        names.iter().map(|f| f.to_string()).collect()
    }

    #[test]
    fn test_three_commits_of_drift() {
        let mut t = TimelineTracker::new();
        t.register_task("A", &files(&["main.go"]), &BranchPoint::new("c1", at(0)), "fix", "Fix");
        t.apply_main_commit(&commit("c2", 10, &["main.go"]));
        t.apply_main_commit(&commit("c3", 20, &["main.go", "other.go"]));
        t.apply_main_commit(&commit("c4", 30, &["main.go"]));

        assert_eq!(t.get_task_drift("A")["main.go"], 3);
        assert!(t.get_timeline("other.go").is_none());
    }

    #[test]
    fn test_same_commit_twice_is_idempotent() {
        let mut t = TimelineTracker::new();
        t.register_task("A", &files(&["f.rs"]), &BranchPoint::new("c1", at(0)), "", "");
        let c = commit("c2", 10, &["f.rs"]);
        assert_eq!(t.apply_main_commit(&c), vec!["f.rs"]);
        assert!(t.apply_main_commit(&c).is_empty());
        assert_eq!(t.get_timeline("f.rs").unwrap().main_branch_history.len(), 1);
    }

    #[test]
    fn test_no_drift_entry_without_view() {
        let mut t = TimelineTracker::new();
        t.register_task("A", &files(&["a.rs"]), &BranchPoint::new("c1", at(0)), "", "");
        t.register_task("B", &files(&["b.rs"]), &BranchPoint::new("c1", at(0)), "", "");
        let drift = t.get_task_drift("A");
        assert!(drift.contains_key("a.rs"));
        assert!(!drift.contains_key("b.rs"));
        assert!(t.get_task_drift("nobody").is_empty());
    }

    #[test]
    fn test_late_arrival_does_not_corrupt_drift() {
        let mut t = TimelineTracker::new();
        t.register_task("A", &files(&["f"]), &BranchPoint::new("base", at(15)), "", "");
        t.apply_main_commit(&commit("c3", 30, &["f"]));
        // c1 predates the branch point but arrives last.
        t.apply_main_commit(&commit("c1", 10, &["f"]));
        assert_eq!(t.get_task_drift("A")["f"], 1);
        assert_eq!(t.current_main_commit().unwrap().commit_hash, "c3");
    }

    #[test]
    fn test_tracking_states() {
        let mut t = TimelineTracker::new();
        assert_eq!(t.tracking_state("x"), FileTrackingState::Untracked);
        t.register_task("A", &files(&["x"]), &BranchPoint::new("c1", at(0)), "", "");
        t.register_task("B", &files(&["x"]), &BranchPoint::new("c1", at(0)), "", "");
        assert_eq!(t.tracking_state("x"), FileTrackingState::Pending(2));
        t.on_task_abandoned("A");
        t.on_task_merged("B", "m1", at(50));
        assert_eq!(t.tracking_state("x"), FileTrackingState::Tracked);
    }

    #[test]
    fn test_merge_context() {
        let mut t = TimelineTracker::new();
        t.register_task("A", &files(&["app.ts"]), &BranchPoint::new("c1", at(0)), "add auth", "Auth");
        t.register_task("B", &files(&["app.ts"]), &BranchPoint::new("c2", at(10)), "add theme", "Theme");
        t.apply_main_commit(&commit("c2", 10, &["app.ts"]));
        t.apply_main_commit(&commit("c3", 20, &["app.ts"]));

        let ctx = t.get_merge_context("A", "app.ts").unwrap();
        assert_eq!(ctx.task_intent, "add auth");
        assert_eq!(ctx.total_commits_behind, 2);
        assert_eq!(ctx.current_main_commit, "c3");
        assert_eq!(ctx.total_pending_tasks, 1);
        assert_eq!(ctx.other_pending_tasks[0].task_id, "B");
        assert_eq!(ctx.other_pending_tasks[0].commits_behind, 1);

        assert!(t.get_merge_context("A", "missing.ts").is_none());
        assert!(t.get_merge_context("Z", "app.ts").is_none());
    }

    #[test]
    fn test_task_merge_records_event_once() {
        let mut t = TimelineTracker::new();
        t.register_task("A", &files(&["a", "b"]), &BranchPoint::new("c1", at(0)), "", "");
        t.register_task("B", &files(&["a"]), &BranchPoint::new("c1", at(0)), "", "");

        assert_eq!(t.on_task_merged("A", "m1", at(100)).len(), 2);
        t.on_task_merged("A", "m1", at(100));

        let tl = t.get_timeline("a").unwrap();
        assert_eq!(tl.main_branch_history.len(), 1);
        assert_eq!(tl.main_branch_history[0].source, EventSource::MergedTask);
        assert_eq!(tl.main_branch_history[0].merged_from_task.as_deref(), Some("A"));
        assert_eq!(tl.task_views["A"].status, TaskStatus::Merged);
        assert_eq!(t.get_task_drift("B")["a"], 1);
        assert_eq!(t.get_pending_tasks_for_file("a").len(), 1);
    }

    #[test]
    fn test_merge_after_notify_upgrades_event() {
        let mut t = TimelineTracker::new();
        t.register_task("A", &files(&["a"]), &BranchPoint::new("c1", at(0)), "", "");
        t.apply_main_commit(&commit("m1", 10, &["a"]));
        t.on_task_merged("A", "m1", at(10));
        let tl = t.get_timeline("a").unwrap();
        assert_eq!(tl.main_branch_history.len(), 1);
        assert_eq!(tl.main_branch_history[0].source, EventSource::MergedTask);
    }

    #[test]
    fn test_serde_round_trip_and_reset() {
        let mut t = TimelineTracker::new();
        t.register_task("A", &files(&["a"]), &BranchPoint::new("c1", at(0)), "i", "t");
        t.apply_main_commit(&commit("c2", 10, &["a"]));

        let json = serde_json::to_string(&t).unwrap();
        let back: TimelineTracker = serde_json::from_str(&json).unwrap();
        assert_eq!(back, t);

        t.reset();
        assert!(t.tracked_files().is_empty());
        assert!(t.current_main_commit().is_none());
    }
}
