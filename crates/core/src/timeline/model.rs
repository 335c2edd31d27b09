//! Timeline records: main-line events, per-task views and merge context.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Main line
// ---------------------------------------------------------------------------

/// Where a task's branch diverged from main.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BranchPoint {
    pub commit_hash: String,
    pub timestamp: DateTime<Utc>,
}

impl BranchPoint {
    pub fn new(commit_hash: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            commit_hash: commit_hash.into(),
            timestamp,
        }
    }
}

/// Who produced a main-line commit.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EventSource {
    #[default]
    Human,
    MergedTask,
}

impl std::fmt::Display for EventSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Human => write!(f, "human"),
            Self::MergedTask => write!(f, "merged_task"),
        }
    }
}

/// A commit as reported by the history interop.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MainLineCommit {
    pub hash: String,
    pub timestamp: DateTime<Utc>,
    pub summary: String,
    pub author: Option<String>,
    /// Paths touched by the commit, relative to the project root.
    pub files: Vec<String>,
}

/// One main-line commit touching a tracked file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MainBranchEvent {
    pub commit_hash: String,
    pub timestamp: DateTime<Utc>,
    pub summary: String,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub source: EventSource,
    #[serde(default)]
    pub merged_from_task: Option<String>,
    /// Arrival order, used to break timestamp ties.
    pub sequence: u64,
}

// ---------------------------------------------------------------------------
// Per-file timeline
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    #[default]
    Active,
    Merged,
    Abandoned,
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Active => write!(f, "active"),
            Self::Merged => write!(f, "merged"),
            Self::Abandoned => write!(f, "abandoned"),
        }
    }
}

/// A task's relationship to one file's timeline.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TaskFileView {
    pub task_id: String,
    pub branch_point: BranchPoint,
    pub task_intent: String,
    #[serde(default)]
    pub task_title: String,
    #[serde(default)]
    pub status: TaskStatus,
    #[serde(default)]
    pub merged_at: Option<DateTime<Utc>>,
}

impl TaskFileView {
    pub fn is_pending(&self) -> bool {
        self.status == TaskStatus::Active
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FileTimeline {
    pub file_path: String,
    pub created_at: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
    /// Sorted by `(timestamp, sequence)`.
    #[serde(default)]
    pub main_branch_history: Vec<MainBranchEvent>,
    #[serde(default)]
    pub task_views: BTreeMap<String, TaskFileView>,
}

impl FileTimeline {
    pub fn new(file_path: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            file_path: file_path.into(),
            created_at: now,
            last_updated: now,
            main_branch_history: Vec::new(),
            task_views: BTreeMap::new(),
        }
    }

    pub fn has_commit(&self, commit_hash: &str) -> bool {
        self.main_branch_history
            .iter()
            .any(|e| e.commit_hash == commit_hash)
    }

    /// Insert keeping the history sorted. A late arrival lands in
    /// timestamp position instead of at the end.
    pub fn insert_event(&mut self, event: MainBranchEvent) {
        let key = (event.timestamp, event.sequence);
        let at = self
            .main_branch_history
            .partition_point(|e| (e.timestamp, e.sequence) <= key);
        if event.timestamp > self.last_updated {
            self.last_updated = event.timestamp;
        }
        self.main_branch_history.insert(at, event);
    }

    /// Events strictly after `branch_point`.
    ///
    /// When the branch-point commit is in the history, position decides;
    /// otherwise timestamps do.
    pub fn events_after(&self, branch_point: &BranchPoint) -> &[MainBranchEvent] {
        match self
            .main_branch_history
            .iter()
            .position(|e| e.commit_hash == branch_point.commit_hash)
        {
            Some(idx) => &self.main_branch_history[idx + 1..],
            None => {
                let first_after = self
                    .main_branch_history
                    .partition_point(|e| e.timestamp <= branch_point.timestamp);
                &self.main_branch_history[first_after..]
            }
        }
    }

    pub fn pending_views(&self) -> impl Iterator<Item = &TaskFileView> {
        self.task_views.values().filter(|v| v.is_pending())
    }
}

/// Lifecycle of a file from the timeline's point of view.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", tag = "state", content = "pending_tasks")]
pub enum FileTrackingState {
    Untracked,
    /// Tracked, but no task is pending on it.
    Tracked,
    /// Tracked with this many pending tasks.
    Pending(usize),
}

impl std::fmt::Display for FileTrackingState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Untracked => write!(f, "untracked"),
            Self::Tracked => write!(f, "tracked"),
            Self::Pending(n) => write!(f, "tracked ({} pending)", n),
        }
    }
}

// ---------------------------------------------------------------------------
// Merge context
// ---------------------------------------------------------------------------

/// Another task still in flight on the same file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PendingTask {
    pub task_id: String,
    pub task_intent: String,
    pub branch_point: BranchPoint,
    pub commits_behind: usize,
}

/// Everything a merge step needs to know about one task on one file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MergeContext {
    pub file_path: String,
    pub task_id: String,
    pub task_intent: String,
    pub task_branch_point: BranchPoint,
    pub current_main_commit: String,
    pub total_commits_behind: usize,
    pub total_pending_tasks: usize,
    pub main_evolution: Vec<MainBranchEvent>,
    pub other_pending_tasks: Vec<PendingTask>,
}
