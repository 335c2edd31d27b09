//! The merge coordinator: single owner of all tracking state.
//!
//! [`MergeCoordinator`] holds the evolution map, the timelines, the rule
//! index, configuration and the git interop, and is passed explicitly to
//! whatever needs it. Tracking state is pure; every git call happens here.

use std::path::{Path, PathBuf};

use chrono::Utc;
use tracing::{debug, info, instrument, warn};

use crate::config::CoordinatorConfig;
use crate::conflict::{changes_by_task, detect_regions};
use crate::errors::{CoreError, StoreError, TrackingError};
use crate::evolution::{EvolutionMap, EvolutionTracker, Modification};
use crate::git::{GitInterop, MainLineHistory};
use crate::hash::content_hash;
use crate::rules::{build_default_rules, index_rules, RuleIndex};
use crate::store::{json, load_json, save_json, BaselineStore, StatePaths};
use crate::timeline::{BranchPoint, TimelineTracker};
use crate::types::{CompatibilityRule, ConflictRegion};

/// Coordinates concurrent tasks against one advancing main line.
pub struct MergeCoordinator<G> {
    project_dir: PathBuf,
    config: CoordinatorConfig,
    paths: StatePaths,
    git: G,
    rules: Vec<CompatibilityRule>,
    index: RuleIndex,
    evolution: EvolutionTracker,
    timeline: TimelineTracker,
}

impl<G> MergeCoordinator<G>
where
    G: GitInterop + MainLineHistory,
{
    /// A coordinator with empty state. No I/O.
    pub fn new(project_dir: impl Into<PathBuf>, config: CoordinatorConfig, git: G) -> Self {
        let project_dir = project_dir.into();
        let paths = StatePaths::discover(&project_dir, &config.state_dir);
        let rules = build_default_rules();
        let index = index_rules(&rules);
        Self {
            evolution: EvolutionTracker::new(BaselineStore::new(paths.clone())),
            timeline: TimelineTracker::new(),
            project_dir,
            config,
            paths,
            git,
            rules,
            index,
        }
    }

    /// A coordinator with state loaded from disk (empty if none persisted).
    pub fn open(
        project_dir: impl Into<PathBuf>,
        config: CoordinatorConfig,
        git: G,
    ) -> Result<Self, CoreError> {
        let mut coordinator = Self::new(project_dir, config, git);
        let evolutions: EvolutionMap = load_json(&coordinator.paths.evolutions_json)?;
        let timeline: TimelineTracker = load_json(&coordinator.paths.timelines_json)?;
        info!(
            project = %coordinator.project_dir.display(),
            files = evolutions.len(),
            timelines = timeline.timelines().len(),
            "opened coordinator state"
        );
        coordinator.evolution = EvolutionTracker::with_evolutions(
            evolutions,
            BaselineStore::new(coordinator.paths.clone()),
        );
        coordinator.timeline = timeline;
        Ok(coordinator)
    }

    /// Persist both state documents atomically.
    pub fn save(&self) -> Result<(), StoreError> {
        self.paths.ensure_layout()?;
        save_json(&self.paths.evolutions_json, self.evolution.evolutions())?;
        save_json(&self.paths.timelines_json, &self.timeline)?;
        debug!(state = %self.paths.state_dir.display(), "saved coordinator state");
        Ok(())
    }

    /// Clear memory and delete persisted documents and baselines.
    pub fn reset(&mut self) -> Result<(), StoreError> {
        self.evolution.reset();
        self.timeline.reset();
        json::remove_if_exists(&self.paths.evolutions_json)?;
        json::remove_if_exists(&self.paths.timelines_json)?;
        self.evolution.baselines().clear()?;
        info!(state = %self.paths.state_dir.display(), "reset coordinator state");
        Ok(())
    }

    /// Replace the rule table.
    pub fn with_rules(mut self, rules: Vec<CompatibilityRule>) -> Self {
        self.index = index_rules(&rules);
        self.rules = rules;
        self
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    pub fn project_dir(&self) -> &Path {
        &self.project_dir
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    pub fn paths(&self) -> &StatePaths {
        &self.paths
    }

    pub fn git(&self) -> &G {
        &self.git
    }

    pub fn rules(&self) -> &[CompatibilityRule] {
        &self.rules
    }

    pub fn rule_index(&self) -> &RuleIndex {
        &self.index
    }

    pub fn evolution(&self) -> &EvolutionTracker {
        &self.evolution
    }

    pub fn timeline(&self) -> &TimelineTracker {
        &self.timeline
    }

    fn is_trackable(&self, file_path: &str) -> bool {
        let state_prefix = format!("{}/", self.config.state_dir.trim_end_matches('/'));
        let worktree_prefix = format!("{}/", self.config.worktrees_dir.to_string_lossy().trim_end_matches('/'));
        !(file_path.starts_with(&state_prefix)
            || file_path.starts_with(&worktree_prefix)
            || self.config.is_ignored(file_path))
    }

    // -----------------------------------------------------------------------
    // Git-backed operations
    // -----------------------------------------------------------------------

    pub async fn find_worktree(&self, task_id: &str) -> Option<PathBuf> {
        self.git.find_worktree(&self.project_dir, task_id).await
    }

    async fn resolve_branch_point(&self, rev: &str) -> Result<BranchPoint, TrackingError> {
        let commit = self
            .git
            .resolve_commit(&self.project_dir, rev)
            .await?
            .ok_or_else(|| TrackingError::CommitNotFound(rev.to_string()))?;
        Ok(BranchPoint::new(commit.hash, commit.timestamp))
    }

    /// Start tracking `task_id` on `files`, reading each file as of
    /// `branch_point` (a commit or ref). Creates both the evolution
    /// snapshots and the timeline views. Returns the files now tracked.
    #[instrument(skip(self, files), fields(files = files.len()))]
    pub async fn begin_task(
        &mut self,
        task_id: &str,
        task_intent: &str,
        files: &[String],
        branch_point: &str,
    ) -> Result<Vec<String>, TrackingError> {
        let point = self.resolve_branch_point(branch_point).await?;
        let tracked = self.begin_files(task_id, task_intent, files, &point).await?;
        self.timeline
            .register_task(task_id, &tracked, &point, task_intent, "");
        self.replay_main_since(&point).await?;
        Ok(tracked)
    }

    /// Apply every main-line commit after `point` so drift for freshly
    /// registered views counts history that predates them. Returns how
    /// many commits were replayed.
    async fn replay_main_since(&mut self, point: &BranchPoint) -> Result<usize, TrackingError> {
        let main = self.config.main_branch.clone();
        let replay = self
            .git
            .main_commits_since(&self.project_dir, &point.commit_hash, &main)
            .await?;
        for commit in &replay {
            self.timeline.apply_main_commit(commit);
        }
        debug!(branch_point = %point.commit_hash, replayed = replay.len(), "replayed main line");
        Ok(replay.len())
    }

    /// Record each file's current worktree content as an unclassified
    /// modification, so edits show up as hash divergence before any
    /// classifier has run. A file whose recorded content still matches the
    /// worktree keeps its classified changes. Returns how many files were
    /// recorded.
    async fn record_worktree_content(
        &mut self,
        task_id: &str,
        worktree_path: &Path,
        files: &[String],
    ) -> Result<usize, TrackingError> {
        let mut recorded = 0;
        for file in files {
            let path = worktree_path.join(file);
            let content = match tokio::fs::read_to_string(&path).await {
                Ok(content) => content,
                // Deleted in the worktree.
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
                Err(source) => return Err(TrackingError::WorktreeRead { path, source }),
            };

            let hash = content_hash(&content);
            let current = self
                .evolution
                .get_file_evolution(file)
                .and_then(|evo| evo.snapshot(task_id))
                .and_then(|snap| snap.content_hash_after.as_deref());
            if current == Some(hash.as_str()) {
                continue;
            }

            self.evolution.record_modification(
                task_id,
                file,
                Modification {
                    new_content: content,
                    ..Default::default()
                },
            )?;
            recorded += 1;
        }
        Ok(recorded)
    }

    async fn begin_files(
        &mut self,
        task_id: &str,
        task_intent: &str,
        files: &[String],
        point: &BranchPoint,
    ) -> Result<Vec<String>, TrackingError> {
        let mut tracked = Vec::new();
        for file in files {
            if !self.is_trackable(file) {
                debug!(file = %file, "skipping ignored file");
                continue;
            }
            let content = self
                .git
                .get_file_from_branch(&self.project_dir, file, &point.commit_hash)
                .await?
                .unwrap_or_default();
            self.evolution
                .begin_file(task_id, task_intent, file, &content, &point.commit_hash, Utc::now())?;
            tracked.push(file.clone());
        }
        Ok(tracked)
    }

    /// Record a main-line commit. Re-notifying the same commit is a no-op.
    #[instrument(skip(self))]
    pub async fn on_main_branch_commit(&mut self, commit_hash: &str) -> Result<Vec<String>, TrackingError> {
        let commit = self
            .git
            .resolve_commit(&self.project_dir, commit_hash)
            .await?
            .ok_or_else(|| TrackingError::CommitNotFound(commit_hash.to_string()))?;
        Ok(self.timeline.apply_main_commit(&commit))
    }

    /// Register a task from its worktree.
    ///
    /// The branch point is the merge base of the main branch and the
    /// worktree's HEAD; the task's files are everything changed since then.
    /// Main-line commits after the branch point are replayed so drift is
    /// accurate immediately. Evolution tracking begins for each file and
    /// its current worktree content is recorded as the task's edit.
    #[instrument(skip(self), fields(worktree = %worktree_path.display()))]
    pub async fn initialize_from_worktree(
        &mut self,
        task_id: &str,
        worktree_path: &Path,
        task_intent: &str,
        task_title: &str,
    ) -> Result<Vec<String>, TrackingError> {
        if !worktree_path.is_dir() {
            return Err(TrackingError::WorktreeNotFound(worktree_path.to_path_buf()));
        }

        let main = self.config.main_branch.clone();
        let base = match self.git.merge_base(worktree_path, &main, "HEAD").await? {
            Some(base) => base,
            None => {
                warn!(task = %task_id, "no merge base with main, using main head");
                self.git
                    .main_head(&self.project_dir, &main)
                    .await?
                    .map(|c| c.hash)
                    .ok_or_else(|| TrackingError::CommitNotFound(main.clone()))?
            }
        };
        let point = self.resolve_branch_point(&base).await?;

        let files: Vec<String> = self
            .git
            .changed_files_since(worktree_path, &point.commit_hash)
            .await?
            .into_iter()
            .filter(|f| self.is_trackable(f))
            .collect();

        self.timeline
            .register_task(task_id, &files, &point, task_intent, task_title);
        let replayed = self.replay_main_since(&point).await?;

        self.begin_files(task_id, task_intent, &files, &point).await?;
        let modified = self
            .record_worktree_content(task_id, worktree_path, &files)
            .await?;

        info!(
            task = %task_id,
            branch_point = %point.commit_hash,
            files = files.len(),
            modified,
            replayed,
            "initialized task from worktree"
        );
        Ok(files)
    }

    /// Mark the task merged by `merge_commit`.
    #[instrument(skip(self))]
    pub async fn on_task_merged(&mut self, task_id: &str, merge_commit: &str) -> Result<Vec<String>, TrackingError> {
        let commit = self
            .git
            .resolve_commit(&self.project_dir, merge_commit)
            .await?
            .ok_or_else(|| TrackingError::CommitNotFound(merge_commit.to_string()))?;
        let files = self
            .timeline
            .on_task_merged(task_id, &commit.hash, commit.timestamp);
        self.evolution.mark_task_completed(task_id);
        Ok(files)
    }

    // -----------------------------------------------------------------------
    // State-only operations
    // -----------------------------------------------------------------------

    pub fn record_modification(
        &mut self,
        task_id: &str,
        file_path: &str,
        modification: Modification,
    ) -> Result<(), TrackingError> {
        self.evolution.record_modification(task_id, file_path, modification)
    }

    pub fn mark_task_completed(&mut self, task_id: &str) -> usize {
        self.evolution.mark_task_completed(task_id)
    }

    pub fn on_task_abandoned(&mut self, task_id: &str) -> usize {
        self.timeline.on_task_abandoned(task_id)
    }

    /// Drop the task's evolution snapshots and abandon its timeline views.
    /// Safe to repeat.
    pub fn cleanup_task(&mut self, task_id: &str, remove_baselines: bool) {
        self.evolution.cleanup_task(task_id, remove_baselines);
        self.timeline.on_task_abandoned(task_id);
    }

    /// Conflict regions across every file at least two of `task_ids`
    /// modified.
    pub fn detect_conflicts(&self, task_ids: &[String]) -> Vec<ConflictRegion> {
        self.evolution
            .get_files_modified_by_tasks(task_ids)
            .into_iter()
            .filter(|(_, snapshots)| snapshots.len() >= 2)
            .flat_map(|(path, snapshots)| {
                detect_regions(&path, &changes_by_task(&snapshots), &self.index)
            })
            .collect()
    }
}
