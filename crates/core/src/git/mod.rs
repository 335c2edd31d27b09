//! Git and worktree interop.
//!
//! Production code only talks to git through the two traits below, so
//! tests can swap in in-memory fakes. [`GitCli`] implements both with the
//! `git` binary.

use std::future::Future;
use std::path::{Path, PathBuf};

use crate::errors::GitError;
use crate::timeline::MainLineCommit;

pub mod client;
pub mod worktree;

pub use client::{FileAtRef, GitCli};
pub use worktree::find_worktree_in;

/// Locating task worktrees and reading file content at a ref.
pub trait GitInterop: Send + Sync {
    /// The worktree directory for `task_id`, if any.
    fn find_worktree(
        &self,
        project_dir: &Path,
        task_id: &str,
    ) -> impl Future<Output = Option<PathBuf>> + Send;

    /// Content of `file_path` as of `branch`.
    ///
    /// `Ok(None)` when the path does not exist on the branch or the branch
    /// itself does not exist. `Err` means the read could not be completed
    /// and may be retried.
    fn get_file_from_branch(
        &self,
        project_dir: &Path,
        file_path: &str,
        branch: &str,
    ) -> impl Future<Output = Result<Option<String>, GitError>> + Send;
}

/// Read access to the main line's history.
pub trait MainLineHistory: Send + Sync {
    /// Resolve a revision to a commit with the files it touched
    /// (relative to its first parent). `Ok(None)` if it does not exist.
    fn resolve_commit(
        &self,
        repo_dir: &Path,
        rev: &str,
    ) -> impl Future<Output = Result<Option<MainLineCommit>, GitError>> + Send;

    /// Tip of `branch`, if the branch exists.
    fn main_head(
        &self,
        repo_dir: &Path,
        branch: &str,
    ) -> impl Future<Output = Result<Option<MainLineCommit>, GitError>> + Send;

    /// Best common ancestor of two revisions.
    fn merge_base(
        &self,
        repo_dir: &Path,
        a: &str,
        b: &str,
    ) -> impl Future<Output = Result<Option<String>, GitError>> + Send;

    /// Files changed in `worktree` since `base`: committed, uncommitted
    /// and untracked. Sorted and deduplicated.
    fn changed_files_since(
        &self,
        worktree: &Path,
        base: &str,
    ) -> impl Future<Output = Result<Vec<String>, GitError>> + Send;

    /// First-parent commits on `branch` after `base`, oldest first.
    fn main_commits_since(
        &self,
        repo_dir: &Path,
        base: &str,
        branch: &str,
    ) -> impl Future<Output = Result<Vec<MainLineCommit>, GitError>> + Send;
}
