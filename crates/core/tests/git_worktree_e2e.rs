//! End-to-end tests against real git repositories.
//!
//! Repositories are built with `git2`; the code under test drives the
//! `git` binary through `GitCli`. Worktrees are created with
//! `git worktree add`.
//!
//! Tests skip gracefully if `git` is not installed.

use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use git2::{Repository, RepositoryInitOptions, Signature, Time};
use tempfile::TempDir;

use taskweave_core::git::{FileAtRef, GitCli, GitInterop, MainLineHistory};
use taskweave_core::{CoordinatorConfig, MergeCoordinator, TrackingError};

// ===========================================================================
// Helpers
// ===========================================================================

fn git_available() -> bool {
    Command::new("git")
        .arg("--version")
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

const EPOCH: i64 = 1_700_000_000;

fn init_repo(dir: &Path) -> Repository {
    let mut opts = RepositoryInitOptions::new();
    opts.initial_head("main");
    Repository::init_opts(dir, &opts).expect("failed to init repo")
}

/// Write `files` into the repo's working directory and commit them on HEAD.
fn commit_files(repo: &Repository, files: &[(&str, &str)], message: &str, offset: i64) -> String {
    let workdir = repo.workdir().expect("bare repo").to_path_buf();
    let mut index = repo.index().unwrap();
    for (path, content) in files {
        let full = workdir.join(path);
        if let Some(parent) = full.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(&full, content).unwrap();
        index.add_path(Path::new(path)).unwrap();
    }
    index.write().unwrap();
    let tree = repo.find_tree(index.write_tree().unwrap()).unwrap();
    let sig = Signature::new("Test Dev", "dev@example.com", &Time::new(EPOCH + offset, 0)).unwrap();
    let parent = repo.head().ok().and_then(|h| h.peel_to_commit().ok());
    let parents: Vec<&git2::Commit> = parent.iter().collect();
    repo.commit(Some("HEAD"), &sig, &sig, message, &tree, &parents)
        .unwrap()
        .to_string()
}

fn add_worktree(project: &Path, name: &str, base: &str) -> PathBuf {
    let rel = format!(".worktrees/{}", name);
    let status = Command::new("git")
        .current_dir(project)
        .args(["worktree", "add", "-b", name, &rel, base])
        .status()
        .expect("failed to run git worktree add");
    assert!(status.success(), "git worktree add failed");
    project.join(rel)
}

fn git() -> GitCli {
    GitCli::new(".worktrees", Duration::from_secs(30))
}

// ===========================================================================
// File-at-ref
// ===========================================================================

#[tokio::test]
async fn test_get_file_from_branch_present_and_absent() {
    if !git_available() {
        eprintln!("skipping: git not available");
        return;
    }
    let tmp = TempDir::new().unwrap();
    let repo = init_repo(tmp.path());
    commit_files(&repo, &[("src/utils.ts", "export const a = 1;\n")], "initial", 0);

    let git = git();
    let content = git
        .get_file_from_branch(tmp.path(), "src/utils.ts", "main")
        .await
        .unwrap();
    assert_eq!(content.as_deref(), Some("export const a = 1;\n"));

    // Never existed on the branch.
    let missing = git
        .get_file_from_branch(tmp.path(), "src/never.ts", "main")
        .await
        .unwrap();
    assert_eq!(missing, None);

    // Branch does not exist: also absent.
    let no_branch = git
        .get_file_from_branch(tmp.path(), "src/utils.ts", "no-such-branch")
        .await
        .unwrap();
    assert_eq!(no_branch, None);

    // The richer call keeps the two cases apart.
    assert_eq!(
        git.file_at_ref(tmp.path(), "src/never.ts", "main").await.unwrap(),
        FileAtRef::PathAbsent
    );
    assert_eq!(
        git.file_at_ref(tmp.path(), "src/utils.ts", "no-such-branch").await.unwrap(),
        FileAtRef::RefAbsent
    );
}

#[tokio::test]
async fn test_resolve_commit_reports_touched_files() {
    if !git_available() {
        eprintln!("skipping: git not available");
        return;
    }
    let tmp = TempDir::new().unwrap();
    let repo = init_repo(tmp.path());
    commit_files(&repo, &[("a.rs", "a")], "first", 0);
    let second = commit_files(&repo, &[("b.rs", "b"), ("dir/c.rs", "c")], "second", 60);

    let git = git();
    let commit = git.resolve_commit(tmp.path(), &second).await.unwrap().unwrap();
    assert_eq!(commit.hash, second);
    assert_eq!(commit.summary, "second");
    assert_eq!(commit.timestamp.timestamp(), EPOCH + 60);
    assert_eq!(commit.author.as_deref(), Some("Test Dev"));
    let mut files = commit.files.clone();
    files.sort();
    assert_eq!(files, vec!["b.rs", "dir/c.rs"]);

    assert!(git.resolve_commit(tmp.path(), "deadbeef").await.unwrap().is_none());
}

// ===========================================================================
// Worktree lifecycle
// ===========================================================================

#[tokio::test]
async fn test_initialize_from_worktree_and_drift() {
    if !git_available() {
        eprintln!("skipping: git not available");
        return;
    }
    let tmp = TempDir::new().unwrap();
    let project = tmp.path();
    let repo = init_repo(project);
    let c1 = commit_files(&repo, &[("main.go", "package main\n"), ("util.go", "package util\n")], "c1", 0);

    let wt = add_worktree(project, "task-A", &c1);

    // The task edits main.go (uncommitted) and adds an untracked file.
    std::fs::write(wt.join("main.go"), "package main\n\nfunc run() {}\n").unwrap();
    std::fs::write(wt.join("new.go"), "package main\n").unwrap();

    // Three main-line commits touch main.go after the branch point.
    commit_files(&repo, &[("main.go", "package main // 2\n")], "c2", 60);
    commit_files(&repo, &[("main.go", "package main // 3\n")], "c3", 120);
    let c4 = commit_files(&repo, &[("main.go", "package main // 4\n")], "c4", 180);

    let mut coordinator = MergeCoordinator::new(project, CoordinatorConfig::default(), git());
    let found = coordinator.find_worktree("task-A").await.unwrap();
    assert_eq!(found.canonicalize().unwrap(), wt.canonicalize().unwrap());

    let files = coordinator
        .initialize_from_worktree("task-A", &found, "add run()", "Add run")
        .await
        .unwrap();
    assert_eq!(files, vec!["main.go", "new.go"]);

    let drift = coordinator.timeline().get_task_drift("task-A");
    assert_eq!(drift["main.go"], 3);
    assert_eq!(drift["new.go"], 0);
    assert!(!drift.contains_key("util.go"));

    // Re-notifying a replayed commit is a no-op.
    coordinator.on_main_branch_commit(&c4).await.unwrap();
    assert_eq!(coordinator.timeline().get_task_drift("task-A")["main.go"], 3);

    // A fresh commit advances drift by one.
    let c5 = commit_files(&repo, &[("main.go", "package main // 5\n")], "c5", 240);
    coordinator.on_main_branch_commit(&c5).await.unwrap();
    assert_eq!(coordinator.timeline().get_task_drift("task-A")["main.go"], 4);

    let ctx = coordinator
        .timeline()
        .get_merge_context("task-A", "main.go")
        .unwrap();
    assert_eq!(ctx.task_branch_point.commit_hash, c1);
    assert_eq!(ctx.current_main_commit, c5);
    assert_eq!(ctx.total_commits_behind, 4);

    // Baseline is the content at the branch point, not the current main.
    assert_eq!(
        coordinator
            .evolution()
            .get_baseline_content("main.go")
            .unwrap()
            .as_deref(),
        Some("package main\n")
    );

    coordinator.save().unwrap();
    assert!(coordinator.paths().evolutions_json.exists());
    assert!(coordinator.paths().timelines_json.exists());
}

#[tokio::test]
async fn test_two_worktrees_editing_one_file_conflict() {
    if !git_available() {
        eprintln!("skipping: git not available");
        return;
    }
    let tmp = TempDir::new().unwrap();
    let project = tmp.path();
    let repo = init_repo(project);
    let c1 = commit_files(&repo, &[("main.go", "package main\n")], "c1", 0);

    let wt_a = add_worktree(project, "task-A", &c1);
    let wt_b = add_worktree(project, "task-B", &c1);
    std::fs::write(wt_a.join("main.go"), "package main\n\nfunc a() {}\n").unwrap();
    std::fs::write(wt_b.join("main.go"), "package main\n\nfunc b() {}\n").unwrap();

    let mut coordinator = MergeCoordinator::new(project, CoordinatorConfig::default(), git());
    coordinator
        .initialize_from_worktree("task-A", &wt_a, "add a", "")
        .await
        .unwrap();
    coordinator
        .initialize_from_worktree("task-B", &wt_b, "add b", "")
        .await
        .unwrap();

    let ids = vec!["task-A".to_string(), "task-B".to_string()];
    assert_eq!(coordinator.evolution().get_conflicting_files(&ids), vec!["main.go"]);

    let regions = coordinator.detect_conflicts(&ids);
    assert_eq!(regions.len(), 1);
    assert_eq!(regions[0].file_path, "main.go");
    assert!(!regions[0].can_auto_merge);
}

#[tokio::test]
async fn test_initialize_from_missing_worktree_fails() {
    if !git_available() {
        eprintln!("skipping: git not available");
        return;
    }
    let tmp = TempDir::new().unwrap();
    let repo = init_repo(tmp.path());
    commit_files(&repo, &[("a.rs", "a")], "first", 0);

    let mut coordinator = MergeCoordinator::new(tmp.path(), CoordinatorConfig::default(), git());
    let err = coordinator
        .initialize_from_worktree("ghost", &tmp.path().join(".worktrees/ghost"), "", "")
        .await
        .unwrap_err();
    assert!(matches!(err, TrackingError::WorktreeNotFound(_)));
}

#[tokio::test]
async fn test_unknown_commit_notification_is_an_error() {
    if !git_available() {
        eprintln!("skipping: git not available");
        return;
    }
    let tmp = TempDir::new().unwrap();
    let repo = init_repo(tmp.path());
    commit_files(&repo, &[("a.rs", "a")], "first", 0);

    let mut coordinator = MergeCoordinator::new(tmp.path(), CoordinatorConfig::default(), git());
    let err = coordinator
        .on_main_branch_commit("0123456789abcdef0123456789abcdef01234567")
        .await
        .unwrap_err();
    assert!(matches!(err, TrackingError::CommitNotFound(_)));
}
