use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

/// Find the worktree for `task_id` under `worktrees_root`.
///
/// A directory named exactly `task_id` wins. Otherwise the
/// lexicographically first directory whose name contains `task_id` is
/// returned, so `task-1` resolves the same way on every filesystem even
/// when `task-10-foo` also exists.
pub fn find_worktree_in(worktrees_root: &Path, task_id: &str) -> Option<PathBuf> {
    if task_id.is_empty() {
        return None;
    }

    let entries = match fs::read_dir(worktrees_root) {
        Ok(entries) => entries,
        Err(e) => {
            debug!(root = %worktrees_root.display(), error = %e, "no worktrees directory");
            return None;
        }
    };

    let mut candidates: Vec<(String, PathBuf)> = entries
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().map(|t| t.is_dir()).unwrap_or(false))
        .filter_map(|entry| {
            let name = entry.file_name().to_string_lossy().into_owned();
            name.contains(task_id).then(|| (name, entry.path()))
        })
        .collect();

    if let Some((_, path)) = candidates.iter().find(|(name, _)| name == task_id) {
        return Some(path.clone());
    }

    candidates.sort_by(|a, b| a.0.cmp(&b.0));
    if candidates.len() > 1 {
        warn!(
            task = %task_id,
            candidates = candidates.len(),
            chosen = %candidates[0].0,
            "multiple worktrees match task id"
        );
    }
    candidates.into_iter().next().map(|(_, path)| path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lexicographic_first_substring_match() {
        let tmp = tempfile::tempdir().unwrap();
        for name in ["zz-task-7", "aa-task-7", "task-8"] {
            fs::create_dir(tmp.path().join(name)).unwrap();
        }
        let found = find_worktree_in(tmp.path(), "task-7").unwrap();
        assert_eq!(found.file_name().unwrap(), "aa-task-7");
    }

    #[test]
    fn test_exact_match_beats_prefix_collision() {
        let tmp = tempfile::tempdir().unwrap();
        for name in ["task-1", "task-10-foo", "a-task-1"] {
            fs::create_dir(tmp.path().join(name)).unwrap();
        }
        let found = find_worktree_in(tmp.path(), "task-1").unwrap();
        assert_eq!(found.file_name().unwrap(), "task-1");
    }

    #[test]
    fn test_files_and_missing_root_are_ignored() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(tmp.path().join("task-3.log"), "").unwrap();
        assert!(find_worktree_in(tmp.path(), "task-3").is_none());
        assert!(find_worktree_in(&tmp.path().join("missing"), "task-3").is_none());
        assert!(find_worktree_in(tmp.path(), "").is_none());
    }
}
