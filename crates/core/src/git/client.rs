//! Git operations via the `git` command-line binary.
//!
//! Every call is read-only and bounded by a timeout; a command that runs
//! past it is killed and reported as [`GitError::Timeout`].

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use chrono::{TimeZone, Utc};
use tokio::process::Command;
use tracing::{debug, instrument, warn};

use super::worktree::find_worktree_in;
use super::{GitInterop, MainLineHistory};
use crate::errors::GitError;
use crate::timeline::MainLineCommit;

/// Default upper bound on a single git command.
pub const DEFAULT_GIT_TIMEOUT: Duration = Duration::from_secs(30);

const RECORD_SEP: char = '\u{1e}';
const FIELD_SEP: char = '\u{1f}';
const LOG_FORMAT: &str = "--format=%x1e%H%x1f%ct%x1f%an%x1f%s";

/// Outcome of reading a path at a ref, keeping the two "absent" cases apart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileAtRef {
    Present(String),
    /// The ref exists but the path does not exist in it.
    PathAbsent,
    /// The ref itself does not resolve to a commit.
    RefAbsent,
}

/// Raw result of one git invocation.
struct GitOutput {
    exit_code: i32,
    stdout: Vec<u8>,
    stderr: String,
}

impl GitOutput {
    fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Stdout of a plumbing command (hashes, paths, log records).
    fn text(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }
}

/// Git client shelling out to `git`.
#[derive(Debug, Clone)]
pub struct GitCli {
    binary: String,
    worktrees_dir: PathBuf,
    timeout: Duration,
}

impl GitCli {
    /// `worktrees_dir` is relative to the project directory.
    pub fn new(worktrees_dir: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            binary: "git".into(),
            worktrees_dir: worktrees_dir.into(),
            timeout,
        }
    }

    /// Use a different git executable.
    pub fn with_binary(mut self, binary: impl Into<String>) -> Self {
        self.binary = binary.into();
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Read `file_path` at `rev`, distinguishing a missing ref from a
    /// missing path.
    #[instrument(skip(self), fields(dir = %repo_dir.display()))]
    pub async fn file_at_ref(
        &self,
        repo_dir: &Path,
        file_path: &str,
        rev: &str,
    ) -> Result<FileAtRef, GitError> {
        if self.verify_commit(repo_dir, rev).await?.is_none() {
            debug!("ref does not exist");
            return Ok(FileAtRef::RefAbsent);
        }

        let object = format!("{}:{}", rev, file_path.trim_start_matches("./"));
        // The ref is known good here, so a failing existence check means
        // the path is not in that tree.
        let exists = self.run_git_raw(repo_dir, &["cat-file", "-e", &object]).await?;
        if !exists.success() {
            debug!("path does not exist at ref");
            return Ok(FileAtRef::PathAbsent);
        }

        let blob = self.run_git_bytes(repo_dir, &["cat-file", "blob", &object]).await?;
        Ok(FileAtRef::Present(decode_blob(file_path, rev, blob)?))
    }

    /// Full hash of `rev` if it names a commit.
    async fn verify_commit(&self, repo_dir: &Path, rev: &str) -> Result<Option<String>, GitError> {
        let object = format!("{}^{{commit}}", rev);
        let out = self
            .run_git_raw(repo_dir, &["rev-parse", "--verify", "--quiet", &object])
            .await?;
        match out.exit_code {
            0 => Ok(Some(out.text().trim().to_string())),
            // --quiet: non-existent refs exit 1 with no output
            1 => Ok(None),
            exit_code => Err(GitError::CommandFailed {
                exit_code,
                stderr: out.stderr,
            }),
        }
    }

    // -----------------------------------------------------------------------
    // Subprocess plumbing
    // -----------------------------------------------------------------------

    async fn run_git(&self, dir: &Path, args: &[&str]) -> Result<String, GitError> {
        let stdout = self.run_git_bytes(dir, args).await?;
        Ok(String::from_utf8_lossy(&stdout).into_owned())
    }

    /// Like [`Self::run_git`] but hands back stdout untouched.
    async fn run_git_bytes(&self, dir: &Path, args: &[&str]) -> Result<Vec<u8>, GitError> {
        let out = self.run_git_raw(dir, args).await?;
        if !out.success() {
            warn!(exit_code = out.exit_code, stderr = %out.stderr, "git command failed");
            return Err(GitError::CommandFailed {
                exit_code: out.exit_code,
                stderr: out.stderr,
            });
        }
        Ok(out.stdout)
    }

    /// Run git and return its output whatever the exit status.
    async fn run_git_raw(&self, dir: &Path, args: &[&str]) -> Result<GitOutput, GitError> {
        let mut cmd = Command::new(&self.binary);
        cmd.current_dir(dir)
            .args(args)
            .env("GIT_TERMINAL_PROMPT", "0")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let command = format!("{} {}", self.binary, args.join(" "));
        debug!(cmd = %command, dir = %dir.display(), "running git command");

        let output = match tokio::time::timeout(self.timeout, cmd.output()).await {
            Ok(result) => result.map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    GitError::BinaryNotFound(self.binary.clone())
                } else {
                    GitError::IoError(e)
                }
            })?,
            Err(_) => {
                warn!(cmd = %command, secs = self.timeout.as_secs(), "git command timed out");
                return Err(GitError::Timeout {
                    command,
                    secs: self.timeout.as_secs(),
                });
            }
        };

        Ok(GitOutput {
            exit_code: output.status.code().unwrap_or(-1),
            stdout: output.stdout,
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        })
    }

    async fn log(&self, repo_dir: &Path, extra: &[&str]) -> Result<Vec<MainLineCommit>, GitError> {
        let mut args = vec!["log", "-m", "--first-parent", "--name-only", LOG_FORMAT];
        args.extend_from_slice(extra);
        let out = self.run_git(repo_dir, &args).await?;
        parse_log(&out)
    }
}

impl Default for GitCli {
    fn default() -> Self {
        Self::new(".worktrees", DEFAULT_GIT_TIMEOUT)
    }
}

// ---------------------------------------------------------------------------
// Trait implementations
// ---------------------------------------------------------------------------

impl GitInterop for GitCli {
    async fn find_worktree(&self, project_dir: &Path, task_id: &str) -> Option<PathBuf> {
        let root = project_dir.join(&self.worktrees_dir);
        find_worktree_in(&root, task_id)
    }

    async fn get_file_from_branch(
        &self,
        project_dir: &Path,
        file_path: &str,
        branch: &str,
    ) -> Result<Option<String>, GitError> {
        match self.file_at_ref(project_dir, file_path, branch).await? {
            FileAtRef::Present(content) => Ok(Some(content)),
            FileAtRef::PathAbsent | FileAtRef::RefAbsent => Ok(None),
        }
    }
}

impl MainLineHistory for GitCli {
    #[instrument(skip(self), fields(dir = %repo_dir.display()))]
    async fn resolve_commit(
        &self,
        repo_dir: &Path,
        rev: &str,
    ) -> Result<Option<MainLineCommit>, GitError> {
        let Some(hash) = self.verify_commit(repo_dir, rev).await? else {
            return Ok(None);
        };
        let mut commits = self.log(repo_dir, &["-1", &hash]).await?;
        Ok(commits.pop())
    }

    async fn main_head(
        &self,
        repo_dir: &Path,
        branch: &str,
    ) -> Result<Option<MainLineCommit>, GitError> {
        self.resolve_commit(repo_dir, branch).await
    }

    #[instrument(skip(self), fields(dir = %repo_dir.display()))]
    async fn merge_base(&self, repo_dir: &Path, a: &str, b: &str) -> Result<Option<String>, GitError> {
        let out = self.run_git_raw(repo_dir, &["merge-base", a, b]).await?;
        match out.exit_code {
            0 => Ok(Some(out.text().trim().to_string())),
            1 if out.stderr.is_empty() => Ok(None),
            exit_code => Err(GitError::CommandFailed {
                exit_code,
                stderr: out.stderr,
            }),
        }
    }

    #[instrument(skip(self), fields(dir = %worktree.display()))]
    async fn changed_files_since(&self, worktree: &Path, base: &str) -> Result<Vec<String>, GitError> {
        // Working tree against base covers committed and uncommitted edits.
        let tracked = self
            .run_git(worktree, &["diff", "--name-only", "--no-renames", base])
            .await?;
        let untracked = self
            .run_git(worktree, &["ls-files", "--others", "--exclude-standard"])
            .await?;

        let files: BTreeSet<String> = tracked
            .lines()
            .chain(untracked.lines())
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect();
        Ok(files.into_iter().collect())
    }

    #[instrument(skip(self), fields(dir = %repo_dir.display()))]
    async fn main_commits_since(
        &self,
        repo_dir: &Path,
        base: &str,
        branch: &str,
    ) -> Result<Vec<MainLineCommit>, GitError> {
        let range = format!("{}..{}", base, branch);
        self.log(repo_dir, &["--reverse", &range]).await
    }
}

// ---------------------------------------------------------------------------
// Output parsing
// ---------------------------------------------------------------------------

/// File content must be valid UTF-8; a lossy decode would hash bytes that
/// are not in the repository.
fn decode_blob(file_path: &str, rev: &str, blob: Vec<u8>) -> Result<String, GitError> {
    String::from_utf8(blob).map_err(|e| {
        GitError::InvalidOutput(format!(
            "{} at {} is not valid UTF-8 (byte {})",
            file_path,
            rev,
            e.utf8_error().valid_up_to()
        ))
    })
}

/// Parse `git log --name-only` output produced with [`LOG_FORMAT`].
fn parse_log(output: &str) -> Result<Vec<MainLineCommit>, GitError> {
    let mut commits = Vec::new();
    for record in output.split(RECORD_SEP) {
        let mut lines = record.lines();
        let Some(header) = lines.next().filter(|h| !h.trim().is_empty()) else {
            continue;
        };

        let fields: Vec<&str> = header.splitn(4, FIELD_SEP).collect();
        if fields.len() != 4 {
            return Err(GitError::InvalidOutput(format!("malformed log header: {}", header)));
        }
        let secs: i64 = fields[1]
            .trim()
            .parse()
            .map_err(|_| GitError::InvalidOutput(format!("bad commit timestamp: {}", fields[1])))?;
        let timestamp = Utc
            .timestamp_opt(secs, 0)
            .single()
            .ok_or_else(|| GitError::InvalidOutput(format!("timestamp out of range: {}", secs)))?;

        let mut files: Vec<String> = lines
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect();
        files.dedup();

        commits.push(MainLineCommit {
            hash: fields[0].trim().to_string(),
            timestamp,
            author: Some(fields[2].to_string()).filter(|a| !a.is_empty()),
            summary: fields[3].to_string(),
            files,
        });
    }
    Ok(commits)
}
