//! Error types for the taskweave core library.
//!
//! Each subsystem has its own error type derived with `thiserror`, and a
//! top-level [`CoreError`] enum unifies them all for callers that want a
//! single error type.
//!
//! Missing data is never an error here: queries for an untracked file or
//! task return `None` / empty collections. The variants below are reserved
//! for caller precondition violations and interop failures.

use std::path::PathBuf;

use thiserror::Error;

// ---------------------------------------------------------------------------
// Top-level error
// ---------------------------------------------------------------------------

/// Unified error type for the entire core library.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Git(#[from] GitError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Tracking(#[from] TrackingError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

// ---------------------------------------------------------------------------
// Git errors
// ---------------------------------------------------------------------------

/// Errors from git plumbing calls.
///
/// None of these mean "the file is not there": an absent path or ref is
/// reported as `Ok(None)` by the interop layer. Every variant here is an
/// operation that could not be completed and may be retried.
#[derive(Debug, Error)]
pub enum GitError {
    /// The `git` binary was not found on `$PATH`.
    #[error("git binary not found: {0}")]
    BinaryNotFound(String),

    /// A `git` command exited with an unexpected non-zero status.
    #[error("git command failed (exit {exit_code}): {stderr}")]
    CommandFailed { exit_code: i32, stderr: String },

    /// A `git` command did not finish within the configured bound.
    #[error("git command '{command}' timed out after {secs}s")]
    Timeout { command: String, secs: u64 },

    /// `git` produced output we could not interpret.
    #[error("unexpected git output: {0}")]
    InvalidOutput(String),

    /// Generic I/O wrapper.
    #[error("git I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// Store errors
// ---------------------------------------------------------------------------

/// Errors from the on-disk state store (JSON documents, baselines, lock).
#[derive(Debug, Error)]
pub enum StoreError {
    /// Reading or writing a state file failed.
    #[error("state I/O error at '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A state document could not be encoded.
    #[error("failed to serialize '{path}': {detail}")]
    Serialize { path: PathBuf, detail: String },

    /// A state document exists but is not valid JSON for its schema.
    #[error("failed to parse '{path}': {detail}")]
    Parse { path: PathBuf, detail: String },

    /// Another process holds the state lock.
    #[error("state directory is locked by another process ({0})")]
    Locked(PathBuf),
}

// ---------------------------------------------------------------------------
// Tracking errors
// ---------------------------------------------------------------------------

/// Errors from mutating evolution / timeline operations.
#[derive(Debug, Error)]
pub enum TrackingError {
    /// The worktree path given to initialise tracking does not exist.
    #[error("worktree not found at '{0}'")]
    WorktreeNotFound(PathBuf),

    /// A task's file could not be read from its worktree.
    #[error("failed to read '{path}' from worktree: {source}")]
    WorktreeRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A modification was recorded for a file no task has begun on.
    #[error("file is not tracked: {0}")]
    FileNotTracked(String),

    /// A commit or branch named by the caller does not exist.
    #[error("commit not found: {0}")]
    CommitNotFound(String),

    /// Underlying store error while persisting tracking data.
    #[error("tracking store error: {0}")]
    Store(#[from] StoreError),

    /// Underlying git error while reading tracking inputs.
    #[error("tracking git error: {0}")]
    Git(#[from] GitError),
}

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

/// Errors from configuration loading and validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file not found.
    #[error("configuration file not found: {0}")]
    FileNotFound(String),

    /// TOML parse error.
    #[error("configuration parse error: {0}")]
    ParseError(String),

    /// A config value is invalid.
    #[error("invalid configuration value for '{field}': {detail}")]
    InvalidValue { field: String, detail: String },

    /// Generic I/O error reading the config file.
    #[error("configuration I/O error: {0}")]
    IoError(#[from] std::io::Error),
}
