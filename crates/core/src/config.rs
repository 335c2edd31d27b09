//! TOML-based configuration for taskweave.
//!
//! The file lives at `<project>/.taskweave/config.toml` and is optional:
//! every field has a default, so a missing file means default settings.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::errors::ConfigError;

/// Coordinator settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CoordinatorConfig {
    /// Name of the main-line branch (default "main").
    #[serde(default = "default_main_branch")]
    pub main_branch: String,

    /// Directory holding task worktrees, relative to the project root
    /// (default ".worktrees").
    #[serde(default = "default_worktrees_dir")]
    pub worktrees_dir: PathBuf,

    /// State directory name under the project root (default ".taskweave").
    #[serde(default = "default_state_dir")]
    pub state_dir: String,

    /// Upper bound on any single git command, in seconds (default 30).
    #[serde(default = "default_git_timeout_secs")]
    pub git_timeout_secs: u64,

    /// Log level filter used when `RUST_LOG` is unset (default "warn").
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Glob patterns for files that are never tracked.
    #[serde(default)]
    pub ignore_patterns: Vec<String>,
}

fn default_main_branch() -> String {
    "main".into()
}
fn default_worktrees_dir() -> PathBuf {
    PathBuf::from(".worktrees")
}
fn default_state_dir() -> String {
    crate::store::DEFAULT_STATE_DIR.into()
}
fn default_git_timeout_secs() -> u64 {
    30
}
fn default_log_level() -> String {
    "warn".into()
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            main_branch: default_main_branch(),
            worktrees_dir: default_worktrees_dir(),
            state_dir: default_state_dir(),
            git_timeout_secs: default_git_timeout_secs(),
            log_level: default_log_level(),
            ignore_patterns: Vec::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// Loading & validation
// ---------------------------------------------------------------------------

impl CoordinatorConfig {
    /// Load a [`CoordinatorConfig`] from a TOML file at the given path.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        info!(path = %path.display(), "loading configuration");

        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.display().to_string()));
        }

        let contents = std::fs::read_to_string(path)?;
        let config: CoordinatorConfig =
            toml::from_str(&contents).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        debug!("configuration parsed successfully");
        Ok(config)
    }

    /// Load from `path` if it exists, else defaults. Validated either way.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let config = if path.exists() {
            Self::load_from_file(path)?
        } else {
            debug!(path = %path.display(), "no configuration file, using defaults");
            Self::default()
        };
        config.validate()?;
        Ok(config)
    }

    /// Check every field is usable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.main_branch.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "main_branch".into(),
                detail: "main branch must not be empty".into(),
            });
        }
        if self.state_dir.trim().is_empty() || Path::new(&self.state_dir).is_absolute() {
            return Err(ConfigError::InvalidValue {
                field: "state_dir".into(),
                detail: "state directory must be a non-empty relative path".into(),
            });
        }
        if self.worktrees_dir.as_os_str().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "worktrees_dir".into(),
                detail: "worktrees directory must not be empty".into(),
            });
        }
        if self.git_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "git_timeout_secs".into(),
                detail: "git timeout must be > 0".into(),
            });
        }
        if let Some(bad) = self.ignore_patterns.iter().find(|p| p.trim().is_empty()) {
            return Err(ConfigError::InvalidValue {
                field: "ignore_patterns".into(),
                detail: format!("empty pattern {:?}", bad),
            });
        }
        Ok(())
    }

    pub fn git_timeout(&self) -> Duration {
        Duration::from_secs(self.git_timeout_secs)
    }

    /// Whether `file_path` matches one of the ignore patterns.
    pub fn is_ignored(&self, file_path: &str) -> bool {
        self.ignore_patterns
            .iter()
            .any(|pattern| glob_match::glob_match(pattern, file_path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn sample_toml() -> &'static str {
        r#"
main_branch = "trunk"
worktrees_dir = ".auto-claude/worktrees/tasks"
state_dir = ".weave"
git_timeout_secs = 5
log_level = "debug"
ignore_patterns = ["**/*.lock", "dist/**"]
"#
    }

    #[test]
    fn test_parse_full_config() {
        let config: CoordinatorConfig = toml::from_str(sample_toml()).expect("failed to parse toml");
        assert_eq!(config.main_branch, "trunk");
        assert_eq!(config.worktrees_dir, PathBuf::from(".auto-claude/worktrees/tasks"));
        assert_eq!(config.state_dir, ".weave");
        assert_eq!(config.git_timeout(), Duration::from_secs(5));
        assert_eq!(config.ignore_patterns.len(), 2);
    }

    #[test]
    fn test_defaults() {
        let config: CoordinatorConfig = toml::from_str("").unwrap();
        assert_eq!(config, CoordinatorConfig::default());
        assert_eq!(config.main_branch, "main");
        assert_eq!(config.worktrees_dir, PathBuf::from(".worktrees"));
        assert_eq!(config.state_dir, ".taskweave");
        assert_eq!(config.git_timeout_secs, 30);
        assert_eq!(config.log_level, "warn");
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(sample_toml().as_bytes()).unwrap();

        let config = CoordinatorConfig::load_from_file(&path).expect("load_from_file failed");
        assert_eq!(config.log_level, "debug");
    }

    #[test]
    fn test_file_not_found() {
        let result = CoordinatorConfig::load_from_file("/nonexistent/config.toml");
        assert!(matches!(result, Err(ConfigError::FileNotFound(_))));

        let config = CoordinatorConfig::load_or_default("/nonexistent/config.toml").unwrap();
        assert_eq!(config.main_branch, "main");
    }

    #[test]
    fn test_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "git_timeout_secs = \"soon\"").unwrap();
        assert!(matches!(
            CoordinatorConfig::load_from_file(&path),
            Err(ConfigError::ParseError(_))
        ));
    }

    #[test]
    fn test_validate_rejects_zero_timeout() {
        let config = CoordinatorConfig {
            git_timeout_secs: 0,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { ref field, .. }) if field == "git_timeout_secs"
        ));
    }

    #[test]
    fn test_validate_rejects_empty_branch() {
        let config = CoordinatorConfig {
            main_branch: "  ".into(),
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { ref field, .. }) if field == "main_branch"
        ));
    }

    #[test]
    fn test_ignore_patterns() {
        let config: CoordinatorConfig = toml::from_str(sample_toml()).unwrap();
        assert!(config.is_ignored("deps/Cargo.lock"));
        assert!(config.is_ignored("web/package.lock"));
        assert!(config.is_ignored("dist/app.js"));
        assert!(!config.is_ignored("src/app.ts"));
    }
}
