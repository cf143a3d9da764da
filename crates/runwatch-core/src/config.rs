//! Runtime configuration.
//!
//! Defaults match the conventions of a project checkout: the pending run id
//! lives in `.github_run_id.txt` and reports go to `workflow_logs/`, both
//! relative to the project root. `RUNWATCH_*` environment variables override
//! the defaults; CLI flags override both.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, RunwatchError};

/// Configuration shared by all runwatch components.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunwatchConfig {
    /// Project checkout the CI run belongs to.
    pub project_root: PathBuf,

    /// Path to the GitHub CLI binary.
    pub gh_binary: String,

    /// Path to the git binary.
    pub git_binary: String,

    /// Run-reference file, relative to `project_root` unless absolute.
    pub state_file: PathBuf,

    /// Report directory, relative to `project_root` unless absolute.
    pub log_dir: PathBuf,

    /// Branch used when the current branch cannot be determined.
    pub default_branch: String,

    /// Pause between dispatch and the first discovery attempt.
    pub dispatch_settle_secs: u64,

    /// Maximum number of discovery attempts after a dispatch.
    pub discovery_attempts: u32,

    /// Pause between discovery attempts.
    pub discovery_interval_secs: u64,

    /// Pause between status polls.
    pub poll_interval_secs: u64,

    /// Bound on each log retrieval strategy.
    pub log_timeout_secs: u64,

    /// Bound on the full-log fetch used when no job failed.
    pub full_log_timeout_secs: u64,
}

impl Default for RunwatchConfig {
    fn default() -> Self {
        Self {
            project_root: PathBuf::from("."),
            gh_binary: "gh".to_string(),
            git_binary: "git".to_string(),
            state_file: PathBuf::from(".github_run_id.txt"),
            log_dir: PathBuf::from("workflow_logs"),
            default_branch: "main".to_string(),
            dispatch_settle_secs: 3,
            discovery_attempts: 10,
            discovery_interval_secs: 2,
            poll_interval_secs: 5,
            log_timeout_secs: 60,
            full_log_timeout_secs: 120,
        }
    }
}

impl RunwatchConfig {
    /// Defaults rooted at `project_root`.
    pub fn new(project_root: impl Into<PathBuf>) -> Self {
        Self {
            project_root: project_root.into(),
            ..Self::default()
        }
    }

    /// Defaults rooted at `project_root`, overlaid with `RUNWATCH_*` variables.
    pub fn from_env(project_root: impl Into<PathBuf>) -> Result<Self> {
        Self::new(project_root).overlay(|key| std::env::var(key).ok())
    }

    /// Apply overrides from a key lookup. Split out from [`from_env`] so the
    /// parsing can be tested without touching the process environment.
    ///
    /// [`from_env`]: RunwatchConfig::from_env
    pub fn overlay<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("RUNWATCH_GH_BIN") {
            self.gh_binary = v;
        }
        if let Some(v) = lookup("RUNWATCH_GIT_BIN") {
            self.git_binary = v;
        }
        if let Some(v) = lookup("RUNWATCH_STATE_FILE") {
            self.state_file = PathBuf::from(v);
        }
        if let Some(v) = lookup("RUNWATCH_LOG_DIR") {
            self.log_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("RUNWATCH_DEFAULT_BRANCH") {
            self.default_branch = v;
        }
        if let Some(v) = lookup("RUNWATCH_POLL_INTERVAL") {
            self.poll_interval_secs = parse_secs("RUNWATCH_POLL_INTERVAL", &v)?;
        }
        if let Some(v) = lookup("RUNWATCH_LOG_TIMEOUT") {
            self.log_timeout_secs = parse_secs("RUNWATCH_LOG_TIMEOUT", &v)?;
        }
        Ok(self)
    }

    /// Absolute (or root-relative) location of the run-reference file.
    pub fn state_path(&self) -> PathBuf {
        resolve(&self.project_root, &self.state_file)
    }

    /// Absolute (or root-relative) location of the report directory.
    pub fn log_dir_path(&self) -> PathBuf {
        resolve(&self.project_root, &self.log_dir)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn dispatch_settle(&self) -> Duration {
        Duration::from_secs(self.dispatch_settle_secs)
    }

    pub fn discovery_interval(&self) -> Duration {
        Duration::from_secs(self.discovery_interval_secs)
    }

    pub fn log_timeout(&self) -> Duration {
        Duration::from_secs(self.log_timeout_secs)
    }

    pub fn full_log_timeout(&self) -> Duration {
        Duration::from_secs(self.full_log_timeout_secs)
    }
}

fn resolve(root: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        root.join(path)
    }
}

fn parse_secs(key: &str, value: &str) -> Result<u64> {
    let secs = value
        .trim()
        .parse::<u64>()
        .map_err(|e| RunwatchError::InvalidInput(format!("{key}={value}: {e}")))?;
    if secs == 0 {
        return Err(RunwatchError::InvalidInput(format!(
            "{key} must be at least 1 second"
        )));
    }
    Ok(secs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_config_default() {
        let config = RunwatchConfig::default();
        assert_eq!(config.gh_binary, "gh");
        assert_eq!(config.default_branch, "main");
        assert_eq!(config.discovery_attempts, 10);
        assert_eq!(config.discovery_interval(), Duration::from_secs(2));
        assert_eq!(config.poll_interval(), Duration::from_secs(5));
        assert_eq!(config.log_timeout(), Duration::from_secs(60));
        assert_eq!(config.full_log_timeout(), Duration::from_secs(120));
    }

    #[test]
    fn test_paths_resolve_against_project_root() {
        let config = RunwatchConfig::new("/work/app");
        assert_eq!(config.state_path(), PathBuf::from("/work/app/.github_run_id.txt"));
        assert_eq!(config.log_dir_path(), PathBuf::from("/work/app/workflow_logs"));
    }

    #[test]
    fn test_absolute_paths_are_kept() {
        let mut config = RunwatchConfig::new("/work/app");
        config.log_dir = PathBuf::from("/var/log/ci");
        assert_eq!(config.log_dir_path(), PathBuf::from("/var/log/ci"));
    }

    #[test]
    fn test_overlay_applies_variables() {
        let vars: HashMap<&str, &str> = [
            ("RUNWATCH_GH_BIN", "/opt/gh"),
            ("RUNWATCH_DEFAULT_BRANCH", "trunk"),
            ("RUNWATCH_POLL_INTERVAL", "10"),
        ]
        .into_iter()
        .collect();

        let config = RunwatchConfig::new("/repo")
            .overlay(|k| vars.get(k).map(|v| v.to_string()))
            .expect("overlay");
        assert_eq!(config.gh_binary, "/opt/gh");
        assert_eq!(config.default_branch, "trunk");
        assert_eq!(config.poll_interval_secs, 10);
        assert_eq!(config.log_timeout_secs, 60);
    }

    #[test]
    fn test_overlay_rejects_bad_numbers() {
        let err = RunwatchConfig::default()
            .overlay(|k| (k == "RUNWATCH_LOG_TIMEOUT").then(|| "soon".to_string()))
            .unwrap_err();
        assert!(err.to_string().contains("RUNWATCH_LOG_TIMEOUT"));

        let err = RunwatchConfig::default()
            .overlay(|k| (k == "RUNWATCH_POLL_INTERVAL").then(|| "0".to_string()))
            .unwrap_err();
        assert!(err.to_string().contains("at least 1 second"));
    }
}
