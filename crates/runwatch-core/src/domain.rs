//! Run, job and workflow snapshots as reported by the CI provider.
//!
//! The provider owns all of this state; the client only ever holds
//! snapshots. Field names follow the `gh --json` output (camelCase).

use std::fmt;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{Result, RunwatchError};

/// Identifies a triggerable workflow, either by numeric ID or by file name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowDefinition {
    Id(u64),
    File(String),
}

impl WorkflowDefinition {
    /// Resolve a user-supplied workflow argument.
    ///
    /// All-digit arguments are workflow IDs. A path (anything containing a
    /// separator) must exist under `project_root` and dispatches by its file
    /// name. A bare file name is handed to the provider unchanged.
    pub fn resolve(arg: &str, project_root: &Path) -> Result<Self> {
        let arg = arg.trim();
        if arg.is_empty() {
            return Err(RunwatchError::InvalidInput(
                "workflow must not be empty".to_string(),
            ));
        }

        if arg.chars().all(|c| c.is_ascii_digit()) {
            let id = arg
                .parse::<u64>()
                .map_err(|e| RunwatchError::InvalidInput(format!("workflow ID {arg}: {e}")))?;
            return Ok(WorkflowDefinition::Id(id));
        }

        if !arg.contains('/') && !arg.contains('\\') {
            return Ok(WorkflowDefinition::File(arg.to_string()));
        }

        let path = project_root.join(arg);
        if !path.is_file() {
            return Err(RunwatchError::WorkflowNotFound(path));
        }
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| RunwatchError::InvalidInput(format!("not a workflow file: {arg}")))?;
        Ok(WorkflowDefinition::File(name))
    }

    /// The identifier passed to `gh workflow run` / `gh run list --workflow`.
    pub fn selector(&self) -> String {
        match self {
            WorkflowDefinition::Id(id) => id.to_string(),
            WorkflowDefinition::File(name) => name.clone(),
        }
    }
}

impl fmt::Display for WorkflowDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.selector())
    }
}

/// Lifecycle state of a run or job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum RunStatus {
    Queued,
    InProgress,
    Completed,
    /// Provider states without a dedicated variant (`waiting`, `requested`, ...).
    Other(String),
}

impl RunStatus {
    pub fn as_str(&self) -> &str {
        match self {
            RunStatus::Queued => "queued",
            RunStatus::InProgress => "in_progress",
            RunStatus::Completed => "completed",
            RunStatus::Other(s) => s,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, RunStatus::Completed)
    }
}

impl From<String> for RunStatus {
    fn from(s: String) -> Self {
        match s.as_str() {
            "queued" => RunStatus::Queued,
            "in_progress" => RunStatus::InProgress,
            "completed" => RunStatus::Completed,
            _ => RunStatus::Other(s),
        }
    }
}

impl From<RunStatus> for String {
    fn from(s: RunStatus) -> Self {
        s.as_str().to_string()
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal outcome of a completed run or job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Conclusion {
    Success,
    Failure,
    Cancelled,
    /// `skipped`, `timed_out`, `neutral`, `action_required`, ...
    Other(String),
}

impl Conclusion {
    pub fn as_str(&self) -> &str {
        match self {
            Conclusion::Success => "success",
            Conclusion::Failure => "failure",
            Conclusion::Cancelled => "cancelled",
            Conclusion::Other(s) => s,
        }
    }

    /// Jobs with these conclusions get their logs collected.
    pub fn needs_logs(&self) -> bool {
        matches!(self, Conclusion::Failure | Conclusion::Cancelled)
    }
}

impl From<String> for Conclusion {
    fn from(s: String) -> Self {
        match s.as_str() {
            "success" => Conclusion::Success,
            "failure" => Conclusion::Failure,
            "cancelled" => Conclusion::Cancelled,
            _ => Conclusion::Other(s),
        }
    }
}

impl From<Conclusion> for String {
    fn from(c: Conclusion) -> Self {
        c.as_str().to_string()
    }
}

impl fmt::Display for Conclusion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `gh` reports an unfinished conclusion as `""` (sometimes `null`).
fn optional_conclusion<'de, D>(deserializer: D) -> std::result::Result<Option<Conclusion>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    Ok(raw.filter(|s| !s.is_empty()).map(Conclusion::from))
}

/// Lightweight status snapshot fetched on every poll iteration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusSnapshot {
    pub status: RunStatus,

    /// Meaningful only when `status` is `Completed`.
    #[serde(default, deserialize_with = "optional_conclusion")]
    pub conclusion: Option<Conclusion>,

    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl StatusSnapshot {
    pub fn new(status: RunStatus, conclusion: Option<Conclusion>) -> Self {
        Self {
            status,
            conclusion,
            updated_at: None,
        }
    }
}

/// Descriptive metadata about a run, printed as the monitor header.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunMetadata {
    #[serde(default)]
    pub workflow_name: String,

    #[serde(default)]
    pub head_branch: String,

    #[serde(default)]
    pub event: String,

    #[serde(default)]
    pub url: String,
}

/// One sub-job of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobSummary {
    #[serde(default)]
    pub name: String,

    pub status: RunStatus,

    #[serde(default, deserialize_with = "optional_conclusion")]
    pub conclusion: Option<Conclusion>,

    #[serde(rename = "databaseId", default)]
    pub job_id: Option<u64>,
}

impl JobSummary {
    pub fn needs_logs(&self) -> bool {
        self.conclusion.as_ref().is_some_and(Conclusion::needs_logs)
    }
}

/// Full run snapshot including the job list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunDetails {
    #[serde(flatten)]
    pub metadata: RunMetadata,

    pub status: RunStatus,

    #[serde(default, deserialize_with = "optional_conclusion")]
    pub conclusion: Option<Conclusion>,

    #[serde(default)]
    pub jobs: Vec<JobSummary>,
}

impl RunDetails {
    /// Jobs whose conclusion is `failure` or `cancelled`, in provider order.
    pub fn failed_jobs(&self) -> Vec<&JobSummary> {
        self.jobs.iter().filter(|j| j.needs_logs()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_snapshot_from_gh_json() {
        let json = r#"{"status":"completed","conclusion":"failure","updatedAt":"2026-03-01T10:00:00Z"}"#;
        let snap: StatusSnapshot = serde_json::from_str(json).expect("deserialize");
        assert_eq!(snap.status, RunStatus::Completed);
        assert_eq!(snap.conclusion, Some(Conclusion::Failure));
        assert!(snap.updated_at.is_some());
    }

    #[test]
    fn test_empty_conclusion_is_none() {
        let json = r#"{"status":"in_progress","conclusion":"","updatedAt":"2026-03-01T10:00:00Z"}"#;
        let snap: StatusSnapshot = serde_json::from_str(json).expect("deserialize");
        assert_eq!(snap.status, RunStatus::InProgress);
        assert_eq!(snap.conclusion, None);
    }

    #[test]
    fn test_unknown_status_is_preserved() {
        let snap: StatusSnapshot = serde_json::from_str(r#"{"status":"waiting"}"#).expect("deserialize");
        assert_eq!(snap.status, RunStatus::Other("waiting".to_string()));
        assert!(!snap.status.is_terminal());
    }

    #[test]
    fn test_run_details_failed_jobs() {
        let json = r#"{
            "workflowName": "Build",
            "headBranch": "main",
            "event": "workflow_dispatch",
            "url": "https://github.com/o/r/actions/runs/42",
            "status": "completed",
            "conclusion": "failure",
            "jobs": [
                {"name": "lint", "status": "completed", "conclusion": "success", "databaseId": 1},
                {"name": "build", "status": "completed", "conclusion": "failure", "databaseId": 2},
                {"name": "deploy", "status": "completed", "conclusion": "cancelled", "databaseId": 3},
                {"name": "docs", "status": "completed", "conclusion": "skipped", "databaseId": 4}
            ]
        }"#;
        let details: RunDetails = serde_json::from_str(json).expect("deserialize");
        assert_eq!(details.metadata.workflow_name, "Build");
        let failed: Vec<&str> = details.failed_jobs().iter().map(|j| j.name.as_str()).collect();
        assert_eq!(failed, vec!["build", "deploy"]);
    }

    #[test]
    fn test_workflow_definition_numeric_id() {
        let dir = tempfile::tempdir().unwrap();
        let wf = WorkflowDefinition::resolve("123456", dir.path()).unwrap();
        assert_eq!(wf, WorkflowDefinition::Id(123456));
        assert_eq!(wf.selector(), "123456");
    }

    #[test]
    fn test_workflow_definition_path_must_exist() {
        let dir = tempfile::tempdir().unwrap();
        let err = WorkflowDefinition::resolve(".github/workflows/build.yml", dir.path()).unwrap_err();
        assert!(matches!(err, RunwatchError::WorkflowNotFound(_)));

        let wf_dir = dir.path().join(".github/workflows");
        std::fs::create_dir_all(&wf_dir).unwrap();
        std::fs::write(wf_dir.join("build.yml"), "on: workflow_dispatch\n").unwrap();
        let wf = WorkflowDefinition::resolve(".github/workflows/build.yml", dir.path()).unwrap();
        assert_eq!(wf, WorkflowDefinition::File("build.yml".to_string()));
    }

    #[test]
    fn test_workflow_definition_bare_name_passes_through() {
        let dir = tempfile::tempdir().unwrap();
        let wf = WorkflowDefinition::resolve("release.yml", dir.path()).unwrap();
        assert_eq!(wf.selector(), "release.yml");
    }
}
