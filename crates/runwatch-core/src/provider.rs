//! Remote CI collaborator.
//!
//! [`CiProvider`] is the seam between runwatch and GitHub Actions. Every
//! operation returns a [`RemoteResult`] so callers choose between retrying
//! and aborting without inspecting error strings. [`GhCliProvider`] is the
//! production backend, driving the `gh` CLI.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::debug;

use crate::command::{run_command, CommandSpec};
use crate::domain::{RunDetails, RunMetadata, StatusSnapshot, WorkflowDefinition};
use crate::error::{RemoteError, RemoteResult, Result, RunwatchError};

/// Bound on metadata/status queries so a hung `gh` becomes a transient failure.
const QUERY_TIMEOUT: Duration = Duration::from_secs(30);

const METADATA_FIELDS: &str = "workflowName,headBranch,event,url";
const STATUS_FIELDS: &str = "status,conclusion,updatedAt";
const DETAIL_FIELDS: &str = "jobs,status,conclusion,workflowName,headBranch,event,url";

/// Operations runwatch needs from the CI provider.
#[async_trait]
pub trait CiProvider: Send + Sync {
    /// Verify the client is installed, authenticated and bound to a repository.
    async fn check_environment(&self) -> Result<()>;

    /// Dispatch `workflow` on `git_ref`. Returns no run id.
    async fn dispatch(
        &self,
        workflow: &WorkflowDefinition,
        git_ref: &str,
        inputs: &BTreeMap<String, String>,
    ) -> RemoteResult<()>;

    /// Ids of the most recent runs of `workflow`, newest first.
    async fn list_runs(&self, workflow: &WorkflowDefinition, limit: u32) -> RemoteResult<Vec<u64>>;

    /// Descriptive metadata of a run.
    async fn run_metadata(&self, run_id: u64) -> RemoteResult<RunMetadata>;

    /// Lightweight status snapshot of a run.
    async fn run_status(&self, run_id: u64) -> RemoteResult<StatusSnapshot>;

    /// Run snapshot with the embedded job list.
    async fn run_details(&self, run_id: u64) -> RemoteResult<RunDetails>;

    /// Log of a single job.
    async fn job_log(&self, run_id: u64, job_id: u64, timeout: Duration) -> RemoteResult<String>;

    /// Aggregate log of failed steps only.
    async fn failed_log(&self, run_id: u64, timeout: Duration) -> RemoteResult<String>;

    /// Full unfiltered run log.
    async fn full_log(&self, run_id: u64, timeout: Duration) -> RemoteResult<String>;
}

/// [`CiProvider`] backed by the GitHub CLI.
#[derive(Debug, Clone)]
pub struct GhCliProvider {
    gh: String,
    project_root: PathBuf,
}

#[derive(Deserialize)]
struct RunListEntry {
    #[serde(rename = "databaseId")]
    database_id: Option<u64>,
}

impl GhCliProvider {
    pub fn new(gh: impl Into<String>, project_root: impl Into<PathBuf>) -> Self {
        Self {
            gh: gh.into(),
            project_root: project_root.into(),
        }
    }

    fn command<I, S>(&self, args: I) -> CommandSpec
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        CommandSpec::new(self.gh.clone(), args).in_dir(self.project_root.clone())
    }

    async fn stdout(&self, spec: CommandSpec) -> RemoteResult<String> {
        let output = run_command(&spec).await?;
        output.into_stdout(&spec)
    }

    async fn json<T: DeserializeOwned>(&self, spec: CommandSpec) -> RemoteResult<T> {
        let stdout = self.stdout(spec.with_timeout(QUERY_TIMEOUT)).await?;
        serde_json::from_str(&stdout)
            .map_err(|e| RemoteError::Transient(format!("malformed gh output: {e}")))
    }

    fn view(&self, run_id: u64, fields: &str) -> CommandSpec {
        self.command([
            "run".to_string(),
            "view".to_string(),
            run_id.to_string(),
            "--json".to_string(),
            fields.to_string(),
        ])
    }

    async fn log(&self, mut args: Vec<String>, timeout: Duration) -> RemoteResult<String> {
        let mut full = vec!["run".to_string(), "view".to_string()];
        full.append(&mut args);
        self.stdout(self.command(full).with_timeout(timeout)).await
    }

    async fn gh_succeeds(&self, args: &[&str]) -> RemoteResult<bool> {
        let spec = self.command(args.iter().copied()).with_timeout(QUERY_TIMEOUT);
        Ok(run_command(&spec).await?.success)
    }
}

#[async_trait]
impl CiProvider for GhCliProvider {
    async fn check_environment(&self) -> Result<()> {
        match self.gh_succeeds(&["--version"]).await {
            Ok(true) => {}
            Ok(false) | Err(_) => {
                return Err(RunwatchError::environment(
                    "GitHub CLI (gh) not found",
                    "install it from https://cli.github.com/",
                ))
            }
        }

        if !self.gh_succeeds(&["auth", "status"]).await.unwrap_or(false) {
            return Err(RunwatchError::environment(
                "GitHub CLI is not authenticated",
                "gh auth login",
            ));
        }

        let spec = self
            .command(["repo", "view", "--json", "nameWithOwner", "-q", ".nameWithOwner"])
            .with_timeout(QUERY_TIMEOUT);
        let repo = self.stdout(spec).await.unwrap_or_default();
        if repo.trim().is_empty() {
            return Err(RunwatchError::environment(
                "cannot resolve the GitHub repository",
                "run inside a git checkout with a GitHub remote",
            ));
        }
        debug!(repo = %repo.trim(), "gh environment ok");
        Ok(())
    }

    async fn dispatch(
        &self,
        workflow: &WorkflowDefinition,
        git_ref: &str,
        inputs: &BTreeMap<String, String>,
    ) -> RemoteResult<()> {
        let mut args = vec![
            "workflow".to_string(),
            "run".to_string(),
            workflow.selector(),
            "--ref".to_string(),
            git_ref.to_string(),
        ];
        for (key, value) in inputs {
            args.push("-f".to_string());
            args.push(format!("{key}={value}"));
        }
        self.stdout(self.command(args).with_timeout(QUERY_TIMEOUT))
            .await
            .map(|_| ())
    }

    async fn list_runs(&self, workflow: &WorkflowDefinition, limit: u32) -> RemoteResult<Vec<u64>> {
        let spec = self.command([
            "run".to_string(),
            "list".to_string(),
            "--workflow".to_string(),
            workflow.selector(),
            "--limit".to_string(),
            limit.to_string(),
            "--json".to_string(),
            "databaseId".to_string(),
        ]);
        let entries: Vec<RunListEntry> = self.json(spec).await?;
        Ok(entries.into_iter().filter_map(|e| e.database_id).collect())
    }

    async fn run_metadata(&self, run_id: u64) -> RemoteResult<RunMetadata> {
        let spec = self.view(run_id, METADATA_FIELDS);
        self.json(spec).await
    }

    async fn run_status(&self, run_id: u64) -> RemoteResult<StatusSnapshot> {
        let spec = self.view(run_id, STATUS_FIELDS);
        self.json(spec).await
    }

    async fn run_details(&self, run_id: u64) -> RemoteResult<RunDetails> {
        let spec = self.view(run_id, DETAIL_FIELDS);
        self.json(spec).await
    }

    async fn job_log(&self, run_id: u64, job_id: u64, timeout: Duration) -> RemoteResult<String> {
        self.log(
            vec![
                run_id.to_string(),
                "--log".to_string(),
                "--job".to_string(),
                job_id.to_string(),
            ],
            timeout,
        )
        .await
    }

    async fn failed_log(&self, run_id: u64, timeout: Duration) -> RemoteResult<String> {
        self.log(vec![run_id.to_string(), "--log-failed".to_string()], timeout)
            .await
    }

    async fn full_log(&self, run_id: u64, timeout: Duration) -> RemoteResult<String> {
        self.log(vec![run_id.to_string(), "--log".to_string()], timeout)
            .await
    }
}
