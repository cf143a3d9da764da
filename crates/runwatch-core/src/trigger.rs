//! Workflow dispatch and run discovery.
//!
//! Dispatching a workflow returns no run id, so after dispatch the trigger
//! lists the workflow's most recent run until one shows up, then records it
//! in the run-reference store.

use std::collections::BTreeMap;

use tracing::{debug, warn};

use crate::clock::pause;
use crate::context::RunwatchContext;
use crate::domain::WorkflowDefinition;
use crate::error::{Result, RunwatchError};
use crate::obs;

/// What to dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriggerRequest {
    pub workflow: WorkflowDefinition,

    /// Branch, tag or SHA. Defaults to the current branch.
    pub git_ref: Option<String>,

    pub inputs: BTreeMap<String, String>,
}

impl TriggerRequest {
    pub fn new(workflow: WorkflowDefinition) -> Self {
        Self {
            workflow,
            git_ref: None,
            inputs: BTreeMap::new(),
        }
    }

    pub fn with_ref(mut self, git_ref: impl Into<String>) -> Self {
        self.git_ref = Some(git_ref.into());
        self
    }

    pub fn with_input(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.inputs.insert(key.into(), value.into());
        self
    }
}

/// Parse `KEY=VALUE` arguments. The value may itself contain `=`.
pub fn parse_inputs<S: AsRef<str>>(raw: &[S]) -> Result<BTreeMap<String, String>> {
    let mut inputs = BTreeMap::new();
    for item in raw {
        let item = item.as_ref();
        let (key, value) = item.split_once('=').ok_or_else(|| {
            RunwatchError::InvalidInput(format!("expected KEY=VALUE, got {item:?}"))
        })?;
        let key = key.trim();
        if key.is_empty() {
            return Err(RunwatchError::InvalidInput(format!(
                "input key must not be empty: {item:?}"
            )));
        }
        inputs.insert(key.to_string(), value.to_string());
    }
    Ok(inputs)
}

/// Result of a trigger: `(success, run_id, message)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriggerOutcome {
    pub success: bool,
    pub run_id: Option<u64>,
    pub message: String,
}

impl TriggerOutcome {
    fn discovered(run_id: u64) -> Self {
        Self {
            success: true,
            run_id: Some(run_id),
            message: format!("Workflow dispatched\nRun ID: {run_id}"),
        }
    }

    fn undiscovered(attempts: u32) -> Self {
        Self {
            success: true,
            run_id: None,
            message: format!(
                "Workflow dispatched, but its run ID could not be found after {attempts} attempts\n\
                 Check the repository's Actions page for the new run"
            ),
        }
    }

    fn dispatch_failed(detail: &str) -> Self {
        Self {
            success: false,
            run_id: None,
            message: format!("Failed to dispatch workflow\n{detail}"),
        }
    }

    /// Dispatch went through but the run could not be located.
    pub fn is_soft_failure(&self) -> bool {
        self.success && self.run_id.is_none()
    }
}

/// Dispatches workflows and discovers the resulting run.
pub struct WorkflowTrigger;

impl WorkflowTrigger {
    /// Dispatch `request` and resolve the new run id.
    ///
    /// Environment problems are returned as `Err` before anything is
    /// dispatched. A failed dispatch and an exhausted discovery are both
    /// reported through the outcome.
    pub async fn trigger(ctx: &RunwatchContext, request: &TriggerRequest) -> Result<TriggerOutcome> {
        ctx.preflight().await?;

        let git_ref = Self::resolve_ref(ctx, request);
        let workflow = request.workflow.selector();
        debug!(workflow = %workflow, git_ref = %git_ref, "dispatching workflow");

        if let Err(e) = ctx
            .provider
            .dispatch(&request.workflow, &git_ref, &request.inputs)
            .await
        {
            warn!(workflow = %workflow, error = %e, "dispatch failed");
            return Ok(TriggerOutcome::dispatch_failed(e.detail()));
        }
        obs::emit_workflow_dispatched(&workflow, &git_ref, request.inputs.len());

        match Self::discover(ctx, &request.workflow).await {
            Some(run_id) => {
                if let Err(e) = ctx.store.set(run_id) {
                    ctx.console
                        .warn(&format!("could not record run {run_id} as the pending run: {e}"));
                }
                Ok(TriggerOutcome::discovered(run_id))
            }
            None => {
                obs::emit_discovery_exhausted(&workflow, ctx.config.discovery_attempts);
                Ok(TriggerOutcome::undiscovered(ctx.config.discovery_attempts))
            }
        }
    }

    /// Explicit ref, else the current branch, else the configured default.
    fn resolve_ref(ctx: &RunwatchContext, request: &TriggerRequest) -> String {
        request
            .git_ref
            .clone()
            .filter(|r| !r.trim().is_empty())
            .or_else(|| ctx.source_control.current_branch())
            .unwrap_or_else(|| ctx.config.default_branch.clone())
    }

    /// Poll the run list until the newest run id appears, up to the attempt budget.
    async fn discover(ctx: &RunwatchContext, workflow: &WorkflowDefinition) -> Option<u64> {
        let attempts = ctx.config.discovery_attempts;
        pause(ctx.clock.as_ref(), ctx.config.dispatch_settle(), &ctx.cancel).await;

        for attempt in 1..=attempts {
            if ctx.cancel.is_cancelled() {
                debug!(attempt, "discovery interrupted");
                return None;
            }

            match ctx.provider.list_runs(workflow, 1).await {
                Ok(ids) => {
                    if let Some(&run_id) = ids.first() {
                        obs::emit_run_discovered(&workflow.selector(), run_id, attempt);
                        return Some(run_id);
                    }
                    debug!(attempt, "no run listed yet");
                }
                Err(e) => debug!(attempt, error = %e, "run list failed"),
            }

            if attempt < attempts {
                pause(ctx.clock.as_ref(), ctx.config.discovery_interval(), &ctx.cancel).await;
            }
        }
        None
    }
}
