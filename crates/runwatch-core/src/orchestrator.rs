//! End-to-end `run`: trigger a workflow, then follow the run it created.

use std::time::Duration;

use crate::console::banner;
use crate::context::RunwatchContext;
use crate::error::Result;
use crate::poller::{PollOutcome, StatusPoller};
use crate::trigger::{TriggerOutcome, TriggerRequest, WorkflowTrigger};

/// Result of a composed run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// Dispatch failed, or the run could not be located afterwards.
    NotStarted(TriggerOutcome),
    /// The run was found and monitored.
    Monitored { run_id: u64, outcome: PollOutcome },
}

impl RunOutcome {
    pub fn exit_code(&self) -> i32 {
        match self {
            RunOutcome::NotStarted(_) => 1,
            RunOutcome::Monitored { outcome, .. } => outcome.exit_code(),
        }
    }
}

/// Composes [`WorkflowTrigger`] and [`StatusPoller`].
pub struct Orchestrator;

impl Orchestrator {
    /// Trigger `request` and monitor the run it produced.
    ///
    /// Monitoring uses the run id returned by the trigger, never the stored
    /// reference, so a concurrent trigger cannot redirect it. A run that
    /// could not be discovered is a failure here, unlike a standalone trigger.
    pub async fn run(
        ctx: &RunwatchContext,
        request: &TriggerRequest,
        interval: Duration,
    ) -> Result<RunOutcome> {
        let console = ctx.console.as_ref();

        banner(console, "Step 1: Trigger workflow");
        console.blank();
        let triggered = WorkflowTrigger::trigger(ctx, request).await?;
        for line in triggered.message.lines() {
            if triggered.success {
                console.line(line);
            } else {
                console.error(line);
            }
        }
        console.blank();

        let run_id = match (triggered.success, triggered.run_id) {
            (true, Some(run_id)) => run_id,
            (true, None) => {
                console.warn("the workflow was dispatched but its run could not be found; not monitoring");
                return Ok(RunOutcome::NotStarted(triggered));
            }
            (false, _) => return Ok(RunOutcome::NotStarted(triggered)),
        };

        banner(console, "Step 2: Monitor workflow");
        console.blank();
        let outcome = StatusPoller::monitor_run(ctx, run_id, interval).await?;
        Ok(RunOutcome::Monitored { run_id, outcome })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Conclusion, RunStatus, StatusSnapshot, WorkflowDefinition};
    use crate::error::RemoteError;
    use crate::fakes::{test_context, ProviderCall};
    use crate::store::RunRefStore;

    fn request() -> TriggerRequest {
        TriggerRequest::new(WorkflowDefinition::File("build.yml".into()))
    }

    #[tokio::test]
    async fn test_run_monitors_discovered_run() {
        let (ctx, fakes) = test_context();
        fakes.provider.push_list_runs(Ok(vec![42]));
        fakes
            .provider
            .push_status(Ok(StatusSnapshot::new(RunStatus::InProgress, None)));
        fakes.provider.push_status(Ok(StatusSnapshot::new(
            RunStatus::Completed,
            Some(Conclusion::Success),
        )));

        let outcome = Orchestrator::run(&ctx, &request(), Duration::from_secs(5))
            .await
            .unwrap();

        assert_eq!(
            outcome,
            RunOutcome::Monitored {
                run_id: 42,
                outcome: PollOutcome::Succeeded
            }
        );
        assert_eq!(outcome.exit_code(), 0);
        assert!(fakes.console.printed("Step 1: Trigger workflow"));
        assert!(fakes.console.printed("Step 2: Monitor workflow"));
    }

    #[tokio::test]
    async fn test_run_polls_the_triggered_id_not_the_store() {
        let (ctx, fakes) = test_context();
        fakes.provider.push_list_runs(Ok(vec![42]));
        fakes.provider.push_status(Ok(StatusSnapshot::new(
            RunStatus::Completed,
            Some(Conclusion::Success),
        )));

        Orchestrator::run(&ctx, &request(), Duration::from_secs(5))
            .await
            .unwrap();

        // The store was written during the trigger; overwrite it and check the poll target.
        fakes.store.set(7).unwrap();
        assert!(fakes
            .provider
            .calls()
            .contains(&ProviderCall::RunStatus { run_id: 42 }));
        assert_eq!(
            fakes.provider.count(|c| matches!(c, ProviderCall::RunStatus { run_id: 7 })),
            0
        );
    }

    #[tokio::test]
    async fn test_soft_failure_is_strict() {
        let (ctx, fakes) = test_context();

        let outcome = Orchestrator::run(&ctx, &request(), Duration::from_secs(5))
            .await
            .unwrap();

        assert!(matches!(&outcome, RunOutcome::NotStarted(t) if t.is_soft_failure()));
        assert_eq!(outcome.exit_code(), 1);
        assert_eq!(fakes.provider.count(|c| matches!(c, ProviderCall::RunStatus { .. })), 0);
        assert_eq!(fakes.console.warnings().len(), 1);
        assert!(!fakes.console.printed("Step 2: Monitor workflow"));
    }

    #[tokio::test]
    async fn test_dispatch_failure_is_not_monitored() {
        let (ctx, fakes) = test_context();
        fakes
            .provider
            .fail_dispatch(RemoteError::Transient("HTTP 404: workflow not found".into()));

        let outcome = Orchestrator::run(&ctx, &request(), Duration::from_secs(5))
            .await
            .unwrap();

        assert_eq!(outcome.exit_code(), 1);
        assert!(fakes
            .console
            .errors()
            .iter()
            .any(|e| e.contains("workflow not found")));
        assert!(!fakes.console.printed("workflow not found"));
        assert_eq!(fakes.provider.count(|c| matches!(c, ProviderCall::RunMetadata { .. })), 0);
    }

    #[tokio::test]
    async fn test_failed_run_exits_one() {
        let (ctx, fakes) = test_context();
        fakes.provider.push_list_runs(Ok(vec![42]));
        fakes.provider.push_status(Ok(StatusSnapshot::new(
            RunStatus::Completed,
            Some(Conclusion::Failure),
        )));

        let outcome = Orchestrator::run(&ctx, &request(), Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(outcome.exit_code(), 1);
        assert_eq!(fakes.provider.count(|c| matches!(c, ProviderCall::RunDetails { .. })), 1);
    }
}
