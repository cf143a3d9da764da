//! Status poller: follow a run until it reaches a terminal state.
//!
//! The loop is split in two. [`PollMachine`] is a pure state machine that
//! consumes one status fetch result per iteration and says what happened;
//! [`StatusPoller`] drives it, doing the I/O, printing progress and sleeping
//! through the context's [`Clock`](crate::clock::Clock).
//!
//! There is no iteration or time limit. Transient fetch failures are retried
//! forever; the operator interrupts if the run is unreachable.

use std::path::PathBuf;
use std::time::Duration;

use tracing::{warn, Instrument};

use crate::clock::pause;
use crate::collector::LogCollector;
use crate::console::banner;
use crate::context::RunwatchContext;
use crate::domain::{Conclusion, RunStatus, StatusSnapshot};
use crate::error::{RemoteError, RemoteResult, Result, RunwatchError};
use crate::obs;
use crate::store::resolve_run_id;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// How a single status snapshot is classified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    Queued,
    Running,
    Succeeded,
    /// Completed with any conclusion other than success (or none reported).
    Failed(Option<Conclusion>),
    /// Provider state outside queued/in_progress/completed.
    Other(String),
}

impl Classification {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Classification::Succeeded | Classification::Failed(_))
    }

    /// Text printed after `status:` on the iteration line.
    pub fn label(&self) -> String {
        match self {
            Classification::Queued => "queued...".to_string(),
            Classification::Running => "running...".to_string(),
            Classification::Succeeded => "completed - success".to_string(),
            Classification::Failed(Some(c)) => format!("completed - {c}"),
            Classification::Failed(None) => "completed - no conclusion".to_string(),
            Classification::Other(s) => s.clone(),
        }
    }

    /// Conclusion of a terminal classification; `None` while the run is live.
    pub fn conclusion_label(&self) -> Option<&str> {
        match self {
            Classification::Succeeded => Some("success"),
            Classification::Failed(Some(c)) => Some(c.as_str()),
            Classification::Failed(None) => Some("unknown"),
            _ => None,
        }
    }
}

/// Map a snapshot to exactly one classification.
pub fn classify(snapshot: &StatusSnapshot) -> Classification {
    match &snapshot.status {
        RunStatus::Queued => Classification::Queued,
        RunStatus::InProgress => Classification::Running,
        RunStatus::Completed => match &snapshot.conclusion {
            Some(Conclusion::Success) => Classification::Succeeded,
            other => Classification::Failed(other.clone()),
        },
        RunStatus::Other(s) => Classification::Other(s.clone()),
    }
}

/// What one iteration of the poll loop produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    /// Still running: print the classification and wait for the next iteration.
    Waiting { iteration: u64, classification: Classification },
    /// The status could not be fetched; retry after the interval.
    Unreachable { iteration: u64, error: RemoteError },
    /// Terminal state reached.
    Finished { iteration: u64, classification: Classification },
    /// A non-retryable fetch error.
    Aborted { iteration: u64, error: RemoteError },
}

/// States of the poll loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollState {
    Polling { iteration: u64 },
    Finished { iterations: u64, classification: Classification },
    Aborted { iterations: u64 },
}

/// Pure poll-loop state machine.
#[derive(Debug, Clone)]
pub struct PollMachine {
    state: PollState,
}

impl Default for PollMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl PollMachine {
    pub fn new() -> Self {
        Self {
            state: PollState::Polling { iteration: 0 },
        }
    }

    pub fn state(&self) -> &PollState {
        &self.state
    }

    pub fn is_done(&self) -> bool {
        !matches!(self.state, PollState::Polling { .. })
    }

    /// Feed the result of one status fetch.
    ///
    /// Feeding a machine that is already done is a no-op that repeats the
    /// final transition.
    pub fn observe(&mut self, fetched: RemoteResult<StatusSnapshot>) -> Transition {
        let iteration = match &self.state {
            PollState::Polling { iteration } => iteration + 1,
            PollState::Finished { iterations, classification } => {
                return Transition::Finished {
                    iteration: *iterations,
                    classification: classification.clone(),
                }
            }
            PollState::Aborted { iterations } => {
                return Transition::Aborted {
                    iteration: *iterations,
                    error: RemoteError::Fatal("poll loop already aborted".to_string()),
                }
            }
        };

        match fetched {
            Err(error) if error.is_transient() => {
                self.state = PollState::Polling { iteration };
                Transition::Unreachable { iteration, error }
            }
            Err(error) => {
                self.state = PollState::Aborted { iterations: iteration };
                Transition::Aborted { iteration, error }
            }
            Ok(snapshot) => {
                let classification = classify(&snapshot);
                if classification.is_terminal() {
                    self.state = PollState::Finished {
                        iterations: iteration,
                        classification: classification.clone(),
                    };
                    Transition::Finished {
                        iteration,
                        classification,
                    }
                } else {
                    self.state = PollState::Polling { iteration };
                    Transition::Waiting {
                        iteration,
                        classification,
                    }
                }
            }
        }
    }
}

/// Final result of monitoring a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    Succeeded,
    Failed {
        conclusion: Option<Conclusion>,
        /// Path of the failure report, if it could be written.
        report: Option<PathBuf>,
    },
    /// Stopped by the operator. The remote run is left untouched.
    Interrupted,
}

impl PollOutcome {
    pub fn exit_code(&self) -> i32 {
        match self {
            PollOutcome::Succeeded => 0,
            PollOutcome::Failed { .. } => 1,
            PollOutcome::Interrupted => 130,
        }
    }
}

/// Follows a run to completion.
pub struct StatusPoller;

impl StatusPoller {
    /// Entry point for `monitor`: resolve the run id, check the environment, poll.
    ///
    /// The run id is resolved before anything touches the network, so a
    /// missing id fails with [`RunwatchError::MissingRunId`] and no remote call.
    pub async fn monitor(
        ctx: &RunwatchContext,
        run_id: Option<u64>,
        interval: Duration,
    ) -> Result<PollOutcome> {
        let run_id = resolve_run_id(run_id, ctx.store.as_ref())?;
        ctx.preflight().await?;
        Self::monitor_run(ctx, run_id, interval).await
    }

    /// Poll `run_id` until it completes or the context is cancelled.
    pub async fn monitor_run(
        ctx: &RunwatchContext,
        run_id: u64,
        interval: Duration,
    ) -> Result<PollOutcome> {
        Self::poll(ctx, run_id, interval)
            .instrument(obs::run_span(run_id))
            .await
    }

    async fn poll(ctx: &RunwatchContext, run_id: u64, interval: Duration) -> Result<PollOutcome> {
        let console = ctx.console.as_ref();

        let metadata = ctx
            .provider
            .run_metadata(run_id)
            .await
            .map_err(|e| RunwatchError::RunNotFound {
                run_id,
                detail: e.detail().to_string(),
            })?;

        console.line(&format!("Workflow: {}", metadata.workflow_name));
        console.line(&format!("Branch: {}", metadata.head_branch));
        console.line(&format!("Event: {}", metadata.event));
        if !metadata.url.is_empty() {
            console.line(&format!("URL: {}", metadata.url));
        }
        console.blank();
        console.line(&format!(
            "Monitoring run {run_id} (every {} seconds)...",
            interval.as_secs()
        ));
        console.line("Press Ctrl+C to stop monitoring (the run will not be cancelled)");
        console.blank();

        let mut machine = PollMachine::new();
        loop {
            if ctx.cancel.is_cancelled() {
                console.blank();
                console.line("Monitoring stopped; the run continues remotely");
                return Ok(PollOutcome::Interrupted);
            }

            let fetched = ctx.provider.run_status(run_id).await;
            let timestamp = ctx.clock.now().format(TIMESTAMP_FORMAT).to_string();

            match machine.observe(fetched) {
                Transition::Waiting {
                    iteration,
                    classification,
                } => {
                    obs::emit_poll_snapshot(run_id, iteration, &classification.label(), None);
                    console.line(&format!(
                        "[{timestamp}] [{iteration}] status: {}",
                        classification.label()
                    ));
                }
                Transition::Unreachable { iteration, error } => {
                    obs::emit_poll_fetch_failed(run_id, iteration, &error);
                    console.line(&format!("[{timestamp}] [{iteration}] cannot fetch status"));
                }
                Transition::Aborted { iteration, error } => {
                    obs::emit_poll_fetch_failed(run_id, iteration, &error);
                    return Err(error.into());
                }
                Transition::Finished {
                    iteration,
                    classification,
                } => {
                    obs::emit_poll_snapshot(
                        run_id,
                        iteration,
                        &classification.label(),
                        classification.conclusion_label(),
                    );
                    console.line(&format!(
                        "[{timestamp}] [{iteration}] status: {}",
                        classification.label()
                    ));
                    console.blank();
                    return Ok(Self::finish(ctx, run_id, iteration, classification).await);
                }
            }

            pause(ctx.clock.as_ref(), interval, &ctx.cancel).await;
        }
    }

    async fn finish(
        ctx: &RunwatchContext,
        run_id: u64,
        iterations: u64,
        classification: Classification,
    ) -> PollOutcome {
        let console = ctx.console.as_ref();
        match classification {
            Classification::Succeeded => {
                obs::emit_run_finished(run_id, "success", iterations);
                banner(console, "Workflow succeeded");
                console.blank();
                PollOutcome::Succeeded
            }
            Classification::Failed(conclusion) => {
                let label = conclusion.as_ref().map_or("unknown", Conclusion::as_str);
                obs::emit_run_finished(run_id, label, iterations);
                banner(console, &format!("Workflow failed ({label})"));
                console.blank();

                let report = match LogCollector::try_collect(ctx, run_id).await {
                    Ok(path) => {
                        console.line(&format!("Error log saved to: {}", path.display()));
                        console.line("Collect the logs again with:");
                        console.line(&format!("  runwatch collect-logs {run_id}"));
                        Some(path)
                    }
                    Err(RunwatchError::Interrupted) => {
                        console.line("Log collection stopped");
                        return PollOutcome::Interrupted;
                    }
                    Err(e) => {
                        warn!(run_id, error = %e, "log collection failed");
                        console.warn("failed to collect workflow logs");
                        None
                    }
                };
                console.blank();
                PollOutcome::Failed { conclusion, report }
            }
            // `finish` is only reached with a terminal classification.
            other => PollOutcome::Failed {
                conclusion: Some(Conclusion::Other(other.label())),
                report: None,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::{test_context, ProviderCall};

    fn snap(status: RunStatus, conclusion: Option<Conclusion>) -> StatusSnapshot {
        StatusSnapshot::new(status, conclusion)
    }

    #[test]
    fn test_classification_is_exhaustive_and_exclusive() {
        let cases = [
            (snap(RunStatus::Queued, None), Classification::Queued),
            (snap(RunStatus::InProgress, None), Classification::Running),
            (
                snap(RunStatus::Completed, Some(Conclusion::Success)),
                Classification::Succeeded,
            ),
            (
                snap(RunStatus::Completed, Some(Conclusion::Failure)),
                Classification::Failed(Some(Conclusion::Failure)),
            ),
            (
                snap(RunStatus::Completed, Some(Conclusion::Cancelled)),
                Classification::Failed(Some(Conclusion::Cancelled)),
            ),
            (snap(RunStatus::Completed, None), Classification::Failed(None)),
            (
                snap(RunStatus::Other("waiting".into()), None),
                Classification::Other("waiting".into()),
            ),
        ];
        for (snapshot, expected) in cases {
            assert_eq!(classify(&snapshot), expected, "{snapshot:?}");
        }
    }

    #[test]
    fn test_conclusion_label_only_for_terminal() {
        assert_eq!(Classification::Succeeded.conclusion_label(), Some("success"));
        assert_eq!(
            Classification::Failed(Some(Conclusion::Cancelled)).conclusion_label(),
            Some("cancelled")
        );
        assert_eq!(Classification::Failed(None).conclusion_label(), Some("unknown"));
        assert_eq!(Classification::Running.conclusion_label(), None);
        assert_eq!(Classification::Other("waiting".into()).conclusion_label(), None);
    }

    #[test]
    fn test_machine_counts_iterations_and_stops_at_terminal() {
        let mut machine = PollMachine::new();
        assert!(matches!(
            machine.observe(Ok(snap(RunStatus::Queued, None))),
            Transition::Waiting { iteration: 1, .. }
        ));
        assert!(matches!(
            machine.observe(Err(RemoteError::Transient("timeout".into()))),
            Transition::Unreachable { iteration: 2, .. }
        ));
        assert!(matches!(
            machine.observe(Ok(snap(RunStatus::Completed, Some(Conclusion::Success)))),
            Transition::Finished {
                iteration: 3,
                classification: Classification::Succeeded
            }
        ));
        assert!(machine.is_done());
        assert_eq!(
            machine.state(),
            &PollState::Finished {
                iterations: 3,
                classification: Classification::Succeeded
            }
        );
    }

    #[test]
    fn test_machine_aborts_on_fatal_error() {
        let mut machine = PollMachine::new();
        let t = machine.observe(Err(RemoteError::Fatal("gh not found".into())));
        assert!(matches!(t, Transition::Aborted { iteration: 1, .. }));
        assert!(machine.is_done());
    }

    #[tokio::test]
    async fn test_monitor_without_run_id_makes_no_remote_call() {
        let (ctx, fakes) = test_context();
        let err = StatusPoller::monitor(&ctx, None, Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(matches!(err, RunwatchError::MissingRunId));
        assert!(fakes.provider.calls().is_empty());
    }

    #[tokio::test]
    async fn test_monitor_retries_through_transient_failures() {
        let (ctx, fakes) = test_context();
        fakes.provider.push_status(Ok(snap(RunStatus::Queued, None)));
        fakes
            .provider
            .push_status(Err(RemoteError::Transient("HTTP 502".into())));
        fakes
            .provider
            .push_status(Err(RemoteError::Transient("malformed gh output".into())));
        fakes.provider.push_status(Ok(snap(RunStatus::InProgress, None)));
        fakes
            .provider
            .push_status(Ok(snap(RunStatus::Completed, Some(Conclusion::Success))));

        let outcome = StatusPoller::monitor_run(&ctx, 42, Duration::from_secs(5))
            .await
            .unwrap();

        assert_eq!(outcome, PollOutcome::Succeeded);
        assert_eq!(fakes.provider.count(|c| matches!(c, ProviderCall::RunStatus { .. })), 5);
        assert_eq!(fakes.clock.sleeps(), vec![Duration::from_secs(5); 4]);

        let lines = fakes.console.lines();
        assert!(lines.iter().any(|l| l.contains("[1] status: queued...")));
        assert!(lines.iter().any(|l| l.contains("[2] cannot fetch status")));
        assert!(lines.iter().any(|l| l.contains("[3] cannot fetch status")));
        assert!(lines.iter().any(|l| l.contains("[4] status: running...")));
        assert!(lines.iter().any(|l| l.contains("[5] status: completed - success")));
        assert!(fakes.console.printed("Workflow succeeded"));
    }

    #[tokio::test]
    async fn test_monitor_reports_unknown_run() {
        let (ctx, fakes) = test_context();
        fakes
            .provider
            .set_metadata(Err(RemoteError::Transient("HTTP 404: Not Found".into())));
        let err = StatusPoller::monitor_run(&ctx, 404, Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(matches!(err, RunwatchError::RunNotFound { run_id: 404, .. }));
        assert_eq!(fakes.provider.count(|c| matches!(c, ProviderCall::RunStatus { .. })), 0);
    }

    #[tokio::test]
    async fn test_monitor_stops_when_cancelled() {
        let (ctx, fakes) = test_context();
        fakes.provider.push_status(Ok(snap(RunStatus::InProgress, None)));
        ctx.cancel.cancel();

        let outcome = StatusPoller::monitor_run(&ctx, 42, Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(outcome, PollOutcome::Interrupted);
        assert_eq!(outcome.exit_code(), 130);
        assert_eq!(fakes.provider.count(|c| matches!(c, ProviderCall::RunStatus { .. })), 0);
    }

    #[tokio::test]
    async fn test_failed_run_collects_logs() {
        let (ctx, fakes) = test_context();
        fakes
            .provider
            .push_status(Ok(snap(RunStatus::Completed, Some(Conclusion::Cancelled))));

        let outcome = StatusPoller::monitor_run(&ctx, 42, Duration::from_secs(5))
            .await
            .unwrap();

        // No run details scripted: the report cannot be written, the outcome is still a failure.
        assert_eq!(
            outcome,
            PollOutcome::Failed {
                conclusion: Some(Conclusion::Cancelled),
                report: None
            }
        );
        assert_eq!(outcome.exit_code(), 1);
        assert_eq!(fakes.provider.count(|c| matches!(c, ProviderCall::RunDetails { .. })), 1);
        assert_eq!(fakes.console.warnings(), vec!["failed to collect workflow logs"]);
    }

    #[tokio::test]
    async fn test_interrupt_during_log_collection_is_an_interrupt() {
        use crate::domain::{JobSummary, RunDetails, RunMetadata};

        let (ctx, fakes) = test_context();
        fakes
            .provider
            .push_status(Ok(snap(RunStatus::Completed, Some(Conclusion::Failure))));
        fakes.provider.set_details(Ok(RunDetails {
            metadata: RunMetadata::default(),
            status: RunStatus::Completed,
            conclusion: Some(Conclusion::Failure),
            jobs: vec![JobSummary {
                name: "build".into(),
                status: RunStatus::Completed,
                conclusion: Some(Conclusion::Failure),
                job_id: Some(7),
            }],
        }));
        fakes
            .provider
            .interrupt_during_job_log(7, ctx.cancel.clone());

        let outcome = StatusPoller::monitor_run(&ctx, 42, Duration::from_secs(5))
            .await
            .unwrap();

        assert_eq!(outcome, PollOutcome::Interrupted);
        assert_eq!(outcome.exit_code(), 130);
        assert_eq!(fakes.provider.count(|c| matches!(c, ProviderCall::FailedLog { .. })), 0);
        assert!(fakes.console.warnings().is_empty());
        assert!(!ctx.config.log_dir_path().join("workflow_42_error.log").exists());
    }
}
