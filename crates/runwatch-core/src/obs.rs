//! Structured lifecycle events for workflow runs.
//!
//! Every event carries an `event` field so log pipelines can filter on it,
//! e.g. `event=run.discovered run_id=42 attempt=3`.

use tracing::{info, warn, Span};

/// Span tagging all tracing output of an operation on `run_id`.
///
/// Attach it with `tracing::Instrument::instrument` rather than entering it,
/// so it is only active while the instrumented future is being polled.
pub fn run_span(run_id: u64) -> Span {
    tracing::info_span!("runwatch.run", run_id = run_id)
}

pub fn emit_workflow_dispatched(workflow: &str, git_ref: &str, inputs: usize) {
    info!(event = "workflow.dispatched", workflow = %workflow, git_ref = %git_ref, inputs = inputs);
}

pub fn emit_run_discovered(workflow: &str, run_id: u64, attempt: u32) {
    info!(event = "run.discovered", workflow = %workflow, run_id = run_id, attempt = attempt);
}

pub fn emit_discovery_exhausted(workflow: &str, attempts: u32) {
    warn!(event = "run.discovery_exhausted", workflow = %workflow, attempts = attempts);
}

pub fn emit_poll_snapshot(run_id: u64, iteration: u64, status: &str, conclusion: Option<&str>) {
    info!(
        event = "poll.snapshot",
        run_id = run_id,
        iteration = iteration,
        status = %status,
        conclusion = conclusion.unwrap_or(""),
    );
}

pub fn emit_poll_fetch_failed(run_id: u64, iteration: u64, error: &dyn std::fmt::Display) {
    warn!(event = "poll.fetch_failed", run_id = run_id, iteration = iteration, error = %error);
}

pub fn emit_run_finished(run_id: u64, conclusion: &str, iterations: u64) {
    info!(event = "run.finished", run_id = run_id, conclusion = %conclusion, iterations = iterations);
}

pub fn emit_log_strategy(run_id: u64, job: &str, strategy: &str, obtained: bool) {
    info!(
        event = "logs.strategy_attempted",
        run_id = run_id,
        job = %job,
        strategy = %strategy,
        obtained = obtained,
    );
}

pub fn emit_logs_collected(run_id: u64, path: &std::path::Path, failed_jobs: usize) {
    info!(event = "logs.collected", run_id = run_id, path = %path.display(), failed_jobs = failed_jobs);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_span_create() {
        let _entered = run_span(42).entered();
        emit_poll_snapshot(42, 1, "queued", None);
    }
}
