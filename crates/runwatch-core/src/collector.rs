//! Failure log collection.
//!
//! Fetches the run with its job list and writes a [`LogReport`] into the log
//! directory. Each failed job's log is looked up through
//! [`LogStrategy::CHAIN`]; the first strategy that yields non-empty text wins.
//! A strategy that times out or fails only moves the chain along.

use std::path::PathBuf;

use tracing::{debug, Instrument};

use crate::context::RunwatchContext;
use crate::domain::JobSummary;
use crate::error::{Result, RunwatchError};
use crate::obs;
use crate::report::{JobLogSection, LogReport, LogStrategy, ReportBody, RetrievedLog};
use crate::store::resolve_run_id;

/// Writes failure reports.
pub struct LogCollector;

impl LogCollector {
    /// Entry point for `collect-logs`: resolve the run id, check the environment, collect.
    pub async fn collect_requested(ctx: &RunwatchContext, run_id: Option<u64>) -> Result<PathBuf> {
        let run_id = resolve_run_id(run_id, ctx.store.as_ref())?;
        ctx.preflight().await?;
        Self::try_collect(ctx, run_id).await
    }

    /// Write the report for `run_id` and return its path.
    ///
    /// Stops with [`RunwatchError::Interrupted`] as soon as the context is
    /// cancelled; no report is written in that case.
    pub async fn try_collect(ctx: &RunwatchContext, run_id: u64) -> Result<PathBuf> {
        Self::gather(ctx, run_id)
            .instrument(obs::run_span(run_id))
            .await
    }

    async fn gather(ctx: &RunwatchContext, run_id: u64) -> Result<PathBuf> {
        ctx.console.line("Collecting workflow logs...");

        ctx.ensure_running()?;
        let details = match ctx.provider.run_details(run_id).await {
            Ok(details) => details,
            Err(_) if ctx.cancel.is_cancelled() => return Err(RunwatchError::Interrupted),
            Err(e) => {
                return Err(RunwatchError::RunNotFound {
                    run_id,
                    detail: e.detail().to_string(),
                })
            }
        };

        let failed = details.failed_jobs();
        let failed_count = failed.len();
        ctx.ensure_running()?;
        let body = if failed.is_empty() {
            debug!(run_id, "no failed jobs, fetching the full log");
            let full_log = match ctx
                .provider
                .full_log(run_id, ctx.config.full_log_timeout())
                .await
            {
                Ok(text) if !text.trim().is_empty() => Ok(text),
                Ok(_) => Err("the provider returned an empty log".to_string()),
                Err(_) if ctx.cancel.is_cancelled() => return Err(RunwatchError::Interrupted),
                Err(e) => Err(e.detail().to_string()),
            };
            obs::emit_log_strategy(run_id, "", LogStrategy::FullRun.name(), full_log.is_ok());
            ReportBody::NoFailedJobs { full_log }
        } else {
            let mut sections = Vec::with_capacity(failed.len());
            for job in failed {
                ctx.console.line(&format!(
                    "Fetching log for job '{}' (ID: {})...",
                    job.name,
                    job.job_id.map(|id| id.to_string()).unwrap_or_default()
                ));
                sections.push(JobLogSection {
                    name: job.name.clone(),
                    job_id: job.job_id,
                    log: Self::fetch_job_log(ctx, run_id, job).await?,
                });
            }
            ReportBody::FailedJobs(sections)
        };

        let report = LogReport {
            run_id,
            details,
            collected_at: ctx.clock.now(),
            body,
        };
        let path = report.write_to(&ctx.config.log_dir_path())?;
        obs::emit_logs_collected(run_id, &path, failed_count);
        Ok(path)
    }

    /// Walk the fallback chain for one job.
    async fn fetch_job_log(
        ctx: &RunwatchContext,
        run_id: u64,
        job: &JobSummary,
    ) -> Result<Option<RetrievedLog>> {
        let timeout = ctx.config.log_timeout();
        for strategy in LogStrategy::CHAIN {
            ctx.ensure_running()?;
            let fetched = match strategy {
                LogStrategy::JobLog => match job.job_id {
                    Some(job_id) => ctx.provider.job_log(run_id, job_id, timeout).await,
                    None => continue,
                },
                LogStrategy::FailedSteps => ctx.provider.failed_log(run_id, timeout).await,
                LogStrategy::FullRun => ctx.provider.full_log(run_id, timeout).await,
            };

            match fetched {
                Ok(text) if !text.trim().is_empty() => {
                    obs::emit_log_strategy(run_id, &job.name, strategy.name(), true);
                    return Ok(Some(RetrievedLog { strategy, text }));
                }
                Ok(_) => debug!(job = %job.name, strategy = strategy.name(), "empty log"),
                Err(e) => debug!(job = %job.name, strategy = strategy.name(), error = %e, "log unavailable"),
            }
            obs::emit_log_strategy(run_id, &job.name, strategy.name(), false);
        }
        // A fetch killed by the interrupt looks like an unavailable log.
        ctx.ensure_running()?;
        Ok(None)
    }
}
