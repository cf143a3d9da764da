//! Failure report written by the log collector.
//!
//! Plain text meant for humans: a metadata header, a job table, and the log
//! text of each failed job. Nothing parses it back.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};

use crate::domain::{JobSummary, RunDetails};

const WIDTH: usize = 80;

/// Log retrieval strategies, in the order they are tried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogStrategy {
    /// Log scoped to one job id.
    JobLog,
    /// The run's aggregate log of failed steps.
    FailedSteps,
    /// The run's full unfiltered log.
    FullRun,
}

impl LogStrategy {
    /// Fallback chain order.
    pub const CHAIN: [LogStrategy; 3] = [
        LogStrategy::JobLog,
        LogStrategy::FailedSteps,
        LogStrategy::FullRun,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            LogStrategy::JobLog => "job_log",
            LogStrategy::FailedSteps => "failed_steps",
            LogStrategy::FullRun => "full_run",
        }
    }

    /// Heading written above run-wide logs; job logs are written bare.
    fn heading(&self) -> Option<&'static str> {
        match self {
            LogStrategy::JobLog => None,
            LogStrategy::FailedSteps => Some("Failed-step log:"),
            LogStrategy::FullRun => Some("Full log:"),
        }
    }
}

/// Log text obtained for a job, with the strategy that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetrievedLog {
    pub strategy: LogStrategy,
    pub text: String,
}

/// One failed job's section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobLogSection {
    pub name: String,
    pub job_id: Option<u64>,
    /// `None` when every strategy came back empty or unavailable.
    pub log: Option<RetrievedLog>,
}

/// Body of the report after the header and job table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReportBody {
    FailedJobs(Vec<JobLogSection>),
    /// No job failed; the full run log (or why it could not be fetched).
    NoFailedJobs { full_log: Result<String, String> },
}

/// A generated failure report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogReport {
    pub run_id: u64,
    pub details: RunDetails,
    pub collected_at: DateTime<Local>,
    pub body: ReportBody,
}

impl LogReport {
    /// `workflow_{run_id}_error.log`
    pub fn file_name(run_id: u64) -> String {
        format!("workflow_{run_id}_error.log")
    }

    pub fn path_in(dir: &Path, run_id: u64) -> PathBuf {
        dir.join(Self::file_name(run_id))
    }

    /// Render and write the report into `dir`, replacing any previous report for the run.
    pub fn write_to(&self, dir: &Path) -> std::io::Result<PathBuf> {
        std::fs::create_dir_all(dir)?;
        let path = Self::path_in(dir, self.run_id);
        std::fs::write(&path, self.render())?;
        Ok(path)
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        let heavy = "=".repeat(WIDTH);
        let light = "-".repeat(WIDTH);
        let meta = &self.details.metadata;

        let _ = writeln!(out, "{heavy}");
        let _ = writeln!(out, "GitHub Actions workflow error log");
        let _ = writeln!(out, "{heavy}\n");
        let _ = writeln!(out, "Run ID: {}", self.run_id);
        let _ = writeln!(out, "Workflow: {}", or_unknown(&meta.workflow_name));
        let _ = writeln!(out, "Branch: {}", or_unknown(&meta.head_branch));
        let _ = writeln!(out, "Event: {}", or_unknown(&meta.event));
        let _ = writeln!(out, "Status: {}", self.details.status);
        let _ = writeln!(
            out,
            "Conclusion: {}",
            self.details
                .conclusion
                .as_ref()
                .map_or("unknown", |c| c.as_str())
        );
        let _ = writeln!(
            out,
            "Collected at: {}",
            self.collected_at.format("%Y-%m-%d %H:%M:%S")
        );
        let _ = writeln!(out, "\n{heavy}\n");

        let _ = writeln!(out, "Jobs summary:");
        let _ = writeln!(out, "{light}");
        if self.details.jobs.is_empty() {
            let _ = writeln!(out, "  (no jobs reported)");
        }
        for job in &self.details.jobs {
            let _ = writeln!(out, "  {}", job_line(job));
        }
        let _ = writeln!(out, "\n{heavy}\n");

        match &self.body {
            ReportBody::FailedJobs(sections) => {
                let _ = writeln!(out, "Failed jobs ({}):", sections.len());
                let _ = writeln!(out, "{light}");
                for section in sections {
                    let _ = writeln!(out, "  - {} (ID: {})", section.name, id_text(section.job_id));
                }
                let _ = writeln!(out, "\n{heavy}\n");

                for section in sections {
                    let _ = writeln!(out, "\n{heavy}");
                    let _ = writeln!(out, "Job: {} (ID: {})", section.name, id_text(section.job_id));
                    let _ = writeln!(out, "{heavy}\n");
                    match &section.log {
                        Some(log) => {
                            if let Some(heading) = log.strategy.heading() {
                                let _ = writeln!(out, "{heading}");
                                let _ = writeln!(out, "{light}");
                            }
                            push_text(&mut out, &log.text);
                        }
                        None => {
                            let _ = writeln!(out, "Could not retrieve the log for job '{}'", section.name);
                            self.push_url_hint(&mut out);
                        }
                    }
                    out.push('\n');
                }
            }
            ReportBody::NoFailedJobs { full_log } => {
                let _ = writeln!(out, "No failed jobs - full log");
                let _ = writeln!(out, "{light}\n");
                match full_log {
                    Ok(text) => push_text(&mut out, text),
                    Err(reason) => {
                        let _ = writeln!(out, "Could not retrieve the full log: {reason}");
                        self.push_url_hint(&mut out);
                    }
                }
            }
        }
        out
    }

    fn push_url_hint(&self, out: &mut String) {
        let _ = writeln!(out, "See the run page for details:");
        let _ = writeln!(out, "  {}", self.details.metadata.url);
    }
}

fn or_unknown(s: &str) -> &str {
    if s.is_empty() {
        "unknown"
    } else {
        s
    }
}

fn id_text(id: Option<u64>) -> String {
    id.map(|i| i.to_string()).unwrap_or_default()
}

fn job_line(job: &JobSummary) -> String {
    format!(
        "{}: {} / {} (ID: {})",
        or_unknown(&job.name),
        job.status,
        job.conclusion.as_ref().map_or("unknown", |c| c.as_str()),
        id_text(job.job_id)
    )
}

fn push_text(out: &mut String, text: &str) {
    out.push_str(text);
    if !text.ends_with('\n') {
        out.push('\n');
    }
}
