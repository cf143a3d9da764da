//! runwatch core library
//!
//! Drives a GitHub Actions workflow from a developer machine: dispatch it,
//! find the run it created, follow the run to completion and, when it fails,
//! write a report with the failed jobs' logs.

pub mod clock;
pub mod collector;
pub mod command;
pub mod config;
pub mod console;
pub mod context;
pub mod domain;
pub mod error;
pub mod fakes;
pub mod git;
pub mod obs;
pub mod orchestrator;
pub mod poller;
pub mod provider;
pub mod report;
pub mod store;
pub mod telemetry;
pub mod trigger;

pub use clock::{CancelFlag, Clock, TokioClock};
pub use collector::LogCollector;
pub use config::RunwatchConfig;
pub use console::{Console, StdConsole};
pub use context::RunwatchContext;
pub use domain::{
    Conclusion, JobSummary, RunDetails, RunMetadata, RunStatus, StatusSnapshot,
    WorkflowDefinition,
};
pub use error::{RemoteError, RemoteResult, Result, RunwatchError};
pub use git::{repo_root, GitCli, SourceControl};
pub use orchestrator::{Orchestrator, RunOutcome};
pub use poller::{classify, Classification, PollMachine, PollOutcome, StatusPoller};
pub use provider::{CiProvider, GhCliProvider};
pub use report::{LogReport, LogStrategy};
pub use store::{resolve_run_id, FileRunRefStore, RunRefStore};
pub use telemetry::init_tracing;
pub use trigger::{parse_inputs, TriggerOutcome, TriggerRequest, WorkflowTrigger};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
