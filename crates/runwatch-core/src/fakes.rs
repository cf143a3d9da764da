//! In-memory fakes for the runwatch seams (testing only)
//!
//! Provides `ScriptedProvider`, `MemoryRunRefStore`, `ManualClock`,
//! `BufferConsole` and `FixedSourceControl`, plus [`test_context`] which
//! wires them into a [`RunwatchContext`] rooted in a temporary directory.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Local};

use crate::clock::{CancelFlag, Clock};
use crate::config::RunwatchConfig;
use crate::console::Console;
use crate::context::RunwatchContext;
use crate::domain::{RunDetails, RunMetadata, StatusSnapshot, WorkflowDefinition};
use crate::error::{RemoteError, RemoteResult, Result, RunwatchError};
use crate::git::SourceControl;
use crate::provider::CiProvider;
use crate::store::RunRefStore;

// ---------------------------------------------------------------------------
// MemoryRunRefStore
// ---------------------------------------------------------------------------

/// Run-reference store held in memory.
#[derive(Debug, Default)]
pub struct MemoryRunRefStore {
    value: Mutex<Option<u64>>,
}

impl MemoryRunRefStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_run_id(run_id: u64) -> Self {
        Self {
            value: Mutex::new(Some(run_id)),
        }
    }
}

impl RunRefStore for MemoryRunRefStore {
    fn get(&self) -> Result<Option<u64>> {
        Ok(*self.value.lock().unwrap())
    }

    fn set(&self, run_id: u64) -> Result<()> {
        *self.value.lock().unwrap() = Some(run_id);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// ManualClock
// ---------------------------------------------------------------------------

/// Clock that never blocks: sleeps are recorded and advance virtual time.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Local>>,
    sleeps: Mutex<Vec<Duration>>,
}

impl Default for ManualClock {
    fn default() -> Self {
        Self {
            now: Mutex::new(Local::now()),
            sleeps: Mutex::new(Vec::new()),
        }
    }
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every duration passed to `sleep`, in call order.
    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.lock().unwrap().clone()
    }
}

#[async_trait]
impl Clock for ManualClock {
    async fn sleep(&self, duration: Duration) {
        self.sleeps.lock().unwrap().push(duration);
        let mut now = self.now.lock().unwrap();
        if let Ok(step) = chrono::Duration::from_std(duration) {
            *now += step;
        }
    }

    fn now(&self) -> DateTime<Local> {
        *self.now.lock().unwrap()
    }
}

// ---------------------------------------------------------------------------
// BufferConsole
// ---------------------------------------------------------------------------

/// Console that captures output instead of printing it.
#[derive(Debug, Default)]
pub struct BufferConsole {
    lines: Mutex<Vec<String>>,
    warnings: Mutex<Vec<String>>,
    errors: Mutex<Vec<String>>,
}

impl BufferConsole {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().unwrap().clone()
    }

    pub fn warnings(&self) -> Vec<String> {
        self.warnings.lock().unwrap().clone()
    }

    pub fn errors(&self) -> Vec<String> {
        self.errors.lock().unwrap().clone()
    }

    /// Whether any printed line contains `needle`.
    pub fn printed(&self, needle: &str) -> bool {
        self.lines.lock().unwrap().iter().any(|l| l.contains(needle))
    }
}

impl Console for BufferConsole {
    fn line(&self, text: &str) {
        self.lines.lock().unwrap().push(text.to_string());
    }

    fn warn(&self, text: &str) {
        self.warnings.lock().unwrap().push(text.to_string());
    }

    fn error(&self, text: &str) {
        self.errors.lock().unwrap().push(text.to_string());
    }
}

// ---------------------------------------------------------------------------
// FixedSourceControl
// ---------------------------------------------------------------------------

/// Source control that reports a fixed branch (or none).
#[derive(Debug, Clone, Default)]
pub struct FixedSourceControl {
    branch: Option<String>,
}

impl FixedSourceControl {
    pub fn new(branch: impl Into<String>) -> Self {
        Self {
            branch: Some(branch.into()),
        }
    }

    /// Behaves like a detached HEAD or a directory outside any repository.
    pub fn detached() -> Self {
        Self { branch: None }
    }
}

impl SourceControl for FixedSourceControl {
    fn current_branch(&self) -> Option<String> {
        self.branch.clone()
    }
}

// ---------------------------------------------------------------------------
// ScriptedProvider
// ---------------------------------------------------------------------------

/// A call received by [`ScriptedProvider`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderCall {
    CheckEnvironment,
    Dispatch {
        workflow: String,
        git_ref: String,
        inputs: BTreeMap<String, String>,
    },
    ListRuns {
        workflow: String,
        limit: u32,
    },
    RunMetadata {
        run_id: u64,
    },
    RunStatus {
        run_id: u64,
    },
    RunDetails {
        run_id: u64,
    },
    JobLog {
        run_id: u64,
        job_id: u64,
        timeout: Duration,
    },
    FailedLog {
        run_id: u64,
        timeout: Duration,
    },
    FullLog {
        run_id: u64,
        timeout: Duration,
    },
}

#[derive(Debug, Default)]
struct Script {
    calls: Vec<ProviderCall>,
    environment_error: Option<RunwatchError>,
    interrupt_on_environment: Option<CancelFlag>,
    interrupt_on_job_log: Option<(u64, CancelFlag)>,
    dispatch_error: Option<RemoteError>,
    list_runs: VecDeque<RemoteResult<Vec<u64>>>,
    metadata: Option<RemoteResult<RunMetadata>>,
    statuses: VecDeque<RemoteResult<StatusSnapshot>>,
    details: Option<RemoteResult<RunDetails>>,
    job_logs: HashMap<u64, RemoteResult<String>>,
    failed_log: Option<RemoteResult<String>>,
    full_log: Option<RemoteResult<String>>,
}

/// Provider whose responses are scripted up front and whose calls are recorded.
///
/// Unscripted defaults: environment ok, dispatch ok, empty run list, default
/// metadata, and "unavailable" for details and every log. An exhausted status
/// queue answers with a fatal error so a runaway poll loop ends the test.
#[derive(Debug, Default)]
pub struct ScriptedProvider {
    script: Mutex<Script>,
}

fn unavailable<T>(what: &str) -> RemoteResult<T> {
    Err(RemoteError::Transient(format!("{what} unavailable")))
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_environment(&self, err: RunwatchError) {
        self.script.lock().unwrap().environment_error = Some(err);
    }

    /// Fire `cancel` while the environment check is in flight, like a Ctrl+C
    /// that kills the `gh` child process.
    pub fn interrupt_during_environment(&self, cancel: CancelFlag) {
        self.script.lock().unwrap().interrupt_on_environment = Some(cancel);
    }

    /// Cancel `cancel` while the log for `job_id` is being fetched; the fetch fails.
    pub fn interrupt_during_job_log(&self, job_id: u64, cancel: CancelFlag) {
        self.script.lock().unwrap().interrupt_on_job_log = Some((job_id, cancel));
    }

    pub fn fail_dispatch(&self, err: RemoteError) {
        self.script.lock().unwrap().dispatch_error = Some(err);
    }

    pub fn push_list_runs(&self, result: RemoteResult<Vec<u64>>) {
        self.script.lock().unwrap().list_runs.push_back(result);
    }

    pub fn set_metadata(&self, result: RemoteResult<RunMetadata>) {
        self.script.lock().unwrap().metadata = Some(result);
    }

    pub fn push_status(&self, result: RemoteResult<StatusSnapshot>) {
        self.script.lock().unwrap().statuses.push_back(result);
    }

    pub fn set_details(&self, result: RemoteResult<RunDetails>) {
        self.script.lock().unwrap().details = Some(result);
    }

    pub fn set_job_log(&self, job_id: u64, result: RemoteResult<String>) {
        self.script.lock().unwrap().job_logs.insert(job_id, result);
    }

    pub fn set_failed_log(&self, result: RemoteResult<String>) {
        self.script.lock().unwrap().failed_log = Some(result);
    }

    pub fn set_full_log(&self, result: RemoteResult<String>) {
        self.script.lock().unwrap().full_log = Some(result);
    }

    /// Every call received, in order.
    pub fn calls(&self) -> Vec<ProviderCall> {
        self.script.lock().unwrap().calls.clone()
    }

    /// Number of received calls matching `pred`.
    pub fn count<F: Fn(&ProviderCall) -> bool>(&self, pred: F) -> usize {
        self.script.lock().unwrap().calls.iter().filter(|c| pred(c)).count()
    }

    fn record(&self, call: ProviderCall) -> std::sync::MutexGuard<'_, Script> {
        let mut script = self.script.lock().unwrap();
        script.calls.push(call);
        script
    }
}

#[async_trait]
impl CiProvider for ScriptedProvider {
    async fn check_environment(&self) -> Result<()> {
        let mut script = self.record(ProviderCall::CheckEnvironment);
        if let Some(cancel) = script.interrupt_on_environment.take() {
            cancel.cancel();
            return Err(RunwatchError::environment(
                "GitHub CLI (gh) not found",
                "install it from https://cli.github.com/",
            ));
        }
        match script.environment_error.take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    async fn dispatch(
        &self,
        workflow: &WorkflowDefinition,
        git_ref: &str,
        inputs: &BTreeMap<String, String>,
    ) -> RemoteResult<()> {
        let script = self.record(ProviderCall::Dispatch {
            workflow: workflow.selector(),
            git_ref: git_ref.to_string(),
            inputs: inputs.clone(),
        });
        match &script.dispatch_error {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    async fn list_runs(&self, workflow: &WorkflowDefinition, limit: u32) -> RemoteResult<Vec<u64>> {
        let mut script = self.record(ProviderCall::ListRuns {
            workflow: workflow.selector(),
            limit,
        });
        script.list_runs.pop_front().unwrap_or_else(|| Ok(Vec::new()))
    }

    async fn run_metadata(&self, run_id: u64) -> RemoteResult<RunMetadata> {
        let script = self.record(ProviderCall::RunMetadata { run_id });
        script
            .metadata
            .clone()
            .unwrap_or_else(|| Ok(RunMetadata::default()))
    }

    async fn run_status(&self, run_id: u64) -> RemoteResult<StatusSnapshot> {
        let mut script = self.record(ProviderCall::RunStatus { run_id });
        script
            .statuses
            .pop_front()
            .unwrap_or_else(|| Err(RemoteError::Fatal("status script exhausted".to_string())))
    }

    async fn run_details(&self, run_id: u64) -> RemoteResult<RunDetails> {
        let script = self.record(ProviderCall::RunDetails { run_id });
        script
            .details
            .clone()
            .unwrap_or_else(|| unavailable("run details"))
    }

    async fn job_log(&self, run_id: u64, job_id: u64, timeout: Duration) -> RemoteResult<String> {
        let mut script = self.record(ProviderCall::JobLog {
            run_id,
            job_id,
            timeout,
        });
        if let Some((target, cancel)) = script.interrupt_on_job_log.take() {
            if target == job_id {
                cancel.cancel();
                return Err(RemoteError::Transient("gh killed by signal".into()));
            }
            script.interrupt_on_job_log = Some((target, cancel));
        }
        script
            .job_logs
            .get(&job_id)
            .cloned()
            .unwrap_or_else(|| unavailable("job log"))
    }

    async fn failed_log(&self, run_id: u64, timeout: Duration) -> RemoteResult<String> {
        let script = self.record(ProviderCall::FailedLog { run_id, timeout });
        script
            .failed_log
            .clone()
            .unwrap_or_else(|| unavailable("failed-step log"))
    }

    async fn full_log(&self, run_id: u64, timeout: Duration) -> RemoteResult<String> {
        let script = self.record(ProviderCall::FullLog { run_id, timeout });
        script
            .full_log
            .clone()
            .unwrap_or_else(|| unavailable("full log"))
    }
}

// ---------------------------------------------------------------------------
// Wiring
// ---------------------------------------------------------------------------

/// Handles on the fakes behind a [`test_context`].
pub struct Fakes {
    /// Project root; removed when dropped.
    pub root: tempfile::TempDir,
    pub provider: Arc<ScriptedProvider>,
    pub store: Arc<MemoryRunRefStore>,
    pub clock: Arc<ManualClock>,
    pub console: Arc<BufferConsole>,
}

/// A context backed entirely by fakes, rooted in a fresh temp directory.
///
/// The current branch is `feature/x`; the store starts empty.
pub fn test_context() -> (RunwatchContext, Fakes) {
    let root = tempfile::tempdir().expect("create temp dir");
    let provider = Arc::new(ScriptedProvider::new());
    let store = Arc::new(MemoryRunRefStore::new());
    let clock = Arc::new(ManualClock::new());
    let console = Arc::new(BufferConsole::new());

    let ctx = RunwatchContext {
        config: RunwatchConfig::new(root.path()),
        provider: provider.clone(),
        source_control: Arc::new(FixedSourceControl::new("feature/x")),
        store: store.clone(),
        clock: clock.clone(),
        console: console.clone(),
        cancel: CancelFlag::new(),
    };

    (
        ctx,
        Fakes {
            root,
            provider,
            store,
            clock,
            console,
        },
    )
}
