//! Error taxonomy for runwatch.
//!
//! Two layers:
//! - [`RemoteError`] is the outcome of a single call to the CI provider and
//!   tells the caller whether to retry (`Transient`) or abort (`Fatal`).
//! - [`RunwatchError`] is what an operation surfaces to the binary.

use std::path::PathBuf;

/// Failure of a single remote call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RemoteError {
    /// The call may succeed if repeated (non-zero exit, timeout, malformed output).
    #[error("transient remote failure: {0}")]
    Transient(String),

    /// Repeating the call cannot help (client binary missing, cannot spawn).
    #[error("fatal remote failure: {0}")]
    Fatal(String),
}

impl RemoteError {
    pub fn is_transient(&self) -> bool {
        matches!(self, RemoteError::Transient(_))
    }

    /// Human-readable detail without the classification prefix.
    pub fn detail(&self) -> &str {
        match self {
            RemoteError::Transient(msg) | RemoteError::Fatal(msg) => msg,
        }
    }
}

/// Result of a single remote call.
pub type RemoteResult<T> = std::result::Result<T, RemoteError>;

/// Errors surfaced by runwatch operations.
#[derive(Debug, thiserror::Error)]
pub enum RunwatchError {
    /// CI client missing or unauthenticated. Never retried.
    #[error("{reason}")]
    Environment { reason: String, remedy: String },

    /// Neither an explicit run id nor a stored run reference is available.
    #[error("a run ID must be provided (none given and no stored run reference)")]
    MissingRunId,

    /// The run-reference file exists but does not hold an integer.
    #[error("cannot read run ID from {path}: {detail}")]
    InvalidRunReference { path: PathBuf, detail: String },

    /// The initial run lookup failed; the id is probably wrong.
    #[error("cannot fetch run {run_id}: {detail}")]
    RunNotFound { run_id: u64, detail: String },

    #[error("workflow file not found: {}", .0.display())]
    WorkflowNotFound(PathBuf),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The operator interrupted the operation. The remote run is untouched.
    #[error("interrupted")]
    Interrupted,

    #[error(transparent)]
    Remote(#[from] RemoteError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl RunwatchError {
    pub fn environment(reason: impl Into<String>, remedy: impl Into<String>) -> Self {
        RunwatchError::Environment {
            reason: reason.into(),
            remedy: remedy.into(),
        }
    }

    /// The remedial command or action to show next to the error, if any.
    pub fn remedy(&self) -> Option<String> {
        match self {
            RunwatchError::Environment { remedy, .. } => Some(remedy.clone()),
            RunwatchError::MissingRunId | RunwatchError::InvalidRunReference { .. } => {
                Some("pass the run ID explicitly, e.g. `runwatch monitor <run_id>`".to_string())
            }
            RunwatchError::RunNotFound { .. } => {
                Some("check the run ID with `gh run list`".to_string())
            }
            _ => None,
        }
    }
}

/// Result type for runwatch operations.
pub type Result<T> = std::result::Result<T, RunwatchError>;
