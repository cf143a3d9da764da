//! Collaborators shared by all runwatch operations.

use std::sync::Arc;

use crate::clock::{CancelFlag, Clock, TokioClock};
use crate::config::RunwatchConfig;
use crate::console::{Console, StdConsole};
use crate::error::{Result, RunwatchError};
use crate::git::{GitCli, SourceControl};
use crate::provider::{CiProvider, GhCliProvider};
use crate::store::{FileRunRefStore, RunRefStore};

/// Everything an operation needs, injected so tests can swap in fakes.
#[derive(Clone)]
pub struct RunwatchContext {
    pub config: RunwatchConfig,
    pub provider: Arc<dyn CiProvider>,
    pub source_control: Arc<dyn SourceControl>,
    pub store: Arc<dyn RunRefStore>,
    pub clock: Arc<dyn Clock>,
    pub console: Arc<dyn Console>,
    pub cancel: CancelFlag,
}

impl RunwatchContext {
    /// Production wiring: `gh`, `git`, the state file and real time.
    pub fn production(config: RunwatchConfig) -> Self {
        let provider = GhCliProvider::new(config.gh_binary.clone(), config.project_root.clone());
        let source_control = GitCli::new(config.git_binary.clone(), config.project_root.clone());
        let store = FileRunRefStore::new(config.state_path());
        Self {
            config,
            provider: Arc::new(provider),
            source_control: Arc::new(source_control),
            store: Arc::new(store),
            clock: Arc::new(TokioClock),
            console: Arc::new(StdConsole),
            cancel: CancelFlag::new(),
        }
    }

    /// Environment preflight. A `gh` check killed by an interrupt reports the
    /// interrupt rather than a missing or unauthenticated client.
    pub async fn preflight(&self) -> Result<()> {
        self.ensure_running()?;
        match self.provider.check_environment().await {
            Err(_) if self.cancel.is_cancelled() => Err(RunwatchError::Interrupted),
            other => other,
        }
    }

    /// `Err(Interrupted)` once the cancel flag is set.
    pub fn ensure_running(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            Err(RunwatchError::Interrupted)
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::{test_context, ProviderCall};

    #[tokio::test]
    async fn test_preflight_passes_environment_errors_through() {
        let (ctx, fakes) = test_context();
        fakes
            .provider
            .fail_environment(RunwatchError::environment("GitHub CLI (gh) not found", "install gh"));
        let err = ctx.preflight().await.unwrap_err();
        assert!(matches!(err, RunwatchError::Environment { .. }));
    }

    #[tokio::test]
    async fn test_preflight_after_interrupt_reports_interrupt() {
        let (ctx, fakes) = test_context();
        ctx.cancel.cancel();
        let err = ctx.preflight().await.unwrap_err();
        assert!(matches!(err, RunwatchError::Interrupted));
        assert!(!fakes.provider.calls().contains(&ProviderCall::CheckEnvironment));
    }

    #[tokio::test]
    async fn test_check_killed_by_interrupt_is_not_an_environment_error() {
        let (ctx, fakes) = test_context();
        fakes.provider.interrupt_during_environment(ctx.cancel.clone());
        let err = ctx.preflight().await.unwrap_err();
        assert!(matches!(err, RunwatchError::Interrupted));
        assert_eq!(fakes.provider.calls(), vec![ProviderCall::CheckEnvironment]);
    }
}
