//! Time and cancellation seams for the polling loops.
//!
//! Trigger discovery and the status poller never call `tokio::time::sleep`
//! directly; they go through a [`Clock`] so tests can run the loops without
//! real delays, and race every pause against a [`CancelFlag`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Local};
use tokio::sync::Notify;

/// Source of wall-clock time and delays.
#[async_trait]
pub trait Clock: Send + Sync {
    /// Suspend the caller for `duration`.
    async fn sleep(&self, duration: Duration);

    /// Current local time, used for progress timestamps.
    fn now(&self) -> DateTime<Local>;
}

/// Real clock backed by the tokio timer.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioClock;

#[async_trait]
impl Clock for TokioClock {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }

    fn now(&self) -> DateTime<Local> {
        Local::now()
    }
}

/// Cooperative interrupt signal shared between the signal handler and the loops.
///
/// Setting the flag never touches the remote run; loops observe it between
/// iterations and stop early.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag {
    inner: Arc<CancelInner>,
}

#[derive(Debug, Default)]
struct CancelInner {
    cancelled: AtomicBool,
    notify: Notify,
}

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::SeqCst);
        self.inner.notify.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Resolves once [`cancel`](CancelFlag::cancel) has been called.
    pub async fn cancelled(&self) {
        loop {
            let notified = self.inner.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}

/// Sleep for `duration`, waking early if `cancel` fires.
pub async fn pause(clock: &dyn Clock, duration: Duration, cancel: &CancelFlag) {
    tokio::select! {
        _ = clock.sleep(duration) => {}
        _ = cancel.cancelled() => {}
    }
}
