//! Deferred service restart after a successful swap.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::error::AppError;

use super::system::run_command;

#[async_trait]
pub trait ServiceControl: Send + Sync {
    async fn restart(&self) -> Result<(), AppError>;
}

/// Restarts a systemd unit via `systemctl`.
pub struct SystemdService {
    unit: String,
}

impl SystemdService {
    pub fn new(unit: impl Into<String>) -> Self {
        Self { unit: unit.into() }
    }
}

#[async_trait]
impl ServiceControl for SystemdService {
    async fn restart(&self) -> Result<(), AppError> {
        run_command("systemctl", &["restart", self.unit.as_str()]).await
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct RestartState {
    holds: usize,
    pending: bool,
}

impl RestartState {
    fn ready(&self) -> bool {
        self.pending && self.holds == 0
    }
}

/// Defers restart requests until no in-flight update holds the process open.
///
/// The node that coordinates an update is also one of its peers. Its own swap
/// finishes long before the other peers answer, so the restart it requests
/// must wait for the report to be returned.
#[derive(Debug, Clone)]
pub struct RestartScheduler {
    state: Arc<watch::Sender<RestartState>>,
}

impl Default for RestartScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl RestartScheduler {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(RestartState::default());
        Self {
            state: Arc::new(tx),
        }
    }

    /// Keeps the process alive until the returned hold is dropped.
    pub fn hold(&self) -> RestartHold {
        self.state.send_modify(|state| state.holds += 1);
        RestartHold {
            state: Arc::clone(&self.state),
        }
    }

    pub fn request_restart(&self) {
        self.state.send_modify(|state| state.pending = true);
    }

    pub fn restart_pending(&self) -> bool {
        self.state.borrow().pending
    }

    /// Drives restarts for the lifetime of the process.
    pub fn spawn(&self, service: Arc<dyn ServiceControl>, delay: Duration) -> JoinHandle<()> {
        let mut rx = self.state.subscribe();
        let state = Arc::clone(&self.state);
        tokio::spawn(async move {
            loop {
                if rx.wait_for(RestartState::ready).await.is_err() {
                    return;
                }
                tokio::time::sleep(delay).await;
                if !state.borrow().ready() {
                    // A new update started during the delay.
                    continue;
                }

                info!(delay_ms = delay.as_millis() as u64, "Restarting service");
                if let Err(err) = service.restart().await {
                    warn!(error = ?err, "Service restart failed");
                }
                state.send_modify(|state| state.pending = false);
            }
        })
    }
}

/// Blocks restarts while alive.
#[derive(Debug)]
pub struct RestartHold {
    state: Arc<watch::Sender<RestartState>>,
}

impl Drop for RestartHold {
    fn drop(&mut self) {
        self.state
            .send_modify(|state| state.holds = state.holds.saturating_sub(1));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingService {
        restarts: AtomicUsize,
    }

    #[async_trait]
    impl ServiceControl for CountingService {
        async fn restart(&self) -> Result<(), AppError> {
            self.restarts.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_waits_for_holds() {
        let scheduler = RestartScheduler::new();
        let service = Arc::new(CountingService::default());
        let _task = scheduler.spawn(service.clone(), Duration::from_secs(1));

        let hold = scheduler.hold();
        scheduler.request_restart();
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(service.restarts.load(Ordering::SeqCst), 0);
        assert!(scheduler.restart_pending());

        drop(hold);
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(service.restarts.load(Ordering::SeqCst), 1);
        assert!(!scheduler.restart_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_restart_without_request() {
        let scheduler = RestartScheduler::new();
        let service = Arc::new(CountingService::default());
        let _task = scheduler.spawn(service.clone(), Duration::from_millis(10));
        drop(scheduler.hold());
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(service.restarts.load(Ordering::SeqCst), 0);
    }
}
