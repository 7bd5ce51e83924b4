//! Runs an update on this node: version capture, drain wait, swap, restart.

use std::sync::Arc;

use tokio::sync::{watch, Mutex};
use tracing::{debug, info, warn};

use crate::cancel::CancelSignal;
use crate::deployment::{BinaryInstaller, InstallOutcome, RestartScheduler};
use crate::drain::{wait_for_drain, DrainOutcome, DrainPolicy, DriveDrainTracker};
use crate::error::PeerUpdateError;
use crate::types::{PeerUpdatePhase, PeerUpdateResult, UpdateRequest};

pub struct PeerUpdateExecutor {
    host: String,
    default_release: String,
    installer: Arc<dyn BinaryInstaller>,
    drives: Arc<dyn DriveDrainTracker>,
    drain_policy: DrainPolicy,
    restarts: RestartScheduler,
    // Owns the binary and the service process for the duration of one update.
    swap_lock: Arc<Mutex<()>>,
    phase: watch::Sender<PeerUpdatePhase>,
}

impl PeerUpdateExecutor {
    pub fn new(
        host: impl Into<String>,
        default_release: impl Into<String>,
        installer: Arc<dyn BinaryInstaller>,
        drives: Arc<dyn DriveDrainTracker>,
        drain_policy: DrainPolicy,
        restarts: RestartScheduler,
    ) -> Self {
        let (phase, _) = watch::channel(PeerUpdatePhase::Idle);
        Self {
            host: host.into(),
            default_release: default_release.into(),
            installer,
            drives,
            drain_policy,
            restarts,
            swap_lock: Arc::new(Mutex::new(())),
            phase,
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn subscribe(&self) -> watch::Receiver<PeerUpdatePhase> {
        self.phase.subscribe()
    }

    /// Applies `request` locally. Always yields a result; failures land in `error`.
    ///
    /// `cancel` stops work that has not started yet. Once the swap begins it
    /// runs to completion in its own task, even if this future is dropped.
    pub async fn apply_update(
        &self,
        request: &UpdateRequest,
        mut cancel: CancelSignal,
    ) -> PeerUpdateResult {
        let version_before = self.installer.running_version();
        let mut result = PeerUpdateResult {
            host: self.host.clone(),
            error: None,
            version_before: version_before.clone(),
            version_after: version_before,
            waiting_drives: Default::default(),
        };

        let Ok(swap_guard) = Arc::clone(&self.swap_lock).try_lock_owned() else {
            warn!(host = %self.host, "Rejecting update, another one is running");
            result.error = Some(PeerUpdateError::Busy.to_string());
            return result;
        };

        self.set_phase(PeerUpdatePhase::CapturingVersion);
        debug!(host = %self.host, version = %result.version_before, dry_run = request.dry_run, "Captured running version");

        let source = match request.resolve_source(&self.default_release) {
            Ok(source) => source,
            Err(err) => return self.fail(result, PeerUpdateError::Swap(err.to_string())),
        };

        self.set_phase(PeerUpdatePhase::DrainWaiting);
        if request.dry_run {
            // Report what a real update would stall on, without waiting for it.
            result.waiting_drives = self.drives.snapshot_waiting();
            if let Err(err) = self.installer.preflight(&source).await {
                return self.fail(result, PeerUpdateError::Swap(err.to_string()));
            }
            info!(
                host = %self.host,
                source = %source,
                waiting = result.waiting_drives.len(),
                "Dry-run update validated"
            );
            self.set_phase(PeerUpdatePhase::Done);
            return result;
        }

        match wait_for_drain(self.drives.as_ref(), self.drain_policy, &mut cancel).await {
            DrainOutcome::Drained => {}
            DrainOutcome::TimedOut(waiting) => {
                result.waiting_drives = waiting;
                self.set_phase(PeerUpdatePhase::DrainTimedOut);
                return self.fail(result, PeerUpdateError::DrainTimeout);
            }
            DrainOutcome::Cancelled(waiting) => {
                result.waiting_drives = waiting;
                return self.fail(result, PeerUpdateError::Cancelled);
            }
        }
        if cancel.is_cancelled() {
            return self.fail(result, PeerUpdateError::Cancelled);
        }

        self.set_phase(PeerUpdatePhase::Swapping);
        let installer = Arc::clone(&self.installer);
        let restarts = self.restarts.clone();
        let host = self.host.clone();
        let swap = tokio::spawn(async move {
            let _swap_guard = swap_guard;
            let outcome = installer.install(&source).await;
            if let Ok(InstallOutcome::Installed { version }) = &outcome {
                info!(host = %host, version = %version, "Requesting restart onto new binary");
                restarts.request_restart();
            }
            outcome
        });

        let outcome = match swap.await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(err)) => return self.fail(result, PeerUpdateError::from(err)),
            Err(err) => {
                return self.fail(
                    result,
                    PeerUpdateError::Swap(format!("swap task failed: {err}")),
                )
            }
        };

        if outcome.needs_restart() {
            self.set_phase(PeerUpdatePhase::Restarting);
        }
        result.version_after = outcome.version().to_string();
        result.waiting_drives.clear();
        info!(
            host = %self.host,
            from = %result.version_before,
            to = %result.version_after,
            "Peer update complete"
        );
        self.set_phase(PeerUpdatePhase::Done);
        result
    }

    fn fail(&self, mut result: PeerUpdateResult, err: PeerUpdateError) -> PeerUpdateResult {
        warn!(host = %self.host, error = %err, "Peer update failed");
        result.error = Some(err.to_string());
        result.version_after = result.version_before.clone();
        self.set_phase(PeerUpdatePhase::Failed);
        result
    }

    fn set_phase(&self, phase: PeerUpdatePhase) {
        let previous = self.phase.send_replace(phase);
        if previous != phase {
            debug!(host = %self.host, from = %previous, to = %phase, "Update phase changed");
        }
    }
}
