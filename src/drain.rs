//! Tracks in-flight drive activity and waits for drives to drain before a restart.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info};

use crate::cancel::CancelSignal;
use crate::types::DriveMetrics;

/// Read-only view over local drive activity.
pub trait DriveDrainTracker: Send + Sync {
    /// Drives that are not yet safe to interrupt, keyed by drive id. Never blocks.
    fn snapshot_waiting(&self) -> BTreeMap<String, DriveMetrics>;
}

/// In-memory registry fed by the storage layer of this node.
#[derive(Debug, Clone, Default)]
pub struct LocalDriveTracker {
    drives: Arc<Mutex<BTreeMap<String, DriveMetrics>>>,
}

impl LocalDriveTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_drive(&self, drive: impl Into<String>) {
        self.lock().entry(drive.into()).or_default();
    }

    /// Marks one operation in flight on `drive` until the returned guard drops.
    pub fn begin_io(&self, drive: &str) -> IoGuard {
        {
            let mut drives = self.lock();
            let metrics = drives.entry(drive.to_string()).or_default();
            metrics.pending_io = metrics.pending_io.saturating_add(1);
            metrics.total_ops = metrics.total_ops.saturating_add(1);
        }
        IoGuard {
            drives: Arc::clone(&self.drives),
            drive: drive.to_string(),
        }
    }

    pub fn set_healing(&self, drive: &str, healing: bool) {
        let mut drives = self.lock();
        drives.entry(drive.to_string()).or_default().healing = healing;
        debug!(drive, healing, "Drive healing state changed");
    }

    pub fn snapshot_all(&self) -> BTreeMap<String, DriveMetrics> {
        self.lock().clone()
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<String, DriveMetrics>> {
        self.drives.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl DriveDrainTracker for LocalDriveTracker {
    fn snapshot_waiting(&self) -> BTreeMap<String, DriveMetrics> {
        self.lock()
            .iter()
            .filter(|(_, metrics)| !metrics.is_drained())
            .map(|(drive, metrics)| (drive.clone(), *metrics))
            .collect()
    }
}

/// Held for the duration of one drive operation.
#[derive(Debug)]
pub struct IoGuard {
    drives: Arc<Mutex<BTreeMap<String, DriveMetrics>>>,
    drive: String,
}

impl Drop for IoGuard {
    fn drop(&mut self) {
        let mut drives = self
            .drives
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(metrics) = drives.get_mut(&self.drive) {
            metrics.pending_io = metrics.pending_io.saturating_sub(1);
        }
    }
}

/// Bounds for the drain-wait loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrainPolicy {
    pub max_wait: Duration,
    pub poll_interval: Duration,
    pub max_poll_interval: Duration,
}

impl Default for DrainPolicy {
    fn default() -> Self {
        Self {
            max_wait: Duration::from_secs(300),
            poll_interval: Duration::from_millis(250),
            max_poll_interval: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DrainOutcome {
    Drained,
    TimedOut(BTreeMap<String, DriveMetrics>),
    Cancelled(BTreeMap<String, DriveMetrics>),
}

/// Polls `tracker` with doubling backoff until nothing is waiting, the
/// budget runs out, or `cancel` fires.
pub async fn wait_for_drain(
    tracker: &dyn DriveDrainTracker,
    policy: DrainPolicy,
    cancel: &mut CancelSignal,
) -> DrainOutcome {
    // An oversized budget has no representable deadline; treat it as unbounded.
    let deadline = Instant::now().checked_add(policy.max_wait);
    let mut interval = policy.poll_interval;
    let mut polls: u32 = 0;

    loop {
        let waiting = tracker.snapshot_waiting();
        polls = polls.saturating_add(1);
        if waiting.is_empty() {
            if polls > 1 {
                info!(polls, "Drives drained");
            }
            return DrainOutcome::Drained;
        }
        if cancel.is_cancelled() {
            return DrainOutcome::Cancelled(waiting);
        }

        let next_poll = match deadline {
            Some(deadline) => {
                let now = Instant::now();
                if now >= deadline {
                    return DrainOutcome::TimedOut(waiting);
                }
                interval.min(deadline - now)
            }
            None => interval,
        };

        debug!(
            waiting = waiting.len(),
            next_poll_ms = next_poll.as_millis() as u64,
            "Waiting for drives to drain"
        );

        tokio::select! {
            _ = tokio::time::sleep(next_poll) => {}
            _ = cancel.cancelled() => {}
        }
        interval = interval.saturating_mul(2).min(policy.max_poll_interval);
    }
}
