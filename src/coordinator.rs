//! Fans an update out to every cluster member and waits for all of them.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Url};
use tokio::task::JoinSet;
use tracing::{info, warn};

use crate::aggregator::UpdateStatusAggregator;
use crate::cancel::CancelOnDrop;
use crate::deployment::RestartScheduler;
use crate::error::{CoordinatorError, PeerUpdateError};
use crate::peer::PeerClient;
use crate::types::{PeerUpdateResult, UpdateReport, UpdateRequest};

const PROBE_TIMEOUT_SECS: u64 = 15;

/// Checks that a release location can actually be fetched.
#[async_trait]
pub trait SourceProbe: Send + Sync {
    async fn probe(&self, source: &Url) -> Result<(), String>;
}

pub struct HttpSourceProbe {
    http: Client,
}

impl HttpSourceProbe {
    pub fn new(http: Client) -> Self {
        Self { http }
    }
}

#[async_trait]
impl SourceProbe for HttpSourceProbe {
    async fn probe(&self, source: &Url) -> Result<(), String> {
        self.http
            .head(source.clone())
            .timeout(Duration::from_secs(PROBE_TIMEOUT_SECS))
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map(|_| ())
            .map_err(|err| err.to_string())
    }
}

pub struct UpdateCoordinator {
    peers: Vec<Arc<dyn PeerClient>>,
    default_release: String,
    peer_timeout: Duration,
    probe: Arc<dyn SourceProbe>,
    restarts: RestartScheduler,
}

impl UpdateCoordinator {
    pub fn new(
        peers: Vec<Arc<dyn PeerClient>>,
        default_release: impl Into<String>,
        peer_timeout: Duration,
        probe: Arc<dyn SourceProbe>,
        restarts: RestartScheduler,
    ) -> Self {
        Self {
            peers,
            default_release: default_release.into(),
            peer_timeout,
            probe,
            restarts,
        }
    }

    pub fn membership(&self) -> Vec<String> {
        self.peers.iter().map(|peer| peer.host().to_string()).collect()
    }

    /// Runs one cluster-wide update.
    ///
    /// Returns an error only when the request itself is unusable, before any
    /// peer is contacted. Per-peer failures are reported inside the report.
    /// Dropping the returned future signals every peer to stop before its swap.
    pub async fn run_update(
        &self,
        request: &UpdateRequest,
    ) -> Result<UpdateReport, CoordinatorError> {
        let source = request.resolve_source(&self.default_release)?;
        self.probe.probe(&source).await.map_err(|err| {
            CoordinatorError::InvalidRequest(format!("source URL `{source}` is not reachable: {err}"))
        })?;

        // Every peer fetches the same release, whatever its own default is.
        let dispatched = UpdateRequest {
            source_url: Some(source.to_string()),
            dry_run: request.dry_run,
        };
        let membership = self.membership();
        info!(
            peers = membership.len(),
            source = %source,
            dry_run = request.dry_run,
            "Starting cluster update"
        );

        let _hold = self.restarts.hold();
        let (cancel, _) = CancelOnDrop::new();
        let mut tasks = JoinSet::new();
        for (index, peer) in self.peers.iter().enumerate() {
            let peer = Arc::clone(peer);
            let request = dispatched.clone();
            let signal = cancel.signal();
            let timeout = self.peer_timeout;
            tasks.spawn(async move {
                let host = peer.host().to_string();
                let result =
                    match tokio::time::timeout(timeout, peer.apply_update(&request, signal)).await
                    {
                        Ok(Ok(result)) => result,
                        Ok(Err(err)) => PeerUpdateResult::failed(host, err),
                        Err(_) => PeerUpdateResult::failed(host, PeerUpdateError::Timeout),
                    };
                (index, result)
            });
        }

        let mut slots: Vec<Option<PeerUpdateResult>> = vec![None; membership.len()];
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, result)) => {
                    if let Some(error) = result.error.as_deref() {
                        warn!(host = %result.host, error, "Peer reported failure");
                    }
                    slots[index] = Some(result);
                }
                Err(err) => warn!(error = %err, "Peer update task failed"),
            }
        }

        let report = UpdateStatusAggregator::collect(request.dry_run, &membership, slots);
        info!(
            peers = report.results.len(),
            failed = report.failed_hosts().len(),
            dry_run = report.dry_run,
            "Cluster update finished"
        );
        Ok(report)
    }
}
