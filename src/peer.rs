//! How the coordinator reaches each member of the cluster, itself included.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::debug;

use crate::cancel::CancelSignal;
use crate::config::Config;
use crate::deployment::DEFAULT_USER_AGENT;
use crate::error::{AppError, ErrorResponse, PeerUpdateError};
use crate::executor::PeerUpdateExecutor;
use crate::types::{PeerUpdateResult, UpdateRequest};

pub const PEER_UPDATE_PATH: &str = "/peer/v1/update";
pub const PEER_DRIVES_PATH: &str = "/peer/v1/drives";

const PEER_CONNECT_TIMEOUT_SECS: u64 = 10;

/// One client per membership entry, in membership order. `local` stands in for this node.
pub fn peers_from_config(
    config: &Config,
    local: Arc<LocalPeer>,
) -> Result<Vec<Arc<dyn PeerClient>>, AppError> {
    // No overall request timeout: the coordinator bounds each peer itself.
    let http = Client::builder()
        .user_agent(DEFAULT_USER_AGENT)
        .connect_timeout(Duration::from_secs(PEER_CONNECT_TIMEOUT_SECS))
        .build()?;

    let own = config.host.trim();
    Ok(config
        .membership()
        .into_iter()
        .map(|host| {
            if host == own {
                Arc::clone(&local) as Arc<dyn PeerClient>
            } else {
                Arc::new(RemotePeer::new(host, &config.peer_scheme, http.clone()))
                    as Arc<dyn PeerClient>
            }
        })
        .collect())
}

#[async_trait]
pub trait PeerClient: Send + Sync {
    /// Stable cluster identity; the key of this peer's entry in the report.
    fn host(&self) -> &str;

    async fn apply_update(
        &self,
        request: &UpdateRequest,
        cancel: CancelSignal,
    ) -> Result<PeerUpdateResult, PeerUpdateError>;
}

/// This node, reached without a network hop.
pub struct LocalPeer {
    executor: Arc<PeerUpdateExecutor>,
}

impl LocalPeer {
    pub fn new(executor: Arc<PeerUpdateExecutor>) -> Self {
        Self { executor }
    }
}

#[async_trait]
impl PeerClient for LocalPeer {
    fn host(&self) -> &str {
        self.executor.host()
    }

    async fn apply_update(
        &self,
        request: &UpdateRequest,
        cancel: CancelSignal,
    ) -> Result<PeerUpdateResult, PeerUpdateError> {
        let executor = Arc::clone(&self.executor);
        let request = request.clone();
        // Detached so that an abandoned wait never interrupts a swap in progress.
        tokio::spawn(async move { executor.apply_update(&request, cancel).await })
            .await
            .map_err(|err| PeerUpdateError::Swap(format!("local update task failed: {err}")))
    }
}

/// Another node, reached over its peer API.
pub struct RemotePeer {
    host: String,
    update_url: String,
    http: Client,
}

impl RemotePeer {
    pub fn new(host: impl Into<String>, scheme: &str, http: Client) -> Self {
        let host = host.into();
        let update_url = format!("{scheme}://{}{PEER_UPDATE_PATH}", host.trim_end_matches('/'));
        Self {
            host,
            update_url,
            http,
        }
    }

    async fn send(&self, request: &UpdateRequest) -> Result<PeerUpdateResult, PeerUpdateError> {
        let response = self
            .http
            .post(&self.update_url)
            .json(request)
            .send()
            .await
            .map_err(|err| PeerUpdateError::Unreachable(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorResponse>(&body)
                .map(|err| err.message)
                .unwrap_or_else(|_| status.to_string());
            return Err(PeerUpdateError::Rejected(message));
        }

        let mut result: PeerUpdateResult = response
            .json()
            .await
            .map_err(|err| PeerUpdateError::Rejected(format!("invalid response: {err}")))?;
        // Keyed by membership identity, whatever the peer calls itself.
        result.host = self.host.clone();
        Ok(result)
    }
}

#[async_trait]
impl PeerClient for RemotePeer {
    fn host(&self) -> &str {
        &self.host
    }

    async fn apply_update(
        &self,
        request: &UpdateRequest,
        mut cancel: CancelSignal,
    ) -> Result<PeerUpdateResult, PeerUpdateError> {
        debug!(host = %self.host, url = %self.update_url, "Dispatching update to peer");
        tokio::select! {
            result = self.send(request) => result,
            _ = cancel.cancelled() => Err(PeerUpdateError::Cancelled),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::serve;
    use axum::http::StatusCode;
    use axum::routing::post;
    use axum::{Json, Router};

    #[tokio::test]
    async fn test_remote_peer_decodes_result_and_pins_host() {
        let router = Router::new().route(
            PEER_UPDATE_PATH,
            post(|Json(request): Json<UpdateRequest>| async move {
                Json(PeerUpdateResult {
                    host: "10.0.0.2:9000".to_string(),
                    error: None,
                    version_before: "1.0.0".to_string(),
                    version_after: if request.dry_run { "1.0.0" } else { "1.1.0" }.to_string(),
                    waiting_drives: Default::default(),
                })
            }),
        );
        let addr = serve(router).await;
        let peer = RemotePeer::new(addr.to_string(), "http", Client::new());

        let result = peer
            .apply_update(&UpdateRequest::new("", false), CancelSignal::never())
            .await
            .unwrap();
        assert_eq!(result.host, addr.to_string());
        assert_eq!(result.version_after, "1.1.0");
    }

    #[tokio::test]
    async fn test_remote_peer_maps_error_body() {
        let router = Router::new().route(
            PEER_UPDATE_PATH,
            post(|| async {
                (
                    StatusCode::BAD_REQUEST,
                    Json(ErrorResponse::new(
                        StatusCode::BAD_REQUEST,
                        "InvalidRequest",
                        "bad source",
                    )),
                )
            }),
        );
        let addr = serve(router).await;
        let peer = RemotePeer::new(addr.to_string(), "http", Client::new());

        let err = peer
            .apply_update(&UpdateRequest::new("", false), CancelSignal::never())
            .await
            .unwrap_err();
        assert_eq!(err, PeerUpdateError::Rejected("bad source".to_string()));
    }

    #[test]
    fn test_peers_from_config_keeps_order_and_marks_self() {
        use crate::deployment::RestartScheduler;
        use crate::drain::{DrainPolicy, LocalDriveTracker};
        use crate::test_support::FakeInstaller;

        let config = Config {
            host: "node2:9000".to_string(),
            peers: vec!["node1:9000".to_string(), "node2:9000".to_string()],
            ..Default::default()
        };
        let executor = Arc::new(PeerUpdateExecutor::new(
            config.host.clone(),
            config.release_url.clone(),
            Arc::new(FakeInstaller::new("1.0.0", "1.0.0")),
            Arc::new(LocalDriveTracker::new()),
            DrainPolicy::default(),
            RestartScheduler::new(),
        ));
        let local = Arc::new(LocalPeer::new(Arc::clone(&executor)));
        let peers = peers_from_config(&config, local).unwrap();
        let hosts: Vec<_> = peers.iter().map(|peer| peer.host()).collect();
        assert_eq!(hosts, vec!["node1:9000", "node2:9000"]);

        let padded = Config {
            host: " node2:9000 ".to_string(),
            ..config.clone()
        };
        let peers = peers_from_config(&padded, Arc::new(LocalPeer::new(executor))).unwrap();
        assert_eq!(peers.len(), 2);
        assert_eq!(peers[1].host(), "node2:9000");
    }

    #[tokio::test]
    async fn test_remote_peer_unreachable() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let peer = RemotePeer::new(addr.to_string(), "http", Client::new());

        let err = peer
            .apply_update(&UpdateRequest::new("", true), CancelSignal::never())
            .await
            .unwrap_err();
        assert!(matches!(err, PeerUpdateError::Unreachable(_)), "{err:?}");
    }
}
