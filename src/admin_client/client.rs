use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::deployment::DEFAULT_USER_AGENT;
use crate::error::{AdminError, ErrorResponse};
use crate::server::ADMIN_UPDATE_PATH;
use crate::types::{LegacyUpdateStatus, UpdateReport};

use super::queries::UpdateQuery;

#[derive(Clone)]
pub struct AdminClient {
    http: Client,
    base_url: String,
}

impl AdminClient {
    /// `endpoint` is the base URL of any cluster node, e.g. `http://node1:9000`.
    pub fn new(endpoint: &str) -> Result<Self, AdminError> {
        let http = Client::builder().user_agent(DEFAULT_USER_AGENT).build()?;
        Ok(Self::with_client(endpoint, http))
    }

    pub fn with_client(endpoint: &str, http: Client) -> Self {
        Self {
            http,
            base_url: endpoint.trim_end_matches('/').to_string(),
        }
    }

    /// Updates and restarts every node in the cluster.
    /// - An empty `update_url` selects the cluster's default release channel
    /// - With `dry_run`, nodes only validate and report drives a real update would wait on
    pub async fn server_update_v2(
        &self,
        update_url: &str,
        dry_run: bool,
    ) -> Result<UpdateReport, AdminError> {
        let query = UpdateQuery {
            update_url,
            api_type: Some("2"),
            dry_run,
        };
        self.post_json_with_query(ADMIN_UPDATE_PATH, &query).await
    }

    /// Single-node view of a cluster update, without per-peer detail.
    #[deprecated(note = "use `server_update_v2`, which reports every peer")]
    pub async fn server_update(&self, update_url: &str) -> Result<LegacyUpdateStatus, AdminError> {
        let query = UpdateQuery {
            update_url,
            api_type: None,
            dry_run: false,
        };
        self.post_json_with_query(ADMIN_UPDATE_PATH, &query).await
    }

    async fn post_json_with_query<T, Q>(&self, path: &str, query: &Q) -> Result<T, AdminError>
    where
        T: DeserializeOwned,
        Q: Serialize + ?Sized,
    {
        let url = format!("{}/{}", self.base_url, path.trim_start_matches('/'));
        let response = self.http.post(url).query(query).send().await?;

        let status = response.status();
        let body = response.bytes().await?;
        if status != StatusCode::OK {
            return Err(error_from_body(status, &body));
        }

        Ok(serde_json::from_slice(&body)?)
    }
}

fn error_from_body(status: StatusCode, body: &[u8]) -> AdminError {
    match serde_json::from_slice::<ErrorResponse>(body) {
        Ok(err) => AdminError::Api {
            status,
            code: err.code,
            message: err.message,
        },
        Err(_) => {
            let text = String::from_utf8_lossy(body).trim().to_string();
            AdminError::Api {
                status,
                code: status.canonical_reason().unwrap_or("Error").to_string(),
                message: if text.is_empty() {
                    status.to_string()
                } else {
                    text
                },
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::serve;
    use axum::extract::Query;
    use axum::routing::post;
    use axum::{Json, Router};
    use std::collections::HashMap;

    #[tokio::test]
    async fn test_v2_sends_type_and_dry_run() {
        let router = Router::new().route(
            ADMIN_UPDATE_PATH,
            post(|Query(params): Query<HashMap<String, String>>| async move {
                assert_eq!(params.get("type").map(String::as_str), Some("2"));
                assert_eq!(params.get("updateURL").map(String::as_str), Some(""));
                Json(UpdateReport {
                    dry_run: params.get("dry-run").map(String::as_str) == Some("true"),
                    results: Vec::new(),
                })
            }),
        );
        let addr = serve(router).await;
        let client = AdminClient::new(&format!("http://{addr}/")).unwrap();

        assert!(client.server_update_v2("", true).await.unwrap().dry_run);
        assert!(!client.server_update_v2("", false).await.unwrap().dry_run);
    }

    #[tokio::test]
    async fn test_non_200_maps_error_body() {
        let router = Router::new().route(
            ADMIN_UPDATE_PATH,
            post(|| async {
                (
                    StatusCode::FORBIDDEN,
                    Json(ErrorResponse::new(
                        StatusCode::FORBIDDEN,
                        "AccessDenied",
                        "Access Denied.",
                    )),
                )
            }),
        );
        let addr = serve(router).await;
        let client = AdminClient::new(&format!("http://{addr}")).unwrap();

        match client.server_update_v2("", false).await {
            Err(AdminError::Api {
                status,
                code,
                message,
            }) => {
                assert_eq!(status, StatusCode::FORBIDDEN);
                assert_eq!(code, "AccessDenied");
                assert_eq!(message, "Access Denied.");
            }
            other => panic!("unexpected result {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_non_json_error_uses_status_text() {
        let router = Router::new().route(
            ADMIN_UPDATE_PATH,
            post(|| async { (StatusCode::BAD_GATEWAY, "") }),
        );
        let addr = serve(router).await;
        let client = AdminClient::new(&format!("http://{addr}")).unwrap();

        #[allow(deprecated)]
        let err = client.server_update("").await.unwrap_err();
        match err {
            AdminError::Api { status, code, .. } => {
                assert_eq!(status, StatusCode::BAD_GATEWAY);
                assert_eq!(code, "Bad Gateway");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_transport_error() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let client = AdminClient::new(&format!("http://{addr}")).unwrap();

        let err = client.server_update_v2("", false).await.unwrap_err();
        assert!(matches!(err, AdminError::Transport(_)), "{err:?}");
    }
}
