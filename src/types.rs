//! Wire and in-memory model for a cluster-wide binary update.

use std::collections::BTreeMap;
use std::fmt;

use reqwest::Url;
use serde::{Deserialize, Serialize};

use crate::error::CoordinatorError;

/// An admin-issued update instruction. Also the body sent from the coordinator to each peer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateRequest {
    #[serde(rename = "sourceURL", default, skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,
    #[serde(rename = "dryRun", default)]
    pub dry_run: bool,
}

impl UpdateRequest {
    pub fn new(source_url: impl Into<String>, dry_run: bool) -> Self {
        let source_url = source_url.into();
        Self {
            source_url: if source_url.trim().is_empty() {
                None
            } else {
                Some(source_url)
            },
            dry_run,
        }
    }

    /// The release location to fetch: the request's URL, or `default_release` when blank.
    pub fn resolve_source(&self, default_release: &str) -> Result<Url, CoordinatorError> {
        let raw = match self.source_url.as_deref().map(str::trim) {
            Some(url) if !url.is_empty() => url,
            _ => default_release,
        };
        let url = Url::parse(raw).map_err(|err| {
            CoordinatorError::InvalidRequest(format!("malformed source URL `{raw}`: {err}"))
        })?;
        match url.scheme() {
            "http" | "https" if url.host_str().is_some() => Ok(url),
            scheme => Err(CoordinatorError::InvalidRequest(format!(
                "unsupported source URL `{raw}` (scheme `{scheme}`)"
            ))),
        }
    }
}

/// Point-in-time activity of one local drive.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriveMetrics {
    #[serde(default)]
    pub pending_io: u64,
    #[serde(default)]
    pub healing: bool,
    #[serde(default)]
    pub total_ops: u64,
}

impl DriveMetrics {
    pub fn is_drained(&self) -> bool {
        self.pending_io == 0 && !self.healing
    }
}

/// Outcome of the update on a single peer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerUpdateResult {
    pub host: String,
    #[serde(rename = "err", default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(rename = "currentVersion", default)]
    pub version_before: String,
    #[serde(rename = "updatedVersion", default)]
    pub version_after: String,
    #[serde(
        rename = "waitingDrives",
        default,
        skip_serializing_if = "BTreeMap::is_empty"
    )]
    pub waiting_drives: BTreeMap<String, DriveMetrics>,
}

impl PeerUpdateResult {
    /// A result for a peer that produced nothing usable, e.g. timed out or could not be reached.
    pub fn failed(host: impl Into<String>, error: impl fmt::Display) -> Self {
        Self {
            host: host.into(),
            error: Some(error.to_string()),
            ..Default::default()
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.as_deref().map_or(true, str::is_empty)
    }
}

/// Aggregated, membership-ordered report returned to the admin caller.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateReport {
    #[serde(rename = "dryRun")]
    pub dry_run: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub results: Vec<PeerUpdateResult>,
}

/// Single-pair response of the deprecated update API.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LegacyUpdateStatus {
    #[serde(rename = "currentVersion")]
    pub current_version: String,
    #[serde(rename = "updatedVersion")]
    pub updated_version: String,
}

/// Response shape selected by the `type` query parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateApiVersion {
    Legacy,
    Aggregated,
}

impl UpdateApiVersion {
    pub fn from_query(value: Option<&str>) -> Result<Self, CoordinatorError> {
        match value.map(str::trim) {
            None | Some("") | Some("1") => Ok(Self::Legacy),
            Some("2") => Ok(Self::Aggregated),
            Some(other) => Err(CoordinatorError::InvalidRequest(format!(
                "unsupported update API type `{other}`"
            ))),
        }
    }
}

/// Per-peer progress through one update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerUpdatePhase {
    Idle,
    CapturingVersion,
    DrainWaiting,
    Swapping,
    DrainTimedOut,
    Restarting,
    Done,
    Failed,
}

impl PeerUpdatePhase {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }
}

impl fmt::Display for PeerUpdatePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::CapturingVersion => "capturing_version",
            Self::DrainWaiting => "drain_waiting",
            Self::Swapping => "swapping",
            Self::DrainTimedOut => "drain_timed_out",
            Self::Restarting => "restarting",
            Self::Done => "done",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}
