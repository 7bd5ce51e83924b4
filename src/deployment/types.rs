//! Shared deployment-related data structures.

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallOutcome {
    /// The binary on disk was replaced and now reports `version`.
    Installed { version: String },
    /// The release carries the version that is already running; nothing was touched.
    AlreadyCurrent { version: String },
}

impl InstallOutcome {
    pub fn version(&self) -> &str {
        match self {
            Self::Installed { version } | Self::AlreadyCurrent { version } => version,
        }
    }

    pub fn needs_restart(&self) -> bool {
        matches!(self, Self::Installed { .. })
    }
}

#[derive(Debug, Clone, Copy)]
pub struct DownloadProgress {
    pub downloaded_bytes: u64,
    pub total_bytes: Option<u64>,
}

impl DownloadProgress {
    pub fn percent(&self) -> Option<u8> {
        self.total_bytes.map(|total| {
            if total == 0 {
                100
            } else {
                let percent = (self.downloaded_bytes.saturating_mul(100)) / total;
                percent.min(100) as u8
            }
        })
    }
}
