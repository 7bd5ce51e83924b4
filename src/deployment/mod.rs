//! Local binary replacement: download, verify, swap and restart.

mod download;
mod installer;
mod restart;
mod system;
mod types;

pub use download::{download_to_path, DEFAULT_USER_AGENT, DOWNLOAD_TIMEOUT_SECS};
pub use installer::{parse_version_output, BinaryInstaller, ReleaseInstaller};
pub use restart::{RestartHold, RestartScheduler, ServiceControl, SystemdService};
pub use system::{command_output, run_command};
pub use types::{DownloadProgress, InstallOutcome};
