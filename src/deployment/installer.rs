//! Fetch, verify and swap of this node's binary.

use std::fs::File as StdFile;
use std::io;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use flate2::read::GzDecoder;
use reqwest::{Client, Url};
use semver::Version;
use tempfile::TempPath;
use tracing::{debug, info};

use crate::error::AppError;

use super::download::{download_to_path, DEFAULT_USER_AGENT, DOWNLOAD_TIMEOUT_SECS};
use super::system::command_output;
use super::types::InstallOutcome;

const PREFLIGHT_TIMEOUT_SECS: u64 = 30;
const STAGING_PREFIX: &str = ".cluster-update-staged-";

/// The local, opaque half of an update.
#[async_trait]
pub trait BinaryInstaller: Send + Sync {
    /// Version of the process that is currently serving.
    fn running_version(&self) -> String;

    /// Everything `install` would need, without touching the binary.
    async fn preflight(&self, source: &Url) -> Result<(), AppError>;

    /// Fetches the release from `source` and swaps it in place of the running binary.
    async fn install(&self, source: &Url) -> Result<InstallOutcome, AppError>;
}

/// Installs plain binaries or `.tar.gz` archives containing the binary.
pub struct ReleaseInstaller {
    http: Client,
    binary_path: PathBuf,
    running_version: String,
}

impl ReleaseInstaller {
    pub fn new(binary_path: PathBuf, running_version: impl Into<String>) -> Result<Self, AppError> {
        let http = Client::builder()
            .user_agent(DEFAULT_USER_AGENT)
            .connect_timeout(Duration::from_secs(PREFLIGHT_TIMEOUT_SECS))
            .build()?;
        Ok(Self {
            http,
            binary_path,
            running_version: running_version.into(),
        })
    }

    fn binary_dir(&self) -> Result<&Path, AppError> {
        match self.binary_path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => Ok(parent),
            _ => Err(AppError::Config(format!(
                "binary path {} has no parent directory",
                self.binary_path.display()
            ))),
        }
    }

    fn binary_name(&self) -> Result<&str, AppError> {
        self.binary_path
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| {
                AppError::Config(format!(
                    "binary path {} has no file name",
                    self.binary_path.display()
                ))
            })
    }

    fn staging_path(&self) -> Result<TempPath, AppError> {
        Ok(tempfile::Builder::new()
            .prefix(STAGING_PREFIX)
            .tempfile_in(self.binary_dir()?)?
            .into_temp_path())
    }
}

#[async_trait]
impl BinaryInstaller for ReleaseInstaller {
    fn running_version(&self) -> String {
        self.running_version.clone()
    }

    async fn preflight(&self, source: &Url) -> Result<(), AppError> {
        self.http
            .head(source.clone())
            .timeout(Duration::from_secs(PREFLIGHT_TIMEOUT_SECS))
            .send()
            .await?
            .error_for_status()?;

        // Staging happens next to the binary so the final rename stays on one filesystem.
        let probe = tempfile::Builder::new()
            .prefix(STAGING_PREFIX)
            .tempfile_in(self.binary_dir()?)
            .map_err(|err| {
                AppError::Config(format!(
                    "binary directory {} is not writable: {err}",
                    self.binary_path.display()
                ))
            })?;
        drop(probe);
        debug!(source = %source, "Preflight passed");
        Ok(())
    }

    async fn install(&self, source: &Url) -> Result<InstallOutcome, AppError> {
        let download = self.staging_path()?;
        let bytes = download_to_path(
            &self.http,
            source.as_str(),
            &download,
            Some(Duration::from_secs(DOWNLOAD_TIMEOUT_SECS)),
        )
        .await?;
        info!(source = %source, bytes, "Downloaded release");

        let staged = if is_archive(source) {
            let target = self.staging_path()?;
            let archive = download.to_path_buf();
            let output = target.to_path_buf();
            let name = self.binary_name()?.to_string();
            tokio::task::spawn_blocking(move || extract_binary(&archive, &name, &output))
                .await
                .map_err(|err| AppError::Release(format!("extraction task failed: {err}")))??;
            target
        } else {
            download
        };

        tokio::fs::set_permissions(&staged, std::fs::Permissions::from_mode(0o755)).await?;
        let version = probe_version(&staged).await?;

        if version == self.running_version {
            info!(version = %version, "Release matches running version, skipping swap");
            return Ok(InstallOutcome::AlreadyCurrent { version });
        }

        staged
            .persist(&self.binary_path)
            .map_err(|err| AppError::Io(err.error))?;
        info!(
            path = %self.binary_path.display(),
            from = %self.running_version,
            to = %version,
            "Binary swapped"
        );
        Ok(InstallOutcome::Installed { version })
    }
}

fn is_archive(source: &Url) -> bool {
    let path = source.path();
    path.ends_with(".tar.gz") || path.ends_with(".tgz")
}

fn extract_binary(archive: &Path, binary_name: &str, output: &Path) -> Result<(), AppError> {
    let mut archive = tar::Archive::new(GzDecoder::new(StdFile::open(archive)?));
    for entry in archive.entries()? {
        let mut entry = entry?;
        let matches = entry
            .path()?
            .file_name()
            .map(|name| name == binary_name)
            .unwrap_or(false);
        if matches && entry.header().entry_type().is_file() {
            let mut file = StdFile::create(output)?;
            io::copy(&mut entry, &mut file)?;
            file.sync_all()?;
            return Ok(());
        }
    }
    Err(AppError::Release(format!(
        "archive does not contain `{binary_name}`"
    )))
}

async fn probe_version(staged: &Path) -> Result<String, AppError> {
    let output = command_output(staged, &["--version"])
        .await
        .map_err(|err| AppError::Release(format!("staged binary failed to run: {err}")))?;
    parse_version_output(&output)
        .map(|version| version.to_string())
        .ok_or_else(|| AppError::Release(format!("no version in `{output}`")))
}

/// Pulls the last semver-looking token out of `--version` output, e.g. `cluster-update 1.4.0`.
pub fn parse_version_output(output: &str) -> Option<Version> {
    output
        .split_whitespace()
        .rev()
        .find_map(|token| Version::parse(token.trim_start_matches('v')).ok())
}
