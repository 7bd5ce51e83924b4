//! Streaming release download.

use std::path::Path;
use std::time::Duration;

use reqwest::Client;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::deployment::DownloadProgress;
use crate::error::AppError;

pub const DOWNLOAD_TIMEOUT_SECS: u64 = 10 * 60;
pub const DEFAULT_USER_AGENT: &str = "cluster-update";

/// Streams `url` into `destination`, returning the number of bytes written.
pub async fn download_to_path(
    client: &Client,
    url: &str,
    destination: &Path,
    timeout: Option<Duration>,
) -> Result<u64, AppError> {
    let mut request = client.get(url);
    if let Some(timeout) = timeout {
        request = request.timeout(timeout);
    }

    let mut response = request.send().await?.error_for_status()?;
    let mut file = File::create(destination).await?;
    let mut progress = DownloadProgress {
        downloaded_bytes: 0,
        total_bytes: response.content_length(),
    };
    let mut last_logged: Option<u8> = None;

    while let Some(chunk) = response.chunk().await? {
        file.write_all(&chunk).await?;
        progress.downloaded_bytes = progress.downloaded_bytes.saturating_add(chunk.len() as u64);
        if let Some(percent) = progress.percent() {
            let step = percent / 10;
            if last_logged != Some(step) {
                last_logged = Some(step);
                debug!(url, percent, "Downloading release");
            }
        }
    }

    file.flush().await?;
    file.sync_all().await?;
    Ok(progress.downloaded_bytes)
}
