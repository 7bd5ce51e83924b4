//! System-level helpers shared across deployment workflows.

use std::ffi::OsStr;

use tokio::process::Command;

use crate::error::AppError;

pub async fn run_command(command: &str, args: &[&str]) -> Result<(), AppError> {
    command_output(command, args).await.map(|_| ())
}

/// Runs `command` and returns its trimmed stdout.
pub async fn command_output<S: AsRef<OsStr>>(
    command: S,
    args: &[&str],
) -> Result<String, AppError> {
    let command = command.as_ref();
    let output = Command::new(command).args(args).output().await?;
    if output.status.success() {
        return Ok(String::from_utf8_lossy(&output.stdout).trim().to_string());
    }

    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
    Err(AppError::Command(if stderr.is_empty() {
        format!(
            "Command `{}` with args {:?} failed with status {}",
            command.to_string_lossy(),
            args,
            output.status
        )
    } else {
        format!(
            "Command `{}` with args {:?} failed: {}",
            command.to_string_lossy(),
            args,
            stderr
        )
    }))
}
