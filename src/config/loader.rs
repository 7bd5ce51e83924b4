use std::path::{Path, PathBuf};

use tokio::fs;
use tracing::{info, warn};

use crate::error::AppError;

use super::{paths, Config};

impl Config {
    /// Load configuration from `explicit` or from config.json in the app directory.
    /// Falls back to defaults if the file doesn't exist or can't be parsed
    pub async fn load(explicit: Option<&Path>) -> Self {
        let config_path = match explicit {
            Some(path) => path.to_path_buf(),
            None => paths::get_config_path(),
        };

        match Self::try_load(&config_path).await {
            Ok(config) => {
                info!(
                    host = %config.host,
                    peers = config.membership().len(),
                    service = %config.systemd_service_name,
                    "Loaded configuration"
                );
                config
            }
            Err(err) => {
                warn!(error = ?err, "Failed to load config.json, using defaults");
                Self::default()
            }
        }
    }

    pub(crate) async fn try_load(config_path: &Path) -> Result<Self, AppError> {
        if !config_path.exists() {
            warn!(path = %config_path.display(), "Config file not found, using defaults");
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(config_path)
            .await
            .map_err(|err| AppError::Config(format!("Failed to read config file: {err}")))?;

        let mut config: Config = serde_json::from_str(&contents)
            .map_err(|err| AppError::Config(format!("Failed to parse config.json: {err}")))?;

        config.host = config.host.trim().to_string();
        if config.host.is_empty() {
            return Err(AppError::Config("host must not be blank".to_string()));
        }

        if let Some(path) = &config.binary_path {
            if path.trim().is_empty() {
                return Err(AppError::Config("binary_path must not be blank".to_string()));
            }
        }

        Ok(config)
    }

    /// Path of the binary this node replaces on update.
    pub fn binary_path(&self) -> Result<PathBuf, AppError> {
        match &self.binary_path {
            Some(path) => Ok(PathBuf::from(path)),
            None => std::env::current_exe()
                .map_err(|err| AppError::Config(format!("Failed to locate executable: {err}"))),
        }
    }
}
