use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use reqwest::Client;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use cluster_update::config::Config;
use cluster_update::coordinator::{HttpSourceProbe, UpdateCoordinator};
use cluster_update::deployment::{
    ReleaseInstaller, RestartScheduler, SystemdService, DEFAULT_USER_AGENT,
};
use cluster_update::drain::LocalDriveTracker;
use cluster_update::error::AppError;
use cluster_update::executor::PeerUpdateExecutor;
use cluster_update::peer::{peers_from_config, LocalPeer};
use cluster_update::server::{start_server, AppState};

/// Cluster node that coordinates and applies rolling binary updates
#[derive(Parser, Debug)]
#[command(name = "cluster-update", version, about)]
struct Args {
    /// Path to config.json (defaults to the app directory)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    if let Err(err) = run(args).await {
        error!(error = ?err, "Update service stopped");
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<(), AppError> {
    let config = Config::load(args.config.as_deref()).await;
    let version = env!("CARGO_PKG_VERSION");

    let drives = LocalDriveTracker::new();
    for drive in &config.drives {
        drives.register_drive(drive.as_str());
    }

    let restarts = RestartScheduler::new();
    let _restart_task = restarts.spawn(
        Arc::new(SystemdService::new(config.systemd_service_name.clone())),
        config.restart_delay(),
    );

    let binary_path = config.binary_path()?;
    let installer = ReleaseInstaller::new(binary_path.clone(), version)?;
    let executor = Arc::new(PeerUpdateExecutor::new(
        config.host.clone(),
        config.release_url.clone(),
        Arc::new(installer),
        Arc::new(drives.clone()),
        config.drain_policy(),
        restarts.clone(),
    ));
    let local = Arc::new(LocalPeer::new(executor));

    let probe = HttpSourceProbe::new(Client::builder().user_agent(DEFAULT_USER_AGENT).build()?);
    let coordinator = Arc::new(UpdateCoordinator::new(
        peers_from_config(&config, Arc::clone(&local))?,
        config.release_url.clone(),
        config.peer_timeout(),
        Arc::new(probe),
        restarts.clone(),
    ));

    info!(
        host = %config.host,
        version,
        binary = %binary_path.display(),
        members = ?coordinator.membership(),
        "Starting update service"
    );

    let state = AppState {
        local_host: config.host.clone(),
        coordinator,
        local,
        drives,
        restarts,
    };
    start_server(&config.listen_addr, state).await
}
