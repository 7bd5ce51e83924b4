//! Fixtures shared by unit tests.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use axum::body::Bytes;
use axum::routing::get;
use axum::Router;
use reqwest::Url;
use tokio::net::TcpListener;
use tokio::sync::Notify;

use crate::coordinator::SourceProbe;
use crate::deployment::{BinaryInstaller, InstallOutcome};
use crate::error::AppError;

/// Installer that never touches the filesystem.
pub struct FakeInstaller {
    running: String,
    release: String,
    failure: Option<String>,
    gated: bool,
    started: Notify,
    gate: Notify,
    pub preflights: AtomicUsize,
    pub installs: AtomicUsize,
    pub completed: AtomicUsize,
}

impl FakeInstaller {
    pub fn new(running: &str, release: &str) -> Self {
        Self {
            running: running.to_string(),
            release: release.to_string(),
            failure: None,
            gated: false,
            started: Notify::new(),
            gate: Notify::new(),
            preflights: AtomicUsize::new(0),
            installs: AtomicUsize::new(0),
            completed: AtomicUsize::new(0),
        }
    }

    pub fn failing(mut self, message: &str) -> Self {
        self.failure = Some(message.to_string());
        self
    }

    /// `install` blocks until [`FakeInstaller::release`] is called.
    pub fn gated(mut self) -> Self {
        self.gated = true;
        self
    }

    pub async fn wait_started(&self) {
        self.started.notified().await;
    }

    pub fn release(&self) {
        self.gate.notify_one();
    }
}

#[async_trait]
impl BinaryInstaller for FakeInstaller {
    fn running_version(&self) -> String {
        self.running.clone()
    }

    async fn preflight(&self, _source: &Url) -> Result<(), AppError> {
        self.preflights.fetch_add(1, Ordering::SeqCst);
        match &self.failure {
            Some(message) => Err(AppError::Release(message.clone())),
            None => Ok(()),
        }
    }

    async fn install(&self, _source: &Url) -> Result<InstallOutcome, AppError> {
        self.installs.fetch_add(1, Ordering::SeqCst);
        self.started.notify_one();
        if self.gated {
            self.gate.notified().await;
        }
        self.completed.fetch_add(1, Ordering::SeqCst);
        match &self.failure {
            Some(message) => Err(AppError::Release(message.clone())),
            None if self.release == self.running => Ok(InstallOutcome::AlreadyCurrent {
                version: self.release.clone(),
            }),
            None => Ok(InstallOutcome::Installed {
                version: self.release.clone(),
            }),
        }
    }
}

pub struct StubProbe {
    pub reachable: bool,
}

#[async_trait]
impl SourceProbe for StubProbe {
    async fn probe(&self, _source: &Url) -> Result<(), String> {
        if self.reachable {
            Ok(())
        } else {
            Err("connection refused".to_string())
        }
    }
}

/// Serves `router` on an ephemeral local port.
pub async fn serve(router: Router) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    addr
}

/// Serves a fixed body at `path` (GET and HEAD).
pub async fn serve_bytes(path: &str, body: impl Into<Bytes>) -> SocketAddr {
    let body: Bytes = body.into();
    let router = Router::new().route(
        path,
        get(move || {
            let body = body.clone();
            async move { body }
        }),
    );
    serve(router).await
}

/// A shell script that answers `--version` like a release binary would.
pub fn version_script(version: &str) -> String {
    format!("#!/bin/sh\necho cluster-update {version}\n")
}
