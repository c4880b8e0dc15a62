//! Daemon lifecycle management for the coordinator and the miner.
//!
//! Both binaries share the same shape: start the service tasks on a
//! `TaskTracker`, wait for SIGINT or SIGTERM, cancel, and wait for every
//! task to wind down.

use std::sync::Arc;

use anyhow::Context;
use tokio::signal::unix::{self, SignalKind};
use tokio_util::{sync::CancellationToken, task::TaskTracker};

use crate::coordinator::{
    ClientRegistry, CoordinatorConfig, CoordinatorState, GitRepository, Server, Synchronizer,
};
use crate::miner::{MinerConfig, MinerSession};
use crate::tracing::prelude::*;

/// The main daemon.
pub struct Daemon {
    shutdown: CancellationToken,
    tracker: TaskTracker,
}

impl Daemon {
    /// Create a new daemon instance.
    pub fn new() -> Self {
        Self {
            shutdown: CancellationToken::new(),
            tracker: TaskTracker::new(),
        }
    }

    /// Token cancelled when the daemon shuts down.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Run the coordinator until shutdown is requested.
    pub async fn run_coordinator(self, config: CoordinatorConfig) -> anyhow::Result<()> {
        info!(
            username = %config.state.username,
            repo = %config.repo.display(),
            remote = %config.remote,
            branch = %config.branch,
            "Starting coordinator"
        );

        let repo = Arc::new(GitRepository::new(
            config.repo.clone(),
            config.remote.as_str(),
            config.branch.as_str(),
            config.git_timeout,
        ));
        let registry = Arc::new(ClientRegistry::new());
        let state = CoordinatorState::initialize(repo, config.state.clone(), registry)
            .await
            .context("failed to prepare the working copy")?;

        let server = Server::bind(config.listen, state.clone(), config.handshake_timeout)
            .await
            .with_context(|| format!("failed to listen on {}", config.listen))?;

        self.tracker.spawn(
            Synchronizer::new(state.clone(), config.poll_interval).run(self.shutdown.clone()),
        );
        self.tracker.spawn(server.run(self.shutdown.clone()));

        self.wait().await
    }

    /// Run the miner's session pool until shutdown is requested.
    pub async fn run_miner(self, config: MinerConfig) -> anyhow::Result<()> {
        info!(
            coordinator = %config.coordinator,
            sessions = config.sessions,
            probe = %config.probe,
            "Starting miner"
        );

        let config = Arc::new(config);
        for index in 0..config.sessions {
            let session = MinerSession::new(index, Arc::clone(&config));
            self.tracker.spawn(session.run(self.shutdown.clone()));
        }

        self.wait().await
    }

    async fn wait(self) -> anyhow::Result<()> {
        self.tracker.close();

        info!("Started.");
        info!("For debugging, set RUST_LOG=gitcoin=debug or trace.");

        // Install signal handlers
        let mut sigint = unix::signal(SignalKind::interrupt())?;
        let mut sigterm = unix::signal(SignalKind::terminate())?;

        tokio::select! {
            _ = sigint.recv() => {
                info!("Received SIGINT.");
            },
            _ = sigterm.recv() => {
                info!("Received SIGTERM.");
            },
            _ = self.shutdown.cancelled() => {},
        }

        self.shutdown.cancel();
        self.tracker.wait().await;
        info!("Exiting.");

        Ok(())
    }
}

impl Default for Daemon {
    fn default() -> Self {
        Self::new()
    }
}
