//! The coordinator's canonical state and the exclusive section guarding it.
//!
//! Every repository operation happens while holding the section, obtained
//! through [`CoordinatorState::enter`]. The published [`CanonicalState`] is
//! only replaced from inside the section, and the replacement is broadcast
//! before the section is released, so sessions see resets in the order the
//! state changed.

use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{watch, Mutex, MutexGuard};

use super::ledger;
use super::registry::ClientRegistry;
use super::repo::{RepoError, Repository};
use crate::tracing::prelude::*;
use crate::types::{CanonicalState, DifficultyError, DifficultyTarget};

#[derive(Error, Debug)]
pub enum CoordinatorError {
    #[error(transparent)]
    Repo(#[from] RepoError),

    #[error("failed to update ledger: {0}")]
    Ledger(#[source] std::io::Error),

    #[error("failed to read difficulty from {path}: {source}")]
    DifficultyFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid difficulty: {0}")]
    Difficulty(#[from] DifficultyError),
}

/// What a refresh needs besides the repository.
#[derive(Debug, Clone)]
pub struct StateSettings {
    /// Name credited in the ledger on every refresh
    pub username: String,

    /// Ledger path, relative to the working tree
    pub ledger_file: PathBuf,

    /// Difficulty path, relative to the working tree
    pub difficulty_file: PathBuf,
}

/// Push attempts made by this coordinator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PushStats {
    pub attempted: u64,
    pub succeeded: u64,
}

/// Contents of the exclusive section.
pub struct Section {
    repo: Arc<dyn Repository>,
    settings: StateSettings,
    pub stats: PushStats,
}

impl Section {
    pub fn repo(&self) -> &dyn Repository {
        self.repo.as_ref()
    }

    /// Re-derive the canonical state from upstream.
    ///
    /// Resets the working copy to the upstream head, credits the ledger and
    /// stages it, then reads parent, tree and difficulty.
    pub async fn refresh(&mut self) -> Result<CanonicalState, CoordinatorError> {
        let workdir = self.repo.workdir().to_path_buf();

        self.repo.reset_to_upstream().await?;
        ledger::credit_file(&workdir.join(&self.settings.ledger_file), &self.settings.username)
            .await
            .map_err(CoordinatorError::Ledger)?;
        self.repo.stage(&self.settings.ledger_file).await?;

        let parent = self.repo.head().await?;
        let tree = self.repo.write_tree().await?;

        let difficulty_path = workdir.join(&self.settings.difficulty_file);
        let configured = tokio::fs::read_to_string(&difficulty_path)
            .await
            .map_err(|source| CoordinatorError::DifficultyFile {
                path: difficulty_path,
                source,
            })?;
        let difficulty = DifficultyTarget::from_config(&configured)?;

        info!(difficulty = %difficulty.short(), %parent, "Reset to upstream");
        Ok(CanonicalState {
            parent,
            tree,
            difficulty,
        })
    }
}

pub type SectionGuard<'a> = MutexGuard<'a, Section>;

/// Owner of the canonical state.
pub struct CoordinatorState {
    section: Mutex<Section>,
    published: watch::Sender<CanonicalState>,
    registry: Arc<ClientRegistry>,
}

impl CoordinatorState {
    /// Fetch, refresh and publish the initial state.
    ///
    /// A failed fetch is only logged, so a coordinator can start from the
    /// last fetched upstream head while the remote is unreachable.
    pub async fn initialize(
        repo: Arc<dyn Repository>,
        settings: StateSettings,
        registry: Arc<ClientRegistry>,
    ) -> Result<Arc<Self>, CoordinatorError> {
        info!("Doing initial fetch...");
        if let Err(e) = repo.fetch().await {
            warn!(error = %e, "Initial fetch failed, using last known upstream");
        }

        let mut section = Section {
            repo,
            settings,
            stats: PushStats::default(),
        };
        let initial = section.refresh().await?;
        let (published, _) = watch::channel(initial);

        Ok(Arc::new(Self {
            section: Mutex::new(section),
            published,
            registry,
        }))
    }

    /// Enter the exclusive section. Callers queue in FIFO order.
    pub async fn enter(&self) -> SectionGuard<'_> {
        self.section.lock().await
    }

    /// Replace the canonical state and broadcast it.
    ///
    /// Takes the held section as proof that the caller is inside it.
    pub fn publish(&self, _held: &Section, next: CanonicalState) {
        self.published.send_replace(next);
        self.registry.broadcast(&next);
    }

    pub fn current(&self) -> CanonicalState {
        *self.published.borrow()
    }

    /// Watch the canonical state.
    pub fn subscribe(&self) -> watch::Receiver<CanonicalState> {
        self.published.subscribe()
    }

    pub fn registry(&self) -> &Arc<ClientRegistry> {
        &self.registry
    }

    pub async fn push_stats(&self) -> PushStats {
        self.enter().await.stats
    }
}
