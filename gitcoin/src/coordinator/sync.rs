//! Background loop following the upstream branch.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use super::state::{CoordinatorError, CoordinatorState};
use crate::tracing::prelude::*;
use crate::types::{CanonicalState, ObjectId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    Unchanged,
    Updated(CanonicalState),
}

/// Polls upstream and republishes the canonical state when it moves.
pub struct Synchronizer {
    state: Arc<CoordinatorState>,
    interval: Duration,
}

impl Synchronizer {
    pub fn new(state: Arc<CoordinatorState>, interval: Duration) -> Self {
        Self { state, interval }
    }

    /// One poll: fetch, and refresh if upstream no longer matches our parent.
    pub async fn tick(&self) -> Result<SyncOutcome, CoordinatorError> {
        let mut section = self.state.enter().await;
        let upstream: ObjectId = section.repo().fetch().await?;
        if upstream == self.state.current().parent {
            return Ok(SyncOutcome::Unchanged);
        }

        info!(%upstream, "Upstream moved");
        let next = section.refresh().await?;
        self.state.publish(&section, next);
        Ok(SyncOutcome::Updated(next))
    }

    pub async fn run(self, shutdown: CancellationToken) {
        info!(interval_ms = self.interval.as_millis() as u64, "Following upstream");

        let mut ticker = tokio::time::interval(self.interval);
        // Ticks missed while waiting on the section are not replayed
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    if let Err(e) = self.tick().await {
                        warn!(error = %e, "Upstream sync failed");
                    }
                }
            }
        }
        debug!("Synchronizer stopped");
    }
}
