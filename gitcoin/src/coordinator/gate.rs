//! Evaluation of submitted commits.
//!
//! The gate decides whether a candidate becomes the new branch head. All of
//! its work happens inside the exclusive section, so at most one candidate
//! per parent can ever be pushed by this coordinator.

use std::sync::Arc;

use super::repo::{PushOutcome, RepoError};
use super::state::{CoordinatorState, Section};
use crate::protocol::CommitCandidate;
use crate::tracing::prelude::*;
use crate::types::ObjectId;

/// Why a candidate built on the current parent was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvalidReason {
    /// Claimed id is not below the difficulty target
    AboveTarget,

    /// The object store computed a different id for the body
    IdMismatch { stored: ObjectId },
}

/// Outcome of a submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Built on an outdated parent; nothing changed
    Stale,

    /// Built on the current parent but unusable; nothing changed
    Invalid(InvalidReason),

    /// Pushed upstream; the branch advanced
    Won,

    /// Upstream moved first; rolled back to the remote head
    LostRace,

    /// A repository command failed midway
    Failed,
}

impl Verdict {
    /// Whether the gate refreshed and broadcast the canonical state.
    pub fn refreshed(&self) -> bool {
        matches!(self, Verdict::Won | Verdict::LostRace | Verdict::Failed)
    }
}

#[derive(Clone)]
pub struct Gate {
    state: Arc<CoordinatorState>,
}

impl Gate {
    pub fn new(state: Arc<CoordinatorState>) -> Self {
        Self { state }
    }

    /// Evaluate `candidate` and, if it survives, try to push it.
    ///
    /// Once a candidate reaches the push stage the canonical state is always
    /// refreshed and broadcast, whatever the outcome.
    pub async fn submit(&self, candidate: &CommitCandidate) -> Verdict {
        let mut section = self.state.enter().await;
        let current = self.state.current();

        if candidate.parent != current.parent {
            warn!(parent = %candidate.parent, "Candidate parent is already outdated");
            return Verdict::Stale;
        }
        if !current.difficulty.is_met_by(&candidate.commit_id) {
            warn!(
                commit = %candidate.commit_id,
                difficulty = %current.difficulty.short(),
                "Candidate does not meet target"
            );
            return Verdict::Invalid(InvalidReason::AboveTarget);
        }

        let verdict = match advance(&mut section, candidate).await {
            Ok(verdict) => verdict,
            Err(e) => {
                error!(commit = %candidate.commit_id, error = %e, "Commit failed");
                Verdict::Failed
            }
        };
        if !verdict.refreshed() {
            return verdict;
        }

        match section.refresh().await {
            Ok(next) => {
                self.state.publish(&section, next);
                info!(parent = %next.parent, "Reset after commit");
            }
            Err(e) => error!(error = %e, "Refresh after commit failed"),
        }
        verdict
    }
}

/// Write, check out and push `candidate`.
async fn advance(section: &mut Section, candidate: &CommitCandidate) -> Result<Verdict, RepoError> {
    info!(
        commit = %candidate.commit_id,
        parent = %candidate.parent,
        "Committing"
    );

    let stored = section.repo().write_commit(&candidate.body).await?;
    if stored != candidate.commit_id {
        warn!(claimed = %candidate.commit_id, %stored, "Commit id does not match body");
        return Ok(Verdict::Invalid(InvalidReason::IdMismatch { stored }));
    }

    section.repo().reset_hard(&stored).await?;

    section.stats.attempted += 1;
    let pushed = section.repo().push().await;
    let verdict = match pushed {
        Ok(PushOutcome::Accepted) => {
            section.stats.succeeded += 1;
            info!(commit = %stored, "Commit pushed upstream");
            Verdict::Won
        }
        Ok(PushOutcome::Rejected) => {
            info!(commit = %stored, "Commit was too late");
            if let Err(e) = section.repo().fetch().await {
                warn!(error = %e, "Fetch after lost race failed");
            }
            section.repo().reset_to_upstream().await?;
            Verdict::LostRace
        }
        Err(e) => return Err(e),
    };

    info!(
        "{} of {} commits have succeeded so far",
        section.stats.succeeded, section.stats.attempted
    );
    Ok(verdict)
}
