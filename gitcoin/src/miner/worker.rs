//! Search worker: scans nonces for one assignment on a dedicated thread.
//!
//! Hashing is CPU-bound, so each worker runs on its own `std::thread` and
//! never blocks the Tokio runtime. The worker checks its stop flag between
//! batches; a solution is sent over a channel, and a final report goes back
//! through a oneshot when the thread exits.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

use super::commit::{CommitTemplate, MAX_NONCE};
use super::probe::ProbeBackend;
use crate::protocol::CommitCandidate;
use crate::tracing::prelude::*;
use crate::types::{DifficultyTarget, HashRate};

#[derive(Error, Debug)]
pub enum SearchError {
    #[error("failed to spawn search thread: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("batch size must be positive")]
    EmptyBatch,
}

/// A verified winning commit.
#[derive(Debug, Clone)]
pub struct Solution {
    /// Attempt number of the assignment it was found for
    pub attempt: u32,
    pub nonce: u64,
    pub candidate: CommitCandidate,
}

/// Summary of a finished search.
#[derive(Debug, Clone, Copy)]
pub struct SearchReport {
    pub hashes: u64,
    pub elapsed: Duration,
    pub found: bool,
}

impl SearchReport {
    pub fn hashrate(&self) -> HashRate {
        HashRate::from_hashes(self.hashes, self.elapsed)
    }
}

/// What a worker searches for.
pub struct SearchJob {
    pub template: CommitTemplate,
    pub target: DifficultyTarget,
    pub attempt: u32,
    pub batch_size: u64,
}

/// Handle to a running search.
///
/// Dropping the handle asks the thread to stop; [`SearchWorker::stop`] also
/// waits for it.
pub struct SearchWorker {
    attempt: u32,
    shutdown: Arc<AtomicBool>,
    done: Option<oneshot::Receiver<SearchReport>>,
}

impl SearchWorker {
    pub fn spawn(
        name: String,
        job: SearchJob,
        backend: Arc<dyn ProbeBackend>,
        solutions: mpsc::UnboundedSender<Solution>,
    ) -> Result<Self, SearchError> {
        if job.batch_size == 0 {
            return Err(SearchError::EmptyBatch);
        }

        let shutdown = Arc::new(AtomicBool::new(false));
        let (done_tx, done_rx) = oneshot::channel();
        let attempt = job.attempt;

        let flag = Arc::clone(&shutdown);
        std::thread::Builder::new().name(name).spawn(move || {
            let report = search(&job, backend.as_ref(), &flag, &solutions);
            let _ = done_tx.send(report);
        })?;

        Ok(Self {
            attempt,
            shutdown,
            done: Some(done_rx),
        })
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Signal the thread to stop and wait until it has.
    pub async fn stop(mut self) -> Option<SearchReport> {
        self.shutdown.store(true, Ordering::Relaxed);
        let done = self.done.take()?;
        done.await.ok()
    }
}

impl Drop for SearchWorker {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
    }
}

/// The scan loop. Runs until a verified solution, exhaustion, or shutdown.
fn search(
    job: &SearchJob,
    backend: &dyn ProbeBackend,
    shutdown: &AtomicBool,
    solutions: &mpsc::UnboundedSender<Solution>,
) -> SearchReport {
    let started = Instant::now();
    let mut next = 0u64;
    let mut hashes = 0u64;
    let mut found = false;

    while next <= MAX_NONCE && !shutdown.load(Ordering::Relaxed) {
        let end = next.saturating_add(job.batch_size).min(MAX_NONCE + 1);

        let Some(nonce) = backend.probe(&job.template, next..end, &job.target) else {
            hashes += end - next;
            next = end;
            continue;
        };
        if !(next..end).contains(&nonce) {
            error!(
                backend = backend.name(),
                nonce = %format!("{:09x}", nonce),
                start = %format!("{:09x}", next),
                end = %format!("{:09x}", end),
                "Probe hit outside the scanned batch"
            );
            hashes += end - next;
            next = end;
            continue;
        }
        hashes += nonce - next + 1;

        let candidate = job.template.candidate(nonce);
        if !job.target.is_met_by(&candidate.commit_id) {
            error!(
                backend = backend.name(),
                nonce = %format!("{:09x}", nonce),
                commit = %candidate.commit_id,
                "Probe hit does not meet target"
            );
            next = nonce + 1;
            continue;
        }

        info!(
            attempt = job.attempt,
            nonce = %format!("{:09x}", nonce),
            commit = %candidate.commit_id,
            "Found a solution"
        );
        found = true;
        let _ = solutions.send(Solution {
            attempt: job.attempt,
            nonce,
            candidate,
        });
        break;
    }

    let report = SearchReport {
        hashes,
        elapsed: started.elapsed(),
        found,
    };
    debug!(
        attempt = job.attempt,
        hashes,
        hashrate = %report.hashrate(),
        "Search stopped"
    );
    report
}
