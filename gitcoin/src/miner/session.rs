//! One miner session: a coordinator connection plus at most one search.

use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_util::codec::Framed;
use tokio_util::sync::CancellationToken;

use super::commit::CommitTemplate;
use super::config::MinerConfig;
use super::probe::ProbeBackend;
use super::worker::{SearchError, SearchJob, SearchReport, SearchWorker, Solution};
use crate::protocol::{ClientMessage, MinerCodec, ProtocolError, ServerMessage};
use crate::tracing::prelude::*;
use crate::types::{CanonicalState, DifficultyTarget, ObjectId, SessionId};

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("failed to connect to {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Search(#[from] SearchError),
}

/// Assignment fields received so far. Values persist across resets, so a
/// reset only needs to be preceded by the fields that changed.
#[derive(Debug, Default)]
struct PendingAssignment {
    parent: Option<ObjectId>,
    tree: Option<ObjectId>,
    difficulty: Option<DifficultyTarget>,
}

impl PendingAssignment {
    fn complete(&self) -> Option<CanonicalState> {
        Some(CanonicalState {
            parent: self.parent?,
            tree: self.tree?,
            difficulty: self.difficulty?,
        })
    }
}

/// A long-running session that reconnects whenever its connection drops.
pub struct MinerSession {
    index: usize,
    config: Arc<MinerConfig>,
    backend: Arc<dyn ProbeBackend>,
}

impl MinerSession {
    pub fn new(index: usize, config: Arc<MinerConfig>) -> Self {
        let backend = config.probe.backend();
        Self {
            index,
            config,
            backend,
        }
    }

    pub async fn run(self, shutdown: CancellationToken) {
        loop {
            match self.connect_and_serve(&shutdown).await {
                Ok(()) => break,
                Err(e) => warn!(worker = self.index, error = %e, "Session ended"),
            }

            debug!(
                worker = self.index,
                delay_secs = self.config.reconnect_delay.as_secs(),
                "Reconnecting after delay"
            );
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(self.config.reconnect_delay) => {}
            }
        }
    }

    async fn connect_and_serve(&self, shutdown: &CancellationToken) -> Result<(), SessionError> {
        info!(worker = self.index, addr = %self.config.coordinator, "Connecting");
        let stream = TcpStream::connect(&self.config.coordinator)
            .await
            .map_err(|source| SessionError::Connect {
                addr: self.config.coordinator.clone(),
                source,
            })?;
        serve(stream, &self.config, Arc::clone(&self.backend), shutdown).await
    }
}

/// Greet the coordinator and return the session id it assigns.
async fn handshake<T>(
    framed: &mut Framed<T, MinerCodec>,
    deadline: Duration,
) -> Result<SessionId, ProtocolError>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    framed.send(ClientMessage::Hello).await?;
    match tokio::time::timeout(deadline, framed.next()).await {
        Ok(Some(Ok(ServerMessage::Welcome(id)))) => Ok(id),
        Ok(Some(Ok(other))) => Err(ProtocolError::UnexpectedLine(format!("{:?}", other))),
        Ok(Some(Err(e))) => Err(e),
        Ok(None) => Err(ProtocolError::Disconnected),
        Err(_) => Err(ProtocolError::HandshakeTimeout),
    }
}

/// Run the session protocol over an established connection.
///
/// Returns `Ok` only on shutdown; a closed connection is an error so the
/// caller reconnects.
pub async fn serve<T>(
    io: T,
    config: &MinerConfig,
    backend: Arc<dyn ProbeBackend>,
    shutdown: &CancellationToken,
) -> Result<(), SessionError>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    let mut framed = Framed::new(io, MinerCodec);
    let id = handshake(&mut framed, config.handshake_timeout).await?;
    info!(session = %id, "Connection established");

    let (solutions_tx, mut solutions) = mpsc::unbounded_channel::<Solution>();
    let mut pending = PendingAssignment::default();
    let mut attempt = 0u32;
    let mut worker: Option<SearchWorker> = None;

    let result = loop {
        tokio::select! {
            _ = shutdown.cancelled() => break Ok(()),

            frame = framed.next() => {
                let message = match frame {
                    Some(Ok(message)) => message,
                    Some(Err(e)) => break Err(e.into()),
                    None => break Err(ProtocolError::Disconnected.into()),
                };

                match message {
                    ServerMessage::Parent(parent) => pending.parent = Some(parent),
                    ServerMessage::Tree(tree) => pending.tree = Some(tree),
                    ServerMessage::Difficulty(target) => pending.difficulty = Some(target),
                    ServerMessage::Welcome(_) => warn!(session = %id, "Ignoring repeated welcome"),
                    ServerMessage::Reset => {
                        let Some(assignment) = pending.complete() else {
                            debug!(session = %id, "Reset before a full assignment");
                            continue;
                        };

                        if let Some(previous) = worker.take() {
                            log_report(id, previous.attempt(), previous.stop().await);
                        }

                        attempt += 1;
                        match start_search(id, attempt, &assignment, config, &backend, &solutions_tx) {
                            Ok(started) => worker = Some(started),
                            Err(e) => break Err(e.into()),
                        }
                    }
                }
            }

            Some(solution) = solutions.recv() => {
                if worker.as_ref().map(SearchWorker::attempt) != Some(solution.attempt) {
                    debug!(session = %id, attempt = solution.attempt, "Discarding stale solution");
                    continue;
                }
                if let Some(finished) = worker.take() {
                    log_report(id, finished.attempt(), finished.stop().await);
                }

                info!(
                    session = %id,
                    commit = %solution.candidate.commit_id,
                    parent = %solution.candidate.parent,
                    "Submitting commit"
                );
                if let Err(e) = framed.send(ClientMessage::Submit(solution.candidate)).await {
                    break Err(e.into());
                }
            }
        }
    };

    if let Some(active) = worker.take() {
        active.stop().await;
    }
    result
}

fn start_search(
    id: SessionId,
    attempt: u32,
    assignment: &CanonicalState,
    config: &MinerConfig,
    backend: &Arc<dyn ProbeBackend>,
    solutions: &mpsc::UnboundedSender<Solution>,
) -> Result<SearchWorker, SearchError> {
    let timestamp = time::OffsetDateTime::now_utc().unix_timestamp();
    let template = CommitTemplate::new(assignment, &config.author, timestamp, id, attempt);

    debug!(
        session = %id,
        attempt,
        difficulty = %assignment.difficulty.short(),
        parent = %assignment.parent,
        expected = assignment.difficulty.expected_attempts(),
        "Solving"
    );

    SearchWorker::spawn(
        format!("search-{}", id),
        SearchJob {
            template,
            target: assignment.difficulty,
            attempt,
            batch_size: config.batch_size,
        },
        Arc::clone(backend),
        solutions.clone(),
    )
}

fn log_report(id: SessionId, attempt: u32, report: Option<SearchReport>) {
    if let Some(report) = report {
        debug!(
            session = %id,
            attempt,
            hashes = report.hashes,
            hashrate = %report.hashrate(),
            "Search finished"
        );
    }
}
