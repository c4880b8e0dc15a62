//! TCP front end of the coordinator.
//!
//! Each connection runs its own task: handshake, registration, then a read
//! loop feeding submissions to the [`Gate`]. Outbound lines go through an
//! unbounded queue drained by a per-connection writer task, so a slow or dead
//! miner never stalls a broadcast.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_util::codec::Framed;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use super::gate::{Gate, Verdict};
use super::state::CoordinatorState;
use crate::protocol::{ClientMessage, ProtocolError, ServerCodec, ServerMessage};
use crate::tracing::prelude::*;
use crate::types::SessionId;

const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

pub struct Server {
    listener: TcpListener,
    state: Arc<CoordinatorState>,
    gate: Gate,
    handshake_timeout: Duration,
}

impl Server {
    pub async fn bind(
        addr: SocketAddr,
        state: Arc<CoordinatorState>,
        handshake_timeout: Duration,
    ) -> io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        let gate = Gate::new(state.clone());
        Ok(Self {
            listener,
            state,
            gate,
            handshake_timeout,
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept connections until `shutdown`, then wait for them to close.
    pub async fn run(self, shutdown: CancellationToken) {
        let tracker = TaskTracker::new();
        info!(addr = ?self.listener.local_addr().ok(), "Waiting for miners");

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                accepted = self.listener.accept() => {
                    let (stream, peer) = match accepted {
                        Ok(accepted) => accepted,
                        Err(e) => {
                            warn!(error = %e, "Accept failed");
                            if !pause_after_accept_error(&shutdown).await {
                                break;
                            }
                            continue;
                        }
                    };

                    let connection = Connection {
                        id: self.state.registry().allocate_id(),
                        peer,
                        state: self.state.clone(),
                        gate: self.gate.clone(),
                        shutdown: shutdown.clone(),
                    };
                    info!(session = %connection.id, %peer, "New connection");
                    tracker.spawn(connection.serve(stream, self.handshake_timeout));
                }
            }
        }

        tracker.close();
        tracker.wait().await;
        debug!("Server stopped");
    }
}

/// Wait before accepting again after a failed accept.
///
/// Errors such as EMFILE persist until connections close. Returns false if
/// shutdown was requested while waiting.
async fn pause_after_accept_error(shutdown: &CancellationToken) -> bool {
    tokio::select! {
        _ = shutdown.cancelled() => false,
        _ = tokio::time::sleep(ACCEPT_BACKOFF) => true,
    }
}

struct Connection {
    id: SessionId,
    peer: SocketAddr,
    state: Arc<CoordinatorState>,
    gate: Gate,
    shutdown: CancellationToken,
}

impl Connection {
    async fn serve(self, stream: TcpStream, handshake_timeout: Duration) {
        let mut framed = Framed::new(stream, ServerCodec::new(self.id));

        if let Err(e) = Self::handshake(&mut framed, handshake_timeout).await {
            debug!(session = %self.id, peer = %self.peer, error = %e, "Handshake failed");
            return;
        }

        let (sink, mut frames) = framed.split();
        let (outbound, queued) = mpsc::unbounded_channel();

        // Welcome goes out before the first reset queued by registration
        let _ = outbound.send(ServerMessage::Welcome(self.id));
        self.state
            .registry()
            .register(self.id, outbound, || self.state.current());
        info!(session = %self.id, "Welcoming complete");

        let id = self.id;
        let writer = tokio::spawn(async move {
            let outgoing = UnboundedReceiverStream::new(queued).map(Ok::<_, ProtocolError>);
            if let Err(e) = outgoing.forward(sink).await {
                debug!(session = %id, error = %e, "Writer stopped");
            }
        });

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                frame = frames.next() => match frame {
                    Some(Ok(message)) => self.dispatch(message).await,
                    Some(Err(e)) => {
                        debug!(session = %self.id, error = %e, "Read failed");
                        break;
                    }
                    None => break,
                }
            }
        }

        self.state.registry().deregister(self.id);
        writer.abort();
        info!(session = %self.id, "Client left");
    }

    async fn handshake(
        framed: &mut Framed<TcpStream, ServerCodec>,
        deadline: Duration,
    ) -> Result<(), ProtocolError> {
        match tokio::time::timeout(deadline, framed.next()).await {
            Ok(Some(Ok(ClientMessage::Hello))) => Ok(()),
            Ok(Some(Ok(ClientMessage::Submit(_)))) => {
                Err(ProtocolError::BadGreeting("submission before greeting".into()))
            }
            Ok(Some(Err(e))) => Err(e),
            Ok(None) => Err(ProtocolError::Disconnected),
            Err(_) => Err(ProtocolError::HandshakeTimeout),
        }
    }

    async fn dispatch(&self, message: ClientMessage) {
        let ClientMessage::Submit(candidate) = message else {
            return;
        };

        info!(
            session = %self.id,
            commit = %candidate.commit_id,
            parent = %candidate.parent,
            "Received candidate"
        );

        let verdict = self.gate.submit(&candidate).await;
        debug!(session = %self.id, ?verdict, "Candidate evaluated");

        // Only the sender hears about an invalid candidate
        if let Verdict::Invalid(_) = verdict {
            self.state
                .registry()
                .send_reset(self.id, &self.state.current());
        }
    }
}
