//! Table of connected miner sessions.
//!
//! The registry is only used to fan out resets. Each session owns an
//! unbounded outbound queue drained by its own writer task, so sending under
//! the registry lock never touches a socket and never blocks.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::mpsc::UnboundedSender;

use crate::protocol::ServerMessage;
use crate::tracing::prelude::*;
use crate::types::{CanonicalState, SessionId};

struct Entry {
    outbound: UnboundedSender<ServerMessage>,
    last_assignment: Option<CanonicalState>,
}

impl Entry {
    /// Queue the reset sequence for `state`. Returns false if the session's
    /// writer has gone away.
    fn send_reset(&mut self, state: &CanonicalState) -> bool {
        for message in ServerMessage::reset_sequence(state) {
            if self.outbound.send(message).is_err() {
                return false;
            }
        }
        self.last_assignment = Some(*state);
        true
    }
}

pub struct ClientRegistry {
    next_id: AtomicU32,
    sessions: Mutex<HashMap<SessionId, Entry>>,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU32::new(1),
            sessions: Mutex::new(HashMap::new()),
        }
    }

    fn sessions(&self) -> MutexGuard<'_, HashMap<SessionId, Entry>> {
        // Entries stay consistent even if a holder panicked
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Hand out the next session id. Ids start at 1 and are never reused.
    pub fn allocate_id(&self) -> SessionId {
        SessionId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Add a session and queue its first reset.
    ///
    /// `snapshot` is evaluated under the registry lock, which orders this
    /// registration against any concurrent broadcast: either the broadcast
    /// sees the new entry, or `snapshot` already returns the newer state.
    pub fn register(
        &self,
        id: SessionId,
        outbound: UnboundedSender<ServerMessage>,
        snapshot: impl FnOnce() -> CanonicalState,
    ) {
        let mut sessions = self.sessions();
        let mut entry = Entry {
            outbound,
            last_assignment: None,
        };
        entry.send_reset(&snapshot());
        sessions.insert(id, entry);
        debug!(session = %id, clients = sessions.len(), "Registered");
    }

    pub fn deregister(&self, id: SessionId) -> bool {
        self.sessions().remove(&id).is_some()
    }

    pub fn len(&self) -> usize {
        self.sessions().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Queue a reset for a single session.
    pub fn send_reset(&self, id: SessionId, state: &CanonicalState) -> bool {
        self.sessions()
            .get_mut(&id)
            .is_some_and(|entry| entry.send_reset(state))
    }

    /// Queue a reset for every registered session.
    ///
    /// A session whose writer is gone is skipped but stays registered until
    /// its own read side notices the disconnect. Returns the number of
    /// sessions reached.
    pub fn broadcast(&self, state: &CanonicalState) -> usize {
        let mut sessions = self.sessions();
        let mut reached = 0;
        for (id, entry) in sessions.iter_mut() {
            if entry.send_reset(state) {
                reached += 1;
            } else {
                trace!(session = %id, "Reset not delivered");
            }
        }
        debug!(reached, clients = sessions.len(), parent = %state.parent, "Broadcast reset");
        reached
    }

    /// The state most recently queued for `id`.
    pub fn last_assignment(&self, id: SessionId) -> Option<CanonicalState> {
        self.sessions().get(&id).and_then(|entry| entry.last_assignment)
    }
}

impl Default for ClientRegistry {
    fn default() -> Self {
        Self::new()
    }
}
