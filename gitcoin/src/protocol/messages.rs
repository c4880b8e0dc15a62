//! Message types exchanged between coordinator and miners.

use crate::types::{CanonicalState, DifficultyTarget, ObjectId, SessionId};

/// A commit proposed by a miner as the next branch head.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitCandidate {
    /// Head the commit was built on
    pub parent: ObjectId,

    /// Claimed object id of `body`
    pub commit_id: ObjectId,

    /// Raw commit object (without the `commit <len>\0` header)
    pub body: Vec<u8>,
}

/// Lines pushed from the coordinator to a miner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerMessage {
    /// `WELCOME %04d`, sent once after a valid greeting
    Welcome(SessionId),

    /// `P <hex>`
    Parent(ObjectId),

    /// `T <hex>`
    Tree(ObjectId),

    /// `D <hex>`
    Difficulty(DifficultyTarget),

    /// `R `, the trigger to (re)start searching
    Reset,
}

impl ServerMessage {
    /// The four-line reset sequence for `state`, in wire order.
    pub fn reset_sequence(state: &CanonicalState) -> [ServerMessage; 4] {
        [
            ServerMessage::Parent(state.parent),
            ServerMessage::Tree(state.tree),
            ServerMessage::Difficulty(state.difficulty),
            ServerMessage::Reset,
        ]
    }
}

/// Messages sent from a miner to the coordinator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientMessage {
    /// The 6-byte greeting `HELLO\n`
    Hello,

    /// `C <parent> <commit> <len>\n<body>\n`
    Submit(CommitCandidate),
}
