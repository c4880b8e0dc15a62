//! Commit objects built by the miner.
//!
//! A candidate is a plain git commit whose message ends in a fixed-width
//! nonce:
//!
//! ```text
//! tree <tree>
//! parent <parent>
//! author <identity> <unix time> +0000
//! committer <identity> <unix time> +0000
//!
//! Give me a Gitcoin <session:04>-<attempt:06>-<nonce:09x>
//! ```
//!
//! Because the nonce is the last thing hashed and always nine characters,
//! the object header and everything before the nonce form a constant prefix
//! for the whole search.

use crate::protocol::CommitCandidate;
use crate::types::{CanonicalState, ObjectId, SessionId};

/// Width of the hex nonce at the end of the message.
pub const NONCE_LEN: usize = 9;

/// Largest nonce that fits in [`NONCE_LEN`] hex digits.
pub const MAX_NONCE: u64 = (1 << (4 * NONCE_LEN)) - 1;

const HEX_DIGITS: &[u8; 16] = b"0123456789abcdef";

/// Render `nonce` as lowercase zero-padded hex into `out`.
#[inline]
pub fn write_nonce(nonce: u64, out: &mut [u8; NONCE_LEN]) {
    let mut rest = nonce;
    for slot in out.iter_mut().rev() {
        *slot = HEX_DIGITS[(rest & 0xf) as usize];
        rest >>= 4;
    }
}

/// Everything about a candidate except its nonce.
#[derive(Debug, Clone)]
pub struct CommitTemplate {
    parent: ObjectId,
    /// `commit <len>\0` followed by the body up to the nonce
    prefix: Vec<u8>,
    header_len: usize,
}

impl CommitTemplate {
    pub fn new(
        assignment: &CanonicalState,
        author: &str,
        timestamp: i64,
        session: SessionId,
        attempt: u32,
    ) -> Self {
        let body_prefix = format!(
            "tree {tree}\n\
             parent {parent}\n\
             author {author} {timestamp} +0000\n\
             committer {author} {timestamp} +0000\n\
             \n\
             Give me a Gitcoin {session}-{attempt:06}-",
            tree = assignment.tree,
            parent = assignment.parent,
        );
        let header = format!("commit {}\0", body_prefix.len() + NONCE_LEN);

        let mut prefix = Vec::with_capacity(header.len() + body_prefix.len());
        prefix.extend_from_slice(header.as_bytes());
        prefix.extend_from_slice(body_prefix.as_bytes());

        Self {
            parent: assignment.parent,
            prefix,
            header_len: header.len(),
        }
    }

    pub fn parent(&self) -> ObjectId {
        self.parent
    }

    /// Bytes hashed before the nonce, object header included.
    pub fn hash_prefix(&self) -> &[u8] {
        &self.prefix
    }

    /// Full commit body (no object header) for `nonce`.
    pub fn body(&self, nonce: u64) -> Vec<u8> {
        let mut digits = [0u8; NONCE_LEN];
        write_nonce(nonce, &mut digits);

        let mut body = Vec::with_capacity(self.prefix.len() - self.header_len + NONCE_LEN);
        body.extend_from_slice(&self.prefix[self.header_len..]);
        body.extend_from_slice(&digits);
        body
    }

    /// Serialize the commit for `nonce` and hash it from scratch.
    pub fn candidate(&self, nonce: u64) -> CommitCandidate {
        let body = self.body(nonce);
        CommitCandidate {
            parent: self.parent,
            commit_id: ObjectId::for_object("commit", &body),
            body,
        }
    }
}
