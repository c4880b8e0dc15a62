//! Git object identifiers.

use std::fmt;
use std::str::FromStr;

use bitcoin::hashes::{sha1, Hash};

/// Length of an object id in hex characters.
pub const OBJECT_ID_HEX_LEN: usize = 40;

/// Errors produced when parsing hex identifiers.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ObjectIdError {
    #[error("expected {OBJECT_ID_HEX_LEN} hex characters, got {0}")]
    InvalidLength(usize),

    #[error("invalid hex: {0}")]
    InvalidHex(#[from] hex::FromHexError),
}

/// A 20-byte SHA-1 object id (commit, tree, ...).
///
/// Always displayed as 40 lowercase hex characters. Ordering is bytewise,
/// which matches lexicographic ordering of the lowercase hex form.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjectId([u8; 20]);

impl ObjectId {
    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    /// Id of a loose object: SHA-1 over `"<kind> <len>\0" || body`.
    pub fn for_object(kind: &str, body: &[u8]) -> Self {
        use bitcoin::hashes::HashEngine;

        let mut engine = sha1::Hash::engine();
        engine.input(format!("{} {}\0", kind, body.len()).as_bytes());
        engine.input(body);
        Self(sha1::Hash::from_engine(engine).to_byte_array())
    }

    /// Parse from raw ASCII bytes (as found on the wire).
    pub fn from_ascii(bytes: &[u8]) -> Result<Self, ObjectIdError> {
        if bytes.len() != OBJECT_ID_HEX_LEN {
            return Err(ObjectIdError::InvalidLength(bytes.len()));
        }
        let mut out = [0u8; 20];
        hex::decode_to_slice(bytes, &mut out)?;
        Ok(Self(out))
    }

    /// First ten hex characters, for log lines.
    pub fn short(&self) -> String {
        hex::encode(&self.0[..5])
    }
}

impl From<sha1::Hash> for ObjectId {
    fn from(hash: sha1::Hash) -> Self {
        Self(hash.to_byte_array())
    }
}

impl FromStr for ObjectId {
    type Err = ObjectIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_ascii(s.trim().as_bytes())
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectId({})", self)
    }
}
