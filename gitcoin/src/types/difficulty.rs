//! Difficulty target type.

use std::fmt;

use super::object_id::{ObjectId, ObjectIdError, OBJECT_ID_HEX_LEN};
use crate::u256::U256;

/// Errors produced when reading a configured difficulty.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DifficultyError {
    #[error("difficulty has {0} characters, at most {OBJECT_ID_HEX_LEN} allowed")]
    TooLong(usize),

    #[error(transparent)]
    Invalid(#[from] ObjectIdError),
}

/// A 160-bit ceiling for commit ids.
///
/// The configured difficulty is a hex prefix of up to 40 characters, e.g.
/// `000001`. It is right-padded with `'0'` to a full 40-character value:
/// ```text
/// 000001 -> 0000010000000000000000000000000000000000
/// ```
///
/// A commit id meets the target iff it is strictly below it. Comparing the
/// raw bytes gives the same answer as comparing the lowercase hex strings,
/// and as comparing the two values as big numbers.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DifficultyTarget([u8; 20]);

impl DifficultyTarget {
    /// Derive the target from the contents of a difficulty file.
    pub fn from_config(value: &str) -> Result<Self, DifficultyError> {
        let value = value.trim();
        if value.len() > OBJECT_ID_HEX_LEN {
            return Err(DifficultyError::TooLong(value.len()));
        }

        let mut padded = String::with_capacity(OBJECT_ID_HEX_LEN);
        padded.push_str(value);
        padded.extend(std::iter::repeat('0').take(OBJECT_ID_HEX_LEN - value.len()));

        let id = ObjectId::from_ascii(padded.as_bytes())?;
        Ok(Self(*id.as_bytes()))
    }

    /// Parse a full 40-character target as sent on the wire.
    pub fn from_ascii(bytes: &[u8]) -> Result<Self, ObjectIdError> {
        ObjectId::from_ascii(bytes).map(|id| Self(*id.as_bytes()))
    }

    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    /// True if `id` is strictly below this target.
    pub fn is_met_by(&self, id: &ObjectId) -> bool {
        self.is_met_by_digest(id.as_bytes())
    }

    /// True if the raw SHA-1 digest is strictly below this target.
    #[inline]
    pub fn is_met_by_digest(&self, digest: &[u8; 20]) -> bool {
        digest < &self.0
    }

    /// Expected number of hash attempts before one meets the target.
    ///
    /// Uses the formula `2^160 / target`, saturating at `u64::MAX` (which
    /// also covers a zero target that nothing can meet).
    pub fn expected_attempts(&self) -> u64 {
        let target = U256::from_be_slice(&self.0);
        if target == U256::ZERO {
            return u64::MAX;
        }
        (U256::power_of_two(160) / target).saturating_to_u64()
    }

    /// First ten hex characters, for log lines.
    pub fn short(&self) -> String {
        hex::encode(&self.0[..5])
    }
}

impl fmt::Display for DifficultyTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for DifficultyTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DifficultyTarget({})", self)
    }
}
