//! Core types shared by the coordinator and the miner.
//!
//! Hex identifiers are stored as raw 20-byte arrays and rendered as 40
//! lowercase hex characters, which is also their wire form.

mod difficulty;
mod object_id;

pub use difficulty::{DifficultyError, DifficultyTarget};
pub use object_id::{ObjectId, ObjectIdError, OBJECT_ID_HEX_LEN};

use std::fmt;
use std::time::Duration;

/// Session identifier assigned by the coordinator at connect time.
///
/// Monotonic and positive for the lifetime of a coordinator process.
/// Rendered zero-padded to four digits, as in the `WELCOME` greeting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SessionId(pub u32);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}", self.0)
    }
}

/// The coordinator's authoritative view of the branch.
///
/// Replaced as a whole triple, never field by field. Miners cache the same
/// triple as their current assignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CanonicalState {
    /// Current branch head; new commits must use it as their parent.
    pub parent: ObjectId,

    /// Tree the next commit must point to (includes the staged ledger credit).
    pub tree: ObjectId,

    /// Commit ids must be strictly below this.
    pub difficulty: DifficultyTarget,
}

/// Hashrate measurement.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct HashRate(pub u64); // hashes per second

impl HashRate {
    /// Compute from a number of hashes over an elapsed period.
    pub fn from_hashes(hashes: u64, elapsed: Duration) -> Self {
        let secs = elapsed.as_secs_f64();
        if secs <= 0.0 {
            return Self(0);
        }
        Self((hashes as f64 / secs) as u64)
    }
}

impl fmt::Display for HashRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0 >= 1_000_000_000 {
            write!(f, "{:.2} GH/s", self.0 as f64 / 1_000_000_000.0)
        } else if self.0 >= 1_000_000 {
            write!(f, "{:.2} MH/s", self.0 as f64 / 1_000_000.0)
        } else if self.0 >= 1_000 {
            write!(f, "{:.2} KH/s", self.0 as f64 / 1_000.0)
        } else {
            write!(f, "{} H/s", self.0)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test]
    fn test_session_id_display_is_zero_padded() {
        assert_eq!(SessionId(7).to_string(), "0007");
        assert_eq!(SessionId(12345).to_string(), "12345");
    }

    #[test]
    fn test_hashrate_from_hashes() {
        let rate = HashRate::from_hashes(5_000_000, Duration::from_secs(2));
        assert_eq!(rate, HashRate(2_500_000));
        assert_eq!(rate.to_string(), "2.50 MH/s");

        assert_eq!(HashRate::from_hashes(10, Duration::ZERO), HashRate(0));
    }

    #[test_case(999, "999 H/s"; "hashes")]
    #[test_case(1_500, "1.50 KH/s"; "kilohashes")]
    #[test_case(3_000_000_000, "3.00 GH/s"; "gigahashes")]
    fn test_hashrate_display_units(rate: u64, expected: &str) {
        assert_eq!(HashRate(rate).to_string(), expected);
    }
}
