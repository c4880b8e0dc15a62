//! 256-bit unsigned integer arithmetic.
//!
//! Wraps `ruint::aliases::U256` so callers never depend on the underlying
//! library directly. Targets are 160-bit, so every value we handle fits with
//! room to spare for `2^160` itself.

use ruint::aliases::U256 as Ruint256;
use std::ops::Div;

/// A 256-bit unsigned integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct U256(Ruint256);

impl U256 {
    /// Zero constant.
    pub const ZERO: Self = Self(Ruint256::ZERO);

    /// Create from big-endian bytes shorter than or equal to 32 bytes.
    ///
    /// Shorter inputs are treated as the low-order bytes of the value.
    pub fn from_be_slice(bytes: &[u8]) -> Self {
        debug_assert!(bytes.len() <= 32);
        let mut padded = [0u8; 32];
        padded[32 - bytes.len()..].copy_from_slice(bytes);
        Self(Ruint256::from_be_bytes(padded))
    }

    /// `2^bits`, for `bits < 256`.
    pub fn power_of_two(bits: usize) -> Self {
        Self(Ruint256::from(1u64) << bits)
    }

    /// Convert to u64, saturating at u64::MAX.
    pub fn saturating_to_u64(self) -> u64 {
        self.0.saturating_to()
    }
}

impl Div for U256 {
    type Output = Self;

    fn div(self, rhs: Self) -> Self::Output {
        Self(self.0 / rhs.0)
    }
}
