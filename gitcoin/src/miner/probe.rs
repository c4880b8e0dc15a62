//! Nonce scanning backends.
//!
//! A backend hashes `prefix || nonce` for a contiguous range of nonces and
//! returns the first nonce whose SHA-1 digest is below the target. The
//! search worker re-verifies every hit, so a backend only has to be fast.

use std::fmt;
use std::ops::Range;
use std::str::FromStr;
use std::sync::Arc;

use bitcoin::hashes::{sha1, Hash, HashEngine};

use super::commit::{write_nonce, CommitTemplate, NONCE_LEN};
use crate::types::DifficultyTarget;

pub trait ProbeBackend: Send + Sync {
    fn name(&self) -> &'static str;

    /// First nonce in `nonces` whose commit id is below `target`.
    fn probe(
        &self,
        template: &CommitTemplate,
        nonces: Range<u64>,
        target: &DifficultyTarget,
    ) -> Option<u64>;
}

/// Reference backend: hashes the whole object for every nonce.
#[derive(Debug, Default)]
pub struct ScalarProbe;

impl ProbeBackend for ScalarProbe {
    fn name(&self) -> &'static str {
        "scalar"
    }

    fn probe(
        &self,
        template: &CommitTemplate,
        nonces: Range<u64>,
        target: &DifficultyTarget,
    ) -> Option<u64> {
        let prefix = template.hash_prefix();
        let mut digits = [0u8; NONCE_LEN];

        nonces.into_iter().find(|&nonce| {
            write_nonce(nonce, &mut digits);
            let mut engine = sha1::Hash::engine();
            engine.input(prefix);
            engine.input(&digits);
            target.is_met_by_digest(&sha1::Hash::from_engine(engine).to_byte_array())
        })
    }
}

/// Hashes the constant prefix once per batch and resumes from a copy of
/// that state for each nonce.
#[derive(Debug, Default)]
pub struct MidstateProbe;

impl ProbeBackend for MidstateProbe {
    fn name(&self) -> &'static str {
        "midstate"
    }

    fn probe(
        &self,
        template: &CommitTemplate,
        nonces: Range<u64>,
        target: &DifficultyTarget,
    ) -> Option<u64> {
        let mut midstate = sha1::Hash::engine();
        midstate.input(template.hash_prefix());
        let mut digits = [0u8; NONCE_LEN];

        nonces.into_iter().find(|&nonce| {
            write_nonce(nonce, &mut digits);
            let mut engine = midstate.clone();
            engine.input(&digits);
            target.is_met_by_digest(&sha1::Hash::from_engine(engine).to_byte_array())
        })
    }
}

/// Backend selector, as configured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProbeKind {
    Scalar,
    #[default]
    Midstate,
}

impl ProbeKind {
    pub fn backend(self) -> Arc<dyn ProbeBackend> {
        match self {
            ProbeKind::Scalar => Arc::new(ScalarProbe),
            ProbeKind::Midstate => Arc::new(MidstateProbe),
        }
    }
}

impl FromStr for ProbeKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "scalar" => Ok(ProbeKind::Scalar),
            "midstate" => Ok(ProbeKind::Midstate),
            other => Err(format!("unknown probe backend {:?}", other)),
        }
    }
}

impl fmt::Display for ProbeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.backend().name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CanonicalState, SessionId};

    fn template() -> CommitTemplate {
        let assignment = CanonicalState {
            parent: "1".repeat(40).parse().unwrap(),
            tree: "2".repeat(40).parse().unwrap(),
            difficulty: DifficultyTarget::from_config("0").unwrap(),
        };
        CommitTemplate::new(&assignment, "Miner <m@example.com>", 1_700_000_000, SessionId(1), 1)
    }

    #[test]
    fn test_backends_agree() {
        let template = template();
        // About one in 256 ids is below 01000...
        let target = DifficultyTarget::from_config("01").unwrap();

        let scalar = ScalarProbe.probe(&template, 0..20_000, &target);
        let midstate = MidstateProbe.probe(&template, 0..20_000, &target);

        let nonce = scalar.expect("no hit in 20000 nonces");
        assert_eq!(midstate, Some(nonce));
        assert!(target.is_met_by(&template.candidate(nonce).commit_id));

        // Nothing below the hit qualifies
        assert_eq!(ScalarProbe.probe(&template, 0..nonce, &target), None);
    }

    #[test]
    fn test_impossible_target_finds_nothing() {
        let template = template();
        let target = DifficultyTarget::from_config("").unwrap();
        assert_eq!(MidstateProbe.probe(&template, 0..5_000, &target), None);
        assert_eq!(ScalarProbe.probe(&template, 0..5_000, &target), None);
    }

    #[test]
    fn test_probe_kind_parsing() {
        assert_eq!("scalar".parse::<ProbeKind>(), Ok(ProbeKind::Scalar));
        assert_eq!(" Midstate ".parse::<ProbeKind>(), Ok(ProbeKind::Midstate));
        assert!("simd".parse::<ProbeKind>().is_err());
        assert_eq!(ProbeKind::default().to_string(), "midstate");
    }
}
