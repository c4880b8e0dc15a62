//! The miner: a pool of sessions, each searching for commits on its own
//! connection to the coordinator.

pub mod commit;
pub mod config;
pub mod probe;
pub mod session;
pub mod worker;

pub use commit::{CommitTemplate, MAX_NONCE, NONCE_LEN};
pub use config::MinerConfig;
pub use probe::{MidstateProbe, ProbeBackend, ProbeKind, ScalarProbe};
pub use session::{MinerSession, SessionError};
pub use worker::{SearchError, SearchReport, SearchWorker, Solution};
