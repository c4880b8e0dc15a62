//! Miner configuration.
//!
//! Parses environment variables to configure the search sessions.

use std::time::Duration;

use super::probe::ProbeKind;
use crate::env::{parse_or, string_or};

/// Nonces scanned between stop-flag checks.
pub const DEFAULT_BATCH_SIZE: u64 = 120_000;

#[derive(Debug, Clone)]
pub struct MinerConfig {
    /// Coordinator address, `host:port`
    pub coordinator: String,

    /// Number of parallel sessions, each with its own connection and thread.
    pub sessions: usize,

    /// Identity used as commit author and committer, `Name <email>`
    pub author: String,

    pub batch_size: u64,
    pub probe: ProbeKind,

    /// Wait before reconnecting after a lost connection
    pub reconnect_delay: Duration,

    /// Time the coordinator has to answer the greeting
    pub handshake_timeout: Duration,
}

impl MinerConfig {
    /// Parse configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `GITCOIN_COORDINATOR`: coordinator address (default: `127.0.0.1:34567`)
    /// - `GITCOIN_MINER_SESSIONS`: parallel sessions (default: available cores)
    /// - `GITCOIN_AUTHOR`: commit identity (default: `Gitcoin Miner <miner@gitcoin.invalid>`)
    /// - `GITCOIN_BATCH_SIZE`: nonces per batch (default: 120000)
    /// - `GITCOIN_PROBE`: `midstate` or `scalar` (default: `midstate`)
    /// - `GITCOIN_RECONNECT_SECS`: reconnect delay (default: 5)
    /// - `GITCOIN_HANDSHAKE_SECS`: greeting deadline (default: 10)
    pub fn from_env() -> Self {
        let cores = std::thread::available_parallelism().map_or(1, |n| n.get());

        Self {
            coordinator: string_or("GITCOIN_COORDINATOR", "127.0.0.1:34567"),
            sessions: parse_or("GITCOIN_MINER_SESSIONS", cores).max(1),
            author: string_or("GITCOIN_AUTHOR", "Gitcoin Miner <miner@gitcoin.invalid>"),
            batch_size: parse_or("GITCOIN_BATCH_SIZE", DEFAULT_BATCH_SIZE).max(1),
            probe: parse_or("GITCOIN_PROBE", ProbeKind::default()),
            reconnect_delay: Duration::from_secs(parse_or("GITCOIN_RECONNECT_SECS", 5u64)),
            handshake_timeout: Duration::from_secs(parse_or("GITCOIN_HANDSHAKE_SECS", 10u64).max(1)),
        }
    }
}
