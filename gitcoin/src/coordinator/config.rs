//! Coordinator configuration.
//!
//! Parses environment variables; every setting has a default matching the
//! classic deployment (port 34567, `origin/master`, files at the repo root).

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use super::state::StateSettings;
use crate::env::{parse_or, string_or};

pub const DEFAULT_PORT: u16 = 34567;

#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Address miners connect to
    pub listen: SocketAddr,

    /// Working copy of the mined repository
    pub repo: PathBuf,

    pub remote: String,
    pub branch: String,

    /// Delay between upstream polls
    pub poll_interval: Duration,

    /// Upper bound on any single git invocation
    pub git_timeout: Duration,

    /// Time a new connection has to send its greeting
    pub handshake_timeout: Duration,

    pub state: StateSettings,
}

impl CoordinatorConfig {
    /// Parse configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `GITCOIN_LISTEN`: listen address (default: `0.0.0.0:34567`)
    /// - `GITCOIN_REPO`: working copy (default: `.`)
    /// - `GITCOIN_REMOTE` / `GITCOIN_BRANCH`: upstream (default: `origin` / `master`)
    /// - `GITCOIN_POLL_MS`: upstream poll interval (default: 100)
    /// - `GITCOIN_GIT_TIMEOUT_SECS`: per-command git timeout (default: 60)
    /// - `GITCOIN_HANDSHAKE_SECS`: greeting deadline (default: 10)
    /// - `GITCOIN_DIFFICULTY_FILE`: difficulty file (default: `difficulty.txt`)
    /// - `GITCOIN_LEDGER_FILE`: ledger file (default: `LEDGER.txt`)
    pub fn from_env(username: impl Into<String>) -> Self {
        let default_listen = SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT));

        Self {
            listen: parse_or("GITCOIN_LISTEN", default_listen),
            repo: string_or("GITCOIN_REPO", ".").into(),
            remote: string_or("GITCOIN_REMOTE", "origin"),
            branch: string_or("GITCOIN_BRANCH", "master"),
            poll_interval: Duration::from_millis(parse_or("GITCOIN_POLL_MS", 100u64).max(1)),
            git_timeout: Duration::from_secs(parse_or("GITCOIN_GIT_TIMEOUT_SECS", 60u64).max(1)),
            handshake_timeout: Duration::from_secs(parse_or("GITCOIN_HANDSHAKE_SECS", 10u64).max(1)),
            state: StateSettings {
                username: username.into(),
                ledger_file: string_or("GITCOIN_LEDGER_FILE", "LEDGER.txt").into(),
                difficulty_file: string_or("GITCOIN_DIFFICULTY_FILE", "difficulty.txt").into(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    const VARS: &[&str] = &[
        "GITCOIN_LISTEN",
        "GITCOIN_REPO",
        "GITCOIN_POLL_MS",
        "GITCOIN_LEDGER_FILE",
    ];

    fn clear() {
        for var in VARS {
            std::env::remove_var(var);
        }
    }

    #[test]
    #[serial]
    fn test_defaults() {
        clear();
        let config = CoordinatorConfig::from_env("alice");

        assert_eq!(config.listen.port(), DEFAULT_PORT);
        assert_eq!(config.repo, PathBuf::from("."));
        assert_eq!(config.remote, "origin");
        assert_eq!(config.branch, "master");
        assert_eq!(config.poll_interval, Duration::from_millis(100));
        assert_eq!(config.state.username, "alice");
        assert_eq!(config.state.ledger_file, PathBuf::from("LEDGER.txt"));
        assert_eq!(config.state.difficulty_file, PathBuf::from("difficulty.txt"));
    }

    #[test]
    #[serial]
    fn test_overrides_and_bad_values() {
        clear();
        std::env::set_var("GITCOIN_LISTEN", "127.0.0.1:4000");
        std::env::set_var("GITCOIN_REPO", "/srv/ledger");
        std::env::set_var("GITCOIN_POLL_MS", "soon");
        std::env::set_var("GITCOIN_LEDGER_FILE", "credits.txt");

        let config = CoordinatorConfig::from_env("bob");
        assert_eq!(config.listen, "127.0.0.1:4000".parse().unwrap());
        assert_eq!(config.repo, PathBuf::from("/srv/ledger"));
        assert_eq!(config.poll_interval, Duration::from_millis(100));
        assert_eq!(config.state.ledger_file, PathBuf::from("credits.txt"));
        clear();
    }
}
