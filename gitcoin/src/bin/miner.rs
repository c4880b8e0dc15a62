//! Gitcoin CPU miner daemon.

use anyhow::Result;
use clap::Parser;

use gitcoin::daemon::Daemon;
use gitcoin::miner::MinerConfig;
use gitcoin::tracing;

/// Mine proof-of-work commits for a gitcoin coordinator
///
/// Configuration comes from GITCOIN_* environment variables; see
/// GITCOIN_COORDINATOR, GITCOIN_MINER_SESSIONS and GITCOIN_PROBE.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {}

#[tokio::main]
async fn main() -> Result<()> {
    Args::parse();
    tracing::init_journald_or_stdout();

    Daemon::new().run_miner(MinerConfig::from_env()).await
}
