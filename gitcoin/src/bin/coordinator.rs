//! Gitcoin coordinator daemon.

use anyhow::Result;
use clap::Parser;

use gitcoin::coordinator::CoordinatorConfig;
use gitcoin::daemon::Daemon;
use gitcoin::tracing;

/// Serve mining assignments and push winning commits upstream
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Username credited in the ledger for every commit this coordinator lands
    #[arg(value_parser = parse_username)]
    username: String,
}

fn parse_username(raw: &str) -> Result<String, String> {
    let name = raw.trim();
    if name.is_empty() {
        return Err("username must not be empty".into());
    }
    if name.contains(':') || name.contains(['\n', '\r']) {
        return Err("username must not contain ':' or line breaks".into());
    }
    Ok(name.to_string())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    tracing::init_journald_or_stdout();

    Daemon::new()
        .run_coordinator(CoordinatorConfig::from_env(args.username))
        .await
}
