//! Gitcoin: a coordinator and CPU miner that race proof-of-work commits
//! onto a shared git branch.
//!
//! The coordinator owns a working copy and hands every connected miner the
//! same assignment (parent, tree, difficulty). Miners grind a nonce in the
//! commit message until the commit's object id falls under the target, then
//! submit it. The coordinator verifies, pushes, and announces the new state.

pub mod coordinator;
pub mod daemon;
pub mod env;
pub mod miner;
pub mod protocol;
pub mod tracing;
pub mod types;
pub mod u256;
