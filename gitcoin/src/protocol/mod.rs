//! Line protocol spoken between the coordinator and miners.
//!
//! Messages are modelled in [`messages`]; [`codec`] turns them into bytes and
//! back, for use with `tokio_util::codec::Framed`.

pub mod codec;
pub mod error;
pub mod messages;

pub use codec::{MinerCodec, ServerCodec, GARBAGE_WINDOW, GREETING, MAX_BODY_LEN};
pub use error::ProtocolError;
pub use messages::{ClientMessage, CommitCandidate, ServerMessage};
