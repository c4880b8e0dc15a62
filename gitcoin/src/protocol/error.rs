//! Error types for the coordinator wire protocol

use std::io;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("bad greeting: {0:?}")]
    BadGreeting(String),

    #[error("unexpected line from coordinator: {0:?}")]
    UnexpectedLine(String),

    #[error("line exceeds {max} bytes without a newline")]
    LineTooLong { max: usize },

    #[error("commit body of {0} bytes does not fit the 5-digit length field")]
    BodyTooLarge(usize),

    #[error("handshake timed out")]
    HandshakeTimeout,

    #[error("connection closed")]
    Disconnected,

    #[error(transparent)]
    Io(#[from] io::Error),
}
