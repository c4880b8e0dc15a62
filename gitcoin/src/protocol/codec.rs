//! Stream codecs for the coordinator protocol.
//!
//! The layout is fixed-width text, byte-compatible with existing peers:
//!
//! ```text
//! miner -> coordinator   HELLO\n
//! coordinator -> miner   WELCOME 0001\n
//!                        P <40 hex>\n  T <40 hex>\n  D <40 hex>\n  R \n
//! miner -> coordinator   C <40 hex parent> <40 hex commit> <5 digits>\n<body>\n
//! ```
//!
//! [`ServerCodec`] is the coordinator's side, [`MinerCodec`] the miner's.

use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use super::error::ProtocolError;
use super::messages::{ClientMessage, CommitCandidate, ServerMessage};
use crate::tracing::prelude::*;
use crate::types::{DifficultyTarget, ObjectId, SessionId};

/// Greeting a miner must send before anything else.
pub const GREETING: &[u8] = b"HELLO\n";

/// Upper bound on bytes discarded after an unknown command byte.
pub const GARBAGE_WINDOW: usize = 4096;

/// Largest commit body expressible in the 5-digit length field.
pub const MAX_BODY_LEN: usize = 99_999;

// "C " + 40 + " " + 40 + " " + 5 digits + "\n"
const SUBMIT_HEADER_LEN: usize = 90;
const PARENT_RANGE: std::ops::Range<usize> = 2..42;
const COMMIT_RANGE: std::ops::Range<usize> = 43..83;
const LENGTH_RANGE: std::ops::Range<usize> = 84..89;

// Longest coordinator line is "D " + 40 + "\n"; leave room for large ids.
const MAX_LINE_LEN: usize = 128;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Handshaking,
    Streaming,
}

/// Coordinator-side codec: decodes [`ClientMessage`], encodes [`ServerMessage`].
///
/// Starts in the handshake phase, where only the exact greeting is accepted;
/// any other byte is a decode error, which terminates the stream. Once the
/// greeting is seen the codec switches to streaming, where it never errors on
/// content: unknown command bytes and malformed frames are logged and skipped.
#[derive(Debug)]
pub struct ServerCodec {
    session: SessionId,
    phase: Phase,
}

/// Outcome of trying to parse a submit frame at the head of the buffer.
enum SubmitFrame {
    Incomplete,
    Complete(CommitCandidate, usize),
    /// Frame is unusable; `consumed` bytes belong to it (0 = unknown extent)
    Malformed {
        consumed: usize,
        reason: &'static str,
    },
}

impl ServerCodec {
    pub fn new(session: SessionId) -> Self {
        Self {
            session,
            phase: Phase::Handshaking,
        }
    }

    fn decode_greeting(&mut self, src: &mut BytesMut) -> Result<Option<ClientMessage>, ProtocolError> {
        let seen = src.len().min(GREETING.len());
        if src[..seen] != GREETING[..seen] {
            return Err(ProtocolError::BadGreeting(
                String::from_utf8_lossy(&src[..seen]).into_owned(),
            ));
        }
        if seen < GREETING.len() {
            return Ok(None);
        }

        src.advance(GREETING.len());
        self.phase = Phase::Streaming;
        Ok(Some(ClientMessage::Hello))
    }

    fn parse_submit(src: &BytesMut) -> SubmitFrame {
        // Fail fast on a missing separator rather than waiting for 90 bytes
        if src.len() >= 2 && src[1] != b' ' {
            return SubmitFrame::Malformed {
                consumed: 0,
                reason: "missing separator after command",
            };
        }
        if src.len() < SUBMIT_HEADER_LEN {
            return SubmitFrame::Incomplete;
        }

        let header = &src[..SUBMIT_HEADER_LEN];
        if header[42] != b' ' || header[83] != b' ' || header[89] != b'\n' {
            return SubmitFrame::Malformed {
                consumed: 0,
                reason: "bad field separators",
            };
        }

        let digits = &header[LENGTH_RANGE];
        if !digits.iter().all(u8::is_ascii_digit) {
            return SubmitFrame::Malformed {
                consumed: 0,
                reason: "body length is not decimal",
            };
        }
        let body_len = digits
            .iter()
            .fold(0usize, |acc, d| acc * 10 + usize::from(d - b'0'));

        let total = SUBMIT_HEADER_LEN + body_len + 1;
        if src.len() < total {
            return SubmitFrame::Incomplete;
        }
        if src[total - 1] != b'\n' {
            return SubmitFrame::Malformed {
                consumed: total,
                reason: "body not followed by newline",
            };
        }

        let (Ok(parent), Ok(commit_id)) = (
            ObjectId::from_ascii(&header[PARENT_RANGE]),
            ObjectId::from_ascii(&header[COMMIT_RANGE]),
        ) else {
            return SubmitFrame::Malformed {
                consumed: total,
                reason: "object id is not hex",
            };
        };

        let candidate = CommitCandidate {
            parent,
            commit_id,
            body: src[SUBMIT_HEADER_LEN..total - 1].to_vec(),
        };
        SubmitFrame::Complete(candidate, total)
    }
}

/// Discard bytes up to and including the next newline, bounded by
/// [`GARBAGE_WINDOW`] and by what is currently buffered.
fn skip_garbage(src: &mut BytesMut) -> usize {
    let window = src.len().min(GARBAGE_WINDOW);
    let skip = src[..window]
        .iter()
        .position(|&b| b == b'\n')
        .map_or(window, |newline| newline + 1);
    src.advance(skip);
    skip
}

impl Decoder for ServerCodec {
    type Item = ClientMessage;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if self.phase == Phase::Handshaking {
            return self.decode_greeting(src);
        }

        loop {
            let Some(&command) = src.first() else {
                return Ok(None);
            };

            if command != b'C' {
                let skipped = skip_garbage(src);
                error!(
                    session = %self.session,
                    command = %command.escape_ascii(),
                    skipped,
                    "Unknown command, skipping garbage"
                );
                continue;
            }

            match Self::parse_submit(src) {
                SubmitFrame::Incomplete => return Ok(None),
                SubmitFrame::Complete(candidate, consumed) => {
                    src.advance(consumed);
                    return Ok(Some(ClientMessage::Submit(candidate)));
                }
                SubmitFrame::Malformed { consumed, reason } => {
                    let skipped = if consumed > 0 {
                        src.advance(consumed);
                        consumed
                    } else {
                        skip_garbage(src)
                    };
                    warn!(session = %self.session, reason, skipped, "Malformed submit frame");
                }
            }
        }
    }
}

impl Encoder<ServerMessage> for ServerCodec {
    type Error = ProtocolError;

    fn encode(&mut self, message: ServerMessage, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let line = match message {
            ServerMessage::Welcome(id) => format!("WELCOME {}\n", id),
            ServerMessage::Parent(id) => format!("P {}\n", id),
            ServerMessage::Tree(id) => format!("T {}\n", id),
            ServerMessage::Difficulty(target) => format!("D {}\n", target),
            ServerMessage::Reset => "R \n".to_string(),
        };
        dst.put_slice(line.as_bytes());
        Ok(())
    }
}

/// Miner-side codec: decodes [`ServerMessage`], encodes [`ClientMessage`].
///
/// Coordinator lines are strict; anything unexpected is an error because the
/// miner cannot resynchronise with a coordinator it does not understand.
#[derive(Debug, Default)]
pub struct MinerCodec;

fn parse_server_line(line: &[u8]) -> Result<ServerMessage, ProtocolError> {
    let unexpected = || ProtocolError::UnexpectedLine(String::from_utf8_lossy(line).into_owned());

    if let Some(digits) = line.strip_prefix(b"WELCOME ") {
        let id = std::str::from_utf8(digits)
            .ok()
            .and_then(|s| s.parse::<u32>().ok())
            .ok_or_else(unexpected)?;
        return Ok(ServerMessage::Welcome(SessionId(id)));
    }

    match line {
        [b'P', b' ', hex @ ..] => ObjectId::from_ascii(hex)
            .map(ServerMessage::Parent)
            .map_err(|_| unexpected()),
        [b'T', b' ', hex @ ..] => ObjectId::from_ascii(hex)
            .map(ServerMessage::Tree)
            .map_err(|_| unexpected()),
        [b'D', b' ', hex @ ..] => DifficultyTarget::from_ascii(hex)
            .map(ServerMessage::Difficulty)
            .map_err(|_| unexpected()),
        [b'R', rest @ ..] if rest.iter().all(|&b| b == b' ') => Ok(ServerMessage::Reset),
        _ => Err(unexpected()),
    }
}

impl Decoder for MinerCodec {
    type Item = ServerMessage;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let window = src.len().min(MAX_LINE_LEN);
        let Some(newline) = src[..window].iter().position(|&b| b == b'\n') else {
            if src.len() >= MAX_LINE_LEN {
                return Err(ProtocolError::LineTooLong { max: MAX_LINE_LEN });
            }
            return Ok(None);
        };

        let line = src.split_to(newline + 1);
        let message = parse_server_line(&line[..newline])?;
        trace!(?message, "RX");
        Ok(Some(message))
    }
}

impl Encoder<ClientMessage> for MinerCodec {
    type Error = ProtocolError;

    fn encode(&mut self, message: ClientMessage, dst: &mut BytesMut) -> Result<(), Self::Error> {
        match message {
            ClientMessage::Hello => dst.put_slice(GREETING),
            ClientMessage::Submit(candidate) => {
                let body_len = candidate.body.len();
                if body_len > MAX_BODY_LEN {
                    return Err(ProtocolError::BodyTooLarge(body_len));
                }
                let header = format!(
                    "C {} {} {:05}\n",
                    candidate.parent, candidate.commit_id, body_len
                );
                dst.reserve(header.len() + body_len + 1);
                dst.put_slice(header.as_bytes());
                dst.put_slice(&candidate.body);
                dst.put_u8(b'\n');
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::CanonicalState;

    fn id(fill: char) -> ObjectId {
        fill.to_string().repeat(40).parse().unwrap()
    }

    fn candidate() -> CommitCandidate {
        CommitCandidate {
            parent: id('a'),
            commit_id: id('0'),
            body: b"tree x\nparent y\n\nmessage with\nnewlines".to_vec(),
        }
    }

    fn encoded_submit(candidate: CommitCandidate) -> BytesMut {
        let mut buf = BytesMut::new();
        MinerCodec
            .encode(ClientMessage::Submit(candidate), &mut buf)
            .unwrap();
        buf
    }

    fn streaming_codec() -> ServerCodec {
        let mut codec = ServerCodec::new(SessionId(1));
        let mut buf = BytesMut::from(&GREETING[..]);
        assert_eq!(codec.decode(&mut buf).unwrap(), Some(ClientMessage::Hello));
        codec
    }

    #[test]
    fn test_greeting_accepted_and_leftover_kept() {
        let mut codec = ServerCodec::new(SessionId(1));
        let mut buf = BytesMut::from(&b"HEL"[..]);
        assert_eq!(codec.decode(&mut buf).unwrap(), None);
        assert_eq!(codec.phase, Phase::Handshaking);

        buf.extend_from_slice(b"LO\nC");
        assert_eq!(codec.decode(&mut buf).unwrap(), Some(ClientMessage::Hello));
        assert_eq!(codec.phase, Phase::Streaming);
        assert_eq!(&buf[..], b"C");
    }

    #[test]
    fn test_bad_greeting_is_an_error() {
        let mut codec = ServerCodec::new(SessionId(1));
        let mut buf = BytesMut::from(&b"HELP"[..]);
        assert!(matches!(
            codec.decode(&mut buf),
            Err(ProtocolError::BadGreeting(_))
        ));
    }

    #[test]
    fn test_submit_frame_wire_layout() {
        let buf = encoded_submit(candidate());
        let expected_header = format!("C {} {} 00038\n", id('a'), id('0'));
        assert_eq!(&buf[..90], expected_header.as_bytes());
        assert_eq!(buf.len(), 90 + 38 + 1);
        assert_eq!(buf[buf.len() - 1], b'\n');
    }

    #[test]
    fn test_submit_decoded_after_partial_delivery() {
        let mut codec = streaming_codec();
        let frame = encoded_submit(candidate());

        let mut buf = BytesMut::new();
        for chunk in frame.chunks(17) {
            assert_eq!(codec.decode(&mut buf).unwrap(), None);
            buf.extend_from_slice(chunk);
        }
        assert_eq!(
            codec.decode(&mut buf).unwrap(),
            Some(ClientMessage::Submit(candidate()))
        );
        assert!(buf.is_empty());
    }

    #[test]
    fn test_unknown_command_skips_to_next_line() {
        let mut codec = streaming_codec();
        let mut buf = BytesMut::from(&b"Xsome garbage\n"[..]);
        buf.extend_from_slice(&encoded_submit(candidate()));

        assert_eq!(
            codec.decode(&mut buf).unwrap(),
            Some(ClientMessage::Submit(candidate()))
        );
    }

    #[test]
    fn test_unknown_command_without_newline_is_bounded() {
        let mut codec = streaming_codec();
        let mut buf = BytesMut::from(&vec![b'X'; GARBAGE_WINDOW + 10][..]);

        assert_eq!(codec.decode(&mut buf).unwrap(), None);
        // The first window went in one skip, the tail in a second
        assert!(buf.is_empty());
    }

    #[test]
    fn test_malformed_terminator_drops_whole_frame() {
        let mut codec = streaming_codec();
        let mut frame = encoded_submit(candidate());
        let last = frame.len() - 1;
        frame[last] = b'!';
        frame.extend_from_slice(&encoded_submit(candidate()));

        assert_eq!(
            codec.decode(&mut frame).unwrap(),
            Some(ClientMessage::Submit(candidate()))
        );
        assert!(frame.is_empty());
    }

    #[test]
    fn test_malformed_header_is_skipped() {
        let mut codec = streaming_codec();
        let mut buf = BytesMut::from(&b"Cx\n"[..]);
        assert_eq!(codec.decode(&mut buf).unwrap(), None);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_oversized_body_rejected_by_encoder() {
        let mut c = candidate();
        c.body = vec![b'a'; MAX_BODY_LEN + 1];
        let mut buf = BytesMut::new();
        assert!(matches!(
            MinerCodec.encode(ClientMessage::Submit(c), &mut buf),
            Err(ProtocolError::BodyTooLarge(_))
        ));
    }

    #[test]
    fn test_reset_sequence_wire_format() {
        let state = CanonicalState {
            parent: id('1'),
            tree: id('2'),
            difficulty: DifficultyTarget::from_config("0001").unwrap(),
        };
        let mut codec = ServerCodec::new(SessionId(3));
        let mut buf = BytesMut::new();
        codec.encode(ServerMessage::Welcome(SessionId(3)), &mut buf).unwrap();
        for message in ServerMessage::reset_sequence(&state) {
            codec.encode(message, &mut buf).unwrap();
        }

        let expected = format!(
            "WELCOME 0003\nP {}\nT {}\nD 0001{}\nR \n",
            "1".repeat(40),
            "2".repeat(40),
            "0".repeat(36)
        );
        assert_eq!(&buf[..], expected.as_bytes());
    }

    #[test]
    fn test_miner_decodes_coordinator_lines() {
        let mut codec = MinerCodec;
        let text = format!("WELCOME 0042\nP {}\nR \n", "f".repeat(40));
        let mut buf = BytesMut::from(text.as_bytes());

        assert_eq!(
            codec.decode(&mut buf).unwrap(),
            Some(ServerMessage::Welcome(SessionId(42)))
        );
        assert_eq!(
            codec.decode(&mut buf).unwrap(),
            Some(ServerMessage::Parent(id('f')))
        );
        assert_eq!(codec.decode(&mut buf).unwrap(), Some(ServerMessage::Reset));
        assert_eq!(codec.decode(&mut buf).unwrap(), None);
    }

    #[test]
    fn test_miner_rejects_unexpected_lines() {
        let mut codec = MinerCodec;
        let mut buf = BytesMut::from(&b"Q what\n"[..]);
        assert!(matches!(
            codec.decode(&mut buf),
            Err(ProtocolError::UnexpectedLine(_))
        ));

        let mut buf = BytesMut::from(&vec![b'P'; MAX_LINE_LEN][..]);
        assert!(matches!(
            codec.decode(&mut buf),
            Err(ProtocolError::LineTooLong { .. })
        ));
    }
}
