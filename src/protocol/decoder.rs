//! Line-driven message decoder.
//!
//! Implements the inbound state machine, one line at a time:
//! - `WaitingForHeader`: the next line is a message name
//! - `Accumulating`: field lines until `EndMessage` or `Data`
//!
//! The decoder never touches the stream. When a frame announces a payload
//! it hands back the message with the declared length and the caller drains
//! the raw bytes before pushing the next line.
//!
//! # Example
//!
//! ```
//! use fcp_client::protocol::{Decoded, MessageDecoder};
//!
//! let mut decoder = MessageDecoder::new();
//! assert!(decoder.push_line("NodeHello").unwrap().is_none());
//! assert!(decoder.push_line("Version=Fred,0.7").unwrap().is_none());
//!
//! match decoder.push_line("EndMessage").unwrap() {
//!     Some(Decoded::Complete(message)) => assert_eq!(message.name(), "NodeHello"),
//!     _ => unreachable!(),
//! }
//! ```

use super::wire_format::{split_field, DATA_LENGTH_FIELD, END_MESSAGE, PAYLOAD_MARKER};
use super::Message;
use crate::error::{FcpError, Result};

/// Default maximum accepted `DataLength` (1 GiB).
pub const DEFAULT_MAX_PAYLOAD_LENGTH: u64 = 1 << 30;

/// State machine for message parsing.
#[derive(Debug)]
enum State {
    /// Next line names a new message.
    WaitingForHeader,
    /// Collecting field lines for the current message.
    Accumulating { message: Message },
}

/// Outcome of a line that finished a frame's header block.
#[derive(Debug)]
pub enum Decoded {
    /// Frame ended with `EndMessage`.
    Complete(Message),
    /// Frame ended with `Data`; `length` raw bytes follow on the stream.
    AwaitingPayload {
        /// Message decoded so far.
        message: Message,
        /// Declared payload length.
        length: u64,
    },
}

/// Decoder turning inbound lines into messages.
#[derive(Debug)]
pub struct MessageDecoder {
    state: State,
    max_payload_length: u64,
}

impl MessageDecoder {
    /// Create a decoder with the default payload limit.
    pub fn new() -> Self {
        Self::with_max_payload(DEFAULT_MAX_PAYLOAD_LENGTH)
    }

    /// Create a decoder rejecting payloads longer than `max_payload_length`.
    pub fn with_max_payload(max_payload_length: u64) -> Self {
        Self {
            state: State::WaitingForHeader,
            max_payload_length,
        }
    }

    /// Push one line (without its terminator).
    ///
    /// # Returns
    ///
    /// - `Ok(None)` if the frame is not finished yet
    /// - `Ok(Some(..))` when the line closed the header block
    ///
    /// # Errors
    ///
    /// - `Decode` for a non-blank line that is neither a field nor a marker
    /// - `Payload` for a missing, unparsable or oversized `DataLength`
    ///
    /// The decoder is reset to `WaitingForHeader` after an error.
    pub fn push_line(&mut self, line: &str) -> Result<Option<Decoded>> {
        match std::mem::replace(&mut self.state, State::WaitingForHeader) {
            State::WaitingForHeader => {
                if line.trim().is_empty() {
                    return Ok(None);
                }
                self.state = State::Accumulating {
                    message: Message::new(line),
                };
                Ok(None)
            }

            State::Accumulating { mut message } => {
                if line == PAYLOAD_MARKER {
                    let length = self.declared_length(&message)?;
                    return Ok(Some(Decoded::AwaitingPayload { message, length }));
                }

                if line == END_MESSAGE {
                    return Ok(Some(Decoded::Complete(message)));
                }

                if let Some((key, value)) = split_field(line) {
                    message.insert(key, value);
                } else if !line.trim().is_empty() {
                    return Err(FcpError::unexpected_line(line));
                }

                self.state = State::Accumulating { message };
                Ok(None)
            }
        }
    }

    fn declared_length(&self, message: &Message) -> Result<u64> {
        let raw = message.get(DATA_LENGTH_FIELD).ok_or_else(|| {
            FcpError::Payload(format!("{} announces data without DataLength", message.name()))
        })?;

        let length: u64 = raw
            .parse()
            .map_err(|_| FcpError::Payload(format!("invalid DataLength: {raw}")))?;

        if length > self.max_payload_length {
            return Err(FcpError::Payload(format!(
                "DataLength {} exceeds maximum {}",
                length, self.max_payload_length
            )));
        }

        Ok(length)
    }

    /// Check if the decoder is between frames.
    pub fn is_idle(&self) -> bool {
        matches!(self.state, State::WaitingForHeader)
    }

    /// Get the current state for debugging.
    #[cfg(test)]
    fn state_name(&self) -> &'static str {
        match &self.state {
            State::WaitingForHeader => "WaitingForHeader",
            State::Accumulating { .. } => "Accumulating",
        }
    }
}

impl Default for MessageDecoder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Push all lines, collecting finished frames.
    fn push_all(decoder: &mut MessageDecoder, lines: &[&str]) -> Result<Vec<Decoded>> {
        let mut out = Vec::new();
        for line in lines {
            if let Some(decoded) = decoder.push_line(line)? {
                out.push(decoded);
            }
        }
        Ok(out)
    }

    fn complete(decoded: Decoded) -> Message {
        match decoded {
            Decoded::Complete(message) => message,
            other => panic!("expected complete message, got {other:?}"),
        }
    }

    #[test]
    fn test_single_complete_message() {
        let mut decoder = MessageDecoder::new();
        let out = push_all(
            &mut decoder,
            &["PutSuccessful", "Identifier=put-1", "URI=CHK@abc", "EndMessage"],
        )
        .unwrap();

        assert_eq!(out.len(), 1);
        let message = complete(out.into_iter().next().unwrap());
        assert_eq!(message.name(), "PutSuccessful");
        assert_eq!(message.identifier(), Some("put-1"));
        assert_eq!(message.get("URI"), Some("CHK@abc"));
        assert!(decoder.is_idle());
    }

    #[test]
    fn test_multiple_messages_in_sequence() {
        let mut decoder = MessageDecoder::new();
        let out = push_all(
            &mut decoder,
            &[
                "SimpleProgress", "Total=3", "EndMessage",
                "SimpleProgress", "Total=4", "EndMessage",
                "EndListPeers", "EndMessage",
            ],
        )
        .unwrap();

        let names: Vec<_> = out.into_iter().map(|d| complete(d).name().to_string()).collect();
        assert_eq!(names, ["SimpleProgress", "SimpleProgress", "EndListPeers"]);
    }

    #[test]
    fn test_fields_trimmed_and_ordered() {
        let mut decoder = MessageDecoder::new();
        let out = push_all(
            &mut decoder,
            &["Peer", " b = 2 ", "a=1", "c=x=y", "EndMessage"],
        )
        .unwrap();

        let message = complete(out.into_iter().next().unwrap());
        let fields: Vec<_> = message.fields().iter().collect();
        assert_eq!(fields, [("b", "2"), ("a", "1"), ("c", "x=y")]);
    }

    #[test]
    fn test_blank_lines_ignored() {
        let mut decoder = MessageDecoder::new();
        let out = push_all(&mut decoder, &["", "Peer", "", "   ", "a=1", "EndMessage"]).unwrap();

        let message = complete(out.into_iter().next().unwrap());
        assert_eq!(message.name(), "Peer");
        assert_eq!(message.fields().len(), 1);
    }

    #[test]
    fn test_payload_marker() {
        let mut decoder = MessageDecoder::new();
        let out = push_all(
            &mut decoder,
            &["AllData", "Identifier=get-1", "DataLength=5", "Data"],
        )
        .unwrap();

        match out.into_iter().next() {
            Some(Decoded::AwaitingPayload { message, length }) => {
                assert_eq!(message.name(), "AllData");
                assert_eq!(message.identifier(), Some("get-1"));
                assert_eq!(length, 5);
            }
            other => panic!("expected payload, got {other:?}"),
        }
        assert_eq!(decoder.state_name(), "WaitingForHeader");
    }

    #[test]
    fn test_payload_without_length() {
        let mut decoder = MessageDecoder::new();
        let result = push_all(&mut decoder, &["AllData", "Data"]);

        assert!(matches!(result, Err(FcpError::Payload(_))));
        assert!(decoder.is_idle());
    }

    #[test]
    fn test_payload_with_invalid_length() {
        let mut decoder = MessageDecoder::new();
        let result = push_all(&mut decoder, &["AllData", "DataLength=five", "Data"]);

        assert!(matches!(result, Err(FcpError::Payload(_))));
    }

    #[test]
    fn test_max_payload_validation() {
        let mut decoder = MessageDecoder::with_max_payload(100);
        let result = push_all(&mut decoder, &["AllData", "DataLength=1000", "Data"]);

        assert!(result.unwrap_err().to_string().contains("exceeds maximum"));
    }

    #[test]
    fn test_unexpected_line() {
        let mut decoder = MessageDecoder::new();
        let result = push_all(&mut decoder, &["NodeHello", "garbage"]);

        match result {
            Err(FcpError::Decode(msg)) => assert!(msg.contains("garbage")),
            other => panic!("expected decode error, got {other:?}"),
        }
        assert!(decoder.is_idle());
    }

    #[test]
    fn test_partial_frame_is_not_idle() {
        let mut decoder = MessageDecoder::new();
        push_all(&mut decoder, &["NodeHello", "Version=1"]).unwrap();
        assert_eq!(decoder.state_name(), "Accumulating");
        assert!(!decoder.is_idle());

        push_all(&mut decoder, &["EndMessage"]).unwrap();
        assert_eq!(decoder.state_name(), "WaitingForHeader");
    }
}
