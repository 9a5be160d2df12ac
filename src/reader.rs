//! Inbound message reader.
//!
//! [`MessageReader`] reads `\n`-terminated lines from the node stream,
//! drives a [`MessageDecoder`] and, when a frame announces `Data`, spools
//! the declared number of raw bytes before returning the message. The raw
//! bytes are taken from the same buffered reader as the lines, so nothing
//! already buffered is lost when switching between text and binary.

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};

use crate::error::{FcpError, Result};
use crate::protocol::{strip_line_ending, Decoded, Message, MessageDecoder};
use crate::spool::PayloadSpool;

/// Longest line accepted from the node, terminator excluded.
pub const MAX_LINE_LENGTH: usize = 64 * 1024;

/// Decodes messages from the inbound half of the node stream.
pub struct MessageReader<R> {
    reader: BufReader<R>,
    decoder: MessageDecoder,
    spool: PayloadSpool,
    line: Vec<u8>,
}

impl<R> MessageReader<R>
where
    R: AsyncRead + Unpin,
{
    /// Create a reader over `reader`, spooling payloads with `spool`.
    pub fn new(reader: R, spool: PayloadSpool, max_payload_length: u64) -> Self {
        Self {
            reader: BufReader::new(reader),
            decoder: MessageDecoder::with_max_payload(max_payload_length),
            spool,
            line: Vec::with_capacity(256),
        }
    }

    /// Read the next complete message.
    ///
    /// Returns `Ok(None)` when the stream ends; a frame cut off by the end of
    /// the stream is dropped.
    ///
    /// # Errors
    ///
    /// - `Decode` for an unexpected line, an over-long line or invalid UTF-8
    /// - `Payload` for a bad `DataLength` or a payload cut short
    /// - `Io` if reading the stream fails
    pub async fn next_message(&mut self) -> Result<Option<Message>> {
        loop {
            let Some(line) = self.read_line().await? else {
                if !self.decoder.is_idle() {
                    tracing::debug!("Stream ended inside a frame");
                }
                return Ok(None);
            };

            match self.decoder.push_line(&line)? {
                None => continue,
                Some(Decoded::Complete(message)) => return Ok(Some(message)),
                Some(Decoded::AwaitingPayload {
                    mut message,
                    length,
                }) => {
                    let payload = self.spool.spool(&mut self.reader, length).await?;
                    tracing::trace!("Spooled {} payload bytes for {}", length, message.name());
                    message.attach_payload(payload);
                    return Ok(Some(message));
                }
            }
        }
    }

    /// Read one line without its terminator; `None` at end of stream.
    async fn read_line(&mut self) -> Result<Option<String>> {
        self.line.clear();
        let limit = MAX_LINE_LENGTH as u64 + 2;
        let n = (&mut self.reader)
            .take(limit)
            .read_until(b'\n', &mut self.line)
            .await?;

        if n == 0 {
            return Ok(None);
        }

        let raw = strip_line_ending(&self.line);
        if raw.len() > MAX_LINE_LENGTH {
            return Err(FcpError::Decode(format!(
                "line exceeds {MAX_LINE_LENGTH} bytes"
            )));
        }

        String::from_utf8(raw.to_vec())
            .map(Some)
            .map_err(|_| FcpError::Decode("line is not valid UTF-8".to_string()))
    }
}
