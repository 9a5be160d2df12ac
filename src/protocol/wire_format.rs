//! Wire format encoding and decoding.
//!
//! Every frame is a block of `\n`-terminated UTF-8 lines:
//! ```text
//! ClientHello            <- message name
//! Name=my-client         <- zero or more key=value fields
//! ExpectedVersion=2.0
//! EndMessage             <- terminator, or `Data` followed by raw bytes
//! ```
//!
//! A frame ending in [`PAYLOAD_MARKER`] is followed by exactly
//! `DataLength` raw bytes, with no trailing marker.

use bytes::{BufMut, Bytes, BytesMut};

use super::Fields;

/// Line terminator used on the wire.
pub const LINEFEED: &str = "\n";

/// Line that ends a frame without payload.
pub const END_MESSAGE: &str = "EndMessage";

/// Line that ends the header block of a frame carrying a payload.
pub const PAYLOAD_MARKER: &str = "Data";

/// Field holding the declared payload length.
pub const DATA_LENGTH_FIELD: &str = "DataLength";

/// Reserved field key stored as a message's identifier.
pub const IDENTIFIER_FIELD: &str = "Identifier";

/// Name of the handshake command sent by the client.
pub const CLIENT_HELLO: &str = "ClientHello";

/// Name of the handshake reply sent by the node.
pub const NODE_HELLO: &str = "NodeHello";

/// Protocol version requested in the handshake.
pub const EXPECTED_VERSION: &str = "2.0";

/// Key/value separator in field lines.
pub const SEPARATOR: char = '=';

/// Encode the textual part of an outbound frame.
///
/// The terminator is always [`END_MESSAGE`]; a payload, if any, is written
/// by the caller right after these bytes.
pub fn encode_header(name: &str, fields: &Fields) -> Bytes {
    let mut buf = BytesMut::with_capacity(encoded_len(name, fields));
    encode_header_into(name, fields, &mut buf);
    buf.freeze()
}

/// Encode the textual part of an outbound frame into an existing buffer.
pub fn encode_header_into(name: &str, fields: &Fields, buf: &mut BytesMut) {
    buf.put_slice(name.as_bytes());
    buf.put_slice(LINEFEED.as_bytes());
    for (key, value) in fields.iter() {
        buf.put_slice(key.as_bytes());
        buf.put_u8(SEPARATOR as u8);
        buf.put_slice(value.as_bytes());
        buf.put_slice(LINEFEED.as_bytes());
    }
    buf.put_slice(END_MESSAGE.as_bytes());
    buf.put_slice(LINEFEED.as_bytes());
}

fn encoded_len(name: &str, fields: &Fields) -> usize {
    let field_bytes: usize = fields
        .iter()
        .map(|(k, v)| k.len() + v.len() + 1 + LINEFEED.len())
        .sum();
    name.len() + field_bytes + END_MESSAGE.len() + 2 * LINEFEED.len()
}

/// Split a field line at the first separator, trimming both sides.
///
/// Returns `None` if the line contains no separator.
pub fn split_field(line: &str) -> Option<(&str, &str)> {
    line.split_once(SEPARATOR)
        .map(|(key, value)| (key.trim(), value.trim()))
}

/// Strip the line terminator (and a stray carriage return) from a raw line.
pub fn strip_line_ending(raw: &[u8]) -> &[u8] {
    let raw = raw.strip_suffix(b"\n").unwrap_or(raw);
    raw.strip_suffix(b"\r").unwrap_or(raw)
}
