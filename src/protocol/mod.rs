//! Protocol module - wire format, messages, commands and decoding.
//!
//! This module implements the textual FCP v2 framing:
//! - Line constants and header encoding
//! - Ordered field maps
//! - Inbound [`Message`] and outbound [`Command`] types
//! - A line-driven decoder for inbound frames

mod command;
mod decoder;
mod fields;
mod message;
mod wire_format;

pub use command::{Command, CommandBuilder, PayloadSource};
pub use decoder::{Decoded, MessageDecoder, DEFAULT_MAX_PAYLOAD_LENGTH};
pub use fields::Fields;
pub use message::Message;
pub use wire_format::{
    encode_header, encode_header_into, split_field, strip_line_ending, CLIENT_HELLO,
    DATA_LENGTH_FIELD, END_MESSAGE, EXPECTED_VERSION, IDENTIFIER_FIELD, LINEFEED, NODE_HELLO,
    PAYLOAD_MARKER, SEPARATOR,
};
