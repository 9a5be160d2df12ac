//! Outbound commands sent to the node.
//!
//! # Example
//!
//! ```
//! use fcp_client::protocol::Command;
//! use bytes::Bytes;
//!
//! let command = Command::builder("ClientPut")
//!     .identifier("upload-1")
//!     .field("URI", "CHK@")
//!     .field("UploadFrom", "direct")
//!     .payload_bytes(Bytes::from_static(b"hello"))
//!     .build();
//!
//! assert_eq!(command.name(), "ClientPut");
//! assert_eq!(command.payload_length(), Some(5));
//! assert_eq!(command.fields().get("DataLength"), Some("5"));
//! ```

use std::fmt;
use std::io::Cursor;

use bytes::Bytes;
use tokio::io::AsyncRead;

use super::wire_format::{CLIENT_HELLO, DATA_LENGTH_FIELD, IDENTIFIER_FIELD};
use super::{Fields, Message};

/// Readable source for an outbound payload.
pub type PayloadSource = Box<dyn AsyncRead + Send + Unpin>;

/// An outbound frame: name, ordered fields and an optional payload.
///
/// A payload always consists of a source together with its length; the
/// builder only accepts both at once.
pub struct Command {
    name: String,
    fields: Fields,
    payload: Option<(PayloadSource, u64)>,
}

impl Command {
    /// Create a command without fields or payload.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Fields::new(),
            payload: None,
        }
    }

    /// Start building a command.
    pub fn builder(name: impl Into<String>) -> CommandBuilder {
        CommandBuilder {
            command: Command::new(name),
        }
    }

    /// Build the handshake command.
    pub fn client_hello(client_name: &str, expected_version: &str) -> Self {
        Command::builder(CLIENT_HELLO)
            .field("Name", client_name)
            .field("ExpectedVersion", expected_version)
            .build()
    }

    /// Rebuild a command carrying the name, fields and identifier of a message.
    ///
    /// The identifier becomes the first field. Payloads are not carried over.
    pub fn from_message(message: &Message) -> Self {
        let mut builder = Command::builder(message.name());
        if let Some(identifier) = message.identifier() {
            builder = builder.identifier(identifier);
        }
        for (key, value) in message.fields().iter() {
            builder = builder.field(key, value);
        }
        builder.build()
    }

    /// Get the command name.
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the fields in insertion order.
    #[inline]
    pub fn fields(&self) -> &Fields {
        &self.fields
    }

    /// Check if the command carries a payload.
    #[inline]
    pub fn has_payload(&self) -> bool {
        self.payload.is_some()
    }

    /// Declared payload length.
    pub fn payload_length(&self) -> Option<u64> {
        self.payload.as_ref().map(|(_, len)| *len)
    }

    /// Split into name, fields and payload for writing.
    pub(crate) fn into_parts(self) -> (String, Fields, Option<(PayloadSource, u64)>) {
        (self.name, self.fields, self.payload)
    }
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Command")
            .field("name", &self.name)
            .field("fields", &self.fields)
            .field("payload_length", &self.payload_length())
            .finish()
    }
}

/// Fluent builder for [`Command`].
#[must_use]
pub struct CommandBuilder {
    command: Command,
}

impl CommandBuilder {
    /// Append a field (or replace the value of an existing key).
    pub fn field(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.command.fields.insert(key, value);
        self
    }

    /// Set the `Identifier` field.
    pub fn identifier(self, identifier: impl Into<String>) -> Self {
        self.field(IDENTIFIER_FIELD, identifier)
    }

    /// Attach a payload read from `source`.
    ///
    /// Exactly `length` bytes will be streamed after the header. The
    /// `DataLength` field is set to match.
    pub fn payload<R>(mut self, source: R, length: u64) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
    {
        self.command
            .fields
            .insert(DATA_LENGTH_FIELD, length.to_string());
        self.command.payload = Some((Box::new(source), length));
        self
    }

    /// Attach an in-memory payload.
    pub fn payload_bytes(self, data: Bytes) -> Self {
        let length = data.len() as u64;
        self.payload(Cursor::new(data), length)
    }

    /// Finish building.
    pub fn build(self) -> Command {
        self.command
    }
}
