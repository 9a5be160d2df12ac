//! Inbound message received from the node.
//!
//! A message carries its name, its ordered fields, the optional
//! `Identifier` (kept apart from the other fields) and at most one payload.
//!
//! # Example
//!
//! ```
//! use fcp_client::protocol::Message;
//!
//! let mut message = Message::new("DataFound");
//! message.set_identifier("job-1");
//! message.insert("DataLength", "5");
//!
//! assert_eq!(message.identifier(), Some("job-1"));
//! assert_eq!(message.data_length(), Some(5));
//! assert!(message.fields().get("Identifier").is_none());
//! ```

use std::sync::{Arc, Mutex};

use super::wire_format::{DATA_LENGTH_FIELD, IDENTIFIER_FIELD};
use super::Fields;
use crate::spool::Payload;

/// A decoded protocol message.
///
/// Cloning a message is cheap in terms of payload: all clones share the
/// same one-shot payload slot, so the payload is handed out at most once.
#[derive(Debug, Clone)]
pub struct Message {
    name: String,
    fields: Fields,
    identifier: Option<String>,
    payload: Arc<Mutex<Option<Payload>>>,
}

impl Message {
    /// Create an empty message with the given name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Fields::new(),
            identifier: None,
            payload: Arc::new(Mutex::new(None)),
        }
    }

    /// Get the message name.
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the identifier, if the node sent one.
    #[inline]
    pub fn identifier(&self) -> Option<&str> {
        self.identifier.as_deref()
    }

    /// Set the identifier.
    pub fn set_identifier(&mut self, identifier: impl Into<String>) {
        self.identifier = Some(identifier.into());
    }

    /// Get the fields in arrival order (identifier excluded).
    #[inline]
    pub fn fields(&self) -> &Fields {
        &self.fields
    }

    /// Get a single field value.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields.get(key)
    }

    /// Get a field parsed as an unsigned integer.
    pub fn get_u64(&self, key: &str) -> Option<u64> {
        self.get(key).and_then(|v| v.parse().ok())
    }

    /// Declared payload length, if present and numeric.
    pub fn data_length(&self) -> Option<u64> {
        self.get_u64(DATA_LENGTH_FIELD)
    }

    /// Insert a field.
    ///
    /// The reserved `Identifier` key sets the identifier instead.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        if key == IDENTIFIER_FIELD {
            self.identifier = Some(value.into());
        } else {
            self.fields.insert(key, value);
        }
    }

    /// Check if a payload is still waiting to be taken.
    pub fn has_payload(&self) -> bool {
        self.payload
            .lock()
            .map(|slot| slot.is_some())
            .unwrap_or(false)
    }

    /// Take the payload, leaving the slot empty.
    ///
    /// The caller owns the returned handle: it stays readable after the
    /// session terminates. Returns `None` if the message had no payload or
    /// it was already taken.
    pub fn take_payload(&self) -> Option<Payload> {
        let payload = self.payload.lock().ok().and_then(|mut slot| slot.take())?;
        payload.claim();
        Some(payload)
    }

    /// Attach a spooled payload.
    pub(crate) fn attach_payload(&mut self, payload: Payload) {
        self.payload = Arc::new(Mutex::new(Some(payload)));
    }
}

impl PartialEq for Message {
    /// Messages compare by name, fields and identifier; payloads are ignored.
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.fields == other.fields
            && self.identifier == other.identifier
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spool::Payload;
    use bytes::Bytes;

    #[test]
    fn test_identifier_is_not_a_field() {
        let mut message = Message::new("PutSuccessful");
        message.insert("Identifier", "abc");
        message.insert("URI", "CHK@xyz");

        assert_eq!(message.identifier(), Some("abc"));
        assert_eq!(message.fields().len(), 1);
        assert_eq!(message.get("URI"), Some("CHK@xyz"));
    }

    #[test]
    fn test_data_length_parsing() {
        let mut message = Message::new("AllData");
        assert_eq!(message.data_length(), None);

        message.insert("DataLength", "not-a-number");
        assert_eq!(message.data_length(), None);

        message.insert("DataLength", "1024");
        assert_eq!(message.data_length(), Some(1024));
    }

    #[test]
    fn test_payload_taken_once_across_clones() {
        let mut message = Message::new("AllData");
        message.attach_payload(Payload::from_bytes(Bytes::from_static(b"hello")));
        let clone = message.clone();

        assert!(clone.has_payload());
        assert!(message.take_payload().is_some());
        assert!(!clone.has_payload());
        assert!(clone.take_payload().is_none());
    }

    #[test]
    fn test_equality_ignores_payload() {
        let mut a = Message::new("AllData");
        a.insert("DataLength", "5");
        let mut b = a.clone();
        b.attach_payload(Payload::from_bytes(Bytes::from_static(b"12345")));

        assert_eq!(a, b);
    }
}
