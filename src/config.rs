//! Session configuration.
//!
//! [`SessionConfig`] can be built in code through
//! [`SessionBuilder`](crate::SessionBuilder) or deserialized from any serde
//! format; missing keys take their defaults.
//!
//! # Example
//!
//! ```ignore
//! let config: SessionConfig = serde_json::from_str(r#"{
//!     "client_name": "keepalive",
//!     "handshake_timeout": 2.5,
//!     "temp_dir": "/var/tmp/fcp"
//! }"#)?;
//! ```

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Deserializer};

use crate::protocol::{DEFAULT_MAX_PAYLOAD_LENGTH, EXPECTED_VERSION};
use crate::spool::{SpoolConfig, DEFAULT_MEMORY_THRESHOLD};
use crate::transport::DEFAULT_RECEIVE_BUFFER_SIZE;
use crate::writer::{WriterConfig, DEFAULT_CHANNEL_CAPACITY};

/// Default client name sent in the handshake.
pub const DEFAULT_CLIENT_NAME: &str = "fcp-client";

/// Default bound on the wait for the handshake reply.
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Settings of one session.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Name sent as `Name` in the handshake.
    pub client_name: String,
    /// Version sent as `ExpectedVersion` in the handshake.
    pub expected_version: String,
    /// How long `connect` waits for the handshake reply (seconds when deserialized).
    #[serde(deserialize_with = "deserialize_secs")]
    pub handshake_timeout: Duration,
    /// Socket receive buffer size; `None` keeps the OS default.
    pub receive_buffer_size: Option<u32>,
    /// Directory for payload scratch files; system default if `None`.
    pub temp_dir: Option<PathBuf>,
    /// Payloads up to this many bytes are spooled in memory.
    pub memory_threshold: usize,
    /// Largest `DataLength` accepted from the node.
    pub max_payload_length: u64,
    /// Capacity of the outbound frame queue.
    pub writer_channel_capacity: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            client_name: DEFAULT_CLIENT_NAME.to_string(),
            expected_version: EXPECTED_VERSION.to_string(),
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
            receive_buffer_size: Some(DEFAULT_RECEIVE_BUFFER_SIZE),
            temp_dir: None,
            memory_threshold: DEFAULT_MEMORY_THRESHOLD,
            max_payload_length: DEFAULT_MAX_PAYLOAD_LENGTH,
            writer_channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

impl SessionConfig {
    /// Spool settings derived from this configuration.
    pub fn spool_config(&self) -> SpoolConfig {
        SpoolConfig {
            temp_dir: self.temp_dir.clone(),
            memory_threshold: self.memory_threshold,
        }
    }

    /// Writer settings derived from this configuration.
    pub fn writer_config(&self) -> WriterConfig {
        WriterConfig {
            channel_capacity: self.writer_channel_capacity,
        }
    }
}

fn deserialize_secs<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let secs = f64::deserialize(deserializer)?;
    Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
}
