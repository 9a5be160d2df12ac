//! # fcp-client
//!
//! Client connection engine for line-oriented node protocols in the style of
//! FCP 2.0.
//!
//! A [`Session`] opens a duplex stream to a node, performs the
//! `ClientHello`/`NodeHello` handshake, writes [`Command`]s atomically from any
//! number of tasks, and decodes inbound [`Message`]s (including binary
//! payloads) which are delivered to registered [`ConnectionListener`]s.
//!
//! ## Architecture
//!
//! - **Writer task**: owns the write half; frames from concurrent callers are
//!   queued and written one at a time
//! - **Reader task**: decodes lines, spools payloads to memory or a temp file
//! - **Dispatcher task**: calls listeners in arrival order, termination last
//!
//! ## Example
//!
//! ```ignore
//! use fcp_client::{Command, Message, NodeAddress, Session};
//!
//! #[tokio::main]
//! async fn main() -> fcp_client::Result<()> {
//!     let session = Session::builder()
//!         .client_name("example")
//!         .listener(|_: &Session, message: &Message| {
//!             println!("{} {:?}", message.name(), message.identifier());
//!         })
//!         .build();
//!
//!     if !session.connect(&NodeAddress::default()).await? {
//!         eprintln!("node did not answer the handshake");
//!     }
//!
//!     let put = Command::builder("ClientPut")
//!         .identifier("put-1")
//!         .field("URI", "CHK@")
//!         .payload_bytes(bytes::Bytes::from_static(b"hello"))
//!         .build();
//!     session.execute(put).await?;
//!
//!     session.disconnect();
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod listener;
pub mod protocol;
pub mod reader;
pub mod session;
pub mod spool;
pub mod transport;
pub mod writer;

pub use config::SessionConfig;
pub use error::{FcpError, Result};
pub use listener::{ConnectionListener, ListenerId};
pub use protocol::{Command, CommandBuilder, Fields, Message};
pub use session::{ConnectionState, Session, SessionBuilder};
pub use spool::Payload;
pub use transport::NodeAddress;
