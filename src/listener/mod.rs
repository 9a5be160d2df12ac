//! Listener module - observers of session traffic.
//!
//! Provides:
//! - [`ConnectionListener`] - callbacks for received messages and termination
//! - [`ListenerRegistry`] - thread-safe set of listeners, notified over a snapshot
//!
//! Callbacks run on the session's dispatcher task, one at a time and in wire
//! order. A listener that needs to send commands should clone the session
//! and spawn a task rather than block the callback.
//!
//! # Example
//!
//! ```ignore
//! use fcp_client::{ConnectionListener, Message, Session};
//!
//! struct Progress;
//!
//! impl ConnectionListener for Progress {
//!     fn message_received(&self, _session: &Session, message: &Message) {
//!         if message.name() == "SimpleProgress" {
//!             tracing::info!("{:?}: {:?}", message.identifier(), message.get("Succeeded"));
//!         }
//!     }
//!
//!     fn connection_terminated(&self, session: &Session) {
//!         tracing::warn!("{} lost its node", session.name());
//!     }
//! }
//! ```

mod registry;

pub use registry::{ListenerId, ListenerRegistry};

use crate::protocol::Message;
use crate::session::Session;

/// Observer of a session.
pub trait ConnectionListener: Send + Sync + 'static {
    /// Called for every message except the handshake reply.
    fn message_received(&self, session: &Session, message: &Message);

    /// Called exactly once when the session terminates.
    fn connection_terminated(&self, session: &Session) {
        let _ = session;
    }
}

/// Closures observing only messages can be registered directly.
impl<F> ConnectionListener for F
where
    F: Fn(&Session, &Message) + Send + Sync + 'static,
{
    fn message_received(&self, session: &Session, message: &Message) {
        self(session, message)
    }
}
