//! Registry of connection listeners.
//!
//! Listeners are stored in registration order. Notification iterates over a
//! snapshot taken under the lock, so listeners may be added or removed
//! (including from inside a callback) while a notification is running.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use super::ConnectionListener;
use crate::protocol::Message;
use crate::session::Session;

/// Handle returned on registration, used for removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Entry = (ListenerId, Arc<dyn ConnectionListener>);

/// Thread-safe set of listeners.
pub struct ListenerRegistry {
    /// Registered listeners, in registration order.
    listeners: RwLock<Vec<Entry>>,
    /// Next ID to assign.
    next_id: AtomicU64,
}

impl ListenerRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            listeners: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Register a listener.
    pub fn add(&self, listener: Arc<dyn ConnectionListener>) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        match self.listeners.write() {
            Ok(mut listeners) => listeners.push((id, listener)),
            Err(poisoned) => poisoned.into_inner().push((id, listener)),
        }
        id
    }

    /// Remove a listener. Returns `false` if it was not registered.
    pub fn remove(&self, id: ListenerId) -> bool {
        let mut listeners = match self.listeners.write() {
            Ok(listeners) => listeners,
            Err(poisoned) => poisoned.into_inner(),
        };
        match listeners.iter().position(|(entry_id, _)| *entry_id == id) {
            Some(index) => {
                listeners.remove(index);
                true
            }
            None => false,
        }
    }

    /// Number of registered listeners.
    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    /// Check if no listener is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy of the current listener set.
    pub fn snapshot(&self) -> Vec<Arc<dyn ConnectionListener>> {
        let listeners = match self.listeners.read() {
            Ok(listeners) => listeners,
            Err(poisoned) => poisoned.into_inner(),
        };
        listeners.iter().map(|(_, l)| l.clone()).collect()
    }

    /// Notify every listener about a received message.
    pub fn notify_message(&self, session: &Session, message: &Message) {
        for listener in self.snapshot() {
            let result = catch_unwind(AssertUnwindSafe(|| {
                listener.message_received(session, message)
            }));
            if result.is_err() {
                tracing::error!("Listener panicked handling {}", message.name());
            }
        }
    }

    /// Notify every listener that the connection terminated.
    pub fn notify_terminated(&self, session: &Session) {
        for listener in self.snapshot() {
            let result = catch_unwind(AssertUnwindSafe(|| {
                listener.connection_terminated(session)
            }));
            if result.is_err() {
                tracing::error!("Listener panicked handling connection termination");
            }
        }
    }
}

impl Default for ListenerRegistry {
    fn default() -> Self {
        Self::new()
    }
}
