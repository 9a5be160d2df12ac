//! Session builder and connection lifecycle.
//!
//! A [`Session`] is one logical connection to a node:
//! 1. Open the stream (TCP, or any duplex stream handed in)
//! 2. Start the reader, writer and dispatcher tasks
//! 3. Send `ClientHello` and wait, bounded, for `NodeHello`
//! 4. Execute commands and dispatch inbound messages to listeners
//! 5. Tear everything down exactly once, on request or when the stream ends
//!
//! # Example
//!
//! ```ignore
//! use fcp_client::{Command, NodeAddress, Session};
//!
//! #[tokio::main]
//! async fn main() -> fcp_client::Result<()> {
//!     let session = Session::builder()
//!         .client_name("keepalive")
//!         .listener(|_session: &Session, message: &fcp_client::Message| {
//!             tracing::info!("received {}", message.name());
//!         })
//!         .build();
//!
//!     if session.connect(&NodeAddress::default()).await? {
//!         session.execute(Command::new("ListPeers")).await?;
//!     }
//!     session.disconnect();
//!     Ok(())
//! }
//! ```

use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::config::SessionConfig;
use crate::error::{FcpError, Result};
use crate::listener::{ConnectionListener, ListenerId, ListenerRegistry};
use crate::protocol::{Command, Message, NODE_HELLO};
use crate::reader::MessageReader;
use crate::spool::{PayloadSpool, SpoolTracker};
use crate::transport::{connect_tcp, NodeAddress};
use crate::writer::{spawn_writer_task, WriterHandle};

/// Lifecycle state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Not connected yet.
    Disconnected,
    /// Stream open, handshake reply not seen yet.
    AwaitingHandshake,
    /// Handshake reply received.
    Ready,
    /// Torn down; absorbing.
    Terminated,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::AwaitingHandshake => "awaiting handshake",
            ConnectionState::Ready => "ready",
            ConnectionState::Terminated => "terminated",
        };
        f.write_str(name)
    }
}

/// Builder for configuring and creating a session.
pub struct SessionBuilder {
    config: SessionConfig,
    listeners: Vec<Arc<dyn ConnectionListener>>,
}

impl SessionBuilder {
    /// Create a new session builder with default configuration.
    pub fn new() -> Self {
        Self {
            config: SessionConfig::default(),
            listeners: Vec::new(),
        }
    }

    /// Replace the whole configuration.
    pub fn config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the client name sent in the handshake.
    pub fn client_name(mut self, name: impl Into<String>) -> Self {
        self.config.client_name = name.into();
        self
    }

    /// Set the protocol version requested in the handshake.
    ///
    /// Default: "2.0"
    pub fn expected_version(mut self, version: impl Into<String>) -> Self {
        self.config.expected_version = version.into();
        self
    }

    /// Set how long `connect` waits for the handshake reply.
    ///
    /// Default: 10 seconds
    pub fn handshake_timeout(mut self, timeout: Duration) -> Self {
        self.config.handshake_timeout = timeout;
        self
    }

    /// Set the socket receive buffer size (`None` keeps the OS default).
    ///
    /// Default: 65535
    pub fn receive_buffer_size(mut self, size: Option<u32>) -> Self {
        self.config.receive_buffer_size = size;
        self
    }

    /// Set the directory for payload scratch files.
    pub fn temp_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.temp_dir = Some(dir.into());
        self
    }

    /// Set the largest payload spooled in memory rather than to a file.
    ///
    /// Default: 64 KiB
    pub fn memory_threshold(mut self, bytes: usize) -> Self {
        self.config.memory_threshold = bytes;
        self
    }

    /// Set the largest `DataLength` accepted from the node.
    ///
    /// Default: 1 GiB
    pub fn max_payload_length(mut self, bytes: u64) -> Self {
        self.config.max_payload_length = bytes;
        self
    }

    /// Set the outbound frame queue capacity.
    ///
    /// Default: 64
    pub fn writer_channel_capacity(mut self, capacity: usize) -> Self {
        self.config.writer_channel_capacity = capacity;
        self
    }

    /// Register a listener from the start.
    pub fn listener<L: ConnectionListener>(mut self, listener: L) -> Self {
        self.listeners.push(Arc::new(listener));
        self
    }

    /// Build the session. No I/O happens until `connect`.
    pub fn build(self) -> Session {
        let session = Session::new(self.config);
        for listener in self.listeners {
            session.inner.listeners.add(listener);
        }
        session
    }
}

impl Default for SessionBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Event queued for the dispatcher task.
enum SessionEvent {
    Message(Message),
    Terminated,
}

/// Tasks and handles owned while the stream is open.
struct IoTasks {
    writer: WriterHandle,
    writer_task: JoinHandle<()>,
    reader_task: Option<JoinHandle<()>>,
}

struct Inner {
    config: SessionConfig,
    state: watch::Sender<ConnectionState>,
    node_hello: Mutex<Option<Message>>,
    /// Set while the stream is open.
    stream_open: AtomicBool,
    /// `connect` may only run once.
    started: AtomicBool,
    /// Teardown guard.
    terminated: AtomicBool,
    listeners: ListenerRegistry,
    spool_tracker: Arc<SpoolTracker>,
    io: Mutex<Option<IoTasks>>,
    /// Taken on teardown; nothing is queued after `Terminated`.
    events: Mutex<Option<mpsc::UnboundedSender<SessionEvent>>>,
}

impl Inner {
    /// Route a decoded message: the first handshake reply is stored,
    /// everything else goes to the listeners.
    fn deliver(&self, message: Message) {
        if message.name() == NODE_HELLO && self.record_handshake(&message) {
            return;
        }
        if let Some(events) = lock(&self.events).as_ref() {
            let _ = events.send(SessionEvent::Message(message));
        }
    }

    fn record_handshake(&self, message: &Message) -> bool {
        {
            let mut node_hello = lock(&self.node_hello);
            if node_hello.is_some() {
                tracing::warn!("Repeated {} forwarded to listeners", NODE_HELLO);
                return false;
            }
            *node_hello = Some(message.clone());
        }

        self.state.send_if_modified(|state| {
            if *state == ConnectionState::AwaitingHandshake {
                *state = ConnectionState::Ready;
                true
            } else {
                false
            }
        });
        tracing::info!(
            "Handshake with node complete (version {})",
            message.get("Version").unwrap_or("unknown")
        );
        true
    }

    /// Release the storage of payloads no listener consumed.
    fn reclaim_payloads(&self) {
        let reclaimed = self.spool_tracker.reclaim_all();
        if reclaimed > 0 {
            tracing::debug!("Reclaimed {} unconsumed payloads", reclaimed);
        }
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        let io = match self.io.get_mut() {
            Ok(io) => io.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(io) = io {
            tracing::debug!("Session dropped without disconnect, aborting tasks");
            io.writer_task.abort();
            if let Some(reader_task) = io.reader_task {
                reader_task.abort();
            }
        }
    }
}

/// A connection to a node.
///
/// Cheaply cloneable; all clones refer to the same connection.
#[derive(Clone)]
pub struct Session {
    inner: Arc<Inner>,
}

impl Session {
    /// Create a new session builder.
    pub fn builder() -> SessionBuilder {
        SessionBuilder::new()
    }

    /// Create a session with the given configuration.
    pub fn new(config: SessionConfig) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            inner: Arc::new(Inner {
                config,
                state,
                node_hello: Mutex::new(None),
                stream_open: AtomicBool::new(false),
                started: AtomicBool::new(false),
                terminated: AtomicBool::new(false),
                listeners: ListenerRegistry::new(),
                spool_tracker: Arc::new(SpoolTracker::new()),
                io: Mutex::new(None),
                events: Mutex::new(None),
            }),
        }
    }

    /// Get the client name of this session.
    pub fn name(&self) -> &str {
        &self.inner.config.client_name
    }

    /// Get the configuration.
    pub fn config(&self) -> &SessionConfig {
        &self.inner.config
    }

    /// Get the current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        *self.inner.state.borrow()
    }

    /// Get the `NodeHello` the node sent, once received.
    pub fn node_hello(&self) -> Option<Message> {
        lock(&self.inner.node_hello).clone()
    }

    /// Check if the handshake was observed and the stream is still open.
    pub fn is_connected(&self) -> bool {
        lock(&self.inner.node_hello).is_some() && self.inner.stream_open.load(Ordering::Acquire)
    }

    /// Register a listener.
    pub fn add_listener(&self, listener: Arc<dyn ConnectionListener>) -> ListenerId {
        self.inner.listeners.add(listener)
    }

    /// Remove a listener. Returns `false` if it was not registered.
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.inner.listeners.remove(id)
    }

    /// Number of registered listeners.
    pub fn listener_count(&self) -> usize {
        self.inner.listeners.len()
    }

    /// Number of spooled payloads whose storage is still held.
    pub fn live_payloads(&self) -> usize {
        self.inner.spool_tracker.live_count()
    }

    /// Connect to a node over TCP and perform the handshake.
    ///
    /// Returns `Ok(true)` if the node answered the handshake within the
    /// configured timeout, `Ok(false)` if it did not (the stream stays open
    /// and the reply may still arrive later).
    ///
    /// # Errors
    ///
    /// - `Connect` if the stream could not be opened; the session is torn down
    /// - `AlreadyConnected` if this session was connected before
    /// - `NotConnected` if the session was already disconnected
    /// - `Io` if sending the handshake failed; the session is torn down
    pub async fn connect(&self, node: &NodeAddress) -> Result<bool> {
        self.begin()?;
        tracing::info!("Connecting to node at {}", node);

        let stream = match connect_tcp(node, self.inner.config.receive_buffer_size).await {
            Ok(stream) => stream,
            Err(e) => {
                self.teardown(false);
                return Err(e);
            }
        };
        self.start(stream).await
    }

    /// Adopt an already open duplex stream and perform the handshake.
    ///
    /// Same contract as [`connect`](Session::connect).
    pub async fn connect_stream<S>(&self, stream: S) -> Result<bool>
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        self.begin()?;
        self.start(stream).await
    }

    fn begin(&self) -> Result<()> {
        if self.inner.terminated.load(Ordering::Acquire) {
            return Err(FcpError::NotConnected);
        }
        if self.inner.started.swap(true, Ordering::AcqRel) {
            return Err(FcpError::AlreadyConnected);
        }
        Ok(())
    }

    async fn start<S>(&self, stream: S) -> Result<bool>
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let inner = &self.inner;
        let (read_half, write_half) = tokio::io::split(stream);
        let (writer, writer_task) = spawn_writer_task(write_half, inner.config.writer_config());
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        {
            let mut io = lock(&inner.io);
            if inner.terminated.load(Ordering::Acquire) {
                writer_task.abort();
                return Err(FcpError::NotConnected);
            }
            *lock(&inner.events) = Some(events_tx);
            *io = Some(IoTasks {
                writer,
                writer_task,
                reader_task: None,
            });
            inner.stream_open.store(true, Ordering::Release);
        }
        inner.state.send_if_modified(|state| {
            if *state == ConnectionState::Disconnected {
                *state = ConnectionState::AwaitingHandshake;
                true
            } else {
                false
            }
        });

        tokio::spawn(dispatch_loop(events_rx, Arc::downgrade(inner)));

        let spool = PayloadSpool::with_tracker(inner.config.spool_config(), inner.spool_tracker.clone());
        let reader = MessageReader::new(read_half, spool, inner.config.max_payload_length);
        let reader_task = tokio::spawn(read_loop(reader, Arc::downgrade(inner)));
        match lock(&inner.io).as_mut() {
            Some(io) => io.reader_task = Some(reader_task),
            None => reader_task.abort(),
        }

        let hello = Command::client_hello(&inner.config.client_name, &inner.config.expected_version);
        if let Err(e) = self.execute(hello).await {
            tracing::error!("Sending handshake failed: {}", e);
            self.teardown(false);
            return Err(e);
        }

        Ok(self.wait_for_handshake().await)
    }

    /// Suspend until the handshake reply or teardown, bounded by the timeout.
    ///
    /// The reply may be followed by teardown before this task wakes up, so
    /// the outcome is read from the recorded reply, not the final state.
    async fn wait_for_handshake(&self) -> bool {
        let timeout = self.inner.config.handshake_timeout;
        let mut state_rx = self.inner.state.subscribe();
        let settled = state_rx.wait_for(|state| {
            matches!(state, ConnectionState::Ready | ConnectionState::Terminated)
        });

        let timed_out = tokio::time::timeout(timeout, settled).await.is_err();
        if timed_out {
            tracing::warn!("No {} within {:?}", NODE_HELLO, timeout);
            return false;
        }
        lock(&self.inner.node_hello).is_some()
    }

    /// Write a command to the node.
    ///
    /// Frames from concurrent callers are written one after another, never
    /// interleaved. Returns once the frame, payload included, is flushed.
    ///
    /// # Errors
    ///
    /// - `NotConnected` if the stream is not open
    /// - `Io` if writing fails
    /// - `Payload` if the payload source ends before its declared length;
    ///   the truncated frame is not rolled back
    pub async fn execute(&self, command: Command) -> Result<()> {
        let writer = {
            let io = lock(&self.inner.io);
            match io.as_ref() {
                Some(io) if self.inner.stream_open.load(Ordering::Acquire) => io.writer.clone(),
                _ => return Err(FcpError::NotConnected),
            }
        };

        tracing::debug!("Executing {}", command.name());
        writer.send(command).await
    }

    /// Disconnect from the node.
    ///
    /// Idempotent and safe to call from any task, including listener
    /// callbacks. The first call closes the stream, stops the I/O tasks,
    /// wakes a pending `connect`, and notifies every listener of termination
    /// exactly once. Payloads no listener consumed are reclaimed after that
    /// notification.
    pub fn disconnect(&self) {
        self.teardown(false);
    }

    fn teardown(&self, from_reader: bool) {
        let inner = &self.inner;
        if inner.terminated.swap(true, Ordering::AcqRel) {
            return;
        }
        inner.stream_open.store(false, Ordering::Release);

        let io = lock(&inner.io).take();
        if let Some(io) = io {
            drop(io.writer);
            io.writer_task.abort();
            if let Some(reader_task) = io.reader_task {
                if !from_reader {
                    reader_task.abort();
                }
            }
        }

        inner.state.send_replace(ConnectionState::Terminated);
        tracing::info!("Session {} terminated", inner.config.client_name);

        // Messages still queued keep their payloads until the dispatcher
        // has delivered them; it reclaims after the termination event.
        let events = lock(&inner.events).take();
        let queued = events
            .map(|events| events.send(SessionEvent::Terminated).is_ok())
            .unwrap_or(false);
        if !queued {
            inner.listeners.notify_terminated(self);
            inner.reclaim_payloads();
        }
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("name", &self.name())
            .field("state", &self.state())
            .field("listeners", &self.listener_count())
            .finish()
    }
}

/// Reader task: decode until EOF or error, then tear the session down.
async fn read_loop<R>(mut reader: MessageReader<R>, session: Weak<Inner>)
where
    R: AsyncRead + Unpin,
{
    let outcome = loop {
        match reader.next_message().await {
            Ok(Some(message)) => match session.upgrade() {
                Some(inner) => inner.deliver(message),
                None => break Ok(()),
            },
            Ok(None) => break Ok(()),
            Err(e) => break Err(e),
        }
    };

    match &outcome {
        Ok(()) => tracing::debug!("Node closed the stream"),
        Err(e) => tracing::warn!("Reader stopped: {}", e),
    }
    drop(reader);

    if let Some(inner) = session.upgrade() {
        Session { inner }.teardown(true);
    }
}

/// Dispatcher task: call listeners in arrival order, termination last.
async fn dispatch_loop(mut events: mpsc::UnboundedReceiver<SessionEvent>, weak: Weak<Inner>) {
    while let Some(event) = events.recv().await {
        let Some(inner) = weak.upgrade() else {
            break;
        };
        let session = Session { inner };
        match event {
            SessionEvent::Message(message) => {
                session.inner.listeners.notify_message(&session, &message);
            }
            SessionEvent::Terminated => {
                session.inner.listeners.notify_terminated(&session);
                session.inner.reclaim_payloads();
                break;
            }
        }
    }
}

/// Lock a mutex, recovering the data if a holder panicked.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
