//! Payload spooling.
//!
//! When a frame announces `Data`, exactly `DataLength` raw bytes follow the
//! header block. [`PayloadSpool`] drains them from the stream into scratch
//! storage so the reader can move on to the next frame, and returns a
//! one-shot [`Payload`] handle over the staged bytes.
//!
//! Scratch storage is an anonymous temporary file (removed by the OS as soon
//! as it is closed) or, for payloads up to the configured threshold, a
//! memory buffer. Storage is released when the handle is exhausted, closed
//! or dropped; handles nobody consumed are reclaimed by
//! [`SpoolTracker::reclaim_all`] at session teardown.

use std::io::SeekFrom;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::task::{ready, Context, Poll};

use bytes::{Buf, Bytes};
use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncSeekExt, AsyncWriteExt, ReadBuf};

use crate::error::{FcpError, Result};

/// Default largest payload kept in memory instead of a temporary file.
pub const DEFAULT_MEMORY_THRESHOLD: usize = 64 * 1024;

/// Where spooled bytes live until consumed.
enum Storage {
    Memory(Bytes),
    File(File),
}

/// Shared slot holding the storage of one payload.
#[derive(Default)]
struct SpoolSlot {
    storage: Mutex<Option<Storage>>,
    /// Handed out to a consumer; no longer reclaimed at teardown.
    claimed: AtomicBool,
}

impl SpoolSlot {
    fn new(storage: Storage) -> Arc<Self> {
        Arc::new(Self {
            storage: Mutex::new(Some(storage)),
            claimed: AtomicBool::new(false),
        })
    }

    /// Drop the storage. Returns `true` if something was released.
    fn release(&self) -> bool {
        match self.storage.lock() {
            Ok(mut storage) => storage.take().is_some(),
            Err(_) => false,
        }
    }

    fn is_released(&self) -> bool {
        self.storage.lock().map(|s| s.is_none()).unwrap_or(true)
    }
}

/// One-shot readable handle over a spooled payload.
///
/// Reads yield exactly [`len`](Payload::len) bytes, then EOF. The backing
/// storage is released once the last byte has been read.
pub struct Payload {
    slot: Arc<SpoolSlot>,
    length: u64,
    remaining: u64,
}

impl Payload {
    fn new(slot: Arc<SpoolSlot>, length: u64) -> Self {
        Self {
            slot,
            length,
            remaining: length,
        }
    }

    /// Create a payload over bytes already in memory.
    pub fn from_bytes(data: Bytes) -> Self {
        let length = data.len() as u64;
        Self::new(SpoolSlot::new(Storage::Memory(data)), length)
    }

    /// Declared length of the payload.
    #[inline]
    pub fn len(&self) -> u64 {
        self.length
    }

    /// Check if the payload is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    /// Bytes not yet read.
    #[inline]
    pub fn remaining(&self) -> u64 {
        self.remaining
    }

    /// Check if the backing storage has been released.
    pub fn is_released(&self) -> bool {
        self.slot.is_released()
    }

    /// Read the whole payload into memory.
    pub async fn read_to_bytes(mut self) -> std::io::Result<Bytes> {
        let mut buf = Vec::with_capacity(self.remaining as usize);
        self.read_to_end(&mut buf).await?;
        Ok(Bytes::from(buf))
    }

    /// Release the backing storage without reading the rest.
    pub fn close(self) {
        self.slot.release();
    }

    /// Mark the payload as owned by a consumer, exempting it from
    /// [`SpoolTracker::reclaim_all`].
    pub(crate) fn claim(&self) {
        self.slot.claimed.store(true, Ordering::Release);
    }
}

impl std::fmt::Debug for Payload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Payload")
            .field("length", &self.length)
            .field("remaining", &self.remaining)
            .finish()
    }
}

impl AsyncRead for Payload {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        if self.remaining == 0 {
            self.slot.release();
            return Poll::Ready(Ok(()));
        }
        if buf.remaining() == 0 {
            return Poll::Ready(Ok(()));
        }

        let slot = self.slot.clone();
        let mut guard = slot
            .storage
            .lock()
            .map_err(|_| std::io::Error::other("payload storage lock poisoned"))?;

        let before = buf.filled().len();
        match guard.as_mut() {
            None => {
                return Poll::Ready(Err(std::io::Error::new(
                    std::io::ErrorKind::BrokenPipe,
                    "payload storage was reclaimed",
                )));
            }
            Some(Storage::Memory(bytes)) => {
                let n = bytes.len().min(buf.remaining());
                buf.put_slice(&bytes[..n]);
                bytes.advance(n);
            }
            Some(Storage::File(file)) => {
                ready!(Pin::new(file).poll_read(cx, buf))?;
            }
        }

        let n = (buf.filled().len() - before) as u64;
        if n == 0 {
            return Poll::Ready(Err(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "spooled payload is shorter than declared",
            )));
        }

        self.remaining = self.remaining.saturating_sub(n);
        if self.remaining == 0 {
            guard.take();
        }
        Poll::Ready(Ok(()))
    }
}

/// Registry of live spool slots, used to reclaim unconsumed payloads.
#[derive(Default)]
pub struct SpoolTracker {
    slots: Mutex<Vec<Weak<SpoolSlot>>>,
}

impl SpoolTracker {
    /// Create an empty tracker.
    pub fn new() -> Self {
        Self::default()
    }

    fn register(&self, slot: &Arc<SpoolSlot>) {
        if let Ok(mut slots) = self.slots.lock() {
            slots.retain(|weak| weak.strong_count() > 0);
            slots.push(Arc::downgrade(slot));
        }
    }

    /// Number of payloads whose storage is still held.
    pub fn live_count(&self) -> usize {
        self.slots
            .lock()
            .map(|slots| {
                slots
                    .iter()
                    .filter_map(Weak::upgrade)
                    .filter(|slot| !slot.is_released())
                    .count()
            })
            .unwrap_or(0)
    }

    /// Release the storage of every payload still alive and unclaimed.
    ///
    /// Returns the number of payloads reclaimed. Handles stay valid but
    /// further reads fail. Claimed payloads stay readable and release their
    /// storage when exhausted, closed or dropped.
    pub fn reclaim_all(&self) -> usize {
        let slots = match self.slots.lock() {
            Ok(mut slots) => std::mem::take(&mut *slots),
            Err(_) => return 0,
        };
        slots
            .iter()
            .filter_map(Weak::upgrade)
            .filter(|slot| !slot.claimed.load(Ordering::Acquire))
            .filter(|slot| slot.release())
            .count()
    }
}

/// Settings for payload scratch storage.
#[derive(Debug, Clone)]
pub struct SpoolConfig {
    /// Directory for temporary files; system default if `None`.
    pub temp_dir: Option<PathBuf>,
    /// Payloads up to this many bytes stay in memory.
    pub memory_threshold: usize,
}

impl Default for SpoolConfig {
    fn default() -> Self {
        Self {
            temp_dir: None,
            memory_threshold: DEFAULT_MEMORY_THRESHOLD,
        }
    }
}

/// Drains declared-length payloads from a stream into scratch storage.
pub struct PayloadSpool {
    config: SpoolConfig,
    tracker: Arc<SpoolTracker>,
}

impl PayloadSpool {
    /// Create a spool with its own tracker.
    pub fn new(config: SpoolConfig) -> Self {
        Self::with_tracker(config, Arc::new(SpoolTracker::new()))
    }

    /// Create a spool registering payloads in `tracker`.
    pub fn with_tracker(config: SpoolConfig, tracker: Arc<SpoolTracker>) -> Self {
        Self { config, tracker }
    }

    /// Get the tracker payloads are registered with.
    pub fn tracker(&self) -> &Arc<SpoolTracker> {
        &self.tracker
    }

    /// Copy exactly `length` bytes from `reader` into fresh scratch storage.
    ///
    /// Short reads are retried until the full length has arrived.
    ///
    /// # Errors
    ///
    /// - `Payload` if the stream ends before `length` bytes were copied;
    ///   the scratch storage is discarded
    /// - `Io` if reading the stream or writing the scratch file fails
    pub async fn spool<R>(&self, reader: &mut R, length: u64) -> Result<Payload>
    where
        R: AsyncRead + Unpin,
    {
        let storage = if length <= self.config.memory_threshold as u64 {
            self.spool_to_memory(reader, length).await?
        } else {
            self.spool_to_file(reader, length).await?
        };

        let slot = SpoolSlot::new(storage);
        self.tracker.register(&slot);
        Ok(Payload::new(slot, length))
    }

    async fn spool_to_memory<R>(&self, reader: &mut R, length: u64) -> Result<Storage>
    where
        R: AsyncRead + Unpin,
    {
        let mut buf = Vec::with_capacity(length as usize);
        let copied = (&mut *reader).take(length).read_to_end(&mut buf).await? as u64;
        if copied != length {
            return Err(FcpError::short_payload(copied, length));
        }
        Ok(Storage::Memory(Bytes::from(buf)))
    }

    async fn spool_to_file<R>(&self, reader: &mut R, length: u64) -> Result<Storage>
    where
        R: AsyncRead + Unpin,
    {
        let std_file = match &self.config.temp_dir {
            Some(dir) => tempfile::tempfile_in(dir)?,
            None => tempfile::tempfile()?,
        };
        let mut file = File::from_std(std_file);

        let copied = tokio::io::copy(&mut (&mut *reader).take(length), &mut file).await?;
        if copied != length {
            return Err(FcpError::short_payload(copied, length));
        }

        file.flush().await?;
        file.seek(SeekFrom::Start(0)).await?;
        Ok(Storage::File(file))
    }
}
