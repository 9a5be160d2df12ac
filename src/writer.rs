//! Dedicated writer task for outbound frames.
//!
//! All commands of a session go through one mpsc channel to a single writer
//! task, which owns the write half of the node stream. Because only that
//! task writes, frames from concurrent callers can never interleave, and a
//! frame whose caller gave up waiting is still written completely.
//!
//! # Architecture
//!
//! ```text
//! execute() ─┐
//! execute() ─┼─► mpsc::Sender<OutboundFrame> ─► Writer Task ─► Stream
//! execute() ─┘            ◄── oneshot result ──┘
//! ```

use bytes::Bytes;
use tokio::io::{AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::error::{FcpError, Result};
use crate::protocol::{encode_header, Command, PayloadSource};

/// Default channel capacity.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 64;

/// A frame ready to be written to the stream.
pub struct OutboundFrame {
    /// Encoded name, field and terminator lines.
    pub header: Bytes,
    /// Payload source and its exact length.
    pub payload: Option<(PayloadSource, u64)>,
    /// Where the write outcome is reported.
    done: oneshot::Sender<Result<()>>,
}

impl OutboundFrame {
    /// Encode a command into a frame, returning the receiver for its outcome.
    pub fn from_command(command: Command) -> (Self, oneshot::Receiver<Result<()>>) {
        let (name, fields, payload) = command.into_parts();
        let (done, rx) = oneshot::channel();
        let frame = Self {
            header: encode_header(&name, &fields),
            payload,
            done,
        };
        (frame, rx)
    }
}

/// Configuration for the writer task.
#[derive(Debug, Clone)]
pub struct WriterConfig {
    /// Channel capacity for the frame queue.
    pub channel_capacity: usize,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

/// Handle for sending frames to the writer task.
///
/// Cheaply cloneable. The writer task stops once every handle is dropped.
#[derive(Clone)]
pub struct WriterHandle {
    tx: mpsc::Sender<OutboundFrame>,
}

impl WriterHandle {
    /// Write a command and wait until it is on the wire.
    ///
    /// # Errors
    ///
    /// - `NotConnected` if the writer task has stopped
    /// - `Io` / `Payload` if writing this frame failed
    pub async fn send(&self, command: Command) -> Result<()> {
        let (frame, done) = OutboundFrame::from_command(command);
        self.tx
            .send(frame)
            .await
            .map_err(|_| FcpError::NotConnected)?;
        done.await.map_err(|_| FcpError::NotConnected)?
    }
}

/// Spawn the writer task and return a handle for sending frames.
///
/// # Arguments
///
/// * `writer` - The write half of the node stream
/// * `config` - Writer configuration
///
/// # Returns
///
/// A tuple of `(WriterHandle, JoinHandle)`; the task ends when all handles
/// are dropped or after the first failed write.
pub fn spawn_writer_task<W>(writer: W, config: WriterConfig) -> (WriterHandle, JoinHandle<()>)
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (tx, rx) = mpsc::channel(config.channel_capacity.max(1));
    let task = tokio::spawn(writer_loop(rx, writer));
    (WriterHandle { tx }, task)
}

/// Spawn the writer task with default configuration.
pub fn spawn_writer_task_default<W>(writer: W) -> (WriterHandle, JoinHandle<()>)
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    spawn_writer_task(writer, WriterConfig::default())
}

/// Main writer loop - writes frames one at a time, in arrival order.
async fn writer_loop<W>(mut rx: mpsc::Receiver<OutboundFrame>, mut writer: W)
where
    W: AsyncWrite + Unpin,
{
    while let Some(frame) = rx.recv().await {
        let result = write_frame(&mut writer, &frame.header, frame.payload).await;
        if let Err(e) = &result {
            tracing::warn!("Writing frame failed, stopping writer: {}", e);
            let _ = frame.done.send(result);
            return;
        }
        let _ = frame.done.send(result);
    }

    tracing::debug!("Writer channel closed, shutting down stream");
    let _ = writer.shutdown().await;
}

/// Write one frame: header lines, flush, then exactly `length` payload bytes.
///
/// A failure after the header is on the wire leaves a truncated frame; it is
/// not rolled back.
async fn write_frame<W>(
    writer: &mut W,
    header: &[u8],
    payload: Option<(PayloadSource, u64)>,
) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(header).await?;
    writer.flush().await?;

    if let Some((mut source, length)) = payload {
        let copied = tokio::io::copy(&mut (&mut source).take(length), writer).await?;
        if copied != length {
            return Err(FcpError::short_payload(copied, length));
        }
        writer.flush().await?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use tokio::io::duplex;

    fn hello() -> Command {
        Command::client_hello("tester", "2.0")
    }

    #[test]
    fn test_writer_config_default() {
        let config = WriterConfig::default();
        assert_eq!(config.channel_capacity, DEFAULT_CHANNEL_CAPACITY);
    }

    #[test]
    fn test_outbound_frame_from_command() {
        let command = Command::builder("ClientPut")
            .payload_bytes(Bytes::from_static(b"abc"))
            .build();
        let (frame, _done) = OutboundFrame::from_command(command);

        assert_eq!(&frame.header[..], b"ClientPut\nDataLength=3\nEndMessage\n");
        assert_eq!(frame.payload.as_ref().map(|(_, len)| *len), Some(3));
    }

    #[tokio::test]
    async fn test_writer_handle_send() {
        let (client, mut server) = duplex(4096);
        let (handle, _task) = spawn_writer_task_default(client);

        handle.send(hello()).await.unwrap();

        let mut buf = vec![0u8; 128];
        let n = server.read(&mut buf).await.unwrap();
        assert_eq!(
            &buf[..n],
            b"ClientHello\nName=tester\nExpectedVersion=2.0\nEndMessage\n"
        );
    }

    #[tokio::test]
    async fn test_write_frame_with_payload() {
        let mut out = Cursor::new(Vec::new());
        let source: PayloadSource = Box::new(Cursor::new(b"hello world".to_vec()));

        write_frame(&mut out, b"ClientPut\nEndMessage\n", Some((source, 5)))
            .await
            .unwrap();

        assert_eq!(out.into_inner(), b"ClientPut\nEndMessage\nhello");
    }

    #[tokio::test]
    async fn test_write_frame_short_payload() {
        let mut out = Cursor::new(Vec::new());
        let source: PayloadSource = Box::new(Cursor::new(b"abc".to_vec()));

        let result = write_frame(&mut out, b"ClientPut\nEndMessage\n", Some((source, 5))).await;

        assert!(matches!(result, Err(FcpError::Payload(_))));
        // header and the partial payload stay on the wire
        assert_eq!(out.into_inner(), b"ClientPut\nEndMessage\nabc");
    }

    #[tokio::test]
    async fn test_concurrent_sends_do_not_interleave() {
        let (client, mut server) = duplex(64 * 1024);
        let (handle, _task) = spawn_writer_task_default(client);

        let mut tasks = Vec::new();
        for i in 0..20 {
            let handle = handle.clone();
            tasks.push(tokio::spawn(async move {
                let command = Command::builder(format!("Cmd{i}"))
                    .field("Index", i.to_string())
                    .field("Tail", "x".repeat(100))
                    .build();
                handle.send(command).await.unwrap();
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }
        drop(handle);

        let mut out = String::new();
        server.read_to_string(&mut out).await.unwrap();
        let lines: Vec<_> = out.lines().collect();

        assert_eq!(lines.len(), 20 * 4);
        for frame in lines.chunks(4) {
            let i = frame[0].strip_prefix("Cmd").unwrap();
            assert_eq!(frame[1], format!("Index={i}"));
            assert!(frame[2].starts_with("Tail="));
            assert_eq!(frame[3], "EndMessage");
        }
    }

    #[tokio::test]
    async fn test_send_after_stream_closed() {
        let (client, server) = duplex(64);
        drop(server);
        let (handle, task) = spawn_writer_task_default(client);

        assert!(handle.send(hello()).await.is_err());
        task.await.unwrap();
        assert!(matches!(
            handle.send(hello()).await,
            Err(FcpError::NotConnected)
        ));
    }

    #[tokio::test]
    async fn test_writer_shutdown_on_channel_close() {
        let (client, mut server) = duplex(4096);
        let (handle, task) = spawn_writer_task_default(client);

        drop(handle);
        task.await.unwrap();

        let mut buf = Vec::new();
        assert_eq!(server.read_to_end(&mut buf).await.unwrap(), 0);
    }
}
