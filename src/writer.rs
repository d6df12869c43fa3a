//! Dedicated writer task for the control connection.
//!
//! Callers never touch the socket's write half directly. They hand each
//! message to the writer task over an mpsc channel and wait for a
//! completion signal once the bytes have been flushed.
//!
//! # Architecture
//!
//! ```text
//! send() ─► mpsc::Sender<OutboundMessage> ─► Writer Task ─► TCP write half
//!   ▲                                            │
//!   └────────── oneshot completion ◄─────────────┘
//! ```
//!
//! Dropping every [`WriterHandle`] closes the channel; the task then shuts
//! down the write half and exits.

use bytes::Bytes;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::error::{NetSdrError, Result};

/// Default channel capacity.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 64;

/// A message queued for the socket.
#[derive(Debug)]
pub struct OutboundMessage {
    /// Complete encoded message.
    pub bytes: Bytes,
    done: oneshot::Sender<Result<()>>,
}

/// Handle for sending messages to the writer task.
///
/// Cheaply cloneable.
#[derive(Clone)]
pub struct WriterHandle {
    tx: mpsc::Sender<OutboundMessage>,
}

impl WriterHandle {
    /// Queue `bytes` and wait until they are written and flushed.
    pub async fn send(&self, bytes: Bytes) -> Result<()> {
        let (done, written) = oneshot::channel();
        self.tx
            .send(OutboundMessage { bytes, done })
            .await
            .map_err(|_| NetSdrError::ConnectionClosed)?;

        // Task gone before reporting back
        written.await.unwrap_or(Err(NetSdrError::ConnectionClosed))
    }
}

/// Spawn the writer task and return a handle for sending messages.
///
/// The JoinHandle resolves when the channel closes (`Ok`) or a write fails.
pub fn spawn_writer_task<W>(writer: W, capacity: usize) -> (WriterHandle, JoinHandle<Result<()>>)
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (tx, rx) = mpsc::channel(capacity);
    let task = tokio::spawn(writer_loop(rx, writer));
    (WriterHandle { tx }, task)
}

async fn writer_loop<W>(mut rx: mpsc::Receiver<OutboundMessage>, mut writer: W) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    while let Some(message) = rx.recv().await {
        let written = async {
            writer.write_all(&message.bytes).await?;
            writer.flush().await
        }
        .await;

        match written {
            Ok(()) => {
                let _ = message.done.send(Ok(()));
            }
            Err(e) => {
                tracing::error!("Control write failed: {}", e);
                let _ = message
                    .done
                    .send(Err(NetSdrError::Transport(format!("write failed: {}", e))));
                // Queued messages see ConnectionClosed when rx drops
                return Err(NetSdrError::Io(e));
            }
        }
    }

    // Channel closed, clean shutdown
    let _ = writer.shutdown().await;
    Ok(())
}
