//! UDP streaming link.
//!
//! `start_listening` binds the socket and spawns a receive loop that runs
//! until `stop_listening` signals it over a oneshot. Every datagram is
//! passed to the handler as-is; decoding is the handler's job.

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::net::UdpSocket;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use super::{DatagramHandler, HandlerSlot, StreamingLink};
use crate::error::{NetSdrError, Result};

/// Largest datagram the receive loop accepts without truncation.
const MAX_DATAGRAM_SIZE: usize = 65_536;

type DatagramSlot = HandlerSlot<dyn Fn(Bytes) + Send + Sync>;

/// Snapshot of the receive counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamStats {
    pub packets_received: u64,
    pub bytes_received: u64,
    pub errors: u64,
}

#[derive(Default)]
struct StreamCounters {
    packets: AtomicU64,
    bytes: AtomicU64,
    errors: AtomicU64,
}

struct Listener {
    shutdown_tx: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

/// [`StreamingLink`] over `tokio::net::UdpSocket`.
pub struct UdpStreamingLink {
    bind_addr: SocketAddr,
    handler: Arc<DatagramSlot>,
    counters: Arc<StreamCounters>,
    local_addr: Mutex<Option<SocketAddr>>,
    listener: tokio::sync::Mutex<Option<Listener>>,
}

impl UdpStreamingLink {
    /// Listen on `0.0.0.0:port`.
    pub fn new(port: u16) -> Self {
        Self::with_bind_addr(SocketAddr::from((Ipv4Addr::UNSPECIFIED, port)))
    }

    pub fn with_bind_addr(bind_addr: SocketAddr) -> Self {
        Self {
            bind_addr,
            handler: Arc::new(HandlerSlot::new()),
            counters: Arc::new(StreamCounters::default()),
            local_addr: Mutex::new(None),
            listener: tokio::sync::Mutex::new(None),
        }
    }

    /// Address actually bound while listening (resolves port 0).
    pub fn local_addr(&self) -> Option<SocketAddr> {
        *self.local_addr.lock().unwrap_or_else(|p| p.into_inner())
    }

    pub fn stats(&self) -> StreamStats {
        StreamStats {
            packets_received: self.counters.packets.load(Ordering::Relaxed),
            bytes_received: self.counters.bytes.load(Ordering::Relaxed),
            errors: self.counters.errors.load(Ordering::Relaxed),
        }
    }

    fn set_local_addr(&self, addr: Option<SocketAddr>) {
        *self.local_addr.lock().unwrap_or_else(|p| p.into_inner()) = addr;
    }
}

#[async_trait]
impl StreamingLink for UdpStreamingLink {
    async fn start_listening(&self) -> Result<()> {
        let mut listener = self.listener.lock().await;
        if listener.is_some() {
            tracing::debug!("Streaming link already listening");
            return Ok(());
        }

        let socket = UdpSocket::bind(self.bind_addr).await.map_err(|e| {
            NetSdrError::Transport(format!("bind {} failed: {}", self.bind_addr, e))
        })?;
        let local_addr = socket.local_addr()?;

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let task = tokio::spawn(receive_loop(
            socket,
            shutdown_rx,
            self.handler.clone(),
            self.counters.clone(),
        ));
        *listener = Some(Listener { shutdown_tx, task });
        self.set_local_addr(Some(local_addr));

        tracing::info!("Streaming link listening on {}", local_addr);
        Ok(())
    }

    async fn stop_listening(&self) {
        let Some(active) = self.listener.lock().await.take() else {
            return;
        };

        let _ = active.shutdown_tx.send(());
        if let Err(e) = active.task.await {
            tracing::error!("Streaming receive loop ended abnormally: {}", e);
        }
        self.set_local_addr(None);

        let stats = self.stats();
        tracing::info!(
            "Streaming link stopped ({} packets, {} bytes, {} errors)",
            stats.packets_received,
            stats.bytes_received,
            stats.errors
        );
    }

    fn is_listening(&self) -> bool {
        self.local_addr().is_some()
    }

    fn set_datagram_handler(&self, handler: DatagramHandler) {
        self.handler.set(handler);
    }
}

impl Drop for UdpStreamingLink {
    fn drop(&mut self) {
        if let Some(active) = self.listener.get_mut().take() {
            let _ = active.shutdown_tx.send(());
        }
    }
}

async fn receive_loop(
    socket: UdpSocket,
    mut shutdown_rx: oneshot::Receiver<()>,
    handler: Arc<DatagramSlot>,
    counters: Arc<StreamCounters>,
) {
    let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];

    loop {
        tokio::select! {
            biased;

            // Fires on stop or when the link is dropped
            _ = &mut shutdown_rx => break,

            received = socket.recv_from(&mut buf) => match received {
                Ok((n, from)) => {
                    counters.packets.fetch_add(1, Ordering::Relaxed);
                    counters.bytes.fetch_add(n as u64, Ordering::Relaxed);
                    tracing::trace!("Datagram from {}: {} bytes", from, n);

                    if let Some(handler) = handler.get() {
                        handler(Bytes::copy_from_slice(&buf[..n]));
                    }
                }
                Err(e) => {
                    counters.errors.fetch_add(1, Ordering::Relaxed);
                    tracing::error!("Streaming receive failed: {}", e);
                }
            },
        }
    }
}
