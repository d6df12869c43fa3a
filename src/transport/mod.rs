//! Transport module - the two links the client drives.
//!
//! - [`ControlLink`]: byte-stream control channel (TCP in production)
//! - [`StreamingLink`]: datagram IQ channel (UDP in production)
//!
//! Both deliver inbound traffic through a handler registered up front.
//! Handlers run on the link's receive task and must not block.

mod tcp;
mod udp;

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::Result;

pub use tcp::TcpControlLink;
pub use udp::{StreamStats, UdpStreamingLink};

/// Notification raised by a control link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlEvent {
    /// One whole protocol message received from the device.
    Message(Bytes),
    /// The peer closed the connection or the read side failed.
    Closed,
}

/// Callback for control link notifications.
pub type ControlEventHandler = Arc<dyn Fn(ControlEvent) + Send + Sync>;

/// Callback for received datagrams.
pub type DatagramHandler = Arc<dyn Fn(Bytes) + Send + Sync>;

/// Persistent byte-stream channel to the device.
///
/// `send` completing means the bytes left this process; the device's reply
/// arrives separately as a [`ControlEvent::Message`].
#[async_trait]
pub trait ControlLink: Send + Sync {
    /// Open the connection. A no-op when already connected.
    async fn connect(&self) -> Result<()>;

    /// Close the connection. A no-op when not connected.
    async fn disconnect(&self);

    fn is_connected(&self) -> bool;

    /// Write one encoded message.
    ///
    /// # Errors
    ///
    /// [`NetSdrError::NotConnected`](crate::NetSdrError::NotConnected) when
    /// there is no connection.
    async fn send(&self, message: Bytes) -> Result<()>;

    /// Install the handler for received messages, replacing any previous one.
    fn set_event_handler(&self, handler: ControlEventHandler);
}

/// One-way datagram channel from the device.
#[async_trait]
pub trait StreamingLink: Send + Sync {
    /// Begin receiving in the background. A no-op when already listening.
    async fn start_listening(&self) -> Result<()>;

    /// Stop receiving. Returns once the receive loop has ended.
    async fn stop_listening(&self);

    fn is_listening(&self) -> bool;

    /// Install the handler for received datagrams, replacing any previous one.
    fn set_datagram_handler(&self, handler: DatagramHandler);
}

/// Handler storage shared between a link and its receive task.
pub(crate) struct HandlerSlot<H: ?Sized> {
    inner: Mutex<Option<Arc<H>>>,
}

impl<H: ?Sized> HandlerSlot<H> {
    pub(crate) fn new() -> Self {
        Self {
            inner: Mutex::new(None),
        }
    }

    pub(crate) fn set(&self, handler: Arc<H>) {
        *self.inner.lock().unwrap_or_else(|p| p.into_inner()) = Some(handler);
    }

    /// Current handler, cloned out so it is invoked without the lock held.
    pub(crate) fn get(&self) -> Option<Arc<H>> {
        self.inner.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }
}
