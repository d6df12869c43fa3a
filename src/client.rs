//! Client builder and connection lifecycle.
//!
//! The [`ClientBuilder`] assembles configuration and links. The
//! [`NetSdrClient`] drives them:
//! 1. Connect the control link and run the handshake
//! 2. Exchange control requests one at a time
//! 3. Start/stop the streaming link alongside the device's IQ capture
//!
//! # Example
//!
//! ```no_run
//! use netsdr_client::NetSdrClient;
//!
//! # async fn run() -> netsdr_client::Result<()> {
//! let client = NetSdrClient::builder().host("192.168.1.50").build()?;
//! let mut packets = client.take_iq_packets().expect("first take");
//!
//! client.connect().await?;
//! client.change_frequency(14_100_000, 0).await?;
//! client.start_iq().await?;
//!
//! while let Some(packet) = packets.recv().await {
//!     println!("#{}: {} samples", packet.sequence_number, packet.samples.len());
//! }
//! client.close().await;
//! # Ok(())
//! # }
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::mpsc;

use crate::config::ClientConfig;
use crate::control::{set_receiver_frequency, start_iq_capture, stop_iq_capture, ControlRequest};
use crate::correlator::{Correlator, Delivery};
use crate::error::{NetSdrError, Result};
use crate::iq::{datagram_handler, IqPacket};
use crate::protocol::Frame;
use crate::samples::SampleWidth;
use crate::transport::{
    ControlEvent, ControlEventHandler, ControlLink, StreamingLink, TcpControlLink,
    UdpStreamingLink,
};

/// Where the client stands, derived from its connection and IQ flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClientState {
    Disconnected,
    ConnectedIdle,
    ConnectedStreaming,
}

/// Flags shared with the control event handler.
#[derive(Default)]
struct Status {
    connected: AtomicBool,
    iq_started: AtomicBool,
}

/// Builder for configuring and creating a [`NetSdrClient`].
pub struct ClientBuilder {
    config: ClientConfig,
    control_link: Option<Arc<dyn ControlLink>>,
    streaming_link: Option<Arc<dyn StreamingLink>>,
}

impl ClientBuilder {
    pub fn new() -> Self {
        Self {
            config: ClientConfig::default(),
            control_link: None,
            streaming_link: None,
        }
    }

    /// Replace the whole configuration.
    pub fn config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.config.host = host.into();
        self
    }

    pub fn control_port(mut self, port: u16) -> Self {
        self.config.control_port = port;
        self
    }

    pub fn streaming_port(mut self, port: u16) -> Self {
        self.config.streaming_port = port;
        self
    }

    /// Set how long a control exchange waits for its reply.
    ///
    /// `None` waits until the reply arrives or the exchange is cancelled.
    /// Default: 5 seconds
    pub fn reply_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.config.reply_timeout_ms =
            timeout.map(|t| u64::try_from(t.as_millis()).unwrap_or(u64::MAX));
        self
    }

    /// Set the sample width in bits. Checked by [`build`](Self::build).
    ///
    /// Default: 16
    pub fn sample_width(mut self, bits: u16) -> Self {
        self.config.sample_width_bits = bits;
        self
    }

    /// Set how many decoded IQ packets may wait for the consumer.
    ///
    /// When the queue is full new packets are dropped with a warning.
    /// Default: 1024
    pub fn iq_queue_capacity(mut self, capacity: usize) -> Self {
        self.config.iq_queue_capacity = capacity;
        self
    }

    /// Set the requests sent right after connecting.
    pub fn handshake(mut self, requests: Vec<ControlRequest>) -> Self {
        self.config.handshake = requests;
        self
    }

    /// Use a custom control link instead of TCP.
    pub fn control_link(mut self, link: Arc<dyn ControlLink>) -> Self {
        self.control_link = Some(link);
        self
    }

    /// Use a custom streaming link instead of UDP.
    pub fn streaming_link(mut self, link: Arc<dyn StreamingLink>) -> Self {
        self.streaming_link = Some(link);
        self
    }

    /// Validate the configuration and wire up the links.
    ///
    /// # Errors
    ///
    /// - [`NetSdrError::UnsupportedSampleWidth`] for a width outside
    ///   {8, 16, 24, 32}
    /// - [`NetSdrError::InvalidParameter`] for a zero queue capacity
    /// - any encode error from a handshake request
    pub fn build(self) -> Result<NetSdrClient> {
        let config = self.config;
        let width = SampleWidth::from_bits(config.sample_width_bits)?;
        if config.iq_queue_capacity == 0 {
            return Err(NetSdrError::InvalidParameter(
                "IQ queue capacity must be at least 1".to_string(),
            ));
        }
        for request in &config.handshake {
            request.encode()?;
        }

        let control: Arc<dyn ControlLink> = match self.control_link {
            Some(link) => link,
            None => Arc::new(TcpControlLink::new(config.host.clone(), config.control_port)),
        };
        let streaming: Arc<dyn StreamingLink> = match self.streaming_link {
            Some(link) => link,
            None => Arc::new(UdpStreamingLink::new(config.streaming_port)),
        };

        let correlator = Arc::new(Correlator::new());
        let status = Arc::new(Status::default());
        control.set_event_handler(control_event_handler(correlator.clone(), status.clone()));

        let (iq_tx, iq_rx) = mpsc::channel(config.iq_queue_capacity);
        streaming.set_datagram_handler(datagram_handler(width, iq_tx));

        Ok(NetSdrClient {
            control,
            streaming,
            correlator,
            status,
            lifecycle: tokio::sync::Mutex::new(()),
            reply_timeout: config.reply_timeout(),
            handshake: config.handshake,
            iq_packets: Mutex::new(Some(iq_rx)),
        })
    }
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Routes control link notifications into the correlator.
fn control_event_handler(correlator: Arc<Correlator>, status: Arc<Status>) -> ControlEventHandler {
    Arc::new(move |event: ControlEvent| match event {
        ControlEvent::Message(message) => {
            let len = message.len();
            match correlator.resolve(message) {
                Delivery::Delivered => {}
                Delivery::Stale => {
                    tracing::warn!("Stale control message ({} bytes) discarded", len);
                }
                Delivery::Unsolicited => {
                    tracing::warn!("Unsolicited control message ({} bytes) dropped", len);
                }
            }
        }
        ControlEvent::Closed => {
            status.connected.store(false, Ordering::Release);
            correlator.fail_pending(NetSdrError::ConnectionClosed);
            tracing::warn!("Control connection closed by device");
        }
    })
}

/// Decode a reply whose content only matters for logging.
fn inspect_reply(request: &ControlRequest, reply: Bytes) {
    match Frame::decode(reply) {
        Ok(frame) if frame.is_nak() => {
            tracing::warn!("Device rejected {:?} (NAK)", request.item_code);
        }
        Ok(_) => {}
        Err(e) => {
            tracing::warn!("Ignoring undecodable reply to {:?}: {}", request.item_code, e);
        }
    }
}

/// Client for one receiver: a control connection plus an IQ stream.
///
/// All methods take `&self`; share the client behind an `Arc` to call
/// [`disconnect`](Self::disconnect) from another task while a request is
/// waiting.
pub struct NetSdrClient {
    control: Arc<dyn ControlLink>,
    streaming: Arc<dyn StreamingLink>,
    correlator: Arc<Correlator>,
    status: Arc<Status>,
    /// Serializes connect and the IQ start/stop transitions.
    lifecycle: tokio::sync::Mutex<()>,
    reply_timeout: Option<Duration>,
    handshake: Vec<ControlRequest>,
    iq_packets: Mutex<Option<mpsc::Receiver<IqPacket>>>,
}

impl NetSdrClient {
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    pub fn state(&self) -> ClientState {
        match (self.is_connected(), self.iq_started()) {
            (false, _) => ClientState::Disconnected,
            (true, false) => ClientState::ConnectedIdle,
            (true, true) => ClientState::ConnectedStreaming,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.status.connected.load(Ordering::Acquire) && self.control.is_connected()
    }

    pub fn iq_started(&self) -> bool {
        self.status.iq_started.load(Ordering::Acquire)
    }

    /// Take the receiving end of the IQ packet queue.
    ///
    /// Returns `None` after the first call.
    pub fn take_iq_packets(&self) -> Option<mpsc::Receiver<IqPacket>> {
        self.iq_packets
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .take()
    }

    /// Connect the control link and run the handshake.
    ///
    /// Does nothing when already connected. Each handshake request waits for
    /// its reply before the next one goes out. Replies that fail to decode
    /// are logged and skipped; any other failure disconnects the link and is
    /// returned.
    pub async fn connect(&self) -> Result<()> {
        let _lifecycle = self.lifecycle.lock().await;
        if self.is_connected() {
            tracing::debug!("Already connected");
            return Ok(());
        }

        self.control.connect().await?;

        for request in &self.handshake {
            match self.round_trip(request).await {
                Ok(reply) => inspect_reply(request, reply),
                Err(e) => {
                    tracing::error!("Handshake {:?} failed: {}", request.item_code, e);
                    self.control.disconnect().await;
                    return Err(e);
                }
            }
        }

        // Torn down while the handshake ran
        if !self.control.is_connected() {
            return Err(NetSdrError::ConnectionClosed);
        }

        self.status.connected.store(true, Ordering::Release);
        tracing::info!("Connected ({} handshake requests)", self.handshake.len());
        Ok(())
    }

    /// Close the control link.
    ///
    /// Always calls through to the link, connected or not. A request waiting
    /// for its reply fails with [`NetSdrError::Cancelled`]. Streaming is left
    /// alone; see [`close`](Self::close).
    pub async fn disconnect(&self) {
        self.status.connected.store(false, Ordering::Release);
        self.control.disconnect().await;
        if self.correlator.fail_pending(NetSdrError::Cancelled) {
            tracing::debug!("Cancelled pending control request");
        }
        tracing::info!("Disconnected");
    }

    /// Start the streaming link and tell the device to capture.
    ///
    /// Does nothing unless connected.
    pub async fn start_iq(&self) -> Result<()> {
        let _lifecycle = self.lifecycle.lock().await;
        if !self.is_connected() {
            tracing::info!("Not connected, IQ start ignored");
            return Ok(());
        }

        // Listen first so the first datagrams aren't lost
        self.streaming.start_listening().await?;

        let request = start_iq_capture();
        match self.round_trip(&request).await {
            Ok(reply) => inspect_reply(&request, reply),
            Err(e) => {
                if !self.iq_started() {
                    self.streaming.stop_listening().await;
                }
                return Err(e);
            }
        }

        self.status.iq_started.store(true, Ordering::Release);
        tracing::info!("IQ streaming started");
        Ok(())
    }

    /// Tell the device to stop capturing and stop the streaming link.
    ///
    /// Does nothing unless connected and streaming. Streaming stops even if
    /// the device request fails; that error is still returned.
    pub async fn stop_iq(&self) -> Result<()> {
        let _lifecycle = self.lifecycle.lock().await;
        if !(self.is_connected() && self.iq_started()) {
            return Ok(());
        }

        let request = stop_iq_capture();
        let outcome = self.round_trip(&request).await;
        self.halt_streaming().await;

        inspect_reply(&request, outcome?);
        Ok(())
    }

    /// Tune `channel` to `hz` and wait for the device's reply.
    ///
    /// Does nothing unless connected.
    ///
    /// # Errors
    ///
    /// [`NetSdrError::InvalidParameter`] when `hz` doesn't fit 40 bits.
    pub async fn change_frequency(&self, hz: u64, channel: u8) -> Result<()> {
        if !self.is_connected() {
            tracing::info!("Not connected, frequency change ignored");
            return Ok(());
        }

        let request = set_receiver_frequency(hz, channel)?;
        let reply = self.round_trip(&request).await?;
        inspect_reply(&request, reply);
        tracing::info!("Channel {} tuned to {} Hz", channel, hz);
        Ok(())
    }

    /// Send any control request and return the decoded reply.
    ///
    /// # Errors
    ///
    /// [`NetSdrError::NotConnected`] when not connected; otherwise any
    /// encode, transport, correlation or decode failure.
    pub async fn request(&self, request: &ControlRequest) -> Result<Frame> {
        if !self.is_connected() {
            return Err(NetSdrError::NotConnected);
        }
        let reply = self.round_trip(request).await?;
        Frame::decode(reply)
    }

    /// Stop streaming if it was started, then disconnect.
    pub async fn close(&self) {
        if self.iq_started() {
            if self.is_connected() {
                if let Err(e) = self.stop_iq().await {
                    tracing::warn!("IQ stop failed during close: {}", e);
                }
            } else {
                let _lifecycle = self.lifecycle.lock().await;
                self.halt_streaming().await;
            }
        }
        self.disconnect().await;
    }

    async fn halt_streaming(&self) {
        self.streaming.stop_listening().await;
        self.status.iq_started.store(false, Ordering::Release);
        tracing::info!("IQ streaming stopped");
    }

    /// One correlated exchange on the control lane.
    async fn round_trip(&self, request: &ControlRequest) -> Result<Bytes> {
        let message = request.encode()?;
        tracing::debug!(
            "Control request {:?} {:?} ({} bytes)",
            request.message_type,
            request.item_code,
            message.len()
        );

        let control = &self.control;
        let reply = self
            .correlator
            .exchange(self.reply_timeout, request.reply_filter(), move || {
                control.send(message)
            })
            .await?;

        tracing::debug!("Control reply to {:?} ({} bytes)", request.item_code, reply.len());
        Ok(reply)
    }
}
