//! TCP control link.
//!
//! One connection at a time. Outbound messages go through the writer task;
//! inbound bytes are split into whole messages by a [`FrameBuffer`] on a
//! dedicated read task and handed to the event handler one by one.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;

use super::{ControlEvent, ControlEventHandler, ControlLink, HandlerSlot};
use crate::error::{NetSdrError, Result};
use crate::protocol::{FrameBuffer, MAX_DATA_ITEM_MESSAGE_LENGTH};
use crate::writer::{spawn_writer_task, WriterHandle, DEFAULT_CHANNEL_CAPACITY};

const READ_BUFFER_SIZE: usize = 16 * 1024;

type EventSlot = HandlerSlot<dyn Fn(ControlEvent) + Send + Sync>;

struct Session {
    writer: WriterHandle,
    reader_task: JoinHandle<()>,
}

impl Session {
    fn shutdown(self) {
        self.reader_task.abort();
        // Last handle dropped: the writer task shuts the write half and exits
        drop(self.writer);
    }
}

/// [`ControlLink`] over `tokio::net::TcpStream`.
pub struct TcpControlLink {
    host: String,
    port: u16,
    connected: Arc<AtomicBool>,
    handler: Arc<EventSlot>,
    session: tokio::sync::Mutex<Option<Session>>,
}

impl TcpControlLink {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            connected: Arc::new(AtomicBool::new(false)),
            handler: Arc::new(HandlerSlot::new()),
            session: tokio::sync::Mutex::new(None),
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }
}

#[async_trait]
impl ControlLink for TcpControlLink {
    async fn connect(&self) -> Result<()> {
        let mut session = self.session.lock().await;
        if session.is_some() && self.connected.load(Ordering::Acquire) {
            return Ok(());
        }
        // Left behind by a peer close
        if let Some(stale) = session.take() {
            stale.shutdown();
        }

        let stream = TcpStream::connect((self.host.as_str(), self.port))
            .await
            .map_err(|e| {
                NetSdrError::Transport(format!(
                    "connect to {}:{} failed: {}",
                    self.host, self.port, e
                ))
            })?;
        stream.set_nodelay(true)?;

        let (read_half, write_half) = stream.into_split();
        let (writer, _writer_task) = spawn_writer_task(write_half, DEFAULT_CHANNEL_CAPACITY);

        self.connected.store(true, Ordering::Release);
        let reader_task = tokio::spawn(read_loop(
            read_half,
            self.handler.clone(),
            self.connected.clone(),
        ));
        *session = Some(Session {
            writer,
            reader_task,
        });

        tracing::info!("Control link connected to {}:{}", self.host, self.port);
        Ok(())
    }

    async fn disconnect(&self) {
        // Cleared first so the read task doesn't report our own close
        self.connected.store(false, Ordering::Release);
        if let Some(session) = self.session.lock().await.take() {
            session.shutdown();
            tracing::info!("Control link to {}:{} disconnected", self.host, self.port);
        }
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    async fn send(&self, message: Bytes) -> Result<()> {
        let writer = {
            let session = self.session.lock().await;
            match session.as_ref() {
                Some(active) if self.is_connected() => active.writer.clone(),
                _ => return Err(NetSdrError::NotConnected),
            }
        };

        tracing::trace!("Control send: {} bytes", message.len());
        writer.send(message).await
    }

    fn set_event_handler(&self, handler: ControlEventHandler) {
        self.handler.set(handler);
    }
}

impl Drop for TcpControlLink {
    fn drop(&mut self) {
        if let Some(session) = self.session.get_mut().take() {
            session.shutdown();
        }
    }
}

fn emit(handler: &EventSlot, event: ControlEvent) {
    match handler.get() {
        Some(handler) => handler(event),
        None => tracing::debug!("No control event handler installed, dropping {:?}", event),
    }
}

async fn read_loop<R>(mut reader: R, handler: Arc<EventSlot>, connected: Arc<AtomicBool>)
where
    R: AsyncRead + Unpin,
{
    let mut frames = FrameBuffer::with_capacity(MAX_DATA_ITEM_MESSAGE_LENGTH);
    let mut buf = vec![0u8; READ_BUFFER_SIZE];

    loop {
        let n = match reader.read(&mut buf).await {
            Ok(0) => {
                tracing::debug!("Control connection closed by peer");
                break;
            }
            Ok(n) => n,
            Err(e) => {
                tracing::error!("Control read failed: {}", e);
                break;
            }
        };

        match frames.push(&buf[..n]) {
            Ok(messages) => {
                for message in messages {
                    emit(&handler, ControlEvent::Message(message));
                }
            }
            Err(e) => {
                // No way to find the next header again
                tracing::error!("Control stream desynchronized: {}", e);
                break;
            }
        }
    }

    if connected.swap(false, Ordering::AcqRel) {
        emit(&handler, ControlEvent::Closed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::io::AsyncWriteExt;
    use tokio::net::TcpListener;
    use tokio::sync::mpsc;

    fn collecting_handler() -> (ControlEventHandler, mpsc::UnboundedReceiver<ControlEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let handler: ControlEventHandler = Arc::new(move |event: ControlEvent| {
            let _ = tx.send(event);
        });
        (handler, rx)
    }

    async fn next_event(rx: &mut mpsc::UnboundedReceiver<ControlEvent>) -> ControlEvent {
        tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timed out waiting for event")
            .expect("handler dropped")
    }

    #[tokio::test]
    async fn test_send_while_disconnected_fails() {
        let link = TcpControlLink::new("127.0.0.1", 1);
        let result = link.send(Bytes::from_static(&[0x02, 0x00])).await;
        assert!(matches!(result, Err(NetSdrError::NotConnected)));
        // Nothing to tear down
        link.disconnect().await;
        assert!(!link.is_connected());
    }

    #[tokio::test]
    async fn test_connect_failure_leaves_link_disconnected() {
        // Grab a free port, then close it
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap().port()
        };

        let link = TcpControlLink::new("127.0.0.1", port);
        let result = link.connect().await;
        assert!(matches!(result, Err(NetSdrError::Transport(_))));
        assert!(!link.is_connected());
    }

    #[tokio::test]
    async fn test_messages_reassembled_across_reads() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let link = TcpControlLink::new("127.0.0.1", port);
        let (handler, mut events) = collecting_handler();
        link.set_event_handler(handler);

        link.connect().await.unwrap();
        let (mut device, _) = listener.accept().await.unwrap();
        assert!(link.is_connected());

        // Two messages split awkwardly across three writes
        device.write_all(&[0x05, 0x00, 0x18]).await.unwrap();
        device.flush().await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        device.write_all(&[0x00, 0x80, 0x04]).await.unwrap();
        device.flush().await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        device.write_all(&[0x00, 0x18, 0x00]).await.unwrap();

        assert_eq!(
            next_event(&mut events).await,
            ControlEvent::Message(Bytes::from_static(&[0x05, 0x00, 0x18, 0x00, 0x80]))
        );
        assert_eq!(
            next_event(&mut events).await,
            ControlEvent::Message(Bytes::from_static(&[0x04, 0x00, 0x18, 0x00]))
        );
    }

    #[tokio::test]
    async fn test_send_reaches_peer() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let link = TcpControlLink::new("127.0.0.1", port);
        link.connect().await.unwrap();
        let (mut device, _) = listener.accept().await.unwrap();

        link.send(Bytes::from_static(&[0x04, 0x00, 0x18, 0x00]))
            .await
            .unwrap();

        let mut buf = [0u8; 4];
        device.read_exact(&mut buf).await.unwrap();
        assert_eq!(buf, [0x04, 0x00, 0x18, 0x00]);
    }

    #[tokio::test]
    async fn test_peer_close_raises_closed() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let link = TcpControlLink::new("127.0.0.1", port);
        let (handler, mut events) = collecting_handler();
        link.set_event_handler(handler);
        link.connect().await.unwrap();

        let (device, _) = listener.accept().await.unwrap();
        drop(device);

        assert_eq!(next_event(&mut events).await, ControlEvent::Closed);
        assert!(!link.is_connected());
        assert!(matches!(
            link.send(Bytes::from_static(&[0x02, 0x00])).await,
            Err(NetSdrError::NotConnected)
        ));

        // Reconnect replaces the dead session
        link.connect().await.unwrap();
        let _device = listener.accept().await.unwrap();
        assert!(link.is_connected());
    }

    #[tokio::test]
    async fn test_local_disconnect_is_silent() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let link = TcpControlLink::new("127.0.0.1", port);
        let (handler, mut events) = collecting_handler();
        link.set_event_handler(handler);
        link.connect().await.unwrap();
        let (mut device, _) = listener.accept().await.unwrap();

        link.disconnect().await;
        assert!(!link.is_connected());

        // Device sees EOF
        let mut buf = Vec::new();
        assert_eq!(device.read_to_end(&mut buf).await.unwrap(), 0);

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_desynchronized_stream_closes() {
        let (mut device, client) = tokio::io::duplex(256);
        let (handler, mut events) = collecting_handler();
        let slot = Arc::new(EventSlot::new());
        slot.set(handler);
        let connected = Arc::new(AtomicBool::new(true));

        let task = tokio::spawn(read_loop(client, slot, connected.clone()));
        // Control type with the sentinel length
        device.write_all(&[0x00, 0x00]).await.unwrap();

        assert_eq!(next_event(&mut events).await, ControlEvent::Closed);
        task.await.unwrap();
        assert!(!connected.load(Ordering::Acquire));
    }
}
