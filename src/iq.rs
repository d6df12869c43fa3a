//! IQ packets produced by the streaming lane.
//!
//! Each datagram is decoded, its samples extracted at the configured width,
//! and the result pushed onto a bounded queue. The receive loop never
//! waits on the consumer: when the queue is full the packet is dropped.

use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::mpsc::{self, error::TrySendError};

use crate::error::{NetSdrError, Result};
use crate::protocol::{Frame, MessageType, Payload};
use crate::samples::{SampleWidth, Samples};
use crate::transport::DatagramHandler;

/// One decoded data item from the streaming channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IqPacket {
    pub message_type: MessageType,
    /// Opaque device counter, passed through unchecked.
    pub sequence_number: u16,
    /// Zero-extended samples in wire order.
    pub samples: Vec<i32>,
}

impl IqPacket {
    /// Decode a datagram holding a single data item.
    ///
    /// Control-bearing and header-only frames are rejected.
    pub fn from_datagram(datagram: Bytes, width: SampleWidth) -> Result<Self> {
        let frame = Frame::decode(datagram)?;
        match frame.payload {
            Payload::Data {
                sequence_number,
                body,
            } => Ok(Self {
                message_type: frame.message_type,
                sequence_number,
                samples: Samples::new(width, &body).collect(),
            }),
            _ => Err(NetSdrError::Framing(format!(
                "{:?} datagram carries no sample data",
                frame.message_type
            ))),
        }
    }
}

/// Build the datagram handler that feeds `sink`.
pub(crate) fn datagram_handler(width: SampleWidth, sink: mpsc::Sender<IqPacket>) -> DatagramHandler {
    Arc::new(move |datagram: Bytes| {
        let packet = match IqPacket::from_datagram(datagram, width) {
            Ok(packet) => packet,
            Err(e) => {
                tracing::warn!("Skipping datagram: {}", e);
                return;
            }
        };

        match sink.try_send(packet) {
            Ok(()) => {}
            Err(TrySendError::Full(packet)) => {
                tracing::warn!(
                    "IQ queue full, dropped packet {}",
                    packet.sequence_number
                );
            }
            Err(TrySendError::Closed(_)) => {
                tracing::trace!("IQ consumer gone, dropping packet");
            }
        }
    })
}
