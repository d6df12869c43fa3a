//! Frame struct with typed payload variants.
//!
//! A frame is a header plus one of three payload shapes, selected by the
//! message type:
//! - control-bearing types: 2-byte item code + parameters
//! - data-bearing types: 2-byte sequence number + sample data
//! - header-only (total length 2): no body at all
//!
//! Uses `bytes::Bytes` so decoded bodies share the receive buffer.
//!
//! # Example
//!
//! ```
//! use netsdr_client::protocol::{build_control_item_message, Frame, ControlItemCode, MessageType};
//!
//! let bytes = build_control_item_message(
//!     MessageType::SetControlItem,
//!     ControlItemCode::RfFilter,
//!     &[0x00, 0x00],
//! )
//! .unwrap();
//! let frame = Frame::decode(bytes.into()).unwrap();
//!
//! assert_eq!(frame.item_code(), Some(ControlItemCode::RfFilter));
//! assert_eq!(frame.body(), &[0x00, 0x00]);
//! ```

use bytes::{BufMut, Bytes, BytesMut};

use super::wire_format::{
    ControlItemCode, Header, MessageType, HEADER_LENGTH, ITEM_CODE_LENGTH,
    SEQUENCE_NUMBER_LENGTH,
};
use crate::error::{NetSdrError, Result};

/// Body of a frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    /// Control-bearing body.
    Control {
        item_code: ControlItemCode,
        params: Bytes,
    },
    /// Data-bearing body. The sequence number is opaque.
    Data { sequence_number: u16, body: Bytes },
    /// Header-only frame (the device's NAK).
    Empty,
}

/// A complete protocol frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub message_type: MessageType,
    pub payload: Payload,
}

impl Frame {
    /// Create a control-bearing frame.
    pub fn control(
        message_type: MessageType,
        item_code: ControlItemCode,
        params: impl Into<Bytes>,
    ) -> Self {
        Self {
            message_type,
            payload: Payload::Control {
                item_code,
                params: params.into(),
            },
        }
    }

    /// Create a data-bearing frame.
    pub fn data(message_type: MessageType, sequence_number: u16, body: impl Into<Bytes>) -> Self {
        Self {
            message_type,
            payload: Payload::Data {
                sequence_number,
                body: body.into(),
            },
        }
    }

    /// Total encoded length, header included.
    pub fn encoded_len(&self) -> usize {
        HEADER_LENGTH
            + match &self.payload {
                Payload::Control { params, .. } => ITEM_CODE_LENGTH + params.len(),
                Payload::Data { body, .. } => SEQUENCE_NUMBER_LENGTH + body.len(),
                Payload::Empty => 0,
            }
    }

    /// Item code for control-bearing frames.
    #[inline]
    pub fn item_code(&self) -> Option<ControlItemCode> {
        match &self.payload {
            Payload::Control { item_code, .. } => Some(*item_code),
            _ => None,
        }
    }

    /// Sequence number for data-bearing frames.
    #[inline]
    pub fn sequence_number(&self) -> Option<u16> {
        match &self.payload {
            Payload::Data {
                sequence_number, ..
            } => Some(*sequence_number),
            _ => None,
        }
    }

    /// Parameters or sample data, whichever this frame carries.
    pub fn body(&self) -> &[u8] {
        match &self.payload {
            Payload::Control { params, .. } => params,
            Payload::Data { body, .. } => body,
            Payload::Empty => &[],
        }
    }

    /// Check if this is a header-only NAK.
    #[inline]
    pub fn is_nak(&self) -> bool {
        matches!(self.payload, Payload::Empty)
    }

    /// Encode the frame to wire bytes.
    ///
    /// Fails if the length is out of bounds or the payload shape doesn't
    /// match the message type.
    pub fn encode(&self) -> Result<Bytes> {
        match &self.payload {
            Payload::Control { .. } if self.message_type.is_data_item() => {
                return Err(NetSdrError::InvalidParameter(format!(
                    "{:?} cannot carry a control item",
                    self.message_type
                )));
            }
            Payload::Data { .. } if !self.message_type.is_data_item() => {
                return Err(NetSdrError::InvalidParameter(format!(
                    "{:?} cannot carry a data item",
                    self.message_type
                )));
            }
            _ => {}
        }

        let total = self.encoded_len();
        let header = Header::new(self.message_type, total)?;

        let mut buf = BytesMut::with_capacity(total);
        buf.put_slice(&header.encode());
        match &self.payload {
            Payload::Control { item_code, params } => {
                buf.put_u16_le(item_code.code());
                buf.put_slice(params);
            }
            Payload::Data {
                sequence_number,
                body,
            } => {
                buf.put_u16_le(*sequence_number);
                buf.put_slice(body);
            }
            Payload::Empty => {}
        }
        Ok(buf.freeze())
    }

    /// Decode one whole message.
    ///
    /// The declared length must equal `bytes.len()` exactly, so both
    /// truncated and over-long input are rejected. Control-bearing frames
    /// with an unrecognized item code fail with
    /// [`NetSdrError::UnknownItemCode`].
    pub fn decode(bytes: Bytes) -> Result<Self> {
        let header = Header::decode(&bytes)?;

        if header.length() != bytes.len() {
            return Err(NetSdrError::Framing(format!(
                "Declared length {} but got {} bytes",
                header.length(),
                bytes.len()
            )));
        }

        let message_type = header.message_type();
        let body = bytes.slice(HEADER_LENGTH..);

        if body.is_empty() {
            return Ok(Self {
                message_type,
                payload: Payload::Empty,
            });
        }

        if body.len() < 2 {
            return Err(NetSdrError::Framing(format!(
                "{:?} body of {} byte too short for its 2-byte prefix",
                message_type,
                body.len()
            )));
        }

        let prefix = u16::from_le_bytes([body[0], body[1]]);
        let rest = body.slice(2..);

        let payload = if message_type.is_data_item() {
            Payload::Data {
                sequence_number: prefix,
                body: rest,
            }
        } else {
            let item_code =
                ControlItemCode::from_u16(prefix).ok_or(NetSdrError::UnknownItemCode(prefix))?;
            Payload::Control {
                item_code,
                params: rest,
            }
        };

        Ok(Self {
            message_type,
            payload,
        })
    }
}

/// Build a control-bearing message as a single byte vector.
pub fn build_control_item_message(
    message_type: MessageType,
    item_code: ControlItemCode,
    params: &[u8],
) -> Result<Vec<u8>> {
    Frame::control(message_type, item_code, Bytes::copy_from_slice(params))
        .encode()
        .map(Vec::from)
}

/// Build a data-bearing message as a single byte vector.
pub fn build_data_item_message(
    message_type: MessageType,
    sequence_number: u16,
    body: &[u8],
) -> Result<Vec<u8>> {
    Frame::data(message_type, sequence_number, Bytes::copy_from_slice(body))
        .encode()
        .map(Vec::from)
}

/// Decode a message from a borrowed buffer (copies data).
pub fn translate_message(bytes: &[u8]) -> Result<Frame> {
    Frame::decode(Bytes::copy_from_slice(bytes))
}
