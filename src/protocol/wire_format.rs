//! Wire format encoding and decoding.
//!
//! Every message starts with a 2-byte little-endian header:
//! ```text
//! ┌────────┬──────────────────────────┐
//! │ Type   │ Length (header included) │
//! │ 3 bits │ 13 bits                  │
//! │ 15..13 │ 12..0                    │
//! └────────┴──────────────────────────┘
//! ```
//!
//! A length field of `0` is a protocol convention, not an overflow: it
//! stands for [`MAX_DATA_ITEM_MESSAGE_LENGTH`] and is legal only for
//! data-item message types.

use serde::{Deserialize, Serialize};

use crate::error::{NetSdrError, Result};

/// Header size in bytes.
pub const HEADER_LENGTH: usize = 2;

/// Item code size in bytes (control-bearing messages).
pub const ITEM_CODE_LENGTH: usize = 2;

/// Sequence number size in bytes (data-bearing messages).
pub const SEQUENCE_NUMBER_LENGTH: usize = 2;

/// Largest total length the 13-bit field can carry.
pub const MAX_MESSAGE_LENGTH: usize = 0x1FFF;

/// Total length of a full data item, sent with the sentinel length.
pub const MAX_DATA_ITEM_MESSAGE_LENGTH: usize = 8194;

/// Length field value standing for [`MAX_DATA_ITEM_MESSAGE_LENGTH`].
pub const LENGTH_SENTINEL: u16 = 0;

const TYPE_SHIFT: u16 = 13;
const LENGTH_MASK: u16 = 0x1FFF;

/// Message type carried in the top three header bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum MessageType {
    SetControlItem = 0,
    CurrentControlItem = 1,
    ControlItemRange = 2,
    Ack = 3,
    DataItem0 = 4,
    DataItem1 = 5,
    DataItem2 = 6,
    DataItem3 = 7,
}

impl MessageType {
    /// Map the 3-bit header field to a type. Every value is assigned.
    pub fn from_bits(bits: u8) -> Self {
        match bits & 0x07 {
            0 => MessageType::SetControlItem,
            1 => MessageType::CurrentControlItem,
            2 => MessageType::ControlItemRange,
            3 => MessageType::Ack,
            4 => MessageType::DataItem0,
            5 => MessageType::DataItem1,
            6 => MessageType::DataItem2,
            _ => MessageType::DataItem3,
        }
    }

    #[inline]
    pub fn bits(self) -> u8 {
        self as u8
    }

    /// Data-bearing types carry a sequence number instead of an item code.
    #[inline]
    pub fn is_data_item(self) -> bool {
        self.bits() >= MessageType::DataItem0.bits()
    }
}

/// Device parameter identifiers for control-bearing messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u16)]
pub enum ControlItemCode {
    None = 0x0000,
    TargetName = 0x0001,
    SerialNumber = 0x0002,
    InterfaceVersion = 0x0003,
    FirmwareVersion = 0x0004,
    ReceiverStatus = 0x0005,
    ProductId = 0x0009,
    ReceiverState = 0x0018,
    ReceiverFrequency = 0x0020,
    RfGain = 0x0038,
    RfFilter = 0x0044,
    AdModes = 0x008A,
    IqOutputSampleRate = 0x00B8,
    DataOutputPacketSize = 0x00C4,
}

impl ControlItemCode {
    /// Try to convert a raw code to a known item.
    pub fn from_u16(value: u16) -> Option<Self> {
        match value {
            0x0000 => Some(ControlItemCode::None),
            0x0001 => Some(ControlItemCode::TargetName),
            0x0002 => Some(ControlItemCode::SerialNumber),
            0x0003 => Some(ControlItemCode::InterfaceVersion),
            0x0004 => Some(ControlItemCode::FirmwareVersion),
            0x0005 => Some(ControlItemCode::ReceiverStatus),
            0x0009 => Some(ControlItemCode::ProductId),
            0x0018 => Some(ControlItemCode::ReceiverState),
            0x0020 => Some(ControlItemCode::ReceiverFrequency),
            0x0038 => Some(ControlItemCode::RfGain),
            0x0044 => Some(ControlItemCode::RfFilter),
            0x008A => Some(ControlItemCode::AdModes),
            0x00B8 => Some(ControlItemCode::IqOutputSampleRate),
            0x00C4 => Some(ControlItemCode::DataOutputPacketSize),
            _ => None,
        }
    }

    #[inline]
    pub fn code(self) -> u16 {
        self as u16
    }
}

/// Decoded message header.
///
/// Only constructed through [`Header::new`] or [`Header::decode`], so the
/// length is always one the wire can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    message_type: MessageType,
    length: usize,
}

impl Header {
    /// Create a header after checking `length` against the protocol bounds.
    ///
    /// A data item of exactly [`MAX_DATA_ITEM_MESSAGE_LENGTH`] bytes is
    /// accepted and later encoded with the sentinel. Everything else must
    /// fall within `HEADER_LENGTH..=MAX_MESSAGE_LENGTH`.
    pub fn new(message_type: MessageType, length: usize) -> Result<Self> {
        let sentinel_length =
            message_type.is_data_item() && length == MAX_DATA_ITEM_MESSAGE_LENGTH;

        if !sentinel_length && !(HEADER_LENGTH..=MAX_MESSAGE_LENGTH).contains(&length) {
            return Err(NetSdrError::Framing(format!(
                "Message length {} outside {}..={} for {:?}",
                length, HEADER_LENGTH, MAX_MESSAGE_LENGTH, message_type
            )));
        }

        Ok(Self {
            message_type,
            length,
        })
    }

    /// Create a header from a body length (everything after the header).
    pub fn for_body(message_type: MessageType, body_length: usize) -> Result<Self> {
        Self::new(message_type, HEADER_LENGTH + body_length)
    }

    #[inline]
    pub fn message_type(&self) -> MessageType {
        self.message_type
    }

    /// Total message length in bytes, header included, sentinel resolved.
    #[inline]
    pub fn length(&self) -> usize {
        self.length
    }

    /// Raw 16-bit header value, sentinel applied.
    pub fn to_u16(&self) -> u16 {
        let length_field = if self.message_type.is_data_item()
            && self.length == MAX_DATA_ITEM_MESSAGE_LENGTH
        {
            LENGTH_SENTINEL
        } else {
            self.length as u16 & LENGTH_MASK
        };
        (u16::from(self.message_type.bits()) << TYPE_SHIFT) | length_field
    }

    /// Encode header to bytes (little-endian).
    ///
    /// # Example
    ///
    /// ```
    /// use netsdr_client::protocol::{Header, MessageType};
    ///
    /// let header = Header::new(MessageType::SetControlItem, 5).unwrap();
    /// assert_eq!(header.encode(), [0x05, 0x00]);
    /// ```
    pub fn encode(&self) -> [u8; HEADER_LENGTH] {
        self.to_u16().to_le_bytes()
    }

    /// Decode a header from the first two bytes of `buf`.
    ///
    /// Resolves the sentinel for data items and rejects it for every other
    /// type. Only the header is validated, not the bytes that follow.
    pub fn decode(buf: &[u8]) -> Result<Self> {
        if buf.len() < HEADER_LENGTH {
            return Err(NetSdrError::Framing(format!(
                "Need {} header bytes, got {}",
                HEADER_LENGTH,
                buf.len()
            )));
        }

        let raw = u16::from_le_bytes([buf[0], buf[1]]);
        let message_type = MessageType::from_bits((raw >> TYPE_SHIFT) as u8);
        let length_field = raw & LENGTH_MASK;

        let length = if length_field == LENGTH_SENTINEL {
            if !message_type.is_data_item() {
                return Err(NetSdrError::Framing(format!(
                    "Zero length is reserved for data items, got {:?}",
                    message_type
                )));
            }
            MAX_DATA_ITEM_MESSAGE_LENGTH
        } else {
            length_field as usize
        };

        if length < HEADER_LENGTH {
            return Err(NetSdrError::Framing(format!(
                "Declared length {} shorter than header",
                length
            )));
        }

        Ok(Self {
            message_type,
            length,
        })
    }

    /// Length of everything after the header.
    #[inline]
    pub fn body_length(&self) -> usize {
        self.length - HEADER_LENGTH
    }
}
