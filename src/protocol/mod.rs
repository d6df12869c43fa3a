//! Protocol module - wire format, framing, and frame types.
//!
//! This module implements the binary protocol shared by both channels:
//! - 2-byte header encoding/decoding, including the sentinel length
//! - Frame struct with control, data and header-only payloads
//! - Frame buffer for splitting the control byte stream into messages

mod frame;
mod frame_buffer;
mod wire_format;

pub use frame::{
    build_control_item_message, build_data_item_message, translate_message, Frame, Payload,
};
pub use frame_buffer::FrameBuffer;
pub use wire_format::{
    ControlItemCode, Header, MessageType, HEADER_LENGTH, ITEM_CODE_LENGTH, LENGTH_SENTINEL,
    MAX_DATA_ITEM_MESSAGE_LENGTH, MAX_MESSAGE_LENGTH, SEQUENCE_NUMBER_LENGTH,
};
