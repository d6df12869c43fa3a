//! Frame buffer for accumulating partial reads.
//!
//! The control channel is a byte stream, so a single socket read may hold
//! half a message or several. The buffer splits the stream back into whole
//! messages using the length in each header:
//! - `WaitingForHeader`: need at least 2 bytes
//! - `WaitingForBody`: header parsed, need the rest of the message
//!
//! Complete messages are returned as raw `Bytes` (header included), ready
//! for [`Frame::decode`](super::Frame::decode).
//!
//! # Example
//!
//! ```
//! use netsdr_client::protocol::FrameBuffer;
//!
//! let mut buffer = FrameBuffer::new();
//!
//! // First read: one full message plus half of the next
//! let messages = buffer.push(&[0x04, 0x00, 0x18, 0x00, 0x05]).unwrap();
//! assert_eq!(messages.len(), 1);
//!
//! // Second read completes it
//! let messages = buffer.push(&[0x00, 0x05, 0x00, 0x00]).unwrap();
//! assert_eq!(&messages[0][..], &[0x05, 0x00, 0x05, 0x00, 0x00]);
//! ```

use bytes::{Bytes, BytesMut};

use super::wire_format::{Header, HEADER_LENGTH, MAX_DATA_ITEM_MESSAGE_LENGTH};
use crate::error::Result;

/// State machine for message parsing.
#[derive(Debug, Clone, Copy)]
enum State {
    /// Waiting for a complete header.
    WaitingForHeader,
    /// Header parsed, waiting until `length` bytes are buffered.
    WaitingForBody { length: usize },
}

/// Buffer for accumulating incoming bytes and extracting complete messages.
pub struct FrameBuffer {
    /// Accumulated bytes from socket reads.
    buffer: BytesMut,
    /// Current parsing state.
    state: State,
}

impl FrameBuffer {
    /// Create a new frame buffer sized for two maximum-length messages.
    pub fn new() -> Self {
        Self::with_capacity(2 * MAX_DATA_ITEM_MESSAGE_LENGTH)
    }

    /// Create a new frame buffer with custom initial capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(capacity),
            state: State::WaitingForHeader,
        }
    }

    /// Push data into the buffer and extract all complete messages.
    ///
    /// Partial data is kept for the next push.
    ///
    /// # Errors
    ///
    /// Returns a framing error if a header is invalid (for example a zero
    /// length on a control-bearing type). The stream can't be resynchronised
    /// after that, so callers should drop the connection.
    pub fn push(&mut self, data: &[u8]) -> Result<Vec<Bytes>> {
        self.buffer.extend_from_slice(data);

        let mut messages = Vec::new();
        while let Some(message) = self.try_extract_one()? {
            messages.push(message);
        }
        Ok(messages)
    }

    fn try_extract_one(&mut self) -> Result<Option<Bytes>> {
        loop {
            match self.state {
                State::WaitingForHeader => {
                    if self.buffer.len() < HEADER_LENGTH {
                        return Ok(None);
                    }
                    let header = Header::decode(&self.buffer[..HEADER_LENGTH])?;
                    self.state = State::WaitingForBody {
                        length: header.length(),
                    };
                }
                State::WaitingForBody { length } => {
                    if self.buffer.len() < length {
                        return Ok(None);
                    }
                    self.state = State::WaitingForHeader;
                    return Ok(Some(self.buffer.split_to(length).freeze()));
                }
            }
        }
    }

    /// Get the number of buffered bytes.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Check if the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Clear the buffer and reset state.
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.state = State::WaitingForHeader;
    }

    #[cfg(test)]
    fn state_name(&self) -> &'static str {
        match self.state {
            State::WaitingForHeader => "WaitingForHeader",
            State::WaitingForBody { .. } => "WaitingForBody",
        }
    }
}

impl Default for FrameBuffer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{
        build_control_item_message, build_data_item_message, ControlItemCode, MessageType,
    };

    fn control(params: &[u8]) -> Vec<u8> {
        build_control_item_message(
            MessageType::CurrentControlItem,
            ControlItemCode::ReceiverFrequency,
            params,
        )
        .unwrap()
    }

    #[test]
    fn test_single_complete_message() {
        let mut buffer = FrameBuffer::new();
        let bytes = control(b"hello");

        let messages = buffer.push(&bytes).unwrap();

        assert_eq!(messages.len(), 1);
        assert_eq!(&messages[0][..], &bytes[..]);
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_multiple_messages_in_one_push() {
        let mut buffer = FrameBuffer::new();
        let first = control(b"first");
        let second = control(b"second");
        let nak = [0x02, 0x00];

        let mut combined = first.clone();
        combined.extend_from_slice(&nak);
        combined.extend_from_slice(&second);

        let messages = buffer.push(&combined).unwrap();

        assert_eq!(messages.len(), 3);
        assert_eq!(&messages[0][..], &first[..]);
        assert_eq!(&messages[1][..], &nak[..]);
        assert_eq!(&messages[2][..], &second[..]);
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_fragmented_header() {
        let mut buffer = FrameBuffer::new();
        let bytes = control(b"test");

        assert!(buffer.push(&bytes[..1]).unwrap().is_empty());
        assert_eq!(buffer.state_name(), "WaitingForHeader");

        let messages = buffer.push(&bytes[1..]).unwrap();
        assert_eq!(messages.len(), 1);
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_fragmented_body() {
        let mut buffer = FrameBuffer::new();
        let bytes = control(b"a longer parameter block split across reads");

        assert!(buffer.push(&bytes[..6]).unwrap().is_empty());
        assert_eq!(buffer.state_name(), "WaitingForBody");

        let messages = buffer.push(&bytes[6..]).unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(&messages[0][..], &bytes[..]);
    }

    #[test]
    fn test_sentinel_length_data_item() {
        let mut buffer = FrameBuffer::new();
        let body = vec![0x5A; MAX_DATA_ITEM_MESSAGE_LENGTH - 4];
        let bytes = build_data_item_message(MessageType::DataItem0, 7, &body).unwrap();

        let (head, tail) = bytes.split_at(4096);
        assert!(buffer.push(head).unwrap().is_empty());
        let messages = buffer.push(tail).unwrap();

        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].len(), MAX_DATA_ITEM_MESSAGE_LENGTH);
    }

    #[test]
    fn test_invalid_header_is_error() {
        let mut buffer = FrameBuffer::new();
        // Zero length on a control-bearing type
        let result = buffer.push(&[0x00, 0x20, 0x01]);
        assert!(result.is_err());
    }

    #[test]
    fn test_byte_at_a_time() {
        let mut buffer = FrameBuffer::new();
        let bytes = control(b"hi");

        let mut all = Vec::new();
        for byte in &bytes {
            all.extend(buffer.push(&[*byte]).unwrap());
        }

        assert_eq!(all.len(), 1);
        assert_eq!(&all[0][..], &bytes[..]);
    }

    #[test]
    fn test_clear_resets_state() {
        let mut buffer = FrameBuffer::new();
        let bytes = control(b"test");

        buffer.push(&bytes[..3]).unwrap();
        assert_eq!(buffer.state_name(), "WaitingForBody");
        assert_eq!(buffer.len(), 3);

        buffer.clear();
        assert_eq!(buffer.state_name(), "WaitingForHeader");
        assert!(buffer.is_empty());
    }
}
