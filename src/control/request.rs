//! Control request builders.
//!
//! Parameter layouts follow the receiver's control item definitions. All
//! multi-byte values are little-endian.
//!
//! # Example
//!
//! ```
//! use netsdr_client::control::start_iq_capture;
//! use netsdr_client::protocol::ControlItemCode;
//!
//! let request = start_iq_capture();
//! assert_eq!(request.item_code, ControlItemCode::ReceiverState);
//! assert_eq!(request.params, vec![0x80, 0x02, 0x01, 0x01]);
//! ```

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::{NetSdrError, Result};
use crate::protocol::{
    ControlItemCode, Frame, Header, MessageType, HEADER_LENGTH, ITEM_CODE_LENGTH,
};

/// IQ output sample rate sent during the default handshake.
pub const DEFAULT_IQ_SAMPLE_RATE: u32 = 100_000;

/// RF filter mode selecting the automatic filter.
pub const RF_FILTER_AUTOMATIC: u8 = 0x00;

/// A/D mode sent during the default handshake (dither + gain on).
pub const DEFAULT_AD_MODE: u8 = 0x03;

/// Frequencies are carried in a 40-bit field.
pub const MAX_FREQUENCY_HZ: u64 = (1 << 40) - 1;

const CHANNEL_1: u8 = 0x00;

const IQ_DATA_MODE_COMPLEX: u8 = 0x80;
const RECEIVER_RUN: u8 = 0x02;
const RECEIVER_IDLE: u8 = 0x01;
const CAPTURE_16BIT_CONTIGUOUS: u8 = 0x01;
const CAPTURE_SAMPLE_COUNT: u8 = 0x01;

/// One control exchange, ready to encode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlRequest {
    pub message_type: MessageType,
    pub item_code: ControlItemCode,
    #[serde(default)]
    pub params: Vec<u8>,
}

impl ControlRequest {
    /// Create a SetControlItem request.
    pub fn set(item_code: ControlItemCode, params: Vec<u8>) -> Self {
        Self {
            message_type: MessageType::SetControlItem,
            item_code,
            params,
        }
    }

    /// Create a CurrentControlItem request (query the current value).
    pub fn query(item_code: ControlItemCode) -> Self {
        Self {
            message_type: MessageType::CurrentControlItem,
            item_code,
            params: Vec::new(),
        }
    }

    /// Build the frame for this request.
    pub fn to_frame(&self) -> Frame {
        Frame::control(
            self.message_type,
            self.item_code,
            Bytes::copy_from_slice(&self.params),
        )
    }

    /// Encode to wire bytes.
    pub fn encode(&self) -> Result<Bytes> {
        self.to_frame().encode()
    }

    /// Predicate for messages that can answer this request.
    ///
    /// Accepts a header-only NAK and any control message carrying this
    /// request's item code. Data items and control messages for another
    /// item are rejected. Messages too malformed to classify are accepted
    /// and left for the caller to decode.
    pub fn reply_filter(&self) -> impl Fn(&[u8]) -> bool + Send + 'static {
        let item_code = self.item_code.code();
        move |reply: &[u8]| {
            let Ok(header) = Header::decode(reply) else {
                return true;
            };
            if header.message_type().is_data_item() {
                return false;
            }
            match reply.get(HEADER_LENGTH..HEADER_LENGTH + ITEM_CODE_LENGTH) {
                Some(code) => u16::from_le_bytes([code[0], code[1]]) == item_code,
                None => true,
            }
        }
    }
}

/// Set the IQ output sample rate in Hz.
pub fn set_iq_sample_rate(rate: u32) -> ControlRequest {
    let mut params = vec![CHANNEL_1];
    params.extend_from_slice(&rate.to_le_bytes());
    ControlRequest::set(ControlItemCode::IqOutputSampleRate, params)
}

/// Select the RF filter.
pub fn set_rf_filter(mode: u8) -> ControlRequest {
    ControlRequest::set(ControlItemCode::RfFilter, vec![CHANNEL_1, mode])
}

/// Set the A/D converter modes.
pub fn set_ad_modes(mode: u8) -> ControlRequest {
    ControlRequest::set(ControlItemCode::AdModes, vec![CHANNEL_1, mode])
}

/// Put the receiver in run mode with contiguous 16-bit complex IQ output.
pub fn start_iq_capture() -> ControlRequest {
    ControlRequest::set(
        ControlItemCode::ReceiverState,
        vec![
            IQ_DATA_MODE_COMPLEX,
            RECEIVER_RUN,
            CAPTURE_16BIT_CONTIGUOUS,
            CAPTURE_SAMPLE_COUNT,
        ],
    )
}

/// Put the receiver back in idle mode.
pub fn stop_iq_capture() -> ControlRequest {
    ControlRequest::set(
        ControlItemCode::ReceiverState,
        vec![0x00, RECEIVER_IDLE, 0x00, 0x00],
    )
}

/// Tune `channel` to `hz`.
///
/// # Errors
///
/// Returns [`NetSdrError::InvalidParameter`] if `hz` doesn't fit 40 bits.
pub fn set_receiver_frequency(hz: u64, channel: u8) -> Result<ControlRequest> {
    if hz > MAX_FREQUENCY_HZ {
        return Err(NetSdrError::InvalidParameter(format!(
            "Frequency {} Hz exceeds 40-bit maximum {}",
            hz, MAX_FREQUENCY_HZ
        )));
    }

    let mut params = vec![channel];
    params.extend_from_slice(&hz.to_le_bytes()[..5]);
    Ok(ControlRequest::set(ControlItemCode::ReceiverFrequency, params))
}

/// The three initialization exchanges sent on connect.
pub fn default_handshake() -> Vec<ControlRequest> {
    vec![
        set_iq_sample_rate(DEFAULT_IQ_SAMPLE_RATE),
        set_rf_filter(RF_FILTER_AUTOMATIC),
        set_ad_modes(DEFAULT_AD_MODE),
    ]
}
