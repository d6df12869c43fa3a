//! Client configuration.
//!
//! Every field has a default, so a JSON file only needs the values it
//! changes:
//!
//! ```
//! use netsdr_client::ClientConfig;
//!
//! let config = ClientConfig::from_json_str(r#"{ "host": "192.168.1.50" }"#).unwrap();
//! assert_eq!(config.host, "192.168.1.50");
//! assert_eq!(config.control_port, 50000);
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::control::{default_handshake, ControlRequest};
use crate::error::Result;

/// Default device address.
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Default TCP port for the control channel.
pub const DEFAULT_CONTROL_PORT: u16 = 50000;

/// Default UDP port for IQ data.
pub const DEFAULT_STREAMING_PORT: u16 = 60000;

/// Default wait for a control reply.
pub const DEFAULT_REPLY_TIMEOUT: Duration = Duration::from_secs(5);

/// Default sample width in bits.
pub const DEFAULT_SAMPLE_WIDTH_BITS: u16 = 16;

/// Default capacity of the IQ packet queue.
pub const DEFAULT_IQ_QUEUE_CAPACITY: usize = 1024;

/// Settings for a [`NetSdrClient`](crate::NetSdrClient).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub host: String,
    pub control_port: u16,
    pub streaming_port: u16,
    /// `None` waits until a reply arrives or the exchange is cancelled.
    pub reply_timeout_ms: Option<u64>,
    pub sample_width_bits: u16,
    pub iq_queue_capacity: usize,
    /// Requests sent, in order, right after the control link connects.
    pub handshake: Vec<ControlRequest>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            control_port: DEFAULT_CONTROL_PORT,
            streaming_port: DEFAULT_STREAMING_PORT,
            reply_timeout_ms: Some(DEFAULT_REPLY_TIMEOUT.as_millis() as u64),
            sample_width_bits: DEFAULT_SAMPLE_WIDTH_BITS,
            iq_queue_capacity: DEFAULT_IQ_QUEUE_CAPACITY,
            handshake: default_handshake(),
        }
    }
}

impl ClientConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    pub fn reply_timeout(&self) -> Option<Duration> {
        self.reply_timeout_ms.map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::ControlItemCode;

    #[test]
    fn test_defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.streaming_port, 60000);
        assert_eq!(config.reply_timeout(), Some(Duration::from_secs(5)));
        assert_eq!(config.handshake.len(), 3);
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = ClientConfig::from_json_str(r#"{"control_port": 50001, "sample_width_bits": 24}"#)
            .unwrap();
        assert_eq!(config.control_port, 50001);
        assert_eq!(config.sample_width_bits, 24);
        assert_eq!(config.host, DEFAULT_HOST);
        assert_eq!(config.handshake, default_handshake());
    }

    #[test]
    fn test_null_timeout_waits_forever() {
        let config = ClientConfig::from_json_str(r#"{"reply_timeout_ms": null}"#).unwrap();
        assert_eq!(config.reply_timeout(), None);
    }

    #[test]
    fn test_custom_handshake() {
        let json = r#"{
            "handshake": [
                {"message_type": "CurrentControlItem", "item_code": "TargetName"},
                {"message_type": "SetControlItem", "item_code": "RfGain", "params": [0, 236]}
            ]
        }"#;
        let config = ClientConfig::from_json_str(json).unwrap();
        assert_eq!(config.handshake.len(), 2);
        assert_eq!(config.handshake[0].item_code, ControlItemCode::TargetName);
        assert!(config.handshake[0].params.is_empty());
        assert_eq!(config.handshake[1].params, vec![0x00, 0xEC]);
    }

    #[test]
    fn test_malformed_json_rejected() {
        assert!(matches!(
            ClientConfig::from_json_str("{ not json"),
            Err(crate::NetSdrError::Json(_))
        ));
    }

    #[test]
    fn test_json_round_trip() {
        let config = ClientConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        assert_eq!(ClientConfig::from_json_str(&json).unwrap(), config);
    }
}
