//! Error types for netsdr-client.

use std::time::Duration;

use thiserror::Error;

/// Main error type for all NetSDR client operations.
#[derive(Debug, Error)]
pub enum NetSdrError {
    /// I/O error during socket operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error while loading configuration.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Malformed header or a declared length that disagrees with the bytes.
    #[error("Framing error: {0}")]
    Framing(String),

    /// Control-bearing frame carrying an item code this client doesn't know.
    #[error("Unknown control item code: {0:#06x}")]
    UnknownItemCode(u16),

    /// Sample width outside {8, 16, 24, 32}.
    #[error("Unsupported sample width: {0} bits (expected 8, 16, 24 or 32)")]
    UnsupportedSampleWidth(u16),

    /// A request argument can't be represented on the wire.
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Connect or send failure reported by a link.
    #[error("Transport error: {0}")]
    Transport(String),

    /// Operation requires an established control connection.
    #[error("Not connected")]
    NotConnected,

    /// Control connection closed while an exchange was in flight.
    #[error("Connection closed")]
    ConnectionClosed,

    /// No reply arrived within the configured timeout.
    #[error("No reply within {0:?}")]
    CorrelationTimeout(Duration),

    /// Pending exchange was cancelled (e.g. by `disconnect`).
    #[error("Request cancelled")]
    Cancelled,
}

/// Result type alias using NetSdrError.
pub type Result<T> = std::result::Result<T, NetSdrError>;
