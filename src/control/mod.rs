//! Control plane module - device requests and the connect handshake.
//!
//! Every control exchange is a [`ControlRequest`] encoded as a
//! control-bearing frame and sent over the control link. The builders here
//! produce the requests a receiver needs to initialize, tune, and start or
//! stop IQ capture.
//!
//! # Workflow
//!
//! 1. Client connects the control link
//! 2. Client sends the handshake requests one by one, awaiting each reply
//! 3. Client may tune and start IQ capture
//! 4. Samples arrive on the streaming link
//!
//! # Example
//!
//! ```
//! use netsdr_client::control::{default_handshake, set_receiver_frequency};
//!
//! let handshake = default_handshake();
//! assert_eq!(handshake.len(), 3);
//!
//! let tune = set_receiver_frequency(14_200_000, 0).unwrap();
//! assert_eq!(tune.encode().unwrap().len(), 10);
//! ```

mod request;

pub use request::{
    default_handshake, set_ad_modes, set_iq_sample_rate, set_receiver_frequency, set_rf_filter,
    start_iq_capture, stop_iq_capture, ControlRequest, DEFAULT_AD_MODE, DEFAULT_IQ_SAMPLE_RATE,
    MAX_FREQUENCY_HZ, RF_FILTER_AUTOMATIC,
};
