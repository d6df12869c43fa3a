//! # netsdr-client
//!
//! Async client for NetSDR-style software-defined radio receivers.
//!
//! ## Architecture
//!
//! - **Control lane** (TCP): binary request/reply exchanges, one in flight
//!   at a time, correlated by arrival order
//! - **Streaming lane** (UDP): IQ data items decoded into sample packets on
//!   a bounded queue, independent of control traffic
//!
//! Both lanes share the 2-byte little-endian header of [`protocol`].
//!
//! ## Example
//!
//! ```no_run
//! use netsdr_client::NetSdrClient;
//!
//! #[tokio::main]
//! async fn main() -> netsdr_client::Result<()> {
//!     let client = NetSdrClient::builder()
//!         .host("192.168.1.50")
//!         .sample_width(16)
//!         .build()?;
//!
//!     client.connect().await?;
//!     client.start_iq().await?;
//!
//!     let mut packets = client.take_iq_packets().unwrap();
//!     if let Some(packet) = packets.recv().await {
//!         println!("{} samples", packet.samples.len());
//!     }
//!
//!     client.close().await;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod control;
pub mod error;
pub mod protocol;
pub mod samples;
pub mod transport;

mod client;
mod correlator;
mod iq;
mod writer;

pub use client::{ClientBuilder, ClientState, NetSdrClient};
pub use config::ClientConfig;
pub use error::{NetSdrError, Result};
pub use iq::IqPacket;
