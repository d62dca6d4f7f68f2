//! pathgauge measurement client.
//!
//! - **latency**: sequential ping probes with jitter and loss
//! - **downlink**: time-boxed streamed downloads with a two-stage size ramp
//! - **uplink**: synthetic uploads over a descending chunk-size ladder
//! - **session**: runs the three phases and the attribution lookup
//! - **transport**: the server API as a trait, plus the reqwest client

pub mod downlink;
pub mod error;
pub mod format;
pub mod latency;
pub mod network;
pub mod session;
pub mod transport;
pub mod uplink;

#[cfg(test)]
mod mock;

use pathgauge_common::models::Sample;

/// Live samples flow to the presentation layer over this channel so
/// rendering never holds up a measurement.
pub type SampleSender = tokio::sync::mpsc::UnboundedSender<Sample>;
