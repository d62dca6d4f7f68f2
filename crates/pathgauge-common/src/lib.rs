//! Shared types for pathgauge.
//!
//! This crate contains:
//! - **Models**: samples, latency/throughput results, attribution records
//! - **IP resolution**: address normalization, private-range classification,
//!   priority-ordered client IP selection from proxy headers
//! - **Geo**: haversine distance and the fixed reference server registry
//! - **Attribution**: provider record shapes and the pure merge step
//! - **Config**: TOML configuration shared by the server and client binaries

pub mod attribution;
pub mod config;
pub mod geo;
pub mod ip;
pub mod models;
