//! Result and wire models.
//!
//! Measurement results are produced by the client measurers; the wire types
//! mirror the JSON bodies served under `/api`.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Floor applied to elapsed time before dividing, so a run that finished
/// "instantly" never yields an infinite rate.
const MIN_ELAPSED_S: f64 = 0.001;

/// Convert a byte count over an elapsed time into megabits per second.
pub fn megabits_per_second(bytes: u64, elapsed: Duration) -> f64 {
    let seconds = elapsed.as_secs_f64().max(MIN_ELAPSED_S);
    (bytes as f64 * 8.0) / 1e6 / seconds
}

// ── Measurement ─────────────────────────────────────────────────────

/// Which measurement phase produced a sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Latency,
    Download,
    Upload,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Phase::Latency => write!(f, "latency"),
            Phase::Download => write!(f, "download"),
            Phase::Upload => write!(f, "upload"),
        }
    }
}

/// One live data point: milliseconds for latency, Mbps for throughput.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub phase: Phase,
    /// Milliseconds since the start of the phase.
    pub offset_ms: f64,
    pub value: f64,
}

impl Sample {
    pub fn new(phase: Phase, offset: Duration, value: f64) -> Self {
        Self {
            phase,
            offset_ms: offset.as_secs_f64() * 1000.0,
            value,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LatencyResult {
    pub average_ms: f64,
    pub jitter_ms: f64,
    /// Always within `0..=100`.
    pub loss_percent: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThroughputResult {
    pub mbps: f64,
    pub total_bytes: u64,
    pub duration_s: f64,
}

impl ThroughputResult {
    pub fn from_transfer(total_bytes: u64, elapsed: Duration) -> Self {
        Self {
            mbps: megabits_per_second(total_bytes, elapsed),
            total_bytes,
            duration_s: elapsed.as_secs_f64().max(MIN_ELAPSED_S),
        }
    }
}

/// Final record of one test session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionReport {
    pub latency: LatencyResult,
    pub download: ThroughputResult,
    pub upload: ThroughputResult,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network: Option<NetworkInfo>,
}

// ── Client IP resolution ────────────────────────────────────────────

/// A normalized address together with the source it was read from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressCandidate {
    pub source: String,
    pub ip: String,
}

// ── Wire types (`/api`) ─────────────────────────────────────────────

/// `GET /api/ping`
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PingResponse {
    /// Server wall-clock time in Unix milliseconds.
    pub t: i64,
}

/// `POST /api/upload`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadReceipt {
    pub bytes: u64,
    pub duration_ms: f64,
}

/// Nearest reference server as reported to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerInfo {
    pub name: String,
    pub host: String,
    pub location: String,
    /// `None` when the client could not be geolocated.
    pub distance_km: Option<f64>,
}

/// `GET /api/network-info`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkInfo {
    pub ip: String,
    pub isp: String,
    pub network: String,
    pub server: ServerInfo,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub debug: Option<NetworkDebug>,
}

/// Diagnostic block attached to `/api/network-info?debug=1`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkDebug {
    pub client_ip_source: Option<String>,
    pub client_ip_seen: Option<String>,
    pub override_ip: Option<String>,
    pub override_used: bool,
    pub lookup_ip: Option<String>,
    pub resolved_ip: String,
    pub headers: DebugHeaders,
    pub candidates: Vec<AddressCandidate>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DebugHeaders {
    pub x_vercel_forwarded_for: Option<String>,
    pub x_real_ip: Option<String>,
    pub x_forwarded_for: Option<String>,
}
