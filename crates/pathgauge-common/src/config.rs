//! TOML configuration.
//!
//! Every field is optional on input; [`PathgaugeConfigInput::resolve`] fills
//! in defaults and converts millisecond counts to `Duration`s.

use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

pub const CONFIG_VERSION: u32 = 1;

const MIB: u64 = 1024 * 1024;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid config TOML: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("unsupported config version {0}")]
    Version(u32),
    #[error("invalid value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

// ── Input (as written in the file) ──────────────────────────────────

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PathgaugeConfigInput {
    pub version: u32,
    pub server: ServerConfigInput,
    pub attribution: AttributionConfigInput,
    pub measurement: MeasurementConfigInput,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ServerConfigInput {
    pub listen_addr: Option<String>,
    pub static_dir: Option<String>,
    pub upload_limit_bytes: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AttributionConfigInput {
    pub geo_url: Option<String>,
    pub asn_url: Option<String>,
    pub timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MeasurementConfigInput {
    pub ping_samples: Option<u32>,
    pub ping_interval_ms: Option<u64>,
    pub ping_timeout_ms: Option<u64>,
    pub download_duration_ms: Option<u64>,
    pub download_small_bytes: Option<u64>,
    pub download_large_bytes: Option<u64>,
    pub sample_interval_ms: Option<u64>,
    pub download_retry_pause_ms: Option<u64>,
    pub upload_duration_ms: Option<u64>,
    pub upload_initial_chunk_mb: Option<f64>,
    pub upload_attempt_ceiling_ms: Option<u64>,
}

// ── Resolved ────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    pub listen_addr: String,
    pub static_dir: Option<String>,
    /// `None` accepts uploads of any size.
    pub upload_limit_bytes: Option<u64>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:3000".into(),
            static_dir: None,
            upload_limit_bytes: Some(32 * MIB),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AttributionConfig {
    pub geo_url: String,
    pub asn_url: String,
    /// Ceiling applied to each lookup stage separately.
    pub timeout: Duration,
}

impl Default for AttributionConfig {
    fn default() -> Self {
        Self {
            geo_url: "https://ipwho.is".into(),
            asn_url: "https://api.bgpview.io".into(),
            timeout: Duration::from_millis(2500),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MeasurementConfig {
    pub ping_samples: u32,
    pub ping_interval: Duration,
    pub ping_timeout: Duration,
    pub download_duration: Duration,
    pub download_small_bytes: u64,
    pub download_large_bytes: u64,
    pub sample_interval: Duration,
    pub download_retry_pause: Duration,
    pub upload_duration: Duration,
    pub upload_initial_chunk_mb: f64,
    pub upload_attempt_ceiling: Duration,
}

impl Default for MeasurementConfig {
    fn default() -> Self {
        Self {
            ping_samples: 10,
            ping_interval: Duration::from_millis(150),
            ping_timeout: Duration::from_secs(2),
            download_duration: Duration::from_secs(10),
            download_small_bytes: 6 * MIB,
            download_large_bytes: 18 * MIB,
            sample_interval: Duration::from_millis(200),
            download_retry_pause: Duration::from_millis(100),
            upload_duration: Duration::from_secs(10),
            upload_initial_chunk_mb: 2.0,
            upload_attempt_ceiling: Duration::from_secs(15),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PathgaugeConfig {
    pub server: ServerConfig,
    pub attribution: AttributionConfig,
    pub measurement: MeasurementConfig,
}

impl PathgaugeConfigInput {
    pub fn resolve(self) -> Result<PathgaugeConfig, ConfigError> {
        let version = if self.version == 0 {
            CONFIG_VERSION
        } else {
            self.version
        };
        if version != CONFIG_VERSION {
            return Err(ConfigError::Version(version));
        }

        let server_defaults = ServerConfig::default();
        let server = ServerConfig {
            listen_addr: non_empty(self.server.listen_addr)
                .unwrap_or(server_defaults.listen_addr),
            static_dir: non_empty(self.server.static_dir),
            upload_limit_bytes: match self.server.upload_limit_bytes {
                Some(0) => None,
                Some(n) => Some(n),
                None => server_defaults.upload_limit_bytes,
            },
        };

        let attr_defaults = AttributionConfig::default();
        let attribution = AttributionConfig {
            geo_url: non_empty(self.attribution.geo_url)
                .map(|u| u.trim_end_matches('/').to_string())
                .unwrap_or(attr_defaults.geo_url),
            asn_url: non_empty(self.attribution.asn_url)
                .map(|u| u.trim_end_matches('/').to_string())
                .unwrap_or(attr_defaults.asn_url),
            timeout: ms_or(self.attribution.timeout_ms, attr_defaults.timeout),
        };

        let m = self.measurement;
        let d = MeasurementConfig::default();
        let upload_initial_chunk_mb = m.upload_initial_chunk_mb.unwrap_or(d.upload_initial_chunk_mb);
        if !upload_initial_chunk_mb.is_finite() || upload_initial_chunk_mb <= 0.0 {
            return Err(ConfigError::Invalid {
                field: "measurement.upload_initial_chunk_mb",
                reason: format!("must be a positive number, got {upload_initial_chunk_mb}"),
            });
        }
        let measurement = MeasurementConfig {
            ping_samples: m.ping_samples.unwrap_or(d.ping_samples),
            ping_interval: ms_or(m.ping_interval_ms, d.ping_interval),
            ping_timeout: ms_or(m.ping_timeout_ms, d.ping_timeout),
            download_duration: ms_or(m.download_duration_ms, d.download_duration),
            download_small_bytes: m.download_small_bytes.unwrap_or(d.download_small_bytes),
            download_large_bytes: m.download_large_bytes.unwrap_or(d.download_large_bytes),
            sample_interval: ms_or(m.sample_interval_ms, d.sample_interval),
            download_retry_pause: ms_or(m.download_retry_pause_ms, d.download_retry_pause),
            upload_duration: ms_or(m.upload_duration_ms, d.upload_duration),
            upload_initial_chunk_mb,
            upload_attempt_ceiling: ms_or(m.upload_attempt_ceiling_ms, d.upload_attempt_ceiling)
                .max(Duration::from_millis(500)),
        };

        Ok(PathgaugeConfig {
            server,
            attribution,
            measurement,
        })
    }
}

impl PathgaugeConfig {
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        if input.trim().is_empty() {
            return Ok(PathgaugeConfig::default());
        }
        let parsed: PathgaugeConfigInput = toml::from_str(input)?;
        parsed.resolve()
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.and_then(|v| {
        let trimmed = v.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

fn ms_or(value: Option<u64>, default: Duration) -> Duration {
    value.map(Duration::from_millis).unwrap_or(default)
}
