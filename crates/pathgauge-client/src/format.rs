//! Human-readable rates, sizes and durations.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpeedUnit {
    Bps,
    Kbps,
    Mbps,
    Gbps,
    BytesPerSec,
    KilobytesPerSec,
    MegabytesPerSec,
    GigabytesPerSec,
}

const BIT_UNITS: [SpeedUnit; 4] = [SpeedUnit::Gbps, SpeedUnit::Mbps, SpeedUnit::Kbps, SpeedUnit::Bps];
const BYTE_UNITS: [SpeedUnit; 4] = [
    SpeedUnit::GigabytesPerSec,
    SpeedUnit::MegabytesPerSec,
    SpeedUnit::KilobytesPerSec,
    SpeedUnit::BytesPerSec,
];

impl SpeedUnit {
    /// Bits per second in one of this unit.
    pub fn bits_per_second(self) -> f64 {
        match self {
            SpeedUnit::Bps => 1.0,
            SpeedUnit::Kbps => 1e3,
            SpeedUnit::Mbps => 1e6,
            SpeedUnit::Gbps => 1e9,
            SpeedUnit::BytesPerSec => 8.0,
            SpeedUnit::KilobytesPerSec => 8e3,
            SpeedUnit::MegabytesPerSec => 8e6,
            SpeedUnit::GigabytesPerSec => 8e9,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            SpeedUnit::Bps => "bps",
            SpeedUnit::Kbps => "Kbps",
            SpeedUnit::Mbps => "Mbps",
            SpeedUnit::Gbps => "Gbps",
            SpeedUnit::BytesPerSec => "B/s",
            SpeedUnit::KilobytesPerSec => "KB/s",
            SpeedUnit::MegabytesPerSec => "MB/s",
            SpeedUnit::GigabytesPerSec => "GB/s",
        }
    }
}

impl fmt::Display for SpeedUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A rate expressed in a chosen unit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Speed {
    pub value: f64,
    pub unit: SpeedUnit,
}

impl Speed {
    /// Largest unit in which `mbps` is at least 1, falling back to the
    /// smallest unit.
    pub fn adaptive(mbps: f64, prefer_bytes: bool) -> Self {
        let units = if prefer_bytes { BYTE_UNITS } else { BIT_UNITS };
        let bps = mbps * 1e6;
        let unit = units
            .into_iter()
            .find(|u| bps / u.bits_per_second() >= 1.0)
            .unwrap_or(units[units.len() - 1]);
        Self {
            value: bps / unit.bits_per_second(),
            unit,
        }
    }
}

impl fmt::Display for Speed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", speed_value(self.value), self.unit)
    }
}

/// Fewer decimals as the magnitude grows.
pub fn speed_value(value: f64) -> String {
    let abs = value.abs();
    if abs >= 100.0 {
        format!("{}", value.round())
    } else if abs >= 10.0 {
        format!("{value:.1}")
    } else if abs >= 1.0 {
        format!("{value:.2}")
    } else {
        format!("{value:.3}")
    }
}

pub fn data_size(bytes: u64) -> String {
    let mb = bytes as f64 / (1024.0 * 1024.0);
    if mb >= 1024.0 {
        format!("{:.1} GB", mb / 1024.0)
    } else {
        format!("{mb:.1} MB")
    }
}

pub fn elapsed(seconds: f64) -> String {
    if seconds < 60.0 {
        return format!("{seconds:.1}s");
    }
    let minutes = (seconds / 60.0).floor();
    format!("{}m {:.0}s", minutes, seconds - minutes * 60.0)
}
