//! Network attribution records and the merge step.
//!
//! Attribution is built from two external lookups: an IP geolocation
//! provider (ipwho.is shaped) and an ASN registry (bgpview.io shaped). Each
//! stage yields a [`Lookup`]; [`merge`] combines them without any I/O and
//! never fails, degrading to [`UNAVAILABLE`] labels instead.

use serde::Deserialize;

use crate::geo::{self, Nearest};
use crate::ip;
use crate::models::{NetworkDebug, NetworkInfo};

/// Placeholder for any field that could not be determined.
pub const UNAVAILABLE: &str = "Unavailable";

/// Result of one lookup stage.
#[derive(Debug, Clone, PartialEq)]
pub enum Lookup<T> {
    Found(T),
    /// Timed out, failed in transport, or returned an unusable body.
    Unavailable,
}

impl<T> Lookup<T> {
    pub fn found(&self) -> Option<&T> {
        match self {
            Lookup::Found(v) => Some(v),
            Lookup::Unavailable => None,
        }
    }

    pub fn is_available(&self) -> bool {
        matches!(self, Lookup::Found(_))
    }
}

impl<T> From<Option<T>> for Lookup<T> {
    fn from(value: Option<T>) -> Self {
        value.map_or(Lookup::Unavailable, Lookup::Found)
    }
}

// ── Stage 1: geolocation ────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct GeoRecord {
    /// `false` when the provider rejected the query.
    pub success: Option<bool>,
    pub ip: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub org: Option<String>,
    pub connection: Option<GeoConnection>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct GeoConnection {
    pub asn: Option<u64>,
    pub org: Option<String>,
    pub isp: Option<String>,
}

impl GeoRecord {
    /// Parse a provider body, rejecting explicit failures.
    pub fn from_body(body: &[u8]) -> Option<Self> {
        let record: GeoRecord = serde_json::from_slice(body).ok()?;
        (record.success != Some(false)).then_some(record)
    }
}

// ── Stage 2: ASN registry ───────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct AsnRecord {
    pub status: Option<String>,
    pub data: Option<AsnData>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct AsnData {
    pub prefixes: Vec<AsnPrefix>,
    pub asn: Option<AsnInfo>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct AsnPrefix {
    pub asn: Option<AsnInfo>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct AsnInfo {
    pub asn: Option<u64>,
    pub name: Option<String>,
}

impl AsnRecord {
    /// Parse a registry body; only `status: "ok"` counts.
    pub fn from_body(body: &[u8]) -> Option<Self> {
        let record: AsnRecord = serde_json::from_slice(body).ok()?;
        (record.status.as_deref() == Some("ok")).then_some(record)
    }

    fn first_prefix_asn(&self) -> Option<&AsnInfo> {
        self.data.as_ref()?.prefixes.first()?.asn.as_ref()
    }

    fn direct_asn(&self) -> Option<&AsnInfo> {
        self.data.as_ref()?.asn.as_ref()
    }

    pub fn number(&self) -> Option<u64> {
        positive(self.first_prefix_asn().and_then(|a| a.asn))
            .or_else(|| positive(self.direct_asn().and_then(|a| a.asn)))
    }

    pub fn name(&self) -> Option<&str> {
        text(self.first_prefix_asn().and_then(|a| a.name.as_deref()))
            .or_else(|| text(self.direct_asn().and_then(|a| a.name.as_deref())))
    }
}

// ── Merge ───────────────────────────────────────────────────────────

/// Best-effort attribution of a client.
#[derive(Debug, Clone, PartialEq)]
pub struct Attribution {
    pub ip: String,
    pub isp: String,
    pub network: String,
    pub nearest: Nearest,
}

impl Attribution {
    pub fn into_network_info(self, debug: Option<NetworkDebug>) -> NetworkInfo {
        NetworkInfo {
            ip: self.ip,
            isp: self.isp,
            network: self.network,
            server: self.nearest.to_info(),
            debug,
        }
    }
}

/// Key for the ASN stage: the IP reported by stage 1 when it is public,
/// otherwise the IP that was looked up.
pub fn asn_lookup_key(geo: &Lookup<GeoRecord>, lookup_ip: &str) -> String {
    geo.found()
        .and_then(|g| text(g.ip.as_deref()))
        .filter(|reported| !ip::is_private(reported))
        .unwrap_or(lookup_ip)
        .to_string()
}

/// Combine both stages with the client IP into one attribution record.
pub fn merge(client_ip: &str, geo: &Lookup<GeoRecord>, asn: &Lookup<AsnRecord>) -> Attribution {
    let g = geo.found();
    let conn = g.and_then(|g| g.connection.as_ref());
    let bgp = asn.found();

    let ip = g
        .and_then(|g| text(g.ip.as_deref()))
        .or_else(|| text(Some(client_ip)))
        .unwrap_or(UNAVAILABLE)
        .to_string();

    let isp = text(conn.and_then(|c| c.isp.as_deref()))
        .or_else(|| text(conn.and_then(|c| c.org.as_deref())))
        .or_else(|| text(g.and_then(|g| g.org.as_deref())))
        .unwrap_or(UNAVAILABLE)
        .to_string();

    let number = positive(conn.and_then(|c| c.asn)).or_else(|| bgp.and_then(AsnRecord::number));
    let name = text(conn.and_then(|c| c.org.as_deref()))
        .or_else(|| text(conn.and_then(|c| c.isp.as_deref())))
        .or_else(|| bgp.and_then(AsnRecord::name));
    let network = match (number, name) {
        (Some(n), Some(name)) => format!("AS{n} {name}"),
        (Some(n), None) => format!("AS{n}"),
        (None, _) => UNAVAILABLE.to_string(),
    };

    let nearest = match g.and_then(|g| g.latitude.zip(g.longitude)) {
        Some((lat, lon)) => geo::select_nearest(lat, lon),
        None => geo::select_nearest(f64::NAN, f64::NAN),
    };

    Attribution {
        ip,
        isp,
        network,
        nearest,
    }
}

fn text(value: Option<&str>) -> Option<&str> {
    value.filter(|s| !s.trim().is_empty())
}

fn positive(value: Option<u64>) -> Option<u64> {
    value.filter(|&n| n > 0)
}
