//! Great-circle distance and nearest reference server selection.

use serde::Serialize;

use crate::models::ServerInfo;

/// Mean Earth radius used by the haversine formula.
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// A reference test server. Coordinates are fixed at compile time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ServerEntry {
    pub name: &'static str,
    pub host: &'static str,
    pub location: &'static str,
    pub lat: f64,
    pub lon: f64,
}

/// The reference server registry. The first entry is the fallback when the
/// client cannot be located.
pub static REGISTRY: &[ServerEntry] = &[
    ServerEntry {
        name: "West Africa - Lagos",
        host: "lagos.speedtest.local",
        location: "Lagos, NG",
        lat: 6.5244,
        lon: 3.3792,
    },
    ServerEntry {
        name: "West Africa - Accra",
        host: "accra.speedtest.local",
        location: "Accra, GH",
        lat: 5.6037,
        lon: -0.1870,
    },
    ServerEntry {
        name: "Europe - London",
        host: "london.speedtest.local",
        location: "London, UK",
        lat: 51.5074,
        lon: -0.1278,
    },
    ServerEntry {
        name: "North America - New York",
        host: "newyork.speedtest.local",
        location: "New York, US",
        lat: 40.7128,
        lon: -74.0060,
    },
    ServerEntry {
        name: "Asia - Singapore",
        host: "singapore.speedtest.local",
        location: "Singapore, SG",
        lat: 1.3521,
        lon: 103.8198,
    },
];

/// Haversine distance in kilometres between two lat/lon pairs (degrees).
pub fn distance_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let d_lat = (lat2 - lat1).to_radians();
    let d_lon = (lon2 - lon1).to_radians();
    let a = (d_lat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (d_lon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
    EARTH_RADIUS_KM * c
}

/// The registry entry chosen for a client.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Nearest {
    pub server: &'static ServerEntry,
    /// `None` when the client position was unknown.
    pub distance_km: Option<f64>,
}

impl Nearest {
    pub fn to_info(&self) -> ServerInfo {
        ServerInfo {
            name: self.server.name.to_string(),
            host: self.server.host.to_string(),
            location: self.server.location.to_string(),
            distance_km: self.distance_km,
        }
    }
}

/// Pick the closest server in [`REGISTRY`].
pub fn select_nearest(lat: f64, lon: f64) -> Nearest {
    select_nearest_in(REGISTRY, lat, lon)
}

/// Pick the closest entry of `registry`; ties go to the earlier entry.
///
/// Non-finite coordinates select the first entry with no distance.
/// `registry` must not be empty.
pub fn select_nearest_in(registry: &'static [ServerEntry], lat: f64, lon: f64) -> Nearest {
    let fallback = Nearest {
        server: &registry[0],
        distance_km: None,
    };
    if !lat.is_finite() || !lon.is_finite() {
        return fallback;
    }

    let mut best: Option<Nearest> = None;
    for server in registry {
        let d = distance_km(lat, lon, server.lat, server.lon);
        if best.is_none_or(|b| b.distance_km.is_some_and(|bd| d < bd)) {
            best = Some(Nearest {
                server,
                distance_km: Some(d),
            });
        }
    }
    best.unwrap_or(fallback)
}
