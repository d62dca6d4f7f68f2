//! `GET /api/network-info[?clientIp=<override>][&debug=1]`
//!
//! Resolves the client address from proxy headers and the socket peer, runs
//! the attribution chain and reports ISP, ASN label and nearest server.
//! Always answers 200; lookups that fail show up as "Unavailable".

use std::net::SocketAddr;

use axum::extract::{ConnectInfo, Query, State};
use axum::http::HeaderMap;
use axum::Json;
use serde::Deserialize;

use pathgauge_common::ip::{self, Resolution, HEADER_SOURCES};
use pathgauge_common::models::{DebugHeaders, NetworkDebug, NetworkInfo};

use crate::attribution;
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkQuery {
    pub client_ip: Option<String>,
    pub debug: Option<String>,
}

/// All values of a header joined with `,`, as proxies chain them.
fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    let values: Vec<&str> = headers
        .get_all(name)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .collect();
    if values.is_empty() {
        None
    } else {
        Some(values.join(","))
    }
}

/// Resolve the client address for a request.
pub fn resolve_client(headers: &HeaderMap, peer: SocketAddr) -> Resolution {
    let values: Vec<(&str, String)> = HEADER_SOURCES
        .iter()
        .filter_map(|&(name, _)| header_value(headers, name).map(|v| (name, v)))
        .collect();
    let peer = peer.ip().to_string();

    ip::resolve_client_ip(
        |name| {
            values
                .iter()
                .find(|(n, _)| *n == name)
                .map(|(_, v)| v.as_str())
        },
        Some(peer.as_str()),
    )
}

pub async fn handler(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Query(query): Query<NetworkQuery>,
) -> Json<NetworkInfo> {
    let client = resolve_client(&headers, peer);

    let override_ip = ip::normalize(query.client_ip.as_deref().unwrap_or(""));
    let override_used = !override_ip.is_empty() && !ip::is_private(&override_ip);
    let lookup_ip = if override_used {
        override_ip.clone()
    } else if !ip::is_private(&client.ip) {
        client.ip.clone()
    } else {
        String::new()
    };

    tracing::debug!(
        client_ip = %client.ip,
        source = client.source.as_deref().unwrap_or("none"),
        lookup_ip = %lookup_ip,
        override_used,
        "network info requested"
    );

    let attribution = attribution::attribute(
        state.attribution(),
        state.lookup_timeout(),
        &client.ip,
        &lookup_ip,
    )
    .await;

    let debug = (query.debug.as_deref() == Some("1")).then(|| NetworkDebug {
        client_ip_source: if override_used {
            Some("query.clientIp".to_string())
        } else {
            client.source.clone()
        },
        client_ip_seen: non_empty(&client.ip),
        override_ip: non_empty(&override_ip),
        override_used,
        lookup_ip: non_empty(&lookup_ip),
        resolved_ip: attribution.ip.clone(),
        headers: DebugHeaders {
            x_vercel_forwarded_for: header_value(&headers, "x-vercel-forwarded-for"),
            x_real_ip: header_value(&headers, "x-real-ip"),
            x_forwarded_for: header_value(&headers, "x-forwarded-for"),
        },
        candidates: client.candidates.clone(),
    });

    Json(attribution.into_network_info(debug))
}

fn non_empty(value: &str) -> Option<String> {
    (!value.is_empty()).then(|| value.to_string())
}
