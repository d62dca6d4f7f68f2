//! API integration tests for pathgauge-server.
//!
//! These tests exercise the router through axum's tower service interface
//! (no TCP). External attribution providers are replaced by a stub that
//! records which IPs it was asked about.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use axum::body::Body;
use axum::extract::connect_info::MockConnectInfo;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use futures::future::BoxFuture;
use http_body_util::BodyExt;
use tower::ServiceExt;

use pathgauge_common::attribution::{AsnRecord, GeoRecord, Lookup};
use pathgauge_common::config::{AttributionConfig, ServerConfig};
use pathgauge_server::attribution::AttributionProvider;
use pathgauge_server::state::AppState;

#[derive(Default)]
struct StubProvider {
    geo_queries: Mutex<Vec<String>>,
    asn_queries: Mutex<Vec<String>>,
}

impl AttributionProvider for StubProvider {
    fn geolocate<'a>(&'a self, ip: &'a str) -> BoxFuture<'a, Lookup<GeoRecord>> {
        self.geo_queries.lock().unwrap().push(ip.to_string());
        let body = format!(
            r#"{{"ip":"{}","success":true,"latitude":51.5,"longitude":-0.12,
                "connection":{{"asn":2856,"org":"BT","isp":"British Telecommunications PLC"}}}}"#,
            if ip.is_empty() { "81.2.69.142" } else { ip }
        );
        Box::pin(async move { GeoRecord::from_body(body.as_bytes()).into() })
    }

    fn asn<'a>(&'a self, ip: &'a str) -> BoxFuture<'a, Lookup<AsnRecord>> {
        self.asn_queries.lock().unwrap().push(ip.to_string());
        Box::pin(async { Lookup::Unavailable })
    }
}

const PEER: ([u8; 4], u16) = ([192, 168, 1, 50], 40000);

fn test_app(upload_limit: Option<u64>) -> (Router, Arc<StubProvider>) {
    let provider = Arc::new(StubProvider::default());
    let server = ServerConfig {
        upload_limit_bytes: upload_limit,
        ..ServerConfig::default()
    };
    let state = AppState::new(&server, &AttributionConfig::default(), provider.clone());
    let app = pathgauge_server::app(state, None).layer(MockConnectInfo(SocketAddr::from(PEER)));
    (app, provider)
}

/// Helper: parse JSON response body.
async fn json_body(resp: axum::response::Response) -> serde_json::Value {
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap_or_else(|_| {
        let text = String::from_utf8_lossy(&bytes);
        panic!("not valid JSON: {text}");
    })
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn content_length(resp: &axum::response::Response) -> u64 {
    resp.headers()[header::CONTENT_LENGTH]
        .to_str()
        .unwrap()
        .parse()
        .unwrap()
}

// ── Ping ────────────────────────────────────────────────────────────

#[tokio::test]
async fn ping_returns_server_time_uncached() {
    let (app, _) = test_app(None);
    let resp = app.oneshot(get("/api/ping")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.headers()[header::CACHE_CONTROL], "no-store");

    let body = json_body(resp).await;
    assert!(body["t"].as_i64().unwrap() > 1_600_000_000_000);
}

// ── Download ────────────────────────────────────────────────────────

#[tokio::test]
async fn download_clamps_small_request_and_streams_exact_length() {
    let (app, _) = test_app(None);
    let resp = app.oneshot(get("/api/download?size=0")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.headers()[header::CACHE_CONTROL], "no-store");
    assert_eq!(
        resp.headers()[header::CONTENT_TYPE],
        "application/octet-stream"
    );
    assert_eq!(content_length(&resp), 1024);

    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(bytes.len(), 1024);
}

#[tokio::test]
async fn download_streams_multi_chunk_body() {
    let (app, _) = test_app(None);
    let size = 3 * 64 * 1024 + 17;
    let resp = app
        .oneshot(get(&format!("/api/download?size={size}")))
        .await
        .unwrap();
    assert_eq!(content_length(&resp), size);

    let mut body = resp.into_body();
    let mut total = 0u64;
    while let Some(frame) = body.frame().await {
        if let Ok(data) = frame.unwrap().into_data() {
            assert!(data.len() <= 64 * 1024);
            total += data.len() as u64;
        }
    }
    assert_eq!(total, size);
}

#[tokio::test]
async fn download_clamps_large_and_defaults_missing_size() {
    let (app, _) = test_app(None);
    let resp = app
        .clone()
        .oneshot(get("/api/download?size=524288000"))
        .await
        .unwrap();
    assert_eq!(content_length(&resp), 100 * 1024 * 1024);
    drop(resp);

    let resp = app.oneshot(get("/api/download")).await.unwrap();
    assert_eq!(content_length(&resp), 5 * 1024 * 1024);
}

// ── Upload ──────────────────────────────────────────────────────────

#[tokio::test]
async fn upload_counts_bytes() {
    let (app, _) = test_app(Some(1 << 20));
    let req = Request::builder()
        .method("POST")
        .uri("/api/upload")
        .header("content-type", "application/octet-stream")
        .body(Body::from(vec![1u8; 3000]))
        .unwrap();
    let resp = app.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.headers()[header::CACHE_CONTROL], "no-store");

    let body = json_body(resp).await;
    assert_eq!(body["bytes"], 3000);
    assert!(body["durationMs"].as_f64().unwrap() >= 0.0);
}

#[tokio::test]
async fn upload_over_declared_limit_is_413() {
    let (app, _) = test_app(Some(1000));
    let req = Request::builder()
        .method("POST")
        .uri("/api/upload")
        .header(header::CONTENT_LENGTH, "5000")
        .body(Body::from(vec![0u8; 5000]))
        .unwrap();
    let resp = app.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::PAYLOAD_TOO_LARGE);
    let body = json_body(resp).await;
    assert!(body["error"].as_str().unwrap().contains("1000"));
}

#[tokio::test]
async fn upload_growing_past_limit_is_413() {
    let (app, _) = test_app(Some(1000));
    let chunks = futures::stream::iter(
        (0..4).map(|_| Ok::<_, std::io::Error>(bytes::Bytes::from(vec![0u8; 400]))),
    );
    let req = Request::builder()
        .method("POST")
        .uri("/api/upload")
        .body(Body::from_stream(chunks))
        .unwrap();
    let resp = app.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::PAYLOAD_TOO_LARGE);
}

#[tokio::test]
async fn upload_stream_error_is_500() {
    let (app, _) = test_app(None);
    let chunks = futures::stream::iter(vec![
        Ok(bytes::Bytes::from_static(b"partial")),
        Err(std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset")),
    ]);
    let req = Request::builder()
        .method("POST")
        .uri("/api/upload")
        .body(Body::from_stream(chunks))
        .unwrap();
    let resp = app.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(json_body(resp).await["error"], "upload_failed");
}

// ── Network info ────────────────────────────────────────────────────

#[tokio::test]
async fn network_info_uses_first_public_header_candidate() {
    let (app, provider) = test_app(None);
    let req = Request::builder()
        .uri("/api/network-info")
        .header("x-forwarded-for", "10.0.0.1, 81.2.69.160")
        .body(Body::empty())
        .unwrap();
    let resp = app.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.headers()[header::CACHE_CONTROL], "no-store");

    let body = json_body(resp).await;
    assert_eq!(body["ip"], "81.2.69.160");
    assert_eq!(body["isp"], "British Telecommunications PLC");
    assert_eq!(body["network"], "AS2856 BT");
    assert_eq!(body["server"]["name"], "Europe - London");
    assert!(body["server"]["distanceKm"].as_f64().unwrap() < 50.0);
    assert!(body.get("debug").is_none());

    assert_eq!(provider.geo_queries.lock().unwrap().as_slice(), ["81.2.69.160"]);
    assert_eq!(provider.asn_queries.lock().unwrap().as_slice(), ["81.2.69.160"]);
}

#[tokio::test]
async fn network_info_debug_lists_candidates_and_override() {
    let (app, provider) = test_app(None);
    let req = Request::builder()
        .uri("/api/network-info?clientIp=%5B%3A%3Affff%3A8.8.4.4%5D%3A443&debug=1")
        .header("x-real-ip", "172.20.0.3")
        .body(Body::empty())
        .unwrap();
    let resp = app.oneshot(req).await.unwrap();
    let body = json_body(resp).await;

    let debug = &body["debug"];
    assert_eq!(debug["overrideUsed"], true);
    assert_eq!(debug["overrideIp"], "8.8.4.4");
    assert_eq!(debug["clientIpSource"], "query.clientIp");
    assert_eq!(debug["clientIpSeen"], "172.20.0.3");
    assert_eq!(debug["lookupIp"], "8.8.4.4");
    assert_eq!(debug["headers"]["xRealIp"], "172.20.0.3");
    assert_eq!(debug["headers"]["xForwardedFor"], serde_json::Value::Null);

    let candidates = debug["candidates"].as_array().unwrap();
    assert_eq!(candidates.len(), 2);
    assert_eq!(candidates[0]["source"], "x-real-ip");
    assert_eq!(candidates[1]["source"], "socket");
    assert_eq!(candidates[1]["ip"], "192.168.1.50");

    assert_eq!(provider.geo_queries.lock().unwrap().as_slice(), ["8.8.4.4"]);
}

#[tokio::test]
async fn network_info_private_client_looks_up_without_ip() {
    let (app, provider) = test_app(None);
    let resp = app
        .oneshot(get("/api/network-info?clientIp=10.9.9.9"))
        .await
        .unwrap();
    let body = json_body(resp).await;

    // The stub answers an empty query with its own public address.
    assert_eq!(provider.geo_queries.lock().unwrap().as_slice(), [""]);
    assert_eq!(body["ip"], "81.2.69.142");
    assert_eq!(provider.asn_queries.lock().unwrap().as_slice(), ["81.2.69.142"]);
}
