//! End-to-end: the reqwest transport and measurers against a real server on
//! an ephemeral loopback port. Attribution providers are stubbed.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use tokio::sync::mpsc;

use pathgauge_client::downlink::DownlinkMeasurer;
use pathgauge_client::latency::LatencyProbe;
use pathgauge_client::network;
use pathgauge_client::session::Session;
use pathgauge_client::transport::{HttpTransport, Payload, SpeedTransport, UPLOAD_BLOCK_SIZE};
use pathgauge_client::uplink::UplinkMeasurer;
use pathgauge_common::attribution::{AsnRecord, GeoRecord, Lookup};
use pathgauge_common::config::{AttributionConfig, MeasurementConfig, ServerConfig};
use pathgauge_server::attribution::AttributionProvider;
use pathgauge_server::state::AppState;

struct StubProvider;

impl AttributionProvider for StubProvider {
    fn geolocate<'a>(&'a self, ip: &'a str) -> BoxFuture<'a, Lookup<GeoRecord>> {
        Box::pin(async move {
            Lookup::Found(GeoRecord {
                ip: Some(if ip.is_empty() { "1.1.1.1".into() } else { ip.to_string() }),
                latitude: Some(1.29),
                longitude: Some(103.85),
                ..GeoRecord::default()
            })
        })
    }

    fn asn<'a>(&'a self, _ip: &'a str) -> BoxFuture<'a, Lookup<AsnRecord>> {
        Box::pin(async {
            AsnRecord::from_body(br#"{"status":"ok","data":{"asn":{"asn":13335,"name":"CLOUDFLARENET"}}}"#)
                .into()
        })
    }
}

async fn spawn_server() -> String {
    let state = AppState::new(
        &ServerConfig::default(),
        &AttributionConfig::default(),
        Arc::new(StubProvider),
    );
    let app = pathgauge_server::app(state, None);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .unwrap();
    });
    format!("http://{addr}")
}

fn fast_config() -> MeasurementConfig {
    MeasurementConfig {
        ping_samples: 3,
        ping_interval: Duration::from_millis(10),
        download_duration: Duration::from_millis(400),
        download_small_bytes: 256 * 1024,
        download_large_bytes: 1024 * 1024,
        upload_duration: Duration::from_millis(600),
        upload_initial_chunk_mb: 0.5,
        ..MeasurementConfig::default()
    }
}

#[tokio::test]
async fn probes_and_transfers_over_loopback() {
    let transport = HttpTransport::new(&spawn_server().await).unwrap();
    let config = fast_config();
    let (tx, _rx) = mpsc::unbounded_channel();

    let latency = LatencyProbe::new(&transport, &config).measure(3, &tx).await;
    assert_eq!(latency.loss_percent, 0);
    assert!(latency.average_ms > 0.0);

    let download = DownlinkMeasurer::new(&transport, &config)
        .measure(config.download_duration, &tx)
        .await;
    assert!(download.total_bytes > 0);
    assert!(download.mbps > 0.0);

    let upload = UplinkMeasurer::new(&transport, &config)
        .measure(config.upload_duration, config.upload_initial_chunk_mb, &tx)
        .await
        .unwrap();
    assert!(upload.total_bytes > 0);
    assert_eq!(upload.total_bytes % UPLOAD_BLOCK_SIZE as u64, 0);
}

#[tokio::test]
async fn upload_receipt_matches_payload() {
    let transport = HttpTransport::new(&spawn_server().await).unwrap();
    let payload = Payload::from_megabytes(1.0);
    let (progress_tx, mut progress_rx) = mpsc::unbounded_channel();

    let receipt = transport.upload(payload, progress_tx).await.unwrap();
    assert_eq!(receipt.bytes, payload.len());

    let mut last = 0;
    while let Ok(sent) = progress_rx.try_recv() {
        assert!(sent > last);
        last = sent;
    }
    assert_eq!(last, payload.len());
}

#[tokio::test]
async fn download_body_has_requested_length() {
    use futures::StreamExt;

    let transport = HttpTransport::new(&spawn_server().await).unwrap();
    let mut body = transport.download(300_000).await.unwrap();
    let mut total = 0;
    while let Some(chunk) = body.next().await {
        total += chunk.unwrap().len();
    }
    assert_eq!(total, 300_000);
}

#[tokio::test]
async fn network_info_honours_public_override() {
    let transport = HttpTransport::new(&spawn_server().await).unwrap();

    let info = transport.network_info(Some("8.8.8.8")).await.unwrap();
    assert_eq!(info.ip, "8.8.8.8");
    assert_eq!(info.network, "AS13335 CLOUDFLARENET");
    assert_eq!(info.server.name, "Asia - Singapore");

    // Loopback peer is private, so the provider sees an empty query.
    let info = network::lookup(&transport, None).await.unwrap();
    assert_eq!(info.ip, "1.1.1.1");
}

#[tokio::test]
async fn full_session_against_live_server() {
    let transport = Arc::new(HttpTransport::new(&spawn_server().await).unwrap());
    let (tx, mut rx) = mpsc::unbounded_channel();

    let report = Session::new(transport, fast_config()).run(tx).await.unwrap();
    assert!(report.download.total_bytes > 0);
    assert!(report.upload.total_bytes > 0);
    assert_eq!(report.network.unwrap().ip, "1.1.1.1");

    let mut count = 0;
    while rx.recv().await.is_some() {
        count += 1;
    }
    assert!(count >= 3);
}
