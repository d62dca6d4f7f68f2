//! HTTP exchanges with a pathgauge server.
//!
//! The measurers only see [`SpeedTransport`], so tests drive them with
//! scripted transports under a paused clock while the binary uses
//! [`HttpTransport`].

use std::future::Future;
use std::time::Duration;

use bytes::Bytes;
use futures::stream::BoxStream;
use futures::StreamExt;
use reqwest::{header, Url};
use tokio::sync::mpsc;

use pathgauge_common::models::{NetworkInfo, UploadReceipt};

use crate::error::TransportError;

/// Upload payloads are built from blocks of this size.
pub const UPLOAD_BLOCK_SIZE: usize = 256 * 1024;

const MIB: f64 = 1024.0 * 1024.0;

static UPLOAD_BLOCK: [u8; UPLOAD_BLOCK_SIZE] = [0; UPLOAD_BLOCK_SIZE];

/// Streamed download body.
pub type ByteStream = BoxStream<'static, Result<Bytes, TransportError>>;

/// Synthetic upload body of whole blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Payload {
    blocks: usize,
}

impl Payload {
    /// `ceil(megabytes * 1 MiB / block)` blocks, at least one.
    pub fn from_megabytes(megabytes: f64) -> Self {
        let blocks = (megabytes * MIB / UPLOAD_BLOCK_SIZE as f64).ceil();
        let blocks = if blocks.is_finite() && blocks >= 1.0 {
            blocks as usize
        } else {
            1
        };
        Self { blocks }
    }

    pub fn block_count(&self) -> usize {
        self.blocks
    }

    pub fn len(&self) -> u64 {
        (self.blocks * UPLOAD_BLOCK_SIZE) as u64
    }

    pub fn is_empty(&self) -> bool {
        self.blocks == 0
    }

    pub fn blocks(&self) -> impl Iterator<Item = Bytes> + Send + 'static {
        std::iter::repeat_with(|| Bytes::from_static(&UPLOAD_BLOCK)).take(self.blocks)
    }
}

/// Requests the measurers issue against a server.
pub trait SpeedTransport: Send + Sync {
    /// Minimal round trip.
    fn ping(&self) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Start a download of roughly `size` bytes and hand back the body.
    fn download(&self, size: u64) -> impl Future<Output = Result<ByteStream, TransportError>> + Send;

    /// Send `payload`, reporting cumulative bytes handed to the connection
    /// on `progress`.
    fn upload(
        &self,
        payload: Payload,
        progress: mpsc::UnboundedSender<u64>,
    ) -> impl Future<Output = Result<UploadReceipt, TransportError>> + Send;

    /// Attribution record, optionally keyed by a caller-supplied public IP.
    fn network_info(
        &self,
        client_ip: Option<&str>,
    ) -> impl Future<Output = Result<NetworkInfo, TransportError>> + Send;
}

/// reqwest-backed transport rooted at a server base URL.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    base: Url,
}

impl HttpTransport {
    pub fn new(base: &str) -> Result<Self, TransportError> {
        let base = Url::parse(base)
            .map_err(|e| TransportError::Connect(format!("invalid server url {base}: {e}")))?;
        if base.cannot_be_a_base() {
            return Err(TransportError::Connect(format!("invalid server url {base}")));
        }
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .user_agent(concat!("pathgauge/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client, base })
    }

    pub fn base(&self) -> &Url {
        &self.base
    }

    fn endpoint(&self, name: &str) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().push("api").push(name);
        }
        url
    }
}

impl SpeedTransport for HttpTransport {
    async fn ping(&self) -> Result<(), TransportError> {
        let response = self
            .client
            .get(self.endpoint("ping"))
            .header(header::CACHE_CONTROL, "no-store")
            .send()
            .await?
            .error_for_status()?;
        response.bytes().await?;
        Ok(())
    }

    async fn download(&self, size: u64) -> Result<ByteStream, TransportError> {
        let mut url = self.endpoint("download");
        url.query_pairs_mut().append_pair("size", &size.to_string());

        let response = self
            .client
            .get(url)
            .header(header::CACHE_CONTROL, "no-store")
            .send()
            .await?
            .error_for_status()?;
        Ok(response
            .bytes_stream()
            .map(|chunk| chunk.map_err(TransportError::from))
            .boxed())
    }

    async fn upload(
        &self,
        payload: Payload,
        progress: mpsc::UnboundedSender<u64>,
    ) -> Result<UploadReceipt, TransportError> {
        let mut sent = 0u64;
        let blocks = futures::stream::iter(payload.blocks()).map(move |block| {
            sent += block.len() as u64;
            let _ = progress.send(sent);
            Ok::<_, std::io::Error>(block)
        });

        let response = self
            .client
            .post(self.endpoint("upload"))
            .header(header::CONTENT_TYPE, "application/octet-stream")
            .header(header::CONTENT_LENGTH, payload.len())
            .body(reqwest::Body::wrap_stream(blocks))
            .send()
            .await?
            .error_for_status()?;
        Ok(response.json().await?)
    }

    async fn network_info(&self, client_ip: Option<&str>) -> Result<NetworkInfo, TransportError> {
        let mut url = self.endpoint("network-info");
        if let Some(ip) = client_ip.filter(|ip| !ip.is_empty()) {
            url.query_pairs_mut().append_pair("clientIp", ip);
        }
        let response = self
            .client
            .get(url)
            .send()
            .await?
            .error_for_status()?;
        Ok(response.json().await?)
    }
}
