//! Scripted transport for measurer tests. Run under a paused tokio clock.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use futures::StreamExt;
use tokio::sync::mpsc;

use pathgauge_common::models::{NetworkInfo, UploadReceipt};

use crate::error::TransportError;
use crate::transport::{ByteStream, Payload, SpeedTransport};

#[derive(Debug, Clone)]
pub enum PingScript {
    Reply(Duration),
    Fail,
    Hang,
}

#[derive(Debug, Clone)]
pub enum DownloadScript {
    /// `count` chunks of `size` bytes, one every `every`.
    Chunks {
        size: usize,
        count: usize,
        every: Duration,
    },
    /// `count` chunks, then a body error.
    BreakAfter { size: usize, count: usize },
    Refuse,
}

#[derive(Debug, Clone)]
pub enum UploadScript {
    Accept { per_block: Duration },
    Reject(u16),
    Hang,
}

/// Queues of scripted outcomes. The last entry of each queue repeats.
#[derive(Default)]
pub struct MockTransport {
    pings: Mutex<VecDeque<PingScript>>,
    downloads: Mutex<VecDeque<DownloadScript>>,
    uploads: Mutex<VecDeque<UploadScript>>,
    network: Option<NetworkInfo>,
    pub download_sizes: Mutex<Vec<u64>>,
    pub upload_sizes: Mutex<Vec<u64>>,
    pub served: Arc<AtomicU64>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pings(self, script: impl IntoIterator<Item = PingScript>) -> Self {
        *self.pings.lock().unwrap() = script.into_iter().collect();
        self
    }

    pub fn downloads(self, script: impl IntoIterator<Item = DownloadScript>) -> Self {
        *self.downloads.lock().unwrap() = script.into_iter().collect();
        self
    }

    pub fn uploads(self, script: impl IntoIterator<Item = UploadScript>) -> Self {
        *self.uploads.lock().unwrap() = script.into_iter().collect();
        self
    }

    pub fn network(mut self, info: NetworkInfo) -> Self {
        self.network = Some(info);
        self
    }

    pub fn served(&self) -> u64 {
        self.served.load(Ordering::SeqCst)
    }
}

fn next<T: Clone>(queue: &Mutex<VecDeque<T>>) -> Option<T> {
    let mut queue = queue.lock().unwrap();
    if queue.len() > 1 {
        queue.pop_front()
    } else {
        queue.front().cloned()
    }
}

fn chunk_stream(size: usize, count: usize, every: Duration, served: Arc<AtomicU64>) -> ByteStream {
    futures::stream::iter(0..count)
        .then(move |_| {
            let served = served.clone();
            async move {
                tokio::time::sleep(every).await;
                served.fetch_add(size as u64, Ordering::SeqCst);
                Ok(Bytes::from(vec![0u8; size]))
            }
        })
        .boxed()
}

impl SpeedTransport for MockTransport {
    async fn ping(&self) -> Result<(), TransportError> {
        match next(&self.pings) {
            Some(PingScript::Reply(delay)) => {
                tokio::time::sleep(delay).await;
                Ok(())
            }
            Some(PingScript::Hang) => std::future::pending().await,
            Some(PingScript::Fail) | None => Err(TransportError::Connect("refused".into())),
        }
    }

    async fn download(&self, size: u64) -> Result<ByteStream, TransportError> {
        self.download_sizes.lock().unwrap().push(size);
        match next(&self.downloads) {
            Some(DownloadScript::Chunks { size, count, every }) => {
                Ok(chunk_stream(size, count, every, self.served.clone()))
            }
            Some(DownloadScript::BreakAfter { size, count }) => {
                let broken = futures::stream::once(async {
                    Err(TransportError::Body("connection reset".into()))
                });
                Ok(chunk_stream(size, count, Duration::from_millis(10), self.served.clone())
                    .chain(broken)
                    .boxed())
            }
            Some(DownloadScript::Refuse) | None => Err(TransportError::Status(503)),
        }
    }

    async fn upload(
        &self,
        payload: Payload,
        progress: mpsc::UnboundedSender<u64>,
    ) -> Result<UploadReceipt, TransportError> {
        self.upload_sizes.lock().unwrap().push(payload.len());
        match next(&self.uploads) {
            Some(UploadScript::Accept { per_block }) => {
                let mut sent = 0u64;
                for block in payload.blocks() {
                    tokio::time::sleep(per_block).await;
                    sent += block.len() as u64;
                    let _ = progress.send(sent);
                }
                Ok(UploadReceipt {
                    bytes: sent,
                    duration_ms: (per_block * payload.block_count() as u32).as_secs_f64() * 1000.0,
                })
            }
            Some(UploadScript::Reject(status)) => Err(TransportError::Status(status)),
            Some(UploadScript::Hang) => std::future::pending().await,
            None => Err(TransportError::Connect("refused".into())),
        }
    }

    async fn network_info(&self, _client_ip: Option<&str>) -> Result<NetworkInfo, TransportError> {
        self.network
            .clone()
            .ok_or_else(|| TransportError::Status(500))
    }
}
