//! Upload byte counter for `POST /api/upload`.
//!
//! The body is consumed chunk by chunk and dropped immediately; only the
//! running byte count and the first-byte timestamp are kept.

use std::fmt::Display;

use bytes::Bytes;
use futures::{Stream, StreamExt};
use thiserror::Error;
use tokio::time::Instant;

use pathgauge_common::models::UploadReceipt;

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("upload exceeds limit of {limit} bytes")]
    TooLarge { limit: u64 },
    #[error("upload stream failed after {bytes} bytes: {reason}")]
    Stream { bytes: u64, reason: String },
}

/// Per-request upload state.
#[derive(Debug)]
pub struct UploadTally {
    bytes: u64,
    first_byte: Option<Instant>,
    limit: Option<u64>,
}

impl UploadTally {
    pub fn new(limit: Option<u64>) -> Self {
        Self {
            bytes: 0,
            first_byte: None,
            limit,
        }
    }

    pub fn bytes(&self) -> u64 {
        self.bytes
    }

    /// Count one chunk, starting the clock on the first non-empty one.
    pub fn record(&mut self, len: usize) -> Result<(), SinkError> {
        if len == 0 {
            return Ok(());
        }
        if self.first_byte.is_none() {
            self.first_byte = Some(Instant::now());
        }
        self.bytes += len as u64;
        match self.limit {
            Some(limit) if self.bytes > limit => Err(SinkError::TooLarge { limit }),
            _ => Ok(()),
        }
    }

    pub fn finish(self) -> UploadReceipt {
        let duration_ms = self
            .first_byte
            .map(|t| t.elapsed().as_secs_f64() * 1000.0)
            .unwrap_or(0.0);
        UploadReceipt {
            bytes: self.bytes,
            duration_ms,
        }
    }
}

/// Count an inbound body to completion.
pub async fn receive<S, E>(stream: S, limit: Option<u64>) -> Result<UploadReceipt, SinkError>
where
    S: Stream<Item = Result<Bytes, E>>,
    E: Display,
{
    let mut stream = std::pin::pin!(stream);
    let mut tally = UploadTally::new(limit);

    while let Some(chunk) = stream.next().await {
        match chunk {
            Ok(chunk) => tally.record(chunk.len())?,
            Err(e) => {
                return Err(SinkError::Stream {
                    bytes: tally.bytes(),
                    reason: e.to_string(),
                })
            }
        }
    }

    Ok(tally.finish())
}
