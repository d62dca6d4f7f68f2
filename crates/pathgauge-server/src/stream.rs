//! Filler byte stream for `GET /api/download`.
//!
//! A [`FillerWriter`] produces exactly `total` bytes as 64 KiB slices of one
//! static zero block. It offers chunks to a [`ChunkSink`]; when the sink is
//! full the writer parks in [`WriterState::PausedAwaitingDrain`] holding at
//! most one chunk, and resumes only after the sink reports it has drained.
//! Memory per response is therefore bounded by the sink's capacity, not by
//! the requested size.

use std::convert::Infallible;
use std::future::Future;

use bytes::Bytes;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

/// Size of every chunk except possibly the last.
pub const CHUNK_SIZE: usize = 64 * 1024;

pub const MIN_DOWNLOAD_BYTES: u64 = 1024;
pub const MAX_DOWNLOAD_BYTES: u64 = 100 * 1024 * 1024;
pub const DEFAULT_DOWNLOAD_BYTES: u64 = 5 * 1024 * 1024;

static FILLER: [u8; CHUNK_SIZE] = [0; CHUNK_SIZE];

/// Clamp a raw `size` query value to the allowed range.
///
/// Missing or non-integer values fall back to the default.
pub fn clamp_size(raw: Option<&str>) -> u64 {
    match raw.map(str::trim).and_then(|s| s.parse::<i128>().ok()) {
        Some(n) => n.clamp(MIN_DOWNLOAD_BYTES as i128, MAX_DOWNLOAD_BYTES as i128) as u64,
        None => DEFAULT_DOWNLOAD_BYTES,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriterState {
    Writing,
    PausedAwaitingDrain,
    Done,
}

/// Result of offering one chunk to a sink.
#[derive(Debug)]
pub enum Offer {
    Accepted,
    /// No room right now; the chunk is handed back.
    Full(Bytes),
    /// The consumer went away.
    Closed,
}

/// Consumer side of the stream.
pub trait ChunkSink {
    /// Try to hand over a chunk without waiting.
    fn offer(&mut self, chunk: Bytes) -> Offer;

    /// Wait until there is room again. `false` means the consumer is gone.
    fn drained(&mut self) -> impl Future<Output = bool> + Send;
}

pub struct FillerWriter {
    total: u64,
    written: u64,
    pending: Option<Bytes>,
    state: WriterState,
}

impl FillerWriter {
    pub fn new(total: u64) -> Self {
        Self {
            total,
            written: 0,
            pending: None,
            state: WriterState::Writing,
        }
    }

    pub fn state(&self) -> WriterState {
        self.state
    }

    /// Bytes accepted by the sink so far.
    pub fn written(&self) -> u64 {
        self.written
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    fn next_chunk(&mut self) -> Bytes {
        if let Some(chunk) = self.pending.take() {
            return chunk;
        }
        let remaining = self.total - self.written;
        let len = remaining.min(CHUNK_SIZE as u64) as usize;
        Bytes::from_static(&FILLER[..len])
    }

    /// Offer chunks until the sink is full, closed, or the stream is complete.
    ///
    /// Returns [`WriterState::PausedAwaitingDrain`] or [`WriterState::Done`].
    pub fn pump<S: ChunkSink>(&mut self, sink: &mut S) -> WriterState {
        if self.state == WriterState::Done {
            return self.state;
        }
        self.state = WriterState::Writing;

        while self.written < self.total {
            let chunk = self.next_chunk();
            let len = chunk.len() as u64;
            match sink.offer(chunk) {
                Offer::Accepted => self.written += len,
                Offer::Full(chunk) => {
                    self.pending = Some(chunk);
                    self.state = WriterState::PausedAwaitingDrain;
                    return self.state;
                }
                Offer::Closed => {
                    tracing::debug!(
                        written = self.written,
                        total = self.total,
                        "download consumer closed early"
                    );
                    break;
                }
            }
        }

        self.state = WriterState::Done;
        self.state
    }

    /// Drive the writer to completion, waiting on drain signals as needed.
    /// Returns the number of bytes the sink accepted.
    pub async fn run<S: ChunkSink>(mut self, mut sink: S) -> u64 {
        while self.pump(&mut sink) == WriterState::PausedAwaitingDrain {
            if !sink.drained().await {
                self.state = WriterState::Done;
                break;
            }
        }
        self.written
    }
}

/// Bounded channel feeding an HTTP response body.
pub type BodySender = mpsc::Sender<Result<Bytes, Infallible>>;

impl ChunkSink for BodySender {
    fn offer(&mut self, chunk: Bytes) -> Offer {
        match self.try_send(Ok(chunk)) {
            Ok(()) => Offer::Accepted,
            Err(TrySendError::Full(Ok(chunk))) => Offer::Full(chunk),
            Err(TrySendError::Full(Err(never))) => match never {},
            Err(TrySendError::Closed(_)) => Offer::Closed,
        }
    }

    async fn drained(&mut self) -> bool {
        // Only this writer sends, so the freed slot is still free when the
        // permit is dropped.
        self.reserve().await.is_ok()
    }
}
