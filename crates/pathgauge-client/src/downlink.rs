//! Download throughput over a fixed wall-clock budget.
//!
//! Requests are issued one at a time; the size hint ramps from small to large
//! halfway through the budget so warm-up does not dominate the early samples.
//! Rates are always computed against the start of the run.

use std::time::Duration;

use futures::StreamExt;
use tokio::time::Instant;

use pathgauge_common::config::MeasurementConfig;
use pathgauge_common::models::{megabits_per_second, Phase, Sample, ThroughputResult};

use crate::transport::SpeedTransport;
use crate::SampleSender;

pub struct DownlinkMeasurer<'a, T> {
    transport: &'a T,
    small_bytes: u64,
    large_bytes: u64,
    sample_interval: Duration,
    retry_pause: Duration,
}

/// Size hint for a request issued `elapsed` into a run of length `budget`.
pub fn size_hint(elapsed: Duration, budget: Duration, small: u64, large: u64) -> u64 {
    if elapsed < budget / 2 {
        small
    } else {
        large
    }
}

impl<'a, T: SpeedTransport> DownlinkMeasurer<'a, T> {
    pub fn new(transport: &'a T, config: &MeasurementConfig) -> Self {
        Self {
            transport,
            small_bytes: config.download_small_bytes,
            large_bytes: config.download_large_bytes,
            sample_interval: config.sample_interval,
            retry_pause: config.download_retry_pause,
        }
    }

    pub async fn measure(&self, budget: Duration, samples: &SampleSender) -> ThroughputResult {
        let started = Instant::now();
        let deadline = started + budget;
        let mut total = 0u64;
        let mut last_sample = started;
        let mut requests = 0u32;

        'run: while started.elapsed() < budget {
            let size = size_hint(started.elapsed(), budget, self.small_bytes, self.large_bytes);
            requests += 1;

            let mut body = match tokio::time::timeout_at(deadline, self.transport.download(size)).await {
                Err(_) => break,
                Ok(Ok(body)) => body,
                Ok(Err(e)) => {
                    tracing::warn!(size, error = %e, "download request failed");
                    tokio::time::sleep_until(deadline.min(Instant::now() + self.retry_pause)).await;
                    continue;
                }
            };

            loop {
                let chunk = match tokio::time::timeout_at(deadline, body.next()).await {
                    Err(_) => break 'run,
                    Ok(None) => break,
                    Ok(Some(Ok(chunk))) => chunk,
                    Ok(Some(Err(e))) => {
                        tracing::warn!(size, error = %e, "download body aborted");
                        tokio::time::sleep_until(deadline.min(Instant::now() + self.retry_pause)).await;
                        break;
                    }
                };

                total += chunk.len() as u64;
                tracing::trace!(len = chunk.len(), total, "download chunk");

                let now = Instant::now();
                if now.duration_since(last_sample) >= self.sample_interval {
                    let elapsed = now.duration_since(started);
                    let _ = samples.send(Sample::new(
                        Phase::Download,
                        elapsed,
                        megabits_per_second(total, elapsed),
                    ));
                    last_sample = now;
                }
            }
        }

        let result = ThroughputResult::from_transfer(total, started.elapsed());
        tracing::info!(
            mbps = result.mbps,
            total_bytes = result.total_bytes,
            requests,
            "download measured"
        );
        result
    }
}
