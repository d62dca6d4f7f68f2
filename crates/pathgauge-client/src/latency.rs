//! Round-trip latency, jitter and loss.

use std::time::Duration;

use tokio::time::Instant;

use pathgauge_common::config::MeasurementConfig;
use pathgauge_common::models::{LatencyResult, Phase, Sample};

use crate::transport::SpeedTransport;
use crate::SampleSender;

/// Summarize successful round trips (in arrival order) and the failure
/// count of one run.
pub fn summarize(round_trips_ms: &[f64], failures: u32) -> LatencyResult {
    let attempts = round_trips_ms.len() as u64 + u64::from(failures);
    if attempts == 0 {
        return LatencyResult::default();
    }

    let average_ms = if round_trips_ms.is_empty() {
        0.0
    } else {
        round_trips_ms.iter().sum::<f64>() / round_trips_ms.len() as f64
    };

    let jitter_ms = if round_trips_ms.len() < 2 {
        0.0
    } else {
        let diffs: f64 = round_trips_ms
            .windows(2)
            .map(|pair| (pair[1] - pair[0]).abs())
            .sum();
        diffs / (round_trips_ms.len() - 1) as f64
    };

    let loss_percent = (100.0 * f64::from(failures) / attempts as f64).round() as u8;

    LatencyResult {
        average_ms,
        jitter_ms,
        loss_percent,
    }
}

pub struct LatencyProbe<'a, T> {
    transport: &'a T,
    interval: Duration,
    timeout: Duration,
}

impl<'a, T: SpeedTransport> LatencyProbe<'a, T> {
    pub fn new(transport: &'a T, config: &MeasurementConfig) -> Self {
        Self {
            transport,
            interval: config.ping_interval,
            timeout: config.ping_timeout,
        }
    }

    /// Issue `sample_count` sequential probes, each after a fixed pause.
    /// Failed or timed-out probes count as loss and never abort the run.
    pub async fn measure(&self, sample_count: u32, samples: &SampleSender) -> LatencyResult {
        let started = Instant::now();
        let mut round_trips = Vec::with_capacity(sample_count as usize);
        let mut failures = 0u32;

        for seq in 0..sample_count {
            tokio::time::sleep(self.interval).await;

            let sent = Instant::now();
            match tokio::time::timeout(self.timeout, self.transport.ping()).await {
                Ok(Ok(())) => {
                    let ms = sent.elapsed().as_secs_f64() * 1000.0;
                    tracing::trace!(seq, ms, "ping");
                    round_trips.push(ms);
                    let _ = samples.send(Sample::new(Phase::Latency, started.elapsed(), ms));
                }
                Ok(Err(e)) => {
                    tracing::debug!(seq, error = %e, "ping failed");
                    failures += 1;
                }
                Err(_) => {
                    tracing::debug!(seq, timeout_ms = self.timeout.as_millis() as u64, "ping timed out");
                    failures += 1;
                }
            }
        }

        let result = summarize(&round_trips, failures);
        tracing::info!(
            average_ms = result.average_ms,
            jitter_ms = result.jitter_ms,
            loss_percent = result.loss_percent,
            "latency measured"
        );
        result
    }
}
