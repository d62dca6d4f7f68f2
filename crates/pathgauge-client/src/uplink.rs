//! Upload throughput with a descending chunk-size ladder.
//!
//! Each attempt posts one synthetic payload at the current rung. The outcome
//! of an attempt is classified and fed to [`next_state`], a pure transition
//! function, which decides whether to retry, step down, stop, or give up.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::Instant;

use pathgauge_common::config::MeasurementConfig;
use pathgauge_common::models::{megabits_per_second, Phase, Sample, ThroughputResult};

use crate::error::{MeasureError, TransportError};
use crate::transport::{Payload, SpeedTransport};
use crate::SampleSender;

/// Rungs always offered below the caller's initial chunk size, in MiB.
pub const FIXED_RUNGS_MB: [f64; 3] = [1.0, 0.5, 0.25];

/// No new attempt is started with this much budget or less left.
pub const MIN_ATTEMPT_WINDOW: Duration = Duration::from_millis(200);

/// Lower bound on an attempt's time box.
pub const MIN_ATTEMPT_TIMEOUT: Duration = Duration::from_millis(500);

/// Descending, de-duplicated chunk sizes in MiB.
#[derive(Debug, Clone, PartialEq)]
pub struct Ladder {
    rungs: Vec<f64>,
}

impl Ladder {
    pub fn new(initial_mb: f64) -> Self {
        let mut rungs: Vec<f64> = std::iter::once(initial_mb)
            .chain(FIXED_RUNGS_MB)
            .filter(|mb| mb.is_finite() && *mb > 0.0)
            .collect();
        rungs.sort_by(|a, b| b.total_cmp(a));
        rungs.dedup();
        Self { rungs }
    }

    pub fn rungs(&self) -> &[f64] {
        &self.rungs
    }

    pub fn len(&self) -> usize {
        self.rungs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rungs.is_empty()
    }

    /// Size at `position`, clamped to the smallest rung.
    pub fn rung(&self, position: usize) -> f64 {
        self.rungs
            .get(position)
            .or(self.rungs.last())
            .copied()
            .unwrap_or(FIXED_RUNGS_MB[FIXED_RUNGS_MB.len() - 1])
    }
}

/// How a single upload attempt ended.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Confirmed,
    CapacityRejected,
    TimedOut,
    Fatal(TransportError),
}

impl Outcome {
    pub fn classify(result: Result<(), TransportError>) -> Self {
        match result {
            Ok(()) => Outcome::Confirmed,
            Err(e) if e.is_status(413) => Outcome::CapacityRejected,
            Err(e) if e.is_status(408) => Outcome::TimedOut,
            Err(TransportError::Timeout) => Outcome::TimedOut,
            Err(e) => Outcome::Fatal(e),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Exhaustion {
    /// Rejected for size at the smallest rung.
    SizeLimit,
    Failed(TransportError),
}

#[derive(Debug, Clone, PartialEq)]
pub enum LadderState {
    Attempting { rung: usize },
    BackingOff { rung: usize },
    Exhausted(Exhaustion),
    /// Budget spent; the run ends normally.
    Succeeded,
}

/// State before the first attempt.
pub fn initial_state(remaining: Duration) -> LadderState {
    if remaining <= MIN_ATTEMPT_WINDOW {
        LadderState::Succeeded
    } else {
        LadderState::Attempting { rung: 0 }
    }
}

/// Transition after an attempt at `position` of a ladder of `rungs` sizes.
pub fn next_state(
    outcome: &Outcome,
    remaining: Duration,
    position: usize,
    rungs: usize,
) -> LadderState {
    let smallest = position + 1 >= rungs;
    match outcome {
        Outcome::Fatal(e) => LadderState::Exhausted(Exhaustion::Failed(e.clone())),
        Outcome::CapacityRejected if smallest => LadderState::Exhausted(Exhaustion::SizeLimit),
        _ if remaining <= MIN_ATTEMPT_WINDOW => LadderState::Succeeded,
        Outcome::CapacityRejected => LadderState::BackingOff { rung: position + 1 },
        Outcome::Confirmed | Outcome::TimedOut => LadderState::Attempting { rung: position },
    }
}

/// Time box for an attempt with `remaining` budget left.
pub fn attempt_timeout(ceiling: Duration, remaining: Duration) -> Duration {
    ceiling.min(remaining).max(MIN_ATTEMPT_TIMEOUT)
}

pub struct UplinkMeasurer<'a, T> {
    transport: &'a T,
    ceiling: Duration,
}

impl<'a, T: SpeedTransport> UplinkMeasurer<'a, T> {
    pub fn new(transport: &'a T, config: &MeasurementConfig) -> Self {
        Self {
            transport,
            ceiling: config.upload_attempt_ceiling,
        }
    }

    pub async fn measure(
        &self,
        budget: Duration,
        initial_chunk_mb: f64,
        samples: &SampleSender,
    ) -> Result<ThroughputResult, MeasureError> {
        let ladder = Ladder::new(initial_chunk_mb);
        let started = Instant::now();
        let remaining = || budget.saturating_sub(started.elapsed());

        let mut confirmed = 0u64;
        let mut last_rejected = false;
        let mut state = initial_state(remaining());

        loop {
            match state {
                LadderState::Attempting { rung } => {
                    let payload = Payload::from_megabytes(ladder.rung(rung));
                    let timeout = attempt_timeout(self.ceiling, remaining());
                    let outcome = self
                        .attempt(payload, timeout, started, confirmed, samples)
                        .await;

                    if outcome == Outcome::Confirmed {
                        confirmed += payload.len();
                    }
                    last_rejected = outcome == Outcome::CapacityRejected;
                    tracing::debug!(
                        rung,
                        bytes = payload.len(),
                        ?outcome,
                        confirmed,
                        "upload attempt finished"
                    );
                    state = next_state(&outcome, remaining(), rung, ladder.len());
                }
                LadderState::BackingOff { rung } => {
                    tracing::info!(chunk_mb = ladder.rung(rung), "upload payload too large, reducing size");
                    state = LadderState::Attempting { rung };
                }
                LadderState::Exhausted(Exhaustion::SizeLimit) => {
                    tracing::warn!(confirmed, "upload rejected at smallest chunk size");
                    return Err(MeasureError::SizeLimitExceeded);
                }
                LadderState::Exhausted(Exhaustion::Failed(e)) => {
                    tracing::warn!(confirmed, error = %e, "upload aborted");
                    return Err(MeasureError::Transport(e));
                }
                LadderState::Succeeded => break,
            }
        }

        if confirmed == 0 {
            return Err(if last_rejected {
                MeasureError::SizeLimitExceeded
            } else {
                MeasureError::UploadFailed
            });
        }

        let result = ThroughputResult::from_transfer(confirmed, started.elapsed());
        tracing::info!(
            mbps = result.mbps,
            total_bytes = result.total_bytes,
            "upload measured"
        );
        Ok(result)
    }

    /// One time-boxed attempt, emitting running-average samples as the
    /// transport reports progress.
    async fn attempt(
        &self,
        payload: Payload,
        timeout: Duration,
        started: Instant,
        confirmed: u64,
        samples: &SampleSender,
    ) -> Outcome {
        let (progress_tx, mut progress_rx) = mpsc::unbounded_channel();
        let upload = self.transport.upload(payload, progress_tx);
        tokio::pin!(upload);
        let deadline = tokio::time::sleep(timeout);
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                result = &mut upload => {
                    return Outcome::classify(result.map(|receipt| {
                        tracing::trace!(bytes = receipt.bytes, duration_ms = receipt.duration_ms, "upload receipt");
                    }));
                }
                Some(in_flight) = progress_rx.recv() => {
                    let elapsed = started.elapsed();
                    let _ = samples.send(Sample::new(
                        Phase::Upload,
                        elapsed,
                        megabits_per_second(confirmed + in_flight, elapsed),
                    ));
                }
                _ = &mut deadline => {
                    tracing::debug!(timeout_ms = timeout.as_millis() as u64, "upload attempt timed out");
                    return Outcome::TimedOut;
                }
            }
        }
    }
}
