//! One full measurement session.
//!
//! Phases run strictly one after another: latency, download, upload. The
//! network-info lookup runs as its own task alongside them. A failed upload
//! fails the whole session; no partial report is produced.

use std::sync::Arc;
use std::time::Duration;

use pathgauge_common::config::MeasurementConfig;
use pathgauge_common::models::SessionReport;

use crate::downlink::DownlinkMeasurer;
use crate::error::MeasureError;
use crate::latency::LatencyProbe;
use crate::network::{self, PublicIpDetector};
use crate::transport::SpeedTransport;
use crate::uplink::UplinkMeasurer;
use crate::SampleSender;

pub struct Session<T> {
    transport: Arc<T>,
    config: MeasurementConfig,
    detector: Option<PublicIpDetector>,
}

impl<T: SpeedTransport + 'static> Session<T> {
    pub fn new(transport: Arc<T>, config: MeasurementConfig) -> Self {
        Self {
            transport,
            config,
            detector: None,
        }
    }

    /// Detect the public IP before asking the server for attribution.
    pub fn with_public_ip_detection(mut self, detector: PublicIpDetector) -> Self {
        self.detector = Some(detector);
        self
    }

    pub async fn run(&self, samples: SampleSender) -> Result<SessionReport, MeasureError> {
        let lookup = {
            let transport = self.transport.clone();
            let detector = self.detector.clone();
            tokio::spawn(async move { network::lookup(&*transport, detector.as_ref()).await })
        };

        match self.measure(&samples).await {
            Ok(mut report) => {
                report.network = lookup.await.unwrap_or_else(|e| {
                    tracing::warn!(error = %e, "network info task failed");
                    None
                });
                Ok(report)
            }
            Err(e) => {
                lookup.abort();
                Err(e)
            }
        }
    }

    async fn measure(&self, samples: &SampleSender) -> Result<SessionReport, MeasureError> {
        let transport = &*self.transport;
        let config = &self.config;

        tracing::info!(samples = config.ping_samples, "latency phase");
        let latency = LatencyProbe::new(transport, config)
            .measure(config.ping_samples, samples)
            .await;

        tracing::info!(budget_ms = millis(config.download_duration), "download phase");
        let download = DownlinkMeasurer::new(transport, config)
            .measure(config.download_duration, samples)
            .await;

        tracing::info!(
            budget_ms = millis(config.upload_duration),
            chunk_mb = config.upload_initial_chunk_mb,
            "upload phase"
        );
        let upload = UplinkMeasurer::new(transport, config)
            .measure(config.upload_duration, config.upload_initial_chunk_mb, samples)
            .await?;

        Ok(SessionReport {
            latency,
            download,
            upload,
            network: None,
        })
    }
}

fn millis(d: Duration) -> u64 {
    d.as_millis() as u64
}
