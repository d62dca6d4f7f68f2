//! Client-side attribution: public IP detection and the network-info fetch.

use std::time::Duration;

use serde::Deserialize;

use pathgauge_common::models::NetworkInfo;

use crate::transport::SpeedTransport;

/// "What is my IP" services, asked in order.
pub const PUBLIC_IP_PROVIDERS: &[&str] = &[
    "https://api64.ipify.org?format=json",
    "https://api.ipify.org?format=json",
];

#[derive(Debug, Default, Deserialize)]
struct IpifyResponse {
    #[serde(default)]
    ip: String,
}

/// Asks public providers for the caller's address so the server can
/// attribute it even behind proxies that hide it.
#[derive(Debug, Clone)]
pub struct PublicIpDetector {
    client: reqwest::Client,
    providers: Vec<String>,
}

impl PublicIpDetector {
    pub fn new() -> reqwest::Result<Self> {
        Self::with_providers(PUBLIC_IP_PROVIDERS.iter().map(|p| p.to_string()))
    }

    pub fn with_providers(providers: impl IntoIterator<Item = String>) -> reqwest::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(3))
            .build()?;
        Ok(Self {
            client,
            providers: providers.into_iter().collect(),
        })
    }

    /// First non-empty `ip` any provider reports.
    pub async fn detect(&self) -> Option<String> {
        for provider in &self.providers {
            match self.ask(provider).await {
                Ok(ip) if !ip.is_empty() => {
                    tracing::debug!(provider = %provider, ip = %ip, "public ip detected");
                    return Some(ip);
                }
                Ok(_) => tracing::debug!(provider = %provider, "provider returned no ip"),
                Err(e) => tracing::debug!(provider = %provider, error = %e, "public ip lookup failed"),
            }
        }
        None
    }

    async fn ask(&self, provider: &str) -> reqwest::Result<String> {
        let body: IpifyResponse = self
            .client
            .get(provider)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(body.ip.trim().to_string())
    }
}

/// Fetch attribution, optionally detecting the public IP first. Never fails;
/// an unreachable endpoint yields `None`.
pub async fn lookup<T: SpeedTransport>(
    transport: &T,
    detector: Option<&PublicIpDetector>,
) -> Option<NetworkInfo> {
    let client_ip = match detector {
        Some(detector) => detector.detect().await,
        None => None,
    };

    match transport.network_info(client_ip.as_deref()).await {
        Ok(info) => Some(info),
        Err(e) => {
            tracing::warn!(error = %e, "network info unavailable");
            None
        }
    }
}
