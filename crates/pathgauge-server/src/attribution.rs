//! External attribution lookups.
//!
//! Two stages run one after the other, each under its own timeout: IP
//! geolocation, then ASN registry keyed by the IP the first stage reported.
//! Any failure turns that stage into [`Lookup::Unavailable`]; the chain
//! itself never fails.

use std::future::Future;
use std::time::Duration;

use futures::future::BoxFuture;
use reqwest::Url;

use pathgauge_common::attribution::{self, AsnRecord, Attribution, GeoRecord, Lookup};
use pathgauge_common::config::AttributionConfig;

/// Source of the two lookup stages.
pub trait AttributionProvider: Send + Sync {
    /// Stage 1. An empty `ip` asks about the caller's own address.
    fn geolocate<'a>(&'a self, ip: &'a str) -> BoxFuture<'a, Lookup<GeoRecord>>;

    /// Stage 2.
    fn asn<'a>(&'a self, ip: &'a str) -> BoxFuture<'a, Lookup<AsnRecord>>;
}

/// Run both stages and merge them.
pub async fn attribute(
    provider: &dyn AttributionProvider,
    timeout: Duration,
    client_ip: &str,
    lookup_ip: &str,
) -> Attribution {
    let geo = bounded("geolocation", timeout, provider.geolocate(lookup_ip)).await;

    let asn_key = attribution::asn_lookup_key(&geo, lookup_ip);
    let asn = if asn_key.is_empty() {
        Lookup::Unavailable
    } else {
        bounded("asn", timeout, provider.asn(&asn_key)).await
    };

    tracing::debug!(
        lookup_ip,
        asn_key = %asn_key,
        geo = geo.is_available(),
        asn = asn.is_available(),
        "attribution lookups finished"
    );

    attribution::merge(client_ip, &geo, &asn)
}

async fn bounded<T>(
    stage: &'static str,
    timeout: Duration,
    lookup: impl Future<Output = Lookup<T>>,
) -> Lookup<T> {
    match tokio::time::timeout(timeout, lookup).await {
        Ok(result) => result,
        Err(_) => {
            tracing::warn!(stage, timeout_ms = timeout.as_millis() as u64, "lookup timed out");
            Lookup::Unavailable
        }
    }
}

// ── HTTP providers ──────────────────────────────────────────────────

/// ipwho.is + bgpview.io over HTTPS.
pub struct HttpAttributionProvider {
    client: reqwest::Client,
    geo_url: String,
    asn_url: String,
}

impl HttpAttributionProvider {
    pub fn new(config: &AttributionConfig) -> reqwest::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(concat!("pathgauge/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            geo_url: config.geo_url.clone(),
            asn_url: config.asn_url.clone(),
        })
    }

    async fn fetch(&self, url: Option<Url>) -> Option<bytes::Bytes> {
        let url = url?;
        let response = match self.client.get(url.clone()).send().await {
            Ok(r) => r,
            Err(e) => {
                tracing::debug!(%url, error = %e, "lookup request failed");
                return None;
            }
        };
        match response.bytes().await {
            Ok(body) => Some(body),
            Err(e) => {
                tracing::debug!(%url, error = %e, "lookup body failed");
                None
            }
        }
    }
}

/// `base` with `segments` appended as escaped path segments.
fn endpoint(base: &str, segments: &[&str]) -> Option<Url> {
    let mut url = Url::parse(base).ok()?;
    {
        let mut path = url.path_segments_mut().ok()?;
        path.pop_if_empty();
        for segment in segments {
            path.push(segment);
        }
    }
    Some(url)
}

impl AttributionProvider for HttpAttributionProvider {
    fn geolocate<'a>(&'a self, ip: &'a str) -> BoxFuture<'a, Lookup<GeoRecord>> {
        Box::pin(async move {
            let url = endpoint(&self.geo_url, &[ip]);
            self.fetch(url)
                .await
                .and_then(|body| GeoRecord::from_body(&body))
                .into()
        })
    }

    fn asn<'a>(&'a self, ip: &'a str) -> BoxFuture<'a, Lookup<AsnRecord>> {
        Box::pin(async move {
            let url = endpoint(&self.asn_url, &["ip", ip]);
            self.fetch(url)
                .await
                .and_then(|body| AsnRecord::from_body(&body))
                .into()
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use pathgauge_common::attribution::UNAVAILABLE;

    use super::*;

    #[derive(Default)]
    struct StubProvider {
        geo: Option<GeoRecord>,
        asn: Option<AsnRecord>,
        stall_geo: bool,
        asn_keys: Mutex<Vec<String>>,
    }

    impl AttributionProvider for StubProvider {
        fn geolocate<'a>(&'a self, _ip: &'a str) -> BoxFuture<'a, Lookup<GeoRecord>> {
            Box::pin(async move {
                if self.stall_geo {
                    std::future::pending::<()>().await;
                }
                self.geo.clone().into()
            })
        }

        fn asn<'a>(&'a self, ip: &'a str) -> BoxFuture<'a, Lookup<AsnRecord>> {
            self.asn_keys.lock().unwrap().push(ip.to_string());
            Box::pin(async move { self.asn.clone().into() })
        }
    }

    fn bgp() -> AsnRecord {
        AsnRecord::from_body(br#"{"status":"ok","data":{"asn":{"asn":13335,"name":"CLOUDFLARENET"}}}"#)
            .unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_geolocation_degrades_to_unavailable() {
        let provider = StubProvider {
            stall_geo: true,
            asn: Some(bgp()),
            ..StubProvider::default()
        };
        let a = attribute(&provider, Duration::from_millis(2500), "1.1.1.1", "1.1.1.1").await;
        assert_eq!(a.ip, "1.1.1.1");
        assert_eq!(a.isp, UNAVAILABLE);
        assert_eq!(a.network, "AS13335 CLOUDFLARENET");
        assert!(a.nearest.distance_km.is_none());
        assert_eq!(provider.asn_keys.lock().unwrap().as_slice(), ["1.1.1.1"]);
    }

    #[tokio::test]
    async fn asn_stage_keyed_by_reported_ip() {
        let provider = StubProvider {
            geo: Some(GeoRecord {
                ip: Some("41.58.0.1".into()),
                latitude: Some(5.6),
                longitude: Some(-0.2),
                ..GeoRecord::default()
            }),
            asn: Some(bgp()),
            ..StubProvider::default()
        };
        let a = attribute(&provider, Duration::from_secs(1), "10.0.0.1", "").await;
        assert_eq!(a.ip, "41.58.0.1");
        assert_eq!(a.nearest.server.name, "West Africa - Accra");
        assert_eq!(provider.asn_keys.lock().unwrap().as_slice(), ["41.58.0.1"]);
    }

    #[tokio::test]
    async fn empty_key_skips_asn_stage() {
        let provider = StubProvider::default();
        let a = attribute(&provider, Duration::from_secs(1), "", "").await;
        assert_eq!(a.ip, UNAVAILABLE);
        assert_eq!(a.network, UNAVAILABLE);
        assert!(provider.asn_keys.lock().unwrap().is_empty());
    }

    #[test]
    fn endpoint_escapes_segments() {
        let url = endpoint("https://ipwho.is", &["2001:db8::1"]).unwrap();
        assert_eq!(url.as_str(), "https://ipwho.is/2001:db8::1");
        let url = endpoint("https://api.bgpview.io/", &["ip", "8.8.8.8"]).unwrap();
        assert_eq!(url.as_str(), "https://api.bgpview.io/ip/8.8.8.8");
        let url = endpoint("https://ipwho.is", &[""]).unwrap();
        assert_eq!(url.as_str(), "https://ipwho.is/");
        assert!(endpoint("not a url", &["x"]).is_none());
    }
}
