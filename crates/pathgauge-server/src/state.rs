//! Shared application state.
//!
//! Everything here is read-only after startup; per-request counters live in
//! the handlers themselves.

use std::sync::Arc;
use std::time::Duration;

use pathgauge_common::config::{AttributionConfig, ServerConfig};

use crate::attribution::AttributionProvider;

/// State shared across all request handlers.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<Inner>,
}

struct Inner {
    upload_limit_bytes: Option<u64>,
    lookup_timeout: Duration,
    attribution: Arc<dyn AttributionProvider>,
}

impl AppState {
    pub fn new(
        server: &ServerConfig,
        attribution: &AttributionConfig,
        provider: Arc<dyn AttributionProvider>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                upload_limit_bytes: server.upload_limit_bytes,
                lookup_timeout: attribution.timeout,
                attribution: provider,
            }),
        }
    }

    /// Largest accepted upload body, if limited.
    pub fn upload_limit_bytes(&self) -> Option<u64> {
        self.inner.upload_limit_bytes
    }

    /// Ceiling for each external lookup stage.
    pub fn lookup_timeout(&self) -> Duration {
        self.inner.lookup_timeout
    }

    pub fn attribution(&self) -> &dyn AttributionProvider {
        self.inner.attribution.as_ref()
    }
}
