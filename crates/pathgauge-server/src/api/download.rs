//! `GET /api/download?size=<bytes>`: streamed filler body.
//!
//! The length is declared up front; a spawned [`FillerWriter`] feeds a small
//! bounded channel that the response body drains, so each connection applies
//! its own backpressure.

use axum::body::Body;
use axum::extract::Query;
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use crate::stream::{clamp_size, FillerWriter};

/// Chunks buffered per response before the writer pauses.
const BODY_BUFFER_CHUNKS: usize = 4;

#[derive(Debug, Deserialize)]
pub struct DownloadQuery {
    pub size: Option<String>,
}

pub async fn handler(Query(query): Query<DownloadQuery>) -> Response {
    let size = clamp_size(query.size.as_deref());

    let (tx, rx) = mpsc::channel(BODY_BUFFER_CHUNKS);
    tokio::spawn(async move {
        let written = FillerWriter::new(size).run(tx).await;
        tracing::trace!(size, written, "download stream finished");
    });

    (
        StatusCode::OK,
        [
            (
                header::CONTENT_TYPE,
                HeaderValue::from_static("application/octet-stream"),
            ),
            (header::CONTENT_LENGTH, HeaderValue::from(size)),
        ],
        Body::from_stream(ReceiverStream::new(rx)),
    )
        .into_response()
}
