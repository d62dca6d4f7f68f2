//! `POST /api/upload`: count and time a raw request body.

use axum::body::Body;
use axum::extract::State;
use axum::http::{header, HeaderMap};
use axum::Json;

use pathgauge_common::models::UploadReceipt;

use crate::api::ApiError;
use crate::sink::{self, SinkError};
use crate::state::AppState;

pub async fn handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Body,
) -> Result<Json<UploadReceipt>, ApiError> {
    let limit = state.upload_limit_bytes();

    let declared = headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok());
    if let (Some(limit), Some(declared)) = (limit, declared) {
        if declared > limit {
            tracing::info!(declared, limit, "upload rejected by declared length");
            return Err(ApiError::payload_too_large(format!(
                "upload exceeds limit of {limit} bytes"
            )));
        }
    }

    match sink::receive(body.into_data_stream(), limit).await {
        Ok(receipt) => {
            tracing::debug!(
                bytes = receipt.bytes,
                duration_ms = receipt.duration_ms,
                "upload received"
            );
            Ok(Json(receipt))
        }
        Err(e @ SinkError::TooLarge { .. }) => {
            tracing::info!(error = %e, "upload rejected mid-stream");
            Err(ApiError::payload_too_large(e.to_string()))
        }
        Err(e @ SinkError::Stream { .. }) => {
            tracing::warn!(error = %e, "upload failed");
            Err(ApiError::internal("upload_failed"))
        }
    }
}
