//! `GET /api/ping`: minimal round trip for latency probing.

use axum::Json;
use chrono::Utc;

use pathgauge_common::models::PingResponse;

pub async fn handler() -> Json<PingResponse> {
    Json(PingResponse {
        t: Utc::now().timestamp_millis(),
    })
}
