//! pathgauge server library.
//!
//! Re-exports the API router, shared state, and the streaming building
//! blocks so they can be used by integration tests and by the client's
//! end-to-end tests.

pub mod api;
pub mod attribution;
pub mod sink;
pub mod state;
pub mod stream;

use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::services::{ServeDir, ServeFile};
use tower_http::trace::TraceLayer;

/// Build the full application: `/api` plus an optional static front-end.
pub fn app(state: state::AppState, static_dir: Option<&str>) -> Router {
    let mut router = Router::new().nest("/api", api::router());

    if let Some(dir) = static_dir {
        let spa_fallback = ServeFile::new(format!("{dir}/index.html"));
        router = router.fallback_service(ServeDir::new(dir).not_found_service(spa_fallback));
    }

    router
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
