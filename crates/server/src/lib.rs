//! Coordination server: the WebSocket connection hub and HTTP read
//! surface fronting [`swarm_core`]'s per-project actors.
//!
//! ```text
//! ┌───────────────────────┐
//! │  GET /ws/:project_id   │ <- connection hub (C3), bidirectional frames
//! ├───────────────────────┤
//! │  GET /api/...          │ <- read-only HTTP surface, OpenAPI documented
//! ├───────────────────────┤
//! │   ProjectRegistry      │ <- swarm-core: spawns/idles project actors
//! └───────────────────────┘
//! ```

pub mod middleware;
pub mod openapi;
pub mod routes;
pub mod state;
pub mod ws;

pub use state::AppState;

use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/ws/:project_id", axum::routing::get(ws::websocket_handler))
        .merge(routes::http::router())
        .merge(openapi::swagger_router())
        .layer(axum::middleware::from_fn(middleware::logging::logging_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
