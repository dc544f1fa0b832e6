//! Per-request tracing middleware, layered in addition to `TraceLayer`
//! so every request carries a correlation id through its logs.

use axum::{extract::Request, middleware::Next, response::Response};
use std::time::Instant;
use tracing::{error, info, instrument};
use uuid::Uuid;

#[instrument(skip(request, next))]
pub async fn logging_middleware(mut request: Request, next: Next) -> Response {
    let start = Instant::now();
    let request_id = Uuid::new_v4().to_string();
    let method = request.method().clone();
    let uri = request.uri().clone();

    request
        .headers_mut()
        .insert("x-request-id", request_id.parse().unwrap_or_else(|_| "invalid".parse().unwrap()));

    let response = next.run(request).await;
    let status = response.status();
    let duration_ms = start.elapsed().as_millis();

    if status.is_server_error() {
        error!(request_id = %request_id, %method, %uri, %status, duration_ms, "request failed");
    } else {
        info!(request_id = %request_id, %method, %uri, %status, duration_ms, "request completed");
    }

    response
}
