//! Admission control: shutdown gate, then per-client rate limit.

use std::net::SocketAddr;

use axum::body::Body;
use axum::extract::{ConnectInfo, State};
use axum::http::Request;
use axum::middleware::Next;
use axum::response::Response;

use crate::http::response;
use crate::http::server::AppState;
use crate::observability::metrics;

/// Reject with 503 once draining has begun, with 429 when the client has no
/// tokens left; otherwise count the request as in flight and run it.
///
/// The shutdown check comes first so a draining server never spends a
/// client's token.
pub async fn admission_middleware(
    State(app): State<AppState>,
    ConnectInfo(remote): ConnectInfo<SocketAddr>,
    request: Request<Body>,
    next: Next,
) -> Response {
    if !app.shutdown().is_accepting() {
        metrics::record_admission_rejected("shutting_down");
        return response::shutting_down();
    }

    let client = remote.ip().to_string();
    if !app.limiter().allow(&client) {
        tracing::debug!(client = %client, path = %request.uri().path(), "Rate limit exceeded");
        metrics::record_admission_rejected("rate_limited");
        return response::rate_limit_exceeded();
    }

    let _in_flight = app.track_request();
    next.run(request).await
}
