//! JSON error responses.
//!
//! Every error leaves the server as `{"error": <message>}` with a matching
//! status code.

use std::any::Any;

use axum::body::Body;
use axum::http::{header, HeaderValue, Response, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;

use crate::observability::panic_message;

pub const RATE_LIMIT_EXCEEDED: &str = "rate limit exceeded";
pub const SHUTTING_DOWN: &str = "the server is shutting down and not accepting new requests";
pub const SERVER_ERROR: &str = "the server encountered a problem and could not process your request";
pub const NOT_FOUND: &str = "the requested resource could not be found";

pub fn error_response(status: StatusCode, message: &str) -> Response<Body> {
    (status, Json(json!({ "error": message }))).into_response()
}

pub fn rate_limit_exceeded() -> Response<Body> {
    error_response(StatusCode::TOO_MANY_REQUESTS, RATE_LIMIT_EXCEEDED)
}

/// 503 telling the client to reconnect elsewhere.
pub fn shutting_down() -> Response<Body> {
    close_connection(error_response(StatusCode::SERVICE_UNAVAILABLE, SHUTTING_DOWN))
}

pub fn server_error() -> Response<Body> {
    error_response(StatusCode::INTERNAL_SERVER_ERROR, SERVER_ERROR)
}

pub fn not_found() -> Response<Body> {
    error_response(StatusCode::NOT_FOUND, NOT_FOUND)
}

/// Turn a handler panic into a 500 and drop the connection.
pub fn panic_response(payload: Box<dyn Any + Send + 'static>) -> Response<Body> {
    let detail = panic_message(payload.as_ref());
    tracing::error!(panic = %detail, "Handler panicked");

    close_connection(server_error())
}

fn close_connection(mut response: Response<Body>) -> Response<Body> {
    response
        .headers_mut()
        .insert(header::CONNECTION, HeaderValue::from_static("close"));
    response
}
