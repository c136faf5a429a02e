//! HTTP server setup.
//!
//! # Responsibilities
//! - Create the Axum router with every handler
//! - Wire up middleware (request ID, tracing, metrics, panic recovery,
//!   CORS, timeout, admission)
//! - Serve until the shutdown handle reports draining, then finish
//!   in-flight requests

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::http::{header, HeaderValue, Method};
use axum::routing::get;
use axum::{middleware, Router};
use tokio::net::TcpListener;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::app::Application;
use crate::config::CorsConfig;
use crate::http::handlers;
use crate::http::middleware::{admission_middleware, request_metrics};
use crate::http::response;
use crate::lifecycle::ShutdownHandle;

/// Application state injected into handlers.
pub type AppState = Arc<Application>;

pub struct HttpServer {
    router: Router,
}

impl HttpServer {
    pub fn new(app: AppState) -> Self {
        Self {
            router: build_router(app),
        }
    }

    /// Serve an externally assembled router.
    pub fn with_router(router: Router) -> Self {
        Self { router }
    }

    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Accept connections until `shutdown` starts draining, then wait for
    /// open connections to finish their requests.
    pub async fn serve(self, listener: TcpListener, shutdown: ShutdownHandle) -> io::Result<()> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();
        axum::serve(listener, app)
            .with_graceful_shutdown(async move { shutdown.draining().await })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Build the router. Each `.layer` wraps everything above it, so a request
/// passes request-id → trace → metrics → panic recovery → CORS → timeout →
/// admission → handler.
#[allow(deprecated)]
pub fn build_router(app: AppState) -> Router {
    let timeout = Duration::from_secs(app.config().server.request_timeout_secs);
    let cors = cors_layer(&app.config().cors);

    Router::new()
        .route("/v1/healthcheck", get(handlers::healthcheck))
        .route("/debug/vars", get(handlers::debug_vars))
        .fallback(handlers::not_found)
        .layer(middleware::from_fn_with_state(app.clone(), admission_middleware))
        .layer(TimeoutLayer::new(timeout))
        .layer(cors)
        .layer(CatchPanicLayer::custom(response::panic_response))
        .layer(middleware::from_fn(request_metrics))
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(TraceLayer::new_for_http())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .with_state(app)
}

fn cors_layer(config: &CorsConfig) -> CorsLayer {
    let origins: Vec<HeaderValue> = config
        .trusted_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "Ignoring unusable CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::OPTIONS, Method::PUT, Method::PATCH, Method::DELETE])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
}
