//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, middleware stack)
//!     → middleware/admission.rs (shutdown gate, rate limit)
//!     → handlers.rs
//!     → response.rs (JSON error envelope)
//!     → Send to client
//! ```

pub mod handlers;
pub mod middleware;
pub mod response;
pub mod server;

pub use server::{AppState, HttpServer};
