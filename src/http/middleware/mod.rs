//! Request middleware.

pub mod admission;
pub mod metrics;

pub use admission::admission_middleware;
pub use metrics::request_metrics;
