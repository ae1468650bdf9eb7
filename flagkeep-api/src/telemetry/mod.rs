//! flagkeep Telemetry - Logging Infrastructure
//!
//! Installs the `tracing` subscriber used by the binary. HTTP request spans
//! come from `tower_http::trace::TraceLayer` in the router.

pub mod tracer;

pub use tracer::{init_tracing, TelemetryConfig, DEFAULT_FILTER};
