//! Observability setup for Runlet: tracing subscriber initialization with
//! optional OpenTelemetry trace export.

pub mod tracing_setup;
