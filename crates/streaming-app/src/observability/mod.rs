//! Observability for streaming sessions.
//!
//! Structured logs go through `tracing`; counters and the delay histogram
//! go through the `metrics` facade (see [`metrics`]).

pub mod metrics;
