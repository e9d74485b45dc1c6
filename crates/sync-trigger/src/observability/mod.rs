//! Observability module for the sync trigger.
//!
//! Provides metrics definitions and the Prometheus recorder.

pub mod metrics;
