//! HTTP request handlers for the sync trigger.

pub mod health;
pub mod metrics;
pub mod sync;

pub use health::health_check;
pub use metrics::metrics_handler;
pub use sync::trigger_sync;
