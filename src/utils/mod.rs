//! # Utility Modules
//!
//! Supporting utilities for logging, metrics and timeouts.
//!
//! ## Components
//! - **Logging**: `tracing-subscriber` setup driven by `LoggingConfig`
//! - **Metrics**: Thread-safe observability counters
//! - **Timeout**: Async timeout wrappers mapping to `ProtocolError::Timeout`

pub mod logging;
pub mod metrics;
pub mod timeout;

pub use metrics::{Metrics, MetricsSnapshot};
