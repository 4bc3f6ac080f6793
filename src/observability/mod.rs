//! Observability: logging setup and metrics.

pub mod logging;
pub mod metrics;

pub use logging::{LogFormat, init_logging, init_test_logging};
pub use metrics::init_metrics;
