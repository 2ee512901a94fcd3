//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured tracing events, access/error log files)
//!     → metrics.rs (counters, gauges, histograms)
//!
//! Consumers:
//!     → stdout via tracing-subscriber
//!     → log files when `logging.log_in_file` is set
//!     → Metrics endpoint (Prometheus scrape) when enabled
//! ```
//!
//! # Design Decisions
//! - Request ID flows through every request log line
//! - Metrics are cheap (atomic increments)
//! - Log file failures never reach the response path

pub mod logging;
pub mod metrics;
