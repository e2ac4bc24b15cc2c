//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Supervisor, execution, bridge:
//!     → logging.rs (structured log events)
//!     → metrics.rs (counters, gauges, histograms)
//!
//! Consumers:
//!     → stdout (pretty or JSON lines)
//!     → rpc/metrics Prometheus scrape endpoint
//! ```
//!
//! # Design Decisions
//! - Metric helpers are free functions; with no recorder installed they are no-ops
//! - Log level from config, overridden by `RUST_LOG`, overridden by the CLI

pub mod logging;
pub mod metrics;
