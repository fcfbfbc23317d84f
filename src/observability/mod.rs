//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! store + capture components produce:
//!     → logging.rs (tracing subscriber setup)
//!     → metrics.rs (counters, gauges via the metrics facade)
//! ```
//!
//! # Design Decisions
//! - Diagnostics about the capture layer itself go through `tracing`, never
//!   through the captured console, so they cannot feed back into the stores

pub mod logging;
pub mod metrics;
