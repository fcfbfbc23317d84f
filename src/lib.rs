//! In-process diagnostic capture.
//!
//! Records console output, uncaught errors and network traffic of a host
//! execution context into bounded, deduplicating in-memory stores.

pub mod capture;
pub mod config;
pub mod host;
pub mod observability;
pub mod store;
pub mod util;

pub use capture::{Capture, LogRecord, NetworkRecord};
pub use config::CaptureConfig;
pub use host::Host;
