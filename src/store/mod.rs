//! Record storage subsystem.
//!
//! # Data Flow
//! ```text
//! capture layer
//!     → id.rs (EventId per record)
//!     → bounded.rs (append / merge / update in place, FIFO eviction)
//!     → StoreEvent broadcast
//!     → rendering layer re-reads a Snapshot through its StoreHandle
//! ```

pub mod bounded;
pub mod id;

pub use bounded::{BoundedEventStore, Record, Snapshot, StoreEvent, StoreHandle, DEFAULT_CAPACITY};
pub use id::{now_millis, EventId, IdGenerator};
