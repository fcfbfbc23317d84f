//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → CaptureConfig (validated, immutable)
//!     → Capture::new sizes the stores and enables capture paths
//! ```
//!
//! # Design Decisions
//! - Config is read once at construction; store capacities never change
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, parse_config, ConfigError};
pub use schema::{CaptureConfig, ConsoleConfig, NetworkConfig, ObservabilityConfig};
pub use validation::{validate_config, ValidationError};
