//! Configuration schema definitions.
//!
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

use crate::store::DEFAULT_CAPACITY;

/// Root configuration accepted at capture construction.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Maximum number of log records kept.
    #[serde(alias = "maxLogNumber")]
    pub max_log_number: usize,

    /// Maximum number of network records kept.
    #[serde(alias = "maxNetworkNumber")]
    pub max_network_number: usize,

    /// Console capture settings.
    pub console: ConsoleConfig,

    /// Network capture settings.
    pub network: NetworkConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            max_log_number: DEFAULT_CAPACITY,
            max_network_number: DEFAULT_CAPACITY,
            console: ConsoleConfig::default(),
            network: NetworkConfig::default(),
            observability: ObservabilityConfig::default(),
        }
    }
}

/// Console capture configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ConsoleConfig {
    /// Intercept the console bindings and error channels.
    pub enabled: bool,

    /// Allow interactive expression evaluation.
    ///
    /// Evaluation runs caller-supplied expressions against live state; keep
    /// it off unless the embedding application wants that trade-off.
    pub allow_execute: bool,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            allow_execute: false,
        }
    }
}

/// Network capture configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Intercept network primitives at all.
    pub enabled: bool,

    /// Intercept the callback-style transport.
    pub capture_callback: bool,

    /// Intercept the promise-style fetch primitive.
    pub capture_fetch: bool,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            capture_callback: true,
            capture_fetch: true,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Emit JSON log lines instead of plain text.
    pub json: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json: false,
        }
    }
}
