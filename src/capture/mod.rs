//! Diagnostic capture.
//!
//! # Responsibilities
//! - Build console and network capture from a `CaptureConfig`
//! - Install and uninstall them together
//! - Expose read-only handles to the two record stores
//!
//! # Data Flow
//! ```text
//! Capture::new(host, config)
//!     → ConsoleCapture  → LogRecorder      → BoundedEventStore<LogRecord>
//!     → NetworkCapture  → NetworkRecorder  → BoundedEventStore<NetworkRecord>
//!
//! Capture::install()
//!     → console bindings + error listeners   (if console.enabled)
//!     → fetch layer / transport wrapper      (if network.enabled, per path)
//! ```

pub mod console;
pub mod error;
pub mod eval;
pub mod fetch;
pub mod headers;
pub mod network;
pub mod records;
pub mod transport;

use serde_json::Value;
use std::sync::Arc;
use tracing::info;

use crate::config::CaptureConfig;
use crate::host::Host;
use crate::store::StoreHandle;

pub use console::{ConsoleCapture, LogRecorder};
pub use error::{CaptureError, EvaluationError};
pub use eval::{Evaluator, Scope, ScopeEvaluator};
pub use fetch::{FetchCapture, FetchCaptureLayer};
pub use headers::{headers_from_map, normalize_headers, parse_header_blob, HeaderList};
pub use network::{NetworkCapture, NetworkRecorder};
pub use records::{Completion, LogRecord, Method, NetworkRecord, PendingRequest, RequestState};
pub use transport::{CapturedTransport, CapturedTransportFactory};

/// Console and network capture for one host.
pub struct Capture {
    config: CaptureConfig,
    console: ConsoleCapture,
    network: NetworkCapture,
}

impl Capture {
    /// Build capture for `host`. Nothing is intercepted until `install`.
    ///
    /// With `console.allow_execute` set, `execute` evaluates against a
    /// fresh `Scope`.
    pub fn new(host: Host, config: CaptureConfig) -> Self {
        let mut console = ConsoleCapture::new(host.clone(), config.max_log_number);
        if config.console.allow_execute {
            console = console.with_evaluator(Arc::new(ScopeEvaluator::default()));
        }
        let network = NetworkCapture::new(host, config.max_network_number);
        Self {
            config,
            console,
            network,
        }
    }

    /// Evaluate `execute` input with `evaluator`, regardless of
    /// `console.allow_execute`.
    pub fn with_evaluator(mut self, evaluator: Arc<dyn Evaluator>) -> Self {
        self.console = self.console.with_evaluator(evaluator);
        self
    }

    /// Start intercepting whatever the configuration enables.
    pub fn install(&self) {
        if self.config.console.enabled {
            self.console.install();
        }
        if self.config.network.enabled {
            if self.config.network.capture_fetch {
                if let Err(e) = self.network.install_fetch() {
                    tracing::debug!(error = %e, "Network capture path skipped");
                }
            }
            if self.config.network.capture_callback {
                if let Err(e) = self.network.install_transport() {
                    tracing::debug!(error = %e, "Network capture path skipped");
                }
            }
        }
        info!(
            console = self.console.is_installed(),
            network = self.network.is_installed(),
            "Capture installed"
        );
    }

    /// Stop intercepting and restore the host. Safe to call repeatedly.
    pub fn uninstall(&self) {
        self.console.uninstall();
        self.network.uninstall();
    }

    pub fn logs(&self) -> StoreHandle<LogRecord> {
        self.console.logs()
    }

    pub fn network(&self) -> StoreHandle<NetworkRecord> {
        self.network.records()
    }

    pub fn execute(&self, expression: &str) -> Result<Value, EvaluationError> {
        self.console.execute(expression)
    }

    pub fn console_capture(&self) -> &ConsoleCapture {
        &self.console
    }

    pub fn network_capture(&self) -> &NetworkCapture {
        &self.network
    }

    pub fn config(&self) -> &CaptureConfig {
        &self.config
    }
}
