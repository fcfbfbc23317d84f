//! Console capture.
//!
//! # Responsibilities
//! - Wrap the host's five console bindings so every call is also recorded
//! - Record uncaught errors and unhandled rejections as error entries
//! - Fold consecutive identical entries into one record with a repeat count
//! - Run interactive expressions when an evaluator is configured
//!
//! # Data Flow
//! ```text
//! host.console().warn(args)
//!     → wrapper
//!         → original binding (output unchanged)
//!         → LogRecorder::record(Warn, args)
//!             → store.append_or_merge(..)
//! ```
//!
//! # Design Decisions
//! - The original binding always runs first, so application output is
//!   never lost even if recording misbehaves
//! - A thread-local flag stops a console call made while recording from
//!   being recorded again
//! - Uninstall puts the exact pre-install bindings back and is idempotent

use serde_json::{json, Value};
use std::cell::Cell;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, warn};

use crate::capture::error::EvaluationError;
use crate::capture::eval::Evaluator;
use crate::capture::records::LogRecord;
use crate::host::{ConsoleMethod, ErrorKind, Host, ListenerId, LogLevel, RuntimeError};
use crate::observability::metrics;
use crate::store::{BoundedEventStore, IdGenerator, StoreHandle};

thread_local! {
    static RECORDING: Cell<bool> = const { Cell::new(false) };
}

/// Marks the current thread as recording for its lifetime.
struct ReentryGuard;

impl ReentryGuard {
    fn enter() -> Option<Self> {
        RECORDING.with(|flag| {
            if flag.replace(true) {
                None
            } else {
                Some(ReentryGuard)
            }
        })
    }
}

impl Drop for ReentryGuard {
    fn drop(&mut self) {
        RECORDING.with(|flag| flag.set(false));
    }
}

/// Appends log records with consecutive-duplicate folding.
#[derive(Clone)]
pub struct LogRecorder {
    store: BoundedEventStore<LogRecord>,
    ids: IdGenerator,
}

impl LogRecorder {
    pub fn new(capacity: usize) -> Self {
        Self {
            store: BoundedEventStore::new("logs", capacity),
            ids: IdGenerator::new(),
        }
    }

    /// Record one entry. Returns true when it was folded into the previous
    /// record instead of appended.
    pub fn record(&self, level: LogLevel, content: Vec<Value>) -> bool {
        let candidate = LogRecord::new(self.ids.next(), level, content);
        let merged = self.store.append_or_merge(candidate, |last, candidate| {
            if last.same_entry(candidate) {
                last.repeated = last.repeated.saturating_add(1);
                true
            } else {
                false
            }
        });
        if merged {
            metrics::record_log_repeat();
        }
        merged
    }

    pub fn store(&self) -> &BoundedEventStore<LogRecord> {
        &self.store
    }
}

struct SavedBinding {
    level: LogLevel,
    original: Arc<ConsoleMethod>,
    wrapper: Arc<ConsoleMethod>,
}

#[derive(Default)]
struct InstallState {
    bindings: Vec<SavedBinding>,
    listeners: Vec<ListenerId>,
}

/// Intercepts a host's console and error channels.
pub struct ConsoleCapture {
    host: Host,
    recorder: LogRecorder,
    evaluator: Option<Arc<dyn Evaluator>>,
    state: Mutex<Option<InstallState>>,
}

impl ConsoleCapture {
    pub fn new(host: Host, capacity: usize) -> Self {
        Self {
            host,
            recorder: LogRecorder::new(capacity),
            evaluator: None,
            state: Mutex::new(None),
        }
    }

    /// Enable `execute` with the given evaluator.
    pub fn with_evaluator(mut self, evaluator: Arc<dyn Evaluator>) -> Self {
        self.evaluator = Some(evaluator);
        self
    }

    /// Start intercepting. Returns false if already installed.
    pub fn install(&self) -> bool {
        let mut state = self.state();
        if state.is_some() {
            debug!("Console capture already installed");
            return false;
        }

        let console = self.host.console();
        let mut installed = InstallState::default();

        for level in LogLevel::ALL {
            let original = console.method(level);
            let wrapper = Arc::new(self.wrap(level, original.clone()));
            let replaced = console.replace(level, wrapper.clone());
            installed.bindings.push(SavedBinding {
                level,
                original: replaced,
                wrapper,
            });
        }

        let events = self.host.events();
        let recorder = self.recorder.clone();
        installed
            .listeners
            .push(events.add_listener(ErrorKind::Uncaught, move |error| {
                if let RuntimeError::Uncaught { message, error } = error {
                    let value = match error {
                        Some(error) if !error.is_null() => error.clone(),
                        _ => json!(message),
                    };
                    recorder.record(LogLevel::Error, vec![value]);
                }
            }));

        let recorder = self.recorder.clone();
        installed.listeners.push(events.add_listener(
            ErrorKind::UnhandledRejection,
            move |error| {
                if let RuntimeError::UnhandledRejection { reason } = error {
                    recorder.record(
                        LogLevel::Error,
                        vec![json!("Unhandled Promise Rejection:"), reason.clone()],
                    );
                }
            },
        ));

        *state = Some(installed);
        debug!("Console capture installed");
        true
    }

    /// Stop intercepting and restore the original bindings. Returns false
    /// if capture was not installed.
    pub fn uninstall(&self) -> bool {
        let Some(installed) = self.state().take() else {
            return false;
        };

        let console = self.host.console();
        for saved in installed.bindings {
            let current = console.replace(saved.level, saved.original);
            if !Arc::ptr_eq(&current, &saved.wrapper) {
                warn!(
                    level = %saved.level,
                    "Console binding was replaced while captured; restoring original anyway"
                );
            }
        }

        let events = self.host.events();
        for id in installed.listeners {
            events.remove_listener(id);
        }

        debug!("Console capture uninstalled");
        true
    }

    pub fn is_installed(&self) -> bool {
        self.state().is_some()
    }

    /// Record an entry directly, bypassing the console.
    pub fn record(&self, level: LogLevel, content: Vec<Value>) -> bool {
        self.recorder.record(level, content)
    }

    /// Evaluate `expression`, logging the input and its outcome.
    ///
    /// Fails with `EvaluationError::Disabled` when no evaluator is set.
    pub fn execute(&self, expression: &str) -> Result<Value, EvaluationError> {
        self.recorder
            .record(LogLevel::Log, vec![json!(">"), json!(expression)]);

        let outcome = match &self.evaluator {
            Some(evaluator) => evaluator.evaluate(expression),
            None => Err(EvaluationError::Disabled),
        };

        match &outcome {
            Ok(value) => {
                self.recorder.record(LogLevel::Log, vec![value.clone()]);
            }
            Err(e) => {
                warn!(expression = %expression, error = %e, "Evaluation failed");
                self.recorder
                    .record(LogLevel::Error, vec![json!(e.to_string())]);
            }
        }
        outcome
    }

    pub fn logs(&self) -> StoreHandle<LogRecord> {
        self.recorder.store().handle()
    }

    pub fn store(&self) -> &BoundedEventStore<LogRecord> {
        self.recorder.store()
    }

    fn wrap(&self, level: LogLevel, original: Arc<ConsoleMethod>) -> ConsoleMethod {
        let recorder = self.recorder.clone();
        ConsoleMethod::new(move |args| {
            original.call(args);
            if let Some(_guard) = ReentryGuard::enter() {
                recorder.record(level, args.to_vec());
            }
        })
    }

    fn state(&self) -> MutexGuard<'_, Option<InstallState>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for ConsoleCapture {
    fn drop(&mut self) {
        self.uninstall();
    }
}
