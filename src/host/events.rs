//! Global runtime error channels.
//!
//! # Responsibilities
//! - Register and remove listeners for uncaught errors and unhandled
//!   rejections
//! - Deliver reported errors to every listener of the matching kind
//!
//! # Design Decisions
//! - Listeners run outside the registry lock, so a listener may add or
//!   remove listeners itself
//! - Removing an unknown listener returns false instead of failing

use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Which channel a listener observes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Errors that escaped synchronous code.
    Uncaught,
    /// Asynchronous failures nobody handled.
    UnhandledRejection,
}

/// An error reported to the host.
#[derive(Debug, Clone, PartialEq)]
pub enum RuntimeError {
    Uncaught {
        message: String,
        /// The error value itself, when the reporter has one.
        error: Option<Value>,
    },
    UnhandledRejection {
        reason: Value,
    },
}

impl RuntimeError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RuntimeError::Uncaught { .. } => ErrorKind::Uncaught,
            RuntimeError::UnhandledRejection { .. } => ErrorKind::UnhandledRejection,
        }
    }
}

/// Handle returned by `add_listener`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Listener = Arc<dyn Fn(&RuntimeError) + Send + Sync>;

/// Listener registry for the two error channels.
pub struct GlobalEvents {
    next_id: AtomicU64,
    listeners: Mutex<Vec<(ListenerId, ErrorKind, Listener)>>,
}

impl GlobalEvents {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            listeners: Mutex::new(Vec::new()),
        }
    }

    /// Register `listener` for errors of `kind`.
    pub fn add_listener<F>(&self, kind: ErrorKind, listener: F) -> ListenerId
    where
        F: Fn(&RuntimeError) + Send + Sync + 'static,
    {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.registry().push((id, kind, Arc::new(listener)));
        id
    }

    /// Remove a listener. Returns false if it was not registered.
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        let mut listeners = self.registry();
        let before = listeners.len();
        listeners.retain(|(existing, _, _)| *existing != id);
        listeners.len() != before
    }

    pub fn listener_count(&self) -> usize {
        self.registry().len()
    }

    /// Report an error that escaped synchronous code.
    pub fn report_error(&self, message: impl Into<String>, error: Option<Value>) {
        self.dispatch(&RuntimeError::Uncaught {
            message: message.into(),
            error,
        });
    }

    /// Report an asynchronous failure nobody handled.
    pub fn report_rejection(&self, reason: Value) {
        self.dispatch(&RuntimeError::UnhandledRejection { reason });
    }

    /// Deliver `error` to every listener of its kind.
    pub fn dispatch(&self, error: &RuntimeError) {
        let kind = error.kind();
        let targets: Vec<Listener> = self
            .registry()
            .iter()
            .filter(|(_, k, _)| *k == kind)
            .map(|(_, _, listener)| listener.clone())
            .collect();

        for listener in targets {
            listener(error);
        }
    }

    fn registry(&self) -> MutexGuard<'_, Vec<(ListenerId, ErrorKind, Listener)>> {
        self.listeners.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for GlobalEvents {
    fn default() -> Self {
        Self::new()
    }
}
