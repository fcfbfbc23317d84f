//! The process-wide logging surface.
//!
//! # Responsibilities
//! - Hold one swappable binding per severity
//! - Dispatch application log calls to the current binding
//! - Provide tracing-backed default bindings
//!
//! # Design Decisions
//! - Bindings are `Arc<ConsoleMethod>` inside `ArcSwap`: calls never block
//!   behind an install, and identity is observable via `Arc::ptr_eq`
//! - Whoever swaps a binding is responsible for putting the previous one back

use arc_swap::ArcSwap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

/// Severity of a console call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Log,
    Info,
    Warn,
    Error,
    Debug,
}

impl LogLevel {
    pub const ALL: [LogLevel; 5] = [
        LogLevel::Log,
        LogLevel::Info,
        LogLevel::Warn,
        LogLevel::Error,
        LogLevel::Debug,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Log => "log",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
            LogLevel::Debug => "debug",
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A bound logging function.
pub struct ConsoleMethod {
    f: Box<dyn Fn(&[Value]) + Send + Sync>,
}

impl ConsoleMethod {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&[Value]) + Send + Sync + 'static,
    {
        Self { f: Box::new(f) }
    }

    pub fn call(&self, args: &[Value]) {
        (self.f)(args)
    }
}

impl std::fmt::Debug for ConsoleMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ConsoleMethod")
    }
}

/// The five logging bindings of a host.
pub struct Console {
    methods: [ArcSwap<ConsoleMethod>; 5],
}

impl Console {
    /// Console whose bindings forward to `tracing`.
    pub fn new() -> Self {
        Self {
            methods: LogLevel::ALL.map(|level| ArcSwap::new(Arc::new(tracing_method(level)))),
        }
    }

    /// Console whose bindings discard everything.
    pub fn silent() -> Self {
        Self {
            methods: LogLevel::ALL.map(|_| ArcSwap::new(Arc::new(ConsoleMethod::new(|_| {})))),
        }
    }

    /// Call the binding for `level`.
    pub fn call(&self, level: LogLevel, args: &[Value]) {
        let method = self.methods[level.index()].load_full();
        method.call(args);
    }

    pub fn log(&self, args: &[Value]) {
        self.call(LogLevel::Log, args)
    }

    pub fn info(&self, args: &[Value]) {
        self.call(LogLevel::Info, args)
    }

    pub fn warn(&self, args: &[Value]) {
        self.call(LogLevel::Warn, args)
    }

    pub fn error(&self, args: &[Value]) {
        self.call(LogLevel::Error, args)
    }

    pub fn debug(&self, args: &[Value]) {
        self.call(LogLevel::Debug, args)
    }

    /// Current binding for `level`.
    pub fn method(&self, level: LogLevel) -> Arc<ConsoleMethod> {
        self.methods[level.index()].load_full()
    }

    /// Bind `method` to `level`, returning the previous binding.
    pub fn replace(&self, level: LogLevel, method: Arc<ConsoleMethod>) -> Arc<ConsoleMethod> {
        self.methods[level.index()].swap(method)
    }
}

impl Default for Console {
    fn default() -> Self {
        Self::new()
    }
}

fn tracing_method(level: LogLevel) -> ConsoleMethod {
    match level {
        LogLevel::Log | LogLevel::Info => ConsoleMethod::new(|args| {
            tracing::info!(target: "console", "{}", render_args(args))
        }),
        LogLevel::Warn => ConsoleMethod::new(|args| {
            tracing::warn!(target: "console", "{}", render_args(args))
        }),
        LogLevel::Error => ConsoleMethod::new(|args| {
            tracing::error!(target: "console", "{}", render_args(args))
        }),
        LogLevel::Debug => ConsoleMethod::new(|args| {
            tracing::debug!(target: "console", "{}", render_args(args))
        }),
    }
}

/// Render console arguments the way a terminal console prints them:
/// strings verbatim, everything else as JSON, separated by spaces.
pub fn render_args(args: &[Value]) -> String {
    args.iter()
        .map(|arg| match arg {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Mutex;

    #[test]
    fn test_replace_returns_previous_binding() {
        let console = Console::silent();
        let original = console.method(LogLevel::Warn);

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let previous = console.replace(
            LogLevel::Warn,
            Arc::new(ConsoleMethod::new(move |args| {
                sink.lock().unwrap().extend_from_slice(args)
            })),
        );
        assert!(Arc::ptr_eq(&previous, &original));

        console.warn(&[json!("careful")]);
        console.log(&[json!("elsewhere")]);
        assert_eq!(*seen.lock().unwrap(), vec![json!("careful")]);

        console.replace(LogLevel::Warn, previous);
        assert!(Arc::ptr_eq(&console.method(LogLevel::Warn), &original));
    }

    #[test]
    fn test_render_args() {
        assert_eq!(
            render_args(&[json!("count:"), json!(3), json!({"a": [1]})]),
            r#"count: 3 {"a":[1]}"#
        );
        assert_eq!(render_args(&[]), "");
    }

    #[test]
    fn test_level_serde() {
        assert_eq!(serde_json::to_string(&LogLevel::Warn).unwrap(), "\"warn\"");
        assert_eq!(LogLevel::ALL.len(), 5);
    }
}
