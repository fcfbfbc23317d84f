//! The hosting execution context.
//!
//! # Data Flow
//! ```text
//! application code
//!     → host.console().log(..)        (console.rs bindings)
//!     → host.events().report_error(..) (events.rs channels)
//!     → host.fetch(..) / host.new_transport()  (network.rs primitives)
//!
//! capture layer swaps the bindings in place; application code keeps
//! calling through the host and never sees the difference
//! ```
//!
//! # Design Decisions
//! - `Host` is a cheap handle (`Arc` inside); clones share every binding
//! - `Host::global()` is the process-wide context; separate instances exist
//!   for embedding and tests
//! - Either network primitive may be absent

pub mod console;
pub mod events;
pub mod native;
pub mod network;

use futures_util::future::{self, FutureExt};
use std::sync::{Arc, OnceLock, PoisonError, RwLock};

pub use console::{Console, ConsoleMethod, LogLevel};
pub use events::{ErrorKind, GlobalEvents, ListenerId, RuntimeError};
pub use native::{HyperFetch, HyperTransport, HyperTransportFactory};
pub use network::{
    BodyError, CallbackTransport, Fetch, FetchError, FetchFuture, FetchHandle, FetchInput,
    FetchRequest, FetchResponse, HeaderSource, Payload, ReadyStateCallback, RequestInit, Resource,
    TransportFactory, TransportPhase, TransportState,
};

struct HostInner {
    console: Console,
    events: GlobalEvents,
    fetch: RwLock<Option<Arc<dyn Fetch>>>,
    transports: RwLock<Option<Arc<dyn TransportFactory>>>,
}

/// Handle to one execution context's environment surfaces.
#[derive(Clone)]
pub struct Host {
    inner: Arc<HostInner>,
}

static GLOBAL: OnceLock<Host> = OnceLock::new();

impl Host {
    /// Host with tracing-backed console bindings and no network primitives.
    pub fn new() -> Self {
        Self::with_console(Console::new())
    }

    /// Host whose console discards output.
    pub fn silent() -> Self {
        Self::with_console(Console::silent())
    }

    fn with_console(console: Console) -> Self {
        Self {
            inner: Arc::new(HostInner {
                console,
                events: GlobalEvents::new(),
                fetch: RwLock::new(None),
                transports: RwLock::new(None),
            }),
        }
    }

    /// Host with both primitives backed by a real HTTP client.
    ///
    /// Must be called from within a tokio runtime.
    pub fn with_http() -> Result<Self, tokio::runtime::TryCurrentError> {
        let factory = HyperTransportFactory::new()?;
        Ok(Self::new()
            .with_fetch(Arc::new(HyperFetch::new()))
            .with_transport_factory(Arc::new(factory)))
    }

    /// The process-wide host.
    pub fn global() -> &'static Host {
        GLOBAL.get_or_init(Host::new)
    }

    pub fn with_fetch(self, fetch: Arc<dyn Fetch>) -> Self {
        self.replace_fetch(Some(fetch));
        self
    }

    pub fn with_transport_factory(self, factory: Arc<dyn TransportFactory>) -> Self {
        self.replace_transport_factory(Some(factory));
        self
    }

    pub fn console(&self) -> &Console {
        &self.inner.console
    }

    pub fn events(&self) -> &GlobalEvents {
        &self.inner.events
    }

    /// Currently bound promise-style primitive.
    pub fn fetch_primitive(&self) -> Option<Arc<dyn Fetch>> {
        self.inner
            .fetch
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Bind a promise-style primitive, returning the previous binding.
    pub fn replace_fetch(&self, fetch: Option<Arc<dyn Fetch>>) -> Option<Arc<dyn Fetch>> {
        let mut slot = self
            .inner
            .fetch
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        std::mem::replace(&mut *slot, fetch)
    }

    /// Currently bound callback-style transport constructor.
    pub fn transport_factory(&self) -> Option<Arc<dyn TransportFactory>> {
        self.inner
            .transports
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Bind a transport constructor, returning the previous binding.
    pub fn replace_transport_factory(
        &self,
        factory: Option<Arc<dyn TransportFactory>>,
    ) -> Option<Arc<dyn TransportFactory>> {
        let mut slot = self
            .inner
            .transports
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        std::mem::replace(&mut *slot, factory)
    }

    /// Issue a promise-style request through the current binding.
    ///
    /// The binding sees the request before this returns; only the response
    /// is deferred to the returned future.
    pub fn fetch(&self, request: FetchRequest) -> FetchFuture {
        match self.fetch_primitive() {
            Some(fetch) => fetch.fetch(request),
            None => future::ready(Err(FetchError::msg(
                "fetch is not available in this context",
            )))
            .boxed(),
        }
    }

    /// Construct a callback-style transport, if the host has one.
    pub fn new_transport(&self) -> Option<Box<dyn CallbackTransport>> {
        self.transport_factory().map(|factory| factory.create())
    }
}

impl Default for Host {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fetch_without_primitive_rejects() {
        let host = Host::silent();
        assert!(host.fetch_primitive().is_none());
        assert!(host.new_transport().is_none());

        let err = host.fetch(FetchRequest::get("/a")).await.unwrap_err();
        assert_eq!(err.message(), "fetch is not available in this context");
    }

    #[tokio::test]
    async fn test_replace_fetch_returns_previous() {
        let first: Arc<dyn Fetch> = Arc::new(tower::service_fn(|_req: FetchRequest| async {
            Ok::<_, FetchError>(FetchResponse::new(201))
        }));
        let host = Host::silent().with_fetch(first.clone());

        let response = host.fetch(FetchRequest::get("/a")).await.unwrap();
        assert_eq!(response.status(), 201);

        let previous = host.replace_fetch(None).unwrap();
        assert!(Arc::ptr_eq(&previous, &first));
        assert!(host.fetch_primitive().is_none());
    }

    #[test]
    fn test_global_is_shared() {
        assert!(std::ptr::eq(Host::global(), Host::global()));
        assert!(Arc::ptr_eq(&Host::global().inner, &Host::global().clone().inner));
    }
}
