//! Network capture.
//!
//! # Responsibilities
//! - `NetworkRecorder`: open pending records and complete them by id
//! - `NetworkCapture`: swap the host's network primitives for capturing
//!   versions and put the originals back on uninstall
//!
//! # Design Decisions
//! - A missing primitive skips that path; the other one still installs
//! - A completion whose record is gone (evicted or cleared) is dropped and
//!   counted, never re-inserted
//! - Each path is installed at most once

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tower::Layer;
use tracing::{debug, warn};

use crate::capture::error::CaptureError;
use crate::capture::fetch::FetchCaptureLayer;
use crate::capture::records::{Completion, NetworkRecord, PendingRequest};
use crate::capture::transport::CapturedTransportFactory;
use crate::host::{Fetch, FetchHandle, Host, TransportFactory};
use crate::observability::metrics;
use crate::store::{BoundedEventStore, EventId, IdGenerator, StoreHandle};

/// Creates and completes network records.
#[derive(Clone)]
pub struct NetworkRecorder {
    store: BoundedEventStore<NetworkRecord>,
    ids: IdGenerator,
}

impl NetworkRecorder {
    pub fn new(capacity: usize) -> Self {
        Self {
            store: BoundedEventStore::new("network", capacity),
            ids: IdGenerator::new(),
        }
    }

    /// Append a pending record and return its id.
    pub fn begin(&self, request: PendingRequest) -> EventId {
        let id = self.ids.next();
        debug!(id = %id, method = %request.method, url = %request.url, "Request captured");
        self.store.append(NetworkRecord::pending(id.clone(), request));
        id
    }

    /// Complete the record `id`. Returns false if the record no longer
    /// exists or was already complete.
    pub fn complete(&self, id: &EventId, completion: Completion) -> bool {
        let state = completion.state;
        let mut applied = false;
        let found = self.store.mutate_by_id(id, |record| {
            applied = record.complete(completion);
        });

        if !found {
            debug!(id = %id, "Completion for a record that is no longer stored");
            metrics::record_stale_completion();
            return false;
        }
        if !applied {
            debug!(id = %id, "Record already completed");
            return false;
        }
        metrics::record_network_completion(state.as_str());
        true
    }

    pub fn store(&self) -> &BoundedEventStore<NetworkRecord> {
        &self.store
    }
}

struct Swapped<T: ?Sized> {
    original: Arc<T>,
    wrapper: Arc<T>,
}

#[derive(Default)]
struct InstallState {
    fetch: Option<Swapped<dyn Fetch>>,
    transports: Option<Swapped<dyn TransportFactory>>,
}

/// Intercepts a host's network primitives.
pub struct NetworkCapture {
    host: Host,
    recorder: NetworkRecorder,
    state: Mutex<InstallState>,
}

impl NetworkCapture {
    pub fn new(host: Host, capacity: usize) -> Self {
        Self {
            host,
            recorder: NetworkRecorder::new(capacity),
            state: Mutex::new(InstallState::default()),
        }
    }

    /// Install both paths. Missing primitives are skipped silently.
    pub fn install(&self) {
        for result in [self.install_fetch(), self.install_transport()] {
            if let Err(e) = result {
                debug!(error = %e, "Network capture path skipped");
            }
        }
    }

    /// Wrap the promise-style primitive.
    pub fn install_fetch(&self) -> Result<(), CaptureError> {
        let mut state = self.state();
        if state.fetch.is_some() {
            return Ok(());
        }
        let original = self
            .host
            .fetch_primitive()
            .ok_or(CaptureError::Unavailable("fetch"))?;

        let wrapper: Arc<dyn Fetch> = Arc::new(
            FetchCaptureLayer::new(self.recorder.clone()).layer(FetchHandle::new(original)),
        );
        let replaced = self.host.replace_fetch(Some(wrapper.clone()));
        state.fetch = replaced.map(|original| Swapped { original, wrapper });
        debug!("Fetch capture installed");
        Ok(())
    }

    /// Wrap the callback-style transport constructor.
    pub fn install_transport(&self) -> Result<(), CaptureError> {
        let mut state = self.state();
        if state.transports.is_some() {
            return Ok(());
        }
        let original = self
            .host
            .transport_factory()
            .ok_or(CaptureError::Unavailable("callback transport"))?;

        let wrapper: Arc<dyn TransportFactory> = Arc::new(CapturedTransportFactory::new(
            original,
            self.recorder.clone(),
        ));
        let replaced = self.host.replace_transport_factory(Some(wrapper.clone()));
        state.transports = replaced.map(|original| Swapped { original, wrapper });
        debug!("Transport capture installed");
        Ok(())
    }

    /// Restore whatever was replaced. Safe to call repeatedly.
    pub fn uninstall(&self) {
        let mut state = self.state();
        if let Some(swapped) = state.fetch.take() {
            let current = self.host.replace_fetch(Some(swapped.original));
            if !current.is_some_and(|c| Arc::ptr_eq(&c, &swapped.wrapper)) {
                warn!("Fetch binding was replaced while captured; restoring original anyway");
            }
            debug!("Fetch capture uninstalled");
        }
        if let Some(swapped) = state.transports.take() {
            let current = self.host.replace_transport_factory(Some(swapped.original));
            if !current.is_some_and(|c| Arc::ptr_eq(&c, &swapped.wrapper)) {
                warn!("Transport binding was replaced while captured; restoring original anyway");
            }
            debug!("Transport capture uninstalled");
        }
    }

    pub fn is_installed(&self) -> bool {
        let state = self.state();
        state.fetch.is_some() || state.transports.is_some()
    }

    pub fn records(&self) -> StoreHandle<NetworkRecord> {
        self.recorder.store().handle()
    }

    pub fn recorder(&self) -> &NetworkRecorder {
        &self.recorder
    }

    fn state(&self) -> MutexGuard<'_, InstallState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for NetworkCapture {
    fn drop(&mut self) {
        self.uninstall();
    }
}
