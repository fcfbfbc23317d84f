//! Callback-style request capture.
//!
//! # Data Flow
//! ```text
//! factory.create()  → CapturedTransport { inner, interceptor installed }
//! open / set_request_header → remembered, then forwarded
//! send(body)        → recorder.begin(..) → inner.send(body)
//! inner reports Done → interceptor: recorder.complete(..)
//!                    → caller's ready-state callback, if any
//! ```
//!
//! # Design Decisions
//! - The interceptor is bound to the inner transport once, at construction;
//!   a callback set by the caller is kept in a slot and invoked after it
//! - Every `send` opens a fresh record, so a reused transport never
//!   completes an older record twice
//! - A request still in flight when `open` or `send` is called again is
//!   aborted by the inner transport; its record is completed as an error
//! - No lock is held while calling into the inner transport, which may
//!   report synchronously from `send`

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::capture::headers::{parse_header_blob, HeaderList};
use crate::capture::network::NetworkRecorder;
use crate::capture::records::{Completion, Method, PendingRequest};
use crate::host::{
    CallbackTransport, Payload, ReadyStateCallback, TransportFactory, TransportPhase,
    TransportState,
};
use crate::store::EventId;

/// Wraps a host's transport constructor so every transport it builds is
/// captured.
pub struct CapturedTransportFactory {
    inner: Arc<dyn TransportFactory>,
    recorder: NetworkRecorder,
}

impl CapturedTransportFactory {
    pub fn new(inner: Arc<dyn TransportFactory>, recorder: NetworkRecorder) -> Self {
        Self { inner, recorder }
    }
}

impl TransportFactory for CapturedTransportFactory {
    fn create(&self) -> Box<dyn CallbackTransport> {
        Box::new(CapturedTransport::new(
            self.inner.create(),
            self.recorder.clone(),
        ))
    }
}

#[derive(Default)]
struct Draft {
    method: String,
    url: String,
    headers: HeaderList,
    in_flight: Option<EventId>,
}

#[derive(Default)]
struct Shared {
    draft: Mutex<Draft>,
    callback: Mutex<Option<ReadyStateCallback>>,
}

impl Shared {
    fn draft(&self) -> MutexGuard<'_, Draft> {
        self.draft.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn callback(&self) -> MutexGuard<'_, Option<ReadyStateCallback>> {
        self.callback.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// A callback-style transport that records the requests it sends.
pub struct CapturedTransport {
    inner: Box<dyn CallbackTransport>,
    recorder: NetworkRecorder,
    shared: Arc<Shared>,
}

impl CapturedTransport {
    pub fn new(mut inner: Box<dyn CallbackTransport>, recorder: NetworkRecorder) -> Self {
        let shared = Arc::new(Shared::default());

        let interceptor_shared = shared.clone();
        let interceptor_recorder = recorder.clone();
        inner.set_on_ready_state_change(Some(Arc::new(move |state: &TransportState| {
            if state.phase == TransportPhase::Done {
                let in_flight = interceptor_shared.draft().in_flight.take();
                if let Some(id) = in_flight {
                    interceptor_recorder.complete(&id, completion_from(state));
                }
            }
            let callback = interceptor_shared.callback().clone();
            if let Some(callback) = callback {
                callback(state);
            }
        })));

        Self {
            inner,
            recorder,
            shared,
        }
    }
}

const ABORTED: &str = "Request aborted";

impl CapturedTransport {
    /// Close out the record of a request the inner transport is about to
    /// abort.
    fn abort_in_flight(&self) {
        let superseded = self.shared.draft().in_flight.take();
        if let Some(id) = superseded {
            self.recorder.complete(&id, Completion::failure(ABORTED));
        }
    }
}

fn completion_from(state: &TransportState) -> Completion {
    let response_type = if state.response_type.is_empty() {
        "text"
    } else {
        state.response_type.as_str()
    };
    Completion::response(state.status, state.status_text.clone())
        .with_headers(parse_header_blob(&state.raw_headers))
        .with_data(state.response.clone())
        .with_type(response_type)
}

impl CallbackTransport for CapturedTransport {
    fn open(&mut self, method: &str, url: &str) {
        self.abort_in_flight();
        {
            let mut draft = self.shared.draft();
            draft.method = method.to_string();
            draft.url = url.to_string();
            draft.headers = HeaderList::new();
        }
        self.inner.open(method, url);
    }

    fn set_request_header(&mut self, name: &str, value: &str) {
        self.shared.draft().headers.insert(name, value);
        self.inner.set_request_header(name, value);
    }

    fn set_on_ready_state_change(&mut self, callback: Option<ReadyStateCallback>) {
        *self.shared.callback() = callback;
    }

    fn send(&mut self, body: Option<Payload>) {
        let pending = {
            let draft = self.shared.draft();
            PendingRequest {
                url: draft.url.clone(),
                method: Method::parse(&draft.method),
                headers: draft.headers.clone(),
                body: body.clone(),
            }
        };
        self.abort_in_flight();
        let id = self.recorder.begin(pending);
        self.shared.draft().in_flight = Some(id);
        self.inner.send(body);
    }

    fn state(&self) -> TransportState {
        self.inner.state()
    }
}
