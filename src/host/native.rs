//! Network primitives backed by a real HTTP client.
//!
//! # Responsibilities
//! - `HyperFetch`: promise-style primitive on the hyper-util legacy client
//! - `HyperTransport`: callback-style primitive on the same client, driven
//!   by a tokio task per `send`
//!
//! # Design Decisions
//! - Bodies are collected in full before a response is handed out
//! - A transport failure completes the callback-style request with status 0,
//!   the promise-style request rejects instead
//! - Only the Opened and Done ready states are reported
//! - `open` and `send` abort a request still in flight; its Done is never
//!   reported

use bytes::Bytes;
use futures_util::future::FutureExt;
use http::{HeaderMap, HeaderName, HeaderValue, Method, Request};
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use std::sync::{Arc, Mutex, PoisonError};
use std::task::{Context, Poll};
use tokio::runtime::{Handle, TryCurrentError};
use tokio::task::JoinHandle;
use tower::Service;

use crate::host::network::{
    CallbackTransport, FetchError, FetchFuture, FetchRequest, FetchResponse, Payload,
    ReadyStateCallback, TransportFactory, TransportPhase, TransportState,
};

type HttpClient = Client<HttpConnector, Full<Bytes>>;

fn build_client() -> HttpClient {
    Client::builder(TokioExecutor::new()).build(HttpConnector::new())
}

struct RawResponse {
    status: u16,
    headers: HeaderMap,
    body: Bytes,
}

async fn send_request(
    client: HttpClient,
    method: &str,
    url: &str,
    headers: HeaderMap,
    body: Option<Bytes>,
) -> Result<RawResponse, FetchError> {
    let method = Method::from_bytes(method.as_bytes()).map_err(FetchError::new)?;
    let mut request = Request::builder()
        .method(method)
        .uri(url)
        .body(Full::new(body.unwrap_or_default()))
        .map_err(FetchError::new)?;
    *request.headers_mut() = headers;

    let response: http::Response<Incoming> =
        client.request(request).await.map_err(FetchError::new)?;
    let (parts, body) = response.into_parts();
    let body = body.collect().await.map_err(FetchError::new)?.to_bytes();

    Ok(RawResponse {
        status: parts.status.as_u16(),
        headers: parts.headers,
        body,
    })
}

/// Promise-style primitive over HTTP/1.1.
#[derive(Clone)]
pub struct HyperFetch {
    client: HttpClient,
}

impl HyperFetch {
    pub fn new() -> Self {
        Self {
            client: build_client(),
        }
    }
}

impl Default for HyperFetch {
    fn default() -> Self {
        Self::new()
    }
}

impl Service<FetchRequest> for HyperFetch {
    type Response = FetchResponse;
    type Error = FetchError;
    type Future = FetchFuture;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, request: FetchRequest) -> Self::Future {
        let client = self.client.clone();
        async move {
            let method = request.effective_method();
            let url = request.url();
            let headers = request
                .effective_headers()
                .map(|h| h.to_header_map())
                .unwrap_or_default();
            let body = request.effective_body().map(Payload::to_bytes);

            let raw = send_request(client, &method, &url, headers, body).await?;
            Ok(FetchResponse::new(raw.status)
                .with_headers(raw.headers)
                .with_body(raw.body))
        }
        .boxed()
    }
}

/// Builds `HyperTransport`s bound to the runtime the factory was made on.
pub struct HyperTransportFactory {
    client: HttpClient,
    runtime: Handle,
}

impl HyperTransportFactory {
    /// Must be called from within a tokio runtime.
    pub fn new() -> Result<Self, TryCurrentError> {
        Ok(Self::with_handle(Handle::try_current()?))
    }

    pub fn with_handle(runtime: Handle) -> Self {
        Self {
            client: build_client(),
            runtime,
        }
    }
}

impl TransportFactory for HyperTransportFactory {
    fn create(&self) -> Box<dyn CallbackTransport> {
        Box::new(HyperTransport {
            client: self.client.clone(),
            runtime: self.runtime.clone(),
            method: String::from("GET"),
            url: String::new(),
            headers: HeaderMap::new(),
            callback: Arc::new(Mutex::new(None)),
            state: Arc::new(Mutex::new(TransportState::default())),
            generation: Arc::new(Mutex::new(0)),
            in_flight: None,
        })
    }
}

/// Callback-style primitive over HTTP/1.1.
pub struct HyperTransport {
    client: HttpClient,
    runtime: Handle,
    method: String,
    url: String,
    headers: HeaderMap,
    callback: Arc<Mutex<Option<ReadyStateCallback>>>,
    state: Arc<Mutex<TransportState>>,
    /// Bumped by every `open` and `send`; a task only reports while its
    /// generation is current.
    generation: Arc<Mutex<u64>>,
    in_flight: Option<JoinHandle<()>>,
}

impl HyperTransport {
    /// Abort the request in flight, if any, and start a new generation.
    fn supersede(&mut self) -> u64 {
        let mut generation = self.generation.lock().unwrap_or_else(PoisonError::into_inner);
        *generation += 1;
        if let Some(task) = self.in_flight.take() {
            task.abort();
        }
        *generation
    }

    fn transition(
        state: &Mutex<TransportState>,
        callback: &Mutex<Option<ReadyStateCallback>>,
        next: TransportState,
    ) {
        *state.lock().unwrap_or_else(PoisonError::into_inner) = next.clone();
        let callback = callback
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if let Some(callback) = callback {
            callback(&next);
        }
    }
}

fn raw_header_blob(headers: &HeaderMap) -> String {
    headers
        .iter()
        .map(|(name, value)| {
            format!(
                "{}: {}\r\n",
                name.as_str(),
                String::from_utf8_lossy(value.as_bytes())
            )
        })
        .collect()
}

impl CallbackTransport for HyperTransport {
    fn open(&mut self, method: &str, url: &str) {
        self.supersede();
        self.method = method.to_string();
        self.url = url.to_string();
        self.headers.clear();
        Self::transition(
            &self.state,
            &self.callback,
            TransportState {
                phase: TransportPhase::Opened,
                ..Default::default()
            },
        );
    }

    fn set_request_header(&mut self, name: &str, value: &str) {
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            (Ok(name), Ok(value)) => {
                self.headers.append(name, value);
            }
            _ => tracing::debug!(header = %name, "Ignoring invalid request header"),
        }
    }

    fn set_on_ready_state_change(&mut self, callback: Option<ReadyStateCallback>) {
        *self.callback.lock().unwrap_or_else(PoisonError::into_inner) = callback;
    }

    fn send(&mut self, body: Option<Payload>) {
        let client = self.client.clone();
        let method = self.method.clone();
        let url = self.url.clone();
        let headers = self.headers.clone();
        let body = body.as_ref().map(Payload::to_bytes);
        let state = self.state.clone();
        let callback = self.callback.clone();
        let generation = self.generation.clone();
        let sent_as = self.supersede();

        let task = self.runtime.spawn(async move {
            let done = match send_request(client, &method, &url, headers, body).await {
                Ok(raw) => TransportState {
                    phase: TransportPhase::Done,
                    status: raw.status,
                    status_text: http::StatusCode::from_u16(raw.status)
                        .ok()
                        .and_then(|s| s.canonical_reason())
                        .unwrap_or("")
                        .to_string(),
                    raw_headers: raw_header_blob(&raw.headers),
                    response: Some(Payload::Text(
                        String::from_utf8_lossy(&raw.body).into_owned(),
                    )),
                    response_type: String::new(),
                },
                Err(e) => {
                    tracing::debug!(url = %url, error = %e, "Transport request failed");
                    TransportState {
                        phase: TransportPhase::Done,
                        ..Default::default()
                    }
                }
            };
            let current = generation.lock().unwrap_or_else(PoisonError::into_inner);
            if *current != sent_as {
                tracing::debug!(url = %url, "Dropping result of superseded request");
                return;
            }
            HyperTransport::transition(&state, &callback, done);
        });
        self.in_flight = Some(task);
    }

    fn state(&self) -> TransportState {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}
