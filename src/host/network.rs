//! Network primitives exposed by the host.
//!
//! # Primitives
//! - Promise-style: anything implementing `Fetch`. Every cloneable
//!   `tower::Service<FetchRequest>` qualifies, so interception is a
//!   `tower::Layer`.
//! - Callback-style: a `TransportFactory` producing `CallbackTransport`
//!   objects (open → set headers → send → ready-state notifications).
//!
//! # Design Decisions
//! - Responses carry their whole body as `Bytes`, so cloning a response is
//!   cheap and leaves the original unread
//! - `FetchError` is reference-counted; a rejection handed back to the
//!   caller can be checked for identity with `FetchError::ptr_eq`

use bytes::Bytes;
use futures_util::future::{self, BoxFuture, FutureExt};
use http::HeaderMap;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::task::{Context, Poll};
use thiserror::Error;
use tower::{Service, ServiceExt};
use url::Url;

/// An opaque, type-tagged request or response body.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum Payload {
    Text(String),
    Json(Value),
    Bytes(Bytes),
}

impl Payload {
    /// Short type tag for display.
    pub fn kind(&self) -> &'static str {
        match self {
            Payload::Text(_) => "string",
            Payload::Json(_) => "object",
            Payload::Bytes(_) => "binary",
        }
    }

    /// Wire representation of the payload.
    pub fn to_bytes(&self) -> Bytes {
        match self {
            Payload::Text(s) => Bytes::from(s.clone()),
            Payload::Json(v) => Bytes::from(v.to_string()),
            Payload::Bytes(b) => b.clone(),
        }
    }

    /// Type tag of an optional payload; "undefined" when absent.
    pub fn kind_of(payload: Option<&Payload>) -> &'static str {
        payload.map_or("undefined", Payload::kind)
    }
}

impl From<&str> for Payload {
    fn from(s: &str) -> Self {
        Payload::Text(s.to_string())
    }
}

impl From<String> for Payload {
    fn from(s: String) -> Self {
        Payload::Text(s)
    }
}

impl From<Value> for Payload {
    fn from(v: Value) -> Self {
        Payload::Json(v)
    }
}

impl From<Bytes> for Payload {
    fn from(b: Bytes) -> Self {
        Payload::Bytes(b)
    }
}

/// Header representations a caller may hand to a primitive.
#[derive(Debug, Clone, PartialEq)]
pub enum HeaderSource {
    /// A native header collection.
    Native(HeaderMap),
    /// A plain name → value mapping, in the caller's order.
    Pairs(Vec<(String, String)>),
}

impl HeaderSource {
    /// Convert to a native collection; entries that are not valid header
    /// names or values are skipped.
    pub fn to_header_map(&self) -> HeaderMap {
        match self {
            HeaderSource::Native(map) => map.clone(),
            HeaderSource::Pairs(pairs) => {
                let mut map = HeaderMap::with_capacity(pairs.len());
                for (name, value) in pairs {
                    if let (Ok(name), Ok(value)) = (
                        http::header::HeaderName::from_bytes(name.as_bytes()),
                        http::header::HeaderValue::from_str(value),
                    ) {
                        map.append(name, value);
                    }
                }
                map
            }
        }
    }
}

impl From<HeaderMap> for HeaderSource {
    fn from(map: HeaderMap) -> Self {
        HeaderSource::Native(map)
    }
}

impl From<Vec<(String, String)>> for HeaderSource {
    fn from(pairs: Vec<(String, String)>) -> Self {
        HeaderSource::Pairs(pairs)
    }
}

impl<const N: usize> From<[(&str, &str); N]> for HeaderSource {
    fn from(pairs: [(&str, &str); N]) -> Self {
        HeaderSource::Pairs(
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }
}

impl From<HashMap<String, String>> for HeaderSource {
    fn from(map: HashMap<String, String>) -> Self {
        HeaderSource::Pairs(map.into_iter().collect())
    }
}

/// A request-like object exposing its own url.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Resource {
    pub url: String,
    pub method: Option<String>,
    pub headers: Option<HeaderSource>,
    pub body: Option<Payload>,
}

impl Resource {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }
}

/// First argument of a fetch call.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchInput {
    Text(String),
    Url(Url),
    Resource(Resource),
}

impl FetchInput {
    /// The target url as a string, whatever shape the input has.
    pub fn url(&self) -> String {
        match self {
            FetchInput::Text(s) => s.clone(),
            FetchInput::Url(u) => u.as_str().to_string(),
            FetchInput::Resource(r) => r.url.clone(),
        }
    }
}

impl From<&str> for FetchInput {
    fn from(s: &str) -> Self {
        FetchInput::Text(s.to_string())
    }
}

impl From<String> for FetchInput {
    fn from(s: String) -> Self {
        FetchInput::Text(s)
    }
}

impl From<Url> for FetchInput {
    fn from(u: Url) -> Self {
        FetchInput::Url(u)
    }
}

impl From<Resource> for FetchInput {
    fn from(r: Resource) -> Self {
        FetchInput::Resource(r)
    }
}

/// Second argument of a fetch call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestInit {
    pub method: Option<String>,
    pub headers: Option<HeaderSource>,
    pub body: Option<Payload>,
}

/// A complete fetch call.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchRequest {
    pub input: FetchInput,
    pub init: RequestInit,
}

impl FetchRequest {
    pub fn new(input: impl Into<FetchInput>) -> Self {
        Self {
            input: input.into(),
            init: RequestInit::default(),
        }
    }

    pub fn get(input: impl Into<FetchInput>) -> Self {
        Self::new(input)
    }

    pub fn method(mut self, method: impl Into<String>) -> Self {
        self.init.method = Some(method.into());
        self
    }

    pub fn headers(mut self, headers: impl Into<HeaderSource>) -> Self {
        self.init.headers = Some(headers.into());
        self
    }

    /// Append one header, converting native headers to pairs if needed.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let pair = (name.into(), value.into());
        match self.init.headers.take() {
            None => self.init.headers = Some(HeaderSource::Pairs(vec![pair])),
            Some(HeaderSource::Pairs(mut pairs)) => {
                pairs.push(pair);
                self.init.headers = Some(HeaderSource::Pairs(pairs));
            }
            Some(HeaderSource::Native(map)) => {
                let mut pairs: Vec<(String, String)> = map
                    .iter()
                    .map(|(k, v)| {
                        (
                            k.as_str().to_string(),
                            String::from_utf8_lossy(v.as_bytes()).into_owned(),
                        )
                    })
                    .collect();
                pairs.push(pair);
                self.init.headers = Some(HeaderSource::Pairs(pairs));
            }
        }
        self
    }

    pub fn body(mut self, body: impl Into<Payload>) -> Self {
        self.init.body = Some(body.into());
        self
    }

    pub fn url(&self) -> String {
        self.input.url()
    }

    /// Upper-cased method: `init` first, then a resource input, then GET.
    pub fn effective_method(&self) -> String {
        let resource_method = match &self.input {
            FetchInput::Resource(r) => r.method.as_deref(),
            _ => None,
        };
        self.init
            .method
            .as_deref()
            .or(resource_method)
            .filter(|m| !m.is_empty())
            .unwrap_or("GET")
            .to_uppercase()
    }

    /// Headers from `init`, falling back to a resource input.
    pub fn effective_headers(&self) -> Option<&HeaderSource> {
        self.init.headers.as_ref().or(match &self.input {
            FetchInput::Resource(r) => r.headers.as_ref(),
            _ => None,
        })
    }

    /// Body from `init`, falling back to a resource input.
    pub fn effective_body(&self) -> Option<&Payload> {
        self.init.body.as_ref().or(match &self.input {
            FetchInput::Resource(r) => r.body.as_ref(),
            _ => None,
        })
    }
}

/// Failure while decoding a response body.
#[derive(Debug, Error)]
pub enum BodyError {
    #[error("response body is not valid UTF-8: {0}")]
    Utf8(#[from] std::str::Utf8Error),

    #[error("response body is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// A settled fetch response with its body fully buffered.
#[derive(Debug, Clone)]
pub struct FetchResponse {
    status: u16,
    status_text: String,
    headers: HeaderMap,
    body: Bytes,
}

impl FetchResponse {
    /// Response with the canonical reason phrase as status text.
    pub fn new(status: u16) -> Self {
        let status_text = http::StatusCode::from_u16(status)
            .ok()
            .and_then(|s| s.canonical_reason())
            .unwrap_or("")
            .to_string();
        Self {
            status,
            status_text,
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }

    pub fn with_status_text(mut self, text: impl Into<String>) -> Self {
        self.status_text = text.into();
        self
    }

    /// Add a header; invalid names or values are skipped.
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        if let (Ok(name), Ok(value)) = (
            http::header::HeaderName::from_bytes(name.as_bytes()),
            http::header::HeaderValue::from_str(value),
        ) {
            self.headers.append(name, value);
        }
        self
    }

    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn status_text(&self) -> &str {
        &self.status_text
    }

    /// True for 2xx statuses.
    pub fn ok(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn content_type(&self) -> Option<&str> {
        self.headers
            .get(http::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
    }

    pub fn bytes(&self) -> &Bytes {
        &self.body
    }

    /// Consume the body as UTF-8 text.
    pub fn text(self) -> Result<String, BodyError> {
        Ok(std::str::from_utf8(&self.body)?.to_string())
    }

    /// Consume the body as JSON.
    pub fn json(self) -> Result<Value, BodyError> {
        Ok(serde_json::from_slice(&self.body)?)
    }
}

#[derive(Debug, Error)]
#[error("{0}")]
struct Message(String);

/// Rejection of a fetch call.
///
/// Clones share the same underlying error.
#[derive(Clone)]
pub struct FetchError {
    inner: Arc<dyn std::error::Error + Send + Sync>,
}

impl FetchError {
    pub fn new<E>(error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self {
            inner: Arc::new(error),
        }
    }

    pub fn msg(message: impl Into<String>) -> Self {
        Self::new(Message(message.into()))
    }

    pub fn message(&self) -> String {
        self.inner.to_string()
    }

    /// True when both values are the same rejection.
    pub fn ptr_eq(a: &FetchError, b: &FetchError) -> bool {
        Arc::ptr_eq(&a.inner, &b.inner)
    }
}

impl std::fmt::Debug for FetchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("FetchError").field(&self.inner).finish()
    }
}

impl std::fmt::Display for FetchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Display::fmt(&self.inner, f)
    }
}

impl std::error::Error for FetchError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        std::error::Error::source(&*self.inner)
    }
}

pub type FetchFuture = BoxFuture<'static, Result<FetchResponse, FetchError>>;

/// The promise-style request primitive.
pub trait Fetch: Send + Sync {
    fn fetch(&self, request: FetchRequest) -> FetchFuture;
}

impl<S> Fetch for S
where
    S: Service<FetchRequest, Response = FetchResponse, Error = FetchError>
        + Clone
        + Send
        + Sync
        + 'static,
    S::Future: Send + 'static,
{
    fn fetch(&self, request: FetchRequest) -> FetchFuture {
        let mut service = self.clone();
        // Services that are ready right away are called before returning,
        // so interception happens at call time rather than at first poll.
        match service.ready().now_or_never() {
            Some(Ok(_)) => service.call(request).boxed(),
            Some(Err(e)) => future::ready(Err(e)).boxed(),
            None => service.oneshot(request).boxed(),
        }
    }
}

/// A bound fetch primitive viewed as a `tower::Service`, so layers can wrap
/// whatever the host currently has.
#[derive(Clone)]
pub struct FetchHandle {
    inner: Arc<dyn Fetch>,
}

impl FetchHandle {
    pub fn new(inner: Arc<dyn Fetch>) -> Self {
        Self { inner }
    }
}

impl Service<FetchRequest> for FetchHandle {
    type Response = FetchResponse;
    type Error = FetchError;
    type Future = FetchFuture;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, request: FetchRequest) -> Self::Future {
        self.inner.fetch(request)
    }
}

/// Ready states of a callback-style transport.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransportPhase {
    #[default]
    Unsent = 0,
    Opened = 1,
    HeadersReceived = 2,
    Loading = 3,
    Done = 4,
}

/// What a callback-style transport reports to its ready-state callback.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransportState {
    pub phase: TransportPhase,
    /// 0 until a response arrives, and on transport failure.
    pub status: u16,
    pub status_text: String,
    /// `name: value` lines separated by CRLF.
    pub raw_headers: String,
    pub response: Option<Payload>,
    /// Empty means text.
    pub response_type: String,
}

pub type ReadyStateCallback = Arc<dyn Fn(&TransportState) + Send + Sync>;

/// The callback-style request primitive.
///
/// `open` and `send` abort any request still in flight: a superseded
/// request never reports Done.
pub trait CallbackTransport: Send {
    fn open(&mut self, method: &str, url: &str);

    fn set_request_header(&mut self, name: &str, value: &str);

    /// Replace the ready-state callback. `None` removes it.
    fn set_on_ready_state_change(&mut self, callback: Option<ReadyStateCallback>);

    fn send(&mut self, body: Option<Payload>);

    /// Current state snapshot.
    fn state(&self) -> TransportState;
}

/// Constructor for callback-style transports.
pub trait TransportFactory: Send + Sync {
    fn create(&self) -> Box<dyn CallbackTransport>;
}

impl<F> TransportFactory for F
where
    F: Fn() -> Box<dyn CallbackTransport> + Send + Sync,
{
    fn create(&self) -> Box<dyn CallbackTransport> {
        self()
    }
}
