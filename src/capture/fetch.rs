//! Promise-style request capture as a `tower` layer.
//!
//! # Data Flow
//! ```text
//! FetchCapture::call(request)
//!     → recorder.begin(..)            (pending record, synchronous)
//!     → inner.call(request)
//!     → await response
//!         Ok  → clone, decode body, recorder.complete(..) → Ok(response)
//!         Err → recorder.complete(failure)                → Err(same error)
//! ```
//!
//! # Design Decisions
//! - The caller gets the very response or error the inner service produced;
//!   recording reads a clone of the response
//! - A body that fails to decode leaves response data absent instead of
//!   failing the request

use futures_util::future::FutureExt;
use std::task::{Context, Poll};
use tower::{Layer, Service};
use tracing::debug;

use crate::capture::error::CaptureError;
use crate::capture::headers::{headers_from_map, normalize_headers};
use crate::capture::network::NetworkRecorder;
use crate::capture::records::{Completion, Method, PendingRequest};
use crate::host::{FetchError, FetchFuture, FetchRequest, FetchResponse, Payload};

/// True when a content type names JSON: it contains `application/json` or
/// its media type ends in `+json`.
pub fn is_json_content_type(content_type: &str) -> bool {
    let lower = content_type.to_ascii_lowercase();
    let essence = lower.split(';').next().unwrap_or_default().trim();
    lower.contains("application/json") || essence.ends_with("+json")
}

/// Decode a response body for the record: JSON for JSON content types,
/// text otherwise.
pub fn read_body(response: FetchResponse) -> Result<Payload, CaptureError> {
    let structured = response.content_type().is_some_and(is_json_content_type);
    if structured {
        Ok(Payload::Json(response.json()?))
    } else {
        Ok(Payload::Text(response.text()?))
    }
}

/// Wraps a fetch service with request capture.
#[derive(Clone)]
pub struct FetchCaptureLayer {
    recorder: NetworkRecorder,
}

impl FetchCaptureLayer {
    pub fn new(recorder: NetworkRecorder) -> Self {
        Self { recorder }
    }
}

impl<S> Layer<S> for FetchCaptureLayer {
    type Service = FetchCapture<S>;

    fn layer(&self, inner: S) -> Self::Service {
        FetchCapture {
            inner,
            recorder: self.recorder.clone(),
        }
    }
}

/// A fetch service that records every request it forwards.
#[derive(Clone)]
pub struct FetchCapture<S> {
    inner: S,
    recorder: NetworkRecorder,
}

impl<S> Service<FetchRequest> for FetchCapture<S>
where
    S: Service<FetchRequest, Response = FetchResponse, Error = FetchError> + Clone + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = FetchResponse;
    type Error = FetchError;
    type Future = FetchFuture;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: FetchRequest) -> Self::Future {
        let pending = PendingRequest {
            url: request.url(),
            method: Method::parse(&request.effective_method()),
            headers: normalize_headers(request.effective_headers()),
            body: request.effective_body().cloned(),
        };
        let id = self.recorder.begin(pending);

        // The clone is not ready; keep it and call the one that is.
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);
        let future = inner.call(request);
        let recorder = self.recorder.clone();

        async move {
            match future.await {
                Ok(response) => {
                    let data = match read_body(response.clone()) {
                        Ok(data) => Some(data),
                        Err(e) => {
                            debug!(id = %id, error = %e, "Response body not captured");
                            None
                        }
                    };
                    let completion = Completion::response(response.status(), response.status_text())
                        .with_headers(headers_from_map(response.headers()))
                        .with_data(data)
                        .with_type(response.content_type().unwrap_or_default());
                    recorder.complete(&id, completion);
                    Ok(response)
                }
                Err(error) => {
                    recorder.complete(&id, Completion::failure(error.message()));
                    Err(error)
                }
            }
        }
        .boxed()
    }
}
