//! Captured record types.
//!
//! # Responsibilities
//! - `LogRecord`: one console entry, with its repeat counter
//! - `NetworkRecord`: one request, created pending and completed once
//!
//! Both serialize with camelCase field names so snapshots can be handed to
//! a UI as-is.

use serde::{Serialize, Serializer};
use serde_json::Value;

use crate::capture::headers::HeaderList;
use crate::host::{LogLevel, Payload};
use crate::store::{now_millis, EventId, Record};

/// One captured console entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogRecord {
    pub id: EventId,
    #[serde(rename = "type")]
    pub level: LogLevel,
    pub content: Vec<Value>,
    /// Milliseconds since the Unix epoch.
    pub time: u64,
    /// Number of consecutive identical calls this record stands for.
    pub repeated: u32,
}

impl LogRecord {
    pub fn new(id: EventId, level: LogLevel, content: Vec<Value>) -> Self {
        Self {
            id,
            level,
            content,
            time: now_millis(),
            repeated: 1,
        }
    }

    /// Same level and structurally equal content.
    pub fn same_entry(&self, other: &LogRecord) -> bool {
        self.level == other.level && self.content == other.content
    }
}

impl Record for LogRecord {
    fn id(&self) -> &EventId {
        &self.id
    }
}

/// HTTP method as recorded. Unknown methods are kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
    Patch,
    Head,
    Options,
    Other(String),
}

impl Method {
    /// Case-insensitive parse. An empty string means GET.
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        match trimmed.to_ascii_uppercase().as_str() {
            "" | "GET" => Method::Get,
            "POST" => Method::Post,
            "PUT" => Method::Put,
            "DELETE" => Method::Delete,
            "PATCH" => Method::Patch,
            "HEAD" => Method::Head,
            "OPTIONS" => Method::Options,
            _ => Method::Other(trimmed.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
            Method::Patch => "PATCH",
            Method::Head => "HEAD",
            Method::Options => "OPTIONS",
            Method::Other(raw) => raw,
        }
    }
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Method {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// Lifecycle state of a network record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestState {
    Pending,
    Success,
    Error,
}

impl RequestState {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestState::Pending => "pending",
            RequestState::Success => "success",
            RequestState::Error => "error",
        }
    }

    /// 2xx is success, anything else (including 0) is an error.
    pub fn from_status(status: u16) -> Self {
        if (200..300).contains(&status) {
            RequestState::Success
        } else {
            RequestState::Error
        }
    }
}

/// Request-side facts known when a request is issued.
#[derive(Debug, Clone)]
pub struct PendingRequest {
    pub url: String,
    pub method: Method,
    pub headers: HeaderList,
    pub body: Option<Payload>,
}

/// Response-side facts applied when a request completes.
#[derive(Debug, Clone)]
pub struct Completion {
    pub state: RequestState,
    pub status: Option<u16>,
    pub status_text: String,
    pub response_time: u64,
    pub response_headers: HeaderList,
    pub response_data: Option<Payload>,
    pub response_type: String,
}

impl Completion {
    /// A response arrived; state follows the status code.
    pub fn response(status: u16, status_text: impl Into<String>) -> Self {
        Self {
            state: RequestState::from_status(status),
            status: Some(status),
            status_text: status_text.into(),
            response_time: now_millis(),
            response_headers: HeaderList::new(),
            response_data: None,
            response_type: String::new(),
        }
    }

    /// The request failed before any response arrived.
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            state: RequestState::Error,
            status: None,
            status_text: String::new(),
            response_time: now_millis(),
            response_headers: HeaderList::new(),
            response_data: Some(Payload::Text(message.into())),
            response_type: String::new(),
        }
    }

    pub fn with_headers(mut self, headers: HeaderList) -> Self {
        self.response_headers = headers;
        self
    }

    pub fn with_data(mut self, data: Option<Payload>) -> Self {
        self.response_data = data;
        self
    }

    pub fn with_type(mut self, response_type: impl Into<String>) -> Self {
        self.response_type = response_type.into();
        self
    }
}

/// One captured network request.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkRecord {
    pub id: EventId,
    pub url: String,
    pub method: Method,
    /// Absent until a response arrives.
    pub status: Option<u16>,
    pub status_text: String,
    pub request_time: u64,
    pub response_time: Option<u64>,
    pub duration: Option<u64>,
    pub request_headers: HeaderList,
    pub response_headers: HeaderList,
    pub request_data: Option<Payload>,
    pub response_data: Option<Payload>,
    /// "string", "object", "binary" or "undefined".
    pub request_type: &'static str,
    pub response_type: String,
    pub ready_state: RequestState,
}

impl NetworkRecord {
    pub fn pending(id: EventId, request: PendingRequest) -> Self {
        Self {
            id,
            url: request.url,
            method: request.method,
            status: None,
            status_text: String::new(),
            request_time: now_millis(),
            response_time: None,
            duration: None,
            request_headers: request.headers,
            response_headers: HeaderList::new(),
            request_type: Payload::kind_of(request.body.as_ref()),
            request_data: request.body,
            response_data: None,
            response_type: String::new(),
            ready_state: RequestState::Pending,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.ready_state == RequestState::Pending
    }

    /// Apply a completion. Only a pending record accepts one; returns false
    /// otherwise and leaves the record untouched.
    pub fn complete(&mut self, completion: Completion) -> bool {
        if !self.is_pending() {
            return false;
        }
        self.ready_state = completion.state;
        self.status = completion.status;
        self.status_text = completion.status_text;
        self.response_time = Some(completion.response_time);
        self.duration = Some(completion.response_time.saturating_sub(self.request_time));
        self.response_headers = completion.response_headers;
        self.response_data = completion.response_data;
        self.response_type = completion.response_type;
        true
    }
}

impl Record for NetworkRecord {
    fn id(&self) -> &EventId {
        &self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn pending_get() -> NetworkRecord {
        NetworkRecord::pending(
            EventId::from("1_abc"),
            PendingRequest {
                url: "/a".into(),
                method: Method::parse("get"),
                headers: HeaderList::new(),
                body: None,
            },
        )
    }

    #[test]
    fn test_method_parse() {
        assert_eq!(Method::parse("post"), Method::Post);
        assert_eq!(Method::parse(""), Method::Get);
        assert_eq!(Method::parse("Options"), Method::Options);
        assert_eq!(Method::parse("PROPFIND"), Method::Other("PROPFIND".into()));
        assert_eq!(Method::parse("purge").as_str(), "purge");
    }

    #[test]
    fn test_pending_record_shape() {
        let record = pending_get();
        assert!(record.is_pending());
        assert_eq!(record.status, None);
        assert_eq!(record.request_type, "undefined");
        assert_eq!(record.response_time, None);
        assert_eq!(record.duration, None);
    }

    #[test]
    fn test_complete_applies_once() {
        let mut record = pending_get();
        let completion = Completion::response(404, "Not Found")
            .with_data(Some(Payload::Text("missing".into())))
            .with_type("text/plain");
        assert!(record.complete(completion));
        assert_eq!(record.ready_state, RequestState::Error);
        assert_eq!(record.status, Some(404));
        assert!(record.duration.is_some());
        assert_eq!(
            record.duration,
            Some(record.response_time.unwrap() - record.request_time)
        );

        assert!(!record.complete(Completion::response(200, "OK")));
        assert_eq!(record.status, Some(404));
    }

    #[test]
    fn test_failure_completion() {
        let mut record = pending_get();
        record.complete(Completion::failure("connection refused"));
        assert_eq!(record.ready_state, RequestState::Error);
        assert_eq!(record.status, None);
        assert_eq!(
            record.response_data,
            Some(Payload::Text("connection refused".into()))
        );
    }

    #[test]
    fn test_state_from_status() {
        assert_eq!(RequestState::from_status(200), RequestState::Success);
        assert_eq!(RequestState::from_status(299), RequestState::Success);
        assert_eq!(RequestState::from_status(304), RequestState::Error);
        assert_eq!(RequestState::from_status(0), RequestState::Error);
    }

    #[test]
    fn test_log_record_serialization() {
        let record = LogRecord::new(EventId::from("1_x"), LogLevel::Warn, vec![json!("a"), json!(1)]);
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["type"], "warn");
        assert_eq!(value["content"], json!(["a", 1]));
        assert_eq!(value["repeated"], 1);
    }

    #[test]
    fn test_network_record_serialization() {
        let value = serde_json::to_value(pending_get()).unwrap();
        assert_eq!(value["method"], "GET");
        assert_eq!(value["readyState"], "pending");
        assert_eq!(value["requestType"], "undefined");
        assert!(value["status"].is_null());
    }
}
