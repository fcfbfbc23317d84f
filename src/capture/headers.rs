//! Header normalization.
//!
//! # Responsibilities
//! - Turn any supported header representation into one ordered `HeaderList`
//! - Parse the raw `name: value` blob reported by callback-style transports
//!
//! # Design Decisions
//! - Keys keep the spelling they were given; lookups ignore ASCII case
//! - Inserting an identical key overwrites in place, so order is that of
//!   first appearance
//! - Native multi-valued headers are joined with ", "
//! - Nothing here fails: missing or malformed input yields fewer entries

use http::HeaderMap;
use serde::ser::{Serialize, SerializeMap, Serializer};

use crate::host::HeaderSource;

/// Ordered header mapping with case-insensitive lookup.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderList {
    entries: Vec<(String, String)>,
}

impl HeaderList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `name` to `value`. An entry with exactly the same key is
    /// overwritten in place; otherwise the entry is appended.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == name) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((name, value)),
        }
    }

    /// Value of the first entry whose key matches `name`, ignoring case.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl Serialize for HeaderList {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (k, v) in &self.entries {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for HeaderList {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut list = HeaderList::new();
        for (k, v) in iter {
            list.insert(k, v);
        }
        list
    }
}

/// Normalize whatever header representation a caller supplied.
pub fn normalize_headers(source: Option<&HeaderSource>) -> HeaderList {
    match source {
        None => HeaderList::new(),
        Some(HeaderSource::Native(map)) => headers_from_map(map),
        Some(HeaderSource::Pairs(pairs)) => pairs
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect(),
    }
}

/// Normalize a native header collection in its own enumeration order.
pub fn headers_from_map(map: &HeaderMap) -> HeaderList {
    let mut list = HeaderList::new();
    for name in map.keys() {
        let joined = map
            .get_all(name)
            .iter()
            .map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned())
            .collect::<Vec<_>>()
            .join(", ");
        list.insert(name.as_str(), joined);
    }
    list
}

/// Parse a raw header blob: one header per line, split at the first colon,
/// key and value trimmed. Lines with an empty key are skipped.
pub fn parse_header_blob(blob: &str) -> HeaderList {
    let mut list = HeaderList::new();
    for line in blob.split('\n') {
        let (key, value) = match line.split_once(':') {
            Some((key, value)) => (key.trim(), value.trim()),
            None => (line.trim(), ""),
        };
        if !key.is_empty() {
            list.insert(key, value);
        }
    }
    list
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderValue;

    #[test]
    fn test_missing_input_is_empty() {
        assert!(normalize_headers(None).is_empty());
        assert!(normalize_headers(Some(&HeaderSource::Pairs(vec![]))).is_empty());
        assert!(parse_header_blob("").is_empty());
    }

    #[test]
    fn test_pairs_keep_spelling_and_order() {
        let source = HeaderSource::from([("X-B", "2"), ("accept", "a"), ("X-B", "3")]);
        let list = normalize_headers(Some(&source));
        let entries: Vec<_> = list.iter().collect();
        assert_eq!(entries, vec![("X-B", "3"), ("accept", "a")]);
        assert_eq!(list.get("x-b"), Some("3"));
        assert_eq!(list.get("ACCEPT"), Some("a"));
        assert!(!list.contains("missing"));
    }

    #[test]
    fn test_native_map_joins_repeated_values() {
        let mut map = HeaderMap::new();
        map.insert("content-type", HeaderValue::from_static("application/json"));
        map.append("set-cookie", HeaderValue::from_static("a=1"));
        map.append("set-cookie", HeaderValue::from_static("b=2"));

        let list = normalize_headers(Some(&HeaderSource::Native(map)));
        let entries: Vec<_> = list.iter().collect();
        assert_eq!(
            entries,
            vec![("content-type", "application/json"), ("set-cookie", "a=1, b=2")]
        );
    }

    #[test]
    fn test_parse_header_blob() {
        let blob = "Content-Type: text/html; charset=utf-8\r\n\
                    Date: Tue, 01 Jan 2030 10:00:00 GMT\r\n\
                    X-Empty:\r\n\
                    \r\n";
        let list = parse_header_blob(blob);
        assert_eq!(list.len(), 3);
        assert_eq!(list.get("content-type"), Some("text/html; charset=utf-8"));
        // Only the first colon splits
        assert_eq!(list.get("date"), Some("Tue, 01 Jan 2030 10:00:00 GMT"));
        assert_eq!(list.get("x-empty"), Some(""));
    }

    #[test]
    fn test_serializes_as_ordered_map() {
        let list: HeaderList = [("b", "1"), ("a", "2")].into_iter().collect();
        assert_eq!(serde_json::to_string(&list).unwrap(), r#"{"b":"1","a":"2"}"#);
    }
}
