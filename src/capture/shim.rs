//! Request inspection helpers used by the capture layer

use crate::record::{REDACTED, SENSITIVE_HEADERS};
use axum::extract::{ConnectInfo, Query};
use axum::http::{HeaderMap, Request, Uri};
use serde_json::Value;
use std::collections::BTreeMap;
use std::net::SocketAddr;

/// Whether any exclude pattern occurs anywhere in `url`
pub fn is_excluded(url: &str, exclude_paths: &[String]) -> bool {
    exclude_paths
        .iter()
        .any(|pattern| url.contains(pattern.as_str()))
}

/// Request target as received: path plus query
pub fn request_url(uri: &Uri) -> String {
    uri.path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| uri.path().to_string())
}

/// Copy headers into a map with sensitive values replaced by [`REDACTED`]
///
/// Repeated headers are joined with `", "`. Non-UTF-8 values are decoded
/// lossily.
pub fn sanitize_headers(headers: &HeaderMap) -> BTreeMap<String, String> {
    headers
        .keys()
        .map(|name| {
            let value = if SENSITIVE_HEADERS.contains(&name.as_str()) {
                REDACTED.to_string()
            } else {
                headers
                    .get_all(name)
                    .iter()
                    .map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned())
                    .collect::<Vec<_>>()
                    .join(", ")
            };
            (name.as_str().to_string(), value)
        })
        .collect()
}

/// Decoded query-string parameters; malformed queries yield an empty map
pub fn query_params(uri: &Uri) -> BTreeMap<String, String> {
    Query::<BTreeMap<String, String>>::try_from_uri(uri)
        .map(|Query(params)| params)
        .unwrap_or_default()
}

/// Peer address from `ConnectInfo`, else the first `x-forwarded-for` hop
pub fn client_ip<B>(request: &Request<B>) -> Option<String> {
    if let Some(ConnectInfo(addr)) = request.extensions().get::<ConnectInfo<SocketAddr>>() {
        return Some(addr.ip().to_string());
    }

    request
        .headers()
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|ip| !ip.is_empty())
        .map(str::to_string)
}

/// Interpret captured body bytes
///
/// Empty bodies yield `None`. Text is parsed as JSON when possible and kept
/// verbatim otherwise; binary content is summarised by its length.
pub fn parse_body(bytes: &[u8]) -> Option<Value> {
    if bytes.is_empty() {
        return None;
    }

    match std::str::from_utf8(bytes) {
        Ok(text) => Some(
            serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.to_string())),
        ),
        Err(_) => Some(Value::String(format!(
            "<{} bytes of binary data>",
            bytes.len()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use serde_json::json;

    #[test]
    fn test_exclusion_is_substring_match() {
        let excludes = vec!["/health".to_string(), "metrics".to_string()];

        assert!(is_excluded("/health", &excludes));
        assert!(is_excluded("/api/v1/health/db", &excludes));
        assert!(is_excluded("/internal?target=metrics", &excludes));
        assert!(!is_excluded("/users/1", &excludes));
        assert!(!is_excluded("/anything", &[]));
    }

    #[test]
    fn test_request_url_keeps_query() {
        let uri: Uri = "http://example.com/users/7?verbose=1".parse().unwrap();
        assert_eq!(request_url(&uri), "/users/7?verbose=1");

        let uri: Uri = "/plain".parse().unwrap();
        assert_eq!(request_url(&uri), "/plain");
    }

    #[test]
    fn test_sensitive_headers_redacted() {
        let mut headers = HeaderMap::new();
        headers.insert("authorization", HeaderValue::from_static("Bearer secret"));
        headers.insert("x-api-key", HeaderValue::from_static("k-123"));
        headers.insert("content-type", HeaderValue::from_static("application/json"));
        headers.append("accept", HeaderValue::from_static("text/html"));
        headers.append("accept", HeaderValue::from_static("application/json"));

        let sanitized = sanitize_headers(&headers);

        assert_eq!(sanitized["authorization"], REDACTED);
        assert_eq!(sanitized["x-api-key"], REDACTED);
        assert_eq!(sanitized["content-type"], "application/json");
        assert_eq!(sanitized["accept"], "text/html, application/json");
    }

    #[test]
    fn test_absent_sensitive_headers_not_added() {
        let mut headers = HeaderMap::new();
        headers.insert("host", HeaderValue::from_static("example.com"));

        let sanitized = sanitize_headers(&headers);
        assert_eq!(sanitized.len(), 1);
        assert!(!sanitized.contains_key("cookie"));
    }

    #[test]
    fn test_query_params_decoded() {
        let uri: Uri = "/search?q=hello%20world&page=2".parse().unwrap();
        let params = query_params(&uri);
        assert_eq!(params["q"], "hello world");
        assert_eq!(params["page"], "2");

        let uri: Uri = "/search".parse().unwrap();
        assert!(query_params(&uri).is_empty());
    }

    #[test]
    fn test_client_ip_sources() {
        let request = Request::builder()
            .header("x-forwarded-for", "203.0.113.9, 10.0.0.1")
            .body(())
            .unwrap();
        assert_eq!(client_ip(&request).as_deref(), Some("203.0.113.9"));

        let mut request = Request::builder()
            .header("x-forwarded-for", "203.0.113.9")
            .body(())
            .unwrap();
        let addr: SocketAddr = "192.0.2.4:5000".parse().unwrap();
        request.extensions_mut().insert(ConnectInfo(addr));
        assert_eq!(client_ip(&request).as_deref(), Some("192.0.2.4"));

        let request = Request::builder().body(()).unwrap();
        assert!(client_ip(&request).is_none());
    }

    #[test]
    fn test_parse_body() {
        assert_eq!(parse_body(b""), None);
        assert_eq!(parse_body(br#"{"a":1}"#), Some(json!({"a": 1})));
        assert_eq!(parse_body(b"not json"), Some(json!("not json")));
        assert_eq!(
            parse_body(&[0xff, 0xfe, 0x00]),
            Some(json!("<3 bytes of binary data>"))
        );
    }
}

#[cfg(test)]
mod property_tests {
    use super::*;
    use axum::http::{HeaderName, HeaderValue};
    use quickcheck_macros::quickcheck;

    #[quickcheck]
    fn prop_sensitive_values_never_stored(secret: String, index: usize) -> bool {
        let value = match HeaderValue::from_str(&secret) {
            Ok(value) => value,
            Err(_) => return true,
        };
        let name = HeaderName::from_static(SENSITIVE_HEADERS[index % SENSITIVE_HEADERS.len()]);

        let mut headers = HeaderMap::new();
        headers.insert(name.clone(), value);

        sanitize_headers(&headers).get(name.as_str()).map(String::as_str) == Some(REDACTED)
    }

    #[quickcheck]
    fn prop_excluded_when_pattern_embedded(prefix: String, pattern: String, suffix: String) -> bool {
        let url = format!("{}{}{}", prefix, pattern, suffix);
        is_excluded(&url, &[pattern])
    }
}
