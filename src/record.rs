//! Core record types for the API error monitor
//!
//! This module defines the data structures that flow from the capture layer
//! through the error pipeline to the summarizer and notification channels.

use chrono::{DateTime, Utc};
use log::warn;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Timestamp type for consistent time handling across the crate
pub type Timestamp = DateTime<Utc>;

/// Marker stored in place of sensitive header values
pub const REDACTED: &str = "[REDACTED]";

/// Header names whose values are always redacted before storage
pub const SENSITIVE_HEADERS: [&str; 5] = [
    "authorization",
    "cookie",
    "set-cookie",
    "x-api-key",
    "api-key",
];

/// Serialized top-level field names that extra fields may not shadow
pub const RESERVED_FIELDS: [&str; 5] = ["error", "request", "response", "metadata", "aiSummary"];

/// Snapshot of the inbound request taken when the exchange started
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RequestSnapshot {
    /// HTTP method, e.g. `GET`
    pub method: String,
    /// Request target as received (path and query)
    pub url: String,
    /// Route parameters matched by the router
    #[serde(default)]
    pub params: BTreeMap<String, String>,
    /// Decoded query-string parameters
    #[serde(default)]
    pub query: BTreeMap<String, String>,
    /// Request body, only when request bodies are included
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
    /// Sanitized headers, only when headers are included
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headers: Option<BTreeMap<String, String>>,
    /// Client address, if known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,
    /// When the request was captured
    pub timestamp: Timestamp,
}

impl RequestSnapshot {
    /// Create a snapshot with only method and URL set, captured now
    pub fn new(method: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            url: url.into(),
            params: BTreeMap::new(),
            query: BTreeMap::new(),
            body: None,
            headers: None,
            ip: None,
            timestamp: Utc::now(),
        }
    }

    /// `METHOD url`, as shown in alerts and prompts
    pub fn endpoint(&self) -> String {
        format!("{} {}", self.method, self.url)
    }
}

/// Description of the error condition that made a response monitorable
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ErrorDescriptor {
    pub name: String,
    pub message: String,
    pub status_code: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    pub timestamp: Timestamp,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
}

impl ErrorDescriptor {
    /// Synthetic descriptor for an HTTP response that finished with an error status
    pub fn for_status(status_code: u16, method: &str, url: &str) -> Self {
        Self {
            name: "ApiError".to_string(),
            message: format!("HTTP {} - {} {}", status_code, method, url),
            status_code,
            path: Some(url.to_string()),
            timestamp: Utc::now(),
            stack: None,
        }
    }
}

/// What the handler sent back
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ResponseSnapshot {
    pub status_code: u16,
    /// Captured body, JSON-parsed when possible
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
}

/// Confidence the summarizer attaches to its analysis
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    Low,
    Medium,
    High,
}

impl Confidence {
    /// Parse a confidence label, defaulting to `Medium` for unknown values
    pub fn parse(label: &str) -> Self {
        match label.trim().to_lowercase().as_str() {
            "high" => Confidence::High,
            "low" => Confidence::Low,
            _ => Confidence::Medium,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Confidence::High => "high",
            Confidence::Medium => "medium",
            Confidence::Low => "low",
        }
    }
}

/// AI-generated diagnosis attached to a record
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AiSummary {
    /// Short description of what went wrong
    pub summary: String,
    /// Ordered list of suggested fixes
    #[serde(default)]
    pub possible_solutions: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<Confidence>,
}

impl AiSummary {
    pub fn new(
        summary: impl Into<String>,
        possible_solutions: Vec<String>,
        confidence: Option<Confidence>,
    ) -> Self {
        Self {
            summary: summary.into(),
            possible_solutions,
            confidence,
        }
    }

    /// Summary returned by a summarizer whose feature is switched off
    pub fn unavailable() -> Self {
        Self::new("AI analysis not available", Vec::new(), None)
    }
}

/// Free-form metadata attached to every record (environment, service, version, ...)
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct Metadata(BTreeMap<String, Value>);

impl Metadata {
    pub fn new() -> Self {
        Self::default()
    }

    /// Metadata with the three standard keys set
    pub fn standard(environment: &str, service: &str, version: &str) -> Self {
        let mut metadata = Self::new();
        metadata.insert("environment", environment);
        metadata.insert("service", service);
        metadata.insert("version", version);
        metadata
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// String value of a key, if present and a string
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    pub fn environment(&self) -> Option<&str> {
        self.get_str("environment")
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Render `key: value` pairs; strings are shown without quotes
    pub fn display_pairs(&self) -> Vec<(String, String)> {
        self.0
            .iter()
            .map(|(k, v)| {
                let rendered = match v {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                (k.clone(), rendered)
            })
            .collect()
    }
}

/// Canonical unit moving through the pipeline
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ErrorRecord {
    pub error: ErrorDescriptor,
    pub request: RequestSnapshot,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<ResponseSnapshot>,
    #[serde(default)]
    pub metadata: Metadata,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ai_summary: Option<AiSummary>,
    /// Additional top-level fields supplied by a transform hook
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ErrorRecord {
    pub fn new(
        error: ErrorDescriptor,
        request: RequestSnapshot,
        response: Option<ResponseSnapshot>,
        metadata: Metadata,
    ) -> Self {
        Self {
            error,
            request,
            response,
            metadata,
            ai_summary: None,
            extra: Map::new(),
        }
    }

    /// Shallow-merge a patch: every field it carries replaces the record's field
    ///
    /// Extra fields named like a typed field (see [`RESERVED_FIELDS`]) are
    /// dropped with a warning; use the typed patch fields instead.
    pub fn apply_patch(&mut self, patch: RecordPatch) {
        if let Some(error) = patch.error {
            self.error = error;
        }
        if let Some(request) = patch.request {
            self.request = request;
        }
        if let Some(response) = patch.response {
            self.response = Some(response);
        }
        if let Some(metadata) = patch.metadata {
            self.metadata = metadata;
        }
        for (key, value) in patch.extra {
            if RESERVED_FIELDS.contains(&key.as_str()) {
                warn!("Ignoring extra field '{}' that collides with a record field", key);
                continue;
            }
            self.extra.insert(key, value);
        }
    }
}

/// Overrides returned by a transform hook
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordPatch {
    pub error: Option<ErrorDescriptor>,
    pub request: Option<RequestSnapshot>,
    pub response: Option<ResponseSnapshot>,
    pub metadata: Option<Metadata>,
    pub extra: Map<String, Value>,
}

impl RecordPatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    /// True when the patch would not change anything
    pub fn is_empty(&self) -> bool {
        self.error.is_none()
            && self.request.is_none()
            && self.response.is_none()
            && self.metadata.is_none()
            && self.extra.is_empty()
    }
}

/// Caller-supplied hook that may override fields of a freshly built record
pub type TransformHook = Arc<
    dyn Fn(&ErrorDescriptor, &RequestSnapshot, Option<&ResponseSnapshot>) -> Option<RecordPatch>
        + Send
        + Sync,
>;
