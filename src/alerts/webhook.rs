//! Generic HTTP webhook channel

use crate::alerts::notifier::{ensure_success, AlertFuture, Notifier};
use crate::config::{ReportOptions, WebhookConfig, WebhookMethod};
use crate::error::ConfigError;
use crate::record::ErrorRecord;
use log::info;
use reqwest::{Client, Method};
use serde_json::{json, Map, Value};
use std::time::Duration;

pub struct WebhookNotifier {
    client: Client,
    config: WebhookConfig,
    options: ReportOptions,
}

impl WebhookNotifier {
    pub fn new(config: WebhookConfig, options: ReportOptions) -> Result<Self, ConfigError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| {
                ConfigError::ValidationError(format!("failed to build HTTP client: {}", e))
            })?;

        Ok(Self {
            client,
            config,
            options,
        })
    }

    fn http_method(method: WebhookMethod) -> Method {
        match method {
            WebhookMethod::Get => Method::GET,
            WebhookMethod::Post => Method::POST,
            WebhookMethod::Put => Method::PUT,
            WebhookMethod::Patch => Method::PATCH,
            WebhookMethod::Delete => Method::DELETE,
        }
    }

    /// Build the JSON payload, honouring the include flags
    pub fn format_payload(&self, record: &ErrorRecord) -> Value {
        let error = &record.error;
        let request = &record.request;

        let mut error_json = Map::new();
        error_json.insert("name".into(), json!(error.name));
        error_json.insert("message".into(), json!(error.message));
        error_json.insert("statusCode".into(), json!(error.status_code));
        error_json.insert(
            "path".into(),
            json!(error.path.clone().unwrap_or_else(|| request.url.clone())),
        );
        error_json.insert("timestamp".into(), json!(error.timestamp));
        if let Some(stack) = error.stack.as_ref().filter(|_| self.options.include_stack_trace) {
            error_json.insert("stack".into(), json!(stack));
        }

        let mut request_json = Map::new();
        request_json.insert("method".into(), json!(request.method));
        request_json.insert("url".into(), json!(request.url));
        request_json.insert("timestamp".into(), json!(request.timestamp));
        if let Some(ip) = &request.ip {
            request_json.insert("ip".into(), json!(ip));
        }
        if let Some(body) = request.body.as_ref().filter(|_| self.options.include_request_body) {
            request_json.insert("body".into(), body.clone());
        }
        if let Some(headers) = request.headers.as_ref().filter(|_| self.options.include_headers) {
            request_json.insert("headers".into(), json!(headers));
        }
        if !request.params.is_empty() {
            request_json.insert("params".into(), json!(request.params));
        }
        if !request.query.is_empty() {
            request_json.insert("query".into(), json!(request.query));
        }

        let mut payload = Map::new();
        payload.insert("error".into(), Value::Object(error_json));
        payload.insert("request".into(), Value::Object(request_json));
        payload.insert("metadata".into(), json!(record.metadata));

        if let Some(response) = &record.response {
            let mut response_json = Map::new();
            response_json.insert("statusCode".into(), json!(response.status_code));
            if let Some(body) = response
                .body
                .as_ref()
                .filter(|_| self.options.include_response_body)
            {
                response_json.insert("body".into(), body.clone());
            }
            payload.insert("response".into(), Value::Object(response_json));
        }

        if let Some(summary) = &record.ai_summary {
            payload.insert("aiSummary".into(), json!(summary));
        }

        for (key, value) in &record.extra {
            payload.entry(key.clone()).or_insert_with(|| value.clone());
        }

        Value::Object(payload)
    }
}

impl Notifier for WebhookNotifier {
    fn channel(&self) -> &str {
        "webhook"
    }

    fn send_alert<'a>(&'a self, record: &'a ErrorRecord) -> AlertFuture<'a> {
        Box::pin(async move {
            if !self.config.enabled {
                return Ok(());
            }

            let payload = self.format_payload(record);
            let mut builder = self
                .client
                .request(Self::http_method(self.config.method), &self.config.url);
            for (name, value) in &self.config.headers {
                builder = builder.header(name, value);
            }

            builder = match self.config.method {
                WebhookMethod::Get => builder.query(&[("payload", payload.to_string())]),
                _ => builder.json(&payload),
            };

            let response = builder.send().await?;
            ensure_success("webhook", response).await?;

            info!("Sent webhook alert to {}", self.config.url);
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{AiSummary, ErrorDescriptor, Metadata, RequestSnapshot, ResponseSnapshot};
    use std::collections::BTreeMap;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn create_config(url: &str, method: WebhookMethod) -> WebhookConfig {
        let mut headers = BTreeMap::new();
        headers.insert("x-team".to_string(), "payments".to_string());
        WebhookConfig {
            enabled: true,
            url: url.to_string(),
            method,
            headers,
        }
    }

    fn create_record() -> ErrorRecord {
        let mut request = RequestSnapshot::new("PUT", "/carts/9?force=true");
        request.query.insert("force".to_string(), "true".to_string());
        request.body = Some(json!({"items": []}));
        request.ip = Some("10.0.0.8".to_string());

        let mut error = ErrorDescriptor::for_status(502, "PUT", "/carts/9?force=true");
        error.stack = Some("upstream failed".to_string());

        ErrorRecord::new(
            error,
            request,
            Some(ResponseSnapshot {
                status_code: 502,
                body: Some(json!({"detail": "bad gateway"})),
            }),
            Metadata::standard("prod", "carts", "1.2.0"),
        )
    }

    #[test]
    fn test_payload_without_optional_fields() {
        let notifier = WebhookNotifier::new(
            create_config("http://localhost", WebhookMethod::Post),
            ReportOptions::default(),
        )
        .unwrap();
        let payload = notifier.format_payload(&create_record());

        assert_eq!(payload["error"]["statusCode"], 502);
        assert_eq!(payload["error"]["path"], "/carts/9?force=true");
        assert!(payload["error"].get("stack").is_none());
        assert!(payload["request"].get("body").is_none());
        assert_eq!(payload["request"]["ip"], "10.0.0.8");
        assert_eq!(payload["request"]["query"]["force"], "true");
        assert!(payload["request"].get("params").is_none());
        assert_eq!(payload["response"]["statusCode"], 502);
        assert!(payload["response"].get("body").is_none());
        assert_eq!(payload["metadata"]["service"], "carts");
        assert!(payload.get("aiSummary").is_none());
    }

    #[test]
    fn test_payload_with_all_fields() {
        let options = ReportOptions {
            include_stack_trace: true,
            include_request_body: true,
            include_response_body: true,
            include_headers: true,
        };
        let notifier = WebhookNotifier::new(
            create_config("http://localhost", WebhookMethod::Post),
            options,
        )
        .unwrap();
        let mut record = create_record();
        record.ai_summary = Some(AiSummary::new("Upstream down", Vec::new(), None));
        record.extra.insert("tenant".to_string(), json!("acme"));

        let payload = notifier.format_payload(&record);
        assert_eq!(payload["error"]["stack"], "upstream failed");
        assert_eq!(payload["request"]["body"], json!({"items": []}));
        assert_eq!(payload["response"]["body"]["detail"], "bad gateway");
        assert_eq!(payload["aiSummary"]["summary"], "Upstream down");
        assert_eq!(payload["tenant"], "acme");
    }

    #[tokio::test]
    async fn test_send_with_configured_method_and_headers() {
        let mock_server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/alerts"))
            .and(header("x-team", "payments"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&mock_server)
            .await;

        let url = format!("{}/alerts", mock_server.uri());
        let notifier =
            WebhookNotifier::new(create_config(&url, WebhookMethod::Put), ReportOptions::default())
                .unwrap();

        notifier.send_alert(&create_record()).await.unwrap();
    }

    #[tokio::test]
    async fn test_get_sends_payload_as_query() {
        let mock_server = MockServer::start().await;
        let url = format!("{}/alerts", mock_server.uri());
        let notifier =
            WebhookNotifier::new(create_config(&url, WebhookMethod::Get), ReportOptions::default())
                .unwrap();
        let record = create_record();
        let expected = notifier.format_payload(&record).to_string();

        Mock::given(method("GET"))
            .and(path("/alerts"))
            .and(query_param("payload", expected.as_str()))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&mock_server)
            .await;

        notifier.send_alert(&record).await.unwrap();
    }

    #[tokio::test]
    async fn test_send_reports_failure_status() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&mock_server)
            .await;

        let notifier = WebhookNotifier::new(
            create_config(&mock_server.uri(), WebhookMethod::Post),
            ReportOptions::default(),
        )
        .unwrap();

        assert!(notifier.send_alert(&create_record()).await.is_err());
    }
}
