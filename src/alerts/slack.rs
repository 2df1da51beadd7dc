//! Slack incoming-webhook channel
//!
//! Formats an error record as a Block Kit message and posts it to the
//! configured webhook URL.

use crate::alerts::notifier::{ensure_success, truncate_text, AlertFuture, Notifier};
use crate::config::{ReportOptions, SlackConfig};
use crate::error::ConfigError;
use crate::record::ErrorRecord;
use chrono::Utc;
use log::info;
use reqwest::Client;
use serde_json::{json, Map, Value};
use std::time::Duration;

/// Slack rejects section text longer than 3000 characters
const MAX_STACK_CHARS: usize = 2900;

pub struct SlackNotifier {
    client: Client,
    config: SlackConfig,
    options: ReportOptions,
}

impl SlackNotifier {
    pub fn new(config: SlackConfig, options: ReportOptions) -> Result<Self, ConfigError> {
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

    /// Attachment colour: red for 5xx, orange for 4xx, blue otherwise
    fn status_color(status_code: u16) -> &'static str {
        match status_code {
            500..=u16::MAX => "#FF0000",
            400..=499 => "#FFA500",
            _ => "#36C5F0",
        }
    }

    /// Build the Block Kit payload for a record
    pub fn format_message(&self, record: &ErrorRecord) -> Value {
        let error = &record.error;
        let request = &record.request;

        let mut blocks = vec![
            json!({
                "type": "header",
                "text": {
                    "type": "plain_text",
                    "text": format!("🚨 API Error: {} {}", error.status_code, error.name),
                    "emoji": true
                }
            }),
            json!({
                "type": "section",
                "text": {
                    "type": "mrkdwn",
                    "text": format!(
                        "*Error:* {}\n*Path:* `{}`\n*Time:* {}",
                        error.message,
                        request.endpoint(),
                        error.timestamp.to_rfc3339()
                    )
                }
            }),
            json!({ "type": "divider" }),
        ];

        if !record.metadata.is_empty() {
            let metadata_text = record
                .metadata
                .display_pairs()
                .into_iter()
                .map(|(key, value)| format!("*{}:* {}", key, value))
                .collect::<Vec<_>>()
                .join("\n");
            blocks.push(section(format!(
                "*Environment Information*\n{}",
                metadata_text
            )));
        }

        if let Some(stack) = error.stack.as_ref().filter(|_| self.options.include_stack_trace) {
            blocks.push(section(format!(
                "*Stack Trace*\n```{}```",
                truncate_text(stack, MAX_STACK_CHARS)
            )));
        }

        if let Some(summary) = &record.ai_summary {
            let mut text = format!("*AI Analysis*\n{}", summary.summary);
            if !summary.possible_solutions.is_empty() {
                text.push_str("\n\n*Possible Solutions*:\n");
                text.push_str(
                    &summary
                        .possible_solutions
                        .iter()
                        .enumerate()
                        .map(|(i, solution)| format!("{}. {}", i + 1, solution))
                        .collect::<Vec<_>>()
                        .join("\n"),
                );
            }
            blocks.push(section(text));
        }

        let mut payload = Map::new();
        payload.insert("blocks".to_string(), Value::Array(blocks));
        payload.insert(
            "attachments".to_string(),
            json!([{
                "color": Self::status_color(error.status_code),
                "blocks": [{
                    "type": "context",
                    "elements": [{
                        "type": "mrkdwn",
                        "text": format!(
                            "Sent by API Monitor | Status: {} | {}",
                            error.status_code,
                            Utc::now().to_rfc3339()
                        )
                    }]
                }]
            }]),
        );

        let optional = [
            ("channel", &self.config.channel),
            ("username", &self.config.username),
            ("icon_emoji", &self.config.icon_emoji),
            ("icon_url", &self.config.icon_url),
        ];
        for (key, value) in optional {
            if let Some(value) = value {
                payload.insert(key.to_string(), Value::String(value.clone()));
            }
        }

        Value::Object(payload)
    }
}

fn section(text: String) -> Value {
    json!({
        "type": "section",
        "text": { "type": "mrkdwn", "text": text }
    })
}

impl Notifier for SlackNotifier {
    fn channel(&self) -> &str {
        "slack"
    }

    fn send_alert<'a>(&'a self, record: &'a ErrorRecord) -> AlertFuture<'a> {
        Box::pin(async move {
            if !self.config.enabled {
                return Ok(());
            }

            let message = self.format_message(record);
            let response = self
                .client
                .post(&self.config.webhook_url)
                .json(&message)
                .send()
                .await?;
            ensure_success("slack", response).await?;

            info!("Sent Slack alert: {}", record.error.message);
            Ok(())
        })
    }
}
