//! Twilio SMS and WhatsApp channels
//!
//! Both channels share one REST client and differ only in the route they
//! read from the configuration and in how verbose the message body is.
//! Messages to multiple recipients are sent concurrently; the first failure
//! is reported after all sends have completed.

use crate::alerts::notifier::{ensure_success, truncate_text, AlertFuture, Notifier};
use crate::config::{TwilioConfig, TwilioRoute};
use crate::error::{AlertError, ConfigError};
use crate::record::ErrorRecord;
use chrono::Local;
use futures_util::future::join_all;
use log::{debug, info};
use reqwest::Client;
use std::time::Duration;

/// SMS bodies carry only the start of the AI summary
const SMS_SUMMARY_CHARS: usize = 100;

/// Thin client over the Twilio Messages REST endpoint
struct TwilioClient {
    http: Client,
    account_sid: String,
    auth_token: String,
    base_url: String,
}

impl TwilioClient {
    fn new(config: &TwilioConfig) -> Result<Self, ConfigError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| {
                ConfigError::ValidationError(format!("failed to build HTTP client: {}", e))
            })?;

        Ok(Self {
            http,
            account_sid: config.account_sid.clone(),
            auth_token: config.auth_token.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    fn messages_url(&self) -> String {
        format!(
            "{}/2010-04-01/Accounts/{}/Messages.json",
            self.base_url, self.account_sid
        )
    }

    async fn send_message(&self, from: &str, to: &str, body: &str) -> Result<(), AlertError> {
        if to.trim().is_empty() {
            return Err(AlertError::InvalidRecipient("empty recipient".to_string()));
        }

        let response = self
            .http
            .post(self.messages_url())
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .form(&[("From", from), ("To", to), ("Body", body)])
            .send()
            .await?;
        ensure_success("twilio", response).await?;

        debug!("Twilio message delivered to {}", to);
        Ok(())
    }

    /// Send `body` to every recipient of `route`
    async fn broadcast(&self, route: &TwilioRoute, body: &str) -> Result<(), AlertError> {
        let sends = route
            .to
            .iter()
            .map(|recipient| self.send_message(&route.from, recipient, body));

        join_all(sends).await.into_iter().collect::<Result<Vec<_>, _>>()?;
        Ok(())
    }
}

fn local_time(record: &ErrorRecord) -> String {
    record
        .error
        .timestamp
        .with_timezone(&Local)
        .format("%Y-%m-%d %H:%M:%S")
        .to_string()
}

/// Compact text alerts over SMS
pub struct SmsNotifier {
    client: TwilioClient,
    enabled: bool,
    route: Option<TwilioRoute>,
}

impl SmsNotifier {
    pub fn new(config: &TwilioConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            client: TwilioClient::new(config)?,
            enabled: config.enabled,
            route: config.sms.clone(),
        })
    }

    pub fn format_message(record: &ErrorRecord) -> String {
        let error = &record.error;
        let mut message = format!(
            "⚠️ API Error: {} {}\nMessage: {}\nEndpoint: {}\nTime: {}\n",
            error.status_code,
            error.name,
            error.message,
            record.request.endpoint(),
            local_time(record)
        );

        if let Some(environment) = record.metadata.environment() {
            message.push_str(&format!("Env: {}\n", environment));
        }

        if let Some(summary) = record.ai_summary.as_ref().filter(|s| !s.summary.is_empty()) {
            message.push_str(&format!(
                "\nAI Analysis: {}\n",
                truncate_text(&summary.summary, SMS_SUMMARY_CHARS)
            ));
        }

        message
    }
}

impl Notifier for SmsNotifier {
    fn channel(&self) -> &str {
        "sms"
    }

    fn send_alert<'a>(&'a self, record: &'a ErrorRecord) -> AlertFuture<'a> {
        Box::pin(async move {
            let route = match self.route.as_ref().filter(|_| self.enabled) {
                Some(route) => route,
                None => return Ok(()),
            };

            self.client
                .broadcast(route, &Self::format_message(record))
                .await?;

            info!("Sent SMS alert to {} recipient(s)", route.to.len());
            Ok(())
        })
    }
}

/// Detailed alerts over WhatsApp
pub struct WhatsAppNotifier {
    client: TwilioClient,
    enabled: bool,
    route: Option<TwilioRoute>,
}

impl WhatsAppNotifier {
    pub fn new(config: &TwilioConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            client: TwilioClient::new(config)?,
            enabled: config.enabled,
            route: config.whatsapp.clone(),
        })
    }

    pub fn format_message(record: &ErrorRecord) -> String {
        let error = &record.error;
        let mut message = format!(
            "*🚨 API Error: {} {}*\n\n*Error Message:* {}\n*Endpoint:* {}\n*Time:* {}\n",
            error.status_code,
            error.name,
            error.message,
            record.request.endpoint(),
            local_time(record)
        );

        if !record.metadata.is_empty() {
            message.push_str("\n*Environment Information:*\n");
            for (key, value) in record.metadata.display_pairs() {
                message.push_str(&format!("- *{}:* {}\n", key, value));
            }
        }

        if let Some(summary) = &record.ai_summary {
            message.push_str(&format!("\n*AI Analysis:*\n{}\n", summary.summary));
            if !summary.possible_solutions.is_empty() {
                message.push_str("\n*Possible Solutions:*\n");
                for (i, solution) in summary.possible_solutions.iter().enumerate() {
                    message.push_str(&format!("{}. {}\n", i + 1, solution));
                }
            }
        }

        message.push_str("\n_Sent by API Monitor_");
        message
    }
}

impl Notifier for WhatsAppNotifier {
    fn channel(&self) -> &str {
        "whatsapp"
    }

    fn send_alert<'a>(&'a self, record: &'a ErrorRecord) -> AlertFuture<'a> {
        Box::pin(async move {
            let route = match self.route.as_ref().filter(|_| self.enabled) {
                Some(route) => route,
                None => return Ok(()),
            };

            self.client
                .broadcast(route, &Self::format_message(record))
                .await?;

            info!("Sent WhatsApp alert to {} recipient(s)", route.to.len());
            Ok(())
        })
    }
}
