//! Monitor configuration loaded from TOML
//!
//! The configuration is consumed by the capture layer, the pipeline and the
//! channel builders. It is validated once at load time; invalid bounds are
//! rejected rather than clamped.

use crate::error::ConfigError;
use crate::history::DEFAULT_MAX_HISTORY;
use crate::record::Metadata;
use serde::Deserialize;
use std::collections::{BTreeMap, HashSet};
use std::path::Path;

/// Environment variable consulted when no environment is configured
pub const ENVIRONMENT_VAR: &str = "APP_ENV";
/// Environment variable consulted when no service name is configured
pub const SERVICE_VAR: &str = "SERVICE_NAME";
/// Environment variable consulted when no version is configured
pub const VERSION_VAR: &str = "APP_VERSION";

/// Top-level monitor configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub error_monitoring: ErrorMonitoringConfig,
    pub metadata: MetadataConfig,
    pub notifications: NotificationsConfig,
    pub ai_summarization: Option<AiSummarizationConfig>,
}

/// What to monitor and what to include in records
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ErrorMonitoringConfig {
    /// Status codes that make a response monitorable
    pub status_codes: Vec<u16>,
    pub include_stack_trace: bool,
    pub include_request_body: bool,
    pub include_response_body: bool,
    pub include_headers: bool,
    /// URL substrings that exclude a request from monitoring
    pub exclude_paths: Vec<String>,
}

impl Default for ErrorMonitoringConfig {
    fn default() -> Self {
        Self {
            status_codes: vec![500, 502, 503, 504],
            include_stack_trace: false,
            include_request_body: false,
            include_response_body: false,
            include_headers: false,
            exclude_paths: Vec::new(),
        }
    }
}

impl ErrorMonitoringConfig {
    /// Status codes as a lookup set
    pub fn status_set(&self) -> HashSet<u16> {
        self.status_codes.iter().copied().collect()
    }

    /// Field inclusion flags used by formatters
    pub fn report_options(&self) -> ReportOptions {
        ReportOptions {
            include_stack_trace: self.include_stack_trace,
            include_request_body: self.include_request_body,
            include_response_body: self.include_response_body,
            include_headers: self.include_headers,
        }
    }
}

/// Include flags shared by the summarizer prompt and channel formatters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReportOptions {
    pub include_stack_trace: bool,
    pub include_request_body: bool,
    pub include_response_body: bool,
    pub include_headers: bool,
}

/// Explicit metadata values; absent values fall back to the process environment
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MetadataConfig {
    pub environment: Option<String>,
    pub service: Option<String>,
    pub version: Option<String>,
}

impl MetadataConfig {
    /// Resolve the metadata attached to every record
    ///
    /// Precedence: configured value, then environment variable, then the
    /// built-in default (`development`, `api`, `1.0.0`).
    pub fn resolve(&self) -> Metadata {
        self.resolve_with(|key| std::env::var(key).ok())
    }

    /// Resolve using a custom environment lookup
    pub fn resolve_with<F>(&self, lookup: F) -> Metadata
    where
        F: Fn(&str) -> Option<String>,
    {
        let pick = |configured: &Option<String>, var: &str, fallback: &str| {
            configured
                .clone()
                .or_else(|| lookup(var))
                .unwrap_or_else(|| fallback.to_string())
        };

        Metadata::standard(
            &pick(&self.environment, ENVIRONMENT_VAR, "development"),
            &pick(&self.service, SERVICE_VAR, "api"),
            &pick(&self.version, VERSION_VAR, "1.0.0"),
        )
    }
}

/// Per-channel notification settings
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct NotificationsConfig {
    pub slack: Option<SlackConfig>,
    pub email: Option<EmailConfig>,
    pub twilio: Option<TwilioConfig>,
    pub webhook: Option<WebhookConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SlackConfig {
    pub enabled: bool,
    pub webhook_url: String,
    #[serde(default)]
    pub channel: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub icon_emoji: Option<String>,
    #[serde(default)]
    pub icon_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EmailConfig {
    pub enabled: bool,
    pub smtp: SmtpConfig,
    pub from: String,
    pub to: Vec<String>,
    #[serde(default)]
    pub cc: Vec<String>,
    #[serde(default)]
    pub subject: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    /// Implicit TLS; STARTTLS is used otherwise
    #[serde(default)]
    pub secure: bool,
    pub auth: SmtpAuth,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SmtpAuth {
    pub user: String,
    pub pass: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TwilioConfig {
    pub enabled: bool,
    pub account_sid: String,
    pub auth_token: String,
    #[serde(default)]
    pub sms: Option<TwilioRoute>,
    #[serde(default)]
    pub whatsapp: Option<TwilioRoute>,
    #[serde(default = "default_twilio_base_url")]
    pub base_url: String,
}

/// Sender and recipients for one Twilio messaging route
#[derive(Debug, Clone, Deserialize)]
pub struct TwilioRoute {
    pub from: String,
    pub to: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookConfig {
    pub enabled: bool,
    pub url: String,
    #[serde(default)]
    pub method: WebhookMethod,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}

/// HTTP verb used for webhook delivery
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum WebhookMethod {
    Get,
    #[default]
    Post,
    Put,
    Patch,
    Delete,
}

/// OpenAI-backed summarization settings
#[derive(Debug, Clone, Deserialize)]
pub struct AiSummarizationConfig {
    pub enabled: bool,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    /// Number of past errors kept as context
    #[serde(default = "default_max_history_length")]
    pub max_history_length: usize,
    #[serde(default = "default_openai_base_url")]
    pub base_url: String,
}

impl Default for AiSummarizationConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            api_key: String::new(),
            model: default_model(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            max_history_length: default_max_history_length(),
            base_url: default_openai_base_url(),
        }
    }
}

fn default_model() -> String {
    "gpt-4-turbo".to_string()
}

fn default_max_tokens() -> u32 {
    350
}

fn default_temperature() -> f32 {
    0.3
}

fn default_max_history_length() -> usize {
    DEFAULT_MAX_HISTORY
}

fn default_openai_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_twilio_base_url() -> String {
    "https://api.twilio.com".to_string()
}

impl MonitorConfig {
    /// Load and validate a configuration file
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the file cannot be read, is not valid TOML,
    /// or fails validation.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            ConfigError::ReadError(format!("{}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&contents)
    }

    /// Parse and validate configuration from a TOML string
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let config: MonitorConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Whether AI summarization is switched on
    pub fn ai_enabled(&self) -> bool {
        self.ai_summarization
            .as_ref()
            .map(|ai| ai.enabled)
            .unwrap_or(false)
    }

    /// Configured history length, or the default when absent
    pub fn max_history_length(&self) -> usize {
        self.ai_summarization
            .as_ref()
            .map(|ai| ai.max_history_length)
            .unwrap_or(DEFAULT_MAX_HISTORY)
    }

    /// Check bounds and required fields of enabled features
    pub fn validate(&self) -> Result<(), ConfigError> {
        let monitoring = &self.error_monitoring;
        if monitoring.status_codes.is_empty() {
            return Err(invalid("error_monitoring.status_codes must not be empty"));
        }
        if let Some(code) = monitoring
            .status_codes
            .iter()
            .find(|code| !(100..=599).contains(*code))
        {
            return Err(invalid(&format!(
                "error_monitoring.status_codes contains invalid HTTP status {}",
                code
            )));
        }
        // An empty pattern is a substring of every URL
        if monitoring.exclude_paths.iter().any(|p| p.is_empty()) {
            return Err(invalid("error_monitoring.exclude_paths must not contain empty entries"));
        }

        if let Some(ai) = &self.ai_summarization {
            if ai.max_history_length == 0 {
                return Err(invalid(
                    "ai_summarization.max_history_length must be at least 1",
                ));
            }
            if !(0.0..=2.0).contains(&ai.temperature) {
                return Err(invalid("ai_summarization.temperature must be within 0.0..=2.0"));
            }
            if ai.enabled && ai.api_key.trim().is_empty() {
                return Err(invalid("ai_summarization.api_key is required when enabled"));
            }
        }

        self.validate_notifications()
    }

    fn validate_notifications(&self) -> Result<(), ConfigError> {
        let notifications = &self.notifications;

        if let Some(slack) = notifications.slack.as_ref().filter(|s| s.enabled) {
            if slack.webhook_url.trim().is_empty() {
                return Err(invalid("notifications.slack.webhook_url is required"));
            }
        }

        if let Some(email) = notifications.email.as_ref().filter(|e| e.enabled) {
            if email.smtp.host.trim().is_empty() {
                return Err(invalid("notifications.email.smtp.host is required"));
            }
            if email.to.is_empty() {
                return Err(invalid("notifications.email.to must list at least one recipient"));
            }
        }

        if let Some(twilio) = notifications.twilio.as_ref().filter(|t| t.enabled) {
            if twilio.account_sid.trim().is_empty() || twilio.auth_token.trim().is_empty() {
                return Err(invalid(
                    "notifications.twilio.account_sid and auth_token are required",
                ));
            }
            for (name, route) in [("sms", &twilio.sms), ("whatsapp", &twilio.whatsapp)] {
                if let Some(route) = route {
                    if route.to.is_empty() {
                        return Err(invalid(&format!(
                            "notifications.twilio.{}.to must list at least one recipient",
                            name
                        )));
                    }
                }
            }
        }

        if let Some(webhook) = notifications.webhook.as_ref().filter(|w| w.enabled) {
            if webhook.url.trim().is_empty() {
                return Err(invalid("notifications.webhook.url is required"));
            }
        }

        Ok(())
    }
}

fn invalid(message: &str) -> ConfigError {
    ConfigError::ValidationError(message.to_string())
}
