/// Monitor configuration types, loading and validation
pub mod monitor_config;

pub use monitor_config::{
    AiSummarizationConfig, EmailConfig, ErrorMonitoringConfig, MetadataConfig, MonitorConfig,
    NotificationsConfig, ReportOptions, SlackConfig, SmtpAuth, SmtpConfig, TwilioConfig,
    TwilioRoute, WebhookConfig, WebhookMethod,
};
