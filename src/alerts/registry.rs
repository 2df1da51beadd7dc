use crate::alerts::email::EmailNotifier;
use crate::alerts::notifier::Notifier;
use crate::alerts::slack::SlackNotifier;
use crate::alerts::twilio::{SmsNotifier, WhatsAppNotifier};
use crate::alerts::webhook::WebhookNotifier;
use crate::config::MonitorConfig;
use crate::error::ConfigError;
use log::debug;
use std::sync::Arc;

/// Build one notifier per enabled channel
///
/// Channels that are absent or disabled are skipped. Twilio contributes an
/// SMS and a WhatsApp notifier for each configured route.
///
/// # Errors
///
/// Returns `ConfigError` if a channel's client cannot be constructed.
pub fn build_notifiers(config: &MonitorConfig) -> Result<Vec<Arc<dyn Notifier>>, ConfigError> {
    let options = config.error_monitoring.report_options();
    let channels = &config.notifications;
    let mut notifiers: Vec<Arc<dyn Notifier>> = Vec::new();

    if let Some(slack) = channels.slack.as_ref().filter(|c| c.enabled) {
        notifiers.push(Arc::new(SlackNotifier::new(slack.clone(), options)?));
    }

    if let Some(email) = channels.email.as_ref().filter(|c| c.enabled) {
        notifiers.push(Arc::new(EmailNotifier::new(email.clone(), options)?));
    }

    if let Some(twilio) = channels.twilio.as_ref().filter(|c| c.enabled) {
        if twilio.sms.is_some() {
            notifiers.push(Arc::new(SmsNotifier::new(twilio)?));
        }
        if twilio.whatsapp.is_some() {
            notifiers.push(Arc::new(WhatsAppNotifier::new(twilio)?));
        }
    }

    if let Some(webhook) = channels.webhook.as_ref().filter(|c| c.enabled) {
        notifiers.push(Arc::new(WebhookNotifier::new(webhook.clone(), options)?));
    }

    debug!(
        "Configured notification channels: {:?}",
        notifiers.iter().map(|n| n.channel()).collect::<Vec<_>>()
    );

    Ok(notifiers)
}
