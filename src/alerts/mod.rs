/// Notification channels and the notifier capability
pub mod email;
pub mod notifier;
pub mod registry;
pub mod slack;
pub mod twilio;
pub mod webhook;

pub use email::EmailNotifier;
pub use notifier::{AlertFuture, Notifier, RecordingNotifier};
pub use registry::build_notifiers;
pub use slack::SlackNotifier;
pub use twilio::{SmsNotifier, WhatsAppNotifier};
pub use webhook::WebhookNotifier;
