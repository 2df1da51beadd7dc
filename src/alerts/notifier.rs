use crate::error::AlertError;
use crate::record::ErrorRecord;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::Instant;

/// Future returned by notifier implementations
pub type AlertFuture<'a> = Pin<Box<dyn Future<Output = Result<(), AlertError>> + Send + 'a>>;

/// A notification channel that can deliver an error record
///
/// Implementations own their transport (HTTP, SMTP, ...) and must not mutate
/// the record. Calling `send_alert` on a disabled channel is a no-op.
pub trait Notifier: Send + Sync {
    /// Short channel name used in logs
    fn channel(&self) -> &str;

    fn send_alert<'a>(&'a self, record: &'a ErrorRecord) -> AlertFuture<'a>;
}

/// How a [`RecordingNotifier`] answers each call
#[derive(Debug, Clone)]
enum Behavior {
    Succeed,
    Fail(String),
    Panic(String),
}

/// Notifier for testing and development that records every record it receives
#[derive(Clone)]
pub struct RecordingNotifier {
    name: String,
    behavior: Behavior,
    delay: Option<Duration>,
    received: Arc<Mutex<Vec<ErrorRecord>>>,
}

impl RecordingNotifier {
    /// A notifier that accepts every record
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            behavior: Behavior::Succeed,
            delay: None,
            received: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// A notifier that records the call and then reports a delivery failure
    pub fn failing(name: &str, message: &str) -> Self {
        Self {
            behavior: Behavior::Fail(message.to_string()),
            ..Self::new(name)
        }
    }

    /// A notifier that records the call and then panics
    pub fn panicking(name: &str, message: &str) -> Self {
        Self {
            behavior: Behavior::Panic(message.to_string()),
            ..Self::new(name)
        }
    }

    /// Delay every delivery
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn call_count(&self) -> usize {
        self.lock_received().len()
    }

    /// Records received so far, in call order
    pub fn received(&self) -> Vec<ErrorRecord> {
        self.lock_received().clone()
    }

    /// Wait until at least `count` records arrived or `timeout` elapsed
    pub async fn wait_for_calls(&self, count: usize, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if self.call_count() >= count {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    fn lock_received(&self) -> MutexGuard<'_, Vec<ErrorRecord>> {
        self.received.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Notifier for RecordingNotifier {
    fn channel(&self) -> &str {
        &self.name
    }

    fn send_alert<'a>(&'a self, record: &'a ErrorRecord) -> AlertFuture<'a> {
        Box::pin(async move {
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }

            self.lock_received().push(record.clone());

            match &self.behavior {
                Behavior::Succeed => Ok(()),
                Behavior::Fail(message) => Err(AlertError::NotificationFailed(message.clone())),
                Behavior::Panic(message) => panic!("{}", message),
            }
        })
    }
}

/// Truncate text to at most `max_chars` characters, marking the cut with `...`
pub(crate) fn truncate_text(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let kept: String = text.chars().take(max_chars).collect();
    format!("{}...", kept)
}

/// Map a non-success HTTP status into a delivery failure
pub(crate) async fn ensure_success(
    channel: &str,
    response: reqwest::Response,
) -> Result<(), AlertError> {
    let status = response.status();
    if status.is_success() {
        return Ok(());
    }
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "Unknown error".to_string());
    Err(AlertError::NotificationFailed(format!(
        "{} returned {}: {}",
        channel, status, body
    )))
}
