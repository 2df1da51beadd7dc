//! Error-processing pipeline
//!
//! The pipeline turns one monitorable exchange into an [`ErrorRecord`] and
//! runs it through a fixed sequence: build, transform, record in history,
//! summarize, fan out. Every downstream collaborator is isolated so that a
//! failing summarizer or channel never reaches the caller; only a panicking
//! transform hook propagates.

use crate::ai::{OpenAiSummarizer, Summarizer};
use crate::alerts::{build_notifiers, Notifier};
use crate::config::MonitorConfig;
use crate::error::ConfigError;
use crate::history::HistoryBuffer;
use crate::record::{
    ErrorDescriptor, ErrorRecord, Metadata, RecordPatch, RequestSnapshot, ResponseSnapshot,
    TransformHook,
};
use futures_util::future::join_all;
use futures_util::FutureExt;
use log::{debug, error, info, warn};
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::task::JoinHandle;

/// Orchestrates record construction, history, AI summary and notification
pub struct ErrorPipeline {
    history: Mutex<HistoryBuffer>,
    metadata: Metadata,
    ai_enabled: bool,
    transform: Option<TransformHook>,
    summarizer: Option<Arc<dyn Summarizer>>,
    notifiers: Vec<Arc<dyn Notifier>>,
}

/// Builder for [`ErrorPipeline`]
pub struct ErrorPipelineBuilder {
    max_history: usize,
    ai_enabled: bool,
    metadata: Metadata,
    transform: Option<TransformHook>,
    summarizer: Option<Arc<dyn Summarizer>>,
    notifiers: Vec<Arc<dyn Notifier>>,
}

impl ErrorPipelineBuilder {
    /// Register a notification channel
    pub fn notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifiers.push(notifier);
        self
    }

    /// Register several notification channels
    pub fn notifiers(mut self, notifiers: impl IntoIterator<Item = Arc<dyn Notifier>>) -> Self {
        self.notifiers.extend(notifiers);
        self
    }

    /// Set the summarizer; it is only called when AI summarization is enabled
    pub fn summarizer(mut self, summarizer: Arc<dyn Summarizer>) -> Self {
        self.summarizer = Some(summarizer);
        self
    }

    /// Set the hook that may override fields of each freshly built record
    pub fn transform(mut self, hook: TransformHook) -> Self {
        self.transform = Some(hook);
        self
    }

    /// Replace the metadata resolved from configuration
    pub fn metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// # Errors
    ///
    /// Returns `ConfigError::ValidationError` when the history length is zero.
    pub fn build(self) -> Result<ErrorPipeline, ConfigError> {
        let history = HistoryBuffer::new(self.max_history)?;

        Ok(ErrorPipeline {
            history: Mutex::new(history),
            metadata: self.metadata,
            ai_enabled: self.ai_enabled,
            transform: self.transform,
            summarizer: self.summarizer,
            notifiers: self.notifiers,
        })
    }
}

impl ErrorPipeline {
    /// Start a pipeline from configuration with no collaborators registered
    pub fn builder(config: &MonitorConfig) -> ErrorPipelineBuilder {
        ErrorPipelineBuilder {
            max_history: config.max_history_length(),
            ai_enabled: config.ai_enabled(),
            metadata: config.metadata.resolve(),
            transform: None,
            summarizer: None,
            notifiers: Vec::new(),
        }
    }

    /// Build a pipeline with every enabled channel and the OpenAI summarizer
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a channel or the summarizer cannot be built.
    pub fn from_config(config: &MonitorConfig) -> Result<Self, ConfigError> {
        let mut builder = Self::builder(config).notifiers(build_notifiers(config)?);

        if let Some(ai) = config.ai_summarization.as_ref().filter(|ai| ai.enabled) {
            let options = config.error_monitoring.report_options();
            builder = builder.summarizer(Arc::new(OpenAiSummarizer::new(ai, options)?));
        }

        builder.build()
    }

    /// Names of the registered channels, in dispatch order
    pub fn channels(&self) -> Vec<&str> {
        self.notifiers.iter().map(|n| n.channel()).collect()
    }

    /// Current history, oldest first
    pub fn history_snapshot(&self) -> Vec<ErrorRecord> {
        self.lock_history().snapshot()
    }

    /// Run one error through the pipeline and return the final record
    ///
    /// Summarizer and notifier failures, including panics, are logged and
    /// swallowed. All channels have settled when this returns.
    pub async fn process(
        &self,
        error: ErrorDescriptor,
        request: RequestSnapshot,
        response: Option<ResponseSnapshot>,
    ) -> ErrorRecord {
        let mut record = ErrorRecord::new(error, request, response, self.metadata.clone());

        if let Some(patch) = self.run_transform(&record) {
            record.apply_patch(patch);
        }

        let history = self.record_history(&record);

        if let Some(summarizer) = self.summarizer.as_ref().filter(|_| self.ai_enabled) {
            let outcome = AssertUnwindSafe(summarizer.analyze(&record, &history))
                .catch_unwind()
                .await;
            match outcome {
                Ok(Ok(summary)) => record.ai_summary = Some(summary),
                Ok(Err(e)) => warn!("AI summarization failed: {}", e),
                Err(_) => error!("AI summarizer panicked; dispatching without summary"),
            }
        }

        self.dispatch(&record).await;
        record
    }

    /// Process in the background without waiting for the result
    ///
    /// Must be called from within a tokio runtime.
    pub fn submit(
        self: &Arc<Self>,
        error: ErrorDescriptor,
        request: RequestSnapshot,
        response: Option<ResponseSnapshot>,
    ) -> JoinHandle<ErrorRecord> {
        let pipeline = Arc::clone(self);
        tokio::spawn(async move { pipeline.process(error, request, response).await })
    }

    fn run_transform(&self, record: &ErrorRecord) -> Option<RecordPatch> {
        let hook = self.transform.as_ref()?;
        hook(&record.error, &record.request, record.response.as_ref())
            .filter(|patch| !patch.is_empty())
    }

    /// Snapshot the history and append `record` in one critical section
    ///
    /// The returned context never contains `record` itself.
    fn record_history(&self, record: &ErrorRecord) -> Vec<ErrorRecord> {
        let mut history = self.lock_history();
        let context = history.snapshot();
        history.append(record.clone());
        debug!(
            "History holds {}/{} records",
            history.len(),
            history.max_len()
        );
        context
    }

    async fn dispatch(&self, record: &ErrorRecord) {
        if self.notifiers.is_empty() {
            debug!("No notification channels registered");
            return;
        }

        let deliveries = self.notifiers.iter().map(|notifier| async move {
            let channel = notifier.channel();
            let outcome = AssertUnwindSafe(notifier.send_alert(record))
                .catch_unwind()
                .await;
            match outcome {
                Ok(Ok(())) => {
                    debug!("Delivered {} notification", channel);
                    true
                }
                Ok(Err(e)) => {
                    error!("Failed to send {} notification: {}", channel, e);
                    false
                }
                Err(_) => {
                    error!("{} notifier panicked", channel);
                    false
                }
            }
        });

        let results = join_all(deliveries).await;
        let delivered = results.iter().filter(|ok| **ok).count();
        info!(
            "Dispatched {} {}: {}/{} channels succeeded",
            record.error.status_code,
            record.request.endpoint(),
            delivered,
            results.len()
        );
    }

    fn lock_history(&self) -> MutexGuard<'_, HistoryBuffer> {
        self.history.lock().unwrap_or_else(PoisonError::into_inner)
    }
}


#[cfg(test)]
mod property_tests {
    use super::*;
    use quickcheck_macros::quickcheck;

    #[quickcheck]
    fn prop_history_is_last_records_in_order(max_len: u8, count: u8) -> bool {
        let max_len = (max_len % 10) as usize + 1;
        let count = count % 30;

        let runtime = tokio::runtime::Builder::new_current_thread()
            .build()
            .unwrap();
        let config = MonitorConfig::from_toml_str(&format!(
            "[ai_summarization]\nenabled = false\nmax_history_length = {}\n",
            max_len
        ))
        .unwrap();
        let pipeline = ErrorPipeline::builder(&config).build().unwrap();

        let urls: Vec<String> = (0..count).map(|i| format!("/r/{}", i)).collect();
        runtime.block_on(async {
            for url in &urls {
                pipeline
                    .process(
                        ErrorDescriptor::for_status(500, "GET", url),
                        RequestSnapshot::new("GET", url.as_str()),
                        None,
                    )
                    .await;
            }
        });

        let kept: Vec<String> = pipeline
            .history_snapshot()
            .into_iter()
            .map(|r| r.request.url)
            .collect();
        let expected = urls[urls.len().saturating_sub(max_len)..].to_vec();
        kept == expected
    }
}
