use crate::error::AnalysisError;
use crate::record::{AiSummary, Confidence, ErrorRecord};
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Future returned by summarizer implementations
pub type SummaryFuture<'a> =
    Pin<Box<dyn Future<Output = Result<AiSummary, AnalysisError>> + Send + 'a>>;

/// Capability that turns an error record plus recent history into a diagnosis
///
/// `history` holds the records seen before `record`, oldest first, and must be
/// treated as read-only. Implementations return a sentinel summary rather than
/// an error when their own feature is disabled; only transport or API failures
/// are reported as `Err`.
pub trait Summarizer: Send + Sync {
    fn analyze<'a>(
        &'a self,
        record: &'a ErrorRecord,
        history: &'a [ErrorRecord],
    ) -> SummaryFuture<'a>;
}

/// One recorded call to a [`MockSummarizer`]
#[derive(Debug, Clone)]
pub struct SummarizerCall {
    pub record: ErrorRecord,
    pub history: Vec<ErrorRecord>,
}

/// Mock summarizer for testing and development
///
/// Returns configured responses in order, cycling after the last one, and
/// records every call so tests can inspect the context it was given.
pub struct MockSummarizer {
    responses: Vec<Result<AiSummary, AnalysisError>>,
    current_index: Arc<Mutex<usize>>,
    delay: Option<Duration>,
    calls: Arc<Mutex<Vec<SummarizerCall>>>,
}

impl MockSummarizer {
    /// Create a mock summarizer with a single response
    ///
    /// # Example
    /// ```
    /// use api_monitor::ai::MockSummarizer;
    /// use api_monitor::record::AiSummary;
    ///
    /// let summarizer = MockSummarizer::with_response(Ok(AiSummary::new(
    ///     "Database connection refused",
    ///     vec!["Check the connection string".to_string()],
    ///     None,
    /// )));
    /// assert_eq!(summarizer.call_count(), 0);
    /// ```
    pub fn with_response(response: Result<AiSummary, AnalysisError>) -> Self {
        Self::with_responses(vec![response])
    }

    /// Create a mock summarizer returning `responses` in order
    pub fn with_responses(responses: Vec<Result<AiSummary, AnalysisError>>) -> Self {
        Self {
            responses,
            current_index: Arc::new(Mutex::new(0)),
            delay: None,
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// A mock summarizer that always succeeds
    pub fn success() -> Self {
        Self::with_response(Ok(AiSummary::new(
            "Mock analysis",
            vec![
                "Mock solution 1".to_string(),
                "Mock solution 2".to_string(),
            ],
            Some(Confidence::High),
        )))
    }

    /// A mock summarizer that always fails
    pub fn error(message: &str) -> Self {
        Self::with_response(Err(AnalysisError::BackendError(message.to_string())))
    }

    /// Delay every response
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn call_count(&self) -> usize {
        self.lock_calls().len()
    }

    /// All calls made so far, in order
    pub fn calls(&self) -> Vec<SummarizerCall> {
        self.lock_calls().clone()
    }

    fn lock_calls(&self) -> std::sync::MutexGuard<'_, Vec<SummarizerCall>> {
        self.calls
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl Summarizer for MockSummarizer {
    fn analyze<'a>(
        &'a self,
        record: &'a ErrorRecord,
        history: &'a [ErrorRecord],
    ) -> SummaryFuture<'a> {
        Box::pin(async move {
            self.lock_calls().push(SummarizerCall {
                record: record.clone(),
                history: history.to_vec(),
            });

            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }

            if self.responses.is_empty() {
                return Ok(AiSummary::unavailable());
            }

            let response_index = {
                let mut index = self
                    .current_index
                    .lock()
                    .unwrap_or_else(std::sync::PoisonError::into_inner);
                let current = *index % self.responses.len();
                *index += 1;
                current
            };

            self.responses[response_index].clone()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{ErrorDescriptor, Metadata, RequestSnapshot};

    fn create_record(url: &str) -> ErrorRecord {
        ErrorRecord::new(
            ErrorDescriptor::for_status(500, "GET", url),
            RequestSnapshot::new("GET", url),
            None,
            Metadata::new(),
        )
    }

    #[tokio::test]
    async fn test_mock_summarizer_success() {
        let summarizer = MockSummarizer::success();
        let record = create_record("/a");

        let summary = summarizer.analyze(&record, &[]).await.unwrap();
        assert_eq!(summary.summary, "Mock analysis");
        assert_eq!(summary.possible_solutions.len(), 2);
        assert_eq!(summarizer.call_count(), 1);
    }

    #[tokio::test]
    async fn test_mock_summarizer_error() {
        let summarizer = MockSummarizer::error("rate limited");
        let record = create_record("/a");

        let result = summarizer.analyze(&record, &[]).await;
        assert!(matches!(result, Err(AnalysisError::BackendError(ref m)) if m == "rate limited"));
    }

    #[tokio::test]
    async fn test_mock_summarizer_records_history() {
        let summarizer = MockSummarizer::success();
        let previous = vec![create_record("/first"), create_record("/second")];
        let current = create_record("/third");

        summarizer.analyze(&current, &previous).await.unwrap();

        let calls = summarizer.calls();
        assert_eq!(calls[0].record.request.url, "/third");
        assert_eq!(calls[0].history.len(), 2);
        assert_eq!(calls[0].history[0].request.url, "/first");
    }

    #[tokio::test]
    async fn test_mock_summarizer_cycles_responses() {
        let summarizer = MockSummarizer::with_responses(vec![
            Ok(AiSummary::new("first", Vec::new(), None)),
            Err(AnalysisError::Timeout),
        ]);
        let record = create_record("/a");

        assert!(summarizer.analyze(&record, &[]).await.is_ok());
        assert!(summarizer.analyze(&record, &[]).await.is_err());
        assert_eq!(
            summarizer.analyze(&record, &[]).await.unwrap().summary,
            "first"
        );
    }
}
