use crate::ai::summarizer::{Summarizer, SummaryFuture};
use crate::config::{AiSummarizationConfig, ReportOptions};
use crate::error::{AnalysisError, ConfigError};
use crate::record::{AiSummary, Confidence, ErrorRecord};
use log::{debug, info};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Maximum number of previous errors rendered into the prompt
const MAX_HISTORY_IN_PROMPT: usize = 5;

const SYSTEM_PROMPT: &str = "You are an expert API error analyzer. Your task is to analyze API errors, identify the root cause, and suggest possible solutions. Be concise but informative.";

/// OpenAI chat-completions summarizer
///
/// Sends the current error and recent history to an OpenAI-compatible API and
/// parses the JSON diagnosis it returns. Requires an API key and network access.
pub struct OpenAiSummarizer {
    client: Client,
    enabled: bool,
    api_key: String,
    model: String,
    max_tokens: u32,
    temperature: f32,
    base_url: String,
    options: ReportOptions,
}

/// Request format for OpenAI Chat Completions API
#[derive(Debug, Serialize)]
struct OpenAIRequest {
    model: String,
    messages: Vec<OpenAIMessage>,
    temperature: f32,
    max_tokens: u32,
    response_format: OpenAIResponseFormat,
}

#[derive(Debug, Serialize)]
struct OpenAIMessage {
    role: String,
    content: String,
}

#[derive(Debug, Serialize)]
struct OpenAIResponseFormat {
    #[serde(rename = "type")]
    format_type: String,
}

/// Response format from OpenAI API
#[derive(Debug, Deserialize)]
struct OpenAIResponse {
    #[serde(default)]
    choices: Vec<OpenAIChoice>,
    #[serde(default)]
    error: Option<OpenAIError>,
}

#[derive(Debug, Deserialize)]
struct OpenAIChoice {
    message: OpenAIResponseMessage,
}

#[derive(Debug, Deserialize)]
struct OpenAIResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAIError {
    message: String,
    #[serde(rename = "type", default)]
    error_type: String,
}

/// JSON structure the model is asked to return
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DiagnosisResponse {
    #[serde(default)]
    summary: Option<String>,
    #[serde(default)]
    possible_solutions: Option<Vec<String>>,
    #[serde(default)]
    confidence: Option<String>,
}

impl OpenAiSummarizer {
    /// Create a summarizer from the AI section of the configuration
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the HTTP client cannot be constructed.
    pub fn new(config: &AiSummarizationConfig, options: ReportOptions) -> Result<Self, ConfigError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| {
                ConfigError::ValidationError(format!("failed to build HTTP client: {}", e))
            })?;

        Ok(Self {
            client,
            enabled: config.enabled,
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
            base_url: config.base_url.clone(),
            options,
        })
    }

    fn api_url(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }

    /// Build the user prompt for one record and the errors that preceded it
    pub fn build_prompt(&self, record: &ErrorRecord, history: &[ErrorRecord]) -> String {
        let error = &record.error;
        let request = &record.request;

        let mut prompt = String::from(
            "Please analyze this API error and provide the following in JSON format:\n\
             1. A concise summary of what went wrong (1-2 sentences)\n\
             2. A list of possible solutions (up to 3)\n\
             3. A confidence level for your analysis ('high', 'medium', or 'low')\n\n\
             Return ONLY a JSON object with the following structure:\n\
             {\n  \"summary\": \"your error summary here\",\n  \
             \"possibleSolutions\": [\"solution 1\", \"solution 2\", \"solution 3\"],\n  \
             \"confidence\": \"high|medium|low\"\n}\n\n",
        );

        prompt.push_str("Current error details:\n");
        prompt.push_str(&format!("Status Code: {}\n", error.status_code));
        prompt.push_str(&format!("Error Name: {}\n", error.name));
        prompt.push_str(&format!("Error Message: {}\n", error.message));
        prompt.push_str(&format!("Endpoint: {}\n", request.endpoint()));

        if let Some(stack) = error.stack.as_ref().filter(|_| self.options.include_stack_trace) {
            prompt.push_str(&format!("\nStack Trace:\n{}\n", stack));
        }

        prompt.push_str("\nRequest Details:\n");
        if !request.params.is_empty() {
            prompt.push_str(&format!("Parameters: {}\n", to_json(&request.params)));
        }
        if !request.query.is_empty() {
            prompt.push_str(&format!("Query: {}\n", to_json(&request.query)));
        }
        if let Some(body) = request.body.as_ref().filter(|_| self.options.include_request_body) {
            prompt.push_str(&format!("Request Body: {}\n", body));
        }

        if let Some(body) = record
            .response
            .as_ref()
            .and_then(|r| r.body.as_ref())
            .filter(|_| self.options.include_response_body)
        {
            prompt.push_str(&format!("\nResponse Body: {}\n", body));
        }

        if !history.is_empty() {
            prompt.push_str("\nRecent Error History (for context):\n");
            let start = history.len().saturating_sub(MAX_HISTORY_IN_PROMPT);
            for (index, previous) in history[start..].iter().enumerate() {
                prompt.push_str(&format!("\nPrevious Error {}:\n", index + 1));
                prompt.push_str(&format!(
                    "Status: {} - {}\n",
                    previous.error.status_code, previous.error.name
                ));
                prompt.push_str(&format!("Message: {}\n", previous.error.message));
                prompt.push_str(&format!("Endpoint: {}\n", previous.request.endpoint()));
                prompt.push_str(&format!("Time: {}\n", previous.error.timestamp.to_rfc3339()));
            }
        }

        prompt
    }

    /// Extract JSON from model output
    ///
    /// Models sometimes wrap JSON in markdown code blocks or add extra text.
    fn extract_json(response_text: &str) -> &str {
        let text = response_text.trim();
        match (text.find('{'), text.rfind('}')) {
            (Some(start), Some(end)) if start < end => &text[start..=end],
            _ => text,
        }
    }

    /// Convert model output into a summary, filling in defaults for missing fields
    fn parse_diagnosis(content: &str) -> Result<AiSummary, AnalysisError> {
        let json_text = Self::extract_json(content);
        let diagnosis: DiagnosisResponse = serde_json::from_str(json_text).map_err(|e| {
            AnalysisError::InvalidResponse(format!(
                "Failed to parse model JSON response: {}. Response was: {}",
                e, content
            ))
        })?;

        Ok(AiSummary::new(
            diagnosis
                .summary
                .unwrap_or_else(|| "Unable to generate summary".to_string()),
            diagnosis.possible_solutions.unwrap_or_default(),
            Some(
                diagnosis
                    .confidence
                    .as_deref()
                    .map(Confidence::parse)
                    .unwrap_or(Confidence::Medium),
            ),
        ))
    }

    async fn request_diagnosis(
        &self,
        record: &ErrorRecord,
        history: &[ErrorRecord],
    ) -> Result<AiSummary, AnalysisError> {
        let request = OpenAIRequest {
            model: self.model.clone(),
            messages: vec![
                OpenAIMessage {
                    role: "system".to_string(),
                    content: SYSTEM_PROMPT.to_string(),
                },
                OpenAIMessage {
                    role: "user".to_string(),
                    content: self.build_prompt(record, history),
                },
            ],
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            response_format: OpenAIResponseFormat {
                format_type: "json_object".to_string(),
            },
        };

        debug!(
            "Requesting AI diagnosis from {} with {} history records",
            self.model,
            history.len()
        );

        let response = self
            .client
            .post(self.api_url())
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(AnalysisError::BackendError(format!(
                "OpenAI API returned error {}: {}",
                status, error_text
            )));
        }

        let openai_response: OpenAIResponse = response.json().await.map_err(|e| {
            AnalysisError::InvalidResponse(format!("Failed to parse OpenAI response: {}", e))
        })?;

        if let Some(error) = openai_response.error {
            return Err(AnalysisError::BackendError(format!(
                "OpenAI API error ({}): {}",
                error.error_type, error.message
            )));
        }

        let content = openai_response
            .choices
            .first()
            .and_then(|choice| choice.message.content.clone())
            .unwrap_or_else(|| "{}".to_string());

        let summary = Self::parse_diagnosis(&content)?;
        info!(
            "AI diagnosis received: confidence={:?}, solutions={}",
            summary.confidence,
            summary.possible_solutions.len()
        );
        Ok(summary)
    }
}

fn to_json<T: Serialize>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_default()
}

impl Summarizer for OpenAiSummarizer {
    fn analyze<'a>(
        &'a self,
        record: &'a ErrorRecord,
        history: &'a [ErrorRecord],
    ) -> SummaryFuture<'a> {
        Box::pin(async move {
            if !self.enabled {
                return Ok(AiSummary::unavailable());
            }
            self.request_diagnosis(record, history).await
        })
    }
}
