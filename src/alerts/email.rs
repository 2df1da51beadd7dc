//! SMTP email channel

use crate::alerts::notifier::{AlertFuture, Notifier};
use crate::config::{EmailConfig, ReportOptions};
use crate::error::{AlertError, ConfigError};
use crate::record::{Confidence, ErrorRecord};
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use log::info;
use serde_json::Value;

const BOX_STYLE: &str = "background-color: #f5f5f5; padding: 15px; border-radius: 5px; margin-bottom: 20px;";
const PRE_STYLE: &str = "background-color: #eee; padding: 10px; border-radius: 5px; overflow-x: auto;";
const H2_STYLE: &str = "color: #333; margin-top: 30px;";

/// Rendered subject and HTML body
#[derive(Debug, Clone, PartialEq)]
pub struct EmailContent {
    pub subject: String,
    pub html: String,
}

pub struct EmailNotifier {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    config: EmailConfig,
    options: ReportOptions,
}

impl EmailNotifier {
    /// Create the notifier and its SMTP transport
    ///
    /// `smtp.secure` selects implicit TLS; otherwise the connection is
    /// upgraded with STARTTLS.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the SMTP relay cannot be configured.
    pub fn new(config: EmailConfig, options: ReportOptions) -> Result<Self, ConfigError> {
        let smtp = &config.smtp;
        let builder = if smtp.secure {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&smtp.host)
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&smtp.host)
        }
        .map_err(|e| ConfigError::ValidationError(format!("invalid SMTP relay: {}", e)))?;

        let transport = builder
            .port(smtp.port)
            .credentials(Credentials::new(
                smtp.auth.user.clone(),
                smtp.auth.pass.clone(),
            ))
            .build();

        Ok(Self {
            transport,
            config,
            options,
        })
    }

    fn confidence_color(confidence: Confidence) -> &'static str {
        match confidence {
            Confidence::High => "#4caf50",
            Confidence::Medium => "#ff9800",
            Confidence::Low => "#f44336",
        }
    }

    pub fn format_message(&self, record: &ErrorRecord) -> EmailContent {
        let error = &record.error;
        let request = &record.request;

        let subject = self.config.subject.clone().unwrap_or_else(|| {
            format!(
                "[{}] API Error: {} - {}",
                record.metadata.environment().unwrap_or("PROD"),
                error.status_code,
                error.name
            )
        });

        let mut html = format!(
            "<div style=\"font-family: Arial, sans-serif; max-width: 800px; margin: 0 auto;\">\
             <h1 style=\"color: #d32f2f; margin-bottom: 20px;\">API Error: {} {}</h1>\
             <div style=\"{}\">\
             <p><strong>Error Message:</strong> {}</p>\
             <p><strong>Time:</strong> {}</p>\
             <p><strong>Endpoint:</strong> {}</p>\
             <p><strong>Status Code:</strong> {}</p>\
             </div>",
            error.status_code,
            escape(&error.name),
            BOX_STYLE,
            escape(&error.message),
            error.timestamp.to_rfc3339(),
            escape(&request.endpoint()),
            error.status_code
        );

        html.push_str(&format!(
            "<h2 style=\"{}\">Environment Information</h2><div style=\"{}\">",
            H2_STYLE, BOX_STYLE
        ));
        for (key, value) in record.metadata.display_pairs() {
            html.push_str(&format!(
                "<p><strong>{}:</strong> {}</p>",
                escape(&key),
                escape(&value)
            ));
        }
        html.push_str("</div>");

        html.push_str(&format!(
            "<h2 style=\"{}\">Request Details</h2><div style=\"{}\">\
             <p><strong>Method:</strong> {}</p>\
             <p><strong>URL:</strong> {}</p>\
             <p><strong>Timestamp:</strong> {}</p>",
            H2_STYLE,
            BOX_STYLE,
            escape(&request.method),
            escape(&request.url),
            request.timestamp.to_rfc3339()
        ));
        if !request.params.is_empty() {
            html.push_str(&format!(
                "<p><strong>Parameters:</strong> {}</p>",
                escape(&pretty(&request.params))
            ));
        }
        if !request.query.is_empty() {
            html.push_str(&format!(
                "<p><strong>Query:</strong> {}</p>",
                escape(&pretty(&request.query))
            ));
        }
        if let Some(body) = request.body.as_ref().filter(|_| self.options.include_request_body) {
            html.push_str(&format!(
                "<p><strong>Request Body:</strong></p><pre style=\"{}\">{}</pre>",
                PRE_STYLE,
                escape(&pretty(body))
            ));
        }
        html.push_str("</div>");

        if let Some(response) = &record.response {
            html.push_str(&format!(
                "<h2 style=\"{}\">Response Details</h2><div style=\"{}\">\
                 <p><strong>Status Code:</strong> {}</p>",
                H2_STYLE, BOX_STYLE, response.status_code
            ));
            if let Some(body) = response
                .body
                .as_ref()
                .filter(|_| self.options.include_response_body)
            {
                html.push_str(&format!(
                    "<p><strong>Response Body:</strong></p><pre style=\"{}\">{}</pre>",
                    PRE_STYLE,
                    escape(&pretty(body))
                ));
            }
            html.push_str("</div>");
        }

        if let Some(stack) = error.stack.as_ref().filter(|_| self.options.include_stack_trace) {
            html.push_str(&format!(
                "<h2 style=\"{}\">Stack Trace</h2><pre style=\"{} white-space: pre-wrap;\">{}</pre>",
                H2_STYLE,
                PRE_STYLE,
                escape(stack)
            ));
        }

        if let Some(summary) = &record.ai_summary {
            html.push_str(&format!(
                "<h2 style=\"{}\">AI Analysis</h2>\
                 <div style=\"background-color: #e3f2fd; padding: 15px; border-radius: 5px; margin-bottom: 20px;\">\
                 <p>{}</p>",
                H2_STYLE,
                escape(&summary.summary)
            ));
            if !summary.possible_solutions.is_empty() {
                html.push_str("<h3 style=\"margin-top: 15px;\">Possible Solutions:</h3><ul>");
                for solution in &summary.possible_solutions {
                    html.push_str(&format!("<li>{}</li>", escape(solution)));
                }
                html.push_str("</ul>");
            }
            if let Some(confidence) = summary.confidence {
                html.push_str(&format!(
                    "<p style=\"margin-top: 15px;\"><strong>Confidence:</strong> \
                     <span style=\"color: {};\">{}</span></p>",
                    Self::confidence_color(confidence),
                    confidence.as_str().to_uppercase()
                ));
            }
            html.push_str("</div>");
        }

        html.push_str(
            "<div style=\"margin-top: 30px; padding-top: 20px; border-top: 1px solid #eee; color: #666; font-size: 12px;\">\
             <p>This is an automated alert from the API Monitor.</p></div></div>",
        );

        EmailContent { subject, html }
    }

    /// Assemble the MIME message
    ///
    /// # Errors
    ///
    /// Returns `AlertError::InvalidRecipient` if any address fails to parse.
    pub fn build_message(&self, record: &ErrorRecord) -> Result<Message, AlertError> {
        let content = self.format_message(record);

        let mut builder = Message::builder()
            .from(parse_mailbox(&self.config.from)?)
            .subject(content.subject)
            .header(ContentType::TEXT_HTML);
        for recipient in &self.config.to {
            builder = builder.to(parse_mailbox(recipient)?);
        }
        for recipient in &self.config.cc {
            builder = builder.cc(parse_mailbox(recipient)?);
        }

        builder
            .body(content.html)
            .map_err(|e| AlertError::NotificationFailed(format!("failed to build email: {}", e)))
    }
}

impl Notifier for EmailNotifier {
    fn channel(&self) -> &str {
        "email"
    }

    fn send_alert<'a>(&'a self, record: &'a ErrorRecord) -> AlertFuture<'a> {
        Box::pin(async move {
            if !self.config.enabled {
                return Ok(());
            }

            let message = self.build_message(record)?;
            self.transport
                .send(message)
                .await
                .map_err(|e| AlertError::Smtp(e.to_string()))?;

            info!("Sent email alert to {} recipient(s)", self.config.to.len());
            Ok(())
        })
    }
}

fn parse_mailbox(address: &str) -> Result<Mailbox, AlertError> {
    address
        .parse::<Mailbox>()
        .map_err(|e| AlertError::InvalidRecipient(format!("{}: {}", address, e)))
}

fn pretty<T: serde::Serialize + ?Sized>(value: &T) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| Value::Null.to_string())
}

fn escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            other => escaped.push(other),
        }
    }
    escaped
}
