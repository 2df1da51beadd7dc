/// Error types for the monitor
pub mod error;

/// Error record data model
pub mod record;

/// Bounded history of recent error records
pub mod history;

/// Configuration management
pub mod config;

/// AI summarizer contract and OpenAI backend
pub mod ai;

/// Notification channels
pub mod alerts;

/// Error-processing pipeline
pub mod pipeline;

/// HTTP capture layer
pub mod capture;

// Re-export commonly used types
pub use capture::MonitorLayer;
pub use config::MonitorConfig;
pub use error::{AlertError, AnalysisError, ConfigError};
pub use pipeline::ErrorPipeline;
pub use record::{ErrorRecord, RecordPatch, TransformHook};
