/// Error-processing pipeline
pub mod error_pipeline;

pub use error_pipeline::{ErrorPipeline, ErrorPipelineBuilder};
