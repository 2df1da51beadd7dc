/// AI summarizer contract and implementations
pub mod openai;
pub mod summarizer;

pub use openai::OpenAiSummarizer;
pub use summarizer::{MockSummarizer, Summarizer, SummarizerCall, SummaryFuture};
