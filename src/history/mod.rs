/// Bounded rolling history of recent error records
pub mod history_buffer;

pub use history_buffer::{HistoryBuffer, DEFAULT_MAX_HISTORY};
