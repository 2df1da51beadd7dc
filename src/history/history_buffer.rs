//! Rolling history of recent error records
//!
//! This module provides the HistoryBuffer which keeps the most recent error
//! records in insertion order so they can be handed to the AI summarizer as
//! context. The buffer is bounded: appending beyond capacity evicts the oldest
//! records first.

use crate::error::ConfigError;
use crate::record::ErrorRecord;
use std::collections::VecDeque;

/// Number of records kept when no history length is configured
pub const DEFAULT_MAX_HISTORY: usize = 5;

/// Fixed-capacity FIFO of past error records
///
/// Only `append` and `snapshot` touch the contents; the buffer is owned by a
/// single pipeline and never handed out for mutation.
#[derive(Debug, Clone)]
pub struct HistoryBuffer {
    records: VecDeque<ErrorRecord>,
    max_len: usize,
}

impl HistoryBuffer {
    /// Create a history buffer holding at most `max_len` records
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationError` when `max_len` is zero.
    ///
    /// # Examples
    ///
    /// ```
    /// use api_monitor::history::HistoryBuffer;
    ///
    /// let history = HistoryBuffer::new(5).unwrap();
    /// assert!(history.is_empty());
    /// assert!(HistoryBuffer::new(0).is_err());
    /// ```
    pub fn new(max_len: usize) -> Result<Self, ConfigError> {
        if max_len == 0 {
            return Err(ConfigError::ValidationError(
                "history length must be at least 1".to_string(),
            ));
        }

        Ok(Self {
            records: VecDeque::with_capacity(max_len),
            max_len,
        })
    }

    /// Add a record to the end, evicting from the front while over capacity
    pub fn append(&mut self, record: ErrorRecord) {
        self.records.push_back(record);
        self.enforce_capacity();
    }

    /// Current contents, oldest first
    pub fn snapshot(&self) -> Vec<ErrorRecord> {
        self.records.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn max_len(&self) -> usize {
        self.max_len
    }

    fn enforce_capacity(&mut self) {
        while self.records.len() > self.max_len {
            self.records.pop_front();
        }
    }
}

impl Default for HistoryBuffer {
    fn default() -> Self {
        Self {
            records: VecDeque::with_capacity(DEFAULT_MAX_HISTORY),
            max_len: DEFAULT_MAX_HISTORY,
        }
    }
}
