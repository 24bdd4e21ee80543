//! Run configuration shared by the trainer and the applier.

use std::thread;

/// Marker appended to the last symbol of every word.
pub const DEFAULT_END_WORD: &str = "</w>";

/// Marker appended to every non-final output piece.
pub const DEFAULT_DELIMITER: &str = "@@";

/// Upper bound of the default worker count.
pub const MAX_DEFAULT_THREADS: usize = 10;

/// Markers and worker count used by a training or application run.
///
/// # Example
///
/// ```
/// use subword_bpe::BpeConfig;
///
/// let config = BpeConfig::default().with_threads(2).with_delimiter("##");
/// assert_eq!(config.threads(), 2);
/// assert_eq!(config.delimiter(), "##");
/// assert_eq!(config.end_word(), "</w>");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BpeConfig {
    end_word: String,
    delimiter: String,
    threads: usize,
}

impl Default for BpeConfig {
    fn default() -> Self {
        Self {
            end_word: DEFAULT_END_WORD.to_string(),
            delimiter: DEFAULT_DELIMITER.to_string(),
            threads: default_threads(),
        }
    }
}

impl BpeConfig {
    /// Replaces the end-of-word marker.
    pub fn with_end_word(mut self, end_word: impl Into<String>) -> Self {
        self.end_word = end_word.into();
        self
    }

    /// Replaces the continuation marker.
    pub fn with_delimiter(mut self, delimiter: impl Into<String>) -> Self {
        self.delimiter = delimiter.into();
        self
    }

    /// Sets the number of application workers. Zero is clamped to one.
    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = threads.max(1);
        self
    }

    pub fn end_word(&self) -> &str {
        &self.end_word
    }

    pub fn delimiter(&self) -> &str {
        &self.delimiter
    }

    pub fn threads(&self) -> usize {
        self.threads
    }
}

/// Default worker count: available hardware concurrency, clamped to
/// `1..=MAX_DEFAULT_THREADS`.
pub fn default_threads() -> usize {
    thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
        .clamp(1, MAX_DEFAULT_THREADS)
}
