//! Metrics describing the vocabulary pass and every training epoch.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Metrics captured for one training epoch.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EpochMetrics {
    /// Sequential epoch number (1-indexed).
    pub epoch: usize,
    /// Learning rate at the start of the epoch.
    pub alpha: f32,
    /// Learning rate at the end of the epoch.
    pub min_alpha: f32,
    /// Documents consumed by the trainer.
    pub documents: usize,
    /// Documents left out because their tokenization failed.
    pub skipped: usize,
    /// Tokens the trainer actually trained on.
    pub words: usize,
    /// Tokenizer invocations made during the epoch's pass.
    pub tokenizer_calls: usize,
    /// Execution time for the epoch.
    pub elapsed: Duration,
    /// Resident set size sample captured from `/proc/self/status` on Linux.
    pub rss_kb: Option<usize>,
}

/// Aggregate metrics produced by a training session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TrainingMetrics {
    /// Documents seen by the vocabulary pass.
    pub vocab_documents: usize,
    /// Tokenizer invocations made by the vocabulary pass.
    pub vocab_tokenizer_calls: usize,
    /// Duration of the vocabulary pass.
    pub vocab_duration: Duration,
    /// Per-epoch snapshots accrued during training.
    pub epochs: Vec<EpochMetrics>,
    /// Total duration of the training session.
    pub total_duration: Duration,
}

impl TrainingMetrics {
    /// Creates an empty metrics container with pre-allocated capacity.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            vocab_documents: 0,
            vocab_tokenizer_calls: 0,
            vocab_duration: Duration::ZERO,
            epochs: Vec::with_capacity(capacity),
            total_duration: Duration::ZERO,
        }
    }

    /// Tokenizer invocations across the vocabulary pass and every epoch.
    #[must_use]
    pub fn tokenizer_calls(&self) -> usize {
        self.vocab_tokenizer_calls
            + self
                .epochs
                .iter()
                .map(|epoch| epoch.tokenizer_calls)
                .sum::<usize>()
    }
}

#[cfg(target_os = "linux")]
fn current_rss_kb() -> Option<usize> {
    use std::fs::File;
    use std::io::{BufRead, BufReader};

    let file = File::open("/proc/self/status").ok()?;
    for line in BufReader::new(file).lines().map_while(Result::ok) {
        if let Some(rest) = line.strip_prefix("VmRSS:") {
            let value = rest
                .split_whitespace()
                .find_map(|part| part.parse::<usize>().ok());
            return value;
        }
    }
    None
}

#[cfg(not(target_os = "linux"))]
fn current_rss_kb() -> Option<usize> {
    None
}

/// Samples the current resident set size (RSS) on supported platforms.
pub fn sample_rss_kb() -> Option<usize> {
    current_rss_kb()
}
