//! Configuration builders controlling corpus discovery, caching, and training.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{DocvecError, Result};

/// Configuration controlling how document paths are discovered on disk.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ScanConfig {
    /// File name suffix (without the leading dot) that marks a candidate document.
    pub extension: String,
    /// Maximum number of documents to keep; `None` keeps every match.
    pub max_documents: Option<usize>,
    /// Follows symlinks encountered during traversal.
    pub follow_symlinks: bool,
    /// Visits directory entries sorted by file name for a stable order across filesystems.
    pub sort_by_name: bool,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            extension: "html".into(),
            max_documents: None,
            follow_symlinks: false,
            sort_by_name: true,
        }
    }
}

impl ScanConfig {
    /// Returns a builder initialised with [`ScanConfig::default`].
    #[must_use]
    pub fn builder() -> ScanBuilder {
        ScanBuilder::default()
    }

    /// Returns `true` when `file_name` carries the configured extension.
    #[must_use]
    pub fn accepts(&self, file_name: &str) -> bool {
        match file_name.rsplit_once('.') {
            Some((stem, ext)) => !stem.is_empty() && ext == self.extension,
            None => false,
        }
    }

    /// Validates the invariants required for scanning.
    pub fn validate(&self) -> Result<()> {
        if self.extension.is_empty() || self.extension.starts_with('.') {
            return Err(DocvecError::InvalidConfig(format!(
                "extension {:?} must be non-empty and given without a leading dot",
                self.extension
            )));
        }
        if self.max_documents == Some(0) {
            return Err(DocvecError::InvalidConfig(
                "max_documents must be greater than zero when set".into(),
            ));
        }
        Ok(())
    }
}

/// Builder for [`ScanConfig`].
#[derive(Debug, Default, Clone)]
pub struct ScanBuilder {
    cfg: ScanConfig,
}

impl ScanBuilder {
    /// Sets the document extension, e.g. `"html"`.
    #[must_use]
    pub fn extension(mut self, extension: impl Into<String>) -> Self {
        self.cfg.extension = extension.into();
        self
    }

    /// Caps the number of discovered documents.
    #[must_use]
    pub fn max_documents(mut self, value: Option<usize>) -> Self {
        self.cfg.max_documents = value;
        self
    }

    /// Enables or disables following of symlinks when traversing directories.
    #[must_use]
    pub fn follow_symlinks(mut self, enabled: bool) -> Self {
        self.cfg.follow_symlinks = enabled;
        self
    }

    /// Enables or disables name-sorted traversal.
    #[must_use]
    pub fn sort_by_name(mut self, enabled: bool) -> Self {
        self.cfg.sort_by_name = enabled;
        self
    }

    /// Finalises the builder, returning a validated [`ScanConfig`].
    pub fn build(self) -> Result<ScanConfig> {
        self.cfg.validate()?;
        Ok(self.cfg)
    }
}

/// What a pass does when the tokenizer fails for a single document.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Log the failure, remember it, and leave the document out of every pass.
    #[default]
    Skip,
    /// Yield the error; the consumer is expected to abort the run.
    Abort,
}

/// Upper bound on how many tokenized documents the cache retains.
///
/// Nothing is ever evicted. With [`CacheCapacity::Bounded`] the first `n` documents are cached
/// and every later document is tokenized again on each pass.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum CacheCapacity {
    /// Keep every tokenized document for the lifetime of the corpus.
    #[default]
    Unbounded,
    /// Keep at most this many documents.
    Bounded(usize),
}

impl CacheCapacity {
    /// Returns `true` when a document at `index` may be stored.
    #[must_use]
    pub fn admits(self, index: usize) -> bool {
        match self {
            Self::Unbounded => true,
            Self::Bounded(limit) => index < limit,
        }
    }
}

/// Configuration for the caching document corpus.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CorpusConfig {
    /// Emit a progress line every this many documents within a pass; `0` disables it.
    pub progress_interval: usize,
    /// Behaviour on per-document tokenizer failures.
    pub failure_policy: FailurePolicy,
    /// How many tokenized documents the cache may hold.
    pub cache_capacity: CacheCapacity,
    /// Warn once the cache holds this many documents; `None` disables the warning.
    pub cache_warning_threshold: Option<usize>,
}

impl Default for CorpusConfig {
    fn default() -> Self {
        Self {
            progress_interval: 1000,
            failure_policy: FailurePolicy::Skip,
            cache_capacity: CacheCapacity::Unbounded,
            cache_warning_threshold: Some(20_000),
        }
    }
}

impl CorpusConfig {
    /// Returns a builder initialised with [`CorpusConfig::default`].
    #[must_use]
    pub fn builder() -> CorpusBuilder {
        CorpusBuilder::default()
    }
}

/// Builder for [`CorpusConfig`].
#[derive(Debug, Default, Clone)]
pub struct CorpusBuilder {
    cfg: CorpusConfig,
}

impl CorpusBuilder {
    /// Sets the progress logging interval.
    #[must_use]
    pub fn progress_interval(mut self, value: usize) -> Self {
        self.cfg.progress_interval = value;
        self
    }

    /// Sets the failure policy.
    #[must_use]
    pub fn failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.cfg.failure_policy = policy;
        self
    }

    /// Sets the cache capacity.
    #[must_use]
    pub fn cache_capacity(mut self, capacity: CacheCapacity) -> Self {
        self.cfg.cache_capacity = capacity;
        self
    }

    /// Sets the document count at which the cache warns about memory.
    #[must_use]
    pub fn cache_warning_threshold(mut self, value: Option<usize>) -> Self {
        self.cfg.cache_warning_threshold = value;
        self
    }

    /// Finalises the builder.
    pub fn build(self) -> CorpusConfig {
        self.cfg
    }
}

/// Hyperparameters for paragraph-vector training and the epoch schedule.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TrainerConfig {
    /// Dimensionality of the learned vectors.
    pub vector_size: usize,
    /// Number of context words considered on each side of a target word.
    pub window: usize,
    /// Tokens seen fewer times than this during the vocabulary pass are ignored.
    pub min_count: usize,
    /// Worker concurrency hint for the trainer.
    pub workers: usize,
    /// Learning rate at the start of the first epoch.
    pub alpha: f32,
    /// Learning rate reached at the end of the first epoch.
    pub min_alpha: f32,
    /// Number of training epochs after the vocabulary pass.
    pub epochs: usize,
    /// Amount subtracted from the learning rate after every epoch.
    pub alpha_decay: f32,
    /// Lower clamp applied to the decayed learning rate.
    pub alpha_floor: f32,
    /// Negative samples drawn per predicted word.
    pub negative: usize,
    /// Seed for vector initialisation and negative sampling.
    pub seed: u64,
    /// Enables per-epoch logging through the `log` facade.
    pub show_progress: bool,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        Self {
            vector_size: 100,
            window: 10,
            min_count: 5,
            workers: 4,
            alpha: 0.025,
            min_alpha: 0.025,
            epochs: 10,
            alpha_decay: 0.002,
            alpha_floor: 0.0001,
            negative: 5,
            seed: 1,
            show_progress: true,
        }
    }
}

impl TrainerConfig {
    /// Returns a builder initialised with [`TrainerConfig::default`].
    #[must_use]
    pub fn builder() -> TrainerBuilder {
        TrainerBuilder::default()
    }

    /// Loads a configuration from a JSON file; missing fields take their default values.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let data =
            fs::read_to_string(path).map_err(|err| DocvecError::io(err, Some(path.into())))?;
        let cfg: Self = serde_json::from_str(&data)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Validates the invariants required for training.
    pub fn validate(&self) -> Result<()> {
        if self.vector_size == 0 {
            return Err(DocvecError::InvalidConfig(
                "vector_size must be greater than zero".into(),
            ));
        }
        if self.min_count == 0 {
            return Err(DocvecError::InvalidConfig(
                "min_count must be greater than zero".into(),
            ));
        }
        if self.workers == 0 {
            return Err(DocvecError::InvalidConfig(
                "workers must be greater than zero".into(),
            ));
        }
        if self.epochs == 0 {
            return Err(DocvecError::InvalidConfig(
                "epochs must be greater than zero".into(),
            ));
        }
        for (name, value) in [
            ("alpha", self.alpha),
            ("min_alpha", self.min_alpha),
            ("alpha_floor", self.alpha_floor),
        ] {
            if !value.is_finite() || value <= 0.0 {
                return Err(DocvecError::InvalidConfig(format!(
                    "{name} must be a positive finite number, got {value}"
                )));
            }
        }
        if !self.alpha_decay.is_finite() || self.alpha_decay < 0.0 {
            return Err(DocvecError::InvalidConfig(format!(
                "alpha_decay must be a non-negative finite number, got {}",
                self.alpha_decay
            )));
        }
        if self.alpha_floor > self.alpha {
            return Err(DocvecError::InvalidConfig(format!(
                "alpha_floor ({}) must not exceed alpha ({})",
                self.alpha_floor, self.alpha
            )));
        }
        if self.min_alpha > self.alpha {
            return Err(DocvecError::InvalidConfig(format!(
                "min_alpha ({}) must not exceed alpha ({})",
                self.min_alpha, self.alpha
            )));
        }
        Ok(())
    }
}

/// Builder for [`TrainerConfig`].
#[derive(Debug, Default, Clone)]
pub struct TrainerBuilder {
    cfg: TrainerConfig,
}

impl TrainerBuilder {
    /// Creates a builder with [`TrainerConfig::default`] settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts from an existing configuration, e.g. one loaded from JSON.
    #[must_use]
    pub fn from_config(cfg: TrainerConfig) -> Self {
        Self { cfg }
    }

    /// Sets the vector dimensionality.
    #[must_use]
    pub fn vector_size(mut self, value: usize) -> Self {
        self.cfg.vector_size = value;
        self
    }

    /// Sets the context window.
    #[must_use]
    pub fn window(mut self, value: usize) -> Self {
        self.cfg.window = value;
        self
    }

    /// Sets the minimum token frequency.
    #[must_use]
    pub fn min_count(mut self, value: usize) -> Self {
        self.cfg.min_count = value;
        self
    }

    /// Sets the worker concurrency hint.
    #[must_use]
    pub fn workers(mut self, value: usize) -> Self {
        self.cfg.workers = value;
        self
    }

    /// Sets the initial learning rate and the rate reached at the end of the first epoch.
    #[must_use]
    pub fn learning_rate(mut self, alpha: f32, min_alpha: f32) -> Self {
        self.cfg.alpha = alpha;
        self.cfg.min_alpha = min_alpha;
        self
    }

    /// Sets the per-epoch decay and its lower clamp.
    #[must_use]
    pub fn decay(mut self, alpha_decay: f32, alpha_floor: f32) -> Self {
        self.cfg.alpha_decay = alpha_decay;
        self.cfg.alpha_floor = alpha_floor;
        self
    }

    /// Sets the epoch count.
    #[must_use]
    pub fn epochs(mut self, value: usize) -> Self {
        self.cfg.epochs = value;
        self
    }

    /// Sets the number of negative samples.
    #[must_use]
    pub fn negative(mut self, value: usize) -> Self {
        self.cfg.negative = value;
        self
    }

    /// Sets the random seed.
    #[must_use]
    pub fn seed(mut self, value: u64) -> Self {
        self.cfg.seed = value;
        self
    }

    /// Enables or disables per-epoch logging.
    #[must_use]
    pub fn show_progress(mut self, enabled: bool) -> Self {
        self.cfg.show_progress = enabled;
        self
    }

    /// Finalises the builder, returning a validated [`TrainerConfig`].
    pub fn build(self) -> Result<TrainerConfig> {
        self.cfg.validate()?;
        Ok(self.cfg)
    }
}
