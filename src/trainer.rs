//! Two-phase training orchestration over a repeatable corpus.
//!
//! A run is one vocabulary pass followed by `epochs` training passes. Each pass is a fresh
//! traversal of the corpus. After every epoch the learning rate drops by
//! [`TrainerConfig::alpha_decay`], is clamped at [`TrainerConfig::alpha_floor`], and the
//! minimum rate is reset to match it. Nothing is retried: the first failure ends the run and no
//! partial model is returned.

pub mod pvdm;

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use log::{error, info};
use serde::{Deserialize, Serialize};

use crate::cache::TaggedDocument;
use crate::config::{TrainerBuilder, TrainerConfig};
use crate::documents::RepeatableCorpus;
use crate::error::Result;
use crate::metrics::{sample_rss_kb, EpochMetrics, TrainingMetrics};
use crate::model::DocVecModel;

pub use pvdm::PvDmTrainer;

/// Stream of documents handed to a [`VectorTrainer`] for one pass.
pub type DocumentStream<'a> = dyn Iterator<Item = Result<Arc<TaggedDocument>>> + 'a;

/// Learning rate applied across one epoch, decaying linearly from `alpha` to `min_alpha`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LearningRate {
    /// Rate at the start of the epoch.
    pub alpha: f32,
    /// Rate at the end of the epoch.
    pub min_alpha: f32,
}

/// Per-epoch learning-rate schedule: fixed decrement, lower clamp, minimum tracks current.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateSchedule {
    current: LearningRate,
    decay: f32,
    floor: f32,
}

impl RateSchedule {
    /// Builds the schedule described by `cfg`.
    #[must_use]
    pub fn from_config(cfg: &TrainerConfig) -> Self {
        Self {
            current: LearningRate {
                alpha: cfg.alpha,
                min_alpha: cfg.min_alpha,
            },
            decay: cfg.alpha_decay,
            floor: cfg.alpha_floor,
        }
    }

    /// Rate for the upcoming epoch.
    #[must_use]
    pub fn current(&self) -> LearningRate {
        self.current
    }

    /// Applies the post-epoch decrement.
    pub fn advance(&mut self) {
        let alpha = (self.current.alpha - self.decay).max(self.floor);
        self.current = LearningRate {
            alpha,
            min_alpha: alpha,
        };
    }
}

/// What the vocabulary pass established.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VocabSummary {
    /// Documents consumed.
    pub documents: usize,
    /// Tokens seen, before frequency filtering.
    pub raw_words: usize,
    /// Distinct tokens kept.
    pub vocab_size: usize,
    /// Distinct labels.
    pub labels: usize,
}

/// What one epoch trained on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpochOutcome {
    /// Documents consumed.
    pub documents: usize,
    /// Tokens trained on after frequency filtering.
    pub words: usize,
}

/// The model-training collaborator driven by [`Trainer`].
///
/// Implementations consume each stream on the calling thread; they may fan work out to their
/// own workers but must never pull from the stream concurrently. Errors yielded by the stream
/// are propagated unchanged.
pub trait VectorTrainer {
    /// Model produced by [`VectorTrainer::finish`].
    type Model;

    /// Establishes vocabulary and labels from one full pass.
    fn build_vocab(&mut self, documents: &mut DocumentStream<'_>) -> Result<VocabSummary>;

    /// Performs one training step over a full pass.
    fn train_epoch(
        &mut self,
        documents: &mut DocumentStream<'_>,
        rate: LearningRate,
    ) -> Result<EpochOutcome>;

    /// Ends training and hands over the model.
    fn finish(self) -> Result<Self::Model>;
}

/// High-level façade configuring and executing training runs.
#[derive(Debug, Clone)]
pub struct Trainer {
    cfg: TrainerConfig,
}

/// Artifacts returned after a training session completes.
#[must_use]
#[derive(Debug, Clone)]
pub struct TrainerArtifacts<M = DocVecModel> {
    /// Trained model.
    pub model: M,
    /// Detailed metrics captured during training.
    pub metrics: TrainingMetrics,
}

impl Trainer {
    /// Creates a new trainer for the supplied configuration.
    #[must_use]
    pub fn new(cfg: TrainerConfig) -> Self {
        Self { cfg }
    }

    /// Returns a [`TrainerBuilder`] with default settings.
    #[must_use]
    pub fn builder() -> TrainerBuilder {
        TrainerConfig::builder()
    }

    /// Returns an immutable reference to the underlying configuration.
    #[must_use]
    pub fn config(&self) -> &TrainerConfig {
        &self.cfg
    }

    /// Trains the built-in [`PvDmTrainer`] over `corpus`.
    pub fn train<C: RepeatableCorpus>(&self, corpus: &mut C) -> Result<TrainerArtifacts> {
        let backend = PvDmTrainer::new(self.cfg.clone())?;
        self.train_with(corpus, backend)
    }

    /// Drives `backend` through the vocabulary pass and every epoch.
    pub fn train_with<C, V>(&self, corpus: &mut C, mut backend: V) -> Result<TrainerArtifacts<V::Model>>
    where
        C: RepeatableCorpus,
        V: VectorTrainer,
    {
        self.cfg.validate()?;
        let training_start = Instant::now();
        let mut metrics = TrainingMetrics::new(self.cfg.epochs);

        let before = corpus.stats();
        let vocab_start = Instant::now();
        let summary = {
            let mut pass = corpus.pass();
            backend.build_vocab(&mut pass)
        }
        .map_err(|err| {
            error!("vocabulary pass failed: {err}");
            err
        })?;
        let delta = corpus.stats().since(&before);
        metrics.vocab_documents = summary.documents;
        metrics.vocab_tokenizer_calls = delta.tokenizer_calls;
        metrics.vocab_duration = vocab_start.elapsed();
        info!(
            "vocabulary pass: {} documents, {} labels, {} raw tokens, {} distinct words kept ({} tokenizer calls, {} skipped) in {:.2?}",
            summary.documents,
            summary.labels,
            summary.raw_words,
            summary.vocab_size,
            delta.tokenizer_calls,
            delta.documents_skipped,
            metrics.vocab_duration
        );

        let mut schedule = RateSchedule::from_config(&self.cfg);
        for epoch in 1..=self.cfg.epochs {
            let rate = schedule.current();
            let before = corpus.stats();
            let epoch_start = Instant::now();
            let outcome = {
                let mut pass = corpus.pass();
                backend.train_epoch(&mut pass, rate)
            }
            .map_err(|err| {
                error!("epoch {epoch} failed, aborting run: {err}");
                err
            })?;
            let delta = corpus.stats().since(&before);
            let epoch_metrics = EpochMetrics {
                epoch,
                alpha: rate.alpha,
                min_alpha: rate.min_alpha,
                documents: outcome.documents,
                skipped: delta.documents_skipped,
                words: outcome.words,
                tokenizer_calls: delta.tokenizer_calls,
                elapsed: epoch_start.elapsed(),
                rss_kb: sample_rss_kb(),
            };
            if self.cfg.show_progress {
                info!(
                    "epoch {:>4}/{} alpha {:.5} docs {:>8} words {:>10} tokenizer_calls {:>6} in {:.2?}",
                    epoch,
                    self.cfg.epochs,
                    rate.alpha,
                    outcome.documents,
                    outcome.words,
                    delta.tokenizer_calls,
                    epoch_metrics.elapsed
                );
            }
            metrics.epochs.push(epoch_metrics);
            schedule.advance();
        }

        let model = backend.finish()?;
        metrics.total_duration = training_start.elapsed();
        if self.cfg.show_progress {
            info!(
                "completed {} epochs in {:.2?}",
                self.cfg.epochs, metrics.total_duration
            );
        }
        Ok(TrainerArtifacts { model, metrics })
    }
}

impl fmt::Display for TrainerArtifacts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Doc2vec model with {} labels, {} words, {} dimensions",
            self.model.labels().len(),
            self.model.vocab_size(),
            self.model.vector_size()
        )?;
        writeln!(f, "Epochs: {}", self.metrics.epochs.len())?;
        writeln!(f, "Tokenizer calls: {}", self.metrics.tokenizer_calls())?;
        writeln!(f, "Total duration: {:?}", self.metrics.total_duration)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CorpusConfig;
    use crate::corpus::DocumentRef;
    use crate::documents::TaggedCorpus;
    use crate::error::DocvecError;
    use crate::tokenize::FnTokenizer;
    use std::path::Path;

    fn schedule(alpha: f32, decay: f32, floor: f32) -> RateSchedule {
        let cfg = TrainerConfig {
            alpha,
            min_alpha: alpha,
            alpha_decay: decay,
            alpha_floor: floor,
            ..TrainerConfig::default()
        };
        RateSchedule::from_config(&cfg)
    }

    #[test]
    fn schedule_decrements_and_tracks_minimum() {
        let mut schedule = schedule(0.025, 0.002, 0.0001);
        assert_eq!(schedule.current().alpha, 0.025);
        schedule.advance();
        let rate = schedule.current();
        assert!((rate.alpha - 0.023).abs() < 1e-7);
        assert_eq!(rate.alpha, rate.min_alpha);
    }

    #[test]
    fn schedule_clamps_at_floor() {
        let mut schedule = schedule(0.003, 0.002, 0.0015);
        schedule.advance();
        schedule.advance();
        assert_eq!(schedule.current().alpha, 0.0015);
        assert_eq!(schedule.current().min_alpha, 0.0015);
    }

    struct FailingEpoch;

    impl VectorTrainer for FailingEpoch {
        type Model = ();

        fn build_vocab(&mut self, documents: &mut DocumentStream<'_>) -> Result<VocabSummary> {
            let documents = documents.collect::<Result<Vec<_>>>()?.len();
            Ok(VocabSummary {
                documents,
                ..VocabSummary::default()
            })
        }

        fn train_epoch(
            &mut self,
            _documents: &mut DocumentStream<'_>,
            _rate: LearningRate,
        ) -> Result<EpochOutcome> {
            Err(DocvecError::Training("diverged".into()))
        }

        fn finish(self) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn epoch_failure_aborts_the_run() {
        let tokenizer = FnTokenizer(|_: &Path| -> Result<String> { Ok("a b".into()) });
        let mut corpus = TaggedCorpus::new(
            vec![DocumentRef::new("x.html", "x")],
            tokenizer,
            CorpusConfig::default(),
        );
        let trainer = Trainer::new(TrainerConfig {
            show_progress: false,
            ..TrainerConfig::default()
        });
        let err = trainer
            .train_with(&mut corpus, FailingEpoch)
            .expect_err("epoch failure is fatal");
        assert!(matches!(err, DocvecError::Training(_)));
        assert_eq!(corpus.stats().passes, 2);
    }
}
