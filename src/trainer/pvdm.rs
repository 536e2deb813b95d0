//! Paragraph vectors, distributed-memory variant, trained with negative sampling.
//!
//! Each label owns a vector that is averaged with the vectors of the surrounding context words
//! to predict the word in the middle. Training is single-threaded and fully determined by
//! [`TrainerConfig::seed`]; the worker pool sized by [`TrainerConfig::workers`] only counts
//! tokens during the vocabulary pass.

use std::sync::Arc;

use log::debug;
use rand::distributions::{Distribution, WeightedIndex};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use rustc_hash::FxHashMap;

use super::{DocumentStream, EpochOutcome, LearningRate, VectorTrainer, VocabSummary};
use crate::cache::TaggedDocument;
use crate::config::TrainerConfig;
use crate::error::{DocvecError, Result};
use crate::model::{DocVecModel, ModelParts};

const COUNT_BATCH: usize = 1024;
const MAX_EXP: f32 = 6.0;

struct Vocabulary {
    words: Vec<String>,
    counts: Vec<usize>,
    index: FxHashMap<String, u32>,
    labels: Vec<String>,
    label_index: FxHashMap<String, usize>,
    retained_words: usize,
    documents: usize,
}

/// Built-in [`VectorTrainer`] producing a [`DocVecModel`].
pub struct PvDmTrainer {
    cfg: TrainerConfig,
    rng: StdRng,
    pool: ThreadPool,
    vocab: Option<Vocabulary>,
    negatives: Option<WeightedIndex<f64>>,
    word_vectors: Vec<f32>,
    label_vectors: Vec<f32>,
    output_weights: Vec<f32>,
    epochs_trained: usize,
}

impl PvDmTrainer {
    /// Creates an untrained model for `cfg`.
    pub fn new(cfg: TrainerConfig) -> Result<Self> {
        cfg.validate()?;
        let pool = ThreadPoolBuilder::new()
            .num_threads(cfg.workers)
            .thread_name(|idx| format!("docvec-vocab-{idx}"))
            .build()
            .map_err(|err| DocvecError::Training(format!("unable to start worker pool: {err}")))?;
        Ok(Self {
            rng: StdRng::seed_from_u64(cfg.seed),
            cfg,
            pool,
            vocab: None,
            negatives: None,
            word_vectors: Vec::new(),
            label_vectors: Vec::new(),
            output_weights: Vec::new(),
            epochs_trained: 0,
        })
    }

    fn count_batch(&self, batch: &[Arc<TaggedDocument>], counts: &mut FxHashMap<String, usize>) {
        let local: FxHashMap<&str, usize> = self.pool.install(|| {
            batch
                .par_iter()
                .fold(FxHashMap::default, |mut local: FxHashMap<&str, usize>, doc| {
                    for token in &doc.tokens {
                        *local.entry(token.as_str()).or_insert(0usize) += 1;
                    }
                    local
                })
                .reduce(FxHashMap::default, |mut acc, local| {
                    for (token, count) in local {
                        *acc.entry(token).or_insert(0) += count;
                    }
                    acc
                })
        });
        for (token, count) in local {
            match counts.get_mut(token) {
                Some(total) => *total += count,
                None => {
                    counts.insert(token.to_owned(), count);
                }
            }
        }
    }

    fn random_matrix(&mut self, rows: usize) -> Vec<f32> {
        let dim = self.cfg.vector_size;
        let scale = 1.0 / dim as f32;
        (0..rows * dim)
            .map(|_| (self.rng.gen::<f32>() - 0.5) * scale)
            .collect()
    }

    fn train_document(
        &mut self,
        doc: &TaggedDocument,
        progress: &mut usize,
        total_words: usize,
        rate: LearningRate,
    ) -> usize {
        let Some(vocab) = self.vocab.as_ref() else {
            return 0;
        };
        let Some(negatives) = self.negatives.as_ref() else {
            return 0;
        };
        let label_rows: Vec<usize> = doc
            .labels
            .iter()
            .filter_map(|label| vocab.label_index.get(label).copied())
            .collect();
        if label_rows.is_empty() {
            debug!("document without known label skipped");
            return 0;
        }
        let words: Vec<usize> = doc
            .tokens
            .iter()
            .filter_map(|token| vocab.index.get(token.as_str()).map(|&idx| idx as usize))
            .collect();

        let dim = self.cfg.vector_size;
        let window = self.cfg.window;
        let mut hidden = vec![0.0f32; dim];
        let mut gradient = vec![0.0f32; dim];
        for (pos, &target) in words.iter().enumerate() {
            let progress_ratio = (*progress as f32 / total_words.max(1) as f32).min(1.0);
            let alpha = rate.alpha - (rate.alpha - rate.min_alpha) * progress_ratio;
            *progress += 1;

            let start = pos.saturating_sub(window);
            let end = (pos + window + 1).min(words.len());
            let context: Vec<usize> = (start..end)
                .filter(|&idx| idx != pos)
                .map(|idx| words[idx])
                .collect();

            hidden.iter_mut().for_each(|value| *value = 0.0);
            for &row in &label_rows {
                add_row(&mut hidden, &self.label_vectors, row, dim);
            }
            for &word in &context {
                add_row(&mut hidden, &self.word_vectors, word, dim);
            }
            let inputs = (label_rows.len() + context.len()) as f32;
            hidden.iter_mut().for_each(|value| *value /= inputs);

            gradient.iter_mut().for_each(|value| *value = 0.0);
            let mut predict = |word: usize, truth: f32| {
                let out = &mut self.output_weights[word * dim..(word + 1) * dim];
                let dot: f32 = hidden.iter().zip(out.iter()).map(|(h, o)| h * o).sum();
                let g = (truth - sigmoid(dot)) * alpha;
                for ((grad, o), h) in gradient.iter_mut().zip(out.iter_mut()).zip(&hidden) {
                    *grad += g * *o;
                    *o += g * h;
                }
            };
            predict(target, 1.0);
            for _ in 0..self.cfg.negative {
                let sample = negatives.sample(&mut self.rng);
                if sample != target {
                    predict(sample, 0.0);
                }
            }

            gradient.iter_mut().for_each(|value| *value /= inputs);
            for &row in &label_rows {
                add_into_row(&mut self.label_vectors, row, dim, &gradient);
            }
            for &word in &context {
                add_into_row(&mut self.word_vectors, word, dim, &gradient);
            }
        }
        words.len()
    }
}

fn add_row(target: &mut [f32], matrix: &[f32], row: usize, dim: usize) {
    let source = &matrix[row * dim..(row + 1) * dim];
    for (t, s) in target.iter_mut().zip(source) {
        *t += s;
    }
}

fn add_into_row(matrix: &mut [f32], row: usize, dim: usize, delta: &[f32]) {
    let target = &mut matrix[row * dim..(row + 1) * dim];
    for (t, d) in target.iter_mut().zip(delta) {
        *t += d;
    }
}

fn sigmoid(x: f32) -> f32 {
    let x = x.clamp(-MAX_EXP, MAX_EXP);
    1.0 / (1.0 + (-x).exp())
}

impl VectorTrainer for PvDmTrainer {
    type Model = DocVecModel;

    fn build_vocab(&mut self, documents: &mut DocumentStream<'_>) -> Result<VocabSummary> {
        if self.vocab.is_some() {
            return Err(DocvecError::Training(
                "vocabulary has already been built".into(),
            ));
        }
        let mut counts: FxHashMap<String, usize> = FxHashMap::default();
        let mut labels = Vec::new();
        let mut label_index = FxHashMap::default();
        let mut doc_lengths = Vec::new();
        let mut raw_words = 0usize;
        let mut batch = Vec::with_capacity(COUNT_BATCH);

        for doc in documents {
            let doc = doc?;
            for label in &doc.labels {
                if !label_index.contains_key(label) {
                    label_index.insert(label.clone(), labels.len());
                    labels.push(label.clone());
                }
            }
            raw_words += doc.tokens.len();
            doc_lengths.push(doc.tokens.len());
            batch.push(doc);
            if batch.len() == COUNT_BATCH {
                self.count_batch(&batch, &mut counts);
                batch.clear();
            }
        }
        if !batch.is_empty() {
            self.count_batch(&batch, &mut counts);
        }
        drop(batch);

        if doc_lengths.is_empty() {
            return Err(DocvecError::Training(
                "vocabulary pass produced no documents".into(),
            ));
        }

        let mut retained: Vec<(String, usize)> = counts
            .into_iter()
            .filter(|(_, count)| *count >= self.cfg.min_count)
            .collect();
        if retained.is_empty() {
            return Err(DocvecError::Training(format!(
                "no token occurs at least min_count ({}) times",
                self.cfg.min_count
            )));
        }
        retained.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        let retained_words: usize = retained.iter().map(|(_, count)| count).sum();
        let (words, counts): (Vec<String>, Vec<usize>) = retained.into_iter().unzip();
        let index = words
            .iter()
            .enumerate()
            .map(|(idx, word)| (word.clone(), idx as u32))
            .collect();

        let weights = counts.iter().map(|&count| (count as f64).powf(0.75));
        self.negatives = Some(
            WeightedIndex::new(weights)
                .map_err(|err| DocvecError::Training(format!("negative sampling table: {err}")))?,
        );

        let summary = VocabSummary {
            documents: doc_lengths.len(),
            raw_words,
            vocab_size: words.len(),
            labels: labels.len(),
        };
        self.word_vectors = self.random_matrix(words.len());
        self.label_vectors = self.random_matrix(labels.len());
        self.output_weights = vec![0.0; words.len() * self.cfg.vector_size];
        self.vocab = Some(Vocabulary {
            words,
            counts,
            index,
            labels,
            label_index,
            retained_words,
            documents: summary.documents,
        });
        Ok(summary)
    }

    fn train_epoch(
        &mut self,
        documents: &mut DocumentStream<'_>,
        rate: LearningRate,
    ) -> Result<EpochOutcome> {
        let total_words = match self.vocab.as_ref() {
            Some(vocab) => vocab.retained_words,
            None => {
                return Err(DocvecError::Training(
                    "train_epoch called before build_vocab".into(),
                ))
            }
        };
        let mut outcome = EpochOutcome::default();
        let mut progress = 0usize;
        for doc in documents {
            let doc = doc?;
            outcome.words += self.train_document(&doc, &mut progress, total_words, rate);
            outcome.documents += 1;
        }
        if self.label_vectors.iter().any(|value| !value.is_finite()) {
            return Err(DocvecError::Training(
                "label vectors diverged to non-finite values".into(),
            ));
        }
        self.epochs_trained += 1;
        Ok(outcome)
    }

    fn finish(self) -> Result<DocVecModel> {
        let vocab = self.vocab.ok_or_else(|| {
            DocvecError::Training("finish called before build_vocab".into())
        })?;
        DocVecModel::from_parts(ModelParts {
            config: self.cfg,
            vocab: vocab.words,
            word_counts: vocab.counts,
            labels: vocab.labels,
            label_vectors: self.label_vectors,
            word_vectors: self.word_vectors,
            corpus_documents: vocab.documents,
            epochs_trained: self.epochs_trained,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CorpusConfig;
    use crate::corpus::DocumentRef;
    use crate::documents::TaggedCorpus;
    use crate::tokenize::FnTokenizer;
    use crate::trainer::Trainer;
    use std::path::Path;

    fn config(min_count: usize) -> TrainerConfig {
        TrainerConfig::builder()
            .vector_size(8)
            .window(2)
            .min_count(min_count)
            .workers(2)
            .epochs(3)
            .show_progress(false)
            .build()
            .expect("valid config")
    }

    fn corpus() -> TaggedCorpus<FnTokenizer<impl Fn(&Path) -> Result<String>>> {
        let tokenizer = FnTokenizer(|path: &Path| -> Result<String> {
            let text = if path.to_string_lossy().starts_with("astro") {
                "star galaxy star nebula galaxy star"
            } else {
                "field ring group field algebra ring"
            };
            Ok(text.into())
        });
        let docs = vec![
            DocumentRef::new("astro-ph0001.html", "astro-ph"),
            DocumentRef::new("math0001.html", "math"),
            DocumentRef::new("astro-ph0002.html", "astro-ph"),
        ];
        TaggedCorpus::new(docs, tokenizer, CorpusConfig::default())
    }

    #[test]
    fn vocabulary_orders_by_frequency_then_word() {
        let mut corpus = corpus();
        let artifacts = Trainer::new(config(2))
            .train(&mut corpus)
            .expect("training succeeds");
        let model = artifacts.model;
        assert_eq!(model.vocab()[0], "star");
        assert_eq!(model.word_count("star"), Some(6));
        assert_eq!(model.word_count("nebula"), Some(2));
        assert_eq!(model.labels(), ["astro-ph".to_string(), "math".to_string()]);
        assert_eq!(model.corpus_documents(), 3);
        assert_eq!(model.epochs_trained(), 3);
        assert!(model
            .label_vector("math")
            .expect("label trained")
            .iter()
            .all(|value| value.is_finite()));
    }

    #[test]
    fn same_seed_gives_same_vectors() {
        let first = Trainer::new(config(1))
            .train(&mut corpus())
            .expect("first run");
        let second = Trainer::new(config(1))
            .train(&mut corpus())
            .expect("second run");
        assert_eq!(
            first.model.label_vector("astro-ph"),
            second.model.label_vector("astro-ph")
        );
    }

    #[test]
    fn empty_vocabulary_is_an_error() {
        let mut corpus = corpus();
        let err = Trainer::new(config(100))
            .train(&mut corpus)
            .expect_err("nothing reaches min_count");
        assert!(matches!(err, DocvecError::Training(_)));
    }

    #[test]
    fn finish_requires_vocabulary() {
        let trainer = PvDmTrainer::new(config(1)).expect("trainer");
        assert!(trainer.finish().is_err());
    }
}
