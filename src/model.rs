//! Trained paragraph-vector model and lookups over it.

use std::cmp::Ordering;
use std::path::{Path, PathBuf};

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::config::TrainerConfig;
use crate::error::{DocvecError, Result};
use crate::serialization::{export_label_vectors, load_model, model_json, save_model};

/// Learned label and word vectors together with the vocabulary that produced them.
#[must_use]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocVecModel {
    config: TrainerConfig,
    vocab: Vec<String>,
    word_counts: Vec<usize>,
    labels: Vec<String>,
    label_vectors: Vec<f32>,
    word_vectors: Vec<f32>,
    corpus_documents: usize,
    epochs_trained: usize,
    #[serde(skip)]
    label_index: FxHashMap<String, usize>,
    #[serde(skip)]
    word_index: FxHashMap<String, usize>,
}

/// Raw parts of a [`DocVecModel`], used by trainers to assemble one.
#[derive(Debug, Clone)]
pub struct ModelParts {
    /// Configuration the model was trained with.
    pub config: TrainerConfig,
    /// Retained vocabulary, most frequent first.
    pub vocab: Vec<String>,
    /// Corpus frequency of each vocabulary entry.
    pub word_counts: Vec<usize>,
    /// Labels in order of first appearance.
    pub labels: Vec<String>,
    /// Row-major `labels.len() x vector_size` matrix.
    pub label_vectors: Vec<f32>,
    /// Row-major `vocab.len() x vector_size` matrix.
    pub word_vectors: Vec<f32>,
    /// Documents seen by the vocabulary pass.
    pub corpus_documents: usize,
    /// Epochs completed.
    pub epochs_trained: usize,
}

impl DocVecModel {
    /// Assembles a model, checking that matrix shapes agree with the vocabulary and labels.
    pub fn from_parts(parts: ModelParts) -> Result<Self> {
        let model = Self {
            config: parts.config,
            vocab: parts.vocab,
            word_counts: parts.word_counts,
            labels: parts.labels,
            label_vectors: parts.label_vectors,
            word_vectors: parts.word_vectors,
            corpus_documents: parts.corpus_documents,
            epochs_trained: parts.epochs_trained,
            label_index: FxHashMap::default(),
            word_index: FxHashMap::default(),
        };
        model.indexed()
    }

    /// Validates shapes and rebuilds lookup tables after construction or deserialisation.
    pub(crate) fn indexed(mut self) -> Result<Self> {
        let dim = self.config.vector_size;
        if self.word_counts.len() != self.vocab.len() {
            return Err(DocvecError::Serialization(format!(
                "{} word counts for {} vocabulary entries",
                self.word_counts.len(),
                self.vocab.len()
            )));
        }
        if self.label_vectors.len() != self.labels.len() * dim {
            return Err(DocvecError::Serialization(format!(
                "label matrix holds {} values, expected {} x {dim}",
                self.label_vectors.len(),
                self.labels.len()
            )));
        }
        if self.word_vectors.len() != self.vocab.len() * dim {
            return Err(DocvecError::Serialization(format!(
                "word matrix holds {} values, expected {} x {dim}",
                self.word_vectors.len(),
                self.vocab.len()
            )));
        }
        self.label_index = self
            .labels
            .iter()
            .enumerate()
            .map(|(idx, label)| (label.clone(), idx))
            .collect();
        self.word_index = self
            .vocab
            .iter()
            .enumerate()
            .map(|(idx, word)| (word.clone(), idx))
            .collect();
        Ok(self)
    }

    /// Returns the [`TrainerConfig`] used to produce the model.
    #[must_use]
    pub fn trainer_config(&self) -> &TrainerConfig {
        &self.config
    }

    /// Vector dimensionality.
    #[must_use]
    pub fn vector_size(&self) -> usize {
        self.config.vector_size
    }

    /// Retained vocabulary, most frequent first.
    #[must_use]
    pub fn vocab(&self) -> &[String] {
        &self.vocab
    }

    /// Number of retained vocabulary entries.
    #[must_use]
    pub fn vocab_size(&self) -> usize {
        self.vocab.len()
    }

    /// Labels in order of first appearance in the corpus.
    #[must_use]
    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    /// Documents seen by the vocabulary pass.
    #[must_use]
    pub fn corpus_documents(&self) -> usize {
        self.corpus_documents
    }

    /// Epochs completed.
    #[must_use]
    pub fn epochs_trained(&self) -> usize {
        self.epochs_trained
    }

    /// Corpus frequency of `word`, if it was retained.
    #[must_use]
    pub fn word_count(&self, word: &str) -> Option<usize> {
        self.word_index.get(word).map(|&idx| self.word_counts[idx])
    }

    /// Learned vector for `label`.
    #[must_use]
    pub fn label_vector(&self, label: &str) -> Option<&[f32]> {
        let dim = self.vector_size();
        self.label_index
            .get(label)
            .map(|&idx| &self.label_vectors[idx * dim..(idx + 1) * dim])
    }

    /// Learned input vector for `word`.
    #[must_use]
    pub fn word_vector(&self, word: &str) -> Option<&[f32]> {
        let dim = self.vector_size();
        self.word_index
            .get(word)
            .map(|&idx| &self.word_vectors[idx * dim..(idx + 1) * dim])
    }

    /// Labels closest to `label` by cosine similarity, best first, excluding `label` itself.
    pub fn most_similar(&self, label: &str, top_n: usize) -> Result<Vec<(String, f32)>> {
        let query = self.label_vector(label).ok_or_else(|| {
            DocvecError::InvalidConfig(format!("label {label:?} is not part of the model"))
        })?;
        let dim = self.vector_size();
        let mut scored: Vec<(String, f32)> = self
            .labels
            .iter()
            .enumerate()
            .filter(|(_, other)| other.as_str() != label)
            .map(|(idx, other)| {
                let vector = &self.label_vectors[idx * dim..(idx + 1) * dim];
                (other.clone(), cosine(query, vector))
            })
            .collect();
        scored.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });
        scored.truncate(top_n);
        Ok(scored)
    }

    /// Persists the model as JSON.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        save_model(self, path, false)
    }

    /// Serialises the model to a JSON string.
    pub fn to_json(&self, pretty: bool) -> Result<String> {
        model_json(self, pretty)
    }

    /// Loads a model previously written by [`DocVecModel::save`].
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        load_model(path)
    }

    /// Writes `<dir>/<prefix><label>_vector.txt` for every label, one value per line.
    pub fn export_label_vectors<P: AsRef<Path>>(
        &self,
        dir: P,
        prefix: &str,
    ) -> Result<Vec<PathBuf>> {
        export_label_vectors(self, dir.as_ref(), prefix)
    }
}

/// Cosine similarity; zero vectors score `0.0`.
#[must_use]
pub fn cosine(a: &[f32], b: &[f32]) -> f32 {
    let (mut dot, mut norm_a, mut norm_b) = (0.0f32, 0.0f32, 0.0f32);
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a.sqrt() * norm_b.sqrt())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use tempfile::tempdir;

    pub(crate) fn toy_model() -> DocVecModel {
        let config = TrainerConfig {
            vector_size: 2,
            ..TrainerConfig::default()
        };
        DocVecModel::from_parts(ModelParts {
            config,
            vocab: vec!["star".into(), "galaxy".into()],
            word_counts: vec![7, 3],
            labels: vec!["astro-ph".into(), "hep-th".into(), "math".into()],
            label_vectors: vec![1.0, 0.0, 0.9, 0.1, 0.0, 1.0],
            word_vectors: vec![0.5, 0.5, -0.5, 0.5],
            corpus_documents: 3,
            epochs_trained: 2,
        })
        .expect("consistent parts")
    }

    #[test]
    fn lookups_follow_indices() {
        let model = toy_model();
        assert_eq!(model.label_vector("hep-th"), Some(&[0.9, 0.1][..]));
        assert_eq!(model.word_vector("galaxy"), Some(&[-0.5, 0.5][..]));
        assert_eq!(model.word_count("star"), Some(7));
        assert!(model.label_vector("missing").is_none());
    }

    #[test]
    fn most_similar_ranks_by_cosine() {
        let model = toy_model();
        let similar = model.most_similar("astro-ph", 5).expect("known label");
        let labels: Vec<_> = similar.iter().map(|(label, _)| label.as_str()).collect();
        assert_eq!(labels, vec!["hep-th", "math"]);
        assert!(similar[0].1 > similar[1].1);
        assert!(model.most_similar("missing", 1).is_err());
    }

    #[test]
    fn from_parts_rejects_mismatched_shapes() {
        let err = DocVecModel::from_parts(ModelParts {
            config: TrainerConfig {
                vector_size: 3,
                ..TrainerConfig::default()
            },
            vocab: Vec::new(),
            word_counts: Vec::new(),
            labels: vec!["a".into()],
            label_vectors: vec![0.0; 2],
            word_vectors: Vec::new(),
            corpus_documents: 1,
            epochs_trained: 1,
        })
        .expect_err("shape mismatch");
        assert!(matches!(err, DocvecError::Serialization(_)));
    }

    #[test]
    fn save_and_load_restore_lookups() {
        let model = toy_model();
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("model.json");
        model.save(&path).expect("save");
        let loaded = DocVecModel::load(&path).expect("load");
        assert_eq!(loaded.labels(), model.labels());
        assert_eq!(loaded.label_vector("math"), model.label_vector("math"));
        assert_eq!(loaded.epochs_trained(), 2);
    }

    #[test]
    fn cosine_handles_zero_vectors() {
        assert_eq!(cosine(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
        assert!((cosine(&[1.0, 1.0], &[2.0, 2.0]) - 1.0).abs() < 1e-6);
    }
}
