//! Paragraph-vector (doc2vec) training over directories of labelled documents.
//!
//! The crate exposes both a library API and a `docvec` command line interface. A run scans a
//! directory for documents, derives a label from each file name, and trains label vectors
//! across many epochs. Every epoch is a fresh pass over the corpus; the first pass calls the
//! tokenizer once per document and later passes replay the cached token lists in the same
//! order without touching the tokenizer again.
//!
//! ```no_run
//! use docvec::{
//!     scan_corpus, CorpusConfig, LabelExtractor, MarkupTokenizer, ScanConfig, TaggedCorpus,
//!     Trainer, TrainerConfig,
//! };
//!
//! # fn main() -> docvec::Result<()> {
//! let documents = scan_corpus(
//!     "/path/to/arxiv".as_ref(),
//!     &ScanConfig::default(),
//!     &LabelExtractor::default(),
//! )?;
//! let mut corpus = TaggedCorpus::new(documents, MarkupTokenizer::new(), CorpusConfig::default());
//! let trainer_cfg = TrainerConfig::builder()
//!     .vector_size(100)
//!     .epochs(10)
//!     .build()?;
//! let artifacts = Trainer::new(trainer_cfg).train(&mut corpus)?;
//! artifacts.model.save("model.json")?;
//! # Ok(())
//! # }
//! ```
//!
//! The CLI is enabled by default through the `cli` feature. Users targeting the library portion
//! only can disable default features to avoid the CLI dependencies:
//! `docvec = { version = "...", default-features = false }`.

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    clippy::all,
    rust_2018_idioms,
    future_incompatible,
    unused_lifetimes,
    unreachable_pub
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::missing_panics_doc,
    clippy::missing_errors_doc,
    clippy::doc_markdown,
    clippy::multiple_crate_versions
)]

pub mod cache;
pub mod config;
pub mod corpus;
pub mod documents;
pub mod error;
pub mod label;
pub mod metrics;
pub mod model;
pub mod serialization;
pub mod tokenize;
pub mod trainer;

pub use cache::{CacheSlot, DocumentCache, TaggedDocument};
pub use config::{
    CacheCapacity, CorpusBuilder, CorpusConfig, FailurePolicy, ScanBuilder, ScanConfig,
    TrainerBuilder, TrainerConfig,
};
pub use corpus::{scan_corpus, DocumentRef};
pub use documents::{CorpusStats, Pass, RepeatableCorpus, TaggedCorpus};
pub use error::{DocvecError, Result};
pub use label::{LabelExtractor, LabelRule};
pub use metrics::{EpochMetrics, TrainingMetrics};
pub use model::DocVecModel;
pub use tokenize::{CommandTokenizer, FnTokenizer, MarkupTokenizer, Tokenizer};
pub use trainer::{
    DocumentStream, EpochOutcome, LearningRate, PvDmTrainer, Trainer, TrainerArtifacts,
    VectorTrainer, VocabSummary,
};
