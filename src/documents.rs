//! Restartable, lazily tokenized corpus passes.
//!
//! [`TaggedCorpus`] owns the ordered [`DocumentRef`] list, the injected [`Tokenizer`], and the
//! [`DocumentCache`]. Every call to [`RepeatableCorpus::pass`] starts an independent traversal
//! at index zero. The first pass that reaches an index tokenizes the document and records it;
//! later passes replay the recorded document without touching the tokenizer.
//!
//! A pass borrows the corpus mutably, so only one traversal can populate the cache at a time.

use std::sync::Arc;

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::cache::{CacheSlot, DocumentCache, TaggedDocument};
use crate::config::{CorpusConfig, FailurePolicy};
use crate::corpus::DocumentRef;
use crate::error::{DocvecError, Result};
use crate::metrics::sample_rss_kb;
use crate::tokenize::Tokenizer;

/// A corpus that can be traversed from the beginning any number of times.
pub trait RepeatableCorpus {
    /// Iterator produced by one traversal.
    type Pass<'a>: Iterator<Item = Result<Arc<TaggedDocument>>>
    where
        Self: 'a;

    /// Starts a fresh traversal from the first document.
    fn pass(&mut self) -> Self::Pass<'_>;

    /// Number of documents in the corpus, including ones that may be skipped.
    fn len(&self) -> usize;

    /// Returns `true` for a corpus without documents.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Cumulative counters across every pass so far.
    fn stats(&self) -> CorpusStats;
}

/// Cumulative counters maintained by a [`TaggedCorpus`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorpusStats {
    /// Passes started.
    pub passes: usize,
    /// Documents handed to consumers.
    pub documents_yielded: usize,
    /// Documents left out because their tokenization failed.
    pub documents_skipped: usize,
    /// Tokenizer invocations.
    pub tokenizer_calls: usize,
    /// Progress lines emitted, one per `progress_interval` documents within a pass.
    pub progress_reports: usize,
}

impl CorpusStats {
    /// Counter differences accumulated since `earlier`.
    #[must_use]
    pub fn since(&self, earlier: &Self) -> Self {
        Self {
            passes: self.passes.saturating_sub(earlier.passes),
            documents_yielded: self
                .documents_yielded
                .saturating_sub(earlier.documents_yielded),
            documents_skipped: self
                .documents_skipped
                .saturating_sub(earlier.documents_skipped),
            tokenizer_calls: self.tokenizer_calls.saturating_sub(earlier.tokenizer_calls),
            progress_reports: self
                .progress_reports
                .saturating_sub(earlier.progress_reports),
        }
    }
}

/// Labelled documents tokenized on first use and cached for every later pass.
#[derive(Debug)]
pub struct TaggedCorpus<T> {
    documents: Vec<DocumentRef>,
    tokenizer: T,
    cache: DocumentCache,
    cfg: CorpusConfig,
    stats: CorpusStats,
    warned: bool,
}

impl<T: Tokenizer> TaggedCorpus<T> {
    /// Creates a corpus over `documents` with an empty cache sized by `cfg`.
    pub fn new(documents: Vec<DocumentRef>, tokenizer: T, cfg: CorpusConfig) -> Self {
        let cache = DocumentCache::new(cfg.cache_capacity);
        Self {
            documents,
            tokenizer,
            cache,
            cfg,
            stats: CorpusStats::default(),
            warned: false,
        }
    }

    /// Creates a corpus that continues filling an existing cache.
    ///
    /// The cache must have been populated from the same document list in the same order: it may
    /// not hold more entries than there are documents, and every cached document must carry the
    /// label of the [`DocumentRef`] at its index.
    pub fn with_cache(
        documents: Vec<DocumentRef>,
        tokenizer: T,
        cache: DocumentCache,
        cfg: CorpusConfig,
    ) -> Result<Self> {
        if cache.len() > documents.len() {
            return Err(DocvecError::InvalidConfig(format!(
                "cache holds {} entries for a corpus of {} documents",
                cache.len(),
                documents.len()
            )));
        }
        for (index, doc_ref) in documents.iter().enumerate().take(cache.len()) {
            if let Some(CacheSlot::Document(doc)) = cache.get(index) {
                if doc.label() != Some(doc_ref.label()) {
                    return Err(DocvecError::InvalidConfig(format!(
                        "cached document {index} is labelled {:?}, expected {:?}",
                        doc.label().unwrap_or_default(),
                        doc_ref.label()
                    )));
                }
            }
        }
        Ok(Self {
            documents,
            tokenizer,
            cache,
            cfg,
            stats: CorpusStats::default(),
            warned: false,
        })
    }

    /// Documents in traversal order.
    #[must_use]
    pub fn documents(&self) -> &[DocumentRef] {
        &self.documents
    }

    /// The cache backing this corpus.
    #[must_use]
    pub fn cache(&self) -> &DocumentCache {
        &self.cache
    }

    /// Configuration in force.
    #[must_use]
    pub fn config(&self) -> &CorpusConfig {
        &self.cfg
    }

    /// The injected tokenizer.
    #[must_use]
    pub fn tokenizer(&self) -> &T {
        &self.tokenizer
    }

    /// Returns `true` once the cache-growth warning has been logged.
    #[must_use]
    pub fn cache_warning_issued(&self) -> bool {
        self.warned
    }

    /// Releases the document list and cache.
    pub fn into_parts(self) -> (Vec<DocumentRef>, DocumentCache) {
        (self.documents, self.cache)
    }
}

impl<T: Tokenizer> RepeatableCorpus for TaggedCorpus<T> {
    type Pass<'a> = Pass<'a, T> where Self: 'a;

    fn pass(&mut self) -> Self::Pass<'_> {
        self.stats.passes += 1;
        let number = self.stats.passes;
        let calls_at_start = self.stats.tokenizer_calls;
        debug!(
            "starting pass {} over {} documents ({} cached)",
            self.stats.passes,
            self.documents.len(),
            self.cache.len()
        );
        Pass {
            number,
            documents: &self.documents,
            tokenizer: &self.tokenizer,
            cache: &mut self.cache,
            cfg: &self.cfg,
            stats: &mut self.stats,
            warned: &mut self.warned,
            position: 0,
            calls_at_start,
            finished: false,
        }
    }

    fn len(&self) -> usize {
        self.documents.len()
    }

    fn stats(&self) -> CorpusStats {
        self.stats
    }
}

enum Fetched {
    Document(Arc<TaggedDocument>),
    Skipped,
    Failed(DocvecError),
}

/// One traversal over a [`TaggedCorpus`], yielding documents in corpus order.
///
/// Documents whose tokenization failed are left out under [`FailurePolicy::Skip`]. Under
/// [`FailurePolicy::Abort`] the failure is yielded once and the pass ends.
pub struct Pass<'a, T> {
    number: usize,
    documents: &'a [DocumentRef],
    tokenizer: &'a T,
    cache: &'a mut DocumentCache,
    cfg: &'a CorpusConfig,
    stats: &'a mut CorpusStats,
    warned: &'a mut bool,
    position: usize,
    calls_at_start: usize,
    finished: bool,
}

impl<'a, T: Tokenizer> Pass<'a, T> {
    /// Index of the next document this pass will visit.
    #[must_use]
    pub fn position(&self) -> usize {
        self.position
    }

    fn fetch(&mut self, index: usize) -> Fetched {
        match self.cache.get(index) {
            Some(CacheSlot::Document(doc)) => return Fetched::Document(Arc::clone(doc)),
            Some(CacheSlot::Failed) => return Fetched::Skipped,
            None => {}
        }

        let documents = self.documents;
        let doc_ref = &documents[index];
        self.stats.tokenizer_calls += 1;
        match self.tokenizer.tokenize(doc_ref.path()) {
            Ok(tokens) => {
                let doc = Arc::new(TaggedDocument::from_token_string(&tokens, doc_ref.label()));
                if self.cache.admits(index) {
                    if let Err(err) = self.cache.insert(index, CacheSlot::Document(Arc::clone(&doc)))
                    {
                        return Fetched::Failed(err);
                    }
                    self.warn_on_growth();
                }
                Fetched::Document(doc)
            }
            Err(err) if err.is_per_document() && self.cfg.failure_policy == FailurePolicy::Skip => {
                warn!("skipping document: {err}");
                if self.cache.admits(index) {
                    if let Err(err) = self.cache.insert(index, CacheSlot::Failed) {
                        return Fetched::Failed(err);
                    }
                }
                Fetched::Skipped
            }
            Err(err) => Fetched::Failed(err),
        }
    }

    fn warn_on_growth(&mut self) {
        let Some(threshold) = self.cfg.cache_warning_threshold else {
            return;
        };
        if *self.warned || self.cache.documents() < threshold {
            return;
        }
        *self.warned = true;
        let rss = sample_rss_kb()
            .map(|kb| format!(", resident memory {:.1} MiB", kb as f64 / 1024.0))
            .unwrap_or_default();
        warn!(
            "document cache holds {} documents ({} tokens){rss}; the cache is never evicted and \
             large corpora can exhaust memory",
            self.cache.documents(),
            self.cache.tokens()
        );
    }

    fn report_progress(&mut self, processed: usize) {
        let interval = self.cfg.progress_interval;
        if interval == 0 || processed % interval != 0 {
            return;
        }
        self.stats.progress_reports += 1;
        info!(
            "pass {}: {processed}/{} documents, {} tokenizer calls this pass",
            self.number,
            self.documents.len(),
            self.stats.tokenizer_calls - self.calls_at_start
        );
    }
}

impl<'a, T: Tokenizer> Iterator for Pass<'a, T> {
    type Item = Result<Arc<TaggedDocument>>;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.finished && self.position < self.documents.len() {
            let index = self.position;
            self.position += 1;
            let fetched = self.fetch(index);
            self.report_progress(index + 1);
            match fetched {
                Fetched::Document(doc) => {
                    self.stats.documents_yielded += 1;
                    return Some(Ok(doc));
                }
                Fetched::Skipped => {
                    self.stats.documents_skipped += 1;
                }
                Fetched::Failed(err) => {
                    self.finished = true;
                    return Some(Err(err));
                }
            }
        }
        None
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        if self.finished {
            (0, Some(0))
        } else {
            (0, Some(self.documents.len() - self.position))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CacheCapacity;
    use crate::tokenize::FnTokenizer;
    use std::cell::Cell;
    use std::path::Path;

    fn refs(names: &[&str]) -> Vec<DocumentRef> {
        names
            .iter()
            .map(|name| DocumentRef::new(format!("corpus/{name}.html"), *name))
            .collect()
    }

    fn quiet() -> CorpusConfig {
        CorpusConfig::builder().progress_interval(0).build()
    }

    #[test]
    fn second_pass_replays_cache() {
        let calls = Cell::new(0usize);
        let tokenizer = FnTokenizer(|path: &Path| -> Result<String> {
            calls.set(calls.get() + 1);
            Ok(format!("tokens of {}", path.display()))
        });
        let mut corpus = TaggedCorpus::new(refs(&["a", "b", "c"]), tokenizer, quiet());

        let first: Vec<_> = corpus.pass().collect::<Result<_>>().expect("first pass");
        assert_eq!(calls.get(), 3);
        let second: Vec<_> = corpus.pass().collect::<Result<_>>().expect("second pass");
        assert_eq!(calls.get(), 3);
        assert_eq!(first, second);
        assert_eq!(corpus.stats().passes, 2);
        assert_eq!(corpus.stats().documents_yielded, 6);
    }

    #[test]
    fn partial_pass_leaves_no_gaps() {
        let calls = Cell::new(0usize);
        let tokenizer = FnTokenizer(|_: &Path| -> Result<String> {
            calls.set(calls.get() + 1);
            Ok("x".into())
        });
        let mut corpus = TaggedCorpus::new(refs(&["a", "b", "c"]), tokenizer, quiet());
        let taken = corpus.pass().take(2).count();
        assert_eq!(taken, 2);
        assert_eq!(corpus.cache().len(), 2);
        assert_eq!(corpus.pass().count(), 3);
        assert_eq!(calls.get(), 3);
    }

    #[test]
    fn skip_policy_records_failures_once() {
        let calls = Cell::new(0usize);
        let tokenizer = FnTokenizer(|path: &Path| -> Result<String> {
            calls.set(calls.get() + 1);
            if path.to_string_lossy().contains("bad") {
                Err(DocvecError::tokenization(path, "boom"))
            } else {
                Ok("fine".into())
            }
        });
        let mut corpus = TaggedCorpus::new(refs(&["a", "bad", "c"]), tokenizer, quiet());
        let labels = |docs: Vec<Arc<TaggedDocument>>| -> Vec<String> {
            docs.iter().map(|doc| doc.label().unwrap().to_string()).collect()
        };
        let first = corpus.pass().collect::<Result<Vec<_>>>().expect("skip pass");
        assert_eq!(labels(first), vec!["a", "c"]);
        let second = corpus.pass().collect::<Result<Vec<_>>>().expect("replay pass");
        assert_eq!(labels(second), vec!["a", "c"]);
        assert_eq!(calls.get(), 3);
        assert_eq!(corpus.stats().documents_skipped, 2);
    }

    #[test]
    fn abort_policy_yields_error_and_stops() {
        let tokenizer = FnTokenizer(|path: &Path| -> Result<String> {
            Err(DocvecError::tokenization(path, "boom"))
        });
        let cfg = CorpusConfig::builder()
            .progress_interval(0)
            .failure_policy(FailurePolicy::Abort)
            .build();
        let mut corpus = TaggedCorpus::new(refs(&["a", "b"]), tokenizer, cfg);
        let mut pass = corpus.pass();
        assert!(matches!(
            pass.next(),
            Some(Err(DocvecError::Tokenization { .. }))
        ));
        assert!(pass.next().is_none());
        drop(pass);
        assert!(corpus.cache().is_empty());
    }

    #[test]
    fn bounded_cache_retokenizes_the_tail() {
        let calls = Cell::new(0usize);
        let tokenizer = FnTokenizer(|_: &Path| -> Result<String> {
            calls.set(calls.get() + 1);
            Ok("x y".into())
        });
        let cfg = CorpusConfig::builder()
            .progress_interval(0)
            .cache_capacity(CacheCapacity::Bounded(1))
            .build();
        let mut corpus = TaggedCorpus::new(refs(&["a", "b", "c"]), tokenizer, cfg);
        assert_eq!(corpus.pass().count(), 3);
        assert_eq!(corpus.pass().count(), 3);
        assert_eq!(calls.get(), 5);
        assert_eq!(corpus.cache().len(), 1);
    }

    #[test]
    fn empty_corpus_yields_nothing() {
        let tokenizer = FnTokenizer(|_: &Path| -> Result<String> {
            panic!("tokenizer must not be called")
        });
        let mut corpus = TaggedCorpus::new(Vec::new(), tokenizer, quiet());
        assert!(corpus.is_empty());
        assert_eq!(corpus.pass().count(), 0);
        assert_eq!(corpus.stats().tokenizer_calls, 0);
    }

    #[test]
    fn stats_since_reports_deltas() {
        let later = CorpusStats {
            passes: 3,
            documents_yielded: 10,
            documents_skipped: 1,
            tokenizer_calls: 5,
            progress_reports: 4,
        };
        let earlier = CorpusStats {
            passes: 1,
            documents_yielded: 4,
            documents_skipped: 1,
            tokenizer_calls: 5,
            progress_reports: 1,
        };
        let delta = later.since(&earlier);
        assert_eq!(delta.passes, 2);
        assert_eq!(delta.documents_yielded, 6);
        assert_eq!(delta.documents_skipped, 0);
        assert_eq!(delta.tokenizer_calls, 0);
        assert_eq!(delta.progress_reports, 3);
    }

    fn counting(names: &[&str]) -> TaggedCorpus<FnTokenizer<impl Fn(&Path) -> Result<String>>> {
        let tokenizer = FnTokenizer(|path: &Path| -> Result<String> {
            Ok(format!("tokens of {}", path.display()))
        });
        TaggedCorpus::new(refs(names), tokenizer, quiet())
    }

    #[test]
    fn progress_is_reported_every_interval() {
        let tokenizer = FnTokenizer(|_: &Path| -> Result<String> { Ok("x".into()) });
        let cfg = CorpusConfig::builder()
            .progress_interval(2)
            .cache_warning_threshold(None)
            .build();
        let mut corpus = TaggedCorpus::new(refs(&["a", "b", "c", "d", "e"]), tokenizer, cfg);
        assert_eq!(corpus.pass().count(), 5);
        assert_eq!(corpus.stats().progress_reports, 2);
        assert_eq!(corpus.pass().count(), 5);
        assert_eq!(corpus.stats().progress_reports, 4);
    }

    #[test]
    fn zero_interval_disables_progress() {
        let mut corpus = counting(&["a", "b", "c"]);
        assert_eq!(corpus.pass().count(), 3);
        assert_eq!(corpus.stats().progress_reports, 0);
    }

    #[test]
    fn cache_growth_warning_fires_once_at_threshold() {
        let tokenizer = FnTokenizer(|_: &Path| -> Result<String> { Ok("x".into()) });
        let cfg = CorpusConfig::builder()
            .progress_interval(0)
            .cache_warning_threshold(Some(2))
            .build();
        let mut corpus = TaggedCorpus::new(refs(&["a", "b", "c", "d"]), tokenizer, cfg);
        let mut pass = corpus.pass();
        assert!(pass.next().is_some());
        drop(pass);
        assert!(!corpus.cache_warning_issued());
        assert_eq!(corpus.pass().count(), 4);
        assert!(corpus.cache_warning_issued());
        assert_eq!(corpus.pass().count(), 4);
        assert!(corpus.cache_warning_issued());
    }

    #[test]
    fn cache_warning_disabled_without_threshold() {
        let tokenizer = FnTokenizer(|_: &Path| -> Result<String> { Ok("x".into()) });
        let cfg = CorpusConfig::builder()
            .progress_interval(0)
            .cache_warning_threshold(None)
            .build();
        let mut corpus = TaggedCorpus::new(refs(&["a", "b", "c"]), tokenizer, cfg);
        assert_eq!(corpus.pass().count(), 3);
        assert!(!corpus.cache_warning_issued());
    }

    #[test]
    fn with_cache_resumes_a_matching_cache() {
        let mut first = counting(&["a", "b", "c"]);
        assert_eq!(first.pass().take(2).count(), 2);
        let (documents, cache) = first.into_parts();

        let calls = Cell::new(0usize);
        let tokenizer = FnTokenizer(|_: &Path| -> Result<String> {
            calls.set(calls.get() + 1);
            Ok("fresh".into())
        });
        let mut resumed = TaggedCorpus::with_cache(documents, tokenizer, cache, quiet())
            .expect("cache matches documents");
        assert_eq!(resumed.pass().count(), 3);
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn with_cache_rejects_a_longer_cache() {
        let mut full = counting(&["a", "b", "c"]);
        assert_eq!(full.pass().count(), 3);
        let (_, cache) = full.into_parts();
        let tokenizer = FnTokenizer(|_: &Path| -> Result<String> { Ok("z".into()) });
        let err = TaggedCorpus::with_cache(refs(&["z"]), tokenizer, cache, quiet())
            .expect_err("cache longer than corpus");
        assert!(matches!(err, DocvecError::InvalidConfig(_)));
    }

    #[test]
    fn with_cache_rejects_misaligned_labels() {
        let mut other = counting(&["a", "b"]);
        assert_eq!(other.pass().count(), 2);
        let (_, cache) = other.into_parts();
        let tokenizer = FnTokenizer(|_: &Path| -> Result<String> { Ok("z".into()) });
        let err = TaggedCorpus::with_cache(refs(&["a", "z"]), tokenizer, cache, quiet())
            .expect_err("label at index 1 differs");
        assert!(matches!(err, DocvecError::InvalidConfig(_)));
    }
}
