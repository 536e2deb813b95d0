//! Index-aligned, append-only storage for tokenized documents.
//!
//! The cache keeps every document it admits for as long as it lives. Tokenizing a corpus once
//! and replaying it on every later pass is the whole point, but it also means memory grows with
//! the corpus: past a few tens of thousands of documents (depending on document length and
//! available RAM) the process will be killed by the operating system. Use
//! [`CacheCapacity::Bounded`] to trade repeated tokenization for a hard bound.

use std::collections::BTreeSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::config::CacheCapacity;
use crate::error::{DocvecError, Result};

/// Tokens of one document together with its label set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaggedDocument {
    /// Ordered tokens.
    pub tokens: Vec<String>,
    /// Labels attached to the document; the corpus always attaches exactly one.
    pub labels: BTreeSet<String>,
}

impl TaggedDocument {
    /// Builds a document carrying a single label.
    pub fn new(tokens: Vec<String>, label: impl Into<String>) -> Self {
        Self {
            tokens,
            labels: BTreeSet::from([label.into()]),
        }
    }

    /// Splits a whitespace-delimited token string.
    pub fn from_token_string(tokens: &str, label: impl Into<String>) -> Self {
        Self::new(
            tokens.split_whitespace().map(str::to_string).collect(),
            label,
        )
    }

    /// Returns the first label, which is the only one for corpus documents.
    #[must_use]
    pub fn label(&self) -> Option<&str> {
        self.labels.iter().next().map(String::as_str)
    }
}

/// Outcome recorded for one corpus index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheSlot {
    /// Tokenization succeeded.
    Document(Arc<TaggedDocument>),
    /// Tokenization failed and the document is skipped on every pass.
    Failed,
}

/// Append-only arena mapping corpus index to its [`CacheSlot`].
///
/// Slot `i` can only be written after slots `0..i`, and written slots are never replaced.
#[derive(Debug, Clone, Default)]
pub struct DocumentCache {
    slots: Vec<CacheSlot>,
    capacity: CacheCapacity,
    documents: usize,
    tokens: usize,
}

impl DocumentCache {
    /// Creates an empty cache with the given capacity policy.
    #[must_use]
    pub fn new(capacity: CacheCapacity) -> Self {
        Self {
            slots: Vec::new(),
            capacity,
            documents: 0,
            tokens: 0,
        }
    }

    /// Number of populated slots.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Returns `true` when nothing was cached yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Capacity policy in force.
    #[must_use]
    pub fn capacity(&self) -> CacheCapacity {
        self.capacity
    }

    /// Number of cached documents, excluding failures.
    #[must_use]
    pub fn documents(&self) -> usize {
        self.documents
    }

    /// Total tokens held by cached documents.
    #[must_use]
    pub fn tokens(&self) -> usize {
        self.tokens
    }

    /// Slot recorded for `index`, if any.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&CacheSlot> {
        self.slots.get(index)
    }

    /// Returns `true` when the next slot to write is `index` and the capacity admits it.
    #[must_use]
    pub fn admits(&self, index: usize) -> bool {
        index == self.slots.len() && self.capacity.admits(index)
    }

    /// Records the outcome for `index`.
    ///
    /// Fails when `index` is not the next unwritten slot, which would either overwrite an entry
    /// or leave a gap.
    pub fn insert(&mut self, index: usize, slot: CacheSlot) -> Result<()> {
        if index != self.slots.len() {
            return Err(DocvecError::Internal(format!(
                "cache slot {index} written out of order (next slot is {})",
                self.slots.len()
            )));
        }
        if !self.capacity.admits(index) {
            return Err(DocvecError::Internal(format!(
                "cache slot {index} exceeds capacity {:?}",
                self.capacity
            )));
        }
        if let CacheSlot::Document(doc) = &slot {
            self.documents += 1;
            self.tokens += doc.tokens.len();
        }
        self.slots.push(slot);
        Ok(())
    }

    /// Iterates over cached documents in index order, skipping failures.
    pub fn documents_iter(&self) -> impl Iterator<Item = &Arc<TaggedDocument>> + '_ {
        self.slots.iter().filter_map(|slot| match slot {
            CacheSlot::Document(doc) => Some(doc),
            CacheSlot::Failed => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(label: &str) -> CacheSlot {
        CacheSlot::Document(Arc::new(TaggedDocument::from_token_string("a b c", label)))
    }

    #[test]
    fn tagged_document_splits_on_any_whitespace() {
        let doc = TaggedDocument::from_token_string("  alpha\tbeta\n gamma ", "x");
        assert_eq!(doc.tokens, vec!["alpha", "beta", "gamma"]);
        assert_eq!(doc.label(), Some("x"));
        assert_eq!(doc.labels.len(), 1);
    }

    #[test]
    fn insert_is_strictly_sequential() {
        let mut cache = DocumentCache::default();
        cache.insert(0, doc("a")).expect("first slot");
        assert!(cache.insert(0, doc("b")).is_err(), "overwrite rejected");
        assert!(cache.insert(2, doc("c")).is_err(), "gap rejected");
        cache.insert(1, CacheSlot::Failed).expect("second slot");
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.documents(), 1);
        assert_eq!(cache.tokens(), 3);
    }

    #[test]
    fn bounded_cache_refuses_slots_past_limit() {
        let mut cache = DocumentCache::new(CacheCapacity::Bounded(1));
        assert!(cache.admits(0));
        cache.insert(0, doc("a")).expect("first slot");
        assert!(!cache.admits(1));
        assert!(cache.insert(1, doc("b")).is_err());
    }

    #[test]
    fn documents_iter_skips_failures() {
        let mut cache = DocumentCache::default();
        cache.insert(0, CacheSlot::Failed).unwrap();
        cache.insert(1, doc("b")).unwrap();
        let labels: Vec<_> = cache
            .documents_iter()
            .map(|doc| doc.label().unwrap().to_string())
            .collect();
        assert_eq!(labels, vec!["b"]);
    }
}
