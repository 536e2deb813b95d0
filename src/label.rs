//! Filename-derived document labels.
//!
//! Labels come from an ordered chain of rules evaluated against the file name. The first rule
//! whose predicate accepts the name produces the label; when none does, the full file name is
//! used. This is a best-effort heuristic tuned for arXiv-style names and makes no claim of
//! producing a meaningful category for arbitrary corpora.

use std::fmt;
use std::path::Path;

use regex::Regex;

type Predicate = Box<dyn Fn(&str) -> bool + Send + Sync>;
type Extractor = Box<dyn Fn(&str) -> String + Send + Sync>;

/// A single `(predicate, extractor)` pair in a [`LabelExtractor`] chain.
pub struct LabelRule {
    name: String,
    predicate: Predicate,
    extractor: Extractor,
}

impl LabelRule {
    /// Builds a rule from explicit predicate and extractor closures.
    pub fn new<P, E>(name: impl Into<String>, predicate: P, extractor: E) -> Self
    where
        P: Fn(&str) -> bool + Send + Sync + 'static,
        E: Fn(&str) -> String + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            predicate: Box::new(predicate),
            extractor: Box::new(extractor),
        }
    }

    /// Builds a rule that matches `pattern` and yields its first capture group.
    ///
    /// Matches whose first group is missing or empty are treated as non-matches.
    pub fn capture(name: impl Into<String>, pattern: Regex) -> Self {
        let matcher = pattern.clone();
        Self::new(
            name,
            move |file_name| {
                matcher
                    .captures(file_name)
                    .and_then(|caps| caps.get(1))
                    .is_some_and(|group| !group.as_str().is_empty())
            },
            move |file_name| {
                pattern
                    .captures(file_name)
                    .and_then(|caps| caps.get(1))
                    .map(|group| group.as_str().to_string())
                    .unwrap_or_else(|| file_name.to_string())
            },
        )
    }

    /// Rule name used in diagnostics.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Applies the rule, returning `None` when the predicate rejects `file_name`.
    #[must_use]
    pub fn apply(&self, file_name: &str) -> Option<String> {
        (self.predicate)(file_name).then(|| (self.extractor)(file_name))
    }
}

impl fmt::Debug for LabelRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LabelRule").field("name", &self.name).finish()
    }
}

/// Ordered rule chain mapping file names to labels.
#[derive(Debug)]
pub struct LabelExtractor {
    rules: Vec<LabelRule>,
}

impl LabelExtractor {
    /// Creates an extractor evaluating `rules` in order.
    #[must_use]
    pub fn new(rules: Vec<LabelRule>) -> Self {
        Self { rules }
    }

    /// Returns the configured rules in priority order.
    #[must_use]
    pub fn rules(&self) -> &[LabelRule] {
        &self.rules
    }

    /// Derives the label for a bare file name.
    #[must_use]
    pub fn label(&self, file_name: &str) -> String {
        self.rules
            .iter()
            .find_map(|rule| rule.apply(file_name))
            .unwrap_or_else(|| file_name.to_string())
    }

    /// Derives the label for the file name component of `path`.
    #[must_use]
    pub fn label_path(&self, path: &Path) -> String {
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy())
            .unwrap_or_else(|| path.to_string_lossy());
        self.label(&file_name)
    }
}

impl Default for LabelExtractor {
    /// Legacy arXiv identifiers (`astro-ph9901001`), then the text before the first dot.
    fn default() -> Self {
        let legacy = Regex::new(r"^([a-z][a-z-]*)[0-9]").expect("valid legacy id pattern");
        let stem = Regex::new(r"^([^.]+)\.").expect("valid stem pattern");
        Self::new(vec![
            LabelRule::capture("legacy-identifier", legacy),
            LabelRule::capture("before-first-dot", stem),
        ])
    }
}
