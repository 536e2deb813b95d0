//! Facilities for discovering labelled documents on disk.

use std::path::{Path, PathBuf};

use log::{debug, info};
use serde::{Deserialize, Serialize};
use walkdir::WalkDir;

use crate::config::ScanConfig;
use crate::error::{DocvecError, Result};
use crate::label::LabelExtractor;

/// A discovered document: where it lives and the label derived from its file name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DocumentRef {
    path: PathBuf,
    label: String,
}

impl DocumentRef {
    /// Pairs a document path with its label.
    pub fn new(path: impl Into<PathBuf>, label: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            label: label.into(),
        }
    }

    /// Filesystem path handed to the tokenizer.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Label derived from the file name.
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }
}

/// Walks `root` recursively and returns the paths of files accepted by `predicate`.
///
/// Traversal stops as soon as [`ScanConfig::max_documents`] paths were collected. Any
/// unreadable entry fails the whole scan; an empty directory yields an empty list.
pub fn collect_paths<F>(root: &Path, cfg: &ScanConfig, mut predicate: F) -> Result<Vec<PathBuf>>
where
    F: FnMut(&Path) -> bool,
{
    cfg.validate()?;
    let metadata = root.metadata().map_err(|err| DocvecError::Scan {
        root: root.to_path_buf(),
        reason: err.to_string(),
    })?;
    if !metadata.is_dir() {
        return Err(DocvecError::Scan {
            root: root.to_path_buf(),
            reason: "corpus root is not a directory".into(),
        });
    }

    let limit = cfg.max_documents.unwrap_or(usize::MAX);
    let mut walker = WalkDir::new(root).follow_links(cfg.follow_symlinks);
    if cfg.sort_by_name {
        walker = walker.sort_by_file_name();
    }

    let mut files = Vec::new();
    for entry in walker {
        if files.len() >= limit {
            break;
        }
        let entry = entry.map_err(|err| DocvecError::Scan {
            root: root.to_path_buf(),
            reason: err.to_string(),
        })?;
        if entry.file_type().is_file() && predicate(entry.path()) {
            files.push(entry.into_path());
        }
    }
    Ok(files)
}

/// Discovers documents under `root` and labels each one with `labels`.
///
/// Paths and labels are produced together, so capping the scan can never misalign them.
pub fn scan_corpus(
    root: &Path,
    cfg: &ScanConfig,
    labels: &LabelExtractor,
) -> Result<Vec<DocumentRef>> {
    let paths = collect_paths(root, cfg, |path| {
        path.file_name()
            .and_then(|name| name.to_str())
            .is_some_and(|name| cfg.accepts(name))
    })?;
    let documents: Vec<DocumentRef> = paths
        .into_iter()
        .map(|path| {
            let label = labels.label_path(&path);
            debug!("discovered {} with label {label}", path.display());
            DocumentRef::new(path, label)
        })
        .collect();
    info!(
        "discovered {} documents under {}",
        documents.len(),
        root.display()
    );
    Ok(documents)
}
