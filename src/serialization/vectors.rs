//! Plain-text export of per-label vectors.

use std::collections::hash_map::Entry;
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use rayon::prelude::*;
use rustc_hash::FxHashMap;

use crate::error::{DocvecError, Result};
use crate::model::DocVecModel;

/// File name used for `label`: `<prefix><label>_vector.txt`.
///
/// Path separators in the label are replaced so every file lands directly in the export
/// directory.
#[must_use]
pub fn vector_file_name(prefix: &str, label: &str) -> String {
    let safe: String = label
        .chars()
        .map(|ch| if matches!(ch, '/' | '\\') { '_' } else { ch })
        .collect();
    format!("{prefix}{safe}_vector.txt")
}

/// Writes one file per label under `dir`, each holding one vector component per line.
///
/// Returns the written paths in label order. Two labels that map to the same file name are
/// rejected before anything is written.
pub fn export_label_vectors(model: &DocVecModel, dir: &Path, prefix: &str) -> Result<Vec<PathBuf>> {
    let mut seen: FxHashMap<String, &str> = FxHashMap::default();
    let mut targets = Vec::with_capacity(model.labels().len());
    for label in model.labels() {
        let file_name = vector_file_name(prefix, label);
        match seen.entry(file_name) {
            Entry::Occupied(entry) => {
                return Err(DocvecError::InvalidConfig(format!(
                    "labels {:?} and {label:?} both export to {}",
                    entry.get(),
                    entry.key()
                )));
            }
            Entry::Vacant(entry) => {
                targets.push((label.as_str(), dir.join(entry.key())));
                entry.insert(label.as_str());
            }
        }
    }
    fs::create_dir_all(dir).map_err(|err| DocvecError::io(err, Some(dir.to_path_buf())))?;
    targets
        .into_par_iter()
        .map(|(label, path)| {
            let vector = model.label_vector(label).ok_or_else(|| {
                DocvecError::Internal(format!("label {label:?} has no vector"))
            })?;
            let mut contents = String::with_capacity(vector.len() * 12);
            for value in vector {
                let _ = writeln!(contents, "{value}");
            }
            fs::write(&path, contents).map_err(|err| DocvecError::io(err, Some(path.clone())))?;
            Ok(path)
        })
        .collect()
}
