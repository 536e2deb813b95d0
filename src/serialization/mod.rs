//! Helpers for persisting trained models and exporting their vectors.

pub mod json;
pub mod vectors;

pub use json::{load_model, model_json, save_model};
pub use vectors::{export_label_vectors, vector_file_name};
