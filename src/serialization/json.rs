//! JSON persistence for [`DocVecModel`].

use std::fs;
use std::path::Path;

use crate::error::{DocvecError, Result};
use crate::model::DocVecModel;

/// Serialises the model to a JSON string.
pub fn model_json(model: &DocVecModel, pretty: bool) -> Result<String> {
    let json = if pretty {
        serde_json::to_string_pretty(model)?
    } else {
        serde_json::to_string(model)?
    };
    Ok(json)
}

/// Writes the model to `path` as JSON.
pub fn save_model<P: AsRef<Path>>(model: &DocVecModel, path: P, pretty: bool) -> Result<()> {
    let json = model_json(model, pretty)?;
    fs::write(path.as_ref(), json)
        .map_err(|err| DocvecError::io(err, Some(path.as_ref().to_path_buf())))
}

/// Reads a model written by [`save_model`], validating its matrix shapes.
pub fn load_model<P: AsRef<Path>>(path: P) -> Result<DocVecModel> {
    let path = path.as_ref();
    let data = fs::read_to_string(path).map_err(|err| DocvecError::io(err, Some(path.into())))?;
    let model: DocVecModel = serde_json::from_str(&data)?;
    model.indexed()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::tests::toy_model;
    use tempfile::tempdir;

    #[test]
    fn pretty_json_is_multiline() {
        let model = toy_model();
        assert!(model_json(&model, true).unwrap().contains('\n'));
        assert!(!model_json(&model, false).unwrap().contains('\n'));
    }

    #[test]
    fn load_rejects_truncated_matrices() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("model.json");
        let mut value: serde_json::Value =
            serde_json::from_str(&model_json(&toy_model(), false).unwrap()).unwrap();
        value["label_vectors"] = serde_json::json!([1.0]);
        fs::write(&path, value.to_string()).expect("write");
        let err = load_model(&path).expect_err("shape mismatch");
        assert!(matches!(err, DocvecError::Serialization(_)));
    }

    #[test]
    fn load_reports_missing_file() {
        let dir = tempdir().expect("tempdir");
        let err = load_model(dir.path().join("missing.json")).expect_err("missing file");
        assert!(matches!(err, DocvecError::Io { .. }));
    }
}
