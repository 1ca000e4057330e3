//! Reading model-input files from disk.
//!
//! Format follows the file extension: `.json` parses as JSON, anything else
//! as YAML (YAML being a superset of JSON, a mislabeled file still loads).

use crate::error::CoreError;
use serde::de::DeserializeOwned;
use std::path::Path;
use tracing::info;

/// Load one dictionary file.
pub fn load_file<T: DeserializeOwned>(path: &Path) -> Result<T, CoreError> {
    let text = std::fs::read_to_string(path).map_err(|e| CoreError::InputRead {
        path: path.display().to_string(),
        detail: e.to_string(),
    })?;
    let is_json = path
        .extension()
        .map(|ext| ext.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let parsed = if is_json {
        serde_json::from_str(&text).map_err(|e| CoreError::InputParse {
            path: path.display().to_string(),
            detail: e.to_string(),
        })?
    } else {
        serde_yaml::from_str(&text).map_err(|e| CoreError::InputParse {
            path: path.display().to_string(),
            detail: e.to_string(),
        })?
    };
    info!(path = %path.display(), "loaded model input");
    Ok(parsed)
}
