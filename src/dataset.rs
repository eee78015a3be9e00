use crate::error::EngineError;
use crate::types::FeatureVector;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// One labeled training/evaluation example. `label` is true for phishing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LabeledExample {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    pub features: FeatureVector,
    pub label: bool,
}

/// Streams a JSON-lines dataset without materializing it: one example per
/// line, blank lines skipped, errors reported with their line number. The
/// evaluator consumes this in a single pass, so memory stays bounded for
/// arbitrarily large snapshots.
pub fn read_jsonl(
    path: &Path,
) -> Result<impl Iterator<Item = Result<LabeledExample, EngineError>>, EngineError> {
    let file = File::open(path)
        .map_err(|e| EngineError::Dataset(format!("open {}: {}", path.display(), e)))?;
    let reader = BufReader::new(file);
    Ok(reader
        .lines()
        .enumerate()
        .filter_map(|(index, line)| match line {
            Err(e) => Some(Err(EngineError::Dataset(format!(
                "line {}: {}",
                index + 1,
                e
            )))),
            Ok(text) if text.trim().is_empty() => None,
            Ok(text) => Some(serde_json::from_str(&text).map_err(|e| {
                EngineError::Dataset(format!("line {}: {}", index + 1, e))
            })),
        }))
}
